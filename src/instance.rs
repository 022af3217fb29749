// Copyright 2020 Xavier Gillard
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! This module defines the domain model of the consolidation problem: physical
//! machines, virtual machines grouped into jobs, pre-existing mappings and the
//! instance tying them together. All of these are created by the parser and
//! treated as immutable afterwards.
//!
//! The parser reads the line-oriented ASCII format:
//! ```text
//! <n_pms>
//! <id> <cpu> <mem> <idle> <max>                              (n_pms times)
//! <n_vms>
//! <job> <idx> <cpu> <mem> <True|False> [<csv forbidden ids>] (n_vms times)
//! <n_mappings>
//! <job> <idx> <host_id>                                      (n_mappings times)
//! ```
//! CPU and memory figures are arbitrary-precision decimals; they are brought
//! to integers by scaling the whole instance with one common power of ten
//! (which leaves every capacity ratio and the migration budget untouched).

use std::fs::File;
use std::io::{BufRead, BufReader, Lines, Read};
use std::path::Path;

use metrohash::MetroHashMap;
use num_bigint::BigUint;
use num_rational::BigRational;
use num_traits::{One, Zero};
use regex::Regex;

use crate::common::Error;

// ----------------------------------------------------------------------------
// --- PHYSICAL MACHINE -------------------------------------------------------
// ----------------------------------------------------------------------------
/// One physical host of the data center: its capacities and its power profile.
/// Immutable after construction.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PhysicalMachine {
    /// The external identifier of the host (as found in the input file).
    pub id: usize,
    /// CPU capacity.
    pub cpu: BigUint,
    /// Memory capacity.
    pub mem: BigUint,
    /// Power drawn when the host is on but idle.
    pub idle: BigUint,
    /// Power drawn when the host is fully loaded.
    pub max: BigUint
}

// ----------------------------------------------------------------------------
// --- VIRTUAL MACHINE --------------------------------------------------------
// ----------------------------------------------------------------------------
/// One virtual machine. It is identified by the pair (job id, index within
/// job); its platform constraint is the set of hosts it must not be placed on.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VirtualMachine {
    /// Identifier of the job this vm belongs to.
    pub job: usize,
    /// Index of this vm within its job.
    pub index: usize,
    /// CPU demand.
    pub cpu: BigUint,
    /// Memory demand.
    pub mem: BigUint,
    /// When true, this vm must not share a host with another anti-colocatable
    /// vm of the same job.
    pub anti_colocatable: bool,
    /// External ids of the hosts this vm must not be placed on.
    pub forbidden: Vec<usize>
}

// ----------------------------------------------------------------------------
// --- JOB --------------------------------------------------------------------
// ----------------------------------------------------------------------------
/// A job is an ordered list of virtual machines sharing colocation rules.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Job {
    /// External identifier of the job.
    pub id: usize,
    /// The vms of the job, in input order.
    pub vms: Vec<VirtualMachine>
}

// ----------------------------------------------------------------------------
// --- MAPPING ----------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The placement of one vm onto one host. As an input it records where the vm
/// currently runs; as an output it is a decision of the allocator.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Mapping {
    /// Identifier of the job of the mapped vm.
    pub job: usize,
    /// Index of the mapped vm within its job.
    pub index: usize,
    /// External id of the host the vm is mapped onto.
    pub host: usize
}

// ----------------------------------------------------------------------------
// --- INSTANCE ---------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The complete problem instance: hosts, jobs, the pre-existing mapping and
/// the migration budget fraction. The effective migration budget is
/// `floor(fraction * total host memory)`; it caps the total memory of the vms
/// that an allocation moves off their original host.
#[derive(Debug, Clone)]
pub struct Instance {
    /// The physical machines, in input order.
    pub machines: Vec<PhysicalMachine>,
    /// The jobs, in input order.
    pub jobs: Vec<Job>,
    /// The pre-existing placement (possibly empty).
    pub mappings: Vec<Mapping>,
    /// Fraction of the total host memory that may migrate, in [0, 1].
    pub budget_fraction: f64,
    /// host external id -> position in `machines`
    host_index: MetroHashMap<usize, usize>,
    /// (job id, vm index) -> flat vm index
    vm_index: MetroHashMap<(usize, usize), usize>
}

impl Instance {
    /// Assembles an instance from its parts and indexes it. The budget
    /// fraction is clipped to [0, 1].
    pub fn new(machines: Vec<PhysicalMachine>,
               jobs: Vec<Job>,
               mappings: Vec<Mapping>,
               budget_fraction: f64) -> Instance {
        let mut host_index = MetroHashMap::default();
        for (pos, m) in machines.iter().enumerate() {
            host_index.insert(m.id, pos);
        }
        let mut vm_index = MetroHashMap::default();
        let mut flat = 0;
        for job in jobs.iter() {
            for vm in job.vms.iter() {
                vm_index.insert((vm.job, vm.index), flat);
                flat += 1;
            }
        }
        Instance {
            machines, jobs, mappings,
            budget_fraction: budget_fraction.clamp(0.0, 1.0),
            host_index, vm_index
        }
    }

    /// The number of hosts of the instance.
    pub fn nb_hosts(&self) -> usize {
        self.machines.len()
    }
    /// The total number of vms across all jobs.
    pub fn nb_vms(&self) -> usize {
        self.vm_index.len()
    }
    /// Iterates over all vms in flat order (jobs in input order, vms within
    /// a job in input order). The flat order is the canonical vm numbering
    /// used by encodings and assignments.
    pub fn vms(&self) -> impl Iterator<Item = &VirtualMachine> {
        self.jobs.iter().flat_map(|j| j.vms.iter())
    }
    /// The position in `machines` of the host with the given external id.
    pub fn host_position(&self, id: usize) -> Option<usize> {
        self.host_index.get(&id).copied()
    }
    /// The flat index of the vm identified by (job id, index within job).
    pub fn vm_position(&self, job: usize, index: usize) -> Option<usize> {
        self.vm_index.get(&(job, index)).copied()
    }
    /// True iff a pre-existing mapping was given. Migration is only an
    /// objective (and the budget only a constraint) when this holds.
    pub fn has_mappings(&self) -> bool {
        !self.mappings.is_empty()
    }
    /// The position in `machines` of the host the given vm (flat index)
    /// currently runs on, if any.
    pub fn original_host(&self, vm: usize) -> Option<usize> {
        self.mappings.iter()
            .find(|m| self.vm_position(m.job, m.index) == Some(vm))
            .and_then(|m| self.host_position(m.host))
    }
    /// The summed memory capacity of all hosts.
    pub fn total_mem(&self) -> BigUint {
        self.machines.iter().map(|m| &m.mem).sum()
    }
    /// The summed maximum power draw of all hosts.
    pub fn total_max_power(&self) -> BigUint {
        self.machines.iter().map(|m| &m.max).sum()
    }
    /// The migration budget: `floor(fraction * total host memory)`.
    pub fn migration_budget(&self) -> BigUint {
        let fraction = BigRational::from_float(self.budget_fraction)
            .unwrap_or_else(BigRational::one);
        let total = BigRational::from_integer(self.total_mem().into());
        let budget = (fraction * total).floor().to_integer();
        budget.to_biguint().unwrap_or_else(BigUint::zero)
    }
}

// ----------------------------------------------------------------------------
// --- PARSER -----------------------------------------------------------------
// ----------------------------------------------------------------------------

/// A cpu or memory figure as read from the file: its digits with the decimal
/// dot removed, and the number of fractional digits.
#[derive(Debug, Clone)]
struct RawDecimal {
    digits: BigUint,
    scale: usize
}
impl RawDecimal {
    fn parse(txt: &str) -> Result<RawDecimal, Error> {
        let mut split = txt.splitn(2, '.');
        let int = split.next().unwrap_or("");
        let frac = split.next().unwrap_or("");
        let joined = format!("{}{}", int, frac);
        let digits = joined.parse::<BigUint>()
            .map_err(|_| Error::Parse(format!("not a decimal: '{}'", txt)))?;
        Ok(RawDecimal { digits, scale: frac.len() })
    }
    /// The integer value of this decimal once the whole instance is scaled
    /// by `10^scale_to`.
    fn scaled(&self, scale_to: usize) -> BigUint {
        self.digits.clone() * BigUint::from(10_u32).pow((scale_to - self.scale) as u32)
    }
}

/// The unscaled form of a host line.
struct RawHost {
    id: usize,
    cpu: RawDecimal,
    mem: RawDecimal,
    idle: BigUint,
    max: BigUint
}
/// The unscaled form of a vm line.
struct RawVm {
    job: usize,
    index: usize,
    cpu: RawDecimal,
    mem: RawDecimal,
    anti_colocatable: bool,
    forbidden: Vec<usize>
}

impl Instance {
    /// Reads an instance from a file on disk. The default migration budget
    /// fraction is 1.0 (the whole memory may migrate); the caller overrides
    /// it afterwards from the CLI percentile.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Instance, Error> {
        Self::from_lines(BufReader::new(File::open(path)?).lines())
    }

    /// Reads an instance from any line source.
    pub fn from_lines<B: BufRead>(lines: Lines<B>) -> Result<Instance, Error> {
        let host_decl = Regex::new(
            r"^(?P<id>\d+)\s+(?P<cpu>\d+(?:\.\d+)?)\s+(?P<mem>\d+(?:\.\d+)?)\s+(?P<idle>\d+)\s+(?P<max>\d+)$"
        ).unwrap();
        let vm_decl = Regex::new(
            r"^(?P<job>\d+)\s+(?P<idx>\d+)\s+(?P<cpu>\d+(?:\.\d+)?)\s+(?P<mem>\d+(?:\.\d+)?)\s+(?P<anti>True|False)(?:\s+(?P<forbidden>\d+(?:,\d+)*))?$"
        ).unwrap();
        let map_decl = Regex::new(
            r"^(?P<job>\d+)\s+(?P<idx>\d+)\s+(?P<host>\d+)$"
        ).unwrap();

        let mut lines = lines.filter_map(|l| {
            let l = l.ok()?;
            let l = l.trim().to_string();
            if l.is_empty() { None } else { Some(l) }
        });

        let n_pms = parse_count(lines.next(), "host count")?;
        let mut hosts = Vec::with_capacity(n_pms);
        for _ in 0..n_pms {
            let line = lines.next()
                .ok_or_else(|| Error::Parse("missing host line".to_string()))?;
            let caps = host_decl.captures(&line)
                .ok_or_else(|| Error::Parse(format!("malformed host line: '{}'", line)))?;
            hosts.push(RawHost {
                id: parse_usize(&caps["id"])?,
                cpu: RawDecimal::parse(&caps["cpu"])?,
                mem: RawDecimal::parse(&caps["mem"])?,
                idle: parse_big(&caps["idle"])?,
                max: parse_big(&caps["max"])?
            });
        }

        let n_vms = parse_count(lines.next(), "vm count")?;
        let mut vms = Vec::with_capacity(n_vms);
        for _ in 0..n_vms {
            let line = lines.next()
                .ok_or_else(|| Error::Parse("missing vm line".to_string()))?;
            let caps = vm_decl.captures(&line)
                .ok_or_else(|| Error::Parse(format!("malformed vm line: '{}'", line)))?;
            let forbidden = match caps.name("forbidden") {
                None => vec![],
                Some(csv) => csv.as_str().split(',')
                    .map(parse_usize)
                    .collect::<Result<Vec<_>, _>>()?
            };
            vms.push(RawVm {
                job: parse_usize(&caps["job"])?,
                index: parse_usize(&caps["idx"])?,
                cpu: RawDecimal::parse(&caps["cpu"])?,
                mem: RawDecimal::parse(&caps["mem"])?,
                anti_colocatable: &caps["anti"] == "True",
                forbidden
            });
        }

        let n_maps = parse_count(lines.next(), "mapping count")?;
        let mut mappings = Vec::with_capacity(n_maps);
        for _ in 0..n_maps {
            let line = lines.next()
                .ok_or_else(|| Error::Parse("missing mapping line".to_string()))?;
            let caps = map_decl.captures(&line)
                .ok_or_else(|| Error::Parse(format!("malformed mapping line: '{}'", line)))?;
            mappings.push(Mapping {
                job: parse_usize(&caps["job"])?,
                index: parse_usize(&caps["idx"])?,
                host: parse_usize(&caps["host"])?
            });
        }

        Ok(Self::assemble(hosts, vms, mappings))
    }

    /// Scales every cpu/mem figure with the common power of ten and groups
    /// the vms into jobs (in order of first appearance).
    fn assemble(hosts: Vec<RawHost>, vms: Vec<RawVm>, mappings: Vec<Mapping>) -> Instance {
        let scale = hosts.iter().flat_map(|h| [h.cpu.scale, h.mem.scale])
            .chain(vms.iter().flat_map(|v| [v.cpu.scale, v.mem.scale]))
            .max()
            .unwrap_or(0);

        let machines = hosts.into_iter()
            .map(|h| PhysicalMachine {
                id: h.id,
                cpu: h.cpu.scaled(scale),
                mem: h.mem.scaled(scale),
                idle: h.idle,
                max: h.max
            })
            .collect::<Vec<_>>();

        let mut jobs: Vec<Job> = vec![];
        for vm in vms {
            let built = VirtualMachine {
                job: vm.job,
                index: vm.index,
                cpu: vm.cpu.scaled(scale),
                mem: vm.mem.scaled(scale),
                anti_colocatable: vm.anti_colocatable,
                forbidden: vm.forbidden
            };
            match jobs.iter_mut().find(|j| j.id == built.job) {
                Some(job) => job.vms.push(built),
                None => jobs.push(Job { id: built.job, vms: vec![built] })
            }
        }

        Instance::new(machines, jobs, mappings, 1.0)
    }
}

fn parse_count(line: Option<String>, what: &str) -> Result<usize, Error> {
    let line = line.ok_or_else(|| Error::Parse(format!("missing {}", what)))?;
    line.parse::<usize>()
        .map_err(|_| Error::Parse(format!("malformed {}: '{}'", what, line)))
}
fn parse_usize(txt: &str) -> Result<usize, Error> {
    txt.parse::<usize>()
        .map_err(|_| Error::Parse(format!("not an integer: '{}'", txt)))
}
fn parse_big(txt: &str) -> Result<BigUint, Error> {
    txt.parse::<BigUint>()
        .map_err(|_| Error::Parse(format!("not an integer: '{}'", txt)))
}

impl Instance {
    /// Reads an instance from an open file.
    pub fn from_read<S: Read>(src: S) -> Result<Instance, Error> {
        Self::from_lines(BufReader::new(src).lines())
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_parser {
    use super::*;
    use std::io::{BufRead, Cursor};

    fn parse(txt: &str) -> Instance {
        Instance::from_lines(Cursor::new(txt).lines()).expect("parse")
    }

    const CANONICAL: &str = "\
        2\n\
        0 10 10 50 100\n\
        1 10 10 50 100\n\
        2\n\
        0 0 6 6 False\n\
        0 1 6 6 False\n\
        0\n";

    #[test]
    fn parses_hosts_vms_and_counts() {
        let inst = parse(CANONICAL);
        assert_eq!(2, inst.nb_hosts());
        assert_eq!(2, inst.nb_vms());
        assert_eq!(1, inst.jobs.len());
        assert!(!inst.has_mappings());
    }
    #[test]
    fn host_fields_are_read_in_order() {
        let inst = parse(CANONICAL);
        let h = &inst.machines[1];
        assert_eq!(1, h.id);
        assert_eq!(BigUint::from(10_u32), h.cpu);
        assert_eq!(BigUint::from(50_u32), h.idle);
        assert_eq!(BigUint::from(100_u32), h.max);
    }
    #[test]
    fn decimals_are_scaled_instance_wide() {
        let inst = parse("\
            1\n\
            0 2.5 4 10 20\n\
            1\n\
            0 0 1.25 2 False\n\
            0\n");
        // two fractional digits at most => everything times 100
        assert_eq!(BigUint::from(250_u32), inst.machines[0].cpu);
        assert_eq!(BigUint::from(400_u32), inst.machines[0].mem);
        let vm = inst.vms().next().unwrap();
        assert_eq!(BigUint::from(125_u32), vm.cpu);
        assert_eq!(BigUint::from(200_u32), vm.mem);
    }
    #[test]
    fn forbidden_hosts_are_read_from_the_trailing_column() {
        let inst = parse("\
            2\n\
            0 10 10 50 100\n\
            1 10 10 50 100\n\
            1\n\
            0 0 5 5 False 0\n\
            0\n");
        let vm = inst.vms().next().unwrap();
        assert_eq!(vec![0], vm.forbidden);
    }
    #[test]
    fn anti_colocation_flag_is_read() {
        let inst = parse("\
            1\n\
            0 10 10 50 100\n\
            2\n\
            0 0 2 2 True\n\
            0 1 2 2 True\n\
            0\n");
        assert!(inst.vms().all(|v| v.anti_colocatable));
    }
    #[test]
    fn mappings_are_read() {
        let inst = parse("\
            2\n\
            0 10 10 50 100\n\
            1 10 10 50 100\n\
            1\n\
            0 0 4 4 False\n\
            1\n\
            0 0 1\n");
        assert!(inst.has_mappings());
        assert_eq!(Some(1), inst.original_host(0));
    }
    #[test]
    fn vms_of_one_job_are_grouped_in_input_order() {
        let inst = parse("\
            1\n\
            0 10 10 50 100\n\
            3\n\
            0 0 1 1 False\n\
            1 0 1 1 False\n\
            0 1 1 1 False\n\
            0\n");
        assert_eq!(2, inst.jobs.len());
        assert_eq!(2, inst.jobs[0].vms.len());
        assert_eq!(Some(1), inst.vm_position(0, 1));
        assert_eq!(Some(2), inst.vm_position(1, 0));
    }
    #[test]
    fn malformed_host_line_is_a_parse_error() {
        let r = Instance::from_lines(Cursor::new("1\n0 10 x 50 100\n0\n0\n").lines());
        assert!(matches!(r, Err(Error::Parse(_))));
    }
    #[test]
    fn missing_counts_are_parse_errors() {
        let r = Instance::from_lines(Cursor::new("").lines());
        assert!(matches!(r, Err(Error::Parse(_))));
    }
}

#[cfg(test)]
mod test_budget {
    use super::*;

    fn two_hosts(fraction: f64) -> Instance {
        let machines = vec![
            PhysicalMachine {
                id: 0,
                cpu: BigUint::from(10_u32), mem: BigUint::from(5_u32),
                idle: BigUint::from(50_u32), max: BigUint::from(100_u32)
            },
            PhysicalMachine {
                id: 1,
                cpu: BigUint::from(10_u32), mem: BigUint::from(5_u32),
                idle: BigUint::from(50_u32), max: BigUint::from(100_u32)
            }
        ];
        Instance::new(machines, vec![], vec![], fraction)
    }

    #[test]
    fn budget_is_the_floored_fraction_of_total_memory() {
        // total mem = 10, fraction 0.3 => budget 3
        assert_eq!(BigUint::from(3_u32), two_hosts(0.3).migration_budget());
    }
    #[test]
    fn full_fraction_keeps_the_whole_memory() {
        assert_eq!(BigUint::from(10_u32), two_hosts(1.0).migration_budget());
    }
    #[test]
    fn fraction_is_clipped_to_the_unit_interval() {
        assert_eq!(BigUint::from(10_u32), two_hosts(7.5).migration_budget());
        assert_eq!(BigUint::from(0_u32),  two_hosts(-1.0).migration_budget());
    }
}
