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

//! This module defines what an answer to the consolidation problem looks
//! like: the assignment of vms to hosts (under its two interchangeable
//! encodings), the exact objective vector attached to an assignment, the
//! dominance relation between objective vectors and the non-dominated
//! population the allocators accumulate.
//!
//! The evaluation machinery lives here too because it is shared verbatim by
//! the constraint-based algorithms and by the evolutionary adapter.

use bitset_fixed::BitSet;
use num_bigint::BigUint;
use num_rational::BigRational;
use num_traits::{One, ToPrimitive, Zero};

use crate::instance::Instance;

// ----------------------------------------------------------------------------
// --- ASSIGNMENT -------------------------------------------------------------
// ----------------------------------------------------------------------------
/// A complete assignment of vms to hosts: `hosts[v]` is the position (not the
/// external id) of the host running vm `v`, where vms are numbered in the
/// instance's flat order.
///
/// An assignment is interchangeable with a bit-vector over the dense placement
/// variables `x(v, h) = v * nb_hosts + h`; the two conversions below are
/// inverses of one another whenever the bit-vector encodes a function (exactly
/// one host bit per vm).
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Assignment {
    pub hosts: Vec<usize>
}
impl Assignment {
    pub fn new(hosts: Vec<usize>) -> Assignment {
        Assignment { hosts }
    }
    /// The number of vms this assignment places.
    pub fn len(&self) -> usize {
        self.hosts.len()
    }
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
    /// Decodes a dense placement bit-vector. Returns `None` when some vm does
    /// not have exactly one host bit set (the vector encodes no assignment).
    pub fn from_bits(bits: &BitSet, nb_vms: usize, nb_hosts: usize) -> Option<Assignment> {
        let mut hosts = Vec::with_capacity(nb_vms);
        for v in 0..nb_vms {
            let mut chosen = None;
            for h in 0..nb_hosts {
                if bits[v * nb_hosts + h] {
                    if chosen.is_some() {
                        return None;
                    }
                    chosen = Some(h);
                }
            }
            hosts.push(chosen?);
        }
        Some(Assignment { hosts })
    }
    /// Encodes this assignment as a dense placement bit-vector.
    pub fn to_bits(&self, nb_hosts: usize) -> BitSet {
        let mut bits = BitSet::new(self.hosts.len() * nb_hosts);
        for (v, h) in self.hosts.iter().enumerate() {
            bits.set(v * nb_hosts + h, true);
        }
        bits
    }
}

// ----------------------------------------------------------------------------
// --- OBJECTIVE VECTOR -------------------------------------------------------
// ----------------------------------------------------------------------------
/// The exact objective vector of an assignment. Migration is only present
/// when the instance carries a pre-existing mapping.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ObjectiveValues {
    pub energy: BigRational,
    pub wastage: BigRational,
    pub migration: Option<BigRational>
}
impl ObjectiveValues {
    /// The components of this vector, in reporting order.
    pub fn components(&self) -> Vec<&BigRational> {
        let mut out = vec![&self.energy, &self.wastage];
        if let Some(m) = &self.migration {
            out.push(m);
        }
        out
    }
    /// True iff `self` Pareto-dominates `other`: no component is worse and at
    /// least one is strictly better (minimisation).
    pub fn dominates(&self, other: &ObjectiveValues) -> bool {
        let a = self.components();
        let b = other.components();
        debug_assert_eq!(a.len(), b.len());
        let no_worse = a.iter().zip(b.iter()).all(|(x, y)| x <= y);
        let better = a.iter().zip(b.iter()).any(|(x, y)| x < y);
        no_worse && better
    }
    /// Scales every component into [0, 1] against the instance reference
    /// points. An empty reference range reports 0.0.
    pub fn normalized(&self, refs: &ReferencePoints) -> Vec<f64> {
        let norm = |val: &BigRational, hi: &BigRational| {
            if hi.is_zero() {
                0.0
            } else {
                (val / hi).to_f64().unwrap_or(0.0)
            }
        };
        let mut out = vec![
            norm(&self.energy, &refs.energy),
            norm(&self.wastage, &refs.wastage)
        ];
        if let Some(m) = &self.migration {
            out.push(norm(m, &refs.migration));
        }
        out
    }
}

/// The per-instance upper reference points the reported figures are divided
/// by: total maximum power draw for energy, `|hosts| * (1 + eps)` for wastage
/// and the total host memory for migration. Lower points are all zero.
#[derive(Debug, Clone)]
pub struct ReferencePoints {
    pub energy: BigRational,
    pub wastage: BigRational,
    pub migration: BigRational
}

// ----------------------------------------------------------------------------
// --- EVALUATOR --------------------------------------------------------------
// ----------------------------------------------------------------------------
/// Evaluates assignments against an instance, in exact rational arithmetic.
/// This is the single evaluation path: the MCS/GIA/PBO allocators and the
/// evolutionary adapter all report through it.
#[derive(Debug, Clone)]
pub struct Evaluator<'a> {
    instance: &'a Instance,
    /// flat index -> (cpu, mem) demand
    demands: Vec<(BigUint, BigUint)>,
    /// flat index -> position of the host the vm currently runs on
    original: Vec<Option<usize>>,
    /// When true, the outer denominators of energy and wastage are dropped
    /// and the objectives become plain weighted sums.
    ignore_denominators: bool
}

impl <'a> Evaluator<'a> {
    pub fn new(instance: &'a Instance, ignore_denominators: bool) -> Evaluator<'a> {
        let demands = instance.vms()
            .map(|vm| (vm.cpu.clone(), vm.mem.clone()))
            .collect::<Vec<_>>();
        let original = (0..instance.nb_vms())
            .map(|v| instance.original_host(v))
            .collect::<Vec<_>>();
        Evaluator { instance, demands, original, ignore_denominators }
    }

    pub fn instance(&self) -> &'a Instance {
        self.instance
    }

    /// The balance slack constant of the wastage objective: `1 / |hosts|`.
    pub fn epsilon(&self) -> BigRational {
        BigRational::new(1.into(), (self.instance.nb_hosts() as i64).into())
    }

    /// The reference points the reported figures are normalised by.
    pub fn reference_points(&self) -> ReferencePoints {
        let nb_hosts = self.instance.nb_hosts() as i64;
        let energy = BigRational::from_integer(self.instance.total_max_power().into());
        let wastage = BigRational::from_integer(nb_hosts.into())
            * (BigRational::one() + self.epsilon());
        let migration = BigRational::from_integer(self.instance.total_mem().into());
        ReferencePoints { energy, wastage, migration }
    }

    /// Computes the exact objective vector of the given assignment. Energy and
    /// wastage are summed over used hosts only; migration is the total memory
    /// of the vms running away from their original host (and absent when the
    /// instance has no pre-existing mapping).
    pub fn evaluate(&self, a: &Assignment) -> ObjectiveValues {
        let nb_hosts = self.instance.nb_hosts();
        let mut used_cpu = vec![BigUint::zero(); nb_hosts];
        let mut used_mem = vec![BigUint::zero(); nb_hosts];
        for (v, &h) in a.hosts.iter().enumerate() {
            used_cpu[h] += &self.demands[v].0;
            used_mem[h] += &self.demands[v].1;
        }

        let eps = self.epsilon();
        let mut energy = BigRational::zero();
        let mut wastage = BigRational::zero();
        for (h, machine) in self.instance.machines.iter().enumerate() {
            if used_cpu[h].is_zero() && used_mem[h].is_zero() {
                continue;
            }
            let cap_cpu = ratio(&machine.cpu);
            let cap_mem = ratio(&machine.mem);
            let u_cpu = ratio(&used_cpu[h]) / &cap_cpu;
            let u_mem = ratio(&used_mem[h]) / &cap_mem;
            let idle = ratio(&machine.idle);
            let span = ratio(&machine.max) - &idle;

            energy += if self.ignore_denominators {
                &idle + ratio(&used_cpu[h]) * &span
            } else {
                &idle + &u_cpu * &span
            };

            let l_cpu = BigRational::one() - &u_cpu;
            let l_mem = BigRational::one() - &u_mem;
            let spread = abs(l_cpu - l_mem) + &eps;
            wastage += if self.ignore_denominators {
                spread
            } else {
                spread / (&u_cpu + &u_mem)
            };
        }

        let migration = if self.instance.has_mappings() {
            let mut moved = BigUint::zero();
            for (v, &h) in a.hosts.iter().enumerate() {
                if let Some(orig) = self.original[v] {
                    if orig != h {
                        moved += &self.demands[v].1;
                    }
                }
            }
            Some(ratio(&moved))
        } else {
            None
        };

        ObjectiveValues { energy, wastage, migration }
    }

    /// Checks every hard constraint of the instance: each vm placed on exactly
    /// one in-range host, host capacities respected, no forbidden placement,
    /// no two anti-colocatable vms of one job sharing a host, and the memory
    /// of moved vms within the migration budget.
    pub fn is_valid(&self, a: &Assignment) -> bool {
        let nb_hosts = self.instance.nb_hosts();
        if a.hosts.len() != self.instance.nb_vms() {
            return false;
        }
        if a.hosts.iter().any(|&h| h >= nb_hosts) {
            return false;
        }

        // capacities
        let mut used_cpu = vec![BigUint::zero(); nb_hosts];
        let mut used_mem = vec![BigUint::zero(); nb_hosts];
        for (v, &h) in a.hosts.iter().enumerate() {
            used_cpu[h] += &self.demands[v].0;
            used_mem[h] += &self.demands[v].1;
        }
        for (h, machine) in self.instance.machines.iter().enumerate() {
            if used_cpu[h] > machine.cpu || used_mem[h] > machine.mem {
                return false;
            }
        }

        // platform constraints
        for (v, vm) in self.instance.vms().enumerate() {
            let placed = a.hosts[v];
            let banned = vm.forbidden.iter()
                .filter_map(|id| self.instance.host_position(*id))
                .any(|pos| pos == placed);
            if banned {
                return false;
            }
        }

        // anti-colocation within each job
        let mut flat = 0;
        for job in self.instance.jobs.iter() {
            let placements = job.vms.iter()
                .enumerate()
                .filter(|(_, vm)| vm.anti_colocatable)
                .map(|(i, _)| a.hosts[flat + i])
                .collect::<Vec<_>>();
            for (i, h) in placements.iter().enumerate() {
                if placements[i + 1..].contains(h) {
                    return false;
                }
            }
            flat += job.vms.len();
        }

        // migration budget
        if self.instance.has_mappings() {
            let mut moved = BigUint::zero();
            for (v, &h) in a.hosts.iter().enumerate() {
                if let Some(orig) = self.original[v] {
                    if orig != h {
                        moved += &self.demands[v].1;
                    }
                }
            }
            if moved > self.instance.migration_budget() {
                return false;
            }
        }
        true
    }
}

fn ratio(x: &BigUint) -> BigRational {
    BigRational::from_integer(x.clone().into())
}
fn abs(x: BigRational) -> BigRational {
    if x < BigRational::zero() { -x } else { x }
}

// ----------------------------------------------------------------------------
// --- POPULATION -------------------------------------------------------------
// ----------------------------------------------------------------------------
/// One Pareto candidate: an assignment together with its objective vector.
#[derive(Debug, Clone)]
pub struct ParetoPoint {
    pub assignment: Assignment,
    pub objectives: ObjectiveValues
}

/// The non-dominated population an allocator accumulates. Points are kept in
/// discovery order; inserting a point drops every older point it dominates
/// and is a no-op when the candidate is itself dominated (or duplicated).
#[derive(Debug, Clone, Default)]
pub struct Population {
    points: Vec<ParetoPoint>
}
impl Population {
    pub fn new() -> Population {
        Population { points: vec![] }
    }
    /// Offers a candidate to the population. Returns true iff the candidate
    /// was retained (it was not dominated by any current member).
    pub fn insert(&mut self, candidate: ParetoPoint) -> bool {
        let dominated_or_dup = self.points.iter().any(|p|
            p.objectives.dominates(&candidate.objectives)
                || p.objectives == candidate.objectives);
        if dominated_or_dup {
            return false;
        }
        self.points.retain(|p| !candidate.objectives.dominates(&p.objectives));
        self.points.push(candidate);
        true
    }
    pub fn len(&self) -> usize {
        self.points.len()
    }
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = &ParetoPoint> {
        self.points.iter()
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################


#[cfg(test)]
mod test_dominance {
    use super::*;
    use num_rational::BigRational;

    fn obj(e: i64, w: i64) -> ObjectiveValues {
        ObjectiveValues {
            energy: BigRational::from_integer(e.into()),
            wastage: BigRational::from_integer(w.into()),
            migration: None
        }
    }

    #[test]
    fn strictly_better_on_every_component_dominates() {
        assert!(obj(1, 1).dominates(&obj(2, 2)));
    }
    #[test]
    fn better_on_one_equal_on_the_rest_dominates() {
        assert!(obj(1, 2).dominates(&obj(2, 2)));
    }
    #[test]
    fn equal_vectors_do_not_dominate_each_other() {
        assert!(!obj(1, 1).dominates(&obj(1, 1)));
    }
    #[test]
    fn trade_offs_do_not_dominate() {
        assert!(!obj(1, 3).dominates(&obj(2, 2)));
        assert!(!obj(2, 2).dominates(&obj(1, 3)));
    }
}


#[cfg(test)]
mod test_evaluator {
    use super::*;
    use crate::instance::{Instance, Job, Mapping, PhysicalMachine, VirtualMachine};
    use num_bigint::BigUint;
    use num_rational::BigRational;

    fn host(id: usize, cpu: u32, mem: u32, idle: u32, max: u32) -> PhysicalMachine {
        PhysicalMachine {
            id,
            cpu: BigUint::from(cpu), mem: BigUint::from(mem),
            idle: BigUint::from(idle), max: BigUint::from(max)
        }
    }
    fn vm(job: usize, index: usize, cpu: u32, mem: u32) -> VirtualMachine {
        VirtualMachine {
            job, index,
            cpu: BigUint::from(cpu), mem: BigUint::from(mem),
            anti_colocatable: false, forbidden: vec![]
        }
    }

    #[test]
    fn a_fully_loaded_host_draws_its_maximum_power() {
        let inst = Instance::new(
            vec![host(0, 10, 10, 50, 100)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 10, 10)] }],
            vec![], 1.0);
        let eval = Evaluator::new(&inst, false);
        let objs = eval.evaluate(&Assignment::new(vec![0]));
        assert_eq!(BigRational::from_integer(100.into()), objs.energy);
        // fully loaded on both resources => spread is only epsilon
        assert_eq!(eval.epsilon() / BigRational::from_integer(2.into()), objs.wastage);
    }
    #[test]
    fn an_unused_host_contributes_nothing() {
        let inst = Instance::new(
            vec![host(0, 10, 10, 50, 100), host(1, 10, 10, 50, 100)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 10, 10)] }],
            vec![], 1.0);
        let eval = Evaluator::new(&inst, false);
        let objs = eval.evaluate(&Assignment::new(vec![0]));
        assert_eq!(BigRational::from_integer(100.into()), objs.energy);
    }
    #[test]
    fn a_half_loaded_host_draws_idle_plus_half_the_span() {
        let inst = Instance::new(
            vec![host(0, 10, 10, 50, 100)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 5, 10)] }],
            vec![], 1.0);
        let eval = Evaluator::new(&inst, false);
        let objs = eval.evaluate(&Assignment::new(vec![0]));
        assert_eq!(BigRational::from_integer(75.into()), objs.energy);
    }
    #[test]
    fn migration_is_absent_without_a_preexisting_mapping() {
        let inst = Instance::new(
            vec![host(0, 10, 10, 50, 100)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 5, 5)] }],
            vec![], 1.0);
        let eval = Evaluator::new(&inst, false);
        assert_eq!(None, eval.evaluate(&Assignment::new(vec![0])).migration);
    }
    #[test]
    fn migration_counts_the_memory_of_moved_vms_only() {
        let inst = Instance::new(
            vec![host(0, 10, 10, 50, 100), host(1, 10, 10, 50, 100)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 2, 4), vm(0, 1, 2, 3)] }],
            vec![Mapping { job: 0, index: 0, host: 0 },
                 Mapping { job: 0, index: 1, host: 0 }],
            1.0);
        let eval = Evaluator::new(&inst, false);
        // vm 0 stays, vm 1 moves to host 1: only its 3 units of memory count
        let objs = eval.evaluate(&Assignment::new(vec![0, 1]));
        assert_eq!(Some(BigRational::from_integer(3.into())), objs.migration);
    }
    #[test]
    fn validity_rejects_overloaded_hosts() {
        let inst = Instance::new(
            vec![host(0, 10, 10, 50, 100)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 6, 6), vm(0, 1, 6, 6)] }],
            vec![], 1.0);
        let eval = Evaluator::new(&inst, false);
        assert!(!eval.is_valid(&Assignment::new(vec![0, 0])));
    }
    #[test]
    fn validity_rejects_forbidden_placements() {
        let mut banned = vm(0, 0, 1, 1);
        banned.forbidden = vec![0];
        let inst = Instance::new(
            vec![host(0, 10, 10, 50, 100), host(1, 10, 10, 50, 100)],
            vec![Job { id: 0, vms: vec![banned] }],
            vec![], 1.0);
        let eval = Evaluator::new(&inst, false);
        assert!(!eval.is_valid(&Assignment::new(vec![0])));
        assert!( eval.is_valid(&Assignment::new(vec![1])));
    }
    #[test]
    fn validity_rejects_colocated_anti_colocatable_vms() {
        let mut a = vm(0, 0, 1, 1);
        let mut b = vm(0, 1, 1, 1);
        a.anti_colocatable = true;
        b.anti_colocatable = true;
        let inst = Instance::new(
            vec![host(0, 10, 10, 50, 100), host(1, 10, 10, 50, 100)],
            vec![Job { id: 0, vms: vec![a, b] }],
            vec![], 1.0);
        let eval = Evaluator::new(&inst, false);
        assert!(!eval.is_valid(&Assignment::new(vec![0, 0])));
        assert!( eval.is_valid(&Assignment::new(vec![0, 1])));
    }
    #[test]
    fn validity_enforces_the_migration_budget() {
        // total mem 10, fraction 0.3 => budget 3 < the vm's 4 memory units
        let inst = Instance::new(
            vec![host(0, 10, 5, 50, 100), host(1, 10, 5, 50, 100)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 2, 4)] }],
            vec![Mapping { job: 0, index: 0, host: 0 }],
            0.3);
        let eval = Evaluator::new(&inst, false);
        assert!( eval.is_valid(&Assignment::new(vec![0])));
        assert!(!eval.is_valid(&Assignment::new(vec![1])));
    }
    #[test]
    fn normalized_energy_is_the_share_of_the_total_power_draw() {
        let inst = Instance::new(
            vec![host(0, 10, 10, 50, 100)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 10, 10)] }],
            vec![], 1.0);
        let eval = Evaluator::new(&inst, false);
        let objs = eval.evaluate(&Assignment::new(vec![0]));
        let norm = objs.normalized(&eval.reference_points());
        assert!((norm[0] - 1.0).abs() < 1e-9);
    }
}
