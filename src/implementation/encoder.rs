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

//! This module maps the consolidation problem onto pseudo-Boolean variables
//! and constraints:
//!
//! - one placement variable `x(v, h)` per vm and per host the vm may run on
//!   (platform-forbidden hosts get no variable at all), with an exactly-one
//!   constraint per vm;
//! - per host and per resource, a `<=` capacity constraint;
//! - one binary anti-colocation clause per job pair per shared host;
//! - per-vm moved indicators and one global migration-budget constraint when
//!   a pre-existing mapping exists;
//! - optional symmetry breaking between hosts with identical capacity and
//!   power profile;
//! - the three objective expressions (energy, wastage, migration) as sums of
//!   ratios of weighted literals. The wastage numerator distributes the
//!   per-host balance spread over the individual placement literals, which
//!   keeps every objective a linear expression over literals while
//!   preserving the optimisation semantics of the absolute-value form.

use num_bigint::{BigInt, BigUint};
use num_rational::BigRational;
use num_traits::{One, Zero};

use crate::abstraction::sink::ConstraintSink;
use crate::abstraction::solver::PbSolver;
use crate::common::{Error, Lit};
use crate::instance::Instance;
use crate::solution::Assignment;

// ----------------------------------------------------------------------------
// --- CONFIGURATION ----------------------------------------------------------
// ----------------------------------------------------------------------------
/// The switches altering what the encoder emits. All off by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncoderConfig {
    /// Break symmetries between hosts with identical capacity/consumption.
    pub symmetry_breaking: bool,
    /// Drop the platform (forbidden host) constraints.
    pub drop_platform: bool,
    /// Drop the anti-colocation constraints.
    pub drop_anti_colocation: bool,
    /// Encode the objectives as plain sums (no ratio denominators, no
    /// capacity divisors in the energy coefficients).
    pub ignore_denominators: bool
}

// ----------------------------------------------------------------------------
// --- OBJECTIVE EXPRESSIONS --------------------------------------------------
// ----------------------------------------------------------------------------
/// One ratio of weighted literal sums. A missing denominator denotes a plain
/// weighted sum. All coefficients are non-negative.
#[derive(Debug, Clone)]
pub struct RatioExpr {
    pub numerator: Vec<(BigRational, Lit)>,
    pub denominator: Option<Vec<(BigRational, Lit)>>
}

/// One objective function: a sum of ratios to be minimised.
#[derive(Debug, Clone)]
pub struct ObjectiveExpr {
    pub name: &'static str,
    pub ratios: Vec<RatioExpr>
}
impl ObjectiveExpr {
    /// Folds the sum of ratios into one linear list of soft units: the
    /// literals whose satisfaction lowers the objective, with their weights.
    /// Numerator terms contribute their negation (spending less), denominator
    /// terms contribute positively (spreading the cost wider).
    pub fn fold(&self) -> Vec<(BigRational, Lit)> {
        let mut softs = vec![];
        for ratio in self.ratios.iter() {
            for (c, l) in ratio.numerator.iter() {
                softs.push((c.clone(), !*l));
            }
            if let Some(denominator) = &ratio.denominator {
                for (d, l) in denominator.iter() {
                    softs.push((d.clone(), *l));
                }
            }
        }
        softs
    }
    /// The numerator terms of every ratio, merged: the linear bound form the
    /// guided-improvement and single-objective searches constrain.
    pub fn linear(&self) -> Vec<(BigRational, Lit)> {
        self.ratios.iter()
            .flat_map(|r| r.numerator.iter().cloned())
            .collect()
    }
}

// ----------------------------------------------------------------------------
// --- ENCODING ---------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The placement encoding of one instance: the variable maps and the
/// objective expressions. The constraints themselves were written into the
/// sink at construction time.
pub struct PlacementEncoding {
    nb_hosts: usize,
    /// `x[v][h]`: the placement literal, `None` on forbidden hosts.
    x: Vec<Vec<Option<Lit>>>,
    /// `used[h]`: true iff some vm runs on host `h`.
    used: Vec<Lit>,
    /// `moved[v]`: true iff vm `v` runs away from its original host (only
    /// for vms carrying a pre-existing mapping).
    moved: Vec<Option<Lit>>,
    objectives: Vec<ObjectiveExpr>
}

impl PlacementEncoding {
    /// Writes the full encoding of `instance` into `sink`.
    /// `Err(Contradiction)` means the instance is trivially infeasible (some
    /// vm has no host left, or the pre-existing mapping alone exceeds the
    /// migration budget).
    pub fn encode<S: ConstraintSink>(instance: &Instance,
                                     config: EncoderConfig,
                                     sink: &mut S) -> Result<PlacementEncoding, Error> {
        let nb_hosts = instance.nb_hosts();
        let nb_vms = instance.nb_vms();

        // placement variables, skipping forbidden hosts
        let mut x: Vec<Vec<Option<Lit>>> = Vec::with_capacity(nb_vms);
        for vm in instance.vms() {
            let banned = |h: usize| {
                !config.drop_platform
                    && vm.forbidden.iter()
                        .filter_map(|id| instance.host_position(*id))
                        .any(|pos| pos == h)
            };
            let row = (0..nb_hosts)
                .map(|h| if banned(h) { None } else { Some(Lit::positive(sink.new_var())) })
                .collect::<Vec<_>>();
            x.push(row);
        }

        // host usage indicators: used(h) <-> some x(., h)
        let used = (0..nb_hosts)
            .map(|_| Lit::positive(sink.new_var()))
            .collect::<Vec<_>>();
        for h in 0..nb_hosts {
            let on_h = x.iter()
                .filter_map(|row| row[h])
                .collect::<Vec<_>>();
            for &lit in on_h.iter() {
                sink.add_clause(&[!lit, used[h]])?;
            }
            let mut back = vec![!used[h]];
            back.extend(on_h);
            sink.add_clause(&back)?;
        }

        // every vm runs somewhere, exactly once
        for row in x.iter() {
            let lits = row.iter().filter_map(|l| *l).collect::<Vec<_>>();
            if lits.is_empty() {
                return Err(Error::Contradiction);
            }
            sink.add_exactly(&lits, 1)?;
        }

        // capacities
        let demands = instance.vms()
            .map(|vm| (vm.cpu.clone(), vm.mem.clone()))
            .collect::<Vec<_>>();
        for (h, machine) in instance.machines.iter().enumerate() {
            for resource in 0..2 {
                let terms = x.iter()
                    .enumerate()
                    .filter_map(|(v, row)| row[h].map(|lit| {
                        let demand = if resource == 0 { &demands[v].0 } else { &demands[v].1 };
                        (BigInt::from(demand.clone()), lit)
                    }))
                    .collect::<Vec<_>>();
                let cap = if resource == 0 { &machine.cpu } else { &machine.mem };
                sink.add_pb_le(&terms, &BigInt::from(cap.clone()))?;
            }
        }

        // anti-colocation inside each job
        if !config.drop_anti_colocation {
            let mut flat = 0;
            for job in instance.jobs.iter() {
                let members = job.vms.iter()
                    .enumerate()
                    .filter(|(_, vm)| vm.anti_colocatable)
                    .map(|(i, _)| flat + i)
                    .collect::<Vec<_>>();
                for (i, &v1) in members.iter().enumerate() {
                    for &v2 in members[i + 1..].iter() {
                        for h in 0..nb_hosts {
                            if let (Some(a), Some(b)) = (x[v1][h], x[v2][h]) {
                                sink.add_clause(&[!a, !b])?;
                            }
                        }
                    }
                }
                flat += job.vms.len();
            }
        }

        // moved indicators and the migration budget
        let mut moved = vec![None; nb_vms];
        if instance.has_mappings() {
            let mut terms = vec![];
            let mut budget = BigInt::from(instance.migration_budget());
            for v in 0..nb_vms {
                let orig = match instance.original_host(v) {
                    None => continue,
                    Some(h) => h
                };
                match x[v][orig] {
                    Some(stay) => {
                        let m = Lit::positive(sink.new_var());
                        sink.add_clause(&[m, stay])?;
                        sink.add_clause(&[!m, !stay])?;
                        moved[v] = Some(m);
                        terms.push((BigInt::from(demands[v].1.clone()), m));
                    }
                    None => {
                        // the original host became forbidden: the move is
                        // unavoidable and eats into the budget up front
                        budget -= BigInt::from(demands[v].1.clone());
                    }
                }
            }
            if budget < BigInt::zero() {
                return Err(Error::Contradiction);
            }
            sink.add_pb_le(&terms, &budget)?;
        }

        // symmetry breaking between indistinguishable hosts
        if config.symmetry_breaking {
            let mut order = (0..nb_hosts).collect::<Vec<_>>();
            order.sort_by_key(|&h| {
                let m = &instance.machines[h];
                (m.cpu.clone(), m.mem.clone(), m.idle.clone(), m.max.clone())
            });
            for pair in order.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                let (ma, mb) = (&instance.machines[a], &instance.machines[b]);
                let identical = ma.cpu == mb.cpu && ma.mem == mb.mem
                    && ma.idle == mb.idle && ma.max == mb.max;
                if identical {
                    sink.add_clause(&[!used[b], used[a]])?;
                }
            }
        }

        let objectives = Self::build_objectives(instance, config, &x, &used, &moved);
        Ok(PlacementEncoding { nb_hosts, x, used, moved, objectives })
    }

    /// Builds the energy, wastage and (when applicable) migration objective
    /// expressions over the placement, usage and moved literals.
    fn build_objectives(instance: &Instance,
                        config: EncoderConfig,
                        x: &[Vec<Option<Lit>>],
                        used: &[Lit],
                        moved: &[Option<Lit>]) -> Vec<ObjectiveExpr> {
        let nb_hosts = instance.nb_hosts();
        let eps = BigRational::new(BigInt::one(), BigInt::from(nb_hosts as u64));
        let demands = instance.vms()
            .map(|vm| (vm.cpu.clone(), vm.mem.clone()))
            .collect::<Vec<_>>();

        // energy: sum_h idle_h used(h) + sum_{v,h} cpu_v span_h / cap_h x(v,h)
        let mut energy = vec![];
        for (h, machine) in instance.machines.iter().enumerate() {
            let span = rat(&machine.max) - rat(&machine.idle);
            energy.push((rat(&machine.idle), used[h]));
            for (v, row) in x.iter().enumerate() {
                if let Some(lit) = row[h] {
                    let coeff = if config.ignore_denominators {
                        rat(&demands[v].0) * &span
                    } else {
                        rat(&demands[v].0) * &span / rat(&machine.cpu)
                    };
                    if !coeff.is_zero() {
                        energy.push((coeff, lit));
                    }
                }
            }
        }
        let energy = ObjectiveExpr {
            name: "energy",
            ratios: vec![RatioExpr { numerator: energy, denominator: None }]
        };

        // wastage: one ratio per host; the numerator distributes the balance
        // spread |cpu_v/capC - mem_v/capM| over the placement literals and
        // adds the epsilon slack on the usage indicator; the denominator is
        // the summed normalised usage of the host
        let mut wastage = vec![];
        for (h, machine) in instance.machines.iter().enumerate() {
            let mut numerator = vec![(eps.clone(), used[h])];
            let mut denominator = vec![];
            for (v, row) in x.iter().enumerate() {
                if let Some(lit) = row[h] {
                    let share_cpu = rat(&demands[v].0) / rat(&machine.cpu);
                    let share_mem = rat(&demands[v].1) / rat(&machine.mem);
                    let spread = abs(&share_cpu - &share_mem);
                    if !spread.is_zero() {
                        numerator.push((spread, lit));
                    }
                    let usage = share_cpu + share_mem;
                    if !usage.is_zero() {
                        denominator.push((usage, lit));
                    }
                }
            }
            wastage.push(RatioExpr {
                numerator,
                denominator: if config.ignore_denominators { None } else { Some(denominator) }
            });
        }
        let wastage = ObjectiveExpr { name: "wastage", ratios: wastage };

        let mut objectives = vec![energy, wastage];

        // migration: the memory of every moved vm
        if instance.has_mappings() {
            let terms = moved.iter()
                .enumerate()
                .filter_map(|(v, m)| m.map(|lit| (rat(&demands[v].1), lit)))
                .collect::<Vec<_>>();
            objectives.push(ObjectiveExpr {
                name: "migration",
                ratios: vec![RatioExpr { numerator: terms, denominator: None }]
            });
        }
        objectives
    }

    // ------------------------------------------------------------------------
    // -- accessors -----------------------------------------------------------
    // ------------------------------------------------------------------------

    /// The objective expressions, in reporting order (energy, wastage, and
    /// migration when the instance has a pre-existing mapping).
    pub fn objectives(&self) -> &[ObjectiveExpr] {
        &self.objectives
    }
    /// The placement literal of `(vm, host)`, if that placement is allowed.
    pub fn placement(&self, vm: usize, host: usize) -> Option<Lit> {
        self.x[vm][host]
    }
    /// Every placement literal of the encoding, in (vm, host) order. This is
    /// the variable pool the xor hashes and diversification clauses range on.
    pub fn placement_lits(&self) -> Vec<Lit> {
        self.x.iter()
            .flat_map(|row| row.iter().filter_map(|l| *l))
            .collect()
    }
    /// The usage indicator of the given host.
    pub fn used_lit(&self, host: usize) -> Lit {
        self.used[host]
    }
    /// The moved indicator of the given vm, when it carries one.
    pub fn moved_lit(&self, vm: usize) -> Option<Lit> {
        self.moved[vm]
    }

    // ------------------------------------------------------------------------
    // -- model conversions ---------------------------------------------------
    // ------------------------------------------------------------------------

    /// Reads the placement back from the solver model. Only meaningful right
    /// after a `Sat` answer.
    pub fn decode<S: PbSolver>(&self, solver: &S) -> Assignment {
        let hosts = self.x.iter()
            .map(|row| {
                (0..self.nb_hosts)
                    .find(|&h| row[h].map(|l| solver.model_value(l)).unwrap_or(false))
                    .expect("model violates the exactly-one constraints")
            })
            .collect::<Vec<_>>();
        Assignment::new(hosts)
    }

    /// The literals describing exactly the given assignment: every allowed
    /// placement variable, in its model phase. Negating this conjunction
    /// blocks precisely this assignment.
    pub fn assignment_lits(&self, assignment: &Assignment) -> Vec<Lit> {
        let mut lits = vec![];
        for (v, row) in self.x.iter().enumerate() {
            for (h, lit) in row.iter().enumerate() {
                if let Some(lit) = lit {
                    lits.push(if assignment.hosts[v] == h { *lit } else { !*lit });
                }
            }
        }
        lits
    }

    /// The clause forbidding exactly the given assignment (the path
    /// diversification blocking clause).
    pub fn blocking_clause(&self, assignment: &Assignment) -> Vec<Lit> {
        self.assignment_lits(assignment).iter().map(|&l| !l).collect()
    }
}

fn rat(x: &BigUint) -> BigRational {
    BigRational::from_integer(BigInt::from(x.clone()))
}
fn abs(x: BigRational) -> BigRational {
    if x < BigRational::zero() { -x } else { x }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
