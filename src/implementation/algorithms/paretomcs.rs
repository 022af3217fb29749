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

//! This module provides the Pareto-MCS allocators: Pareto-optimal models are
//! produced as complements of minimal correction subsets over the soft units
//! folded out of the objective expressions. Two extraction cores exist:
//!
//! - **CLD**: repeatedly asserts the disjunction of the still-falsified
//!   softs; every satisfying model hardens the newly satisfied ones (in
//!   decreasing weight, then ascending index) until the disjunction becomes
//!   unsatisfiable, at which point the falsified set is an MCS.
//! - **LBX**: walks the softs in one fixed pass, assuming each in turn;
//!   satisfiable softs are hardened, unsatisfiable ones join the MCS.
//!
//! After each MCS the current model is emitted as a Pareto candidate and the
//! MCS is blocked by requiring one of its members in every future model.
//! Stratification runs the core on the heaviest weight partition first and
//! merges the next partition when the active one is exhausted (or when the
//! per-partition conflict budget trips without progress); path
//! diversification additionally blocks each emitted placement vector.

use binary_heap_plus::BinaryHeap;
use compare::Compare;
use std::cmp::Ordering;

use crate::abstraction::allocator::Allocator;
use crate::abstraction::sink::ConstraintSink;
use crate::abstraction::solver::PbSolver;
use crate::common::{ConstraintId, Error, Lit, Status};
use crate::implementation::encoder::PlacementEncoding;
use crate::implementation::sat::PbEngine;
use crate::instance::Instance;
use crate::solution::{Assignment, Population};

use super::frame::{rng_for, Frame};
use super::hashing::solve_with_hashes;
use super::stratification::{nb_partitions, partition, soft_units, SoftUnit};
use super::AllocConfig;

// ----------------------------------------------------------------------------
// --- SOFT ORDERING ----------------------------------------------------------
// ----------------------------------------------------------------------------
/// Orders soft units by decreasing weight, ascending index on ties. This is
/// the hardening order of CLD and the pass order of LBX.
pub struct HeavyFirst;
impl Compare<SoftUnit> for HeavyFirst {
    fn compare(&self, a: &SoftUnit, b: &SoftUnit) -> Ordering {
        a.weight.cmp(&b.weight).then_with(|| b.index.cmp(&a.index))
    }
}

// ----------------------------------------------------------------------------
// --- MCS EXTRACTION ---------------------------------------------------------
// ----------------------------------------------------------------------------

/// The outcome of one MCS extraction. The removable hardenings are handed
/// back so the caller restores the solver before the next extraction.
enum Extraction {
    Done {
        best: Assignment,
        mcs: Vec<Lit>,
        hardened: Vec<ConstraintId>
    },
    TimedOut {
        hardened: Vec<ConstraintId>
    }
}

/// One CLD extraction, starting from the model the solver currently holds.
fn extract_cld<S: PbSolver>(solver: &mut S,
                            frame: &Frame,
                            encoding: &PlacementEncoding,
                            active: &[SoftUnit],
                            base: Assignment) -> Result<Extraction, Error> {
    solver.set_conflict_budget(None);
    let mut hardened = vec![];
    let mut best = base;

    // the softs the base model already satisfies are hardened up front
    let mut satisfied = BinaryHeap::from_vec_cmp(vec![], HeavyFirst);
    let mut unsatisfied = vec![];
    for soft in active {
        if solver.model_value(soft.lit) {
            satisfied.push(soft.clone());
        } else {
            unsatisfied.push(soft.clone());
        }
    }
    while let Some(soft) = satisfied.pop() {
        hardened.push(solver.add_removable_clause(&[soft.lit])?);
    }

    loop {
        if unsatisfied.is_empty() {
            return Ok(Extraction::Done { best, mcs: vec![], hardened });
        }
        if frame.expired() {
            return Ok(Extraction::TimedOut { hardened });
        }
        let disjunction = unsatisfied.iter().map(|s| s.lit).collect::<Vec<_>>();
        let disjunction_id = solver.add_removable_clause(&disjunction)?;
        solver.set_timeout(Some(frame.remaining()));
        let status = solver.solve(&[]);
        solver.remove(disjunction_id);
        match status {
            Status::Sat => {
                best = encoding.decode(solver);
                let mut newly = BinaryHeap::from_vec_cmp(vec![], HeavyFirst);
                unsatisfied.retain(|soft| {
                    if solver.model_value(soft.lit) {
                        newly.push(soft.clone());
                        false
                    } else {
                        true
                    }
                });
                while let Some(soft) = newly.pop() {
                    hardened.push(solver.add_removable_clause(&[soft.lit])?);
                }
            }
            Status::Unsat => {
                return Ok(Extraction::Done { best, mcs: disjunction, hardened });
            }
            Status::Unknown => {
                return Ok(Extraction::TimedOut { hardened });
            }
        }
    }
}

/// One LBX extraction: a single pass over the softs in `HeavyFirst` order.
fn extract_lbx<S: PbSolver>(solver: &mut S,
                            frame: &Frame,
                            encoding: &PlacementEncoding,
                            active: &[SoftUnit],
                            base: Assignment) -> Result<Extraction, Error> {
    solver.set_conflict_budget(None);
    let mut hardened = vec![];
    let mut mcs = vec![];
    let mut best = base;

    let mut order = active.to_vec();
    order.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.index.cmp(&b.index)));
    for soft in order {
        if frame.expired() {
            return Ok(Extraction::TimedOut { hardened });
        }
        solver.set_timeout(Some(frame.remaining()));
        match solver.solve(&[soft.lit]) {
            Status::Sat => {
                best = encoding.decode(solver);
                hardened.push(solver.add_removable_clause(&[soft.lit])?);
            }
            Status::Unsat => {
                mcs.push(soft.lit);
                hardened.push(solver.add_removable_clause(&[!soft.lit])?);
            }
            Status::Unknown => {
                return Ok(Extraction::TimedOut { hardened });
            }
        }
    }
    Ok(Extraction::Done { best, mcs, hardened })
}

// ----------------------------------------------------------------------------
// --- THE ALLOCATOR ----------------------------------------------------------
// ----------------------------------------------------------------------------
/// Which extraction core a `ParetoMcs` instance runs.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum McsCore {
    Cld,
    Lbx
}

/// The Pareto-MCS allocator (the `MCS`, `PCLD` and `PLBX` selectors).
pub struct ParetoMcs<'a> {
    instance: &'a Instance,
    config: AllocConfig,
    core: McsCore
}

impl <'a> ParetoMcs<'a> {
    pub fn new(instance: &'a Instance, config: AllocConfig, core: McsCore) -> Self {
        ParetoMcs { instance, config, core }
    }
}

impl Allocator for ParetoMcs<'_> {
    fn allocate(&mut self) -> Result<Population, Error> {
        let frame = Frame::new(self.instance, &self.config);
        let mut population = Population::new();
        let mut rng = rng_for(&self.config);

        let mut solver = PbEngine::new();
        let encoding = match PlacementEncoding::encode(
            self.instance, self.config.encoder, &mut solver) {
            Ok(encoding) => encoding,
            Err(Error::Contradiction) => {
                frame.comment("instance is infeasible");
                return Ok(population);
            }
            Err(other) => return Err(other)
        };

        let softs = soft_units(encoding.objectives());
        let mut parts = match self.config.stratification {
            None => vec![softs].into_iter(),
            Some(strategy) => {
                let nb = nb_partitions(&softs,
                                       self.config.partitions,
                                       self.config.literal_weight_ratio);
                frame.comment(&format!("stratifying the softs into {} partitions", nb));
                partition(softs, strategy, nb, &mut rng).into_iter()
            }
        };
        let mut active = parts.next().unwrap_or_default();

        let lits = encoding.placement_lits();
        let mut hash_k = if self.config.hash_functions {
            Some(((lits.len() as f64).log2().ceil() as usize / 2).max(1))
        } else {
            None
        };

        while !frame.expired() {
            // the per-partition conflict budget forces a merge when the base
            // model stops coming easily; it stops mattering once every
            // partition is in
            solver.set_conflict_budget(
                if parts.len() > 0 { self.config.part_max_conflicts } else { None });

            let status = match hash_k.as_mut() {
                Some(k) => solve_with_hashes(&mut solver, &frame, &lits, &mut rng, k),
                None => {
                    solver.set_timeout(Some(frame.remaining()));
                    solver.solve(&[])
                }
            };
            match status {
                Status::Unsat => {
                    // the active soft set is fully enumerated
                    match parts.next() {
                        Some(next) => {
                            frame.comment("merging the next weight partition");
                            active.extend(next);
                        }
                        None => break
                    }
                }
                Status::Unknown => {
                    if frame.expired() {
                        break;
                    }
                    match parts.next() {
                        Some(next) => {
                            frame.comment("conflict budget exhausted, merging early");
                            active.extend(next);
                        }
                        None => break
                    }
                }
                Status::Sat => {
                    let base = encoding.decode(&solver);
                    let extraction = match self.core {
                        McsCore::Cld => extract_cld(&mut solver, &frame, &encoding, &active, base)?,
                        McsCore::Lbx => extract_lbx(&mut solver, &frame, &encoding, &active, base)?
                    };
                    let (best, mcs) = match extraction {
                        Extraction::TimedOut { hardened } => {
                            for id in hardened {
                                solver.remove(id);
                            }
                            break;
                        }
                        Extraction::Done { best, mcs, hardened } => {
                            for id in hardened {
                                solver.remove(id);
                            }
                            (best, mcs)
                        }
                    };
                    frame.record(&mut population, best.clone());
                    if self.config.path_diversification
                        && solver.add_clause(&encoding.blocking_clause(&best)).is_err() {
                        break;
                    }
                    if mcs.is_empty() {
                        // the model satisfied every active soft: nothing lies
                        // below it in this partition
                        match parts.next() {
                            Some(next) => active.extend(next),
                            None => break
                        }
                    } else if solver.add_clause(&mcs).is_err() {
                        break;
                    }
                }
            }
        }
        Ok(population)
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_paretomcs {
    use super::*;
    use crate::common::Clock;
    use crate::instance::{Job, Mapping, PhysicalMachine, VirtualMachine};
    use crate::solution::Evaluator;
    use num_bigint::BigUint;
    use num_rational::BigRational;
    use crate::implementation::algorithms::stratification::StratStrategy;

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
    fn config() -> AllocConfig {
        AllocConfig { clock: Clock::new(), timeout: 30, ..Default::default() }
    }

    #[test]
    fn the_trivial_instance_yields_its_single_placement() {
        let inst = Instance::new(
            vec![host(1, 10, 10, 50, 100)],
            vec![Job { id: 1, vms: vec![vm(1, 1, 10, 0)] }],
            vec![], 1.0);
        let mut alg = ParetoMcs::new(&inst, config(), McsCore::Cld);
        let population = alg.allocate().unwrap();
        assert_eq!(1, population.len());
        let point = population.iter().next().unwrap();
        assert_eq!(vec![0], point.assignment.hosts);
        // the single host runs at full cpu load: maximum power draw
        assert_eq!(BigRational::from_integer(100.into()), point.objectives.energy);
    }
    #[test]
    fn capacity_tight_instances_split_the_vms() {
        let inst = Instance::new(
            vec![host(0, 10, 10, 50, 100), host(1, 10, 10, 50, 100)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 6, 6), vm(0, 1, 6, 6)] }],
            vec![], 1.0);
        for core in [McsCore::Cld, McsCore::Lbx] {
            let mut alg = ParetoMcs::new(&inst, config(), core);
            let population = alg.allocate().unwrap();
            assert!(!population.is_empty());
            for point in population.iter() {
                assert_ne!(point.assignment.hosts[0], point.assignment.hosts[1]);
            }
        }
    }
    #[test]
    fn anti_colocation_is_respected_by_every_emitted_point() {
        let mut a = vm(0, 0, 2, 2);
        let mut b = vm(0, 1, 2, 2);
        a.anti_colocatable = true;
        b.anti_colocatable = true;
        let inst = Instance::new(
            vec![host(0, 10, 10, 50, 100), host(1, 10, 10, 50, 100)],
            vec![Job { id: 0, vms: vec![a, b] }],
            vec![], 1.0);
        let mut alg = ParetoMcs::new(&inst, config(), McsCore::Cld);
        let population = alg.allocate().unwrap();
        assert!(!population.is_empty());
        for point in population.iter() {
            assert_ne!(point.assignment.hosts[0], point.assignment.hosts[1]);
        }
    }
    #[test]
    fn an_infeasible_instance_yields_an_empty_population() {
        let mut a = vm(0, 0, 2, 2);
        let mut b = vm(0, 1, 2, 2);
        a.anti_colocatable = true;
        b.anti_colocatable = true;
        let inst = Instance::new(
            vec![host(0, 10, 10, 50, 100)],
            vec![Job { id: 0, vms: vec![a, b] }],
            vec![], 1.0);
        let mut alg = ParetoMcs::new(&inst, config(), McsCore::Cld);
        assert!(alg.allocate().unwrap().is_empty());
    }
    #[test]
    fn a_tight_migration_budget_keeps_the_vm_home() {
        let inst = Instance::new(
            vec![host(0, 10, 5, 50, 100), host(1, 10, 5, 50, 100)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 2, 4)] }],
            vec![Mapping { job: 0, index: 0, host: 0 }],
            0.3);
        let mut alg = ParetoMcs::new(&inst, config(), McsCore::Cld);
        let population = alg.allocate().unwrap();
        assert!(!population.is_empty());
        for point in population.iter() {
            assert_eq!(vec![0], point.assignment.hosts);
        }
    }
    #[test]
    fn every_emitted_point_passes_the_validity_check() {
        let inst = Instance::new(
            vec![host(0, 8, 8, 40, 90), host(1, 10, 10, 50, 100), host(2, 6, 6, 30, 80)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 4, 3), vm(0, 1, 3, 4), vm(0, 2, 2, 2)] }],
            vec![], 1.0);
        let eval = Evaluator::new(&inst, false);
        for core in [McsCore::Cld, McsCore::Lbx] {
            let mut alg = ParetoMcs::new(&inst, config(), core);
            let population = alg.allocate().unwrap();
            assert!(!population.is_empty());
            for point in population.iter() {
                assert!(eval.is_valid(&point.assignment));
            }
        }
    }
    #[test]
    fn stratified_runs_reach_the_same_feasible_space() {
        let inst = Instance::new(
            vec![host(0, 10, 10, 50, 100), host(1, 10, 10, 50, 100)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 6, 6), vm(0, 1, 4, 4)] }],
            vec![], 1.0);
        let cfg = AllocConfig {
            stratification: Some(StratStrategy::Merged),
            partitions: Some(3),
            ..config()
        };
        let mut alg = ParetoMcs::new(&inst, cfg, McsCore::Cld);
        let population = alg.allocate().unwrap();
        assert!(!population.is_empty());
    }
    #[test]
    fn path_diversification_still_emits_only_valid_points() {
        let inst = Instance::new(
            vec![host(0, 10, 10, 50, 100), host(1, 10, 10, 50, 100)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 5, 5)] }],
            vec![], 1.0);
        let cfg = AllocConfig { path_diversification: true, ..config() };
        let eval = Evaluator::new(&inst, false);
        let mut alg = ParetoMcs::new(&inst, cfg, McsCore::Cld);
        let population = alg.allocate().unwrap();
        assert!(!population.is_empty());
        for point in population.iter() {
            assert!(eval.is_valid(&point.assignment));
        }
    }
}
