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

//! This module provides the guided improvement allocator (`GIA`): starting
//! from any feasible model, the inner loop repeatedly demands a model that is
//! no worse on every objective and strictly better on at least one, until
//! that demand becomes unsatisfiable and the current model is proved
//! Pareto-optimal. The point is then emitted, every model it dominates (or
//! ties) is blocked for good, and the outer loop restarts.
//!
//! The strict-improvement disjunction is encoded with activator literals:
//! each objective gets a selector implying its strictened bound through a
//! right-hand-side shift by the objective's maximum attainable sum, and one
//! clause requires some selector to hold.

use num_bigint::BigInt;
use num_traits::Zero;

use crate::abstraction::allocator::Allocator;
use crate::abstraction::sink::ConstraintSink;
use crate::abstraction::solver::PbSolver;
use crate::common::{ConstraintId, Error, Lit, Status};
use crate::implementation::encoder::PlacementEncoding;
use crate::implementation::sat::PbEngine;
use crate::instance::Instance;
use crate::solution::{Assignment, Population};

use super::frame::{rng_for, Frame};
use super::hashing::{integer_terms, model_cost, solve_with_hashes};
use super::AllocConfig;

// ----------------------------------------------------------------------------
// --- DOMINANCE CONSTRAINTS --------------------------------------------------
// ----------------------------------------------------------------------------

/// Posts "strictly better than `values` on at least one objective" over the
/// given integer objective forms. Removable when `removable`, permanent
/// otherwise; the returned identifiers are only meaningful in the former
/// case. Answers `None` when no objective can still be strictly improved
/// (the vector is the ideal point and dominates everything).
fn post_improvement<S: PbSolver>(solver: &mut S,
                                 objectives: &[Vec<(BigInt, Lit)>],
                                 values: &[BigInt],
                                 removable: bool)
    -> Result<Option<Vec<ConstraintId>>, Error>
{
    let mut ids = vec![];
    let mut selectors = vec![];
    for (terms, value) in objectives.iter().zip(values.iter()) {
        if value.is_zero() {
            continue; // a zero cost cannot strictly improve
        }
        let maxsum = terms.iter().map(|(c, _)| c).sum::<BigInt>();
        let target = value - 1;
        let shift: BigInt = &maxsum - &target;
        let selector = Lit::positive(solver.new_var());
        // selector => objective <= target, vacuous otherwise
        let mut shifted = terms.clone();
        shifted.push((shift.clone(), selector));
        let rhs = target + shift;
        if removable {
            ids.push(solver.add_removable_pb_le(&shifted, &rhs)?);
        } else {
            solver.add_pb_le(&shifted, &rhs)?;
        }
        selectors.push(selector);
    }
    if selectors.is_empty() {
        return Ok(None);
    }
    if removable {
        ids.push(solver.add_removable_clause(&selectors)?);
    } else {
        solver.add_clause(&selectors)?;
    }
    Ok(Some(ids))
}

// ----------------------------------------------------------------------------
// --- THE ALLOCATOR ----------------------------------------------------------
// ----------------------------------------------------------------------------
/// The guided improvement allocator.
pub struct GuidedImprovement<'a> {
    instance: &'a Instance,
    config: AllocConfig
}

impl <'a> GuidedImprovement<'a> {
    pub fn new(instance: &'a Instance, config: AllocConfig) -> Self {
        GuidedImprovement { instance, config }
    }
}

impl Allocator for GuidedImprovement<'_> {
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
        let objectives = encoding.objectives().iter()
            .map(integer_terms)
            .collect::<Vec<_>>();
        let lits = encoding.placement_lits();
        let mut hash_k = if self.config.hash_functions {
            Some(((lits.len() as f64).log2().ceil() as usize / 2).max(1))
        } else {
            None
        };

        'outer: while !frame.expired() {
            let status = match hash_k.as_mut() {
                Some(k) => solve_with_hashes(&mut solver, &frame, &lits, &mut rng, k),
                None => {
                    solver.set_timeout(Some(frame.remaining()));
                    solver.solve(&[])
                }
            };
            if status != Status::Sat {
                break;
            }
            let mut incumbent = encoding.decode(&solver);
            let mut values = objectives.iter()
                .map(|terms| model_cost(&solver, terms))
                .collect::<Vec<_>>();

            // dominance-tightening inner loop
            loop {
                if frame.expired() {
                    frame.record(&mut population, incumbent);
                    break 'outer;
                }
                let posted = post_improvement(&mut solver, &objectives, &values, true)?;
                let ids = match posted {
                    Some(ids) => ids,
                    None => {
                        // the ideal point: nothing can beat it, and it
                        // dominates every remaining model
                        frame.record(&mut population, incumbent);
                        break 'outer;
                    }
                };
                solver.set_timeout(Some(frame.remaining()));
                let status = solver.solve(&[]);
                for id in ids {
                    solver.remove(id);
                }
                match status {
                    Status::Sat => {
                        incumbent = encoding.decode(&solver);
                        values = objectives.iter()
                            .map(|terms| model_cost(&solver, terms))
                            .collect();
                    }
                    Status::Unsat => {
                        // the incumbent is Pareto-optimal: emit it and block
                        // everything it dominates or ties
                        frame.record(&mut population, incumbent);
                        if post_improvement(&mut solver, &objectives, &values, false)?
                            .is_none() {
                            break 'outer;
                        }
                        break;
                    }
                    Status::Unknown => {
                        // out of time mid-proof: keep the incumbent as a
                        // candidate, the population filters dominance
                        frame.record(&mut population, incumbent);
                        break 'outer;
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
mod test_gia {
    use super::*;
    use crate::common::Clock;
    use crate::instance::{Job, Mapping, PhysicalMachine, VirtualMachine};
    use crate::solution::Evaluator;
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
    fn config() -> AllocConfig {
        AllocConfig { clock: Clock::new(), timeout: 30, ..Default::default() }
    }

    #[test]
    fn the_trivial_instance_yields_its_single_placement() {
        let inst = Instance::new(
            vec![host(1, 10, 10, 50, 100)],
            vec![Job { id: 1, vms: vec![vm(1, 1, 10, 0)] }],
            vec![], 1.0);
        let mut alg = GuidedImprovement::new(&inst, config());
        let population = alg.allocate().unwrap();
        assert_eq!(1, population.len());
        let point = population.iter().next().unwrap();
        assert_eq!(BigRational::from_integer(100.into()), point.objectives.energy);
    }
    #[test]
    fn every_emitted_point_is_valid() {
        let inst = Instance::new(
            vec![host(0, 10, 10, 50, 100), host(1, 10, 10, 50, 100)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 6, 6), vm(0, 1, 6, 6)] }],
            vec![], 1.0);
        let eval = Evaluator::new(&inst, false);
        let mut alg = GuidedImprovement::new(&inst, config());
        let population = alg.allocate().unwrap();
        assert!(!population.is_empty());
        for point in population.iter() {
            assert!(eval.is_valid(&point.assignment));
            assert_ne!(point.assignment.hosts[0], point.assignment.hosts[1]);
        }
    }
    #[test]
    fn gia_respects_a_tight_migration_budget() {
        let inst = Instance::new(
            vec![host(0, 10, 5, 50, 100), host(1, 10, 5, 50, 100)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 2, 4)] }],
            vec![Mapping { job: 0, index: 0, host: 0 }],
            0.3);
        let mut alg = GuidedImprovement::new(&inst, config());
        let population = alg.allocate().unwrap();
        assert!(!population.is_empty());
        for point in population.iter() {
            assert_eq!(vec![0], point.assignment.hosts);
        }
    }
    #[test]
    fn an_infeasible_instance_yields_an_empty_population() {
        let inst = Instance::new(
            vec![host(0, 10, 10, 50, 100)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 11, 1)] }],
            vec![], 1.0);
        let mut alg = GuidedImprovement::new(&inst, config());
        assert!(alg.allocate().unwrap().is_empty());
    }
}
