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

//! This module provides the single-objective pseudo-Boolean optimisation:
//! the linear SAT-UNSAT search that repeatedly tightens an upper bound on a
//! linear objective until unsatisfiability proves optimality, invoking a
//! new-best callback on every improving model. The heuristic reducer and the
//! `LS` / `PBO` algorithm selectors all drive it.

use num_bigint::BigInt;
use num_traits::Zero;

use crate::abstraction::allocator::Allocator;
use crate::abstraction::solver::PbSolver;
use crate::common::{ConstraintId, Error, Lit, Status};
use crate::implementation::encoder::PlacementEncoding;
use crate::implementation::sat::PbEngine;
use crate::implementation::utils::scale_to_integers;
use crate::instance::Instance;
use crate::solution::Population;

use super::frame::Frame;
use super::hashing::model_cost;
use super::AllocConfig;

// ----------------------------------------------------------------------------
// --- OUTCOME ----------------------------------------------------------------
// ----------------------------------------------------------------------------
/// How a minimisation run ended.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PboOutcome {
    /// Unsatisfiability under the tightened bound proved this value optimal.
    Optimal(BigInt),
    /// The budgets ran out; this is the best value found so far.
    BestSoFar(BigInt),
    /// No model exists at all.
    Infeasible,
    /// The budgets ran out before any model was found.
    Unknown
}

// ----------------------------------------------------------------------------
// --- LINEAR OPTIMISER -------------------------------------------------------
// ----------------------------------------------------------------------------
/// Minimises one linear pseudo-Boolean objective over the given solver by
/// linear SAT-UNSAT search. Assumption literals are not part of the
/// contract: passing any fails fast.
pub struct LinearOptimizer<'s, S: PbSolver> {
    solver: &'s mut S,
    terms: Vec<(BigInt, Lit)>
}

impl <'s, S: PbSolver> LinearOptimizer<'s, S> {
    pub fn new(solver: &'s mut S, terms: Vec<(BigInt, Lit)>) -> Self {
        LinearOptimizer { solver, terms }
    }

    /// Runs the minimisation under the frame's wall clock. `on_new_best` is
    /// invoked with the solver (holding the improving model) and the new
    /// objective value, once per improvement.
    pub fn minimize<F>(&mut self,
                       assumptions: &[Lit],
                       frame: &Frame,
                       mut on_new_best: F) -> Result<PboOutcome, Error>
        where F: FnMut(&S, &BigInt)
    {
        if !assumptions.is_empty() {
            return Err(Error::NotSupported("assumptions into the linear optimiser"));
        }
        let mut best: Option<BigInt> = None;
        let mut bounds: Vec<ConstraintId> = vec![];
        let outcome = loop {
            if frame.expired() {
                break match best.take() {
                    Some(value) => PboOutcome::BestSoFar(value),
                    None => PboOutcome::Unknown
                };
            }
            self.solver.set_timeout(Some(frame.remaining()));
            match self.solver.solve(&[]) {
                Status::Sat => {
                    let value = model_cost(&*self.solver, &self.terms);
                    on_new_best(&*self.solver, &value);
                    if value.is_zero() {
                        // non-negative coefficients: nothing beats zero
                        break PboOutcome::Optimal(value);
                    }
                    match self.solver.add_removable_pb_le(&self.terms, &(&value - 1)) {
                        Ok(id) => bounds.push(id),
                        Err(Error::Contradiction) => break PboOutcome::Optimal(value),
                        Err(other) => return Err(other)
                    }
                    best = Some(value);
                }
                Status::Unsat => {
                    break match best.take() {
                        Some(value) => PboOutcome::Optimal(value),
                        None => PboOutcome::Infeasible
                    };
                }
                Status::Unknown => {
                    break match best.take() {
                        Some(value) => PboOutcome::BestSoFar(value),
                        None => PboOutcome::Unknown
                    };
                }
            }
        };
        // leave the solver the way we found it
        for id in bounds {
            self.solver.remove(id);
        }
        Ok(outcome)
    }
}

// ----------------------------------------------------------------------------
// --- SINGLE-OBJECTIVE ALLOCATORS --------------------------------------------
// ----------------------------------------------------------------------------
/// The `LS` and `PBO` selectors: a linear search over one scalar objective.
/// `LS` minimises the plain sum of every objective's numerator terms; `PBO`
/// minimises the energy objective alone. Every improving model goes through
/// the population gate, so the answer is the trajectory's non-dominated
/// front (usually a single point).
pub struct LinearSearch<'a> {
    instance: &'a Instance,
    config: AllocConfig,
    /// true: aggregate every objective; false: energy only
    merged: bool
}

impl <'a> LinearSearch<'a> {
    pub fn aggregated(instance: &'a Instance, config: AllocConfig) -> Self {
        LinearSearch { instance, config, merged: true }
    }
    pub fn energy_only(instance: &'a Instance, config: AllocConfig) -> Self {
        LinearSearch { instance, config, merged: false }
    }
}

impl Allocator for LinearSearch<'_> {
    fn allocate(&mut self) -> Result<Population, Error> {
        let frame = Frame::new(self.instance, &self.config);
        let mut population = Population::new();

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

        let rational = if self.merged {
            encoding.objectives().iter()
                .flat_map(|o| o.linear())
                .collect::<Vec<_>>()
        } else {
            encoding.objectives()[0].linear()
        };
        let coeffs = rational.iter().map(|(c, _)| c.clone()).collect::<Vec<_>>();
        let (ints, _) = scale_to_integers(&coeffs,
                                          &num_rational::BigRational::zero());
        let terms = ints.into_iter()
            .zip(rational.iter().map(|(_, l)| *l))
            .collect::<Vec<_>>();

        let mut optimizer = LinearOptimizer::new(&mut solver, terms);
        let outcome = optimizer.minimize(&[], &frame, |engine, _value| {
            let assignment = encoding.decode(engine);
            frame.record(&mut population, assignment);
        })?;
        match outcome {
            PboOutcome::Optimal(_) => frame.comment("optimum proved"),
            PboOutcome::BestSoFar(_) => frame.comment("timeout, best so far kept"),
            PboOutcome::Infeasible => frame.comment("instance is infeasible"),
            PboOutcome::Unknown => frame.comment("timeout before any model")
        }
        Ok(population)
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_pbo {
    use super::*;
    use crate::abstraction::sink::ConstraintSink;
    use crate::common::Clock;
    use crate::instance::{Job, PhysicalMachine, VirtualMachine};
    use num_bigint::BigUint;

    fn frame_for<'a>(instance: &'a Instance, config: &AllocConfig) -> Frame<'a> {
        Frame::new(instance, config)
    }
    fn tiny() -> Instance {
        Instance::new(
            vec![PhysicalMachine {
                id: 0,
                cpu: BigUint::from(10_u32), mem: BigUint::from(10_u32),
                idle: BigUint::from(50_u32), max: BigUint::from(100_u32)
            }],
            vec![Job {
                id: 0,
                vms: vec![VirtualMachine {
                    job: 0, index: 0,
                    cpu: BigUint::from(5_u32), mem: BigUint::from(5_u32),
                    anti_colocatable: false, forbidden: vec![]
                }]
            }],
            vec![], 1.0)
    }

    #[test]
    fn the_optimum_of_a_weighted_exactly_one_is_the_cheapest_literal() {
        let instance = tiny();
        let config = AllocConfig { clock: Clock::new(), timeout: 30, ..Default::default() };
        let frame = frame_for(&instance, &config);

        let mut solver = PbEngine::new();
        let lits = (0..3)
            .map(|_| Lit::positive(solver.new_var()))
            .collect::<Vec<_>>();
        solver.add_exactly(&lits, 1).unwrap();
        let terms = vec![
            (BigInt::from(5), lits[0]),
            (BigInt::from(2), lits[1]),
            (BigInt::from(9), lits[2])
        ];
        let mut improvements = vec![];
        let mut optimizer = LinearOptimizer::new(&mut solver, terms);
        let outcome = optimizer.minimize(&[], &frame, |_, value| {
            improvements.push(value.clone());
        }).unwrap();
        assert_eq!(PboOutcome::Optimal(BigInt::from(2)), outcome);
        assert_eq!(Some(&BigInt::from(2)), improvements.last());
        // values improve monotonically
        assert!(improvements.windows(2).all(|w| w[1] < w[0]));
    }
    #[test]
    fn assumptions_into_the_optimiser_fail_fast() {
        let instance = tiny();
        let config = AllocConfig { clock: Clock::new(), timeout: 30, ..Default::default() };
        let frame = frame_for(&instance, &config);

        let mut solver = PbEngine::new();
        let x = Lit::positive(solver.new_var());
        let mut optimizer = LinearOptimizer::new(&mut solver, vec![(BigInt::from(1), x)]);
        let r = optimizer.minimize(&[x], &frame, |_, _| {});
        assert!(matches!(r, Err(Error::NotSupported(_))));
    }
    #[test]
    fn an_unsatisfiable_formula_is_reported_infeasible() {
        let instance = tiny();
        let config = AllocConfig { clock: Clock::new(), timeout: 30, ..Default::default() };
        let frame = frame_for(&instance, &config);

        let mut solver = PbEngine::new();
        let x = Lit::positive(solver.new_var());
        solver.add_clause(&[x]).unwrap();
        solver.add_clause(&[!x]).unwrap();
        let mut optimizer = LinearOptimizer::new(&mut solver, vec![(BigInt::from(1), x)]);
        let outcome = optimizer.minimize(&[], &frame, |_, _| {}).unwrap();
        assert_eq!(PboOutcome::Infeasible, outcome);
    }
    #[test]
    fn linear_search_allocators_emit_valid_populations() {
        let instance = Instance::new(
            vec![
                PhysicalMachine {
                    id: 0,
                    cpu: BigUint::from(10_u32), mem: BigUint::from(10_u32),
                    idle: BigUint::from(50_u32), max: BigUint::from(100_u32)
                },
                PhysicalMachine {
                    id: 1,
                    cpu: BigUint::from(10_u32), mem: BigUint::from(10_u32),
                    idle: BigUint::from(50_u32), max: BigUint::from(100_u32)
                }
            ],
            vec![Job {
                id: 0,
                vms: vec![
                    VirtualMachine {
                        job: 0, index: 0,
                        cpu: BigUint::from(6_u32), mem: BigUint::from(6_u32),
                        anti_colocatable: false, forbidden: vec![]
                    },
                    VirtualMachine {
                        job: 0, index: 1,
                        cpu: BigUint::from(6_u32), mem: BigUint::from(6_u32),
                        anti_colocatable: false, forbidden: vec![]
                    }
                ]
            }],
            vec![], 1.0);
        let config = AllocConfig { clock: Clock::new(), timeout: 30, ..Default::default() };
        let mut ls = LinearSearch::aggregated(&instance, config.clone());
        let population = ls.allocate().unwrap();
        assert!(!population.is_empty());
        for point in population.iter() {
            assert_ne!(point.assignment.hosts[0], point.assignment.hosts[1]);
        }
        let mut pbo = LinearSearch::energy_only(&instance, config);
        assert!(!pbo.allocate().unwrap().is_empty());
    }
}
