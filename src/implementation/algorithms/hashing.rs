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

//! This module provides the xor-hash machinery: removable parity constraints
//! over random subsets of the placement variables, the hash-diversified solve
//! used by the other algorithms when hash functions are enabled, and the
//! hash-based enumeration allocator itself.
//!
//! `k` random parity constraints split the solution space into `2^k` cells;
//! extracting one representative of the random cell and blocking it samples
//! the bounded-cost region with probabilistic coverage. `k` is halved when a
//! cell comes up empty and doubled after repeated extractions that bring
//! nothing new.

use num_bigint::BigInt;
use rand::rngs::StdRng;
use rand::Rng;

use crate::abstraction::allocator::Allocator;
use crate::abstraction::sink::ConstraintSink;
use crate::abstraction::solver::PbSolver;
use crate::common::{ConstraintId, Error, Lit, Status};
use crate::implementation::encoder::{ObjectiveExpr, PlacementEncoding};
use crate::implementation::sat::PbEngine;
use crate::implementation::utils::scale_to_integers;
use crate::instance::Instance;
use crate::solution::Population;

use super::frame::{rng_for, Frame};
use super::AllocConfig;

// ----------------------------------------------------------------------------
// --- REMOVABLE XOR CONSTRAINTS ----------------------------------------------
// ----------------------------------------------------------------------------

/// Adds `l_1 xor ... xor l_n = parity` as removable clauses (the same
/// balanced parity-gate tree as the permanent encoding) and returns every
/// identifier needed to take it out again.
pub fn add_removable_xor<S: PbSolver>(solver: &mut S, lits: &[Lit], parity: bool)
    -> Result<Vec<ConstraintId>, Error>
{
    assert!(!lits.is_empty(), "xor over no literal");
    let mut ids = vec![];
    let mut layer = lits.to_vec();
    while layer.len() > 1 {
        let mut next = vec![];
        for pair in layer.chunks(2) {
            if pair.len() == 1 {
                next.push(pair[0]);
                continue;
            }
            let (a, b) = (pair[0], pair[1]);
            let t = Lit::positive(solver.new_var());
            ids.push(solver.add_removable_clause(&[!t,  a,  b])?);
            ids.push(solver.add_removable_clause(&[!t, !a, !b])?);
            ids.push(solver.add_removable_clause(&[ t, !a,  b])?);
            ids.push(solver.add_removable_clause(&[ t,  a, !b])?);
            next.push(t);
        }
        layer = next;
    }
    let root = layer[0];
    ids.push(solver.add_removable_clause(&[if parity { root } else { !root }])?);
    Ok(ids)
}

/// Draws one random parity constraint over the given literal pool: every
/// literal joins with probability one half (resampling guarantees a
/// non-empty subset) and the parity is a fair coin.
fn random_xor<R: Rng>(lits: &[Lit], rng: &mut R) -> (Vec<Lit>, bool) {
    let mut subset = lits.iter()
        .copied()
        .filter(|_| rng.gen::<bool>())
        .collect::<Vec<_>>();
    if subset.is_empty() {
        subset.push(lits[rng.gen_range(0..lits.len())]);
    }
    (subset, rng.gen::<bool>())
}

/// Solves under `*k` random parity constraints, halving `*k` every time the
/// sampled cell comes up empty. With `*k == 0` this is a plain solve; an
/// `Unsat` answer then means the whole region is exhausted. The parity
/// constraints are removed again on every path, so after a `Sat` answer the
/// model is still readable and valid for the un-hashed formula.
pub fn solve_with_hashes<S: PbSolver, R: Rng>(solver: &mut S,
                                              frame: &Frame,
                                              lits: &[Lit],
                                              rng: &mut R,
                                              k: &mut usize) -> Status {
    loop {
        if *k == 0 || lits.is_empty() {
            solver.set_timeout(Some(frame.remaining()));
            return solver.solve(&[]);
        }
        let mut ids = vec![];
        for _ in 0..*k {
            let (subset, parity) = random_xor(lits, rng);
            match add_removable_xor(solver, &subset, parity) {
                Ok(mut fresh) => ids.append(&mut fresh),
                Err(_) => break
            }
        }
        solver.set_timeout(Some(frame.remaining()));
        let status = solver.solve(&[]);
        for id in ids {
            solver.remove(id);
        }
        match status {
            Status::Sat => return Status::Sat,
            Status::Unknown => return Status::Unknown,
            Status::Unsat => *k /= 2
        }
    }
}

// ----------------------------------------------------------------------------
// --- HASH-BASED ENUMERATION -------------------------------------------------
// ----------------------------------------------------------------------------
/// The `HE` allocator: finds one feasible model, bounds every objective by
/// that model's cost, then samples the bounded region cell by cell.
pub struct HashEnumeration<'a> {
    instance: &'a Instance,
    config: AllocConfig
}

impl <'a> HashEnumeration<'a> {
    pub fn new(instance: &'a Instance, config: AllocConfig) -> Self {
        HashEnumeration { instance, config }
    }
}

/// The integer form of an objective's linear terms, for bounding.
pub fn integer_terms(objective: &ObjectiveExpr) -> Vec<(BigInt, Lit)> {
    let linear = objective.linear();
    let coeffs = linear.iter().map(|(c, _)| c.clone()).collect::<Vec<_>>();
    let (ints, _) = scale_to_integers(&coeffs, &num_rational::BigRational::from_integer(0.into()));
    ints.into_iter()
        .zip(linear.iter().map(|(_, l)| *l))
        .collect()
}

/// The value of integer terms under the current model.
pub fn model_cost<S: PbSolver>(solver: &S, terms: &[(BigInt, Lit)]) -> BigInt {
    terms.iter()
        .filter(|(_, l)| solver.model_value(*l))
        .map(|(c, _)| c.clone())
        .sum()
}

impl Allocator for HashEnumeration<'_> {
    fn allocate(&mut self) -> Result<Population, Error> {
        let frame = Frame::new(self.instance, &self.config);
        let mut population = Population::new();
        let mut rng: StdRng = rng_for(&self.config);

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

        // one feasible model fixes the cost bounds of the sampled region
        solver.set_timeout(Some(frame.remaining()));
        if solver.solve(&[]) != Status::Sat {
            return Ok(population);
        }
        let first = encoding.decode(&solver);
        let bounds = encoding.objectives().iter()
            .map(|o| {
                let terms = integer_terms(o);
                let value = model_cost(&solver, &terms);
                (terms, value)
            })
            .collect::<Vec<_>>();
        for (terms, value) in bounds.iter() {
            solver.add_pb_le(terms, value)?;
        }
        if let Err(Error::Contradiction) = solver.add_clause(&encoding.blocking_clause(&first)) {
            frame.record(&mut population, first);
            return Ok(population);
        }
        frame.record(&mut population, first);

        let lits = encoding.placement_lits();
        let mut k = ((lits.len() as f64).log2().ceil() as usize / 2).max(1);
        let mut stale = 0;
        while !frame.expired() {
            match solve_with_hashes(&mut solver, &frame, &lits, &mut rng, &mut k) {
                Status::Sat => {
                    let sampled = encoding.decode(&solver);
                    if solver.add_clause(&encoding.blocking_clause(&sampled)).is_err() {
                        frame.record(&mut population, sampled);
                        break;
                    }
                    if frame.record(&mut population, sampled) {
                        stale = 0;
                    } else {
                        stale += 1;
                        if stale >= 2 {
                            k = (k * 2).max(1).min(lits.len());
                            stale = 0;
                        }
                    }
                }
                _ => break
            }
        }
        Ok(population)
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
