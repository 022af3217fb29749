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

//! This module provides the shared frame every allocator runs inside: the
//! timeout clock, the progress log, the validity gate in front of the
//! population and the multi-seed driver.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::common::{Clock, Error};
use crate::instance::Instance;
use crate::solution::{Assignment, Evaluator, ParetoPoint, Population};

use super::{by_name, AllocConfig};

// ----------------------------------------------------------------------------
// --- FRAME ------------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The per-run context of an allocator: its clock, its verbosity and the
/// exact evaluator that gates the population. Every candidate assignment
/// passes the full hard-constraint validity check before it may enter the
/// population; every improving insertion prints one `c` progress line with
/// the elapsed time and the normalised objective vector.
pub struct Frame<'a> {
    clock: Clock,
    timeout: u64,
    verbosity: u8,
    evaluator: Evaluator<'a>
}

impl <'a> Frame<'a> {
    pub fn new(instance: &'a Instance, config: &AllocConfig) -> Frame<'a> {
        Frame {
            clock: config.clock,
            timeout: config.timeout,
            verbosity: config.verbosity,
            evaluator: Evaluator::new(instance, config.ignore_denominators_eval)
        }
    }

    /// The exact evaluator of this run.
    pub fn evaluator(&self) -> &Evaluator<'a> {
        &self.evaluator
    }
    /// The wall-clock time left for this run.
    pub fn remaining(&self) -> Duration {
        self.clock.remaining(self.timeout)
    }
    /// True iff this run has exhausted its wall-clock budget.
    pub fn expired(&self) -> bool {
        self.clock.is_expired(self.timeout)
    }

    /// Prints one `c` diagnostic line when the verbosity asks for it.
    pub fn comment(&self, message: &str) {
        if self.verbosity >= 1 {
            println!("c {}", message);
        }
    }

    /// Offers a candidate assignment to the population: it is evaluated
    /// exactly, checked against every hard constraint and inserted unless
    /// dominated. Answers true iff the population improved, in which case one
    /// progress line is printed.
    pub fn record(&self, population: &mut Population, assignment: Assignment) -> bool {
        if !self.evaluator.is_valid(&assignment) {
            return false;
        }
        let objectives = self.evaluator.evaluate(&assignment);
        let improved = population.insert(ParetoPoint { assignment, objectives });
        if improved && self.verbosity >= 1 {
            let last = population.iter().last().unwrap();
            let norm = last.objectives.normalized(&self.evaluator.reference_points());
            let rendered = norm.iter()
                .zip(["e", "w", "m"].iter())
                .map(|(v, k)| format!("{} {:.5}", k, v))
                .collect::<Vec<_>>()
                .join(" ");
            println!("c [{:>7.1}s] {}", self.clock.elapsed().as_secs_f64(), rendered);
        }
        improved
    }
}

// ----------------------------------------------------------------------------
// --- MULTI SEED DRIVER ------------------------------------------------------
// ----------------------------------------------------------------------------
/// Runs the named algorithm `config.multi_seed` times, reseeding the random
/// generator and resetting the clock between runs, and merges every run's
/// population into one non-dominated front.
pub fn run_multi_seed(name: &str, instance: &Instance, config: &AllocConfig)
    -> Result<Population, Error>
{
    let runs = config.multi_seed.max(1);
    let mut merged = Population::new();
    for run in 0..runs {
        let mut cfg = config.clone();
        cfg.seed = config.seed.wrapping_add(run);
        cfg.clock.reset();
        if config.verbosity >= 1 && runs > 1 {
            println!("c run {}/{} (seed {})", run + 1, runs, cfg.seed);
        }
        let mut allocator = by_name(name, instance, cfg)
            .ok_or(Error::NotSupported("unknown algorithm"))?;
        let population = allocator.allocate()?;
        for point in population.iter() {
            merged.insert(point.clone());
        }
    }
    Ok(merged)
}

/// The deterministic random generator of one run.
pub fn rng_for(config: &AllocConfig) -> StdRng {
    StdRng::seed_from_u64(config.seed)
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_frame {
    use super::*;
    use crate::instance::{Job, PhysicalMachine, VirtualMachine};
    use num_bigint::BigUint;

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
    fn valid_candidates_enter_the_population() {
        let instance = tiny();
        let config = AllocConfig::default();
        let frame = Frame::new(&instance, &config);
        let mut population = Population::new();
        assert!(frame.record(&mut population, Assignment::new(vec![0])));
        assert_eq!(1, population.len());
    }
    #[test]
    fn invalid_candidates_are_turned_away() {
        let instance = tiny();
        let config = AllocConfig::default();
        let frame = Frame::new(&instance, &config);
        let mut population = Population::new();
        // host index out of range
        assert!(!frame.record(&mut population, Assignment::new(vec![3])));
        assert!(population.is_empty());
    }
    #[test]
    fn duplicate_candidates_do_not_improve_the_population() {
        let instance = tiny();
        let config = AllocConfig::default();
        let frame = Frame::new(&instance, &config);
        let mut population = Population::new();
        assert!( frame.record(&mut population, Assignment::new(vec![0])));
        assert!(!frame.record(&mut population, Assignment::new(vec![0])));
    }
}
