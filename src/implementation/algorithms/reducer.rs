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

//! This module provides the heuristic reduction: a deterministic bin-packing
//! seed identifies the hosts an allocation can realistically live on, the
//! instance is shrunk to those hosts and the exact search runs on the
//! (much smaller) reduced instance.
//!
//! The migration budget travels with the reduction: the fractional budget
//! first pays for every vm whose original host was dropped (those moves are
//! unavoidable), then is rescaled from the full memory pool to the surviving
//! one and clipped back into the unit interval. Every solution of the
//! reduced instance is checked against the *original* instance before it is
//! emitted, so the reduction can narrow the search space but never corrupt
//! the answer.

use num_rational::BigRational;
use num_traits::{ToPrimitive, Zero};

use crate::abstraction::allocator::PackingSeeder;
use crate::common::Error;
use crate::instance::Instance;
use crate::solution::{Assignment, Population};

use super::frame::{run_multi_seed, Frame};
use super::AllocConfig;

// ----------------------------------------------------------------------------
// --- REDUCTION --------------------------------------------------------------
// ----------------------------------------------------------------------------

/// The outcome of a reduction: the shrunk instance and, for every host of
/// the shrunk instance, its position in the original one.
pub struct Reduction {
    pub instance: Instance,
    pub kept: Vec<usize>
}

/// Shrinks the instance onto the hosts used by the seeder's packing.
/// Fails with `HeuristicReductionFailed` when the seeder finds no
/// assignment.
pub fn reduce(instance: &Instance, seeder: &dyn PackingSeeder) -> Result<Reduction, Error> {
    let seed = seeder.pack(instance).ok_or(Error::HeuristicReductionFailed)?;
    let mut kept = seed.hosts.clone();
    kept.sort_unstable();
    kept.dedup();

    // the budget first absorbs the moves the reduction makes unavoidable,
    // then is rescaled onto the surviving memory pool
    let total_mem = BigRational::from_integer(instance.total_mem().into());
    let mut fraction = BigRational::from_float(instance.budget_fraction)
        .unwrap_or_else(BigRational::zero);
    if instance.has_mappings() {
        for (v, vm) in instance.vms().enumerate() {
            if let Some(orig) = instance.original_host(v) {
                if !kept.contains(&orig) {
                    fraction -= BigRational::from_integer(vm.mem.clone().into()) / &total_mem;
                }
            }
        }
    }
    let kept_mem = kept.iter()
        .map(|&h| BigRational::from_integer(instance.machines[h].mem.clone().into()))
        .sum::<BigRational>();
    let rescaled = if kept_mem.is_zero() || total_mem.is_zero() {
        BigRational::zero()
    } else {
        fraction * &total_mem / &kept_mem
    };
    let fraction = rescaled.to_f64().unwrap_or(0.0).clamp(0.0, 1.0);

    let machines = kept.iter()
        .map(|&h| instance.machines[h].clone())
        .collect::<Vec<_>>();
    let mappings = instance.mappings.iter()
        .filter(|m| {
            instance.host_position(m.host)
                .map(|pos| kept.contains(&pos))
                .unwrap_or(false)
        })
        .copied()
        .collect::<Vec<_>>();
    let reduced = Instance::new(machines, instance.jobs.clone(), mappings, fraction);
    Ok(Reduction { instance: reduced, kept })
}

/// Lifts an assignment of the reduced instance back onto the original hosts.
pub fn expand(assignment: &Assignment, kept: &[usize]) -> Assignment {
    Assignment::new(assignment.hosts.iter().map(|&h| kept[h]).collect())
}

/// Runs the named algorithm behind a reduction: seed, shrink, search the
/// reduced instance, lift every point back and re-check it against the
/// original instance.
pub fn run_reduced(name: &str,
                   instance: &Instance,
                   config: &AllocConfig,
                   seeder: &dyn PackingSeeder) -> Result<Population, Error> {
    let reduction = reduce(instance, seeder)?;
    if config.verbosity >= 1 {
        println!("c {} reduction kept {}/{} hosts",
                 seeder.name(), reduction.kept.len(), instance.nb_hosts());
    }
    let inner = run_multi_seed(name, &reduction.instance, config)?;

    let frame = Frame::new(instance, config);
    let mut population = Population::new();
    for point in inner.iter() {
        frame.record(&mut population, expand(&point.assignment, &reduction.kept));
    }
    Ok(population)
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
