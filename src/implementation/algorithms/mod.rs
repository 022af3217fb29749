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

//! This module gathers the search algorithms of the crate, their shared run
//! configuration and the name-to-constructor dispatch the CLI selects them
//! through.

pub mod frame;
pub mod stratification;
pub mod paretomcs;
pub mod gia;
pub mod hashing;
pub mod pbo;
pub mod reducer;

use crate::abstraction::allocator::{Allocator, PackingSeeder};
use crate::common::{Clock, Error};
use crate::implementation::encoder::EncoderConfig;
use crate::implementation::heuristics::{BestFitDecreasing, FirstFitDecreasing};
use crate::instance::Instance;
use crate::solution::Population;

use self::frame::Frame;
use self::gia::GuidedImprovement;
use self::hashing::HashEnumeration;
use self::paretomcs::{McsCore, ParetoMcs};
use self::pbo::LinearSearch;
use self::stratification::StratStrategy;

// ----------------------------------------------------------------------------
// --- CONFIGURATION ----------------------------------------------------------
// ----------------------------------------------------------------------------
/// The run configuration every algorithm receives: one plain struct, built
/// once from the CLI options.
#[derive(Debug, Clone)]
pub struct AllocConfig {
    /// The clock anchoring this run (the multi-seed driver resets its copy
    /// between runs).
    pub clock: Clock,
    /// Wall-clock budget in seconds.
    pub timeout: u64,
    pub verbosity: u8,
    /// Seed of the run's random generator.
    pub seed: u64,
    /// Number of reseeded runs to merge (1 = a single run).
    pub multi_seed: u64,
    /// What the encoder emits (symmetry breaking, dropped constraint
    /// families, denominator handling on the allocation side).
    pub encoder: EncoderConfig,
    /// Evaluate (and report) the objectives without their denominators.
    pub ignore_denominators_eval: bool,
    /// Diversify the base models with random xor hash constraints.
    pub hash_functions: bool,
    /// Block every emitted placement vector (Pareto-MCS only).
    pub path_diversification: bool,
    /// Weight stratification of the soft units, when enabled.
    pub stratification: Option<StratStrategy>,
    /// Literal-to-weight ratio driving the derived partition count.
    pub literal_weight_ratio: Option<f64>,
    /// Fixed partition count (overrides the derived one).
    pub partitions: Option<usize>,
    /// Conflicts without progress before a partition merge is forced.
    pub part_max_conflicts: Option<u64>
}

impl Default for AllocConfig {
    fn default() -> AllocConfig {
        AllocConfig {
            clock: Clock::new(),
            timeout: 3600,
            verbosity: 0,
            seed: 42,
            multi_seed: 1,
            encoder: EncoderConfig::default(),
            ignore_denominators_eval: false,
            hash_functions: false,
            path_diversification: false,
            stratification: None,
            literal_weight_ratio: None,
            partitions: None,
            part_max_conflicts: None
        }
    }
}

// ----------------------------------------------------------------------------
// --- SEEDER-BACKED ALLOCATOR ------------------------------------------------
// ----------------------------------------------------------------------------
/// Wraps a deterministic packing heuristic as an allocator emitting its one
/// assignment (the `FFD` and `BFD` selectors).
pub struct SeederAllocator<'a> {
    instance: &'a Instance,
    config: AllocConfig,
    seeder: Box<dyn PackingSeeder>
}

impl <'a> SeederAllocator<'a> {
    pub fn new(instance: &'a Instance,
               config: AllocConfig,
               seeder: Box<dyn PackingSeeder>) -> Self {
        SeederAllocator { instance, config, seeder }
    }
}

impl Allocator for SeederAllocator<'_> {
    fn allocate(&mut self) -> Result<Population, Error> {
        let frame = Frame::new(self.instance, &self.config);
        let mut population = Population::new();
        match self.seeder.pack(self.instance) {
            Some(assignment) => {
                frame.record(&mut population, assignment);
            }
            None => frame.comment(&format!("{} found no packing", self.seeder.name()))
        }
        Ok(population)
    }
}

// ----------------------------------------------------------------------------
// --- DISPATCH ---------------------------------------------------------------
// ----------------------------------------------------------------------------
/// A constructor closure of the dispatch table.
pub type Constructor = for<'a> fn(&'a Instance, AllocConfig) -> Box<dyn Allocator + 'a>;

/// The name-to-constructor table of every built-in algorithm. `MCS` and
/// `PCLD` share the CLD core (`PCLD` is the default selector); `PLBX` runs
/// the linear core; `LS` minimises the aggregated objective sum while `PBO`
/// minimises energy alone.
pub fn registry() -> Vec<(&'static str, Constructor)> {
    fn pcld<'a>(i: &'a Instance, c: AllocConfig) -> Box<dyn Allocator + 'a> {
        Box::new(ParetoMcs::new(i, c, McsCore::Cld))
    }
    fn plbx<'a>(i: &'a Instance, c: AllocConfig) -> Box<dyn Allocator + 'a> {
        Box::new(ParetoMcs::new(i, c, McsCore::Lbx))
    }
    fn gia<'a>(i: &'a Instance, c: AllocConfig) -> Box<dyn Allocator + 'a> {
        Box::new(GuidedImprovement::new(i, c))
    }
    fn he<'a>(i: &'a Instance, c: AllocConfig) -> Box<dyn Allocator + 'a> {
        Box::new(HashEnumeration::new(i, c))
    }
    fn ls<'a>(i: &'a Instance, c: AllocConfig) -> Box<dyn Allocator + 'a> {
        Box::new(LinearSearch::aggregated(i, c))
    }
    fn pbo<'a>(i: &'a Instance, c: AllocConfig) -> Box<dyn Allocator + 'a> {
        Box::new(LinearSearch::energy_only(i, c))
    }
    fn ffd<'a>(i: &'a Instance, c: AllocConfig) -> Box<dyn Allocator + 'a> {
        Box::new(SeederAllocator::new(i, c, Box::new(FirstFitDecreasing)))
    }
    fn bfd<'a>(i: &'a Instance, c: AllocConfig) -> Box<dyn Allocator + 'a> {
        Box::new(SeederAllocator::new(i, c, Box::new(BestFitDecreasing)))
    }
    vec![
        ("PCLD", pcld as Constructor),
        ("PLBX", plbx as Constructor),
        ("MCS",  pcld as Constructor),
        ("GIA",  gia as Constructor),
        ("HE",   he as Constructor),
        ("LS",   ls as Constructor),
        ("PBO",  pbo as Constructor),
        ("FFD",  ffd as Constructor),
        ("BFD",  bfd as Constructor)
    ]
}

/// Looks an algorithm up by its (case-insensitive) selector name.
pub fn by_name<'a>(name: &str, instance: &'a Instance, config: AllocConfig)
    -> Option<Box<dyn Allocator + 'a>>
{
    registry().into_iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, build)| build(instance, config))
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
