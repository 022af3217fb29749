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

//! This module is the thin adapter an external evolutionary framework plugs
//! into: it exposes the encoded problem (variable and objective counts,
//! exact evaluation, normalisation, bounds-checked mutation), seeds initial
//! populations in the mode the framework selects, and decodes the
//! populations the external operators hand back. The operators themselves
//! (crossover, selection, variation) live outside this crate.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::implementation::heuristics::Packing;
use crate::instance::Instance;
use crate::solution::{Assignment, Evaluator, ObjectiveValues, Population, ReferencePoints};

// ----------------------------------------------------------------------------
// --- INITIALISATION MODES ---------------------------------------------------
// ----------------------------------------------------------------------------
/// The initialisation strategies the external framework selects through
/// `EvolutionAdapter::initial_population`. `Mixed` cycles through the other
/// four, one per member.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InitMode {
    Random,
    RandomPacking,
    ShuffledFirstFit,
    ShuffledVmcwm,
    Mixed
}

// ----------------------------------------------------------------------------
// --- ADAPTER ----------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The problem view handed to the evolutionary operators.
pub struct EvolutionAdapter<'a> {
    evaluator: Evaluator<'a>,
    references: ReferencePoints
}

impl <'a> EvolutionAdapter<'a> {
    pub fn new(instance: &'a Instance, ignore_denominators: bool) -> Self {
        let evaluator = Evaluator::new(instance, ignore_denominators);
        let references = evaluator.reference_points();
        EvolutionAdapter { evaluator, references }
    }

    /// One decision variable per vm (its host index).
    pub fn variable_count(&self) -> usize {
        self.evaluator.instance().nb_vms()
    }
    /// The upper bound (exclusive) of every decision variable.
    pub fn variable_bound(&self) -> usize {
        self.evaluator.instance().nb_hosts()
    }
    /// Two objectives, three when a pre-existing mapping exists.
    pub fn objective_count(&self) -> usize {
        if self.evaluator.instance().has_mappings() { 3 } else { 2 }
    }
    /// The exact objective vector of a candidate.
    pub fn evaluate(&self, candidate: &Assignment) -> ObjectiveValues {
        self.evaluator.evaluate(candidate)
    }
    /// The candidate's objective vector scaled into the unit cube.
    pub fn normalize(&self, candidate: &Assignment) -> Vec<f64> {
        self.evaluate(candidate).normalized(&self.references)
    }
    /// Reassigns one decision variable to a uniformly drawn host. Indexing a
    /// vm outside the problem is a programming error.
    pub fn mutate<R: Rng>(&self, candidate: &mut Assignment, vm: usize, rng: &mut R) {
        assert!(vm < candidate.len(), "mutation out of bounds: vm {}", vm);
        candidate.hosts[vm] = rng.gen_range(0..self.variable_bound());
    }

    /// Builds `size` initial members in the requested mode. `Random` draws
    /// uniform host vectors; the packing modes run a first-fit pass over
    /// randomised vm/host orders (`ShuffledVmcwm` additionally offers every
    /// mapped vm its original host first); `Mixed` cycles through all four.
    /// A member the greedy pass cannot finish feasibly is completed at
    /// random: the decoder filters such members out later.
    pub fn initial_population<R: Rng>(&self,
                                      mode: InitMode,
                                      size: usize,
                                      rng: &mut R) -> Vec<Assignment> {
        (0..size).map(|member| self.initial_member(mode, member, rng)).collect()
    }

    fn initial_member<R: Rng>(&self, mode: InitMode, member: usize, rng: &mut R)
        -> Assignment
    {
        let nb_vms = self.variable_count();
        let nb_hosts = self.variable_bound();
        let kind = match mode {
            InitMode::Random => 0,
            InitMode::RandomPacking => 1,
            InitMode::ShuffledFirstFit => 2,
            InitMode::ShuffledVmcwm => 3,
            InitMode::Mixed => member % 4
        };
        if kind == 0 {
            return Assignment::new(
                (0..nb_vms).map(|_| rng.gen_range(0..nb_hosts)).collect());
        }
        let mut vm_order = (0..nb_vms).collect::<Vec<_>>();
        let mut host_order = (0..nb_hosts).collect::<Vec<_>>();
        match kind {
            1 => {
                vm_order.shuffle(rng);
                host_order.shuffle(rng);
            }
            2 => host_order.shuffle(rng),
            _ => vm_order.shuffle(rng)
        }
        self.first_fit(&vm_order, &host_order, kind == 3, rng)
    }

    /// One greedy first-fit pass under the full placement rules (capacities,
    /// platform, anti-colocation, migration budget).
    fn first_fit<R: Rng>(&self,
                         vm_order: &[usize],
                         host_order: &[usize],
                         prefer_home: bool,
                         rng: &mut R) -> Assignment {
        let instance = self.evaluator.instance();
        let vms = instance.vms().collect::<Vec<_>>();
        let mut state = Packing::new(instance);
        let mut hosts = vec![0; vm_order.len()];
        for &v in vm_order {
            let vm = vms[v];
            let home = if prefer_home { instance.original_host(v) } else { None };
            let chosen = home.into_iter()
                .chain(host_order.iter().copied().filter(|h| Some(*h) != home))
                .find(|&h| state.fits(v, vm, h));
            match chosen {
                Some(h) => {
                    state.place(v, vm, h);
                    hosts[v] = h;
                }
                None => hosts[v] = rng.gen_range(0..host_order.len().max(1))
            }
        }
        Assignment::new(hosts)
    }

    /// Filters an external population down to its valid, non-dominated core
    /// (in the order the framework discovered the members).
    pub fn decode_population<I>(&self, candidates: I) -> Population
        where I: IntoIterator<Item = Assignment>
    {
        let mut population = Population::new();
        for assignment in candidates {
            if !self.evaluator.is_valid(&assignment) {
                continue;
            }
            let objectives = self.evaluator.evaluate(&assignment);
            population.insert(crate::solution::ParetoPoint { assignment, objectives });
        }
        population
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
