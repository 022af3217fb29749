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

//! This module provides the deterministic bin-packing heuristics: first-fit
//! decreasing and best-fit decreasing. They seed the heuristic reducer and
//! double as the `FFD` / `BFD` algorithm selectors.
//!
//! Both walk the vms in decreasing total demand and respect every hard
//! constraint of the instance (capacities, platform, anti-colocation and the
//! migration budget). A vm carrying a pre-existing mapping is offered its
//! original host first, which keeps the migration cost of the seed low.

use std::cmp::Reverse;

use metrohash::MetroHashSet;
use num_bigint::BigUint;
use num_traits::Zero;

use crate::abstraction::allocator::PackingSeeder;
use crate::instance::{Instance, VirtualMachine};
use crate::solution::Assignment;

// ----------------------------------------------------------------------------
// --- PACKING STATE ----------------------------------------------------------
// ----------------------------------------------------------------------------

/// The incremental placement state shared by the packers (and by the
/// evolutionary adapter's seeded initialisation): remaining capacities, the
/// anti-colocation occupancy and the consumed migration budget.
pub(crate) struct Packing<'a> {
    instance: &'a Instance,
    rem_cpu: Vec<BigUint>,
    rem_mem: Vec<BigUint>,
    /// (host, job) pairs already carrying an anti-colocatable vm of that job
    anti: MetroHashSet<(usize, usize)>,
    moved: BigUint,
    budget: BigUint
}

impl <'a> Packing<'a> {
    pub(crate) fn new(instance: &'a Instance) -> Packing<'a> {
        Packing {
            instance,
            rem_cpu: instance.machines.iter().map(|m| m.cpu.clone()).collect(),
            rem_mem: instance.machines.iter().map(|m| m.mem.clone()).collect(),
            anti: MetroHashSet::default(),
            moved: BigUint::zero(),
            budget: instance.migration_budget()
        }
    }

    /// True iff vm `v` may be placed on host `h` in the current state.
    pub(crate) fn fits(&self, v: usize, vm: &VirtualMachine, h: usize) -> bool {
        if self.rem_cpu[h] < vm.cpu || self.rem_mem[h] < vm.mem {
            return false;
        }
        let banned = vm.forbidden.iter()
            .filter_map(|id| self.instance.host_position(*id))
            .any(|pos| pos == h);
        if banned {
            return false;
        }
        if vm.anti_colocatable && self.anti.contains(&(h, vm.job)) {
            return false;
        }
        if let Some(orig) = self.instance.original_host(v) {
            if orig != h && &self.moved + &vm.mem > self.budget {
                return false;
            }
        }
        true
    }

    pub(crate) fn place(&mut self, v: usize, vm: &VirtualMachine, h: usize) {
        self.rem_cpu[h] -= &vm.cpu;
        self.rem_mem[h] -= &vm.mem;
        if vm.anti_colocatable {
            self.anti.insert((h, vm.job));
        }
        if let Some(orig) = self.instance.original_host(v) {
            if orig != h {
                self.moved += &vm.mem;
            }
        }
    }

    /// The hosts to try for vm `v`, in preference order: its original host
    /// first (if any), then every host in position order.
    fn candidates(&self, v: usize) -> Vec<usize> {
        let preferred = self.instance.original_host(v);
        let mut order = vec![];
        order.extend(preferred);
        order.extend((0..self.instance.nb_hosts()).filter(|h| Some(*h) != preferred));
        order
    }
}

/// The vms in packing order: decreasing total demand, flat index breaking
/// ties (which keeps both heuristics deterministic).
fn decreasing_demand(instance: &Instance) -> Vec<(usize, &VirtualMachine)> {
    let mut vms = instance.vms().enumerate().collect::<Vec<_>>();
    vms.sort_by_key(|(v, vm)| (Reverse(&vm.cpu + &vm.mem), *v));
    vms
}

// ----------------------------------------------------------------------------
// --- FIRST FIT DECREASING ---------------------------------------------------
// ----------------------------------------------------------------------------
/// Places every vm on the first host it fits on.
#[derive(Default, Debug, Clone, Copy)]
pub struct FirstFitDecreasing;
impl PackingSeeder for FirstFitDecreasing {
    fn name(&self) -> &'static str {
        "FFD"
    }
    fn pack(&self, instance: &Instance) -> Option<Assignment> {
        let mut state = Packing::new(instance);
        let mut hosts = vec![0; instance.nb_vms()];
        for (v, vm) in decreasing_demand(instance) {
            let chosen = state.candidates(v)
                .into_iter()
                .find(|&h| state.fits(v, vm, h))?;
            state.place(v, vm, chosen);
            hosts[v] = chosen;
        }
        Some(Assignment::new(hosts))
    }
}

// ----------------------------------------------------------------------------
// --- BEST FIT DECREASING ----------------------------------------------------
// ----------------------------------------------------------------------------
/// Places every vm on the fitting host left with the least slack, which packs
/// the hosts tightly and tends to switch fewer of them on.
#[derive(Default, Debug, Clone, Copy)]
pub struct BestFitDecreasing;
impl PackingSeeder for BestFitDecreasing {
    fn name(&self) -> &'static str {
        "BFD"
    }
    fn pack(&self, instance: &Instance) -> Option<Assignment> {
        let mut state = Packing::new(instance);
        let mut hosts = vec![0; instance.nb_vms()];
        for (v, vm) in decreasing_demand(instance) {
            let chosen = state.candidates(v)
                .into_iter()
                .filter(|&h| state.fits(v, vm, h))
                .min_by_key(|&h| {
                    (&state.rem_cpu[h] - &vm.cpu) + (&state.rem_mem[h] - &vm.mem)
                })?;
            state.place(v, vm, chosen);
            hosts[v] = chosen;
        }
        Some(Assignment::new(hosts))
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_packing {
    use super::*;
    use crate::instance::{Job, Mapping, PhysicalMachine};
    use crate::solution::Evaluator;

    fn host(id: usize, cpu: u32, mem: u32) -> PhysicalMachine {
        PhysicalMachine {
            id,
            cpu: BigUint::from(cpu), mem: BigUint::from(mem),
            idle: BigUint::from(50_u32), max: BigUint::from(100_u32)
        }
    }
    fn vm(job: usize, index: usize, cpu: u32, mem: u32) -> VirtualMachine {
        VirtualMachine {
            job, index,
            cpu: BigUint::from(cpu), mem: BigUint::from(mem),
            anti_colocatable: false, forbidden: vec![]
        }
    }

    fn seeders() -> Vec<Box<dyn PackingSeeder>> {
        vec![Box::new(FirstFitDecreasing), Box::new(BestFitDecreasing)]
    }

    #[test]
    fn packings_of_a_feasible_instance_pass_the_validity_check() {
        let inst = Instance::new(
            vec![host(0, 10, 10), host(1, 10, 10)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 6, 6), vm(0, 1, 6, 6), vm(0, 2, 4, 4)] }],
            vec![], 1.0);
        let eval = Evaluator::new(&inst, false);
        for seeder in seeders() {
            let packed = seeder.pack(&inst).expect(seeder.name());
            assert!(eval.is_valid(&packed), "{}", seeder.name());
        }
    }
    #[test]
    fn an_overfull_instance_cannot_be_packed() {
        let inst = Instance::new(
            vec![host(0, 10, 10)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 6, 6), vm(0, 1, 6, 6)] }],
            vec![], 1.0);
        for seeder in seeders() {
            assert!(seeder.pack(&inst).is_none(), "{}", seeder.name());
        }
    }
    #[test]
    fn anti_colocatable_vms_are_split() {
        let mut a = vm(0, 0, 2, 2);
        let mut b = vm(0, 1, 2, 2);
        a.anti_colocatable = true;
        b.anti_colocatable = true;
        let inst = Instance::new(
            vec![host(0, 10, 10), host(1, 10, 10)],
            vec![Job { id: 0, vms: vec![a, b] }],
            vec![], 1.0);
        for seeder in seeders() {
            let packed = seeder.pack(&inst).expect(seeder.name());
            assert_ne!(packed.hosts[0], packed.hosts[1], "{}", seeder.name());
        }
    }
    #[test]
    fn forbidden_hosts_are_avoided() {
        let mut banned = vm(0, 0, 2, 2);
        banned.forbidden = vec![0];
        let inst = Instance::new(
            vec![host(0, 10, 10), host(1, 10, 10)],
            vec![Job { id: 0, vms: vec![banned] }],
            vec![], 1.0);
        for seeder in seeders() {
            assert_eq!(vec![1], seeder.pack(&inst).expect(seeder.name()).hosts);
        }
    }
    #[test]
    fn mapped_vms_stay_home_when_the_budget_is_tight() {
        // budget 3 < 4: the mapped vm must keep its host
        let inst = Instance::new(
            vec![host(0, 10, 5), host(1, 10, 5)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 2, 4)] }],
            vec![Mapping { job: 0, index: 0, host: 0 }],
            0.3);
        for seeder in seeders() {
            assert_eq!(vec![0], seeder.pack(&inst).expect(seeder.name()).hosts);
        }
    }
    #[test]
    fn best_fit_picks_the_tightest_host() {
        // the vm fits both hosts; host 1 is the snug one
        let inst = Instance::new(
            vec![host(0, 20, 20), host(1, 6, 6)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 5, 5)] }],
            vec![], 1.0);
        let packed = BestFitDecreasing.pack(&inst).unwrap();
        assert_eq!(vec![1], packed.hosts);
        // while first fit stops at host 0
        let packed = FirstFitDecreasing.pack(&inst).unwrap();
        assert_eq!(vec![0], packed.hosts);
    }
    #[test]
    fn packing_is_deterministic() {
        let inst = Instance::new(
            vec![host(0, 10, 10), host(1, 10, 10), host(2, 10, 10)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 3, 3), vm(0, 1, 5, 5), vm(0, 2, 4, 4)] }],
            vec![], 1.0);
        for seeder in seeders() {
            let a = seeder.pack(&inst).unwrap();
            let b = seeder.pack(&inst).unwrap();
            assert_eq!(a, b, "{}", seeder.name());
        }
    }
}
