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

//! End-to-end scenarios: literal instances are parsed from text and driven
//! through the constraint-based allocators; every emitted assignment is
//! checked against the hard constraints and the scenario's expectations.

use std::io::Cursor;

use vmcwm::common::Clock;
use vmcwm::implementation::algorithms::{by_name, AllocConfig};
use vmcwm::instance::Instance;
use vmcwm::solution::{Evaluator, Population};

fn parse(text: &str) -> Instance {
    Instance::from_read(Cursor::new(text.to_string())).expect("parse")
}

fn config() -> AllocConfig {
    AllocConfig { clock: Clock::new(), timeout: 30, ..Default::default() }
}

fn solve_with(name: &str, instance: &Instance, config: AllocConfig) -> Population {
    let mut allocator = by_name(name, instance, config).expect(name);
    let population = allocator.allocate().expect(name);
    let evaluator = Evaluator::new(instance, false);
    for point in population.iter() {
        assert!(evaluator.is_valid(&point.assignment), "{} emitted an invalid point", name);
    }
    population
}

const EXACT: [&str; 4] = ["PCLD", "PLBX", "GIA", "MCS"];

// ----------------------------------------------------------------------------
// -- scenario 1: trivial -----------------------------------------------------
// ----------------------------------------------------------------------------

const TRIVIAL: &str = "\
1
1 10 10 50 100
1
1 1 10 0 False
0
";

#[test]
fn trivial_instance_has_the_single_expected_solution() {
    let instance = parse(TRIVIAL);
    for name in EXACT {
        let population = solve_with(name, &instance, config());
        assert_eq!(1, population.len(), "{}", name);
        let point = population.iter().next().unwrap();
        // p 1-1 -> 1 (the single host carries the external id 1)
        assert_eq!(vec![0], point.assignment.hosts, "{}", name);
    }
}

#[test]
fn trivial_instance_reports_full_normalized_energy() {
    let instance = parse(TRIVIAL);
    let population = solve_with("PCLD", &instance, config());
    let evaluator = Evaluator::new(&instance, false);
    let point = population.iter().next().unwrap();
    let norm = point.objectives.normalized(&evaluator.reference_points());
    // the host runs at full cpu load: e 1.00000
    assert!((norm[0] - 1.0).abs() < 1e-9);
    // no pre-existing mapping: the migration component is absent
    assert_eq!(2, norm.len());
}

// ----------------------------------------------------------------------------
// -- scenario 2: capacity tight ----------------------------------------------
// ----------------------------------------------------------------------------

const CAPACITY_TIGHT: &str = "\
2
0 10 10 50 100
1 10 10 50 100
2
0 0 6 6 False
0 1 6 6 False
0
";

#[test]
fn capacity_tight_vms_land_on_distinct_hosts() {
    let instance = parse(CAPACITY_TIGHT);
    for name in EXACT {
        let population = solve_with(name, &instance, config());
        assert_eq!(1, population.len(), "{}", name);
        for point in population.iter() {
            assert_ne!(point.assignment.hosts[0], point.assignment.hosts[1], "{}", name);
        }
    }
}

#[test]
fn symmetry_breaking_still_yields_the_single_pareto_point() {
    let instance = parse(CAPACITY_TIGHT);
    let mut cfg = config();
    cfg.encoder.symmetry_breaking = true;
    let population = solve_with("PCLD", &instance, cfg);
    assert_eq!(1, population.len());
    let point = population.iter().next().unwrap();
    assert_ne!(point.assignment.hosts[0], point.assignment.hosts[1]);
}

#[test]
fn symmetry_breaking_prefers_the_first_of_identical_idle_hosts() {
    // one vm, two indistinguishable hosts: the canonical model uses host 0
    let instance = parse(FORBIDDEN_FREE);
    let mut cfg = config();
    cfg.encoder.symmetry_breaking = true;
    let population = solve_with("PCLD", &instance, cfg);
    assert_eq!(1, population.len());
    assert_eq!(vec![0], population.iter().next().unwrap().assignment.hosts);
}

const FORBIDDEN_FREE: &str = "\
2
0 10 10 50 100
1 10 10 50 100
1
0 0 5 5 False
0
";

// ----------------------------------------------------------------------------
// -- scenario 3: anti-colocation ---------------------------------------------
// ----------------------------------------------------------------------------

const ANTI_TWO_HOSTS: &str = "\
2
0 10 10 50 100
1 10 10 50 100
2
0 0 5 5 True
0 1 5 5 True
0
";

const ANTI_ONE_HOST: &str = "\
1
0 10 10 50 100
2
0 0 5 5 True
0 1 5 5 True
0
";

#[test]
fn anti_colocation_is_feasible_iff_there_are_enough_hosts() {
    let two = parse(ANTI_TWO_HOSTS);
    for name in EXACT {
        let population = solve_with(name, &two, config());
        assert!(!population.is_empty(), "{}", name);
        for point in population.iter() {
            assert_ne!(point.assignment.hosts[0], point.assignment.hosts[1], "{}", name);
        }
    }
    let one = parse(ANTI_ONE_HOST);
    for name in EXACT {
        assert!(solve_with(name, &one, config()).is_empty(), "{}", name);
    }
}

#[test]
fn dropping_the_anti_colocation_constraints_restores_feasibility() {
    let one = parse(ANTI_ONE_HOST);
    let mut cfg = config();
    cfg.encoder.drop_anti_colocation = true;
    assert!(!solve_with("PCLD", &one, cfg).is_empty());
}

// ----------------------------------------------------------------------------
// -- scenario 4: forbidden hosts ---------------------------------------------
// ----------------------------------------------------------------------------

const FORBIDDEN: &str = "\
2
0 10 10 50 100
1 10 10 50 100
1
0 0 5 5 False 0
0
";

#[test]
fn a_vm_forbidden_on_host_zero_lands_on_host_one() {
    let instance = parse(FORBIDDEN);
    for name in EXACT {
        let population = solve_with(name, &instance, config());
        assert!(!population.is_empty(), "{}", name);
        for point in population.iter() {
            assert_eq!(vec![1], point.assignment.hosts, "{}", name);
        }
    }
}

// ----------------------------------------------------------------------------
// -- scenario 5: migration budget --------------------------------------------
// ----------------------------------------------------------------------------

const MIGRATION: &str = "\
2
0 10 5 50 100
1 10 5 50 100
1
0 0 2 4 False
1
0 0 0
";

#[test]
fn a_tight_migration_budget_pins_the_mapped_vm() {
    // total memory 10, fraction 0.3 => budget 3 < the vm's 4 memory units
    let mut instance = parse(MIGRATION);
    instance.budget_fraction = 0.3;
    for name in EXACT {
        let population = solve_with(name, &instance, config());
        assert!(!population.is_empty(), "{}", name);
        for point in population.iter() {
            assert_eq!(vec![0], point.assignment.hosts, "{}", name);
            // the migration component exists and is zero
            let migration = point.objectives.migration.as_ref().expect(name);
            assert!(num_traits::Zero::is_zero(migration), "{}", name);
        }
    }
}

#[test]
fn a_loose_budget_lets_the_vm_migrate() {
    let instance = parse(MIGRATION);
    // fraction 1.0: both placements are feasible, the front may keep either
    let population = solve_with("PCLD", &instance, config());
    assert!(!population.is_empty());
}

// ----------------------------------------------------------------------------
// -- scenario 6: denominator switches ----------------------------------------
// ----------------------------------------------------------------------------

#[test]
fn both_denominator_semantics_produce_a_front() {
    let instance = parse(CAPACITY_TIGHT);
    for ignore in [false, true] {
        let mut cfg = config();
        cfg.encoder.ignore_denominators = ignore;
        cfg.ignore_denominators_eval = ignore;
        let population = solve_with("PCLD", &instance, cfg);
        assert!(!population.is_empty(), "ignore_denominators = {}", ignore);
    }
}

// ----------------------------------------------------------------------------
// -- objective monotonicity --------------------------------------------------
// ----------------------------------------------------------------------------

const SMALL_POOL: &str = "\
2
0 10 10 50 100
1 10 10 50 100
3
0 0 4 3 False
0 1 3 4 False
0 2 2 2 False
0
";

const LARGE_POOL: &str = "\
3
0 10 10 50 100
1 10 10 50 100
2 10 10 50 100
3
0 0 4 3 False
0 1 3 4 False
0 2 2 2 False
0
";

#[test]
fn adding_hosts_never_worsens_the_best_reachable_objectives() {
    let small = parse(SMALL_POOL);
    let large = parse(LARGE_POOL);
    let front_small = solve_with("PCLD", &small, config());
    let front_large = solve_with("PCLD", &large, config());
    assert!(!front_small.is_empty());
    assert!(!front_large.is_empty());

    let best = |population: &Population, pick: fn(&vmcwm::solution::ParetoPoint) -> num_rational::BigRational| {
        population.iter().map(pick).min().unwrap()
    };
    let energy_small = best(&front_small, |p| p.objectives.energy.clone());
    let energy_large = best(&front_large, |p| p.objectives.energy.clone());
    assert!(energy_large <= energy_small);
    let wastage_small = best(&front_small, |p| p.objectives.wastage.clone());
    let wastage_large = best(&front_large, |p| p.objectives.wastage.clone());
    assert!(wastage_large <= wastage_small);
}

// ----------------------------------------------------------------------------
// -- drivers -----------------------------------------------------------------
// ----------------------------------------------------------------------------

#[test]
fn the_multi_seed_driver_merges_runs_into_one_front() {
    use vmcwm::implementation::algorithms::frame::run_multi_seed;
    let instance = parse(CAPACITY_TIGHT);
    let mut cfg = config();
    cfg.multi_seed = 3;
    let population = run_multi_seed("PCLD", &instance, &cfg).unwrap();
    assert!(!population.is_empty());
}

#[test]
fn the_reduced_driver_stays_sound_on_the_original_instance() {
    use vmcwm::implementation::algorithms::reducer::run_reduced;
    use vmcwm::implementation::heuristics::BestFitDecreasing;
    let instance = parse(LARGE_POOL);
    let population = run_reduced("PCLD", &instance, &config(), &BestFitDecreasing).unwrap();
    let evaluator = Evaluator::new(&instance, false);
    assert!(!population.is_empty());
    for point in population.iter() {
        assert!(evaluator.is_valid(&point.assignment));
    }
}

#[test]
fn the_packing_selectors_emit_a_single_valid_point() {
    let instance = parse(CAPACITY_TIGHT);
    for name in ["FFD", "BFD"] {
        let population = solve_with(name, &instance, config());
        assert_eq!(1, population.len(), "{}", name);
    }
}

#[test]
fn hash_enumeration_covers_the_bounded_region() {
    let instance = parse(CAPACITY_TIGHT);
    let population = solve_with("HE", &instance, config());
    assert!(!population.is_empty());
}
