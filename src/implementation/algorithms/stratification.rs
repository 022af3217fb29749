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

//! This module partitions the soft units of the Pareto-MCS search by weight,
//! so the search pays attention to the heavy objective terms first. Two
//! strategies exist:
//!
//! - **Merged**: the sum-of-ratios objectives are folded into one weighted
//!   sum of soft units (numerators negated, denominators kept) and the units
//!   are split at the weight percentiles into contiguous classes, heaviest
//!   class first.
//! - **Split**: the partition of each unit is drawn at random, biased by the
//!   unit's weight share: heavy units favour the early partitions, light
//!   units the late ones.
//!
//! The number of partitions is either fixed by the caller or derived from a
//! literal-to-weight ratio `r`: the largest count such that each partition
//! still receives at least `r` distinct weights and `r * distinctWeights`
//! literals on average.

use num_rational::BigRational;
use num_traits::ToPrimitive;
use rand::Rng;

use crate::common::Lit;
use crate::implementation::encoder::ObjectiveExpr;
use crate::implementation::utils::{percentile, RouletteWheel};

// ----------------------------------------------------------------------------
// --- SOFT UNITS -------------------------------------------------------------
// ----------------------------------------------------------------------------
/// One soft unit of the search: satisfying `lit` lowers the objectives by
/// `weight`. The index is the unit's rank in the folded objective list and
/// breaks ordering ties deterministically.
#[derive(Debug, Clone)]
pub struct SoftUnit {
    pub weight: BigRational,
    pub lit: Lit,
    pub index: usize
}

/// Folds every objective expression into the common pool of soft units.
pub fn soft_units(objectives: &[ObjectiveExpr]) -> Vec<SoftUnit> {
    objectives.iter()
        .flat_map(|o| o.fold())
        .enumerate()
        .map(|(index, (weight, lit))| SoftUnit { weight, lit, index })
        .collect()
}

// ----------------------------------------------------------------------------
// --- PARTITIONING -----------------------------------------------------------
// ----------------------------------------------------------------------------
/// The stratification strategies of the soft unit pool.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StratStrategy {
    Merged,
    Split
}

/// How many partitions to build: a fixed count, or the count derived from
/// the literal-to-weight ratio.
pub fn nb_partitions(softs: &[SoftUnit],
                     fixed: Option<usize>,
                     literal_weight_ratio: Option<f64>) -> usize {
    if let Some(n) = fixed {
        return n.max(1);
    }
    let r = match literal_weight_ratio {
        None => return 1,
        Some(r) if r <= 0.0 => return 1,
        Some(r) => r
    };
    let mut weights = softs.iter().map(|s| s.weight.clone()).collect::<Vec<_>>();
    weights.sort();
    weights.dedup();
    let distinct = weights.len() as f64;
    let total = softs.len() as f64;
    let by_weights = (distinct / r).floor();
    let by_literals = (total / (r * distinct)).floor();
    (by_weights.min(by_literals) as usize).max(1)
}

/// Splits the soft units into at most `parts` non-empty groups, heaviest
/// group first, according to the chosen strategy.
pub fn partition<R: Rng>(mut softs: Vec<SoftUnit>,
                         strategy: StratStrategy,
                         parts: usize,
                         rng: &mut R) -> Vec<Vec<SoftUnit>> {
    let parts = parts.max(1);
    if parts == 1 || softs.is_empty() {
        return vec![softs];
    }
    // heaviest first, index breaking ties
    softs.sort_by(|a, b| b.weight.cmp(&a.weight).then(a.index.cmp(&b.index)));

    let mut groups = match strategy {
        StratStrategy::Merged => {
            // contiguous weight classes cut at the weight percentiles: a
            // unit above every cut joins the heaviest group, one at or below
            // them all the lightest
            let mut ascending = softs.iter().map(|s| s.weight.clone()).collect::<Vec<_>>();
            ascending.sort();
            let cuts = (1..parts)
                .filter_map(|g| percentile(&ascending, g as f64 / parts as f64).cloned())
                .collect::<Vec<_>>();
            let mut groups = vec![vec![]; parts];
            for soft in softs {
                let group = cuts.iter().filter(|cut| **cut >= soft.weight).count();
                groups[group].push(soft);
            }
            groups
        }
        StratStrategy::Split => {
            // per-unit random draw, biased by the unit's weight share: the
            // heaviest unit leans towards group 0, the lightest towards the
            // last group
            let heaviest = softs.first()
                .map(|s| s.weight.to_f64().unwrap_or(1.0))
                .unwrap_or(1.0)
                .max(f64::MIN_POSITIVE);
            let mut groups = vec![vec![]; parts];
            for soft in softs {
                let share = (soft.weight.to_f64().unwrap_or(0.0) / heaviest).clamp(0.0, 1.0);
                let bias = (0..parts)
                    .map(|g| {
                        let early = (parts - g) as f64;
                        let late = (g + 1) as f64;
                        share * early + (1.0 - share) * late
                    })
                    .collect::<Vec<_>>();
                let group = RouletteWheel::new(bias).spin(rng);
                groups[group].push(soft);
            }
            groups
        }
    };
    // weight ties can starve a class of units; the merge loop only wants
    // the non-empty ones
    groups.retain(|group| !group.is_empty());
    groups
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_stratification {
    use super::*;
    use crate::common::Variable;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn soft(weight: i64, index: usize) -> SoftUnit {
        SoftUnit {
            weight: BigRational::from_integer(weight.into()),
            lit: Lit::positive(Variable(index)),
            index
        }
    }

    #[test]
    fn one_partition_keeps_everything_together() {
        let softs = vec![soft(3, 0), soft(1, 1), soft(2, 2)];
        let mut rng = StdRng::seed_from_u64(0);
        let parts = partition(softs, StratStrategy::Merged, 1, &mut rng);
        assert_eq!(1, parts.len());
        assert_eq!(3, parts[0].len());
    }
    #[test]
    fn merged_partitioning_puts_the_heavy_units_first() {
        let softs = vec![soft(1, 0), soft(10, 1), soft(10, 2), soft(2, 3)];
        let mut rng = StdRng::seed_from_u64(0);
        let parts = partition(softs, StratStrategy::Merged, 2, &mut rng);
        assert_eq!(2, parts.len());
        // every weight-10 unit lands in the first group, the lightest weight
        // class closes the last one
        let ten = BigRational::from_integer(10.into());
        assert!(parts[0].iter().take(2).all(|s| s.weight == ten));
        assert!(parts[0].iter().filter(|s| s.weight == ten).count() == 2);
        assert!(!parts[1].is_empty());
        assert!(parts[1].iter().all(|s| s.weight < ten));
    }
    #[test]
    fn merged_partitioning_is_a_partition() {
        let softs = (0..10).map(|i| soft((i % 3) + 1, i as usize)).collect::<Vec<_>>();
        let mut rng = StdRng::seed_from_u64(0);
        let parts = partition(softs, StratStrategy::Merged, 3, &mut rng);
        let total: usize = parts.iter().map(|p| p.len()).sum();
        assert_eq!(10, total);
    }
    #[test]
    fn split_partitioning_is_a_partition_too() {
        let softs = (0..20).map(|i| soft((i % 5) + 1, i as usize)).collect::<Vec<_>>();
        let mut rng = StdRng::seed_from_u64(7);
        let parts = partition(softs, StratStrategy::Split, 4, &mut rng);
        let total: usize = parts.iter().map(|p| p.len()).sum();
        assert_eq!(20, total);
    }
    #[test]
    fn split_partitioning_is_reproducible_for_a_fixed_seed() {
        let softs = (0..20).map(|i| soft((i % 5) + 1, i as usize)).collect::<Vec<_>>();
        let mut rng_a = StdRng::seed_from_u64(3);
        let mut rng_b = StdRng::seed_from_u64(3);
        let a = partition(softs.clone(), StratStrategy::Split, 3, &mut rng_a);
        let b = partition(softs, StratStrategy::Split, 3, &mut rng_b);
        let shape_a = a.iter().map(|p| p.iter().map(|s| s.index).collect::<Vec<_>>()).collect::<Vec<_>>();
        let shape_b = b.iter().map(|p| p.iter().map(|s| s.index).collect::<Vec<_>>()).collect::<Vec<_>>();
        assert_eq!(shape_a, shape_b);
    }

    #[test]
    fn the_partition_count_honours_the_fixed_request() {
        let softs = (0..6).map(|i| soft(i + 1, i as usize)).collect::<Vec<_>>();
        assert_eq!(3, nb_partitions(&softs, Some(3), None));
    }
    #[test]
    fn the_partition_count_derives_from_the_literal_weight_ratio() {
        // 6 distinct weights over 6 literals, r = 2:
        // by weights: floor(6/2) = 3; by literals: floor(6/12) = 0 -> 1
        let softs = (0..6).map(|i| soft(i + 1, i as usize)).collect::<Vec<_>>();
        assert_eq!(1, nb_partitions(&softs, None, Some(2.0)));
    }
    #[test]
    fn no_hint_means_a_single_partition() {
        let softs = (0..6).map(|i| soft(i + 1, i as usize)).collect::<Vec<_>>();
        assert_eq!(1, nb_partitions(&softs, None, None));
    }
}
