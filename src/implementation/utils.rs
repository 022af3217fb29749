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

//! This module defines the numeric utilities shared by the encoder and the
//! algorithms: the rational-to-integer scaling of pseudo-Boolean constraints,
//! percentile extraction over sorted weight lists and roulette-wheel
//! sampling.

use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use rand::Rng;

// ----------------------------------------------------------------------------
// --- RATIONAL TO INTEGER SCALING --------------------------------------------
// ----------------------------------------------------------------------------

/// The smallest power of ten turning `r` into an integer, when one exists
/// (i.e. when the reduced denominator only carries the prime factors 2 and 5).
pub fn decimal_scale(r: &BigRational) -> Option<u32> {
    let mut denom = r.denom().abs();
    let mut scale = 0_u32;
    let (two, five, ten) = (BigInt::from(2), BigInt::from(5), BigInt::from(10));
    while denom > BigInt::one() {
        if (&denom % &ten).is_zero() {
            denom /= &ten;
        } else if (&denom % &five).is_zero() {
            denom = &denom * &two / &ten;
        } else if (&denom % &two).is_zero() {
            denom = &denom * &five / &ten;
        } else {
            return None;
        }
        scale += 1;
    }
    Some(scale)
}

/// Scales a rational pseudo-Boolean constraint (coefficients + right-hand
/// side) to the equivalent integer one. When every figure is a finite decimal
/// the factor is `10^max(scale)`; otherwise the least common multiple of the
/// denominators is used. Either way the factor is the smallest of its kind,
/// hence the operation is idempotent: an already integral constraint comes
/// back unchanged.
pub fn scale_to_integers(coeffs: &[BigRational], rhs: &BigRational)
    -> (Vec<BigInt>, BigInt)
{
    let all = coeffs.iter().chain(std::iter::once(rhs));
    let factor = match all.clone().map(decimal_scale).collect::<Option<Vec<_>>>() {
        Some(scales) => {
            let max = scales.into_iter().max().unwrap_or(0);
            BigInt::from(10).pow(max)
        }
        None => all.clone()
            .fold(BigInt::one(), |acc, r| acc.lcm(&r.denom().abs()))
    };
    let factor = BigRational::from_integer(factor);
    let ints = coeffs.iter()
        .map(|c| (c * &factor).to_integer())
        .collect::<Vec<_>>();
    (ints, (rhs * &factor).to_integer())
}

// ----------------------------------------------------------------------------
// --- PERCENTILES ------------------------------------------------------------
// ----------------------------------------------------------------------------

/// Nearest-rank percentile over an ascending-sorted slice: the smallest value
/// such that at least `p` (in [0, 1]) of the list is at or below it. Returns
/// `None` on an empty slice. The merged stratification places its weight
/// cuts with it.
pub fn percentile<'a, T>(sorted: &'a [T], p: f64) -> Option<&'a T> {
    if sorted.is_empty() {
        return None;
    }
    let p = p.clamp(0.0, 1.0);
    let rank = (p * sorted.len() as f64).ceil() as usize;
    Some(&sorted[rank.max(1) - 1])
}

// ----------------------------------------------------------------------------
// --- ROULETTE WHEEL ---------------------------------------------------------
// ----------------------------------------------------------------------------

/// A roulette wheel: sampling returns index `i` with probability proportional
/// to `weights[i]`. Weights must be non-negative and sum to something
/// strictly positive.
///
/// # Example
/// ```
/// # use vmcwm::implementation::utils::RouletteWheel;
/// # use rand::SeedableRng;
/// let wheel = RouletteWheel::new(vec![1.0, 0.0, 3.0]);
/// let mut rng = rand::rngs::StdRng::seed_from_u64(42);
/// let i = wheel.spin(&mut rng);
/// assert!(i == 0 || i == 2);
/// ```
#[derive(Debug, Clone)]
pub struct RouletteWheel {
    /// cumulated weights, ascending
    cumulated: Vec<f64>
}
impl RouletteWheel {
    pub fn new(weights: Vec<f64>) -> RouletteWheel {
        let mut total = 0.0;
        let cumulated = weights.iter()
            .map(|w| { total += w.max(0.0); total })
            .collect::<Vec<_>>();
        RouletteWheel { cumulated }
    }
    /// Draws one index at random, proportionally to its weight share.
    pub fn spin<R: Rng>(&self, rng: &mut R) -> usize {
        let total = *self.cumulated.last().expect("empty roulette wheel");
        let shot = rng.gen_range(0.0..total);
        self.cumulated.iter()
            .position(|&c| shot < c)
            .unwrap_or(self.cumulated.len() - 1)
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################



#[cfg(test)]
mod test_roulette {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn zero_weight_entries_are_never_drawn() {
        let wheel = RouletteWheel::new(vec![0.0, 1.0, 0.0]);
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..100 {
            assert_eq!(1, wheel.spin(&mut rng));
        }
    }
    #[test]
    fn every_positive_entry_is_eventually_drawn() {
        let wheel = RouletteWheel::new(vec![1.0, 1.0, 1.0]);
        let mut rng = StdRng::seed_from_u64(0);
        let mut seen = [false; 3];
        for _ in 0..1000 {
            seen[wheel.spin(&mut rng)] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }
}
