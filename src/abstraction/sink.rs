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

//! This module defines the `ConstraintSink` trait: the abstract aggregator
//! every problem encoding writes its variables and constraints into. Concrete
//! sinks are the in-crate solver and the OPB exporter.
//!
//! The trait only demands the primitive operations (fresh variables, clauses
//! and `<=` pseudo-Boolean constraints); every other constraint shape is a
//! provided method rewriting itself into the primitives:
//! - `>=`, `=`, strict `<` and `>` by coefficient negation and unit shifts,
//! - cardinality constraints as unit-coefficient pseudo-Boolean ones,
//! - rational constraints through the instance-wide integer scaling,
//! - conjunctions as unit clauses,
//! - xor as a balanced binary tree of parity gates (four clauses and one
//!   auxiliary variable per internal node).
//!
//! Every add operation answers `Err(Contradiction)` when its local analysis
//! proves the store unsatisfiable; callers treat that as an unsat branch.

use num_bigint::BigInt;
use num_rational::BigRational;

use crate::common::{Error, Lit, Variable};
use crate::implementation::utils::scale_to_integers;

/// The abstract aggregator of variables, clauses, cardinality and
/// pseudo-Boolean constraints. See the module documentation.
pub trait ConstraintSink {
    /// Creates a fresh propositional variable.
    fn new_var(&mut self) -> Variable;
    /// The number of variables created so far.
    fn nb_vars(&self) -> usize;
    /// Asserts the disjunction of the given literals.
    fn add_clause(&mut self, lits: &[Lit]) -> Result<(), Error>;
    /// Asserts `sum coeff_i * lit_i <= rhs` over integer coefficients.
    fn add_pb_le(&mut self, terms: &[(BigInt, Lit)], rhs: &BigInt) -> Result<(), Error>;

    // ------------------------------------------------------------------------
    // -- derived constraint shapes -------------------------------------------
    // ------------------------------------------------------------------------

    /// Asserts `sum coeff_i * lit_i >= rhs`. Rewritten over the negated
    /// literals: `sum c_i * ~l_i <= sum c_i - rhs`.
    fn add_pb_ge(&mut self, terms: &[(BigInt, Lit)], rhs: &BigInt) -> Result<(), Error> {
        let total = terms.iter().map(|(c, _)| c).sum::<BigInt>();
        let flipped = terms.iter()
            .map(|(c, l)| (c.clone(), !*l))
            .collect::<Vec<_>>();
        self.add_pb_le(&flipped, &(total - rhs))
    }
    /// Asserts `sum coeff_i * lit_i = rhs`.
    fn add_pb_eq(&mut self, terms: &[(BigInt, Lit)], rhs: &BigInt) -> Result<(), Error> {
        self.add_pb_le(terms, rhs)?;
        self.add_pb_ge(terms, rhs)
    }
    /// Asserts `sum coeff_i * lit_i < rhs` (strict).
    fn add_pb_lt(&mut self, terms: &[(BigInt, Lit)], rhs: &BigInt) -> Result<(), Error> {
        self.add_pb_le(terms, &(rhs - 1))
    }
    /// Asserts `sum coeff_i * lit_i > rhs` (strict).
    fn add_pb_gt(&mut self, terms: &[(BigInt, Lit)], rhs: &BigInt) -> Result<(), Error> {
        self.add_pb_ge(terms, &(rhs + 1))
    }

    /// Asserts that at most `k` of the given literals hold.
    fn add_at_most(&mut self, lits: &[Lit], k: usize) -> Result<(), Error> {
        let terms = unit_terms(lits);
        self.add_pb_le(&terms, &BigInt::from(k))
    }
    /// Asserts that at least `k` of the given literals hold.
    fn add_at_least(&mut self, lits: &[Lit], k: usize) -> Result<(), Error> {
        let terms = unit_terms(lits);
        self.add_pb_ge(&terms, &BigInt::from(k))
    }
    /// Asserts that exactly `k` of the given literals hold.
    fn add_exactly(&mut self, lits: &[Lit], k: usize) -> Result<(), Error> {
        self.add_at_most(lits, k)?;
        self.add_at_least(lits, k)
    }

    /// Asserts `sum coeff_i * lit_i <= rhs` over rational coefficients, by
    /// scaling the whole constraint to the smallest equivalent integer one.
    fn add_pb_le_rational(&mut self, terms: &[(BigRational, Lit)], rhs: &BigRational)
        -> Result<(), Error>
    {
        let (ints, rhs) = scale(terms, rhs);
        let terms = ints.into_iter()
            .zip(terms.iter().map(|(_, l)| *l))
            .collect::<Vec<_>>();
        self.add_pb_le(&terms, &rhs)
    }
    /// Asserts `sum coeff_i * lit_i >= rhs` over rational coefficients.
    fn add_pb_ge_rational(&mut self, terms: &[(BigRational, Lit)], rhs: &BigRational)
        -> Result<(), Error>
    {
        let (ints, rhs) = scale(terms, rhs);
        let terms = ints.into_iter()
            .zip(terms.iter().map(|(_, l)| *l))
            .collect::<Vec<_>>();
        self.add_pb_ge(&terms, &rhs)
    }
    /// Asserts `sum coeff_i * lit_i = rhs` over rational coefficients.
    fn add_pb_eq_rational(&mut self, terms: &[(BigRational, Lit)], rhs: &BigRational)
        -> Result<(), Error>
    {
        let (ints, rhs) = scale(terms, rhs);
        let terms = ints.into_iter()
            .zip(terms.iter().map(|(_, l)| *l))
            .collect::<Vec<_>>();
        self.add_pb_eq(&terms, &rhs)
    }

    /// Asserts that every one of the given literals holds (decomposed into
    /// unit clauses).
    fn add_conjunction(&mut self, lits: &[Lit]) -> Result<(), Error> {
        for l in lits {
            self.add_clause(&[*l])?;
        }
        Ok(())
    }

    /// Asserts `l_1 xor ... xor l_n = parity`, encoded as a balanced binary
    /// tree of parity gates. Each internal node introduces one auxiliary
    /// variable and four clauses; the resulting CNF is equivalent (as a
    /// Boolean function over the original literals) to the xor itself.
    fn add_xor(&mut self, lits: &[Lit], parity: bool) -> Result<(), Error> {
        assert!(!lits.is_empty(), "xor over no literal");
        let root = xor_tree(self, lits)?;
        self.add_clause(&[if parity { root } else { !root }])
    }
}

fn unit_terms(lits: &[Lit]) -> Vec<(BigInt, Lit)> {
    lits.iter().map(|l| (BigInt::from(1), *l)).collect()
}

fn scale(terms: &[(BigRational, Lit)], rhs: &BigRational) -> (Vec<BigInt>, BigInt) {
    let coeffs = terms.iter().map(|(c, _)| c.clone()).collect::<Vec<_>>();
    scale_to_integers(&coeffs, rhs)
}

/// Builds the parity tree bottom up and returns the literal equivalent to the
/// xor of the given slice.
fn xor_tree<S: ConstraintSink + ?Sized>(sink: &mut S, lits: &[Lit]) -> Result<Lit, Error> {
    if lits.len() == 1 {
        return Ok(lits[0]);
    }
    let (left, right) = lits.split_at(lits.len() / 2);
    let a = xor_tree(sink, left)?;
    let b = xor_tree(sink, right)?;
    let t = Lit::positive(sink.new_var());
    // t <-> a xor b
    sink.add_clause(&[!t,  a,  b])?;
    sink.add_clause(&[!t, !a, !b])?;
    sink.add_clause(&[ t, !a,  b])?;
    sink.add_clause(&[ t,  a, !b])?;
    Ok(t)
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
