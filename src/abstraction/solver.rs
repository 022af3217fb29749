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

//! This module defines the `PbSolver` trait: the incremental pseudo-Boolean
//! solver interface the multi-objective algorithms are written against. It
//! refines the plain `ConstraintSink` with removable constraints, assumption
//! solving, resource budgets, model extraction and unsat cores.

use std::time::Duration;

use num_bigint::BigInt;

use crate::abstraction::sink::ConstraintSink;
use crate::common::{ConstraintId, Error, Lit, Status};

/// An incremental pseudo-Boolean solver.
///
/// # Removable constraints
/// The removable variants return a fresh `ConstraintId`; removing that id
/// restores the previous model set (or enlarges it). Identifiers are handed
/// out in strictly increasing order and never reused, so they double as
/// timestamps. Two implementation strategies are acceptable and must be
/// behaviourally interchangeable: native removal (id -> handle, the handle is
/// dropped on removal) or activator literals (the constraint is weakened with
/// a fresh literal that later calls pass as an assumption).
///
/// # Solve contract
/// `solve` honours the configured wall-clock timeout and conflict budget
/// (the earliest expiry wins) and never fails: it answers `Unknown` when a
/// budget runs out. After `Sat`, the model may be read literal by literal;
/// after `Unsat` under assumptions, a minimal subset of the assumptions
/// sufficient for unsatisfiability is available. Passing an out-of-range
/// variable is a programming error.
pub trait PbSolver: ConstraintSink {
    /// Adds a removable clause and returns its fresh identifier.
    fn add_removable_clause(&mut self, lits: &[Lit]) -> Result<ConstraintId, Error>;
    /// Adds a removable `<=` pseudo-Boolean constraint.
    fn add_removable_pb_le(&mut self, terms: &[(BigInt, Lit)], rhs: &BigInt)
        -> Result<ConstraintId, Error>;
    /// Adds a removable `>=` pseudo-Boolean constraint. Rewritten over the
    /// negated literals like its permanent counterpart.
    fn add_removable_pb_ge(&mut self, terms: &[(BigInt, Lit)], rhs: &BigInt)
        -> Result<ConstraintId, Error>
    {
        let total = terms.iter().map(|(c, _)| c).sum::<BigInt>();
        let flipped = terms.iter()
            .map(|(c, l)| (c.clone(), !*l))
            .collect::<Vec<_>>();
        self.add_removable_pb_le(&flipped, &(total - rhs))
    }
    /// Drops the constraint with the given identifier. Removing an id twice
    /// is a no-op.
    fn remove(&mut self, id: ConstraintId);

    /// Sets (or clears) the wall-clock budget of subsequent `solve` calls.
    fn set_timeout(&mut self, timeout: Option<Duration>);
    /// Sets (or clears) the conflict budget of subsequent `solve` calls.
    fn set_conflict_budget(&mut self, conflicts: Option<u64>);

    /// Searches for a model under the given assumption literals.
    fn solve(&mut self, assumptions: &[Lit]) -> Status;

    /// The value of the given literal in the last model. Only meaningful
    /// right after a `Sat` answer.
    fn model_value(&self, lit: Lit) -> bool;
    /// A minimal subset of the last `solve` call's assumptions sufficient for
    /// unsatisfiability. Only meaningful right after an `Unsat` answer under
    /// assumptions.
    fn unsat_core(&self) -> &[Lit];
}
