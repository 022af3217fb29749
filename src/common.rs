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

//! This module defines the most basic data types that are used throughout all
//! the code of our library (both at the abstraction and implementation levels).
//! These are also the types your client library is likely to work with.
//!
//! In particular, this module comprises the definition of the following types:
//! - `Variable`
//! - `Lit`
//! - `ConstraintId` (+ associated `IdGenerator`)
//! - `Status`
//! - `Error`
//! - `Clock`

use std::ops::Not;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use thiserror::Error;

// ----------------------------------------------------------------------------
// --- VARIABLE ---------------------------------------------------------------
// ----------------------------------------------------------------------------
/// This type denotes a propositional variable of the encoded problem. Each
/// variable is identified with an integer ranging from 0 until the number of
/// variables created on the constraint sink.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Variable(pub usize);
impl Variable {
    #[inline]
    /// This function returns the id (numeric value) of the variable.
    ///
    /// # Examples:
    /// ```
    /// # use vmcwm::common::Variable;
    /// assert_eq!(0, Variable(0).id());
    /// assert_eq!(1, Variable(1).id());
    /// ```
    pub fn id(self) -> usize {
        self.0
    }
}

// ----------------------------------------------------------------------------
// --- LITERAL ----------------------------------------------------------------
// ----------------------------------------------------------------------------
/// A literal is a variable or its negation. It is backed by a nonzero signed
/// integer the way DIMACS encodes literals: variable `i` maps onto `i + 1`
/// positively and `-(i + 1)` negatively. The zero literal does not exist;
/// building one is a programming error.
///
/// # Example
/// ```
/// # use vmcwm::common::{Lit, Variable};
/// let x = Lit::positive(Variable(3));
/// assert_eq!(Variable(3), x.variable());
/// assert!(x.is_positive());
/// assert_eq!(x, !!x);
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Lit(isize);
impl Lit {
    /// Creates the positive literal of the given variable.
    pub fn positive(v: Variable) -> Lit {
        Lit(v.0 as isize + 1)
    }
    /// Creates the negative literal of the given variable.
    pub fn negative(v: Variable) -> Lit {
        Lit(-(v.0 as isize + 1))
    }
    /// Rebuilds a literal from its raw DIMACS code. Panics on zero, which can
    /// never denote a literal.
    pub fn from_code(code: isize) -> Lit {
        assert_ne!(0, code, "the zero literal does not exist");
        Lit(code)
    }
    /// The variable this literal ranges on.
    #[inline]
    pub fn variable(self) -> Variable {
        Variable(self.0.unsigned_abs() - 1)
    }
    /// True iff this is the positive phase of its variable.
    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
    /// The raw signed code of this literal (DIMACS convention).
    #[inline]
    pub fn code(self) -> isize {
        self.0
    }
}
/// The negation of a literal is the other phase of the same variable.
impl Not for Lit {
    type Output = Lit;

    fn not(self) -> Lit {
        Lit(-self.0)
    }
}

// ----------------------------------------------------------------------------
// --- CONSTRAINT ID ----------------------------------------------------------
// ----------------------------------------------------------------------------
/// An opaque token identifying one removable constraint inside a solver.
/// Identifiers are handed out in strictly increasing order, hence their total
/// order doubles as a creation timestamp.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ConstraintId(u64);
impl ConstraintId {
    /// The raw numeric value of this identifier.
    pub fn id(self) -> u64 {
        self.0
    }
}

/// The generator handing out fresh `ConstraintId`s. Every solver owns one;
/// identifiers are never reused.
///
/// # Example
/// ```
/// # use vmcwm::common::IdGenerator;
/// let mut gen = IdGenerator::default();
/// let a = gen.make_fresh();
/// let b = gen.make_fresh();
/// assert!(a < b);
/// ```
#[derive(Debug, Default, Clone)]
pub struct IdGenerator {
    next: u64
}
impl IdGenerator {
    /// Returns an identifier that was never handed out by this generator.
    pub fn make_fresh(&mut self) -> ConstraintId {
        let id = ConstraintId(self.next);
        self.next += 1;
        id
    }
}

// ----------------------------------------------------------------------------
// --- STATUS -----------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The outcome of one `solve()` call. `Unknown` covers both the wall-clock
/// timeout and an exhausted conflict budget; it never denotes an internal
/// failure.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Status {
    /// A model was found; it can be read back literal by literal.
    Sat,
    /// The formula (under the given assumptions) admits no model.
    Unsat,
    /// The solver gave up before reaching a verdict.
    Unknown
}

// ----------------------------------------------------------------------------
// --- ERRORS -----------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The error kinds of the library. `Contradiction` is *not* exceptional: it is
/// the normal answer of a constraint-add operation whose local analysis proved
/// the formula unsatisfiable, and callers recover from it by treating the
/// enclosing search branch as unsat.
#[derive(Debug, Error)]
pub enum Error {
    /// The input file does not match the expected line-oriented format.
    #[error("parse error: {0}")]
    Parse(String),
    /// Adding a constraint made the formula trivially unsatisfiable.
    #[error("contradiction while posting a constraint")]
    Contradiction,
    /// The allotted wall-clock time was exhausted before any solution was found.
    #[error("timeout")]
    Timeout,
    /// The packing seeder of the heuristic reducer produced no assignment.
    #[error("heuristic reduction failed: the seeder found no assignment")]
    HeuristicReductionFailed,
    /// The requested operation is not part of the component's contract.
    #[error("not supported: {0}")]
    NotSupported(&'static str),
    /// Reading or writing a file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error)
}

// ----------------------------------------------------------------------------
// --- CLOCK ------------------------------------------------------------------
// ----------------------------------------------------------------------------
/// A monotonic clock driving the cooperative timeout checks. Allocators are
/// handed an explicit clock; `Clock::process()` anchors one at the instant the
/// process first asked for it, which is the convenient default for the CLI.
///
/// The multi-seed driver resets its own clock between runs; the process-wide
/// anchor itself is started once and never moves.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    start: Instant
}
impl Clock {
    /// A clock anchored now.
    pub fn new() -> Clock {
        Clock { start: Instant::now() }
    }
    /// A clock anchored at the process-wide start instant (the first call to
    /// this function decides the anchor).
    pub fn process() -> Clock {
        static START: OnceLock<Instant> = OnceLock::new();
        Clock { start: *START.get_or_init(Instant::now) }
    }
    /// Re-anchors this clock at the present instant.
    pub fn reset(&mut self) {
        self.start = Instant::now();
    }
    /// The time elapsed since the anchor.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
    /// The time left before a timeout of `timeout` seconds expires, saturating
    /// at zero.
    pub fn remaining(&self, timeout: u64) -> Duration {
        Duration::from_secs(timeout).saturating_sub(self.elapsed())
    }
    /// True iff a timeout of `timeout` seconds is already expired.
    pub fn is_expired(&self, timeout: u64) -> bool {
        self.remaining(timeout) == Duration::from_secs(0)
    }
}
impl Default for Clock {
    fn default() -> Self {
        Clock::new()
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################



#[cfg(test)]
mod test_constraint_id {
    use crate::common::IdGenerator;

    #[test]
    fn fresh_ids_are_strictly_increasing() {
        let mut gen = IdGenerator::default();
        let a = gen.make_fresh();
        let b = gen.make_fresh();
        let c = gen.make_fresh();
        assert!(a < b);
        assert!(b < c);
    }
    #[test]
    fn ids_are_equal_only_to_themselves() {
        let mut gen = IdGenerator::default();
        let a = gen.make_fresh();
        let b = gen.make_fresh();
        assert_eq!(a, a);
        assert_ne!(a, b);
    }
}

#[cfg(test)]
mod test_clock {
    use crate::common::Clock;

    #[test]
    fn a_fresh_clock_has_not_expired_a_positive_timeout() {
        let clock = Clock::new();
        assert!(!clock.is_expired(3600));
    }
    #[test]
    fn a_zero_timeout_is_expired_immediately() {
        let clock = Clock::new();
        assert!(clock.is_expired(0));
    }
    #[test]
    fn the_process_clock_is_anchored_once() {
        let a = Clock::process();
        let b = Clock::process();
        assert!(a.elapsed() >= b.elapsed());
    }
}
