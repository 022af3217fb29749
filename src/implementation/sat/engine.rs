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

//! This module provides the in-crate incremental pseudo-Boolean solver. The
//! engine runs a chronological backtracking search with Boolean clause
//! propagation and counter-based propagation of `<=` pseudo-Boolean
//! constraints over arbitrary-precision coefficients.
//!
//! Constraints live in an arena of stable slots; removable constraints map
//! their `ConstraintId` onto a slot and removal drops the slot in place
//! (native removal: no activator bookkeeping, and since the engine never
//! discards a satisfied constraint at add time there is nothing to recover
//! on removal either). Assumptions are installed as unflippable
//! pseudo-decisions below the search; when they make the formula
//! unsatisfiable, a deletion pass shrinks them to a minimal sufficient core.
//!
//! The search loop polls its abort flag and conflict budget at every
//! conflict and decision; the flag is tripped by the `Watchdog` timer of the
//! enclosing `solve()` call. A panic escaping the search (a torn-down
//! backend) is converted into an `Unknown` answer.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use metrohash::{MetroHashMap, MetroHashSet};
use num_bigint::BigInt;
use num_traits::Zero;
use parking_lot::Mutex;

use crate::abstraction::sink::ConstraintSink;
use crate::abstraction::solver::PbSolver;
use crate::common::{ConstraintId, Error, IdGenerator, Lit, Status, Variable};
use crate::implementation::sat::watchdog::{AbortFlag, Watchdog};

// ----------------------------------------------------------------------------
// --- CONSTRAINT STORE -------------------------------------------------------
// ----------------------------------------------------------------------------

/// One stored constraint. Pseudo-Boolean constraints are kept in normal form:
/// strictly positive coefficients, one term per variable, `<=` comparison.
#[derive(Debug, Clone)]
enum Constraint {
    Clause(Vec<Lit>),
    PbLe {
        terms: Vec<(BigInt, Lit)>,
        rhs: BigInt
    }
}
impl Constraint {
    fn variables(&self) -> Vec<usize> {
        match self {
            Constraint::Clause(lits) =>
                lits.iter().map(|l| l.variable().id()).collect(),
            Constraint::PbLe { terms, .. } =>
                terms.iter().map(|(_, l)| l.variable().id()).collect()
        }
    }
}

/// One decision level of the search: the decision literal, the trail length
/// before it, whether the opposite phase was tried already, and whether this
/// level carries an assumption (which must never be flipped).
#[derive(Debug, Copy, Clone)]
struct Frame {
    lit: Lit,
    mark: usize,
    flipped: bool,
    assumption: bool
}

// ----------------------------------------------------------------------------
// --- ENGINE -----------------------------------------------------------------
// ----------------------------------------------------------------------------

/// The incremental pseudo-Boolean solver backing every constraint-based
/// algorithm of the crate.
///
/// # Example
/// ```
/// # use vmcwm::abstraction::sink::ConstraintSink;
/// # use vmcwm::abstraction::solver::PbSolver;
/// # use vmcwm::common::{Lit, Status};
/// # use vmcwm::implementation::sat::engine::PbEngine;
/// let mut solver = PbEngine::new();
/// let x = Lit::positive(solver.new_var());
/// let y = Lit::positive(solver.new_var());
/// solver.add_clause(&[x, y]).unwrap();
/// assert_eq!(Status::Sat, solver.solve(&[]));
/// assert_eq!(Status::Unsat, solver.solve(&[!x, !y]));
/// ```
pub struct PbEngine {
    nb_vars: usize,
    /// the arena: removal clears a slot in place, slots are never reused
    constraints: Vec<Option<Constraint>>,
    /// variable -> indices of the constraints mentioning it
    occs: Vec<Vec<usize>>,
    /// removable id -> arena slot (`None` for constraints that were
    /// recognised trivially true at add time and never stored)
    removable: MetroHashMap<ConstraintId, Option<usize>>,
    ids: IdGenerator,

    // -- search state --------------------------------------------------------
    assign: Vec<Option<bool>>,
    trail: Vec<Lit>,
    qhead: usize,
    frames: Vec<Frame>,

    // -- budgets -------------------------------------------------------------
    conflicts: u64,
    conflict_budget: Option<u64>,
    timeout: Option<Duration>,
    abort: AbortFlag,

    // -- answers -------------------------------------------------------------
    model: Vec<bool>,
    core: Vec<Lit>,
    last_status: Status
}

impl Default for PbEngine {
    fn default() -> Self {
        PbEngine::new()
    }
}

impl PbEngine {
    pub fn new() -> PbEngine {
        PbEngine {
            nb_vars: 0,
            constraints: vec![],
            occs: vec![],
            removable: MetroHashMap::default(),
            ids: IdGenerator::default(),
            assign: vec![],
            trail: vec![],
            qhead: 0,
            frames: vec![],
            conflicts: 0,
            conflict_budget: None,
            timeout: None,
            abort: Arc::new(Mutex::new(false)),
            model: vec![],
            core: vec![],
            last_status: Status::Unknown
        }
    }

    /// The number of conflicts of the last `solve` call.
    pub fn nb_conflicts(&self) -> u64 {
        self.conflicts
    }

    // ------------------------------------------------------------------------
    // -- constraint insertion ------------------------------------------------
    // ------------------------------------------------------------------------

    fn check_range(&self, lit: Lit) {
        assert!(lit.variable().id() < self.nb_vars,
                "literal over an unknown variable: {:?}", lit);
    }

    fn push_constraint(&mut self, c: Constraint) -> usize {
        let slot = self.constraints.len();
        for var in c.variables() {
            self.occs[var].push(slot);
        }
        self.constraints.push(Some(c));
        slot
    }

    /// Normalises and stores a clause. `Ok(None)` means the clause was a
    /// tautology and did not need storing.
    fn insert_clause(&mut self, lits: &[Lit]) -> Result<Option<usize>, Error> {
        if lits.is_empty() {
            return Err(Error::Contradiction);
        }
        for &l in lits {
            self.check_range(l);
        }
        let mut seen = MetroHashSet::default();
        let mut kept = vec![];
        for &l in lits {
            if seen.contains(&(!l).code()) {
                return Ok(None); // l and !l together: trivially true
            }
            if seen.insert(l.code()) {
                kept.push(l);
            }
        }
        Ok(Some(self.push_constraint(Constraint::Clause(kept))))
    }

    /// Normalises and stores a `<=` pseudo-Boolean constraint: merges the two
    /// phases of each variable, turns every coefficient positive and shifts
    /// the right-hand side accordingly. A negative right-hand side is a
    /// contradiction; a right-hand side at least the coefficient total is
    /// trivially true.
    fn insert_pb(&mut self, terms: &[(BigInt, Lit)], rhs: &BigInt)
        -> Result<Option<usize>, Error>
    {
        for (_, l) in terms {
            self.check_range(*l);
        }
        // net coefficient of the *positive* phase of each variable
        let mut net: MetroHashMap<usize, BigInt> = MetroHashMap::default();
        let mut rhs = rhs.clone();
        for (c, l) in terms {
            let entry = net.entry(l.variable().id()).or_insert_with(BigInt::zero);
            if l.is_positive() {
                *entry += c;
            } else {
                // c * ~x  ==  c - c * x
                *entry -= c;
                rhs -= c;
            }
        }
        let mut vars = net.keys().copied().collect::<Vec<_>>();
        vars.sort_unstable();

        let mut out = vec![];
        let mut total = BigInt::zero();
        for v in vars {
            let c = net.remove(&v).unwrap();
            if c.is_zero() {
                continue;
            }
            if c > BigInt::zero() {
                total += &c;
                out.push((c, Lit::positive(Variable(v))));
            } else {
                // c * x  ==  c - c * ~x   (c negative)
                rhs -= &c;
                total -= &c;
                out.push((-c, Lit::negative(Variable(v))));
            }
        }
        if rhs < BigInt::zero() {
            return Err(Error::Contradiction);
        }
        if total <= rhs {
            return Ok(None); // can never be violated
        }
        Ok(Some(self.push_constraint(Constraint::PbLe { terms: out, rhs })))
    }

    // ------------------------------------------------------------------------
    // -- search --------------------------------------------------------------
    // ------------------------------------------------------------------------

    fn value(&self, lit: Lit) -> Option<bool> {
        self.assign[lit.variable().id()].map(|b| b == lit.is_positive())
    }

    fn enqueue(&mut self, lit: Lit) -> bool {
        match self.value(lit) {
            Some(true) => true,
            Some(false) => false,
            None => {
                self.assign[lit.variable().id()] = Some(lit.is_positive());
                self.trail.push(lit);
                true
            }
        }
    }

    fn undo_to(&mut self, mark: usize) {
        while self.trail.len() > mark {
            let lit = self.trail.pop().unwrap();
            self.assign[lit.variable().id()] = None;
        }
        self.qhead = mark;
    }

    fn new_level(&mut self, lit: Lit, assumption: bool) {
        self.frames.push(Frame { lit, mark: self.trail.len(), flipped: false, assumption });
        let fresh = self.enqueue(lit);
        debug_assert!(fresh);
    }

    /// Revisits one constraint under the current assignment: detects
    /// violation, enqueues the literals it forces. Answers false on conflict.
    fn wake(&mut self, ci: usize) -> bool {
        let implied = {
            let constraint = match &self.constraints[ci] {
                None => return true,
                Some(c) => c
            };
            match constraint {
                Constraint::Clause(lits) => {
                    let mut unassigned = None;
                    let mut nb_unassigned = 0;
                    for &l in lits.iter() {
                        match self.value(l) {
                            Some(true) => return true,
                            Some(false) => {}
                            None => {
                                nb_unassigned += 1;
                                unassigned = Some(l);
                            }
                        }
                    }
                    match (nb_unassigned, unassigned) {
                        (0, _) => return false,
                        (1, Some(l)) => vec![l],
                        _ => return true
                    }
                }
                Constraint::PbLe { terms, rhs } => {
                    let mut sum_true = BigInt::zero();
                    for (c, l) in terms.iter() {
                        if self.value(*l) == Some(true) {
                            sum_true += c;
                        }
                    }
                    if sum_true > *rhs {
                        return false;
                    }
                    let slack = rhs - &sum_true;
                    terms.iter()
                        .filter(|(c, l)| self.value(*l).is_none() && *c > slack)
                        .map(|(_, l)| !*l)
                        .collect()
                }
            }
        };
        for lit in implied {
            if !self.enqueue(lit) {
                return false;
            }
        }
        true
    }

    fn propagate(&mut self) -> bool {
        while self.qhead < self.trail.len() {
            let lit = self.trail[self.qhead];
            self.qhead += 1;
            let watchers = self.occs[lit.variable().id()].clone();
            for ci in watchers {
                if !self.wake(ci) {
                    return false;
                }
            }
        }
        true
    }

    /// Chronological conflict resolution: flips the deepest unflipped real
    /// decision, popping the exhausted levels on the way down. Answers false
    /// when the conflict reaches the assumptions (or the root).
    fn resolve_conflict(&mut self) -> bool {
        loop {
            let top = match self.frames.last() {
                None => return false,
                Some(f) => *f
            };
            if top.assumption {
                return false;
            }
            if top.flipped {
                self.undo_to(top.mark);
                self.frames.pop();
                continue;
            }
            self.undo_to(top.mark);
            let frame = self.frames.last_mut().unwrap();
            frame.lit = !top.lit;
            frame.flipped = true;
            let fresh = self.enqueue(!top.lit);
            debug_assert!(fresh);
            return true;
        }
    }

    fn first_unassigned(&self) -> Option<Variable> {
        self.assign.iter()
            .position(|a| a.is_none())
            .map(Variable)
    }

    fn should_stop(&self) -> bool {
        if let Some(budget) = self.conflict_budget {
            if self.conflicts >= budget {
                return true;
            }
        }
        *self.abort.lock()
    }

    fn run_search(&mut self, assumptions: &[Lit]) -> Status {
        self.assign.clear();
        self.assign.resize(self.nb_vars, None);
        self.trail.clear();
        self.frames.clear();
        self.qhead = 0;

        // root propagation: wake every constraint once so that unit clauses
        // and forcing pb constraints take effect
        for ci in 0..self.constraints.len() {
            if !self.wake(ci) || !self.propagate() {
                self.core.clear();
                return Status::Unsat;
            }
        }

        // install the assumptions, one pseudo-decision level each
        for (i, &a) in assumptions.iter().enumerate() {
            self.check_range(a);
            match self.value(a) {
                Some(true) => continue,
                Some(false) => {
                    self.core = assumptions[..=i].to_vec();
                    return Status::Unsat;
                }
                None => {
                    self.new_level(a, true);
                    if !self.propagate() {
                        self.core = assumptions[..=i].to_vec();
                        return Status::Unsat;
                    }
                }
            }
        }

        loop {
            if self.should_stop() {
                return Status::Unknown;
            }
            if !self.propagate() {
                self.conflicts += 1;
                if !self.resolve_conflict() {
                    self.core = assumptions.to_vec();
                    return Status::Unsat;
                }
            } else if let Some(v) = self.first_unassigned() {
                // try the negative phase first: placement variables are
                // mostly false in any model
                self.new_level(Lit::negative(v), false);
            } else {
                self.model = self.assign.iter()
                    .map(|a| a.unwrap_or(false))
                    .collect();
                return Status::Sat;
            }
        }
    }

    /// Deletion-based core minimisation: drops every assumption whose removal
    /// keeps the formula unsatisfiable. Interrupted by the budgets, in which
    /// case the current (still sufficient) core is kept.
    fn minimize_core(&mut self) {
        let mut kept = std::mem::take(&mut self.core);
        let mut i = 0;
        while i < kept.len() {
            if self.should_stop() {
                break;
            }
            let mut trial = kept.clone();
            trial.remove(i);
            match self.run_search(&trial) {
                Status::Unsat => kept = trial,
                _ => i += 1
            }
        }
        self.core = kept;
    }
}

impl ConstraintSink for PbEngine {
    fn new_var(&mut self) -> Variable {
        self.occs.push(vec![]);
        self.nb_vars += 1;
        Variable(self.nb_vars - 1)
    }
    fn nb_vars(&self) -> usize {
        self.nb_vars
    }
    fn add_clause(&mut self, lits: &[Lit]) -> Result<(), Error> {
        self.insert_clause(lits).map(|_| ())
    }
    fn add_pb_le(&mut self, terms: &[(BigInt, Lit)], rhs: &BigInt) -> Result<(), Error> {
        self.insert_pb(terms, rhs).map(|_| ())
    }
}

impl PbSolver for PbEngine {
    fn add_removable_clause(&mut self, lits: &[Lit]) -> Result<ConstraintId, Error> {
        let slot = self.insert_clause(lits)?;
        let id = self.ids.make_fresh();
        self.removable.insert(id, slot);
        Ok(id)
    }
    fn add_removable_pb_le(&mut self, terms: &[(BigInt, Lit)], rhs: &BigInt)
        -> Result<ConstraintId, Error>
    {
        let slot = self.insert_pb(terms, rhs)?;
        let id = self.ids.make_fresh();
        self.removable.insert(id, slot);
        Ok(id)
    }
    fn remove(&mut self, id: ConstraintId) {
        if let Some(Some(slot)) = self.removable.remove(&id) {
            self.constraints[slot] = None;
        }
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }
    fn set_conflict_budget(&mut self, conflicts: Option<u64>) {
        self.conflict_budget = conflicts;
    }

    fn solve(&mut self, assumptions: &[Lit]) -> Status {
        *self.abort.lock() = false;
        self.conflicts = 0;
        let _watchdog = self.timeout
            .map(|deadline| Watchdog::arm(deadline, Arc::clone(&self.abort)));

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let status = self.run_search(assumptions);
            if status == Status::Unsat && !assumptions.is_empty() {
                self.minimize_core();
            }
            status
        }));
        // a panic escaping the search is reported as an inconclusive answer
        let status = outcome.unwrap_or(Status::Unknown);
        self.last_status = status;
        status
        // _watchdog dropped here: the timer is cancelled on every exit path
    }

    fn model_value(&self, lit: Lit) -> bool {
        debug_assert_eq!(Status::Sat, self.last_status);
        let var = self.model.get(lit.variable().id()).copied().unwrap_or(false);
        var == lit.is_positive()
    }
    fn unsat_core(&self) -> &[Lit] {
        &self.core
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
