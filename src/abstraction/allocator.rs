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

//! This module defines the allocator-side contracts: what it means to be one
//! of the search algorithms producing a non-dominated population, and what it
//! means to be a deterministic packing seeder (the collaborator the heuristic
//! reducer and the shuffled initialisation modes rely on).

use crate::common::Error;
use crate::instance::Instance;
use crate::solution::{Assignment, Population};

/// An allocator consumes an instance and produces the non-dominated
/// population of the assignments it discovered, in discovery order. Running
/// out of time with a non-empty population is a success; an empty population
/// is the `FAILURE` outcome the frame reports.
pub trait Allocator {
    /// Runs the search until optimality, exhaustion or timeout.
    fn allocate(&mut self) -> Result<Population, Error>;
}

/// A deterministic bin-packing heuristic: it either produces one feasible
/// assignment for the given instance or none at all. Seeders must be pure
/// functions of the instance (two calls return the same answer).
pub trait PackingSeeder {
    /// The display name of the heuristic (used in progress comments).
    fn name(&self) -> &'static str;
    /// Packs the instance, if it can.
    fn pack(&self, instance: &Instance) -> Option<Assignment>;
}
