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

//! # VMCWM
//! VMCWM is a constraint-based engine for the virtual machine consolidation
//! with migration problem: given physical hosts with capacities and power
//! profiles, jobs of virtual machines with demands and colocation rules, and
//! optionally a pre-existing placement with a migration budget, it computes
//! Pareto-optimal placements minimising energy consumption, resource wastage
//! and migration cost.
//!
//! The problem is encoded into pseudo-Boolean constraints and solved by an
//! incremental in-crate PB-SAT engine. Several multi-objective strategies
//! are built on top of it: Pareto-MCS enumeration (with CLD and LBX
//! extraction cores, weight stratification and path diversification),
//! guided improvement, xor-hash enumeration and single-objective linear
//! search. Deterministic bin-packing heuristics seed the search and shrink
//! the host pool before the exact algorithms run.

pub mod common;
pub mod instance;
pub mod solution;
pub mod abstraction;
pub mod implementation;
