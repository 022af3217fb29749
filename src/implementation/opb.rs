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

//! This module provides the OPB export: a constraint sink that renders what
//! the encoder writes into it as an `.opb` text file. The first line is the
//! usual `* #variable= N #constraint= M` comment, the objective is a single
//! `min:` line where each ratio of a sum-of-ratios objective is enclosed in
//! parentheses, constraint lines are terminated by `;` and literals use the
//! `xN` / `~xN` syntax. A flag switches the objective coefficients between
//! integer-scaled and plain decimal rendering.

use std::io::Write;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::Zero;

use crate::abstraction::sink::ConstraintSink;
use crate::common::{Error, Lit, Variable};
use crate::implementation::encoder::ObjectiveExpr;
use crate::implementation::utils::{decimal_scale, scale_to_integers};

// ----------------------------------------------------------------------------
// --- WRITER -----------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The OPB rendering sink. Feed it to the encoder in place of the solver,
/// attach the objectives, then `write_to` the destination.
#[derive(Debug, Default)]
pub struct OpbWriter {
    nb_vars: usize,
    constraints: Vec<String>,
    objective: Option<String>,
    /// Render the objective coefficients as decimals instead of scaling each
    /// ratio to integers.
    pub decimal_coefficients: bool
}

impl OpbWriter {
    pub fn new(decimal_coefficients: bool) -> OpbWriter {
        OpbWriter { decimal_coefficients, ..Default::default() }
    }

    /// Renders the objective expressions as the single `min:` line.
    pub fn set_objectives(&mut self, objectives: &[ObjectiveExpr]) {
        let mut ratios = vec![];
        for objective in objectives {
            for ratio in objective.ratios.iter() {
                ratios.push(self.render_ratio(&ratio.numerator, ratio.denominator.as_deref()));
            }
        }
        self.objective = Some(format!("min: {} ;", ratios.join(" + ")));
    }

    /// Writes the complete OPB document.
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<(), Error> {
        writeln!(out, "* #variable= {} #constraint= {}",
                 self.nb_vars, self.constraints.len())?;
        if let Some(objective) = &self.objective {
            writeln!(out, "{}", objective)?;
        }
        for line in self.constraints.iter() {
            writeln!(out, "{}", line)?;
        }
        Ok(())
    }

    fn render_ratio(&self,
                    numerator: &[(BigRational, Lit)],
                    denominator: Option<&[(BigRational, Lit)]>) -> String {
        if self.decimal_coefficients {
            let num = render_terms_decimal(numerator);
            return match denominator {
                None => format!("( {} )", num),
                Some(d) => format!("( {} ) / ( {} )", num, render_terms_decimal(d))
            };
        }
        // scale numerator and denominator with one common factor so the
        // value of the ratio is preserved
        let all = numerator.iter()
            .chain(denominator.unwrap_or(&[]).iter())
            .map(|(c, _)| c.clone())
            .collect::<Vec<_>>();
        let (ints, _) = scale_to_integers(&all, &BigRational::zero());
        let num = render_terms_int(&ints[..numerator.len()], numerator);
        match denominator {
            None => format!("( {} )", num),
            Some(d) => {
                let den = render_terms_int(&ints[numerator.len()..], d);
                format!("( {} ) / ( {} )", num, den)
            }
        }
    }
}

fn literal(l: Lit) -> String {
    if l.is_positive() {
        format!("x{}", l.variable().id() + 1)
    } else {
        format!("~x{}", l.variable().id() + 1)
    }
}

fn render_terms_int(coeffs: &[BigInt], terms: &[(BigRational, Lit)]) -> String {
    coeffs.iter()
        .zip(terms.iter())
        .map(|(c, (_, l))| format!("+{} {}", c, literal(*l)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_terms_decimal(terms: &[(BigRational, Lit)]) -> String {
    terms.iter()
        .map(|(c, l)| format!("+{} {}", decimal(c), literal(*l)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Renders a non-negative rational as a decimal when it has one, as a
/// fraction otherwise.
fn decimal(r: &BigRational) -> String {
    match decimal_scale(r) {
        Some(0) => r.to_integer().to_string(),
        Some(scale) => {
            let shifted = (r * BigRational::from_integer(BigInt::from(10).pow(scale)))
                .to_integer()
                .to_string();
            let digits = format!("{:0>width$}", shifted, width = scale as usize + 1);
            let split = digits.len() - scale as usize;
            format!("{}.{}", &digits[..split], &digits[split..])
        }
        None => format!("{}/{}", r.numer(), r.denom())
    }
}

impl ConstraintSink for OpbWriter {
    fn new_var(&mut self) -> Variable {
        self.nb_vars += 1;
        Variable(self.nb_vars - 1)
    }
    fn nb_vars(&self) -> usize {
        self.nb_vars
    }
    fn add_clause(&mut self, lits: &[Lit]) -> Result<(), Error> {
        let terms = lits.iter()
            .map(|&l| format!("+1 {}", literal(l)))
            .collect::<Vec<_>>()
            .join(" ");
        self.constraints.push(format!("{} >= 1 ;", terms));
        Ok(())
    }
    fn add_pb_le(&mut self, terms: &[(BigInt, Lit)], rhs: &BigInt) -> Result<(), Error> {
        let rendered = terms.iter()
            .map(|(c, l)| format!("+{} {}", c, literal(*l)))
            .collect::<Vec<_>>()
            .join(" ");
        self.constraints.push(format!("{} <= {} ;", rendered, rhs));
        Ok(())
    }
    /// Overridden to render `>=` natively instead of rewriting over negated
    /// literals.
    fn add_pb_ge(&mut self, terms: &[(BigInt, Lit)], rhs: &BigInt) -> Result<(), Error> {
        let rendered = terms.iter()
            .map(|(c, l)| format!("+{} {}", c, literal(*l)))
            .collect::<Vec<_>>()
            .join(" ");
        self.constraints.push(format!("{} >= {} ;", rendered, rhs));
        Ok(())
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_opb {
    use super::*;
    use crate::implementation::encoder::{EncoderConfig, PlacementEncoding};
    use crate::instance::{Instance, Job, PhysicalMachine, VirtualMachine};
    use num_bigint::BigUint;

    fn tiny_instance() -> Instance {
        Instance::new(
            vec![PhysicalMachine {
                id: 0,
                cpu: BigUint::from(10_u32), mem: BigUint::from(10_u32),
                idle: BigUint::from(50_u32), max: BigUint::from(100_u32)
            }],
            vec![Job {
                id: 0,
                vms: vec![VirtualMachine {
                    job: 0, index: 0,
                    cpu: BigUint::from(5_u32), mem: BigUint::from(5_u32),
                    anti_colocatable: false, forbidden: vec![]
                }]
            }],
            vec![], 1.0)
    }

    fn export(decimal: bool) -> String {
        let instance = tiny_instance();
        let mut writer = OpbWriter::new(decimal);
        let encoding = PlacementEncoding::encode(
            &instance, EncoderConfig::default(), &mut writer).unwrap();
        writer.set_objectives(encoding.objectives());
        let mut buffer = vec![];
        writer.write_to(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn the_header_counts_variables_and_constraints() {
        let text = export(false);
        let header = text.lines().next().unwrap();
        assert!(header.starts_with("* #variable= "));
        assert!(header.contains("#constraint= "));
    }
    #[test]
    fn the_objective_is_one_min_line_with_parenthesised_ratios() {
        let text = export(false);
        let min = text.lines().nth(1).unwrap();
        assert!(min.starts_with("min: ( "));
        assert!(min.trim_end().ends_with(";"));
        // wastage keeps its per-host denominator
        assert!(min.contains(") / ("));
    }
    #[test]
    fn constraint_lines_are_semicolon_terminated() {
        let text = export(false);
        assert!(text.lines().skip(2).all(|l| l.trim_end().ends_with(";")));
    }
    #[test]
    fn literals_use_the_xn_syntax() {
        let text = export(false);
        assert!(text.contains("x1"));
        assert!(text.contains("~x"));
    }
    #[test]
    fn decimal_rendering_keeps_fractions_with_decimal_expansions() {
        // 1/2 has the decimal expansion 0.5
        assert_eq!("0.5", decimal(&BigRational::new(1.into(), 2.into())));
        assert_eq!("2", decimal(&BigRational::from_integer(2.into())));
        assert_eq!("1/3", decimal(&BigRational::new(1.into(), 3.into())));
    }
    #[test]
    fn both_renderings_produce_an_objective() {
        assert!(export(true).lines().nth(1).unwrap().starts_with("min:"));
        assert!(export(false).lines().nth(1).unwrap().starts_with("min:"));
    }
}
