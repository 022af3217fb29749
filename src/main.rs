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

use std::fs::File;

use structopt::StructOpt;

use vmcwm::abstraction::allocator::PackingSeeder;
use vmcwm::common::{Clock, Error};
use vmcwm::implementation::algorithms::frame::run_multi_seed;
use vmcwm::implementation::algorithms::reducer::run_reduced;
use vmcwm::implementation::algorithms::stratification::StratStrategy;
use vmcwm::implementation::algorithms::AllocConfig;
use vmcwm::implementation::encoder::{EncoderConfig, PlacementEncoding};
use vmcwm::implementation::heuristics::{BestFitDecreasing, FirstFitDecreasing};
use vmcwm::implementation::opb::OpbWriter;
use vmcwm::instance::Instance;
use vmcwm::solution::{Evaluator, Population};

/// Computes Pareto-optimal virtual machine placements minimising energy
/// consumption, resource wastage and migration cost.
#[derive(StructOpt)]
struct Vmcwm {
    /// Path to the instance file
    fname: String,
    /// Algorithm selector: LS, MCS, PBO, FFD, BFD, DE, GA, MOEAD, BBO, GGA,
    /// GIA, HE, PCLD or PLBX
    #[structopt(short = "a", long = "algorithm", default_value = "PCLD")]
    algorithm: String,
    /// Timeout in seconds
    #[structopt(short = "t", long = "timeout", default_value = "3600")]
    timeout: u64,
    /// Fraction of the total host memory allowed to migrate
    #[structopt(short = "m", long = "migration", default_value = "1.0")]
    migration: f64,
    /// Shrink the host pool around a packing seed before the exact search
    #[structopt(short = "r", long = "reduce")]
    reduce: bool,
    /// Seeder of the reduction (FFD or BFD)
    #[structopt(long = "ra", default_value = "BFD")]
    reduction_algorithm: String,
    /// Break symmetries between identical hosts
    #[structopt(short = "s", long = "symmetry")]
    symmetry: bool,
    /// Drop the platform (forbidden host) constraints
    #[structopt(long = "ip")]
    ignore_platform: bool,
    /// Drop the anti-colocation constraints
    #[structopt(long = "ic")]
    ignore_colocation: bool,
    /// Evaluate the objectives without their denominators
    #[structopt(long = "ide")]
    ignore_denominators_eval: bool,
    /// Encode the objectives without their denominators
    #[structopt(long = "ida")]
    ignore_denominators_alloc: bool,
    /// Diversify with random xor hash constraints (HE, GIA, MCS, PCLD)
    #[structopt(long = "h")]
    hash_functions: bool,
    /// Block every emitted placement vector (PCLD)
    #[structopt(long = "pd")]
    path_diversification: bool,
    /// Stratification strategy (MERGED or SPLIT)
    #[structopt(long = "st")]
    stratification: Option<String>,
    /// Stratification: literal-to-weight ratio deriving the partition count
    #[structopt(long = "lwr")]
    literal_weight_ratio: Option<f64>,
    /// Stratification: fixed partition count
    #[structopt(long = "pn")]
    partitions: Option<usize>,
    /// Conflicts without progress before a partition merge is forced
    #[structopt(long = "pmc")]
    part_max_conflicts: Option<u64>,
    /// Number of reseeded runs to merge
    #[structopt(long = "ms", default_value = "1")]
    multi_seed: u64,
    /// Seed of the random generator
    #[structopt(long = "seed", default_value = "42")]
    seed: u64,
    /// Dump the encoded model to this path in OPB format
    #[structopt(long = "dm")]
    dump_model: Option<String>,
    /// Use decimal coefficients in the OPB dump
    #[structopt(long = "dc")]
    decimal_coefficients: bool,
    /// Quiet mode: suppress the `c` diagnostic lines
    #[structopt(short = "q", long = "quiet")]
    quiet: bool
}

/// The selectors whose operators live in the external evolutionary
/// framework.
const EVOLUTIONARY: [&str; 5] = ["DE", "GA", "MOEAD", "BBO", "GGA"];

fn main() {
    let args = Vmcwm::from_args();
    let clock = Clock::process();
    std::process::exit(run(args, clock));
}

fn run(args: Vmcwm, clock: Clock) -> i32 {
    let instance = match load_instance(&args) {
        Ok(instance) => instance,
        Err(error) => {
            println!("c {}", error);
            return 1;
        }
    };

    let algorithm = args.algorithm.to_uppercase();
    if EVOLUTIONARY.contains(&algorithm.as_str()) {
        println!("c the {} operators live in the external evolutionary framework", algorithm);
        println!("s FAILURE");
        return 0;
    }

    let config = AllocConfig {
        clock,
        timeout: args.timeout,
        verbosity: if args.quiet { 0 } else { 1 },
        seed: args.seed,
        multi_seed: args.multi_seed,
        encoder: EncoderConfig {
            symmetry_breaking: args.symmetry,
            drop_platform: args.ignore_platform,
            drop_anti_colocation: args.ignore_colocation,
            ignore_denominators: args.ignore_denominators_alloc
        },
        ignore_denominators_eval: args.ignore_denominators_eval,
        hash_functions: args.hash_functions,
        path_diversification: args.path_diversification,
        stratification: match args.stratification.as_deref().map(str::to_uppercase).as_deref() {
            None => None,
            Some("MERGED") => Some(StratStrategy::Merged),
            Some("SPLIT") => Some(StratStrategy::Split),
            Some(other) => {
                println!("c unknown stratification strategy: {}", other);
                return 1;
            }
        },
        literal_weight_ratio: args.literal_weight_ratio,
        partitions: args.partitions,
        part_max_conflicts: args.part_max_conflicts
    };

    if let Some(path) = &args.dump_model {
        if let Err(error) = dump_model(&instance, &config, path, args.decimal_coefficients) {
            println!("c model dump failed: {}", error);
        }
    }

    let outcome = if args.reduce {
        let seeder: Box<dyn PackingSeeder> =
            if args.reduction_algorithm.eq_ignore_ascii_case("FFD") {
                Box::new(FirstFitDecreasing)
            } else {
                Box::new(BestFitDecreasing)
            };
        run_reduced(&algorithm, &instance, &config, seeder.as_ref())
    } else {
        run_multi_seed(&algorithm, &instance, &config)
    };

    match outcome {
        Ok(population) => {
            print_population(&instance, &config, &population);
            0
        }
        Err(Error::HeuristicReductionFailed) => {
            println!("c {}", Error::HeuristicReductionFailed);
            println!("s FAILURE");
            0
        }
        Err(Error::NotSupported(what)) => {
            println!("c not supported: {}", what);
            1
        }
        Err(error) => {
            println!("c {}", error);
            1
        }
    }
}

fn load_instance(args: &Vmcwm) -> Result<Instance, Error> {
    let mut instance = Instance::from_read(File::open(&args.fname)?)?;
    instance.budget_fraction = args.migration.clamp(0.0, 1.0);
    Ok(instance)
}

/// Writes the OPB rendition of the encoded instance.
fn dump_model(instance: &Instance,
              config: &AllocConfig,
              path: &str,
              decimal: bool) -> Result<(), Error> {
    let mut writer = OpbWriter::new(decimal);
    let encoding = PlacementEncoding::encode(instance, config.encoder, &mut writer)?;
    writer.set_objectives(encoding.objectives());
    writer.write_to(&mut File::create(path)?)
}

/// Renders the final population with the output protocol: one result line,
/// then per solution its header, its placements and its objective vector in
/// fixed-point notation.
fn print_population(instance: &Instance, config: &AllocConfig, population: &Population) {
    if population.is_empty() {
        println!("c no feasible placement was found");
        println!("s FAILURE");
        return;
    }
    println!("s SUCCESS");
    let evaluator = Evaluator::new(instance, config.ignore_denominators_eval);
    let references = evaluator.reference_points();
    for (index, point) in population.iter().enumerate() {
        println!("s SOLUTION {}", index);
        for (v, vm) in instance.vms().enumerate() {
            let host = &instance.machines[point.assignment.hosts[v]];
            println!("p {}-{} -> {}", vm.job, vm.index, host.id);
        }
        let norm = point.objectives.normalized(&references);
        let keys = ["e", "w", "m"];
        let rendered = norm.iter()
            .zip(keys.iter())
            .map(|(value, key)| format!("{} {:.5}", key, value))
            .collect::<Vec<_>>()
            .join(" ");
        println!("{}", rendered);
    }
}
