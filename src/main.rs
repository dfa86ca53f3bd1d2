//! morphevo CLI - Run evolutionary experiments from JSON configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use morphevo::{
    compute::evolution::{NumericSimulator, run_experiment},
    schema::{RunConfig, harvest_best_genotypes, write_json_atomic},
    sweep::{default_workers, run_sweep},
};

/// Genes per genotype for the built-in numeric simulator.
const DEFAULT_DIMENSION: usize = 4;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage(&args[0]);
        process::exit(1);
    }

    match args[1].as_str() {
        "--example" => print_example_config(),
        "--sweep" => sweep(&args[2..]),
        "--harvest" => harvest(&args[2..]),
        path => run_single(Path::new(path), args.get(2)),
    }
}

fn print_usage(program: &str) {
    eprintln!("Usage: {program} <config.json> [dimension]");
    eprintln!("       {program} --sweep <configs.json> [workers] [dimension]");
    eprintln!("       {program} --harvest <results-dir> <threshold> <output.json>");
    eprintln!("       {program} --example");
    eprintln!();
    eprintln!("Run an evolutionary experiment on the numeric test simulator.");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  config.json   Run configuration (see --example)");
    eprintln!("  dimension     Genes per genotype (default: {DEFAULT_DIMENSION})");
    eprintln!("  configs.json  JSON list of run configurations");
    eprintln!("  workers       Parallel runs (default: CPUs - 2)");
    eprintln!("  threshold     Minimum first fitness component to harvest");
}

fn parse_dimension(arg: Option<&String>) -> usize {
    arg.and_then(|s| s.parse().ok()).unwrap_or(DEFAULT_DIMENSION)
}

fn read_or_exit<T: serde::de::DeserializeOwned>(path: &Path) -> T {
    let text = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {}", path.display(), e);
        process::exit(1);
    });
    serde_json::from_str(&text).unwrap_or_else(|e| {
        eprintln!("Error parsing {}: {}", path.display(), e);
        process::exit(1);
    })
}

fn run_single(config_path: &Path, dimension: Option<&String>) {
    let config: RunConfig = read_or_exit(config_path);
    let dimension = parse_dimension(dimension);

    println!("morphevo run");
    println!("============");
    println!("Meta-algorithm: {}", config.meta);
    println!("Criteria: {:?}", config.criteria);
    println!(
        "Population: {}, generations: {}, seed: {}",
        config.popsize, config.generations, config.seed
    );
    println!("Genotype dimension: {dimension}");
    println!();

    let simulator = NumericSimulator::new(dimension, config.seed);
    let result = run_experiment(config, simulator).unwrap_or_else(|e| {
        eprintln!("Run failed: {e}");
        process::exit(1);
    });

    println!("Hall of fame:");
    for (rank, entry) in result.hof.iter().enumerate() {
        println!("  {:>2}. {:?}  {}", rank + 1, entry.fitness, entry.genotype);
    }
    println!();
    println!("Time: {:.2}s", result.time_s);
}

fn sweep(args: &[String]) {
    let Some(path) = args.first() else {
        eprintln!("--sweep needs a configuration list");
        process::exit(1);
    };
    let configs: Vec<RunConfig> = read_or_exit(Path::new(path));
    let workers = args
        .get(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(default_workers);
    let dimension = parse_dimension(args.get(2));

    let outcomes = run_sweep(configs, workers, |config: &RunConfig| {
        NumericSimulator::new(dimension, config.seed)
    })
    .unwrap_or_else(|e| {
        eprintln!("Sweep failed: {e}");
        process::exit(1);
    });

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    println!("Sweep finished: {} runs, {} failed", outcomes.len(), failed);
    if failed > 0 {
        process::exit(1);
    }
}

fn harvest(args: &[String]) {
    let [dir, threshold, output] = args else {
        eprintln!("--harvest needs <results-dir> <threshold> <output.json>");
        process::exit(1);
    };
    let threshold: f64 = threshold.parse().unwrap_or_else(|e| {
        eprintln!("Invalid threshold '{threshold}': {e}");
        process::exit(1);
    });

    let genotypes = harvest_best_genotypes(Path::new(dir), threshold).unwrap_or_else(|e| {
        eprintln!("Harvest failed: {e}");
        process::exit(1);
    });
    let output = PathBuf::from(output);
    write_json_atomic(&output, &genotypes).unwrap_or_else(|e| {
        eprintln!("Error writing {}: {}", output.display(), e);
        process::exit(1);
    });
    println!(
        "Harvested {} genotypes with fitness >= {threshold} into {}",
        genotypes.len(),
        output.display()
    );
}

fn print_example_config() {
    let config = RunConfig {
        out: Some(PathBuf::from("results/run.json")),
        ..Default::default()
    };
    match serde_json::to_string_pretty(&config) {
        Ok(json) => {
            println!("Example configuration (config.json):");
            println!("{json}");
        }
        Err(e) => {
            eprintln!("Error serializing example: {e}");
            process::exit(1);
        }
    }
}
