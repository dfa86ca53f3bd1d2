//! Compare meta-algorithms on the numeric sphere problem.
//!
//! Runs a few seeds of every meta-algorithm in parallel and prints the best
//! fitness each one reached.

use std::time::Instant;

use morphevo::{
    compute::evolution::NumericSimulator,
    schema::{FitnessMode, MetaAlgorithm, NichingConfig, RunConfig},
    sweep::{default_workers, replicate, run_sweep},
};

fn main() {
    env_logger::init();

    println!("=== Sphere sweep ===\n");

    let metas = [
        MetaAlgorithm::Simple,
        MetaAlgorithm::MuPlusLambda,
        MetaAlgorithm::MuCommaLambda,
        MetaAlgorithm::Dpga,
        MetaAlgorithm::Niching,
    ];

    let mut configs = Vec::new();
    for meta in metas {
        let base = RunConfig {
            meta,
            popsize: 30,
            generations: 20,
            pmut: 0.6,
            pxov: 0.3,
            lambda: 1.5,
            niching: NichingConfig {
                fit: FitnessMode::Nslc,
                ..Default::default()
            },
            ..Default::default()
        };
        configs.extend(replicate(&base, 3));
    }

    let start = Instant::now();
    let outcomes = run_sweep(configs, default_workers(), |config: &RunConfig| {
        NumericSimulator::new(6, config.seed)
    })
    .unwrap_or_else(|e| {
        eprintln!("Sweep failed: {e}");
        std::process::exit(1);
    });

    for outcome in &outcomes {
        match &outcome.result {
            Ok(result) => {
                let best = result.hof.first().map(|e| e.fitness[0]).unwrap_or(f64::NAN);
                println!(
                    "  {:<16} seed {:>2}: best {:>10.4}  ({:.2}s)",
                    result.args.meta.to_string(),
                    outcome.seed,
                    best,
                    result.time_s
                );
            }
            Err(e) => println!("  seed {:>2}: failed: {e}", outcome.seed),
        }
    }
    println!("\nTotal: {:.2}s", start.elapsed().as_secs_f64());
}
