//! Sweeps of independent runs.
//!
//! Every run owns its simulator, built by a factory on the worker that executes
//! it. Runs share no state and each writes only its own result file, so one
//! failing run never affects another. Configurations whose output file already
//! exists are skipped, which makes an interrupted sweep restartable. A panic
//! inside a run is caught and reported as that run's failure.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::compute::evolution::{RunError, Simulator, run_experiment};
use crate::schema::{RunConfig, RunResult};

/// Sweep setup errors. Failures of individual runs are reported per run.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[cfg(feature = "parallel")]
    #[error("Failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Outcome of one run of a sweep.
#[derive(Debug)]
pub struct SweepOutcome {
    pub out: Option<PathBuf>,
    pub seed: u64,
    pub result: Result<RunResult, RunError>,
}

/// Default worker count: all CPUs but two, at least one.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(2)
        .max(1)
}

/// `runs` copies of `base` with consecutive seeds, writing `<stem>_<i>.json`
/// next to the base output path.
pub fn replicate(base: &RunConfig, runs: usize) -> Vec<RunConfig> {
    (0..runs)
        .map(|i| RunConfig {
            seed: base.seed.wrapping_add(i as u64),
            out: base.out.as_deref().map(|out| numbered(out, i)),
            ..base.clone()
        })
        .collect()
}

fn numbered(out: &Path, index: usize) -> PathBuf {
    let stem = out
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "run".to_string());
    out.with_file_name(format!("{stem}_{index}.json"))
}

/// Drop configurations whose output file already exists.
pub fn pending(configs: Vec<RunConfig>) -> Vec<RunConfig> {
    configs
        .into_iter()
        .filter(|config| match &config.out {
            Some(out) if out.exists() => {
                log::info!("Skipping {}: result already exists", out.display());
                false
            }
            _ => true,
        })
        .collect()
}

fn execute<S, F>(config: RunConfig, factory: &F) -> SweepOutcome
where
    S: Simulator,
    F: Fn(&RunConfig) -> S,
{
    let out = config.out.clone();
    let seed = config.seed;
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let simulator = factory(&config);
        run_experiment(config, simulator)
    }))
    .unwrap_or_else(|payload| Err(RunError::Panicked(panic_message(payload.as_ref()))));
    if let Err(e) = &result {
        let target = out.as_deref().map(Path::display);
        match target {
            Some(path) => log::error!("Run {path} (seed {seed}) failed: {e}"),
            None => log::error!("Run with seed {seed} failed: {e}"),
        }
    }
    SweepOutcome { out, seed, result }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run every pending configuration on a pool of `workers` threads. Outcomes
/// are returned in input order.
#[cfg(feature = "parallel")]
pub fn run_sweep<S, F>(
    configs: Vec<RunConfig>,
    workers: usize,
    factory: F,
) -> Result<Vec<SweepOutcome>, SweepError>
where
    S: Simulator,
    F: Fn(&RunConfig) -> S + Sync,
{
    let configs = pending(configs);
    log::info!("Sweep: {} runs on {} workers", configs.len(), workers.max(1));
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()?;
    Ok(pool.install(|| {
        configs
            .into_par_iter()
            .map(|config| execute(config, &factory))
            .collect()
    }))
}

/// Run every pending configuration in turn.
#[cfg(not(feature = "parallel"))]
pub fn run_sweep<S, F>(
    configs: Vec<RunConfig>,
    _workers: usize,
    factory: F,
) -> Result<Vec<SweepOutcome>, SweepError>
where
    S: Simulator,
    F: Fn(&RunConfig) -> S,
{
    let configs = pending(configs);
    log::info!("Sweep: {} runs, sequential", configs.len());
    Ok(configs
        .into_iter()
        .map(|config| execute(config, &factory))
        .collect())
}
