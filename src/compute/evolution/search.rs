//! Experiment drivers.
//!
//! [`EvolutionEngine`] runs the standard meta-algorithms (SIMPLE, the two
//! (mu, lambda) schemes and DPGA) through one dispatch over
//! [`MetaAlgorithm`]. [`NichingEngine`] runs the diversity-based experiment and
//! can resume from its checkpoint. Both record generation 0 (the evaluated
//! initial population) followed by one record per generation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rand::prelude::*;

use crate::schema::{
    CHECKPOINT_VERSION, Checkpoint, CheckpointPolicy, ConfigError, LogRecord, MetaAlgorithm,
    RecordError, RunConfig, RunResult,
};

use super::adaptive::ControllerReading;
use super::algorithms::{
    AlgorithmParams, evaluate_population, mu_comma_lambda_generation, mu_plus_lambda_generation,
    simple_generation,
};
use super::archive::HallOfFame;
use super::dpga::DualPopulation;
use super::individual::{Fitness, FitnessShape, Individual};
use super::niching::{NichingQuotas, NichingTransform, PopulationStructures};
use super::simulator::{Simulator, SimulatorError};
use super::stats::{FitnessSummary, Logbook};
use super::toolbox::{SimulatorToolbox, Toolbox};

/// Errors that end a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("Simulator error: {0}")]
    Simulator(#[from] SimulatorError),
    #[error("Failed to save checkpoint {}: {source}", path.display())]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: RecordError,
    },
    #[error("Meta-algorithm {0} is not handled by this engine")]
    UnsupportedMeta(MetaAlgorithm),
    /// The simulator or an operator panicked; only raised by sweeps.
    #[error("Run panicked: {0}")]
    Panicked(String),
}

/// Progress snapshot handed to run callbacks after every recorded generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationReport {
    pub generation: usize,
    pub total_generations: usize,
    pub record: LogRecord,
    /// Fitness of the best individual ever seen.
    pub best_fitness: Option<Fitness>,
}

enum Populations {
    Single(Vec<Individual>),
    Dual(DualPopulation),
}

impl Populations {
    /// The population that is scored, recorded and offered to the hall of fame.
    fn scored(&self) -> &[Individual] {
        match self {
            Self::Single(population) => population,
            Self::Dual(dual) => &dual.main,
        }
    }
}

/// Wall-clock time accumulated across resumed sessions.
#[derive(Debug, Clone, Copy)]
struct RunClock {
    before: f64,
    started: Instant,
}

impl RunClock {
    fn new(before: f64) -> Self {
        Self {
            before,
            started: Instant::now(),
        }
    }

    fn elapsed(&self) -> f64 {
        self.before + self.started.elapsed().as_secs_f64()
    }
}

/// Apply the configured policy to a failed save.
fn save_failed(policy: CheckpointPolicy, path: &Path, source: RecordError) -> Result<(), RunError> {
    match policy {
        CheckpointPolicy::Halt => Err(RunError::Checkpoint {
            path: path.to_path_buf(),
            source,
        }),
        CheckpointPolicy::Continue => {
            log::error!("Failed to save {}, continuing: {source}", path.display());
            Ok(())
        }
    }
}

/// Driver for SIMPLE, MU_PLUS_LAMBDA, MU_COMMA_LAMBDA and DPGA.
pub struct EvolutionEngine<T> {
    config: RunConfig,
    params: AlgorithmParams,
    toolbox: T,
    rng: StdRng,
    populations: Populations,
    hall_of_fame: HallOfFame,
    logbook: Logbook,
    generation: usize,
    clock: RunClock,
    cancelled: Arc<AtomicBool>,
}

impl<T: Toolbox> EvolutionEngine<T> {
    /// Validate `config` and build an engine. Niching runs are rejected; they
    /// belong to [`NichingEngine`].
    pub fn new(config: RunConfig, toolbox: T) -> Result<Self, RunError> {
        config.validate()?;
        if config.meta == MetaAlgorithm::Niching {
            return Err(RunError::UnsupportedMeta(config.meta));
        }
        Ok(Self {
            params: AlgorithmParams::from_config(&config),
            rng: StdRng::seed_from_u64(config.seed),
            hall_of_fame: HallOfFame::new(config.hof_size),
            populations: Populations::Single(Vec::new()),
            logbook: Logbook::new(),
            generation: 0,
            clock: RunClock::new(0.0),
            cancelled: Arc::new(AtomicBool::new(false)),
            config,
            toolbox,
        })
    }

    /// Get cancellation handle.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Run configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Current generation index.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Best individuals seen so far.
    pub fn hall_of_fame(&self) -> &HallOfFame {
        &self.hall_of_fame
    }

    /// Recorded generation statistics.
    pub fn logbook(&self) -> &Logbook {
        &self.logbook
    }

    /// Current population; the main pool under DPGA.
    pub fn population(&self) -> &[Individual] {
        self.populations.scored()
    }

    /// Reserve pool under DPGA.
    pub fn reserve(&self) -> Option<&[Individual]> {
        match &self.populations {
            Populations::Single(_) => None,
            Populations::Dual(dual) => Some(&dual.reserve),
        }
    }

    /// Mutable access to the toolbox.
    pub fn toolbox_mut(&mut self) -> &mut T {
        &mut self.toolbox
    }

    /// Build and evaluate the initial population, recorded as generation 0.
    pub fn initialize(&mut self) -> Result<(), RunError> {
        let population = self.toolbox.make_population(self.config.popsize)?;
        self.generation = 0;
        self.clock = RunClock::new(0.0);

        let nevals = match self.config.meta {
            MetaAlgorithm::Dpga => {
                let mut dual = DualPopulation::split(population);
                let nevals = dual.initialize(&mut self.toolbox);
                log::debug!(
                    "DPGA pools: main {}, reserve {}, cross-breeding {} from each",
                    dual.main_size(),
                    dual.reserve_size(),
                    dual.cross_breed_count()
                );
                self.populations = Populations::Dual(dual);
                nevals
            }
            _ => {
                let mut population = population;
                let nevals = evaluate_population(&mut population, &mut self.toolbox, false);
                self.populations = Populations::Single(population);
                nevals
            }
        };

        self.hall_of_fame
            .update(self.populations.scored(), self.toolbox.shape());
        self.record(nevals);
        self.save_periodic()
    }

    /// Run a single generation step.
    pub fn step_generation(&mut self) -> Result<(), RunError> {
        self.generation += 1;
        let toolbox = &mut self.toolbox;
        let params = &self.params;
        let hof = &mut self.hall_of_fame;
        let rng = &mut self.rng;

        let nevals = match (&mut self.populations, self.config.meta) {
            (Populations::Dual(dual), _) => dual.generation(toolbox, params, hof, rng),
            (Populations::Single(population), meta) => {
                let (next, nevals) = match meta {
                    MetaAlgorithm::MuPlusLambda => {
                        mu_plus_lambda_generation(population.as_slice(), toolbox, params, hof, rng)
                    }
                    MetaAlgorithm::MuCommaLambda => {
                        mu_comma_lambda_generation(population.as_slice(), toolbox, params, hof, rng)
                    }
                    _ => simple_generation(population.as_slice(), toolbox, params, hof, rng),
                };
                *population = next;
                nevals
            }
        };

        self.record(nevals);
        self.save_periodic()
    }

    fn record(&mut self, nevals: usize) {
        let population = self.populations.scored();
        let fitnesses: Vec<Fitness> = population.iter().filter_map(|i| i.fitness.clone()).collect();
        let reading = self.toolbox.adapt(&fitnesses, &mut self.rng);
        let summary = FitnessSummary::of_population(population);
        self.logbook.record(self.generation, nevals, summary, reading);
    }

    fn save_periodic(&self) -> Result<(), RunError> {
        let Some(out) = &self.config.out else {
            return Ok(());
        };
        if !self.params.is_save_generation(self.generation) {
            return Ok(());
        }
        match self.result(true).save(out) {
            Ok(()) => {
                log::debug!("Saved generation {} to {}", self.generation, out.display());
                Ok(())
            }
            Err(source) => save_failed(self.config.checkpoint_failure, out, source),
        }
    }

    /// Result document for the current state; `partial` adds the generation
    /// index.
    pub fn result(&self, partial: bool) -> RunResult {
        RunResult {
            hof: RunResult::hof_entries(self.hall_of_fame.items()),
            log: self.logbook.records().to_vec(),
            args: self.config.clone(),
            time_s: self.clock.elapsed(),
            generation: partial.then_some(self.generation),
        }
    }

    fn report(&self) -> GenerationReport {
        GenerationReport {
            generation: self.generation,
            total_generations: self.params.ngen,
            record: self.logbook.last().cloned().unwrap_or_else(|| empty_record(self.generation)),
            best_fitness: self.hall_of_fame.best().and_then(|b| b.fitness.clone()),
        }
    }

    fn should_stop(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed) || self.generation >= self.params.ngen
    }

    /// Run evolution with progress callback, then write the final result.
    pub fn run_with_callback<F>(&mut self, mut callback: F) -> Result<RunResult, RunError>
    where
        F: FnMut(&GenerationReport),
    {
        self.initialize()?;
        callback(&self.report());

        while !self.should_stop() {
            self.step_generation()?;
            callback(&self.report());
        }
        if self.cancelled.load(Ordering::Relaxed) {
            log::warn!("Run cancelled after generation {}", self.generation);
        }

        finish(self.result(false), &self.config)
    }

    /// Run evolution (blocking).
    pub fn run(&mut self) -> Result<RunResult, RunError> {
        self.run_with_callback(|_| {})
    }
}

/// Driver for the niching experiment. Saves a checkpoint after every
/// generation and resumes from it when one exists.
pub struct NichingEngine<T> {
    config: RunConfig,
    toolbox: T,
    transform: NichingTransform,
    quotas: NichingQuotas,
    rng: StdRng,
    structures: PopulationStructures,
    hall_of_fame: HallOfFame,
    logbook: Logbook,
    generation: usize,
    clock: RunClock,
    cancelled: Arc<AtomicBool>,
}

impl<T: Toolbox> NichingEngine<T> {
    /// Create an engine for a niching configuration.
    pub fn new(config: RunConfig, toolbox: T) -> Result<Self, RunError> {
        config.validate()?;
        if config.meta != MetaAlgorithm::Niching {
            return Err(RunError::UnsupportedMeta(config.meta));
        }
        let (mutants, crossovers) = config.niching_quotas();
        Ok(Self {
            transform: NichingTransform::new(&config.niching),
            quotas: NichingQuotas {
                mutants,
                crossovers,
            },
            rng: StdRng::seed_from_u64(config.seed),
            structures: PopulationStructures::new(Vec::new(), &config.niching),
            hall_of_fame: HallOfFame::new(config.hof_size),
            logbook: Logbook::new(),
            generation: 0,
            clock: RunClock::new(0.0),
            cancelled: Arc::new(AtomicBool::new(false)),
            config,
            toolbox,
        })
    }

    /// Get a handle for cancelling the run.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Current generation index.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Best individuals seen so far, by raw fitness.
    pub fn hall_of_fame(&self) -> &HallOfFame {
        &self.hall_of_fame
    }

    /// Recorded generation statistics.
    pub fn logbook(&self) -> &Logbook {
        &self.logbook
    }

    /// Current population and archive.
    pub fn structures(&self) -> &PopulationStructures {
        &self.structures
    }

    /// Restore the checkpoint next to `out` if there is one, otherwise start
    /// fresh. Returns whether the run was resumed.
    pub fn resume_or_initialize(&mut self) -> Result<bool, RunError> {
        let checkpoint = match self.config.state_path() {
            Some(path) => Checkpoint::load(&path)?,
            None => None,
        };
        match checkpoint {
            Some(checkpoint) => {
                self.restore(checkpoint);
                Ok(true)
            }
            None => {
                self.initialize()?;
                Ok(false)
            }
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        if checkpoint.config != self.config {
            log::warn!("Checkpoint was written with a different configuration, resuming anyway");
        }
        log::info!(
            "Resuming niching run at generation {} ({} individuals, archive {})",
            checkpoint.generation + 1,
            checkpoint.population.len(),
            checkpoint.archive.len()
        );
        self.structures = PopulationStructures::restore(
            checkpoint.population,
            checkpoint.archive,
            &self.config.niching,
        );
        self.hall_of_fame = HallOfFame::from_entries(self.config.hof_size, checkpoint.hall_of_fame);
        self.logbook = Logbook::from_records(checkpoint.logbook);
        self.generation = checkpoint.generation;
        self.clock = RunClock::new(checkpoint.time_elapsed);
        // The random stream is not checkpointed; derive a fresh one per resume point
        self.rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(checkpoint.generation as u64));
    }

    /// Evaluate a fresh population, recorded as generation 0.
    pub fn initialize(&mut self) -> Result<(), RunError> {
        let population = self.toolbox.make_population(self.config.popsize)?;
        self.structures = PopulationStructures::new(population, &self.config.niching);
        self.generation = 0;
        self.clock = RunClock::new(0.0);

        let nevals = self.transform.initialize(&mut self.structures, &mut self.toolbox);
        self.update_hall_of_fame();
        self.record(nevals);
        self.save_checkpoint()
    }

    /// Run a single generation step.
    pub fn step_generation(&mut self) -> Result<(), RunError> {
        self.generation += 1;
        let nevals = if self.transform.mode().is_multi_objective() {
            self.transform.generation_multi_objective(
                &mut self.structures,
                &mut self.toolbox,
                self.quotas,
                &mut self.rng,
            )
        } else {
            self.transform.generation(
                &mut self.structures,
                &mut self.toolbox,
                self.quotas,
                &mut self.rng,
            )
        };
        self.update_hall_of_fame();
        self.record(nevals);
        self.save_checkpoint()
    }

    /// The hall of fame ranks raw scores, whatever the transformed fitness.
    fn update_hall_of_fame(&mut self) {
        let raw: Vec<Individual> = self
            .structures
            .population
            .iter()
            .map(|i| Individual::with_fitness(i.genotype.clone(), vec![i.raw()]))
            .collect();
        self.hall_of_fame.update(&raw, &FitnessShape::maximizing(1));
    }

    fn record(&mut self, nevals: usize) {
        let raw: Vec<Fitness> = self.structures.population.iter().map(|i| vec![i.raw()]).collect();
        let summary = FitnessSummary::compile(&raw.iter().collect::<Vec<_>>());
        self.logbook
            .record(self.generation, nevals, summary, ControllerReading::None);
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            version: CHECKPOINT_VERSION,
            generation: self.generation,
            population: self.structures.population.clone(),
            archive: self.structures.archive.clone(),
            hall_of_fame: self.hall_of_fame.items().to_vec(),
            logbook: self.logbook.records().to_vec(),
            config: self.config.clone(),
            time_elapsed: self.clock.elapsed(),
        }
    }

    fn save_checkpoint(&self) -> Result<(), RunError> {
        let Some(path) = self.config.state_path() else {
            return Ok(());
        };
        match self.checkpoint().save(&path) {
            Ok(()) => Ok(()),
            Err(source) => save_failed(self.config.checkpoint_failure, &path, source),
        }
    }

    /// Final result document.
    pub fn result(&self) -> RunResult {
        RunResult {
            hof: RunResult::hof_entries(self.hall_of_fame.items()),
            log: self.logbook.records().to_vec(),
            args: self.config.clone(),
            time_s: self.clock.elapsed(),
            generation: None,
        }
    }

    fn report(&self) -> GenerationReport {
        GenerationReport {
            generation: self.generation,
            total_generations: self.config.generations,
            record: self.logbook.last().cloned().unwrap_or_else(|| empty_record(self.generation)),
            best_fitness: self.hall_of_fame.best().and_then(|b| b.fitness.clone()),
        }
    }

    /// Resume or initialize, evolve to the configured generation count and
    /// write the final result.
    pub fn run_with_callback<F>(&mut self, mut callback: F) -> Result<RunResult, RunError>
    where
        F: FnMut(&GenerationReport),
    {
        self.resume_or_initialize()?;
        callback(&self.report());

        while !self.cancelled.load(Ordering::Relaxed) && self.generation < self.config.generations {
            self.step_generation()?;
            callback(&self.report());
        }

        finish(self.result(), &self.config)
    }

    /// Run to completion, resuming from a checkpoint when one exists.
    pub fn run(&mut self) -> Result<RunResult, RunError> {
        self.run_with_callback(|_| {})
    }
}

fn empty_record(generation: usize) -> LogRecord {
    LogRecord {
        generation,
        nevals: 0,
        avg: Vec::new(),
        stddev: Vec::new(),
        min: Vec::new(),
        max: Vec::new(),
        strength: None,
        temperature: None,
    }
}

/// Write the final result document when an output path is configured.
fn finish(result: RunResult, config: &RunConfig) -> Result<RunResult, RunError> {
    if let Some(out) = &config.out {
        result.save(out)?;
        log::info!(
            "Saved {} hall-of-fame entries to {} ({:.2}s)",
            result.hof.len(),
            out.display(),
            result.time_s
        );
    }
    Ok(result)
}

/// Validate `config`, run the configured experiment on `simulator` and write
/// the result document.
pub fn run_experiment<S: Simulator>(config: RunConfig, simulator: S) -> Result<RunResult, RunError> {
    config.validate()?;
    log::info!(
        "Starting {} run: popsize {}, {} generations, criteria {:?}, seed {}",
        config.meta,
        config.popsize,
        config.generations,
        config.criteria,
        config.seed
    );
    let toolbox = SimulatorToolbox::from_config(simulator, &config)?;
    let meta = config.meta;
    match meta {
        MetaAlgorithm::Niching => NichingEngine::new(config, toolbox)?.run(),
        _ => EvolutionEngine::new(config, toolbox)?.run(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::evolution::numeric::NumericSimulator;
    use crate::schema::{FitnessMode, MutationControl, NichingConfig};
    use tempfile::tempdir;

    fn engine(config: RunConfig) -> EvolutionEngine<SimulatorToolbox<NumericSimulator>> {
        let toolbox =
            SimulatorToolbox::from_config(NumericSimulator::new(3, config.seed), &config).unwrap();
        EvolutionEngine::new(config, toolbox).unwrap()
    }

    fn niching_engine(config: RunConfig) -> NichingEngine<SimulatorToolbox<NumericSimulator>> {
        let toolbox =
            SimulatorToolbox::from_config(NumericSimulator::new(2, config.seed), &config).unwrap();
        NichingEngine::new(config, toolbox).unwrap()
    }

    fn best(result: &RunResult) -> f64 {
        result.hof[0].fitness[0]
    }

    #[test]
    fn test_simple_best_never_regresses_between_saves() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("simple.json");
        let config = RunConfig {
            popsize: 10,
            generations: 5,
            seed: 42,
            out: Some(out.clone()),
            ..Default::default()
        };
        let mut engine = engine(config);

        engine.initialize().unwrap();
        let first = RunResult::load(&out).unwrap();
        assert_eq!(first.generation, Some(0));
        assert_eq!(first.log.len(), 1);

        for _ in 0..5 {
            engine.step_generation().unwrap();
        }
        let last = RunResult::load(&out).unwrap();
        assert_eq!(last.generation, Some(5));
        assert_eq!(last.log.len(), 6);
        assert!(best(&last) >= best(&first));
        assert!(last.hof.len() <= 10);
    }

    #[test]
    fn test_run_writes_final_result() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("final.json");
        let config = RunConfig {
            popsize: 8,
            generations: 3,
            out: Some(out.clone()),
            ..Default::default()
        };
        let mut reports = Vec::new();
        let result = engine(config)
            .run_with_callback(|r| reports.push(r.generation))
            .unwrap();

        assert_eq!(reports, vec![0, 1, 2, 3]);
        let saved = RunResult::load(&out).unwrap();
        assert_eq!(saved.generation, None);
        let genotypes = |r: &RunResult| -> Vec<String> {
            r.hof.iter().map(|e| e.genotype.clone()).collect()
        };
        assert_eq!(genotypes(&saved), genotypes(&result));
        let gens: Vec<usize> = saved.log.iter().map(|r| r.generation).collect();
        assert_eq!(gens, vec![0, 1, 2, 3]);
        assert_eq!(saved.log[0].nevals, 8);
    }

    #[test]
    fn test_same_seed_same_run() {
        let config = RunConfig {
            popsize: 6,
            generations: 4,
            seed: 3,
            meta: MetaAlgorithm::MuPlusLambda,
            pmut: 0.6,
            pxov: 0.3,
            ..Default::default()
        };
        let a = engine(config.clone()).run().unwrap();
        let b = engine(config).run().unwrap();
        assert_eq!(a.hof, b.hof);
        assert_eq!(a.log, b.log);
    }

    #[test]
    fn test_annealing_temperature_is_logged() {
        let config = RunConfig {
            popsize: 6,
            generations: 3,
            meta: MetaAlgorithm::MuCommaLambda,
            lambda: 1.5,
            pmut: 0.5,
            pxov: 0.3,
            mutation: MutationControl::simulated_annealing(50.0),
            ..Default::default()
        };
        let result = engine(config).run().unwrap();
        assert_eq!(result.log.len(), 4);
        assert!(result.log.iter().all(|r| r.temperature.is_some()));
        assert!(result.log.iter().all(|r| r.strength.is_none()));
    }

    #[test]
    fn test_dpga_partial_save() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("dpga.json");
        let config = RunConfig {
            popsize: 10,
            generations: 2,
            save_period: 1,
            meta: MetaAlgorithm::Dpga,
            out: Some(out.clone()),
            ..Default::default()
        };
        let mut engine = engine(config);
        engine.initialize().unwrap();
        assert_eq!(engine.population().len(), 4);
        assert_eq!(engine.reserve().map(<[Individual]>::len), Some(6));

        engine.step_generation().unwrap();
        let partial = RunResult::load(&out).unwrap();
        assert_eq!(partial.generation, Some(1));
        assert!(!partial.hof.is_empty());
        assert_eq!(partial.args.meta, MetaAlgorithm::Dpga);
        assert_eq!(engine.population().len(), 4);
    }

    #[test]
    fn test_failed_save_halts_or_continues() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("missing").join("run.json");
        let config = RunConfig {
            popsize: 4,
            generations: 1,
            out: Some(out.clone()),
            ..Default::default()
        };

        let mut halting = engine(config.clone());
        let err = halting.initialize().unwrap_err();
        assert!(matches!(err, RunError::Checkpoint { ref path, .. } if *path == out));
        assert_eq!(halting.logbook().len(), 1);
        assert_eq!(halting.population().len(), 4);

        let mut tolerant = engine(RunConfig {
            checkpoint_failure: CheckpointPolicy::Continue,
            ..config
        });
        tolerant.initialize().unwrap();
        tolerant.step_generation().unwrap();
        assert_eq!(tolerant.generation(), 1);
    }

    #[test]
    fn test_cancelled_run_stops_after_initialization() {
        let config = RunConfig {
            popsize: 4,
            generations: 50,
            ..Default::default()
        };
        let mut engine = engine(config);
        engine.cancel_handle().store(true, Ordering::Relaxed);
        let result = engine.run().unwrap();
        assert_eq!(result.log.len(), 1);
    }

    #[test]
    fn test_niching_config_rejected_by_evolution_engine() {
        let config = RunConfig {
            meta: MetaAlgorithm::Niching,
            pmut: 0.5,
            ..Default::default()
        };
        let toolbox =
            SimulatorToolbox::from_config(NumericSimulator::new(2, 0), &config).unwrap();
        assert!(matches!(
            EvolutionEngine::new(config, toolbox),
            Err(RunError::UnsupportedMeta(MetaAlgorithm::Niching))
        ));
    }

    #[test]
    fn test_knn_bound_fails_before_any_generation() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("knn.json");
        let config = RunConfig {
            popsize: 10,
            meta: MetaAlgorithm::Niching,
            niching: NichingConfig {
                fit: FitnessMode::Nslc,
                knn_nslc: 9,
                ..Default::default()
            },
            out: Some(out.clone()),
            ..Default::default()
        };
        let err = run_experiment(config, NumericSimulator::new(2, 0)).unwrap_err();
        assert!(matches!(
            err,
            RunError::Config(ConfigError::KnnTooLarge { value: 9, max: 8, .. })
        ));
        assert!(!out.exists());
    }

    #[test]
    fn test_niching_resumes_from_checkpoint() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("nslc.json");
        let config = RunConfig {
            popsize: 8,
            generations: 3,
            pmut: 0.5,
            pxov: 0.25,
            meta: MetaAlgorithm::Niching,
            niching: NichingConfig {
                fit: FitnessMode::Nslc,
                knn_nslc: 3,
                archive_size: 5,
                ..Default::default()
            },
            out: Some(out.clone()),
            ..Default::default()
        };
        let state = config.state_path().unwrap();
        assert_eq!(state, dir.path().join("nslc_state.json"));

        let first = niching_engine(config.clone()).run().unwrap();
        assert_eq!(first.log.len(), 4);
        let checkpoint = Checkpoint::load(&state).unwrap().unwrap();
        assert_eq!(checkpoint.generation, 3);
        assert_eq!(checkpoint.population.len(), 8);
        assert!(checkpoint.archive.len() <= 5);

        let mut resumed = niching_engine(RunConfig {
            generations: 5,
            ..config
        });
        assert!(resumed.resume_or_initialize().unwrap());
        assert_eq!(resumed.generation(), 3);
        assert_eq!(resumed.structures().population, checkpoint.population);

        while resumed.generation() < 5 {
            resumed.step_generation().unwrap();
        }
        let second = resumed.result();
        let gens: Vec<usize> = second.log.iter().map(|r| r.generation).collect();
        assert_eq!(gens, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(second.log[..4], checkpoint.logbook[..]);
        assert!(best(&second) >= best(&first));
        assert_eq!(Checkpoint::load(&state).unwrap().unwrap().generation, 5);
    }

    #[test]
    fn test_niching_hall_of_fame_holds_raw_scores() {
        let config = RunConfig {
            popsize: 6,
            generations: 2,
            meta: MetaAlgorithm::Niching,
            niching: NichingConfig {
                fit: FitnessMode::Novelty,
                knn_niching: 2,
                knn_nslc: 2,
                fitness_set_negative_to_zero: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let result = niching_engine(config).run().unwrap();
        assert!(result.hof.iter().all(|e| e.fitness == vec![0.0]));
        assert!(result.log.iter().all(|r| r.max == vec![0.0]));
    }
}
