//! Evolutionary search over simulator genotypes.
//!
//! # Overview
//!
//! The evolutionary system consists of:
//!
//! - **Simulator boundary** (`simulator`, `numeric`): the external collaborator
//!   that scores, varies and compares genotypes, plus an in-crate numeric one
//! - **Evaluation** (`evaluator`): criteria extraction, structural limits and
//!   the bad-fitness fallback
//! - **Variation** (`variation`, `adaptive`): crossover, mutation, random
//!   perturbation and adaptive mutation control
//! - **Diversity** (`dissimilarity`, `niching`): pairwise dissimilarity and the
//!   niching/novelty fitness transforms
//! - **Selection** (`selection`, `archive`): tournament, NSGA-II, crowded
//!   tournament and the hall of fame
//! - **Drivers** (`algorithms`, `dpga`, `search`): generation steps and the
//!   engines that run them
//!
//! # Example
//!
//! ```rust,no_run
//! use morphevo::compute::evolution::{EvolutionEngine, NumericSimulator, SimulatorToolbox};
//! use morphevo::schema::RunConfig;
//!
//! let config = RunConfig::default();
//! let toolbox = SimulatorToolbox::from_config(NumericSimulator::new(4, config.seed), &config)?;
//! let mut engine = EvolutionEngine::new(config, toolbox)?;
//! let result = engine.run_with_callback(|report| {
//!     println!("Generation {}: best {:?}", report.generation, report.best_fitness);
//! })?;
//! println!("Best genotype: {}", result.hof[0].genotype);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod adaptive;
mod algorithms;
mod archive;
mod dissimilarity;
mod dpga;
mod evaluator;
mod individual;
mod niching;
mod numeric;
mod search;
mod selection;
mod simulator;
mod stats;
mod toolbox;
mod variation;

pub use adaptive::{
    ControllerReading, FixedMutation, MutationController, STAGNATION_BAND,
    SimulatedAnnealingMutation, VaryingStrengthMutation, controller_for,
};
pub use algorithms::{
    AlgorithmParams, evaluate_population, mu_comma_lambda_generation, mu_plus_lambda_generation,
    simple_generation,
};
pub use archive::HallOfFame;
pub use dissimilarity::{ComparisonMatrix, DissimilarityEngine, DissimilarityMatrix};
pub use dpga::{DualPopulation, reserve_fitness};
pub use evaluator::{GenotypeEvaluator, Rejection};
pub use individual::{Fitness, FitnessShape, Individual};
pub use niching::{NichingQuotas, NichingTransform, PopulationStructures};
pub use numeric::{METHOD_EUCLIDEAN, METHOD_MANHATTAN, NumericSimulator};
pub use search::{EvolutionEngine, GenerationReport, NichingEngine, RunError, run_experiment};
pub use selection::{
    assign_crowding, crowding_distances, non_dominated_fronts, select_nsga2, select_tournament,
    select_tournament_dcd,
};
pub use simulator::{INVALID_GENOTYPE, RandomGenotypeRequest, Simulator, SimulatorError, is_invalid};
pub use stats::{FitnessSummary, Logbook};
pub use toolbox::{SimulatorToolbox, Toolbox};
pub use variation::{
    Predefiner, Randomizer, cross, cross_genotypes, mutate, mutate_genotype, var_and, var_or,
};
