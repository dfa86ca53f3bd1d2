//! morphevo - Evolutionary computation harness for creature-morphology simulators.
//!
//! The crate evolves opaque genotypes scored by an external simulator. It
//! provides standard generational algorithms, a dual-population scheme with a
//! diversity reserve, adaptive mutation control and niching/novelty fitness
//! based on pairwise dissimilarity.
//!
//! # Architecture
//!
//! The crate is split into three modules:
//!
//! - `schema`: Run configuration, result documents and checkpoints
//! - `compute`: Evolutionary algorithms, operators and the simulator boundary
//! - `sweep`: Independent runs executed in parallel
//!
//! # Example
//!
//! ```rust,no_run
//! use morphevo::{
//!     compute::evolution::{NumericSimulator, run_experiment},
//!     schema::{MetaAlgorithm, RunConfig},
//! };
//!
//! let config = RunConfig {
//!     meta: MetaAlgorithm::Dpga,
//!     popsize: 20,
//!     generations: 10,
//!     ..Default::default()
//! };
//! let result = run_experiment(config, NumericSimulator::new(4, 0))?;
//! println!("Best fitness: {:?}", result.hof[0].fitness);
//! # Ok::<(), morphevo::compute::evolution::RunError>(())
//! ```

pub mod compute;
pub mod schema;
pub mod sweep;

// Re-export commonly used types
pub use compute::evolution::{EvolutionEngine, NichingEngine, RunError, Simulator, run_experiment};
pub use schema::{RunConfig, RunResult};
