//! Run configuration for evolutionary experiments.
//!
//! A [`RunConfig`] is the fully parsed description of one evolutionary run. It is
//! produced by the launcher (a JSON file, or a sweep definition) and consumed as-is
//! by the runners in [`crate::compute::evolution`]. Every field has a default so a
//! configuration file only needs to mention what it changes.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Fraction of the total population assigned to the DPGA reserve pool.
pub const DPGA_RESERVE_RATIO: f64 = 0.6;

/// Structural metrics checked by the evaluator, in the order they are reported.
pub const STRUCTURAL_CRITERIA: [&str; 5] = [
    "numparts",
    "numjoints",
    "numneurons",
    "numconnections",
    "numgenochars",
];

/// Top-level configuration of a single evolutionary run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    /// Genetic format used to produce the simplest genotype.
    #[serde(default = "default_genformat")]
    pub genformat: String,
    /// Genotype used to seed the population instead of the simplest one.
    #[serde(default)]
    pub initial_genotype: Option<String>,
    /// Optimization criteria, read from the simulator's evaluation data.
    #[serde(default = "default_criteria")]
    pub criteria: Vec<String>,
    /// Total population size.
    #[serde(default = "default_popsize")]
    pub popsize: usize,
    /// Number of generations after the initial evaluation.
    #[serde(default = "default_generations")]
    pub generations: usize,
    /// Tournament size for single-criterion selection.
    #[serde(default = "default_tournament")]
    pub tournament: usize,
    /// Probability of mutation.
    #[serde(default = "default_pmut")]
    pub pmut: f64,
    /// Probability of crossover.
    #[serde(default = "default_pxov")]
    pub pxov: f64,
    /// Number of genotypes kept in the hall of fame.
    #[serde(default = "default_hof_size")]
    pub hof_size: usize,
    /// Structural limits; violating any of them yields bad fitness.
    #[serde(default)]
    pub constraints: StructuralConstraints,
    /// Seed of the run's random stream.
    #[serde(default)]
    pub seed: u64,
    /// Meta-algorithm driving the generations.
    #[serde(default)]
    pub meta: MetaAlgorithm,
    /// Offspring count multiplier for the (mu, lambda) schemes.
    #[serde(default = "default_lambda")]
    pub lambda: f64,
    /// Mutation intensity control.
    #[serde(default)]
    pub mutation: MutationControl,
    /// Random genotype perturbation.
    #[serde(default)]
    pub randomizer: RandomizerConfig,
    /// JSON list of genotypes placed at the front of the initial population.
    #[serde(default)]
    pub predefined_file: Option<PathBuf>,
    /// Dissimilarity method identifier passed to the simulator.
    #[serde(default = "default_dissimilarity_method")]
    pub dissimilarity_method: i32,
    /// Diversity-based fitness settings.
    #[serde(default)]
    pub niching: NichingConfig,
    /// Generations between periodic result saves.
    #[serde(default = "default_save_period")]
    pub save_period: usize,
    /// What to do when a periodic save cannot be written.
    #[serde(default)]
    pub checkpoint_failure: CheckpointPolicy,
    /// Result document path.
    #[serde(default)]
    pub out: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            genformat: default_genformat(),
            initial_genotype: None,
            criteria: default_criteria(),
            popsize: default_popsize(),
            generations: default_generations(),
            tournament: default_tournament(),
            pmut: default_pmut(),
            pxov: default_pxov(),
            hof_size: default_hof_size(),
            constraints: StructuralConstraints::default(),
            seed: 0,
            meta: MetaAlgorithm::default(),
            lambda: default_lambda(),
            mutation: MutationControl::default(),
            randomizer: RandomizerConfig::default(),
            predefined_file: None,
            dissimilarity_method: default_dissimilarity_method(),
            niching: NichingConfig::default(),
            save_period: default_save_period(),
            checkpoint_failure: CheckpointPolicy::default(),
            out: None,
        }
    }
}

fn default_genformat() -> String {
    "1".to_string()
}
fn default_criteria() -> Vec<String> {
    vec!["vertpos".to_string()]
}
fn default_popsize() -> usize {
    50
}
fn default_generations() -> usize {
    5
}
fn default_tournament() -> usize {
    5
}
fn default_pmut() -> f64 {
    0.9
}
fn default_pxov() -> f64 {
    0.2
}
fn default_hof_size() -> usize {
    10
}
fn default_lambda() -> f64 {
    1.2
}
fn default_dissimilarity_method() -> i32 {
    1
}
fn default_save_period() -> usize {
    5
}

/// Meta-algorithm selector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetaAlgorithm {
    /// Select, vary and replace the whole population each generation.
    #[default]
    Simple,
    /// Survivors chosen from parents and offspring.
    MuPlusLambda,
    /// Survivors chosen from offspring only.
    MuCommaLambda,
    /// Dual population: task-optimized main pool plus diversity reserve.
    Dpga,
    /// Diversity-transformed fitness (niching, novelty, NSGA2, NSLC).
    Niching,
}

impl fmt::Display for MetaAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Simple => "SIMPLE",
            Self::MuPlusLambda => "MU_PLUS_LAMBDA",
            Self::MuCommaLambda => "MU_COMMA_LAMBDA",
            Self::Dpga => "DPGA",
            Self::Niching => "NICHING",
        };
        f.write_str(name)
    }
}

/// Upper limits on structural metrics reported by the simulator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StructuralConstraints {
    #[serde(default)]
    pub max_numparts: Option<f64>,
    #[serde(default)]
    pub max_numjoints: Option<f64>,
    #[serde(default)]
    pub max_numneurons: Option<f64>,
    #[serde(default)]
    pub max_numconnections: Option<f64>,
    /// Maximum genotype length in characters, including any format prefix.
    #[serde(default)]
    pub max_numgenochars: Option<f64>,
}

impl StructuralConstraints {
    /// Configured limit for one of [`STRUCTURAL_CRITERIA`].
    pub fn limit(&self, criterion: &str) -> Option<f64> {
        match criterion {
            "numparts" => self.max_numparts,
            "numjoints" => self.max_numjoints,
            "numneurons" => self.max_numneurons,
            "numconnections" => self.max_numconnections,
            "numgenochars" => self.max_numgenochars,
            _ => None,
        }
    }

    /// Whether any limit is configured.
    pub fn is_unconstrained(&self) -> bool {
        STRUCTURAL_CRITERIA.iter().all(|c| self.limit(c).is_none())
    }
}

/// Mutation intensity control.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type")]
pub enum MutationControl {
    /// Apply the mutation operator exactly once.
    #[default]
    Fixed,
    /// Windowed-improvement strength controller.
    VaryingStrength {
        #[serde(default = "default_strength_lower")]
        lower_bound: f64,
        #[serde(default = "default_strength_upper")]
        upper_bound: f64,
        #[serde(default = "default_memory_length")]
        memory_length: usize,
        #[serde(default = "default_scale_factor")]
        scale_factor: f64,
    },
    /// Temperature-gated mutation with Boltzmann cooling.
    SimulatedAnnealing {
        #[serde(default = "default_temperature")]
        temperature: f64,
        #[serde(default = "default_cooling_rate")]
        cooling_rate: f64,
    },
}

impl MutationControl {
    /// Varying-strength control with the default window and scale.
    pub fn varying_strength(upper_bound: f64) -> Self {
        Self::VaryingStrength {
            lower_bound: default_strength_lower(),
            upper_bound,
            memory_length: default_memory_length(),
            scale_factor: default_scale_factor(),
        }
    }

    /// Simulated annealing with the default cooling rate.
    pub fn simulated_annealing(temperature: f64) -> Self {
        Self::SimulatedAnnealing {
            temperature,
            cooling_rate: default_cooling_rate(),
        }
    }
}

pub(crate) fn default_strength_lower() -> f64 {
    1.0
}
pub(crate) fn default_strength_upper() -> f64 {
    5.0
}
pub(crate) fn default_memory_length() -> usize {
    4
}
pub(crate) fn default_scale_factor() -> f64 {
    0.1
}
pub(crate) fn default_temperature() -> f64 {
    100.0
}
pub(crate) fn default_cooling_rate() -> f64 {
    0.01
}

/// Random genotype perturbation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RandomizerConfig {
    /// Per-offspring probability of replacing the genotype with a random one.
    #[serde(default)]
    pub probability: f64,
    #[serde(default = "default_min_count")]
    pub parts_min: u32,
    #[serde(default = "default_max_count")]
    pub parts_max: u32,
    #[serde(default = "default_min_count")]
    pub neurons_min: u32,
    #[serde(default = "default_max_count")]
    pub neurons_max: u32,
    #[serde(default = "default_max_count")]
    pub iter_max: u32,
}

impl Default for RandomizerConfig {
    fn default() -> Self {
        Self {
            probability: 0.0,
            parts_min: default_min_count(),
            parts_max: default_max_count(),
            neurons_min: default_min_count(),
            neurons_max: default_max_count(),
            iter_max: default_max_count(),
        }
    }
}

fn default_min_count() -> u32 {
    1
}
fn default_max_count() -> u32 {
    100
}

/// Diversity-based fitness transformation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NichingConfig {
    /// Fitness transformation.
    #[serde(default)]
    pub fit: FitnessMode,
    /// Dissimilarity matrix normalization.
    #[serde(default)]
    pub normalize: Normalization,
    /// Maximum archive size.
    #[serde(default = "default_archive_size")]
    pub archive_size: usize,
    /// Direction of the archive's dissimilarity key.
    #[serde(default)]
    pub archive_order: ArchiveOrder,
    /// Nearest neighbours for local niching/novelty (0 = global).
    #[serde(default = "default_knn")]
    pub knn_niching: usize,
    /// Nearest neighbours for NSLC (0 = global).
    #[serde(default = "default_knn")]
    pub knn_nslc: usize,
    /// Clamp negative raw fitness to zero before any transformation.
    #[serde(default)]
    pub fitness_set_negative_to_zero: bool,
}

impl Default for NichingConfig {
    fn default() -> Self {
        Self {
            fit: FitnessMode::default(),
            normalize: Normalization::default(),
            archive_size: default_archive_size(),
            archive_order: ArchiveOrder::default(),
            knn_niching: default_knn(),
            knn_nslc: default_knn(),
            fitness_set_negative_to_zero: false,
        }
    }
}

fn default_archive_size() -> usize {
    50
}
fn default_knn() -> usize {
    5
}

/// Composite fitness computed from raw fitness and dissimilarity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FitnessMode {
    /// Raw fitness, no transformation.
    #[default]
    Raw,
    /// Raw fitness times mean dissimilarity.
    Niching,
    /// Mean dissimilarity alone.
    Novelty,
    /// Raw fitness times mean dissimilarity to the k nearest.
    KnnNiching,
    /// Mean dissimilarity to the k nearest.
    KnnNovelty,
    /// (mean dissimilarity, raw fitness) under NSGA-II.
    Nsga2,
    /// (local novelty, local competition) under NSGA-II.
    Nslc,
}

impl FitnessMode {
    /// Modes that rewrite a scalar fitness before standard selection.
    pub fn is_scalar_transform(self) -> bool {
        matches!(
            self,
            Self::Niching | Self::Novelty | Self::KnnNiching | Self::KnnNovelty
        )
    }

    /// Modes that produce two objectives for NSGA-II selection.
    pub fn is_multi_objective(self) -> bool {
        matches!(self, Self::Nsga2 | Self::Nslc)
    }

    /// Modes restricted to the k nearest neighbours.
    pub fn uses_knn(self) -> bool {
        matches!(self, Self::KnnNiching | Self::KnnNovelty)
    }
}

impl FromStr for FitnessMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(Self::Raw),
            "niching" => Ok(Self::Niching),
            "novelty" => Ok(Self::Novelty),
            "knn_niching" => Ok(Self::KnnNiching),
            "knn_novelty" => Ok(Self::KnnNovelty),
            "nsga2" => Ok(Self::Nsga2),
            "nslc" => Ok(Self::Nslc),
            other => Err(ConfigError::UnsupportedFitnessMode(other.to_string())),
        }
    }
}

/// Dissimilarity matrix normalization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    None,
    /// Divide by the largest entry.
    #[default]
    Max,
    /// Divide by the sum of all entries.
    Sum,
}

impl FromStr for Normalization {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "max" => Ok(Self::Max),
            "sum" => Ok(Self::Sum),
            other => Err(ConfigError::UnsupportedNormalization(other.to_string())),
        }
    }
}

/// Which end of the key ordering an archive keeps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveOrder {
    #[default]
    Max,
    Min,
}

/// Reaction to a failed periodic save.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointPolicy {
    /// Stop the run with an error; in-memory state is kept.
    #[default]
    Halt,
    /// Log the failure and keep evolving.
    Continue,
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Population size must be at least 2 (got {0})")]
    PopulationTooSmall(usize),
    #[error("No optimization criteria specified")]
    NoCriteria,
    #[error("Probability '{name}' must lie in [0, 1] (got {value})")]
    InvalidProbability { name: &'static str, value: f64 },
    #[error(
        "Probabilities of mutation ({pmut}) and crossover ({pxov}) added together exceed 1.0, the population would grow every generation"
    )]
    ProbabilitySumExceeded { pmut: f64, pxov: f64 },
    #[error("Tournament size must be at least 1")]
    TournamentTooSmall,
    #[error("Hall of fame size must be at least 1")]
    EmptyHallOfFame,
    #[error("Save period must be at least 1")]
    InvalidSavePeriod,
    #[error("{parameter} ({value}) should be at most popsize-2 ({max})")]
    KnnTooLarge {
        parameter: &'static str,
        value: usize,
        max: usize,
    },
    #[error("Unsupported fitness mode: '{0}'")]
    UnsupportedFitnessMode(String),
    #[error("Wrong normalization method: '{0}'")]
    UnsupportedNormalization(String),
    #[error("lambda ({lambda}) must be greater or equal to mu ({mu})")]
    LambdaTooSmall { lambda: usize, mu: usize },
    #[error("Invalid mutation control: {0}")]
    InvalidMutationControl(String),
    #[error("Invalid randomizer bounds: {0}")]
    InvalidRandomizer(String),
    #[error(
        "Negative fitness values not tested in combination with {0:?}; set fitness_set_negative_to_zero"
    )]
    NegativeFitnessUnverified(FitnessMode),
    #[error("Niching supports a single optimization criterion (got {0})")]
    MultiCriteriaNiching(usize),
    #[error("DPGA split of {popsize} leaves an empty pool (main {main}, reserve {reserve})")]
    EmptyDpgaPool {
        popsize: usize,
        main: usize,
        reserve: usize,
    },
}

impl RunConfig {
    /// Offspring count for the (mu, lambda) schemes.
    pub fn lambda_size(&self) -> usize {
        (self.lambda * self.popsize as f64) as usize
    }

    /// Main and reserve pool sizes for DPGA: `n = round(0.6 * total)`, `m = total - n`.
    pub fn dpga_split(&self) -> (usize, usize) {
        dpga_split(self.popsize)
    }

    /// Expected number of mutants and crossovers per niching generation.
    pub fn niching_quotas(&self) -> (usize, usize) {
        let n = self.popsize as f64;
        ((n * self.pmut) as usize, (n * self.pxov) as usize)
    }

    /// Path of the niching checkpoint derived from `out`.
    pub fn state_path(&self) -> Option<PathBuf> {
        let out = self.out.as_ref()?;
        let stem = out
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "run".to_string());
        Some(out.with_file_name(format!("{stem}_state.json")))
    }

    /// Validate the configuration. Every error here is fatal and reported
    /// before any generation runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.popsize < 2 {
            return Err(ConfigError::PopulationTooSmall(self.popsize));
        }
        if self.criteria.is_empty() {
            return Err(ConfigError::NoCriteria);
        }

        check_probability("pmut", self.pmut)?;
        check_probability("pxov", self.pxov)?;
        check_probability("randomizer.probability", self.randomizer.probability)?;

        if self.tournament == 0 {
            return Err(ConfigError::TournamentTooSmall);
        }
        if self.hof_size == 0 {
            return Err(ConfigError::EmptyHallOfFame);
        }
        if self.save_period == 0 {
            return Err(ConfigError::InvalidSavePeriod);
        }

        self.validate_mutation()?;
        self.validate_randomizer()?;

        match self.meta {
            MetaAlgorithm::Simple => {}
            MetaAlgorithm::MuPlusLambda | MetaAlgorithm::MuCommaLambda => {
                if self.pmut + self.pxov > 1.0 {
                    return Err(ConfigError::ProbabilitySumExceeded {
                        pmut: self.pmut,
                        pxov: self.pxov,
                    });
                }
                if self.meta == MetaAlgorithm::MuCommaLambda && self.lambda_size() < self.popsize
                {
                    return Err(ConfigError::LambdaTooSmall {
                        lambda: self.lambda_size(),
                        mu: self.popsize,
                    });
                }
            }
            MetaAlgorithm::Dpga => {
                let (main, reserve) = self.dpga_split();
                if main == 0 || reserve == 0 {
                    return Err(ConfigError::EmptyDpgaPool {
                        popsize: self.popsize,
                        main,
                        reserve,
                    });
                }
            }
            MetaAlgorithm::Niching => self.validate_niching()?,
        }

        Ok(())
    }

    fn validate_mutation(&self) -> Result<(), ConfigError> {
        match &self.mutation {
            MutationControl::Fixed => Ok(()),
            MutationControl::VaryingStrength {
                lower_bound,
                upper_bound,
                memory_length,
                scale_factor,
            } => {
                if !(*lower_bound > 0.0 && lower_bound <= upper_bound) {
                    return Err(ConfigError::InvalidMutationControl(format!(
                        "strength bounds [{lower_bound}, {upper_bound}] must satisfy 0 < lower <= upper"
                    )));
                }
                if *memory_length < 2 {
                    return Err(ConfigError::InvalidMutationControl(format!(
                        "memory_length ({memory_length}) must be at least 2"
                    )));
                }
                if !(*scale_factor > 0.0 && *scale_factor < 1.0) {
                    return Err(ConfigError::InvalidMutationControl(format!(
                        "scale_factor ({scale_factor}) must lie in (0, 1)"
                    )));
                }
                Ok(())
            }
            MutationControl::SimulatedAnnealing {
                temperature,
                cooling_rate,
            } => {
                if *temperature < 0.0 {
                    return Err(ConfigError::InvalidMutationControl(format!(
                        "temperature ({temperature}) must be non-negative"
                    )));
                }
                if !(0.0..=1.0).contains(cooling_rate) {
                    return Err(ConfigError::InvalidMutationControl(format!(
                        "cooling_rate ({cooling_rate}) must lie in [0, 1]"
                    )));
                }
                Ok(())
            }
        }
    }

    fn validate_randomizer(&self) -> Result<(), ConfigError> {
        let r = &self.randomizer;
        if r.parts_min > r.parts_max {
            return Err(ConfigError::InvalidRandomizer(format!(
                "parts_min ({}) > parts_max ({})",
                r.parts_min, r.parts_max
            )));
        }
        if r.neurons_min > r.neurons_max {
            return Err(ConfigError::InvalidRandomizer(format!(
                "neurons_min ({}) > neurons_max ({})",
                r.neurons_min, r.neurons_max
            )));
        }
        Ok(())
    }

    fn validate_niching(&self) -> Result<(), ConfigError> {
        let niching = &self.niching;
        if self.criteria.len() != 1 {
            return Err(ConfigError::MultiCriteriaNiching(self.criteria.len()));
        }

        // Self-comparison is stripped, so each row keeps popsize-1 entries and
        // partitioning needs at least one beyond the k nearest.
        let max = self.popsize - 2;
        if niching.knn_niching > max {
            return Err(ConfigError::KnnTooLarge {
                parameter: "knn_niching",
                value: niching.knn_niching,
                max,
            });
        }
        if niching.knn_nslc > max {
            return Err(ConfigError::KnnTooLarge {
                parameter: "knn_nslc",
                value: niching.knn_nslc,
                max,
            });
        }

        let (expected_mut, expected_xov) = self.niching_quotas();
        if expected_mut + expected_xov > self.popsize {
            return Err(ConfigError::ProbabilitySumExceeded {
                pmut: self.pmut,
                pxov: self.pxov,
            });
        }

        if niching.fit.is_scalar_transform() && !niching.fitness_set_negative_to_zero {
            return Err(ConfigError::NegativeFitnessUnverified(niching.fit));
        }

        Ok(())
    }
}

/// Main and reserve pool sizes for a total population of `total`.
pub fn dpga_split(total: usize) -> (usize, usize) {
    let reserve = (DPGA_RESERVE_RATIO * total as f64).round() as usize;
    (total - reserve.min(total), reserve.min(total))
}

fn check_probability(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidProbability { name, value })
    }
}
