//! Interface to the external morphology simulator.
//!
//! The simulator evaluates genotypes, applies genetic operators and measures
//! dissimilarity. Genotypes are opaque strings to everything in this crate.

use serde_json::Value;

/// Genotype returned by operators that could not produce a valid result.
pub const INVALID_GENOTYPE: &str = "/*invalid*/";

/// Whether `genotype` is the invalid sentinel.
pub fn is_invalid(genotype: &str) -> bool {
    genotype == INVALID_GENOTYPE
}

/// Errors raised by the simulator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulatorError {
    #[error("Simulator call '{call}' failed: {message}")]
    CallFailed { call: &'static str, message: String },
    #[error("Unsupported dissimilarity method {0}")]
    UnsupportedMethod(i32),
    #[error("Malformed genotype '{0}'")]
    MalformedGenotype(String),
}

/// Parameters of a random genotype request.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomGenotypeRequest<'a> {
    pub initial_genotype: &'a str,
    pub parts_min: u32,
    pub parts_max: u32,
    pub neurons_min: u32,
    pub neurons_max: u32,
    pub iter_max: u32,
    pub return_even_if_failed: bool,
}

/// Capabilities consumed from the simulator.
///
/// Each run owns its simulator exclusively, so methods take `&mut self` and
/// implementations are free to keep their own random state.
pub trait Simulator {
    /// Evaluate a batch of genotypes. Each result carries evaluation data keyed
    /// by criterion under `result["evaluations"][""]`.
    fn evaluate(&mut self, genotypes: &[String]) -> Result<Vec<Value>, SimulatorError>;

    /// Cross two genotypes into one child, or the invalid sentinel.
    fn cross_over(&mut self, genotype_a: &str, genotype_b: &str) -> Result<String, SimulatorError>;

    /// Mutate every genotype once; results may contain the invalid sentinel.
    fn mutate(&mut self, genotypes: &[String]) -> Result<Vec<String>, SimulatorError>;

    /// Simplest genotype of a genetic format.
    fn get_simplest(&mut self, genetic_format: &str) -> Result<String, SimulatorError>;

    /// Random genotype grown from `request.initial_genotype`.
    fn get_random_genotype(
        &mut self,
        request: &RandomGenotypeRequest<'_>,
    ) -> Result<String, SimulatorError>;

    /// Pairwise dissimilarity matrix for `genotypes`.
    fn dissimilarity(
        &mut self,
        genotypes: &[String],
        method: i32,
    ) -> Result<Vec<Vec<f64>>, SimulatorError>;
}

impl<S: Simulator + ?Sized> Simulator for Box<S> {
    fn evaluate(&mut self, genotypes: &[String]) -> Result<Vec<Value>, SimulatorError> {
        (**self).evaluate(genotypes)
    }

    fn cross_over(&mut self, genotype_a: &str, genotype_b: &str) -> Result<String, SimulatorError> {
        (**self).cross_over(genotype_a, genotype_b)
    }

    fn mutate(&mut self, genotypes: &[String]) -> Result<Vec<String>, SimulatorError> {
        (**self).mutate(genotypes)
    }

    fn get_simplest(&mut self, genetic_format: &str) -> Result<String, SimulatorError> {
        (**self).get_simplest(genetic_format)
    }

    fn get_random_genotype(
        &mut self,
        request: &RandomGenotypeRequest<'_>,
    ) -> Result<String, SimulatorError> {
        (**self).get_random_genotype(request)
    }

    fn dissimilarity(
        &mut self,
        genotypes: &[String],
        method: i32,
    ) -> Result<Vec<Vec<f64>>, SimulatorError> {
        (**self).dissimilarity(genotypes, method)
    }
}
