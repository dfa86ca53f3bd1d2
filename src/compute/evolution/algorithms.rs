//! Single-population generation steps.
//!
//! Each step takes the current population, produces the next one and reports
//! how many evaluations it spent. Only individuals with invalid fitness are
//! evaluated.

use rand::prelude::*;

use crate::schema::RunConfig;

use super::archive::HallOfFame;
use super::individual::Individual;
use super::toolbox::Toolbox;
use super::variation::{var_and, var_or};

/// Parameters shared by every meta-algorithm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlgorithmParams {
    /// Crossover probability.
    pub cxpb: f64,
    /// Mutation probability.
    pub mutpb: f64,
    /// Generations after the initial evaluation.
    pub ngen: usize,
    /// Population size kept between generations.
    pub mu: usize,
    /// Offspring produced per generation by the (mu, lambda) schemes.
    pub lambda: usize,
    /// Generations between periodic saves.
    pub save_period: usize,
}

impl AlgorithmParams {
    /// Extract the algorithm parameters from a run configuration.
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            cxpb: config.pxov,
            mutpb: config.pmut,
            ngen: config.generations,
            mu: config.popsize,
            lambda: config.lambda_size(),
            save_period: config.save_period.max(1),
        }
    }

    /// Whether generation `generation` ends with a periodic save.
    pub fn is_save_generation(&self, generation: usize) -> bool {
        generation % self.save_period == 0
    }
}

/// Evaluate individuals with invalid fitness (or all of them when `all` is
/// set). Returns the number of evaluations.
pub fn evaluate_population<T: Toolbox + ?Sized>(
    population: &mut [Individual],
    toolbox: &mut T,
    all: bool,
) -> usize {
    let mut nevals = 0;
    for ind in population.iter_mut().filter(|i| all || !i.is_valid()) {
        ind.fitness = Some(toolbox.evaluate(&ind.genotype));
        nevals += 1;
    }
    nevals
}

/// Select a full population, vary it with [`var_and`] and replace.
pub fn simple_generation<T: Toolbox + ?Sized>(
    population: &[Individual],
    toolbox: &mut T,
    params: &AlgorithmParams,
    hall_of_fame: &mut HallOfFame,
    rng: &mut StdRng,
) -> (Vec<Individual>, usize) {
    let selected = toolbox.select(population, population.len(), rng);
    let mut offspring = var_and(&selected, toolbox, params.cxpb, params.mutpb, rng);
    let nevals = evaluate_population(&mut offspring, toolbox, false);
    hall_of_fame.update(&offspring, toolbox.shape());
    (offspring, nevals)
}

/// `lambda` offspring by [`var_or`]; survivors selected from parents and
/// offspring together.
pub fn mu_plus_lambda_generation<T: Toolbox + ?Sized>(
    population: &[Individual],
    toolbox: &mut T,
    params: &AlgorithmParams,
    hall_of_fame: &mut HallOfFame,
    rng: &mut StdRng,
) -> (Vec<Individual>, usize) {
    let mut offspring = var_or(population, toolbox, params.lambda, params.cxpb, params.mutpb, rng);
    let nevals = evaluate_population(&mut offspring, toolbox, false);
    hall_of_fame.update(&offspring, toolbox.shape());

    let mut pool = population.to_vec();
    pool.extend(offspring);
    (toolbox.select(&pool, params.mu, rng), nevals)
}

/// `lambda` offspring by [`var_or`]; survivors selected from offspring only.
pub fn mu_comma_lambda_generation<T: Toolbox + ?Sized>(
    population: &[Individual],
    toolbox: &mut T,
    params: &AlgorithmParams,
    hall_of_fame: &mut HallOfFame,
    rng: &mut StdRng,
) -> (Vec<Individual>, usize) {
    let mut offspring = var_or(population, toolbox, params.lambda, params.cxpb, params.mutpb, rng);
    let nevals = evaluate_population(&mut offspring, toolbox, false);
    hall_of_fame.update(&offspring, toolbox.shape());
    (toolbox.select(&offspring, params.mu, rng), nevals)
}
