//! Strategy interface bundling the operators an algorithm needs.

use rand::prelude::*;

use crate::schema::{RecordError, RunConfig};

use super::adaptive::{ControllerReading, MutationController, controller_for};
use super::dissimilarity::{DissimilarityEngine, DissimilarityMatrix};
use super::evaluator::{GenotypeEvaluator, Rejection};
use super::individual::{Fitness, FitnessShape, Individual};
use super::selection::{select_nsga2, select_tournament};
use super::simulator::{Simulator, SimulatorError};
use super::variation::{self, Predefiner, Randomizer};

/// Operators used by the evolutionary algorithms.
pub trait Toolbox {
    /// Objectives and their directions.
    fn shape(&self) -> &FitnessShape;

    /// Initial population of `n` unevaluated individuals.
    fn make_population(&mut self, n: usize) -> Result<Vec<Individual>, SimulatorError>;

    /// Select `k` individuals (clones, possibly repeated).
    fn select(&mut self, population: &[Individual], k: usize, rng: &mut StdRng) -> Vec<Individual>;

    /// Cross two individuals in place.
    fn mate(&mut self, a: &mut Individual, b: &mut Individual);

    /// Mutate an individual in place, under the mutation controller.
    fn mutate(&mut self, individual: &mut Individual, rng: &mut StdRng);

    /// Mutate a bare genotype once; `None` when the operator fails.
    fn mutate_genotype(&mut self, genotype: &str) -> Option<String>;

    /// Cross two bare genotypes; `None` when the operator fails.
    fn cross_genotypes(&mut self, genotype_a: &str, genotype_b: &str) -> Option<String>;

    /// Random genotype perturbation applied after variation.
    fn perturb(&mut self, individual: &mut Individual, rng: &mut StdRng);

    /// Fitness of a genotype; bad fitness when it cannot be scored.
    fn evaluate(&mut self, genotype: &str) -> Fitness;

    /// Fitness of a genotype, or why it was rejected.
    fn assess(&mut self, genotype: &str) -> Result<Fitness, Rejection>;

    /// Pairwise dissimilarity, all zeros on failure.
    fn dissimilarity(&mut self, genotypes: &[String]) -> DissimilarityMatrix;

    /// Feed one generation's fitnesses to the mutation controller.
    fn adapt(&mut self, fitnesses: &[Fitness], rng: &mut StdRng) -> ControllerReading;
}

/// Toolbox backed by a [`Simulator`].
pub struct SimulatorToolbox<S> {
    simulator: S,
    evaluator: GenotypeEvaluator,
    controller: Box<dyn MutationController>,
    randomizer: Randomizer,
    predefiner: Predefiner,
    dissimilarity: DissimilarityEngine,
    tournament: usize,
    genformat: String,
    initial_genotype: Option<String>,
}

impl<S: Simulator> SimulatorToolbox<S> {
    /// Assemble the toolbox for `config`, loading predefined genotypes if a file
    /// is configured.
    pub fn from_config(simulator: S, config: &RunConfig) -> Result<Self, RecordError> {
        let predefiner = match &config.predefined_file {
            Some(path) => Predefiner::from_file(path)?,
            None => Predefiner::default(),
        };
        Ok(Self {
            simulator,
            evaluator: GenotypeEvaluator::new(config.criteria.clone(), config.constraints.clone()),
            controller: controller_for(&config.mutation),
            randomizer: Randomizer::new(config.randomizer.clone()),
            predefiner,
            dissimilarity: DissimilarityEngine::new(config.dissimilarity_method),
            tournament: config.tournament,
            genformat: config.genformat.clone(),
            initial_genotype: config.initial_genotype.clone(),
        })
    }

    /// Replace the mutation controller.
    pub fn with_controller(mut self, controller: Box<dyn MutationController>) -> Self {
        self.controller = controller;
        self
    }

    /// Mutable access to the simulator.
    pub fn simulator_mut(&mut self) -> &mut S {
        &mut self.simulator
    }

    /// Take back the simulator.
    pub fn into_simulator(self) -> S {
        self.simulator
    }
}

impl<S: Simulator> Toolbox for SimulatorToolbox<S> {
    fn shape(&self) -> &FitnessShape {
        self.evaluator.shape()
    }

    fn make_population(&mut self, n: usize) -> Result<Vec<Individual>, SimulatorError> {
        self.predefiner.population(
            &mut self.simulator,
            n,
            &self.genformat,
            self.initial_genotype.as_deref(),
        )
    }

    fn select(&mut self, population: &[Individual], k: usize, rng: &mut StdRng) -> Vec<Individual> {
        let shape = self.evaluator.shape();
        if shape.objectives() > 1 {
            select_nsga2(population, k, shape)
        } else {
            select_tournament(population, k, self.tournament, shape, rng)
        }
    }

    fn mate(&mut self, a: &mut Individual, b: &mut Individual) {
        variation::cross(&mut self.simulator, a, b);
    }

    fn mutate(&mut self, individual: &mut Individual, rng: &mut StdRng) {
        let simulator = &mut self.simulator;
        self.controller.mutate(individual, rng, &mut |ind: &mut Individual| {
            variation::mutate(simulator, ind);
        });
    }

    fn mutate_genotype(&mut self, genotype: &str) -> Option<String> {
        variation::mutate_genotype(&mut self.simulator, genotype)
    }

    fn cross_genotypes(&mut self, genotype_a: &str, genotype_b: &str) -> Option<String> {
        variation::cross_genotypes(&mut self.simulator, genotype_a, genotype_b)
    }

    fn perturb(&mut self, individual: &mut Individual, rng: &mut StdRng) {
        self.randomizer.randomize(&mut self.simulator, individual, rng);
    }

    fn evaluate(&mut self, genotype: &str) -> Fitness {
        self.evaluator.evaluate(&mut self.simulator, genotype)
    }

    fn assess(&mut self, genotype: &str) -> Result<Fitness, Rejection> {
        self.evaluator.assess(&mut self.simulator, genotype)
    }

    fn dissimilarity(&mut self, genotypes: &[String]) -> DissimilarityMatrix {
        self.dissimilarity.compute(&mut self.simulator, genotypes)
    }

    fn adapt(&mut self, fitnesses: &[Fitness], rng: &mut StdRng) -> ControllerReading {
        self.controller.update(fitnesses, rng)
    }
}
