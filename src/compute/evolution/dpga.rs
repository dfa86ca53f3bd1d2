//! Dual-population genetic algorithm.
//!
//! The main pool optimizes the task fitness. The reserve pool is scored by its
//! mean dissimilarity to the main pool, so it keeps genotypes far from what the
//! main pool explores. Each generation both pools also receive cross-bred
//! offspring drawn from the two of them.

use rand::prelude::*;

use crate::schema::dpga_split;

use super::algorithms::{AlgorithmParams, evaluate_population};
use super::archive::HallOfFame;
use super::individual::Individual;
use super::toolbox::Toolbox;
use super::variation::var_and;

/// Main and reserve pools.
#[derive(Debug, Clone, PartialEq)]
pub struct DualPopulation {
    pub main: Vec<Individual>,
    pub reserve: Vec<Individual>,
    main_size: usize,
    reserve_size: usize,
}

impl DualPopulation {
    /// Split `population`: the first `m` individuals become the main pool, the
    /// remaining `n = round(0.6 * len)` the reserve.
    pub fn split(mut population: Vec<Individual>) -> Self {
        let (m, n) = dpga_split(population.len());
        let reserve = population.split_off(m);
        Self {
            main: population,
            reserve,
            main_size: m,
            reserve_size: n,
        }
    }

    /// Main population size.
    pub fn main_size(&self) -> usize {
        self.main_size
    }

    /// Reserve population size.
    pub fn reserve_size(&self) -> usize {
        self.reserve_size
    }

    /// Number of individuals drawn from each pool for cross-breeding.
    pub fn cross_breed_count(&self) -> usize {
        self.reserve_size.saturating_sub(self.main_size) / 2
    }

    /// Evaluate both pools for generation 0. Returns main-pool evaluations.
    pub fn initialize<T: Toolbox + ?Sized>(&mut self, toolbox: &mut T) -> usize {
        let nevals = evaluate_population(&mut self.main, toolbox, false);
        evaluate_reserve(&mut self.reserve, &self.main, toolbox, false);
        nevals
    }

    /// Advance both pools by one generation. Returns main-pool evaluations.
    pub fn generation<T: Toolbox + ?Sized>(
        &mut self,
        toolbox: &mut T,
        params: &AlgorithmParams,
        hall_of_fame: &mut HallOfFame,
        rng: &mut StdRng,
    ) -> usize {
        let (m, n) = (self.main_size, self.reserve_size);

        let selected = toolbox.select(&self.main, m, rng);
        let mut main_offspring = var_and(&selected, toolbox, params.cxpb, params.mutpb, rng);
        let evaluated_own = evaluate_population(&mut main_offspring, toolbox, false);

        let selected = toolbox.select(&self.reserve, n, rng);
        let mut reserve_offspring = var_and(&selected, toolbox, params.cxpb, params.mutpb, rng);
        evaluate_reserve(&mut reserve_offspring, &self.main, toolbox, false);

        let half = self.cross_breed_count();
        let mut cross = toolbox.select(&self.main, half, rng);
        cross.extend(toolbox.select(&self.reserve, half, rng));
        cross.shuffle(rng);
        let cross = var_and(&cross, toolbox, params.cxpb, params.mutpb, rng);

        main_offspring.extend(cross.iter().cloned());
        reserve_offspring.extend(cross);

        let evaluated_combined = evaluate_population(&mut main_offspring, toolbox, true);
        truncate_best(&mut main_offspring, m);

        // Reserve fitness is measured against the main pool of the previous generation
        evaluate_reserve(&mut reserve_offspring, &self.main, toolbox, true);
        truncate_best(&mut reserve_offspring, n);

        hall_of_fame.update(&main_offspring, toolbox.shape());

        self.main = main_offspring;
        self.reserve = reserve_offspring;
        evaluated_own + evaluated_combined
    }
}

/// Stable descending sort on the first fitness component, then truncate.
fn truncate_best(pool: &mut Vec<Individual>, size: usize) {
    pool.sort_by(|a, b| b.primary().total_cmp(&a.primary()));
    pool.truncate(size);
}

/// Mean dissimilarity of `genotype` to every member of `main`, taken from the
/// first row of the matrix over `[genotype] + main` without its diagonal entry.
pub fn reserve_fitness<T: Toolbox + ?Sized>(
    genotype: &str,
    main: &[Individual],
    toolbox: &mut T,
) -> f64 {
    if main.is_empty() {
        return 0.0;
    }
    let mut genotypes = Vec::with_capacity(main.len() + 1);
    genotypes.push(genotype.to_string());
    genotypes.extend(main.iter().map(|i| i.genotype.clone()));

    let matrix = toolbox.dissimilarity(&genotypes);
    let distances = &matrix.row(0)[1..];
    distances.iter().sum::<f64>() / distances.len() as f64
}

fn evaluate_reserve<T: Toolbox + ?Sized>(
    reserve: &mut [Individual],
    main: &[Individual],
    toolbox: &mut T,
    all: bool,
) {
    for ind in reserve.iter_mut().filter(|i| all || !i.is_valid()) {
        let fitness = reserve_fitness(&ind.genotype, main, toolbox);
        ind.fitness = Some(vec![fitness]);
    }
}
