//! Diversity-aware fitness for the niching experiment.
//!
//! Every individual keeps its untransformed scalar score in `raw_fitness`. The
//! transform rewrites `fitness` from that score and from pairwise dissimilarity:
//!
//! | mode          | fitness                                   |
//! |---------------|-------------------------------------------|
//! | `raw`         | `[raw]`                                   |
//! | `niching`     | `[raw * mean dissimilarity]`              |
//! | `novelty`     | `[mean dissimilarity]`                    |
//! | `knn_*`       | as above, over the k nearest only         |
//! | `nsga2`       | `[mean dissimilarity, raw]`               |
//! | `nslc`        | `[local novelty, local competition]`      |
//!
//! Scalar modes and NSLC compare against the population plus an archive of the
//! most (or least) dissimilar individuals seen so far.

use rand::prelude::*;

use crate::schema::{ArchiveOrder, FitnessMode, NichingConfig, Normalization};

use super::dissimilarity::ComparisonMatrix;
use super::individual::{FitnessShape, Individual};
use super::selection::{assign_crowding, select_nsga2, select_tournament_dcd};
use super::toolbox::Toolbox;

/// Variation attempts allowed per population slot before giving up on a quota.
const ATTEMPTS_PER_SLOT: usize = 100;

/// Current population and the dissimilarity archive.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationStructures {
    pub population: Vec<Individual>,
    pub archive: Vec<Individual>,
    archive_size: usize,
    archive_order: ArchiveOrder,
}

impl PopulationStructures {
    /// Start with an empty archive.
    pub fn new(population: Vec<Individual>, config: &NichingConfig) -> Self {
        Self::restore(population, Vec::new(), config)
    }

    /// Rebuild from a checkpoint.
    pub fn restore(
        population: Vec<Individual>,
        archive: Vec<Individual>,
        config: &NichingConfig,
    ) -> Self {
        Self {
            population,
            archive,
            archive_size: config.archive_size,
            archive_order: config.archive_order,
        }
    }

    /// Maximum archive size.
    pub fn archive_size(&self) -> usize {
        self.archive_size
    }

    /// Replace the archive with the `archive_size` candidates ranked first by
    /// `keys`. Ties keep candidate order.
    pub fn update_archive(&mut self, candidates: &[Individual], keys: &[f64]) {
        let mut order: Vec<usize> = (0..candidates.len().min(keys.len())).collect();
        match self.archive_order {
            ArchiveOrder::Max => order.sort_by(|&a, &b| keys[b].total_cmp(&keys[a])),
            ArchiveOrder::Min => order.sort_by(|&a, &b| keys[a].total_cmp(&keys[b])),
        }
        self.archive = order
            .into_iter()
            .take(self.archive_size)
            .map(|i| candidates[i].clone())
            .collect();
    }
}

/// Mutant and crossover counts expected per generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NichingQuotas {
    pub mutants: usize,
    pub crossovers: usize,
}

/// Rewrites fitness from raw scores and dissimilarity.
#[derive(Debug, Clone)]
pub struct NichingTransform {
    mode: FitnessMode,
    normalize: Normalization,
    knn_niching: usize,
    knn_nslc: usize,
    negative_to_zero: bool,
    shape: FitnessShape,
}

impl NichingTransform {
    /// Create a transform for the configured mode.
    pub fn new(config: &NichingConfig) -> Self {
        let objectives = if config.fit.is_multi_objective() { 2 } else { 1 };
        Self {
            mode: config.fit,
            normalize: config.normalize,
            knn_niching: config.knn_niching,
            knn_nslc: config.knn_nslc,
            negative_to_zero: config.fitness_set_negative_to_zero,
            shape: FitnessShape::maximizing(objectives),
        }
    }

    /// Configured fitness mode.
    pub fn mode(&self) -> FitnessMode {
        self.mode
    }

    /// Shape of the transformed fitness.
    pub fn shape(&self) -> &FitnessShape {
        &self.shape
    }

    /// Scalar raw score of a criterion vector, clamped at zero when configured.
    pub fn raw_fitness(&self, fitness: &[f64]) -> f64 {
        let raw = fitness.first().copied().unwrap_or(-1.0);
        if self.negative_to_zero { raw.max(0.0) } else { raw }
    }

    /// Evaluate `individual`, storing its raw score and `[raw]` as fitness.
    pub fn evaluate<T: Toolbox + ?Sized>(&self, individual: &mut Individual, toolbox: &mut T) {
        let raw = self.raw_fitness(&toolbox.evaluate(&individual.genotype));
        individual.raw_fitness = Some(raw);
        individual.fitness = Some(vec![raw]);
    }

    /// Evaluate a freshly varied genotype; `None` if it was assigned bad
    /// fitness.
    fn assess_child<T: Toolbox + ?Sized>(&self, genotype: String, toolbox: &mut T) -> Option<Individual> {
        match toolbox.assess(&genotype) {
            Ok(fitness) => {
                let raw = self.raw_fitness(&fitness);
                Some(Individual {
                    genotype,
                    fitness: Some(vec![raw]),
                    raw_fitness: Some(raw),
                })
            }
            Err(rejection) => {
                log::debug!("Discarding offspring \"{genotype}\": {rejection}");
                None
            }
        }
    }

    /// Normalized comparisons over `individuals`, plus each row's mean
    /// unnormalized dissimilarity (the archive key).
    fn comparisons<T: Toolbox + ?Sized>(
        &self,
        individuals: &[Individual],
        toolbox: &mut T,
    ) -> (ComparisonMatrix, Vec<f64>) {
        let genotypes: Vec<String> = individuals.iter().map(|i| i.genotype.clone()).collect();
        let mut comparisons = toolbox.dissimilarity(&genotypes).without_diagonal();
        let keys = comparisons.row_means();
        comparisons.normalize(self.normalize);
        (comparisons, keys)
    }

    /// Apply a scalar mode to population and archive, then refresh the
    /// archive. Does nothing for `raw` and the two-objective modes.
    pub fn apply<T: Toolbox + ?Sized>(&self, structures: &mut PopulationStructures, toolbox: &mut T) {
        if !self.mode.is_scalar_transform() {
            return;
        }
        let mut members: Vec<Individual> = structures
            .population
            .iter()
            .chain(&structures.archive)
            .cloned()
            .collect();
        let (comparisons, keys) = self.comparisons(&members, toolbox);
        let dissimilarity = if self.mode.uses_knn() {
            comparisons.knn_means(self.knn_niching)
        } else {
            comparisons.row_means()
        };

        for (ind, &d) in members.iter_mut().zip(&dissimilarity) {
            let value = match self.mode {
                FitnessMode::Niching | FitnessMode::KnnNiching => ind.raw() * d,
                _ => d,
            };
            ind.fitness = Some(vec![value]);
        }

        let population_len = structures.population.len();
        structures.population = members[..population_len].to_vec();
        structures.update_archive(&members, &keys);
    }

    /// Assign two-objective fitness to `candidates`. NSLC also compares
    /// against the archive and refreshes it.
    pub fn apply_multi_objective<T: Toolbox + ?Sized>(
        &self,
        structures: &mut PopulationStructures,
        candidates: &mut [Individual],
        toolbox: &mut T,
    ) {
        match self.mode {
            FitnessMode::Nsga2 => {
                let (comparisons, _) = self.comparisons(candidates, toolbox);
                for (ind, d) in candidates.iter_mut().zip(comparisons.row_means()) {
                    let raw = ind.raw();
                    ind.fitness = Some(vec![d, raw]);
                }
            }
            FitnessMode::Nslc => {
                let archived = structures.archive.len();
                let mut members = structures.archive.clone();
                members.extend(candidates.iter().cloned());

                let (comparisons, keys) = self.comparisons(&members, toolbox);
                let novelty = comparisons.knn_means(self.knn_nslc);
                let competition: Vec<f64> = (0..members.len())
                    .map(|i| {
                        let own = members[i].raw();
                        comparisons
                            .nearest(i, self.knn_nslc)
                            .into_iter()
                            .filter(|&j| members[j].raw() < own)
                            .count() as f64
                    })
                    .collect();

                for (i, ind) in members.iter_mut().enumerate() {
                    ind.fitness = Some(vec![novelty[i], competition[i]]);
                }
                for (candidate, member) in candidates.iter_mut().zip(&members[archived..]) {
                    candidate.fitness = member.fitness.clone();
                }
                structures.update_archive(&members, &keys);
            }
            _ => {}
        }
    }

    /// Evaluate the initial population and assign transformed fitness.
    /// Returns the number of evaluations.
    pub fn initialize<T: Toolbox + ?Sized>(
        &self,
        structures: &mut PopulationStructures,
        toolbox: &mut T,
    ) -> usize {
        for ind in structures.population.iter_mut() {
            self.evaluate(ind, toolbox);
        }
        let nevals = structures.population.len();

        if self.mode.is_multi_objective() {
            let mut population = std::mem::take(&mut structures.population);
            self.apply_multi_objective(structures, &mut population, toolbox);
            structures.population = population;
        } else {
            self.apply(structures, toolbox);
        }
        nevals
    }

    /// One generation for the raw and scalar modes: mutants and crossovers of
    /// tournament winners, topped up with tournament-selected clones.
    pub fn generation<T: Toolbox + ?Sized>(
        &self,
        structures: &mut PopulationStructures,
        toolbox: &mut T,
        quotas: NichingQuotas,
        rng: &mut StdRng,
    ) -> usize {
        let population = std::mem::take(&mut structures.population);
        let size = population.len();
        let (next, nevals) = self.breed(toolbox, size, quotas, rng, |toolbox, rng| {
            toolbox.select(&population, 1, rng).pop()
        });
        structures.population = next;
        self.apply(structures, toolbox);
        nevals
    }

    /// One generation for `nsga2` and `nslc`: crowded tournament parents, the
    /// same mutant/crossover/clone fill, then NSGA-II survivors from parents
    /// and offspring together.
    pub fn generation_multi_objective<T: Toolbox + ?Sized>(
        &self,
        structures: &mut PopulationStructures,
        toolbox: &mut T,
        quotas: NichingQuotas,
        rng: &mut StdRng,
    ) -> usize {
        let population = std::mem::take(&mut structures.population);
        let size = population.len();
        let crowding = assign_crowding(&population, &self.shape);
        let parents = select_tournament_dcd(&population, size, &crowding, &self.shape, rng);

        let mut cursor = 0;
        let (offspring, nevals) = self.breed(toolbox, size, quotas, rng, |_, _| {
            let parent = parents.get(cursor % parents.len().max(1)).cloned();
            cursor += 1;
            parent
        });

        let mut candidates = population;
        candidates.extend(offspring);
        self.apply_multi_objective(structures, &mut candidates, toolbox);
        structures.population = select_nsga2(&candidates, size, &self.shape);
        nevals
    }

    /// Fill `size` slots: `quotas.mutants` mutants, `quotas.crossovers`
    /// crossovers, clones for the rest. Children with bad fitness are dropped
    /// and retried until the attempt cap runs out.
    fn breed<T, F>(
        &self,
        toolbox: &mut T,
        size: usize,
        quotas: NichingQuotas,
        rng: &mut StdRng,
        mut parent: F,
    ) -> (Vec<Individual>, usize)
    where
        T: Toolbox + ?Sized,
        F: FnMut(&mut T, &mut StdRng) -> Option<Individual>,
    {
        let cap = ATTEMPTS_PER_SLOT * size.max(1);
        let mut next = Vec::with_capacity(size);
        let mut nevals = 0;

        let mut attempts = 0;
        let mut mutants = 0;
        while mutants < quotas.mutants && attempts < cap {
            attempts += 1;
            let Some(p) = parent(toolbox, rng) else { break };
            let Some(genotype) = toolbox.mutate_genotype(&p.genotype) else {
                continue;
            };
            nevals += 1;
            if let Some(child) = self.assess_child(genotype, toolbox) {
                next.push(child);
                mutants += 1;
            }
        }
        if mutants < quotas.mutants {
            log::warn!(
                "Produced {mutants} of {} mutants after {attempts} attempts, filling with clones",
                quotas.mutants
            );
        }

        let mut attempts = 0;
        let mut crossovers = 0;
        while crossovers < quotas.crossovers && attempts < cap {
            attempts += 1;
            let (Some(a), Some(b)) = (parent(toolbox, rng), parent(toolbox, rng)) else {
                break;
            };
            let Some(genotype) = toolbox.cross_genotypes(&a.genotype, &b.genotype) else {
                continue;
            };
            nevals += 1;
            if let Some(child) = self.assess_child(genotype, toolbox) {
                next.push(child);
                crossovers += 1;
            }
        }
        if crossovers < quotas.crossovers {
            log::warn!(
                "Produced {crossovers} of {} crossovers after {attempts} attempts, filling with clones",
                quotas.crossovers
            );
        }

        while next.len() < size {
            match parent(toolbox, rng) {
                Some(clone) => next.push(clone),
                None => break,
            }
        }
        (next, nevals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::evolution::numeric::NumericSimulator;
    use crate::compute::evolution::toolbox::SimulatorToolbox;
    use crate::schema::{MetaAlgorithm, RunConfig};
    use proptest::prelude::*;

    fn niching(fit: FitnessMode) -> NichingConfig {
        NichingConfig {
            fit,
            normalize: Normalization::None,
            knn_niching: 1,
            knn_nslc: 1,
            fitness_set_negative_to_zero: fit.is_scalar_transform(),
            ..Default::default()
        }
    }

    fn toolbox(dimension: usize) -> SimulatorToolbox<NumericSimulator> {
        let config = RunConfig {
            meta: MetaAlgorithm::Niching,
            tournament: 2,
            ..Default::default()
        };
        SimulatorToolbox::from_config(NumericSimulator::new(dimension, 11), &config).unwrap()
    }

    fn line(points: &[f64]) -> Vec<Individual> {
        points
            .iter()
            .map(|p| Individual::new(NumericSimulator::format(&[*p])))
            .collect()
    }

    #[test]
    fn test_raw_fitness_clamp() {
        let clamped = NichingTransform::new(&niching(FitnessMode::Niching));
        assert_eq!(clamped.raw_fitness(&[-4.0]), 0.0);
        assert_eq!(clamped.raw_fitness(&[2.5]), 2.5);

        let unclamped = NichingTransform::new(&niching(FitnessMode::Nslc));
        assert_eq!(unclamped.raw_fitness(&[-4.0]), -4.0);
        assert_eq!(unclamped.shape().objectives(), 2);
    }

    #[test]
    fn test_archive_keeps_extreme_keys() {
        let candidates = line(&[0.0, 1.0, 2.0, 3.0]);
        let keys = [0.5, 3.0, 1.0, 3.0];

        let mut config = niching(FitnessMode::Novelty);
        config.archive_size = 2;
        let mut structures = PopulationStructures::new(Vec::new(), &config);
        structures.update_archive(&candidates, &keys);
        let kept: Vec<&str> = structures.archive.iter().map(|i| i.genotype.as_str()).collect();
        assert_eq!(kept, vec!["1", "3"]);

        config.archive_order = ArchiveOrder::Min;
        let mut structures = PopulationStructures::new(Vec::new(), &config);
        structures.update_archive(&candidates, &keys);
        let kept: Vec<&str> = structures.archive.iter().map(|i| i.genotype.as_str()).collect();
        assert_eq!(kept, vec!["0", "2"]);
    }

    #[test]
    fn test_novelty_is_mean_distance() {
        let config = niching(FitnessMode::Novelty);
        let transform = NichingTransform::new(&config);
        let mut tb = toolbox(1);
        let mut structures = PopulationStructures::new(line(&[0.0, 1.0, 3.0]), &config);

        assert_eq!(transform.initialize(&mut structures, &mut tb), 3);
        let fitness: Vec<f64> = structures.population.iter().map(|i| i.primary()).collect();
        assert_eq!(fitness, vec![2.0, 1.5, 2.5]);
        assert!(structures.population.iter().all(|i| i.raw_fitness == Some(0.0)));
        assert_eq!(structures.archive.len(), 3);
    }

    #[test]
    fn test_knn_novelty_uses_nearest_only() {
        let config = niching(FitnessMode::KnnNovelty);
        let transform = NichingTransform::new(&config);
        let mut tb = toolbox(1);
        let mut structures = PopulationStructures::new(line(&[0.0, 1.0, 3.0]), &config);
        transform.initialize(&mut structures, &mut tb);
        let fitness: Vec<f64> = structures.population.iter().map(|i| i.primary()).collect();
        assert_eq!(fitness, vec![1.0, 1.0, 2.0]);
    }

    #[test]
    fn test_nsga2_objectives() {
        let config = niching(FitnessMode::Nsga2);
        let transform = NichingTransform::new(&config);
        let mut tb = toolbox(1);
        let mut structures = PopulationStructures::new(line(&[0.0, 1.0, 3.0]), &config);
        transform.initialize(&mut structures, &mut tb);

        let fitness: Vec<Vec<f64>> = structures
            .population
            .iter()
            .map(|i| i.fitness.clone().unwrap())
            .collect();
        assert_eq!(fitness, vec![vec![2.0, 0.0], vec![1.5, -1.0], vec![2.5, -9.0]]);
        assert!(structures.archive.is_empty());
    }

    #[test]
    fn test_nslc_local_competition() {
        let config = niching(FitnessMode::Nslc);
        let transform = NichingTransform::new(&config);
        let mut tb = toolbox(1);
        let mut structures = PopulationStructures::new(line(&[0.0, 1.0, 3.0]), &config);
        transform.initialize(&mut structures, &mut tb);

        // Nearest neighbours: 0 -> 1, 1 -> 0, 3 -> 1.
        let fitness: Vec<Vec<f64>> = structures
            .population
            .iter()
            .map(|i| i.fitness.clone().unwrap())
            .collect();
        assert_eq!(fitness, vec![vec![1.0, 1.0], vec![1.0, 0.0], vec![2.0, 0.0]]);
        assert_eq!(structures.archive.len(), 3);
    }

    #[test]
    fn test_generation_keeps_size() {
        for fit in [FitnessMode::Raw, FitnessMode::Niching, FitnessMode::Nsga2, FitnessMode::Nslc] {
            let mut config = niching(fit);
            config.archive_size = 4;
            let transform = NichingTransform::new(&config);
            let mut tb = toolbox(2);
            let population = tb.make_population(8).unwrap();
            let mut structures = PopulationStructures::new(population, &config);
            let mut rng = StdRng::seed_from_u64(5);
            transform.initialize(&mut structures, &mut tb);

            let quotas = NichingQuotas {
                mutants: 4,
                crossovers: 2,
            };
            for _ in 0..3 {
                let nevals = if fit.is_multi_objective() {
                    transform.generation_multi_objective(&mut structures, &mut tb, quotas, &mut rng)
                } else {
                    transform.generation(&mut structures, &mut tb, quotas, &mut rng)
                };
                assert_eq!(nevals, 6, "{fit:?}");
                assert_eq!(structures.population.len(), 8, "{fit:?}");
                assert!(structures.population.iter().all(|i| i.raw_fitness.is_some()));
                let objectives = transform.shape().objectives();
                assert!(
                    structures
                        .population
                        .iter()
                        .all(|i| i.fitness.as_ref().is_some_and(|f| f.len() == objectives))
                );
                assert!(structures.archive.len() <= 4);
            }
        }
    }

    proptest! {
        #[test]
        fn prop_archive_retains_best_keys(
            keys in prop::collection::vec(-100.0f64..100.0, 0..30),
            size in 0usize..12,
        ) {
            let candidates: Vec<Individual> =
                (0..keys.len()).map(|i| Individual::new(i.to_string())).collect();
            let config = NichingConfig { archive_size: size, ..Default::default() };
            let mut structures = PopulationStructures::new(Vec::new(), &config);
            structures.update_archive(&candidates, &keys);

            prop_assert_eq!(structures.archive.len(), size.min(keys.len()));
            let kept: Vec<usize> = structures
                .archive
                .iter()
                .map(|i| i.genotype.parse().unwrap())
                .collect();
            for (i, key) in keys.iter().enumerate() {
                if !kept.contains(&i) {
                    prop_assert!(kept.iter().all(|&k| keys[k] >= *key));
                }
            }
        }
    }
}
