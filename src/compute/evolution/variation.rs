//! Variation operators.
//!
//! Crossover and mutation go through the simulator and never let the invalid
//! sentinel into a population: a failed operator keeps the parent genotype.

use std::fs;
use std::path::{Path, PathBuf};

use rand::prelude::*;

use crate::schema::{RandomizerConfig, RecordError};

use super::individual::Individual;
use super::simulator::{RandomGenotypeRequest, Simulator, SimulatorError, is_invalid};
use super::toolbox::Toolbox;

/// Mutate a single genotype; `None` if the simulator produced nothing usable.
pub fn mutate_genotype<S: Simulator + ?Sized>(simulator: &mut S, genotype: &str) -> Option<String> {
    match simulator.mutate(&[genotype.to_string()]) {
        Ok(mut out) if out.len() == 1 => Some(out.remove(0)).filter(|g| !is_invalid(g)),
        Ok(out) => {
            log::warn!("Mutation returned {} genotypes for one input", out.len());
            None
        }
        Err(e) => {
            log::warn!("Mutation of \"{genotype}\" failed: {e}");
            None
        }
    }
}

/// Cross two genotypes; `None` if the simulator produced nothing usable.
pub fn cross_genotypes<S: Simulator + ?Sized>(
    simulator: &mut S,
    genotype_a: &str,
    genotype_b: &str,
) -> Option<String> {
    match simulator.cross_over(genotype_a, genotype_b) {
        Ok(child) if !is_invalid(&child) => Some(child),
        Ok(_) => None,
        Err(e) => {
            log::warn!("Crossover of \"{genotype_a}\" x \"{genotype_b}\" failed: {e}");
            None
        }
    }
}

/// Mutate in place. Returns whether the genotype changed.
pub fn mutate<S: Simulator + ?Sized>(simulator: &mut S, individual: &mut Individual) -> bool {
    match mutate_genotype(simulator, &individual.genotype) {
        Some(genotype) => individual.set_genotype(genotype),
        None => false,
    }
}

/// Cross in place: the first child is `a x b`, the second `b x a`. Each side
/// keeps its parent genotype when its crossover fails.
pub fn cross<S: Simulator + ?Sized>(
    simulator: &mut S,
    a: &mut Individual,
    b: &mut Individual,
) -> (bool, bool) {
    let child_a = cross_genotypes(simulator, &a.genotype, &b.genotype);
    let child_b = cross_genotypes(simulator, &b.genotype, &a.genotype);
    let changed_a = child_a.is_some_and(|g| a.set_genotype(g));
    let changed_b = child_b.is_some_and(|g| b.set_genotype(g));
    (changed_a, changed_b)
}

/// Pairwise crossover with probability `cxpb` then per-individual mutation with
/// probability `mutpb`; an offspring may receive both.
pub fn var_and<T: Toolbox + ?Sized>(
    population: &[Individual],
    toolbox: &mut T,
    cxpb: f64,
    mutpb: f64,
    rng: &mut StdRng,
) -> Vec<Individual> {
    let mut offspring = population.to_vec();

    for i in (1..offspring.len()).step_by(2) {
        if rng.r#gen::<f64>() < cxpb {
            let (left, right) = offspring.split_at_mut(i);
            toolbox.mate(&mut left[i - 1], &mut right[0]);
        }
    }

    for ind in offspring.iter_mut() {
        if rng.r#gen::<f64>() < mutpb {
            toolbox.mutate(ind, rng);
        }
    }

    for ind in offspring.iter_mut() {
        toolbox.perturb(ind, rng);
    }

    offspring
}

/// Produce `lambda` offspring, each from exactly one of: crossover of two
/// distinct random parents (`cxpb`), mutation of one (`mutpb`), or a clone.
pub fn var_or<T: Toolbox + ?Sized>(
    population: &[Individual],
    toolbox: &mut T,
    lambda: usize,
    cxpb: f64,
    mutpb: f64,
    rng: &mut StdRng,
) -> Vec<Individual> {
    let mut offspring = Vec::with_capacity(lambda);
    if population.is_empty() {
        return offspring;
    }

    for _ in 0..lambda {
        let choice: f64 = rng.r#gen();
        let mut child = if choice < cxpb && population.len() >= 2 {
            let parents: Vec<&Individual> = population.choose_multiple(rng, 2).collect();
            let mut a = parents[0].clone();
            let mut b = parents[1].clone();
            toolbox.mate(&mut a, &mut b);
            a
        } else if choice < cxpb + mutpb {
            let mut a = population[rng.gen_range(0..population.len())].clone();
            toolbox.mutate(&mut a, rng);
            a
        } else {
            population[rng.gen_range(0..population.len())].clone()
        };
        toolbox.perturb(&mut child, rng);
        offspring.push(child);
    }

    offspring
}

/// Replaces genotypes with random ones at a fixed rate.
#[derive(Debug, Clone)]
pub struct Randomizer {
    config: RandomizerConfig,
}

impl Randomizer {
    /// Create a randomizer.
    pub fn new(config: RandomizerConfig) -> Self {
        Self { config }
    }

    /// Probability of replacing a genotype.
    pub fn probability(&self) -> f64 {
        self.config.probability
    }

    /// With the configured probability, grow a random genotype from the current
    /// one. Returns whether the genotype changed.
    pub fn randomize<S: Simulator + ?Sized>(
        &self,
        simulator: &mut S,
        individual: &mut Individual,
        rng: &mut StdRng,
    ) -> bool {
        if self.config.probability <= 0.0 || rng.r#gen::<f64>() >= self.config.probability {
            return false;
        }

        let request = RandomGenotypeRequest {
            initial_genotype: &individual.genotype,
            parts_min: self.config.parts_min,
            parts_max: self.config.parts_max,
            neurons_min: self.config.neurons_min,
            neurons_max: self.config.neurons_max,
            iter_max: self.config.iter_max,
            return_even_if_failed: true,
        };
        match simulator.get_random_genotype(&request) {
            Ok(genotype) if !is_invalid(&genotype) => individual.set_genotype(genotype),
            Ok(_) => false,
            Err(e) => {
                log::warn!("Random genotype request failed: {e}");
                false
            }
        }
    }
}

/// Builds initial populations from predefined genotypes, filled up with the
/// simplest genotype (or a fixed initial genotype).
#[derive(Debug, Clone, Default)]
pub struct Predefiner {
    genotypes: Vec<String>,
}

impl Predefiner {
    /// Seed genotypes used before the simplest genotype.
    pub fn new(genotypes: Vec<String>) -> Self {
        Self { genotypes }
    }

    /// Load a JSON list of genotype strings.
    pub fn from_file(path: &Path) -> Result<Self, RecordError> {
        let text = fs::read_to_string(path).map_err(|source| RecordError::Io {
            path: PathBuf::from(path),
            source,
        })?;
        let genotypes: Vec<String> = serde_json::from_str(&text)?;
        log::info!("Loaded {} predefined genotypes from {}", genotypes.len(), path.display());
        Ok(Self { genotypes })
    }

    /// Predefined genotypes.
    pub fn genotypes(&self) -> &[String] {
        &self.genotypes
    }

    /// First `n` of: predefined genotypes, then seed genotypes.
    pub fn population<S: Simulator + ?Sized>(
        &self,
        simulator: &mut S,
        n: usize,
        genetic_format: &str,
        initial_genotype: Option<&str>,
    ) -> Result<Vec<Individual>, SimulatorError> {
        let mut population: Vec<Individual> = self
            .genotypes
            .iter()
            .take(n)
            .map(|g| Individual::new(g.clone()))
            .collect();

        while population.len() < n {
            let genotype = match initial_genotype {
                Some(g) => g.to_string(),
                None => simulator.get_simplest(genetic_format)?,
            };
            population.push(Individual::new(genotype));
        }

        Ok(population)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::evolution::numeric::NumericSimulator;
    use crate::compute::evolution::simulator::INVALID_GENOTYPE;
    use serde_json::Value;
    use std::io::Write;

    /// Simulator whose operators always fail with the sentinel.
    struct Sterile;

    impl Simulator for Sterile {
        fn evaluate(&mut self, genotypes: &[String]) -> Result<Vec<Value>, SimulatorError> {
            Ok(genotypes.iter().map(|_| Value::Null).collect())
        }
        fn cross_over(&mut self, _: &str, _: &str) -> Result<String, SimulatorError> {
            Ok(INVALID_GENOTYPE.to_string())
        }
        fn mutate(&mut self, genotypes: &[String]) -> Result<Vec<String>, SimulatorError> {
            Ok(vec![INVALID_GENOTYPE.to_string(); genotypes.len()])
        }
        fn get_simplest(&mut self, _: &str) -> Result<String, SimulatorError> {
            Ok("X".to_string())
        }
        fn get_random_genotype(
            &mut self,
            _: &RandomGenotypeRequest<'_>,
        ) -> Result<String, SimulatorError> {
            Err(SimulatorError::CallFailed {
                call: "getRandomGenotype",
                message: "unavailable".to_string(),
            })
        }
        fn dissimilarity(
            &mut self,
            _: &[String],
            method: i32,
        ) -> Result<Vec<Vec<f64>>, SimulatorError> {
            Err(SimulatorError::UnsupportedMethod(method))
        }
    }

    #[test]
    fn test_sentinel_mutation_keeps_genotype() {
        let mut ind = Individual::with_fitness("X", vec![3.0]);
        assert!(!mutate(&mut Sterile, &mut ind));
        assert_eq!(ind.genotype, "X");
        assert!(ind.is_valid());
    }

    #[test]
    fn test_sentinel_crossover_keeps_parents() {
        let mut a = Individual::with_fitness("X", vec![1.0]);
        let mut b = Individual::with_fitness("XX", vec![2.0]);
        assert_eq!(cross(&mut Sterile, &mut a, &mut b), (false, false));
        assert_eq!(a.genotype, "X");
        assert_eq!(b.genotype, "XX");
        assert!(a.is_valid() && b.is_valid());
    }

    #[test]
    fn test_mutation_invalidates_fitness() {
        let mut sim = NumericSimulator::new(2, 3);
        let mut ind = Individual::with_fitness("0,0", vec![0.0]);
        assert!(mutate(&mut sim, &mut ind));
        assert!(!ind.is_valid());
    }

    #[test]
    fn test_one_sided_crossover() {
        let mut sim = NumericSimulator::new(2, 3);
        let mut a = Individual::with_fitness("0,0", vec![0.0]);
        let mut b = Individual::with_fitness("2,2", vec![-8.0]);
        let (changed_a, changed_b) = cross(&mut sim, &mut a, &mut b);
        assert!(changed_a && changed_b);

        let mut c = Individual::with_fitness("0,0", vec![0.0]);
        let mut d = Individual::with_fitness("1,1,1", vec![-3.0]);
        assert_eq!(cross(&mut sim, &mut c, &mut d), (false, false));
    }

    #[test]
    fn test_randomizer() {
        let mut sim = NumericSimulator::new(2, 3);
        let mut rng = StdRng::seed_from_u64(0);
        let mut ind = Individual::with_fitness("0,0", vec![0.0]);

        let never = Randomizer::new(RandomizerConfig::default());
        assert!(!never.randomize(&mut sim, &mut ind, &mut rng));

        let always = Randomizer::new(RandomizerConfig {
            probability: 1.0,
            ..Default::default()
        });
        assert!(always.randomize(&mut sim, &mut ind, &mut rng));
        assert!(!ind.is_valid());

        let mut kept = Individual::new("X");
        assert!(!always.randomize(&mut Sterile, &mut kept, &mut rng));
        assert_eq!(kept.genotype, "X");
    }

    #[test]
    fn test_predefiner_fills_with_simplest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"["3,3", "4,4"]"#).unwrap();

        let predefiner = Predefiner::from_file(file.path()).unwrap();
        let mut sim = NumericSimulator::new(2, 0);
        let pop = predefiner.population(&mut sim, 4, "1", None).unwrap();
        let genotypes: Vec<&str> = pop.iter().map(|i| i.genotype.as_str()).collect();
        assert_eq!(genotypes, vec!["3,3", "4,4", "1,1", "1,1"]);

        let truncated = predefiner.population(&mut sim, 1, "1", Some("0,0")).unwrap();
        assert_eq!(truncated.len(), 1);
        assert_eq!(truncated[0].genotype, "3,3");

        let seeded = Predefiner::default()
            .population(&mut sim, 2, "1", Some("0,0"))
            .unwrap();
        assert!(seeded.iter().all(|i| i.genotype == "0,0"));
    }
}
