//! In-crate simulator over real-valued vectors.
//!
//! Genotypes are comma-separated floats (`"0.5,-1.25,3"`). Criterion `i` scores
//! a genotype as `-sum((x - i)^2)`, so the first criterion is the negated
//! sphere function and additional criteria pull towards shifted optima.

use rand::prelude::*;
use rand_distr::StandardNormal;
use serde_json::{Map, Value, json};

use super::simulator::{INVALID_GENOTYPE, RandomGenotypeRequest, Simulator, SimulatorError};

/// Euclidean distance.
pub const METHOD_EUCLIDEAN: i32 = 1;
/// Manhattan distance.
pub const METHOD_MANHATTAN: i32 = 2;

/// Deterministic simulator for numeric genotypes.
pub struct NumericSimulator {
    dimension: usize,
    criteria: Vec<String>,
    sigma: f64,
    gene_range: (f64, f64),
    rng: StdRng,
}

impl NumericSimulator {
    /// Simulator for `dimension`-gene vectors reporting the `vertpos` criterion.
    pub fn new(dimension: usize, seed: u64) -> Self {
        Self {
            dimension: dimension.max(1),
            criteria: vec!["vertpos".to_string()],
            sigma: 0.5,
            gene_range: (-5.0, 5.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Report these criterion names instead of `vertpos`.
    pub fn with_criteria(mut self, criteria: &[String]) -> Self {
        self.criteria = criteria.to_vec();
        self
    }

    /// Standard deviation of mutation noise.
    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigma = sigma;
        self
    }

    /// Genes per genotype.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Parse a genotype, `None` if any gene is not a finite number.
    pub fn parse(genotype: &str) -> Option<Vec<f64>> {
        let genes: Option<Vec<f64>> = genotype
            .split(',')
            .map(|g| g.trim().parse::<f64>().ok().filter(|x| x.is_finite()))
            .collect();
        genes.filter(|g| !g.is_empty())
    }

    /// Format genes as a genotype.
    pub fn format(genes: &[f64]) -> String {
        genes
            .iter()
            .map(|g| g.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    fn random_genes(&mut self, len: usize) -> Vec<f64> {
        let (lo, hi) = self.gene_range;
        (0..len).map(|_| self.rng.gen_range(lo..=hi)).collect()
    }

    fn score(&self, genes: &[f64]) -> Map<String, Value> {
        let mut data = Map::new();
        for (i, criterion) in self.criteria.iter().enumerate() {
            let shift = i as f64;
            let value: f64 = -genes.iter().map(|x| (x - shift).powi(2)).sum::<f64>();
            data.insert(criterion.clone(), json!(value));
        }
        data.insert("numparts".to_string(), json!(genes.len()));
        data.insert("numjoints".to_string(), json!(0));
        data.insert("numneurons".to_string(), json!(0));
        data.insert("numconnections".to_string(), json!(0));
        data
    }
}

impl Simulator for NumericSimulator {
    fn evaluate(&mut self, genotypes: &[String]) -> Result<Vec<Value>, SimulatorError> {
        Ok(genotypes
            .iter()
            .map(|g| match Self::parse(g) {
                Some(genes) => json!({ "evaluations": { "": Value::Object(self.score(&genes)) } }),
                None => json!({}),
            })
            .collect())
    }

    fn cross_over(&mut self, genotype_a: &str, genotype_b: &str) -> Result<String, SimulatorError> {
        let (Some(a), Some(b)) = (Self::parse(genotype_a), Self::parse(genotype_b)) else {
            return Ok(INVALID_GENOTYPE.to_string());
        };
        if a.len() != b.len() {
            return Ok(INVALID_GENOTYPE.to_string());
        }
        let t: f64 = self.rng.r#gen();
        let child: Vec<f64> = a.iter().zip(&b).map(|(x, y)| t * x + (1.0 - t) * y).collect();
        Ok(Self::format(&child))
    }

    fn mutate(&mut self, genotypes: &[String]) -> Result<Vec<String>, SimulatorError> {
        Ok(genotypes
            .iter()
            .map(|g| match Self::parse(g) {
                Some(mut genes) => {
                    for x in genes.iter_mut() {
                        let noise: f64 = self.rng.sample(StandardNormal);
                        *x += self.sigma * noise;
                    }
                    Self::format(&genes)
                }
                None => INVALID_GENOTYPE.to_string(),
            })
            .collect())
    }

    fn get_simplest(&mut self, _genetic_format: &str) -> Result<String, SimulatorError> {
        Ok(Self::format(&vec![1.0; self.dimension]))
    }

    fn get_random_genotype(
        &mut self,
        request: &RandomGenotypeRequest<'_>,
    ) -> Result<String, SimulatorError> {
        let len = match Self::parse(request.initial_genotype) {
            Some(genes) => genes.len(),
            None if request.return_even_if_failed => self.dimension,
            None => return Ok(INVALID_GENOTYPE.to_string()),
        };
        let genes = self.random_genes(len);
        Ok(Self::format(&genes))
    }

    fn dissimilarity(
        &mut self,
        genotypes: &[String],
        method: i32,
    ) -> Result<Vec<Vec<f64>>, SimulatorError> {
        let distance: fn(&[f64], &[f64]) -> f64 = match method {
            METHOD_EUCLIDEAN => euclidean,
            METHOD_MANHATTAN => manhattan,
            other => return Err(SimulatorError::UnsupportedMethod(other)),
        };

        let vectors = genotypes
            .iter()
            .map(|g| Self::parse(g).ok_or_else(|| SimulatorError::MalformedGenotype(g.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(first) = vectors.first()
            && vectors.iter().any(|v| v.len() != first.len())
        {
            return Err(SimulatorError::CallFailed {
                call: "dissimilarity",
                message: "genotypes differ in dimension".to_string(),
            });
        }

        Ok(vectors
            .iter()
            .map(|a| vectors.iter().map(|b| distance(a, b)).collect())
            .collect())
    }
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn manhattan(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genos(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_evaluate_sphere() {
        let mut sim = NumericSimulator::new(2, 0);
        let results = sim.evaluate(&genos(&["1,2", "oops"])).unwrap();
        let data = &results[0]["evaluations"][""];
        assert_eq!(data["vertpos"].as_f64(), Some(-5.0));
        assert_eq!(data["numparts"].as_f64(), Some(2.0));
        assert!(results[1].get("evaluations").is_none());
    }

    #[test]
    fn test_shifted_criteria() {
        let criteria = vec!["a".to_string(), "b".to_string()];
        let mut sim = NumericSimulator::new(2, 0).with_criteria(&criteria);
        let results = sim.evaluate(&genos(&["1,1"])).unwrap();
        let data = &results[0]["evaluations"][""];
        assert_eq!(data["a"].as_f64(), Some(-2.0));
        assert_eq!(data["b"].as_f64(), Some(0.0));
    }

    #[test]
    fn test_cross_over_dimension_mismatch() {
        let mut sim = NumericSimulator::new(2, 0);
        assert_eq!(sim.cross_over("1,2", "1,2,3").unwrap(), INVALID_GENOTYPE);
        let child = NumericSimulator::parse(&sim.cross_over("0,0", "2,2").unwrap()).unwrap();
        assert!(child.iter().all(|x| (0.0..=2.0).contains(x)));
    }

    #[test]
    fn test_mutate_is_seeded() {
        let mut a = NumericSimulator::new(3, 7);
        let mut b = NumericSimulator::new(3, 7);
        let input = genos(&["0,0,0"]);
        assert_eq!(a.mutate(&input).unwrap(), b.mutate(&input).unwrap());
        assert_ne!(a.mutate(&input).unwrap(), input);
    }

    #[test]
    fn test_dissimilarity_methods() {
        let mut sim = NumericSimulator::new(2, 0);
        let input = genos(&["0,0", "3,4"]);
        let euclid = sim.dissimilarity(&input, METHOD_EUCLIDEAN).unwrap();
        assert_eq!(euclid, vec![vec![0.0, 5.0], vec![5.0, 0.0]]);
        let manhattan = sim.dissimilarity(&input, METHOD_MANHATTAN).unwrap();
        assert_eq!(manhattan[0][1], 7.0);
        assert_eq!(
            sim.dissimilarity(&input, 9),
            Err(SimulatorError::UnsupportedMethod(9))
        );
    }

    #[test]
    fn test_random_genotype_keeps_dimension() {
        let mut sim = NumericSimulator::new(4, 1);
        let request = RandomGenotypeRequest {
            initial_genotype: "1,1",
            parts_min: 1,
            parts_max: 100,
            neurons_min: 1,
            neurons_max: 100,
            iter_max: 100,
            return_even_if_failed: true,
        };
        let genes = NumericSimulator::parse(&sim.get_random_genotype(&request).unwrap()).unwrap();
        assert_eq!(genes.len(), 2);
        assert!(genes.iter().all(|x| (-5.0..=5.0).contains(x)));
    }
}
