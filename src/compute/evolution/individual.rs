//! Individuals and the per-run fitness descriptor.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Fitness vector; one value per objective.
pub type Fitness = Vec<f64>;

/// A genotype paired with its (possibly stale) fitness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    /// Opaque genotype token understood by the simulator.
    pub genotype: String,
    /// `None` until evaluated, and again after any genotype change.
    pub fitness: Option<Fitness>,
    /// Untransformed scalar fitness kept aside by diversity-based modes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_fitness: Option<f64>,
}

impl Individual {
    /// Individual with invalid fitness.
    pub fn new(genotype: impl Into<String>) -> Self {
        Self {
            genotype: genotype.into(),
            fitness: None,
            raw_fitness: None,
        }
    }

    /// Individual with a known fitness.
    pub fn with_fitness(genotype: impl Into<String>, fitness: Fitness) -> Self {
        Self {
            genotype: genotype.into(),
            fitness: Some(fitness),
            raw_fitness: None,
        }
    }

    /// Whether the fitness reflects the current genotype.
    pub fn is_valid(&self) -> bool {
        self.fitness.is_some()
    }

    /// Replace the genotype; fitness is invalidated only if it actually changed.
    pub fn set_genotype(&mut self, genotype: String) -> bool {
        if genotype == self.genotype {
            return false;
        }
        self.genotype = genotype;
        self.invalidate();
        true
    }

    /// Drop the fitness so the individual is evaluated again.
    pub fn invalidate(&mut self) {
        self.fitness = None;
        self.raw_fitness = None;
    }

    /// First fitness component, or negative infinity when invalid.
    pub fn primary(&self) -> f64 {
        self.fitness
            .as_ref()
            .and_then(|f| f.first().copied())
            .unwrap_or(f64::NEG_INFINITY)
    }

    /// Untransformed score: `raw_fitness` if set, else [`Self::primary`].
    pub fn raw(&self) -> f64 {
        self.raw_fitness.unwrap_or_else(|| self.primary())
    }
}

/// Weights vector describing the objectives of one run.
///
/// Positive weights maximize, negative weights minimize. Comparisons work on
/// weighted values, so "better" always means "greater" after weighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitnessShape {
    pub weights: Vec<f64>,
}

impl FitnessShape {
    /// All objectives maximized.
    pub fn maximizing(objectives: usize) -> Self {
        Self {
            weights: vec![1.0; objectives],
        }
    }

    /// Number of objectives.
    pub fn objectives(&self) -> usize {
        self.weights.len()
    }

    /// Fitness assigned to genotypes that failed evaluation.
    pub fn bad_fitness(&self) -> Fitness {
        vec![-1.0; self.objectives()]
    }

    fn weighted(&self, fitness: &[f64]) -> impl Iterator<Item = f64> {
        fitness.iter().zip(&self.weights).map(|(v, w)| v * w)
    }

    /// Lexicographic comparison of weighted fitness.
    pub fn compare(&self, a: &[f64], b: &[f64]) -> Ordering {
        for (x, y) in self.weighted(a).zip(self.weighted(b)) {
            match x.total_cmp(&y) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }

    /// Compare two individuals; invalid fitness ranks below everything.
    pub fn compare_individuals(&self, a: &Individual, b: &Individual) -> Ordering {
        match (&a.fitness, &b.fitness) {
            (Some(fa), Some(fb)) => self.compare(fa, fb),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        }
    }

    /// Whether `a` Pareto-dominates `b`: no worse on every weighted objective and
    /// strictly better on at least one.
    pub fn dominates(&self, a: &[f64], b: &[f64]) -> bool {
        let mut strictly_better = false;
        for (x, y) in self.weighted(a).zip(self.weighted(b)) {
            if x < y {
                return false;
            }
            if x > y {
                strictly_better = true;
            }
        }
        strictly_better
    }
}
