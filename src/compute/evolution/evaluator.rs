//! Genotype scoring through the simulator.
//!
//! A genotype that cannot be scored never aborts the run: it receives the bad
//! fitness vector (`-1` in every objective) and the reason is logged.

use serde_json::Value;

use crate::schema::{STRUCTURAL_CRITERIA, StructuralConstraints};

use super::individual::{Fitness, FitnessShape};
use super::simulator::{Simulator, SimulatorError, is_invalid};

/// Why a genotype was assigned bad fitness.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    #[error("genotype is the invalid sentinel")]
    InvalidSentinel,
    #[error("evaluation data has no usable value for '{0}'")]
    Malformed(String),
    #[error(transparent)]
    Simulator(#[from] SimulatorError),
    #[error("constraint '{criterion}' violated: {actual} exceeds {limit}")]
    Constraint {
        criterion: &'static str,
        actual: f64,
        limit: f64,
    },
}

/// Scores genotypes on the configured criteria.
#[derive(Debug, Clone)]
pub struct GenotypeEvaluator {
    criteria: Vec<String>,
    constraints: StructuralConstraints,
    shape: FitnessShape,
}

impl GenotypeEvaluator {
    /// Create an evaluator for `criteria` under `constraints`.
    pub fn new(criteria: Vec<String>, constraints: StructuralConstraints) -> Self {
        let shape = FitnessShape::maximizing(criteria.len());
        Self {
            criteria,
            constraints,
            shape,
        }
    }

    /// Fitness shape of the criteria.
    pub fn shape(&self) -> &FitnessShape {
        &self.shape
    }

    /// Criteria names, in fitness order.
    pub fn criteria(&self) -> &[String] {
        &self.criteria
    }

    /// Fitness of `genotype`, or bad fitness if it cannot be scored.
    pub fn evaluate<S: Simulator + ?Sized>(&self, simulator: &mut S, genotype: &str) -> Fitness {
        match self.assess(simulator, genotype) {
            Ok(fitness) => fitness,
            Err(rejection) => {
                let bad = self.shape.bad_fitness();
                log::warn!(
                    "Could not evaluate genotype \"{genotype}\" ({rejection}), assigned low fitness {bad:?}"
                );
                bad
            }
        }
    }

    /// Score a genotype, reporting why it was rejected.
    pub fn assess<S: Simulator + ?Sized>(
        &self,
        simulator: &mut S,
        genotype: &str,
    ) -> Result<Fitness, Rejection> {
        if is_invalid(genotype) {
            return Err(Rejection::InvalidSentinel);
        }

        let results = simulator.evaluate(&[genotype.to_string()])?;
        let data = results
            .first()
            .and_then(|r| r.get("evaluations"))
            .and_then(|e| e.get(""))
            .and_then(Value::as_object)
            .ok_or_else(|| Rejection::Malformed("evaluations".to_string()))?;

        let fitness = self
            .criteria
            .iter()
            .map(|c| {
                data.get(c)
                    .and_then(Value::as_f64)
                    .ok_or_else(|| Rejection::Malformed(c.clone()))
            })
            .collect::<Result<Fitness, _>>()?;

        for criterion in STRUCTURAL_CRITERIA {
            let Some(limit) = self.constraints.limit(criterion) else {
                continue;
            };
            let actual = if criterion == "numgenochars" {
                Some(genotype.chars().count() as f64)
            } else {
                data.get(criterion).and_then(Value::as_f64)
            };
            let actual = actual.ok_or_else(|| Rejection::Malformed(criterion.to_string()))?;
            if actual > limit {
                return Err(Rejection::Constraint {
                    criterion,
                    actual,
                    limit,
                });
            }
        }

        Ok(fitness)
    }
}
