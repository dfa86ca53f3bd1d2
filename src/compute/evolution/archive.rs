//! Hall of fame: the best individuals seen during a run.

use std::cmp::Ordering;

use super::individual::{FitnessShape, Individual};

/// Bounded, fitness-ordered set of the best-ever individuals.
///
/// Entries are kept best first and deduplicated by genotype. A newcomer is
/// inserted ahead of entries of equal rank; when full, the worst entry is evicted.
#[derive(Debug, Clone)]
pub struct HallOfFame {
    max_size: usize,
    items: Vec<Individual>,
}

impl HallOfFame {
    /// Create an empty hall of fame.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            items: Vec::with_capacity(max_size),
        }
    }

    /// Restore from entries already ordered best first.
    pub fn from_entries(max_size: usize, mut items: Vec<Individual>) -> Self {
        items.truncate(max_size);
        Self { max_size, items }
    }

    /// Get hall of fame size.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the hall of fame is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of entries.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Entries, best first.
    pub fn items(&self) -> &[Individual] {
        &self.items
    }

    /// Best entry.
    pub fn best(&self) -> Option<&Individual> {
        self.items.first()
    }

    /// Offer every evaluated individual of `population`.
    pub fn update(&mut self, population: &[Individual], shape: &FitnessShape) {
        self.update_by(population, |a, b| shape.compare_individuals(a, b));
    }

    /// Offer every evaluated individual, ranked by `compare` (greater is better).
    pub fn update_by<F>(&mut self, population: &[Individual], mut compare: F)
    where
        F: FnMut(&Individual, &Individual) -> Ordering,
    {
        if self.max_size == 0 {
            return;
        }

        for candidate in population.iter().filter(|i| i.is_valid()) {
            let full = self.items.len() >= self.max_size;
            if full {
                let Some(worst) = self.items.last() else {
                    continue;
                };
                if compare(candidate, worst) != Ordering::Greater {
                    continue;
                }
            }
            if self.items.iter().any(|i| i.genotype == candidate.genotype) {
                continue;
            }
            if full {
                self.items.pop();
            }
            let position = self
                .items
                .partition_point(|i| compare(i, candidate) == Ordering::Greater);
            self.items.insert(position, candidate.clone());
        }
    }
}
