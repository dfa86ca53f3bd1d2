//! Adaptive mutation control.
//!
//! A controller decides how many times the mutation operator runs on an
//! individual and adjusts that intensity once per generation from the
//! population's best fitness.

use std::collections::VecDeque;

use rand::prelude::*;

use crate::schema::MutationControl;

use super::individual::{Fitness, Individual};

/// Relative improvement band treated as stagnation.
pub const STAGNATION_BAND: f64 = 0.01;

/// Controller diagnostics recorded with each generation's statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControllerReading {
    None,
    Strength(f64),
    Temperature(f64),
}

/// Modulates mutation intensity across generations.
pub trait MutationController {
    /// Apply `operator` to `individual` as many times as the current intensity
    /// dictates (possibly zero).
    fn mutate(
        &mut self,
        individual: &mut Individual,
        rng: &mut StdRng,
        operator: &mut dyn FnMut(&mut Individual),
    );

    /// Observe one generation's fitnesses and adjust the intensity.
    fn update(&mut self, fitnesses: &[Fitness], rng: &mut StdRng) -> ControllerReading;
}

/// Build the controller described by `control`.
pub fn controller_for(control: &MutationControl) -> Box<dyn MutationController> {
    match *control {
        MutationControl::Fixed => Box::new(FixedMutation),
        MutationControl::VaryingStrength {
            lower_bound,
            upper_bound,
            memory_length,
            scale_factor,
        } => Box::new(VaryingStrengthMutation::new(
            lower_bound,
            upper_bound,
            memory_length,
            scale_factor,
        )),
        MutationControl::SimulatedAnnealing {
            temperature,
            cooling_rate,
        } => Box::new(SimulatedAnnealingMutation::new(temperature, cooling_rate)),
    }
}

fn best_primary(fitnesses: &[Fitness]) -> Option<f64> {
    fitnesses
        .iter()
        .filter_map(|f| f.first().copied())
        .max_by(f64::total_cmp)
}

/// One mutation per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedMutation;

impl MutationController for FixedMutation {
    fn mutate(
        &mut self,
        individual: &mut Individual,
        _rng: &mut StdRng,
        operator: &mut dyn FnMut(&mut Individual),
    ) {
        operator(individual);
    }

    fn update(&mut self, _fitnesses: &[Fitness], _rng: &mut StdRng) -> ControllerReading {
        ControllerReading::None
    }
}

/// Strength rises while the best fitness stagnates over a sliding window and
/// decays while it moves.
#[derive(Debug, Clone)]
pub struct VaryingStrengthMutation {
    strength: f64,
    lower_bound: f64,
    upper_bound: f64,
    memory_length: usize,
    scale_factor: f64,
    history: VecDeque<f64>,
}

impl VaryingStrengthMutation {
    /// Create a controller starting at `lower_bound`.
    pub fn new(lower_bound: f64, upper_bound: f64, memory_length: usize, scale_factor: f64) -> Self {
        Self {
            strength: lower_bound,
            lower_bound,
            upper_bound,
            memory_length,
            scale_factor,
            history: VecDeque::with_capacity(memory_length + 1),
        }
    }

    /// Current mutation strength.
    pub fn strength(&self) -> f64 {
        self.strength
    }

    /// Record one generation's best fitness and return the new strength.
    pub fn observe(&mut self, best: f64) -> f64 {
        self.history.push_back(best);
        while self.history.len() > self.memory_length {
            self.history.pop_front();
        }

        let (Some(&oldest), Some(&newest)) = (self.history.front(), self.history.back()) else {
            return self.strength;
        };
        if self.history.len() < self.memory_length || oldest == 0.0 {
            return self.strength;
        }

        let improvement = (newest - oldest) / oldest;
        if -STAGNATION_BAND < improvement && improvement < STAGNATION_BAND {
            self.strength = (self.strength * (1.0 + self.scale_factor)).min(self.upper_bound);
        } else {
            self.strength = (self.strength * (1.0 - self.scale_factor)).max(self.lower_bound);
        }
        log::debug!("Mutation strength {:.3} (window improvement {improvement:.4})", self.strength);
        self.strength
    }
}

impl MutationController for VaryingStrengthMutation {
    fn mutate(
        &mut self,
        individual: &mut Individual,
        rng: &mut StdRng,
        operator: &mut dyn FnMut(&mut Individual),
    ) {
        let whole = self.strength.floor();
        for _ in 0..whole as usize {
            operator(individual);
        }
        let fraction = self.strength - whole;
        if fraction > 0.0 && rng.r#gen::<f64>() < fraction {
            operator(individual);
        }
    }

    fn update(&mut self, fitnesses: &[Fitness], _rng: &mut StdRng) -> ControllerReading {
        if let Some(best) = best_primary(fitnesses) {
            self.observe(best);
        }
        ControllerReading::Strength(self.strength)
    }
}

/// Mutation gated by a temperature that cools when a fitness decline is
/// rejected under the Boltzmann criterion.
#[derive(Debug, Clone)]
pub struct SimulatedAnnealingMutation {
    temperature: f64,
    cooling_rate: f64,
    previous_fitness: Option<f64>,
}

impl SimulatedAnnealingMutation {
    /// Create a controller at the given starting temperature.
    pub fn new(temperature: f64, cooling_rate: f64) -> Self {
        Self {
            temperature,
            cooling_rate,
            previous_fitness: None,
        }
    }

    /// Current temperature.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Probability of accepting a move from `previous` to `current`.
    pub fn acceptance_probability(&self, previous: f64, current: f64) -> f64 {
        if current > previous {
            return 1.0;
        }
        if self.temperature <= 0.0 {
            return 0.0;
        }
        ((current - previous) / self.temperature).exp()
    }

    /// Record one generation's best fitness, cooling on rejection. The first
    /// observation only sets the reference.
    pub fn observe(&mut self, current: f64, draw: f64) -> f64 {
        if let Some(previous) = self.previous_fitness
            && self.acceptance_probability(previous, current) <= draw
        {
            self.temperature *= 1.0 - self.cooling_rate;
            log::debug!("Temperature cooled to {:.3}", self.temperature);
        }
        self.previous_fitness = Some(current);
        self.temperature
    }
}

impl MutationController for SimulatedAnnealingMutation {
    fn mutate(
        &mut self,
        individual: &mut Individual,
        rng: &mut StdRng,
        operator: &mut dyn FnMut(&mut Individual),
    ) {
        if self.temperature > rng.gen_range(0..100) as f64 {
            operator(individual);
        }
    }

    fn update(&mut self, fitnesses: &[Fitness], rng: &mut StdRng) -> ControllerReading {
        if let Some(best) = best_primary(fitnesses) {
            let draw: f64 = rng.r#gen();
            self.observe(best, draw);
        }
        ControllerReading::Temperature(self.temperature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn count_mutations(controller: &mut dyn MutationController, rng: &mut StdRng) -> usize {
        let mut count = 0;
        let mut ind = Individual::new("g");
        controller.mutate(&mut ind, rng, &mut |_: &mut Individual| count += 1);
        count
    }

    #[test]
    fn test_fixed_mutates_once() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(count_mutations(&mut FixedMutation, &mut rng), 1);
    }

    #[test]
    fn test_strength_rises_on_stagnation() {
        let mut ctl = VaryingStrengthMutation::new(1.0, 5.0, 4, 0.1);
        for _ in 0..3 {
            assert_eq!(ctl.observe(10.0), 1.0);
        }
        let after = ctl.observe(10.0);
        assert!((after - 1.1).abs() < 1e-12);

        for _ in 0..100 {
            ctl.observe(10.0);
        }
        assert_eq!(ctl.strength(), 5.0);
    }

    #[test]
    fn test_strength_decays_on_progress() {
        let mut ctl = VaryingStrengthMutation::new(1.0, 5.0, 4, 0.1);
        for _ in 0..30 {
            ctl.observe(10.0);
        }
        let high = ctl.strength();
        let low = [10.0, 11.0, 12.0, 13.0]
            .into_iter()
            .map(|f| ctl.observe(f))
            .last()
            .unwrap();
        assert!(low < high);

        for f in 0..100 {
            ctl.observe(20.0 * (f + 2) as f64);
        }
        assert_eq!(ctl.strength(), 1.0);
    }

    #[test]
    fn test_strength_skips_zero_baseline() {
        let mut ctl = VaryingStrengthMutation::new(2.0, 5.0, 2, 0.1);
        ctl.observe(0.0);
        assert_eq!(ctl.observe(0.0), 2.0);
    }

    #[test]
    fn test_stochastic_rounding() {
        let mut ctl = VaryingStrengthMutation::new(2.5, 5.0, 4, 0.1);
        let mut rng = StdRng::seed_from_u64(11);
        let counts: Vec<usize> = (0..2000).map(|_| count_mutations(&mut ctl, &mut rng)).collect();
        assert!(counts.iter().all(|&c| c == 2 || c == 3));
        let threes = counts.iter().filter(|&&c| c == 3).count();
        assert!((800..1200).contains(&threes));
    }

    #[test]
    fn test_acceptance_of_improvement() {
        let sa = SimulatedAnnealingMutation::new(100.0, 0.01);
        assert_eq!(sa.acceptance_probability(1.0, 2.0), 1.0);
        let decline = sa.acceptance_probability(2.0, 1.0);
        assert!((decline - (-0.01f64).exp()).abs() < 1e-12);

        let frozen = SimulatedAnnealingMutation::new(0.0, 0.01);
        assert_eq!(frozen.acceptance_probability(2.0, 1.0), 0.0);
    }

    #[test]
    fn test_first_observation_only_stores() {
        let mut sa = SimulatedAnnealingMutation::new(100.0, 0.5);
        assert_eq!(sa.observe(5.0, 0.999), 100.0);
        // Rejected decline
        assert_eq!(sa.observe(4.0, 0.999), 50.0);
        // Improvement is always accepted
        assert_eq!(sa.observe(6.0, 0.999), 50.0);
        // Accepted decline
        assert_eq!(sa.observe(5.0, 0.5), 50.0);
    }

    #[test]
    fn test_cold_annealing_never_mutates() {
        let mut sa = SimulatedAnnealingMutation::new(0.0, 0.01);
        let mut rng = StdRng::seed_from_u64(5);
        assert!((0..100).all(|_| count_mutations(&mut sa, &mut rng) == 0));
    }

    proptest! {
        #[test]
        fn prop_temperature_never_increases(
            bests in prop::collection::vec(-100.0f64..100.0, 1..40),
            seed in any::<u64>(),
        ) {
            let mut sa = SimulatedAnnealingMutation::new(100.0, 0.05);
            let mut rng = StdRng::seed_from_u64(seed);
            let mut last = sa.temperature();
            for best in bests {
                sa.update(&[vec![best]], &mut rng);
                prop_assert!(sa.temperature() <= last);
                prop_assert!(sa.temperature() >= 0.0);
                last = sa.temperature();
            }
        }

        #[test]
        fn prop_strength_stays_in_bounds(
            bests in prop::collection::vec(-50.0f64..50.0, 1..60),
        ) {
            let mut ctl = VaryingStrengthMutation::new(1.0, 5.0, 4, 0.1);
            for best in bests {
                let s = ctl.observe(best);
                prop_assert!((1.0..=5.0).contains(&s));
            }
        }
    }
}
