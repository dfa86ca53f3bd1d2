//! Per-generation statistics.

use crate::schema::LogRecord;

use super::adaptive::ControllerReading;
use super::individual::{Fitness, Individual};

/// Per-objective aggregates over a set of fitness vectors.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FitnessSummary {
    pub avg: Vec<f64>,
    pub stddev: Vec<f64>,
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

impl FitnessSummary {
    /// Mean, population standard deviation, minimum and maximum of every
    /// objective. Empty input yields empty vectors.
    pub fn compile(fitnesses: &[&Fitness]) -> Self {
        let Some(objectives) = fitnesses.iter().map(|f| f.len()).min() else {
            return Self::default();
        };
        let n = fitnesses.len() as f64;
        let mut summary = Self::default();
        for o in 0..objectives {
            let values = fitnesses.iter().map(|f| f[o]);
            let avg = values.clone().sum::<f64>() / n;
            let var = values.clone().map(|v| (v - avg).powi(2)).sum::<f64>() / n;
            summary.avg.push(avg);
            summary.stddev.push(var.sqrt());
            summary.min.push(values.clone().fold(f64::INFINITY, f64::min));
            summary.max.push(values.fold(f64::NEG_INFINITY, f64::max));
        }
        summary
    }

    /// Summary of the evaluated members of `population`.
    pub fn of_population(population: &[Individual]) -> Self {
        let fitnesses: Vec<&Fitness> = population.iter().filter_map(|i| i.fitness.as_ref()).collect();
        Self::compile(&fitnesses)
    }
}

/// Append-only record of generation statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Logbook {
    records: Vec<LogRecord>,
}

impl Logbook {
    /// Create an empty logbook.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from previously recorded generations.
    pub fn from_records(records: Vec<LogRecord>) -> Self {
        Self { records }
    }

    /// Append a generation and stream it to the log.
    pub fn record(
        &mut self,
        generation: usize,
        nevals: usize,
        summary: FitnessSummary,
        reading: ControllerReading,
    ) -> &LogRecord {
        let (strength, temperature) = match reading {
            ControllerReading::None => (None, None),
            ControllerReading::Strength(s) => (Some(s), None),
            ControllerReading::Temperature(t) => (None, Some(t)),
        };
        let entry = LogRecord {
            generation,
            nevals,
            avg: summary.avg,
            stddev: summary.stddev,
            min: summary.min,
            max: summary.max,
            strength,
            temperature,
        };
        log::info!(
            "gen {:>4}  nevals {:>4}  avg {:?}  std {:?}  min {:?}  max {:?}",
            entry.generation,
            entry.nevals,
            entry.avg,
            entry.stddev,
            entry.min,
            entry.max
        );
        self.records.push(entry);
        &self.records[self.records.len() - 1]
    }

    /// All recorded generations.
    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    /// Number of recorded generations.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if no generation was recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Most recent record.
    pub fn last(&self) -> Option<&LogRecord> {
        self.records.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile() {
        let a = vec![1.0, 10.0];
        let b = vec![3.0, 10.0];
        let summary = FitnessSummary::compile(&[&a, &b]);
        assert_eq!(summary.avg, vec![2.0, 10.0]);
        assert_eq!(summary.stddev, vec![1.0, 0.0]);
        assert_eq!(summary.min, vec![1.0, 10.0]);
        assert_eq!(summary.max, vec![3.0, 10.0]);
    }

    #[test]
    fn test_population_skips_invalid() {
        let population = vec![
            Individual::with_fitness("a", vec![-2.0]),
            Individual::new("b"),
            Individual::with_fitness("c", vec![-4.0]),
        ];
        let summary = FitnessSummary::of_population(&population);
        assert_eq!(summary.avg, vec![-3.0]);
        assert_eq!(FitnessSummary::of_population(&[]), FitnessSummary::default());
    }

    #[test]
    fn test_logbook_records_readings() {
        let mut logbook = Logbook::new();
        logbook.record(0, 10, FitnessSummary::default(), ControllerReading::None);
        let entry = logbook.record(
            1,
            7,
            FitnessSummary::default(),
            ControllerReading::Temperature(99.0),
        );
        assert_eq!(entry.temperature, Some(99.0));
        assert_eq!(entry.strength, None);
        assert_eq!(logbook.len(), 2);
        assert_eq!(logbook.records()[0].generation, 0);
    }
}
