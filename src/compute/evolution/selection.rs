//! Selection operators.
//!
//! Single-objective runs use tournaments; multi-objective runs use NSGA-II
//! survivor selection and the crowded binary tournament (DCD) for parents.

use std::cmp::Ordering;

use rand::prelude::*;

use super::individual::{Fitness, FitnessShape, Individual};

fn fitness_of<'a>(individual: &'a Individual, fallback: &'a [f64]) -> &'a [f64] {
    individual.fitness.as_deref().unwrap_or(fallback)
}

fn unevaluated(shape: &FitnessShape) -> Fitness {
    vec![f64::NEG_INFINITY; shape.objectives()]
}

/// `k` tournaments of `tournament_size` aspirants drawn with replacement; the
/// first best aspirant wins each tournament.
pub fn select_tournament(
    individuals: &[Individual],
    k: usize,
    tournament_size: usize,
    shape: &FitnessShape,
    rng: &mut StdRng,
) -> Vec<Individual> {
    if individuals.is_empty() {
        return Vec::new();
    }
    (0..k)
        .map(|_| {
            let mut winner = rng.gen_range(0..individuals.len());
            for _ in 1..tournament_size.max(1) {
                let aspirant = rng.gen_range(0..individuals.len());
                if shape.compare_individuals(&individuals[aspirant], &individuals[winner])
                    == Ordering::Greater
                {
                    winner = aspirant;
                }
            }
            individuals[winner].clone()
        })
        .collect()
}

/// Indices of `individuals` grouped into Pareto fronts, best front first.
pub fn non_dominated_fronts(individuals: &[Individual], shape: &FitnessShape) -> Vec<Vec<usize>> {
    let fallback = unevaluated(shape);
    let n = individuals.len();
    let mut dominated_by: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut domination_count = vec![0usize; n];

    for p in 0..n {
        for q in (p + 1)..n {
            let fp = fitness_of(&individuals[p], &fallback);
            let fq = fitness_of(&individuals[q], &fallback);
            if shape.dominates(fp, fq) {
                dominated_by[p].push(q);
                domination_count[q] += 1;
            } else if shape.dominates(fq, fp) {
                dominated_by[q].push(p);
                domination_count[p] += 1;
            }
        }
    }

    let mut fronts = Vec::new();
    let mut current: Vec<usize> = (0..n).filter(|&i| domination_count[i] == 0).collect();
    while !current.is_empty() {
        let mut next = Vec::new();
        for &p in &current {
            for &q in &dominated_by[p] {
                domination_count[q] -= 1;
                if domination_count[q] == 0 {
                    next.push(q);
                }
            }
        }
        next.sort_unstable();
        fronts.push(current);
        current = next;
    }
    fronts
}

/// Crowding distance of each member of `members` (indices into `individuals`).
/// Boundary members get infinite distance; inner members accumulate the
/// normalized gap between their neighbours on every objective.
pub fn crowding_distances(
    individuals: &[Individual],
    members: &[usize],
    shape: &FitnessShape,
) -> Vec<f64> {
    let fallback = unevaluated(shape);
    let len = members.len();
    let mut distances = vec![0.0; len];
    if len == 0 {
        return distances;
    }

    for objective in 0..shape.objectives() {
        let value = |slot: usize| -> f64 {
            fitness_of(&individuals[members[slot]], &fallback)
                .get(objective)
                .copied()
                .unwrap_or(f64::NEG_INFINITY)
        };
        let mut order: Vec<usize> = (0..len).collect();
        order.sort_by(|&a, &b| value(a).total_cmp(&value(b)));

        distances[order[0]] = f64::INFINITY;
        distances[order[len - 1]] = f64::INFINITY;

        let spread = value(order[len - 1]) - value(order[0]);
        if spread == 0.0 || !spread.is_finite() {
            continue;
        }
        for w in order.windows(3) {
            distances[w[1]] += (value(w[2]) - value(w[0])) / spread;
        }
    }
    distances
}

/// Crowding distance of every individual, treating the whole slice as one set.
pub fn assign_crowding(individuals: &[Individual], shape: &FitnessShape) -> Vec<f64> {
    let all: Vec<usize> = (0..individuals.len()).collect();
    crowding_distances(individuals, &all, shape)
}

/// NSGA-II survivor selection: whole fronts while they fit, then the least
/// crowded members of the first front that does not.
pub fn select_nsga2(individuals: &[Individual], k: usize, shape: &FitnessShape) -> Vec<Individual> {
    let k = k.min(individuals.len());
    let mut chosen: Vec<usize> = Vec::with_capacity(k);

    for front in non_dominated_fronts(individuals, shape) {
        let missing = k - chosen.len();
        if missing == 0 {
            break;
        }
        if front.len() <= missing {
            chosen.extend(front);
            continue;
        }
        let distances = crowding_distances(individuals, &front, shape);
        let mut slots: Vec<usize> = (0..front.len()).collect();
        slots.sort_by(|&a, &b| distances[b].total_cmp(&distances[a]));
        chosen.extend(slots.into_iter().take(missing).map(|s| front[s]));
        break;
    }

    chosen.into_iter().map(|i| individuals[i].clone()).collect()
}

/// Crowded binary tournament: Pareto dominance first, then larger crowding
/// distance, then a coin flip. Parents come from two shuffled permutations
/// taken four at a time.
pub fn select_tournament_dcd(
    individuals: &[Individual],
    k: usize,
    crowding: &[f64],
    shape: &FitnessShape,
    rng: &mut StdRng,
) -> Vec<Individual> {
    let n = individuals.len();
    if n == 0 {
        return Vec::new();
    }
    let fallback = unevaluated(shape);

    let duel = |a: usize, b: usize, rng: &mut StdRng| -> usize {
        let fa = fitness_of(&individuals[a], &fallback);
        let fb = fitness_of(&individuals[b], &fallback);
        if shape.dominates(fa, fb) {
            a
        } else if shape.dominates(fb, fa) {
            b
        } else if crowding[a] < crowding[b] {
            b
        } else if crowding[a] > crowding[b] {
            a
        } else if rng.gen_bool(0.5) {
            a
        } else {
            b
        }
    };

    let mut first: Vec<usize> = (0..n).collect();
    let mut second: Vec<usize> = (0..n).collect();
    first.shuffle(rng);
    second.shuffle(rng);

    let mut chosen = Vec::with_capacity(k + 3);
    let mut i = 0;
    while chosen.len() < k {
        let at = |perm: &[usize], j: usize| perm[j % n];
        chosen.push(duel(at(&first, i), at(&first, i + 1), rng));
        chosen.push(duel(at(&first, i + 2), at(&first, i + 3), rng));
        chosen.push(duel(at(&second, i), at(&second, i + 1), rng));
        chosen.push(duel(at(&second, i + 2), at(&second, i + 3), rng));
        i += 4;
    }
    chosen.truncate(k);

    chosen.into_iter().map(|i| individuals[i].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn population(fitnesses: &[&[f64]]) -> Vec<Individual> {
        fitnesses
            .iter()
            .enumerate()
            .map(|(i, f)| Individual::with_fitness(format!("g{i}"), f.to_vec()))
            .collect()
    }

    #[test]
    fn test_tournament_picks_best_with_full_pressure() {
        let pop = population(&[&[1.0], &[9.0], &[3.0]]);
        let shape = FitnessShape::maximizing(1);
        let mut rng = StdRng::seed_from_u64(0);
        // Large tournaments almost surely contain the best
        let chosen = select_tournament(&pop, 20, 50, &shape, &mut rng);
        assert_eq!(chosen.len(), 20);
        assert!(chosen.iter().all(|i| i.genotype == "g1"));
    }

    #[test]
    fn test_tournament_size_one_is_uniform() {
        let pop = population(&[&[1.0], &[9.0], &[3.0]]);
        let shape = FitnessShape::maximizing(1);
        let mut rng = StdRng::seed_from_u64(4);
        let chosen = select_tournament(&pop, 300, 1, &shape, &mut rng);
        assert!(chosen.iter().any(|i| i.genotype == "g0"));
        assert!(chosen.iter().any(|i| i.genotype == "g2"));
    }

    #[test]
    fn test_fronts() {
        let pop = population(&[&[1.0, 1.0], &[3.0, 1.0], &[1.0, 3.0], &[2.0, 2.0], &[0.0, 0.0]]);
        let fronts = non_dominated_fronts(&pop, &FitnessShape::maximizing(2));
        assert_eq!(fronts, vec![vec![1, 2, 3], vec![0], vec![4]]);
    }

    #[test]
    fn test_crowding_boundaries_infinite() {
        let pop = population(&[&[0.0, 4.0], &[1.0, 3.0], &[2.0, 1.0], &[4.0, 0.0]]);
        let d = assign_crowding(&pop, &FitnessShape::maximizing(2));
        assert!(d[0].is_infinite() && d[3].is_infinite());
        assert!((d[1] - (2.0 / 4.0 + 3.0 / 4.0)).abs() < 1e-12);
        assert!((d[2] - (3.0 / 4.0 + 3.0 / 4.0)).abs() < 1e-12);
    }

    #[test]
    fn test_nsga2_truncates_last_front_by_crowding() {
        let pop = population(&[
            &[0.0, 4.0],
            &[1.0, 3.0],
            &[2.0, 1.0],
            &[4.0, 0.0],
            &[-1.0, -1.0],
        ]);
        let chosen = select_nsga2(&pop, 3, &FitnessShape::maximizing(2));
        let mut genotypes: Vec<&str> = chosen.iter().map(|i| i.genotype.as_str()).collect();
        genotypes.sort();
        assert_eq!(genotypes, vec!["g0", "g2", "g3"]);
    }

    #[test]
    fn test_dcd_prefers_dominant() {
        let pop = population(&[&[5.0, 5.0], &[0.0, 0.0]]);
        let shape = FitnessShape::maximizing(2);
        let crowding = assign_crowding(&pop, &shape);
        let mut rng = StdRng::seed_from_u64(1);
        let chosen = select_tournament_dcd(&pop, 6, &crowding, &shape, &mut rng);
        assert_eq!(chosen.len(), 6);
        // Every duel of two distinct members is won by g0
        let wins = chosen.iter().filter(|i| i.genotype == "g0").count();
        assert!(wins >= 3);
    }
}
