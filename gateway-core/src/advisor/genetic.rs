use super::candidate::IndexCandidate;
use rand::Rng;

/// Tunables for the subset-selection search (§4.7 "genetic search").
#[derive(Debug, Clone, Copy)]
pub struct GeneticConfig {
    pub population_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            population_size: 30,
            generations: 40,
            mutation_rate: 0.05,
            crossover_rate: 0.7,
        }
    }
}

type Genome = Vec<bool>;

fn fitness(genome: &Genome, scored: &[(IndexCandidate, f64)], max_num_indexes: usize) -> f64 {
    let chosen: Vec<usize> = genome.iter().enumerate().filter(|(_, &b)| b).map(|(i, _)| i).collect();
    if chosen.len() > max_num_indexes {
        return 0.0;
    }
    chosen.iter().map(|&i| scored[i].1).sum()
}

fn random_genome(len: usize, max_num_indexes: usize, rng: &mut impl Rng) -> Genome {
    let mut genome = vec![false; len];
    let count = rng.gen_range(0..=max_num_indexes.min(len));
    let mut indices: Vec<usize> = (0..len).collect();
    for i in (1..indices.len()).rev() {
        let j = rng.gen_range(0..=i);
        indices.swap(i, j);
    }
    for &idx in indices.iter().take(count) {
        genome[idx] = true;
    }
    genome
}

fn tournament_select<'a>(population: &'a [Genome], fitnesses: &[f64], rng: &mut impl Rng) -> &'a Genome {
    let a = rng.gen_range(0..population.len());
    let b = rng.gen_range(0..population.len());
    if fitnesses[a] >= fitnesses[b] {
        &population[a]
    } else {
        &population[b]
    }
}

fn crossover(a: &Genome, b: &Genome, rate: f64, rng: &mut impl Rng) -> Genome {
    if rng.gen::<f64>() > rate || a.len() < 2 {
        return a.clone();
    }
    let point = rng.gen_range(1..a.len());
    a[..point].iter().chain(&b[point..]).copied().collect()
}

fn mutate(genome: &mut Genome, rate: f64, rng: &mut impl Rng) {
    for bit in genome.iter_mut() {
        if rng.gen::<f64>() < rate {
            *bit = !*bit;
        }
    }
}

/// Selects a subset of `scored` candidates respecting `max_num_indexes`
/// via a genetic search over bitmask genomes (§4.7): fitness is the sum
/// of benefits of the selected candidates, with a tournament-select +
/// single-point-crossover + bit-flip-mutation generational loop.
/// Falls back to a plain truncation when there are too few candidates
/// to make a population search worthwhile.
pub fn select_indexes(
    scored: &[(IndexCandidate, f64)],
    max_num_indexes: usize,
    config: &GeneticConfig,
) -> Vec<(IndexCandidate, f64)> {
    if scored.is_empty() {
        return vec![];
    }
    if scored.len() <= max_num_indexes {
        return scored.to_vec();
    }

    let mut rng = rand::thread_rng();
    let len = scored.len();
    let mut population: Vec<Genome> = (0..config.population_size)
        .map(|_| random_genome(len, max_num_indexes, &mut rng))
        .collect();

    let mut best_genome = population[0].clone();
    let mut best_fitness = fitness(&best_genome, scored, max_num_indexes);

    for _ in 0..config.generations {
        let fitnesses: Vec<f64> = population.iter().map(|g| fitness(g, scored, max_num_indexes)).collect();
        for (g, &f) in population.iter().zip(&fitnesses) {
            if f > best_fitness {
                best_fitness = f;
                best_genome = g.clone();
            }
        }

        let mut next_gen = Vec::with_capacity(population.len());
        for _ in 0..population.len() {
            let parent_a = tournament_select(&population, &fitnesses, &mut rng);
            let parent_b = tournament_select(&population, &fitnesses, &mut rng);
            let mut child = crossover(parent_a, parent_b, config.crossover_rate, &mut rng);
            mutate(&mut child, config.mutation_rate, &mut rng);
            next_gen.push(child);
        }
        population = next_gen;
    }

    let mut selected: Vec<(IndexCandidate, f64)> = best_genome
        .iter()
        .enumerate()
        .filter(|(_, &b)| b)
        .map(|(i, _)| scored[i].clone())
        .collect();
    selected.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::Priority;

    fn candidate(table: &str, col: &str) -> IndexCandidate {
        IndexCandidate {
            table: table.to_string(),
            columns: vec![col.to_string()],
            unique: false,
            priority: Priority::Where,
        }
    }

    #[test]
    fn returns_all_when_fewer_than_cap() {
        let scored = vec![(candidate("t", "a"), 0.5), (candidate("t", "b"), 0.3)];
        let selected = select_indexes(&scored, 5, &GeneticConfig::default());
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn respects_max_num_indexes_cap() {
        let scored: Vec<_> = (0..12)
            .map(|i| (candidate("t", &format!("c{i}")), (i as f64) / 12.0))
            .collect();
        let config = GeneticConfig {
            population_size: 20,
            generations: 15,
            ..GeneticConfig::default()
        };
        let selected = select_indexes(&scored, 4, &config);
        assert!(selected.len() <= 4);
    }

    #[test]
    fn prefers_higher_benefit_candidates() {
        let scored: Vec<_> = (0..10)
            .map(|i| (candidate("t", &format!("c{i}")), (i as f64) / 10.0))
            .collect();
        let config = GeneticConfig {
            population_size: 40,
            generations: 60,
            ..GeneticConfig::default()
        };
        let selected = select_indexes(&scored, 3, &config);
        assert!(!selected.is_empty());
        assert!(selected[0].1 >= 0.5);
    }
}
