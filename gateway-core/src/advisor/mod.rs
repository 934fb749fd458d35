//! Index advisor (C10): candidate extraction, hypothetical-index scoring,
//! a genetic search over subsets, and a composite-index merger.

mod candidate;
mod genetic;
mod hypothetical;
mod merger;

pub use candidate::{extract_candidates, IndexCandidate, Priority};
pub use genetic::{select_indexes, GeneticConfig};
pub use hypothetical::score_candidate;
pub use merger::merge_candidates;

use crate::optimizer::{CardinalityEstimator, FeedbackStore, StatisticsStore};

/// Runs the full advisor pipeline over a workload of up to
/// `max_num_query` logical plans (§4.7): extract candidates, score each
/// hypothetically, merge compatible ones, then pick a subset via genetic
/// search. Returns `CREATE [UNIQUE] INDEX ...` statements sorted by
/// benefit descending.
pub struct AdvisorConfig {
    pub max_num_query: usize,
    pub max_num_indexes: usize,
    pub max_index_columns: usize,
    pub genetic: GeneticConfig,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            max_num_query: 50,
            max_num_indexes: 10,
            max_index_columns: 4,
            genetic: GeneticConfig::default(),
        }
    }
}

pub fn advise(
    plans: &[crate::plan::LogicalPlan],
    stats: &StatisticsStore,
    feedback: &FeedbackStore,
    config: &AdvisorConfig,
) -> Vec<String> {
    let workload: Vec<_> = plans.iter().take(config.max_num_query).collect();

    let mut candidates = Vec::new();
    for plan in &workload {
        candidates.extend(extract_candidates(plan));
    }
    candidates = merge_candidates(candidates, config.max_index_columns);

    let estimator = CardinalityEstimator::new(stats, feedback);
    let mut scored: Vec<(IndexCandidate, f64)> = candidates
        .into_iter()
        .map(|c| {
            let benefit = score_candidate(&c, &workload, &estimator);
            (c, benefit)
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let selected = select_indexes(&scored, config.max_num_indexes, &config.genetic);

    selected
        .into_iter()
        .map(|(candidate, _benefit)| candidate.to_create_index_sql())
        .collect()
}
