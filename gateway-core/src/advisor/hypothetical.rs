use super::candidate::IndexCandidate;
use crate::optimizer::cost::{cost_filter, cost_scan, DEFAULT_EQ_SELECTIVITY};
use crate::optimizer::CardinalityEstimator;
use crate::plan::{Expr, LogicalNode, LogicalPlan};

/// Synthesized stats for a hypothetical index: assumes the indexed
/// columns become close to unique (high `ndv`), which is the mechanism
/// by which an index improves equality-predicate selectivity (§4.7
/// "synthesized stats").
fn hypothetical_selectivity(rows: f64) -> f64 {
    if rows <= 1.0 {
        DEFAULT_EQ_SELECTIVITY
    } else {
        (1.0 / rows).max(1e-6)
    }
}

/// Estimates `cost` with and without the candidate index over every plan
/// in the workload that references the candidate's table with a matching
/// predicate column, and returns `benefit = max(0, min(1, (base−with)/base))`
/// averaged across matching plans (0 if the candidate touches none).
pub fn score_candidate(candidate: &IndexCandidate, workload: &[&LogicalPlan], estimator: &CardinalityEstimator) -> f64 {
    let mut benefits = Vec::new();
    for plan in workload {
        if let Some(benefit) = score_against_plan(candidate, plan, estimator) {
            benefits.push(benefit);
        }
    }
    if benefits.is_empty() {
        return 0.0;
    }
    benefits.iter().sum::<f64>() / benefits.len() as f64
}

fn score_against_plan(candidate: &IndexCandidate, plan: &LogicalPlan, estimator: &CardinalityEstimator) -> Option<f64> {
    find_selection_over_table(plan, plan.root, &candidate.table).map(|conditions| {
        let base_rows = estimator.table_rows(&candidate.table);
        let base_selectivity = CardinalityEstimator::combine_and(
            &conditions
                .iter()
                .map(|c| estimator.predicate_selectivity(&candidate.table, c))
                .collect::<Vec<_>>(),
        );
        let base_cost = cost_scan(base_rows) + cost_filter(base_rows * base_selectivity.max(1.0 / base_rows.max(1.0)));

        let touches_candidate = conditions.iter().any(|c| references_candidate_columns(c, candidate));
        if !touches_candidate {
            return 0.0;
        }

        let with_selectivity = hypothetical_selectivity(base_rows);
        let with_cost = cost_scan(base_rows * with_selectivity) + cost_filter(base_rows * with_selectivity);

        if base_cost <= 0.0 {
            0.0
        } else {
            ((base_cost - with_cost) / base_cost).clamp(0.0, 1.0)
        }
    })
}

fn references_candidate_columns(expr: &Expr, candidate: &IndexCandidate) -> bool {
    let mut cols = vec![];
    expr.referenced_columns(&mut cols);
    candidate.columns.iter().any(|c| cols.contains(c))
}

fn find_selection_over_table<'a>(
    plan: &'a LogicalPlan,
    id: crate::plan::NodeId,
    table: &str,
) -> Option<&'a Vec<Expr>> {
    match plan.node(id) {
        LogicalNode::Selection { conditions, child } => {
            if table_matches(plan, *child, table) {
                Some(conditions)
            } else {
                find_selection_over_table(plan, *child, table)
            }
        }
        other => other.children().first().and_then(|c| find_selection_over_table(plan, *c, table)),
    }
}

fn table_matches(plan: &LogicalPlan, id: crate::plan::NodeId, table: &str) -> bool {
    match plan.node(id) {
        LogicalNode::DataSource { table: t, .. } => t == table,
        other => other.children().first().map(|c| table_matches(plan, *c, table)).unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::Priority;
    use crate::optimizer::{FeedbackStore, StatisticsStore};
    use crate::plan::{CmpOp, PlanBuilder};
    use crate::value::Value;

    #[test]
    fn candidate_touching_predicate_has_positive_benefit() {
        let mut b = PlanBuilder::new();
        let ds = b.push(LogicalNode::DataSource {
            table: "t".into(),
            projected_columns: None,
            pushed_predicates: vec![],
            pushed_limit: None,
        });
        let sel = b.push(LogicalNode::Selection {
            conditions: vec![Expr::Predicate {
                column: "id".into(),
                op: CmpOp::Eq,
                values: vec![Value::Int(1)],
            }],
            child: ds,
        });
        let plan = b.finish(sel);

        let stats = StatisticsStore::new();
        let feedback = FeedbackStore::new();
        let estimator = CardinalityEstimator::new(&stats, &feedback);
        let candidate = IndexCandidate {
            table: "t".into(),
            columns: vec!["id".into()],
            unique: false,
            priority: Priority::Where,
        };
        let benefit = score_candidate(&candidate, &[&plan], &estimator);
        assert!(benefit > 0.0);
    }
}
