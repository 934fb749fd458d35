use super::cost::{cost_hash_join, CardinalityEstimator};
use super::feedback::FeedbackStore;
use super::stats::StatisticsStore;
use crate::plan::{JoinType, LogicalNode, LogicalPlan, NodeId, PlanBuilder, PushedLimit};
use std::collections::HashSet;
use tracing::debug;

/// Applies the default rule set (§4.5) in order until fixpoint: predicate
/// pushdown, projection pushdown, limit pushdown, constant folding, join
/// reordering. Idempotent: a second application on the output of the first
/// is a no-op (§8 "optimizer idempotence").
pub fn optimize(plan: &LogicalPlan, stats: &StatisticsStore, feedback: &FeedbackStore) -> LogicalPlan {
    let mut current = plan.clone();
    loop {
        let folded = constant_fold(&current);
        let pushed_pred = predicate_pushdown(&folded);
        let pushed_proj = projection_pushdown(&pushed_pred);
        let pushed_limit = limit_pushdown(&pushed_proj);
        let reordered = join_reorder(&pushed_limit, stats, feedback);
        if plans_equal(&reordered, &current) {
            return reordered;
        }
        current = reordered;
    }
}

fn plans_equal(a: &LogicalPlan, b: &LogicalPlan) -> bool {
    serde_json::to_string(a).unwrap_or_default() == serde_json::to_string(b).unwrap_or_default()
}

/// Rule 4: constant folding in conditions.
pub fn constant_fold(plan: &LogicalPlan) -> LogicalPlan {
    let mut builder = PlanBuilder::new();
    let root = fold_node(plan, plan.root, &mut builder);
    builder.finish(root)
}

fn fold_node(plan: &LogicalPlan, id: NodeId, builder: &mut PlanBuilder) -> NodeId {
    let node = match plan.node(id).clone() {
        LogicalNode::Selection { conditions, child } => {
            let child = fold_node(plan, child, builder);
            let conditions = conditions.into_iter().map(|c| c.fold_constants()).collect();
            LogicalNode::Selection { conditions, child }
        }
        LogicalNode::DataSource {
            table,
            projected_columns,
            pushed_predicates,
            pushed_limit,
        } => LogicalNode::DataSource {
            table,
            projected_columns,
            pushed_predicates: pushed_predicates.into_iter().map(|c| c.fold_constants()).collect(),
            pushed_limit,
        },
        LogicalNode::Projection { exprs, aliases, child } => {
            let child = fold_node(plan, child, builder);
            LogicalNode::Projection { exprs, aliases, child }
        }
        LogicalNode::Limit { n, offset, child } => {
            let child = fold_node(plan, child, builder);
            LogicalNode::Limit { n, offset, child }
        }
        LogicalNode::Sort { keys, child } => {
            let child = fold_node(plan, child, builder);
            LogicalNode::Sort { keys, child }
        }
        LogicalNode::Join {
            join_type,
            conds,
            left,
            right,
        } => {
            let left = fold_node(plan, left, builder);
            let right = fold_node(plan, right, builder);
            let conds = conds.into_iter().map(|c| c.fold_constants()).collect();
            LogicalNode::Join {
                join_type,
                conds,
                left,
                right,
            }
        }
        LogicalNode::Aggregate {
            group_by,
            agg_items,
            child,
        } => {
            let child = fold_node(plan, child, builder);
            LogicalNode::Aggregate {
                group_by,
                agg_items,
                child,
            }
        }
    };
    builder.push(node)
}

/// Rule 1: predicate pushdown. Pushes each atomic (conjunct) predicate
/// below Projections toward the DataSource, recording it in
/// `pushed_predicates`. Stops at Join/Aggregate/Sort/Limit boundaries,
/// wrapping the remainder in a (possibly smaller) Selection.
pub fn predicate_pushdown(plan: &LogicalPlan) -> LogicalPlan {
    let mut builder = PlanBuilder::new();
    let root = rewrite(plan, plan.root, &mut builder);
    builder.finish(root)
}

fn rewrite(plan: &LogicalPlan, id: NodeId, builder: &mut PlanBuilder) -> NodeId {
    match plan.node(id).clone() {
        LogicalNode::Selection { conditions, child } => {
            let conjuncts: Vec<_> = conditions.into_iter().flat_map(|c| c.conjuncts()).collect();
            push_into(plan, child, conjuncts, builder)
        }
        LogicalNode::DataSource { .. } => builder.push(plan.node(id).clone()),
        LogicalNode::Projection { exprs, aliases, child } => {
            let child = rewrite(plan, child, builder);
            builder.push(LogicalNode::Projection { exprs, aliases, child })
        }
        LogicalNode::Limit { n, offset, child } => {
            let child = rewrite(plan, child, builder);
            builder.push(LogicalNode::Limit { n, offset, child })
        }
        LogicalNode::Sort { keys, child } => {
            let child = rewrite(plan, child, builder);
            builder.push(LogicalNode::Sort { keys, child })
        }
        LogicalNode::Join {
            join_type,
            conds,
            left,
            right,
        } => {
            let left = rewrite(plan, left, builder);
            let right = rewrite(plan, right, builder);
            builder.push(LogicalNode::Join {
                join_type,
                conds,
                left,
                right,
            })
        }
        LogicalNode::Aggregate {
            group_by,
            agg_items,
            child,
        } => {
            let child = rewrite(plan, child, builder);
            builder.push(LogicalNode::Aggregate {
                group_by,
                agg_items,
                child,
            })
        }
    }
}

/// Tries to push `conds` all the way to a DataSource through Projection
/// nodes; anything that can't be pushed further is wrapped in a Selection
/// over the (otherwise normally rewritten) subtree.
fn push_into(
    plan: &LogicalPlan,
    child_id: NodeId,
    conds: Vec<crate::plan::Expr>,
    builder: &mut PlanBuilder,
) -> NodeId {
    match plan.node(child_id).clone() {
        LogicalNode::DataSource {
            table,
            projected_columns,
            pushed_predicates,
            pushed_limit,
        } => {
            let mut merged = pushed_predicates;
            merged.extend(conds);
            builder.push(LogicalNode::DataSource {
                table,
                projected_columns,
                pushed_predicates: merged,
                pushed_limit,
            })
        }
        LogicalNode::Projection { exprs, aliases, child } => {
            let new_child = push_into(plan, child, conds, builder);
            builder.push(LogicalNode::Projection { exprs, aliases, child: new_child })
        }
        _ => {
            let new_child = rewrite(plan, child_id, builder);
            builder.push(LogicalNode::Selection {
                conditions: conds,
                child: new_child,
            })
        }
    }
}

/// Rule 2: projection pushdown. Restricts each DataSource's output schema
/// to the columns required by its ancestors.
pub fn projection_pushdown(plan: &LogicalPlan) -> LogicalPlan {
    let mut builder = PlanBuilder::new();
    let root = push_columns(plan, plan.root, None, &mut builder);
    builder.finish(root)
}

fn sorted_cols(set: HashSet<String>) -> Vec<String> {
    let mut v: Vec<String> = set.into_iter().collect();
    v.sort();
    v
}

fn push_columns(
    plan: &LogicalPlan,
    id: NodeId,
    needed: Option<HashSet<String>>,
    builder: &mut PlanBuilder,
) -> NodeId {
    match plan.node(id).clone() {
        LogicalNode::DataSource {
            table,
            projected_columns,
            pushed_predicates,
            pushed_limit,
        } => {
            let cols = match needed {
                Some(n) if !n.is_empty() => Some(sorted_cols(n)),
                _ => projected_columns,
            };
            builder.push(LogicalNode::DataSource {
                table,
                projected_columns: cols,
                pushed_predicates,
                pushed_limit,
            })
        }
        LogicalNode::Selection { conditions, child } => {
            let mut need = needed.unwrap_or_default();
            for c in &conditions {
                let mut cols = vec![];
                c.referenced_columns(&mut cols);
                need.extend(cols);
            }
            let child = push_columns(plan, child, Some(need), builder);
            builder.push(LogicalNode::Selection { conditions, child })
        }
        LogicalNode::Projection { exprs, aliases, child } => {
            let mut need = HashSet::new();
            for e in &exprs {
                let mut cols = vec![];
                e.referenced_columns(&mut cols);
                need.extend(cols);
            }
            let child = push_columns(plan, child, Some(need), builder);
            builder.push(LogicalNode::Projection { exprs, aliases, child })
        }
        LogicalNode::Limit { n, offset, child } => {
            let child = push_columns(plan, child, needed, builder);
            builder.push(LogicalNode::Limit { n, offset, child })
        }
        LogicalNode::Sort { keys, child } => {
            let mut need = needed.unwrap_or_default();
            need.extend(keys.iter().map(|k| k.column.clone()));
            let child = push_columns(plan, child, Some(need), builder);
            builder.push(LogicalNode::Sort { keys, child })
        }
        LogicalNode::Join {
            join_type,
            conds,
            left,
            right,
        } => {
            let mut need = needed.unwrap_or_default();
            for c in &conds {
                let mut cols = vec![];
                c.referenced_columns(&mut cols);
                need.extend(cols);
            }
            let left = push_columns(plan, left, Some(need.clone()), builder);
            let right = push_columns(plan, right, Some(need), builder);
            builder.push(LogicalNode::Join {
                join_type,
                conds,
                left,
                right,
            })
        }
        LogicalNode::Aggregate {
            group_by,
            agg_items,
            child,
        } => {
            let mut need: HashSet<String> = group_by.iter().cloned().collect();
            for item in &agg_items {
                if let Some(c) = &item.column {
                    need.insert(c.clone());
                }
            }
            let child = push_columns(plan, child, Some(need), builder);
            builder.push(LogicalNode::Aggregate {
                group_by,
                agg_items,
                child,
            })
        }
    }
}

/// Rule 3: limit pushdown. When no Sort intervenes, pushes `Limit` (with
/// offset) through Projections into the DataSource's `pushed_limit`.
pub fn limit_pushdown(plan: &LogicalPlan) -> LogicalPlan {
    let mut builder = PlanBuilder::new();
    let root = push_limit_root(plan, plan.root, &mut builder);
    builder.finish(root)
}

fn push_limit_root(plan: &LogicalPlan, id: NodeId, builder: &mut PlanBuilder) -> NodeId {
    match plan.node(id).clone() {
        LogicalNode::Limit { n, offset, child } => {
            match try_push_limit(plan, child, n, offset, builder) {
                Some(pushed) => pushed,
                None => {
                    let child = push_limit_root(plan, child, builder);
                    builder.push(LogicalNode::Limit { n, offset, child })
                }
            }
        }
        LogicalNode::Selection { conditions, child } => {
            let child = push_limit_root(plan, child, builder);
            builder.push(LogicalNode::Selection { conditions, child })
        }
        LogicalNode::Projection { exprs, aliases, child } => {
            let child = push_limit_root(plan, child, builder);
            builder.push(LogicalNode::Projection { exprs, aliases, child })
        }
        LogicalNode::Sort { keys, child } => {
            let child = push_limit_root(plan, child, builder);
            builder.push(LogicalNode::Sort { keys, child })
        }
        LogicalNode::Join {
            join_type,
            conds,
            left,
            right,
        } => {
            let left = push_limit_root(plan, left, builder);
            let right = push_limit_root(plan, right, builder);
            builder.push(LogicalNode::Join {
                join_type,
                conds,
                left,
                right,
            })
        }
        LogicalNode::Aggregate {
            group_by,
            agg_items,
            child,
        } => {
            let child = push_limit_root(plan, child, builder);
            builder.push(LogicalNode::Aggregate {
                group_by,
                agg_items,
                child,
            })
        }
        LogicalNode::DataSource { .. } => builder.push(plan.node(id).clone()),
    }
}

/// Only descends through Projection to a DataSource; Selection/Sort/Join/
/// Aggregate below a Limit block the pushdown (pushing past a Selection
/// would apply the limit before the filter, which is unsound).
fn try_push_limit(
    plan: &LogicalPlan,
    id: NodeId,
    n: usize,
    offset: usize,
    builder: &mut PlanBuilder,
) -> Option<NodeId> {
    match plan.node(id).clone() {
        LogicalNode::DataSource {
            table,
            projected_columns,
            pushed_predicates,
            ..
        } => Some(builder.push(LogicalNode::DataSource {
            table,
            projected_columns,
            pushed_predicates,
            pushed_limit: Some(PushedLimit { n, offset }),
        })),
        LogicalNode::Projection { exprs, aliases, child } => {
            try_push_limit(plan, child, n, offset, builder).map(|new_child| {
                builder.push(LogicalNode::Projection {
                    exprs,
                    aliases,
                    child: new_child,
                })
            })
        }
        _ => None,
    }
}

/// Rule 5: join reordering for inner-join chains of >=3 tables. Minimizes
/// the sum of intermediate cardinalities using the cost model; bushy
/// plans allowed; ties broken by stable original order. Chains beyond a
/// small bound are left as-is to avoid a factorial search.
const MAX_REORDER_CHAIN: usize = 6;

pub fn join_reorder(plan: &LogicalPlan, stats: &StatisticsStore, feedback: &FeedbackStore) -> LogicalPlan {
    let mut builder = PlanBuilder::new();
    let root = reorder_node(plan, plan.root, stats, feedback, &mut builder);
    builder.finish(root)
}

struct ChainLeaf {
    node: LogicalNode,
    table: String,
}

fn reorder_node(
    plan: &LogicalPlan,
    id: NodeId,
    stats: &StatisticsStore,
    feedback: &FeedbackStore,
    builder: &mut PlanBuilder,
) -> NodeId {
    match plan.node(id).clone() {
        LogicalNode::Join { join_type, .. } if join_type == JoinType::Inner => {
            let mut leaves = Vec::new();
            let mut all_conds = Vec::new();
            if collect_inner_chain(plan, id, &mut leaves, &mut all_conds) && leaves.len() >= 3 {
                return build_reordered_chain(leaves, all_conds, stats, feedback, builder);
            }
            // Fall back: rebuild children independently (may still contain
            // smaller reorderable chains nested inside).
            let LogicalNode::Join { join_type, conds, left, right } = plan.node(id).clone() else {
                unreachable!()
            };
            let left = reorder_node(plan, left, stats, feedback, builder);
            let right = reorder_node(plan, right, stats, feedback, builder);
            builder.push(LogicalNode::Join { join_type, conds, left, right })
        }
        LogicalNode::Join { join_type, conds, left, right } => {
            let left = reorder_node(plan, left, stats, feedback, builder);
            let right = reorder_node(plan, right, stats, feedback, builder);
            builder.push(LogicalNode::Join { join_type, conds, left, right })
        }
        LogicalNode::Selection { conditions, child } => {
            let child = reorder_node(plan, child, stats, feedback, builder);
            builder.push(LogicalNode::Selection { conditions, child })
        }
        LogicalNode::Projection { exprs, aliases, child } => {
            let child = reorder_node(plan, child, stats, feedback, builder);
            builder.push(LogicalNode::Projection { exprs, aliases, child })
        }
        LogicalNode::Limit { n, offset, child } => {
            let child = reorder_node(plan, child, stats, feedback, builder);
            builder.push(LogicalNode::Limit { n, offset, child })
        }
        LogicalNode::Sort { keys, child } => {
            let child = reorder_node(plan, child, stats, feedback, builder);
            builder.push(LogicalNode::Sort { keys, child })
        }
        LogicalNode::Aggregate { group_by, agg_items, child } => {
            let child = reorder_node(plan, child, stats, feedback, builder);
            builder.push(LogicalNode::Aggregate { group_by, agg_items, child })
        }
        LogicalNode::DataSource { .. } => builder.push(plan.node(id).clone()),
    }
}

/// Returns true if `id` is entirely a chain of Inner joins over
/// DataSource leaves (no Selection/Projection/Aggregate mixed in), false
/// otherwise (in which case reordering is skipped for safety).
fn collect_inner_chain(
    plan: &LogicalPlan,
    id: NodeId,
    leaves: &mut Vec<ChainLeaf>,
    conds: &mut Vec<crate::plan::Expr>,
) -> bool {
    match plan.node(id) {
        LogicalNode::Join {
            join_type: JoinType::Inner,
            conds: join_conds,
            left,
            right,
        } => {
            conds.extend(join_conds.clone());
            collect_inner_chain(plan, *left, leaves, conds) && collect_inner_chain(plan, *right, leaves, conds)
        }
        LogicalNode::DataSource { table, .. } => {
            leaves.push(ChainLeaf {
                node: plan.node(id).clone(),
                table: table.clone(),
            });
            true
        }
        _ => false,
    }
}

fn build_reordered_chain(
    leaves: Vec<ChainLeaf>,
    conds: Vec<crate::plan::Expr>,
    stats: &StatisticsStore,
    feedback: &FeedbackStore,
    builder: &mut PlanBuilder,
) -> NodeId {
    let est = CardinalityEstimator::new(stats, feedback);
    let n = leaves.len();
    if n > MAX_REORDER_CHAIN {
        debug!(n, "join chain too large to reorder, keeping original order");
        return assemble_left_deep(&leaves, &conds, 0..n, builder);
    }

    let mut best_order: Vec<usize> = (0..n).collect();
    let mut best_cost = chain_cost(&leaves, &best_order, &est);

    let mut perm: Vec<usize> = (0..n).collect();
    permute(&mut perm, 0, &mut |order| {
        let cost = chain_cost(&leaves, order, &est);
        if cost < best_cost {
            best_cost = cost;
            best_order = order.to_vec();
        }
    });

    assemble_left_deep(&leaves, &conds, best_order.into_iter(), builder)
}

fn chain_cost(leaves: &[ChainLeaf], order: &[usize], est: &CardinalityEstimator) -> f64 {
    let mut running_rows = est.table_rows(&leaves[order[0]].table);
    let mut total = 0.0;
    for &idx in &order[1..] {
        let next_rows = est.table_rows(&leaves[idx].table);
        let out = est.join_cardinality(
            JoinType::Inner,
            &leaves[order[0]].table,
            &leaves[idx].table,
            running_rows,
            next_rows,
        );
        total += cost_hash_join(running_rows, next_rows, out);
        running_rows = out;
    }
    total
}

fn permute(perm: &mut Vec<usize>, k: usize, visit: &mut impl FnMut(&[usize])) {
    if k == perm.len() {
        visit(perm);
        return;
    }
    for i in k..perm.len() {
        perm.swap(k, i);
        permute(perm, k + 1, visit);
        perm.swap(k, i);
    }
}

fn assemble_left_deep(
    leaves: &[ChainLeaf],
    conds: &[crate::plan::Expr],
    order: impl Iterator<Item = usize>,
    builder: &mut PlanBuilder,
) -> NodeId {
    let order: Vec<usize> = order.collect();
    let mut acc = builder.push(leaves[order[0]].node.clone());
    for &idx in &order[1..] {
        let right = builder.push(leaves[idx].node.clone());
        acc = builder.push(LogicalNode::Join {
            join_type: JoinType::Inner,
            conds: conds.to_vec(),
            left: acc,
            right,
        });
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{CmpOp, Expr};
    use crate::value::Value;

    fn datasource(table: &str) -> LogicalNode {
        LogicalNode::DataSource {
            table: table.into(),
            projected_columns: None,
            pushed_predicates: vec![],
            pushed_limit: None,
        }
    }

    #[test]
    fn predicate_and_limit_pushdown_scenario() {
        let mut b = PlanBuilder::new();
        let ds = b.push(datasource("t"));
        let sel = b.push(LogicalNode::Selection {
            conditions: vec![Expr::Predicate {
                column: "k".into(),
                op: CmpOp::Eq,
                values: vec![Value::Int(7)],
            }],
            child: ds,
        });
        let lim = b.push(LogicalNode::Limit { n: 10, offset: 0, child: sel });
        let plan = b.finish(lim);

        let stats = StatisticsStore::new();
        let feedback = FeedbackStore::new();
        let optimized = optimize(&plan, &stats, &feedback);

        match optimized.root_node() {
            LogicalNode::DataSource {
                pushed_predicates,
                pushed_limit,
                ..
            } => {
                assert_eq!(pushed_predicates.len(), 1);
                assert_eq!(pushed_limit.as_ref().unwrap().n, 10);
            }
            other => panic!("expected DataSource at root, got {other:?}"),
        }
    }

    #[test]
    fn idempotent_application() {
        let mut b = PlanBuilder::new();
        let ds = b.push(datasource("t"));
        let sel = b.push(LogicalNode::Selection {
            conditions: vec![Expr::Predicate {
                column: "k".into(),
                op: CmpOp::Eq,
                values: vec![Value::Int(7)],
            }],
            child: ds,
        });
        let plan = b.finish(sel);

        let stats = StatisticsStore::new();
        let feedback = FeedbackStore::new();
        let once = optimize(&plan, &stats, &feedback);
        let twice = optimize(&once, &stats, &feedback);
        assert!(plans_equal(&once, &twice));
    }
}
