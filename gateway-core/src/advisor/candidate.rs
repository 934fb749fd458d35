use crate::plan::{LogicalNode, LogicalPlan, NodeId};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    GroupByOrderBy,
    Join,
    Where,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexCandidate {
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub priority: Priority,
}

impl IndexCandidate {
    pub fn to_create_index_sql(&self) -> String {
        let unique = if self.unique { "UNIQUE " } else { "" };
        let name = format!("idx_{}_{}", self.table, self.columns.join("_"));
        format!(
            "CREATE {unique}INDEX {name} ON {} ({})",
            self.table,
            self.columns.join(", ")
        )
    }
}

/// Extracts `(table, columns, unique)` candidates from WHERE, JOIN,
/// GROUP BY and ORDER BY, tagged with a priority (§4.7). Equality/IN
/// predicates are tagged `unique: false` by default — uniqueness is a
/// DDL fact the advisor cannot infer from a query alone, so candidates
/// are conservatively non-unique unless later folded with catalog info.
pub fn extract_candidates(plan: &LogicalPlan) -> Vec<IndexCandidate> {
    let mut out = Vec::new();
    walk(plan, plan.root, None, &mut out);
    dedup(out)
}

fn walk(plan: &LogicalPlan, id: NodeId, table: Option<&str>, out: &mut Vec<IndexCandidate>) {
    let node = plan.node(id);
    let current_table = match node {
        LogicalNode::DataSource { table, .. } => Some(table.as_str()),
        _ => table,
    };

    match node {
        LogicalNode::Selection { conditions, child } => {
            if let Some(t) = current_table {
                for cond in conditions {
                    let mut cols = vec![];
                    cond.referenced_columns(&mut cols);
                    for col in cols {
                        out.push(IndexCandidate {
                            table: t.to_string(),
                            columns: vec![col],
                            unique: false,
                            priority: Priority::Where,
                        });
                    }
                }
            }
            walk(plan, *child, current_table, out);
        }
        LogicalNode::Join { conds, left, right, .. } => {
            let left_table = table_of(plan, *left);
            let right_table = table_of(plan, *right);
            for cond in conds {
                let mut cols = vec![];
                cond.referenced_columns(&mut cols);
                for col in cols {
                    for t in [left_table.as_deref(), right_table.as_deref()].into_iter().flatten() {
                        out.push(IndexCandidate {
                            table: t.to_string(),
                            columns: vec![col.clone()],
                            unique: false,
                            priority: Priority::Join,
                        });
                    }
                }
            }
            walk(plan, *left, None, out);
            walk(plan, *right, None, out);
        }
        LogicalNode::Aggregate { group_by, child, .. } => {
            if let Some(t) = table_of(plan, *child) {
                if !group_by.is_empty() {
                    out.push(IndexCandidate {
                        table: t,
                        columns: group_by.clone(),
                        unique: false,
                        priority: Priority::GroupByOrderBy,
                    });
                }
            }
            walk(plan, *child, current_table, out);
        }
        LogicalNode::Sort { keys, child } => {
            if let Some(t) = table_of(plan, *child) {
                if !keys.is_empty() {
                    out.push(IndexCandidate {
                        table: t,
                        columns: keys.iter().map(|k| k.column.clone()).collect(),
                        unique: false,
                        priority: Priority::GroupByOrderBy,
                    });
                }
            }
            walk(plan, *child, current_table, out);
        }
        LogicalNode::Projection { child, .. } | LogicalNode::Limit { child, .. } => {
            walk(plan, *child, current_table, out);
        }
        LogicalNode::DataSource { .. } => {}
    }
}

fn table_of(plan: &LogicalPlan, id: NodeId) -> Option<String> {
    match plan.node(id) {
        LogicalNode::DataSource { table, .. } => Some(table.clone()),
        other => other.children().first().and_then(|c| table_of(plan, *c)),
    }
}

fn dedup(candidates: Vec<IndexCandidate>) -> Vec<IndexCandidate> {
    let mut seen = HashSet::new();
    candidates.into_iter().filter(|c| seen.insert(c.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{CmpOp, Expr, PlanBuilder};
    use crate::value::Value;

    #[test]
    fn where_predicate_becomes_candidate() {
        let mut b = PlanBuilder::new();
        let ds = b.push(LogicalNode::DataSource {
            table: "orders".into(),
            projected_columns: None,
            pushed_predicates: vec![],
            pushed_limit: None,
        });
        let sel = b.push(LogicalNode::Selection {
            conditions: vec![Expr::Predicate {
                column: "customer_id".into(),
                op: CmpOp::Eq,
                values: vec![Value::Int(1)],
            }],
            child: ds,
        });
        let plan = b.finish(sel);
        let candidates = extract_candidates(&plan);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].table, "orders");
        assert_eq!(candidates[0].columns, vec!["customer_id".to_string()]);
        assert_eq!(candidates[0].priority, Priority::Where);
    }
}
