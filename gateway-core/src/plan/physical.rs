use super::logical::{AggItem, JoinType, LogicalNode, LogicalPlan, NodeId, PushedLimit};
use super::expr::{Expr, OrderKey};
use crate::value::ColumnDescriptor;
use serde::{Deserialize, Serialize};

/// Physical plan node: mirrors [`LogicalNode`] but with concrete operator
/// identity, schema and a cost estimate baked in. Immutable once produced;
/// its lifetime equals the executing query (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicalNode {
    pub id: NodeId,
    pub op: PhysicalOp,
    pub schema: Vec<ColumnDescriptor>,
    pub estimated_rows: f64,
    pub cost: f64,
    pub parallel_hint: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PhysicalOp {
    TableScan {
        table: String,
        projected_columns: Option<Vec<String>>,
        pushed_predicates: Vec<Expr>,
        pushed_limit: Option<PushedLimit>,
    },
    Filter {
        conditions: Vec<Expr>,
        child: NodeId,
    },
    Projection {
        exprs: Vec<Expr>,
        aliases: Vec<Option<String>>,
        child: NodeId,
    },
    Limit {
        n: usize,
        offset: usize,
        child: NodeId,
    },
    Sort {
        keys: Vec<OrderKey>,
        child: NodeId,
    },
    HashJoin {
        join_type: JoinType,
        conds: Vec<Expr>,
        build: NodeId,
        probe: NodeId,
        build_is_left: bool,
    },
    Aggregate {
        group_by: Vec<String>,
        agg_items: Vec<AggItem>,
        child: NodeId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicalPlan {
    pub nodes: Vec<PhysicalNode>,
    pub root: NodeId,
}

impl PhysicalPlan {
    pub fn node(&self, id: NodeId) -> &PhysicalNode {
        &self.nodes[id.0]
    }

    /// Depth-indented textual rendering of plan IDs and types (§4.5 Explain).
    pub fn explain(&self) -> String {
        let mut out = String::new();
        self.explain_node(self.root, 0, &mut out);
        out
    }

    fn explain_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let node = self.node(id);
        let indent = "  ".repeat(depth);
        out.push_str(&format!(
            "{indent}#{} {} rows={:.1} cost={:.1}\n",
            id.0,
            op_name(&node.op),
            node.estimated_rows,
            node.cost
        ));
        for child in physical_children(&node.op) {
            self.explain_node(child, depth + 1, out);
        }
    }
}

fn op_name(op: &PhysicalOp) -> &'static str {
    match op {
        PhysicalOp::TableScan { .. } => "TableScan",
        PhysicalOp::Filter { .. } => "Filter",
        PhysicalOp::Projection { .. } => "Projection",
        PhysicalOp::Limit { .. } => "Limit",
        PhysicalOp::Sort { .. } => "Sort",
        PhysicalOp::HashJoin { .. } => "HashJoin",
        PhysicalOp::Aggregate { .. } => "Aggregate",
    }
}

pub fn physical_children(op: &PhysicalOp) -> Vec<NodeId> {
    match op {
        PhysicalOp::TableScan { .. } => vec![],
        PhysicalOp::Filter { child, .. }
        | PhysicalOp::Projection { child, .. }
        | PhysicalOp::Limit { child, .. }
        | PhysicalOp::Sort { child, .. }
        | PhysicalOp::Aggregate { child, .. } => vec![*child],
        PhysicalOp::HashJoin { build, probe, .. } => vec![*build, *probe],
    }
}

/// Direct (unoptimized) lowering from logical to physical, used both as the
/// optimizer's input shape and, for the soundness property in §8, as the
/// baseline to compare optimized execution against.
pub fn lower_direct(plan: &LogicalPlan) -> PhysicalPlan {
    let mut nodes = vec![None; plan.nodes.len()];
    lower_node(plan, plan.root, &mut nodes);
    PhysicalPlan {
        nodes: nodes.into_iter().map(|n| n.expect("all nodes lowered")).collect(),
        root: plan.root,
    }
}

fn lower_node(plan: &LogicalPlan, id: NodeId, out: &mut Vec<Option<PhysicalNode>>) {
    if out[id.0].is_some() {
        return;
    }
    for child in plan.node(id).children() {
        lower_node(plan, child, out);
    }
    let op = match plan.node(id).clone() {
        LogicalNode::DataSource {
            table,
            projected_columns,
            pushed_predicates,
            pushed_limit,
        } => PhysicalOp::TableScan {
            table,
            projected_columns,
            pushed_predicates,
            pushed_limit,
        },
        LogicalNode::Selection { conditions, child } => PhysicalOp::Filter { conditions, child },
        LogicalNode::Projection {
            exprs,
            aliases,
            child,
        } => PhysicalOp::Projection {
            exprs,
            aliases,
            child,
        },
        LogicalNode::Limit { n, offset, child } => PhysicalOp::Limit { n, offset, child },
        LogicalNode::Sort { keys, child } => PhysicalOp::Sort { keys, child },
        LogicalNode::Join {
            join_type,
            conds,
            left,
            right,
        } => PhysicalOp::HashJoin {
            join_type,
            conds,
            build: right,
            probe: left,
            build_is_left: false,
        },
        LogicalNode::Aggregate {
            group_by,
            agg_items,
            child,
        } => PhysicalOp::Aggregate {
            group_by,
            agg_items,
            child,
        },
    };
    out[id.0] = Some(PhysicalNode {
        id,
        op,
        schema: vec![],
        estimated_rows: 0.0,
        cost: 0.0,
        parallel_hint: false,
    });
}

/// Fills in `schema`, `estimated_rows` and `cost` bottom-up, using
/// `table_schema` to resolve a `TableScan`'s output columns. Separate from
/// `lower_direct` so the optimizer can rewrite the tree first and schema
/// inference runs once against the final shape.
pub fn annotate(plan: &mut PhysicalPlan, table_schema: impl Fn(&str) -> Vec<ColumnDescriptor>) {
    let order = postorder(plan);
    for id in order {
        let (schema, rows) = {
            let node = plan.node(id).clone();
            compute_schema_and_rows(plan, &node, &table_schema)
        };
        let node = &mut plan.nodes[id.0];
        node.cost = match &node.op {
            PhysicalOp::TableScan { .. } => crate::optimizer::cost::cost_scan(rows),
            PhysicalOp::Filter { .. } => crate::optimizer::cost::cost_filter(rows),
            _ => rows,
        };
        node.schema = schema;
        node.estimated_rows = rows;
    }
}

fn postorder(plan: &PhysicalPlan) -> Vec<NodeId> {
    let mut order = Vec::with_capacity(plan.nodes.len());
    let mut visited = vec![false; plan.nodes.len()];
    fn visit(plan: &PhysicalPlan, id: NodeId, visited: &mut Vec<bool>, order: &mut Vec<NodeId>) {
        if visited[id.0] {
            return;
        }
        visited[id.0] = true;
        for child in physical_children(&plan.node(id).op) {
            visit(plan, child, visited, order);
        }
        order.push(id);
    }
    visit(plan, plan.root, &mut visited, &mut order);
    order
}

fn compute_schema_and_rows(
    plan: &PhysicalPlan,
    node: &PhysicalOp,
    table_schema: &impl Fn(&str) -> Vec<ColumnDescriptor>,
) -> (Vec<ColumnDescriptor>, f64) {
    match node {
        PhysicalOp::TableScan {
            table,
            projected_columns,
            ..
        } => {
            let full = table_schema(table);
            let schema = match projected_columns {
                Some(cols) => full
                    .into_iter()
                    .filter(|c| cols.contains(&c.name))
                    .collect(),
                None => full,
            };
            (schema, 1000.0)
        }
        PhysicalOp::Filter { child, .. } => (plan.node(*child).schema.clone(), plan.node(*child).estimated_rows),
        PhysicalOp::Projection { child, aliases, exprs, .. } => {
            let child_schema = &plan.node(*child).schema;
            let schema = exprs
                .iter()
                .zip(aliases.iter())
                .enumerate()
                .map(|(i, (expr, alias))| {
                    let name = alias.clone().unwrap_or_else(|| match expr {
                        Expr::Column(c) => c.clone(),
                        _ => format!("col{i}"),
                    });
                    let src = match expr {
                        Expr::Column(c) => child_schema.iter().find(|cd| cd.name == *c).cloned(),
                        _ => None,
                    };
                    src.unwrap_or_else(|| ColumnDescriptor::new(name, "", 253))
                })
                .collect();
            (schema, plan.node(*child).estimated_rows)
        }
        PhysicalOp::Limit { child, n, .. } => (
            plan.node(*child).schema.clone(),
            plan.node(*child).estimated_rows.min(*n as f64),
        ),
        PhysicalOp::Sort { child, .. } => (plan.node(*child).schema.clone(), plan.node(*child).estimated_rows),
        PhysicalOp::HashJoin { build, probe, build_is_left, .. } => {
            let build_schema = plan.node(*build).schema.clone();
            let probe_schema = plan.node(*probe).schema.clone();
            let schema = if *build_is_left {
                build_schema.into_iter().chain(probe_schema).collect()
            } else {
                probe_schema.into_iter().chain(build_schema).collect()
            };
            let rows = plan.node(*build).estimated_rows.min(plan.node(*probe).estimated_rows);
            (schema, rows)
        }
        PhysicalOp::Aggregate { child, group_by, agg_items, .. } => {
            let child_schema = &plan.node(*child).schema;
            let mut schema: Vec<ColumnDescriptor> = group_by
                .iter()
                .map(|g| {
                    child_schema
                        .iter()
                        .find(|c| c.name == *g)
                        .cloned()
                        .unwrap_or_else(|| ColumnDescriptor::new(g.clone(), "", 253))
                })
                .collect();
            schema.extend(agg_items.iter().map(|a| ColumnDescriptor::new(a.alias.clone(), "", 8)));
            let rows = if group_by.is_empty() {
                1.0
            } else {
                (plan.node(*child).estimated_rows / 2.0).max(1.0)
            };
            (schema, rows)
        }
    }
}
