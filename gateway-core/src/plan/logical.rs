use super::expr::{Expr, OrderKey};
use serde::{Deserialize, Serialize};

/// Index into a [`LogicalPlan`]'s arena. Rewrites build a *new* arena rather
/// than threading parent back-pointers through mutation (see spec DESIGN
/// NOTES: cyclic plan references are modeled as arena indices, never raw
/// back-pointers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggItem {
    pub func: AggFunc,
    pub column: Option<String>,
    pub alias: String,
    pub distinct: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushedLimit {
    pub n: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogicalNode {
    DataSource {
        table: String,
        /// Columns the pushdown rules have restricted the source to emit;
        /// `None` means "all columns".
        projected_columns: Option<Vec<String>>,
        pushed_predicates: Vec<Expr>,
        pushed_limit: Option<PushedLimit>,
    },
    Selection {
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
    Join {
        join_type: JoinType,
        conds: Vec<Expr>,
        left: NodeId,
        right: NodeId,
    },
    Aggregate {
        group_by: Vec<String>,
        agg_items: Vec<AggItem>,
        child: NodeId,
    },
}

impl LogicalNode {
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            LogicalNode::DataSource { .. } => vec![],
            LogicalNode::Selection { child, .. }
            | LogicalNode::Projection { child, .. }
            | LogicalNode::Limit { child, .. }
            | LogicalNode::Sort { child, .. }
            | LogicalNode::Aggregate { child, .. } => vec![*child],
            LogicalNode::Join { left, right, .. } => vec![*left, *right],
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            LogicalNode::DataSource { .. } => "DataSource",
            LogicalNode::Selection { .. } => "Selection",
            LogicalNode::Projection { .. } => "Projection",
            LogicalNode::Limit { .. } => "Limit",
            LogicalNode::Sort { .. } => "Sort",
            LogicalNode::Join { .. } => "Join",
            LogicalNode::Aggregate { .. } => "Aggregate",
        }
    }
}

/// Arena-allocated logical plan tree. `nodes[root.0]` is the plan's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicalPlan {
    pub nodes: Vec<LogicalNode>,
    pub root: NodeId,
}

impl LogicalPlan {
    pub fn node(&self, id: NodeId) -> &LogicalNode {
        &self.nodes[id.0]
    }

    pub fn root_node(&self) -> &LogicalNode {
        self.node(self.root)
    }
}

/// Builds new arenas incrementally; rewrites allocate fresh nodes in a new
/// builder rather than mutating the source arena in place.
#[derive(Default)]
pub struct PlanBuilder {
    nodes: Vec<LogicalNode>,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: LogicalNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn finish(self, root: NodeId) -> LogicalPlan {
        LogicalPlan {
            nodes: self.nodes,
            root,
        }
    }
}
