//! Logical & physical plan (C7): arena-allocated plan nodes, plan
//! lowering, and the Explain renderer.

pub mod expr;
pub mod logical;
pub mod physical;

pub use expr::{CmpOp, Expr, LogicOp, OrderKey, SortDir};
pub use logical::{AggFunc, AggItem, JoinType, LogicalNode, LogicalPlan, NodeId, PlanBuilder, PushedLimit};
pub use physical::{lower_direct, PhysicalNode, PhysicalOp, PhysicalPlan};
