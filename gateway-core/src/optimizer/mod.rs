//! Rule engine, cost model and statistics (C8/C9): rewrites a
//! [`LogicalPlan`](crate::plan::LogicalPlan) into an equivalent, cheaper
//! one using table/column statistics plus process-wide execution feedback.

pub mod cost;
pub mod feedback;
pub mod rules;
pub mod stats;

pub use cost::CardinalityEstimator;
pub use feedback::FeedbackStore;
pub use rules::optimize;
pub use stats::{ColumnStats, StatisticsStore, TableStats};
