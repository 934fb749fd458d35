use super::feedback::FeedbackStore;
use super::stats::StatisticsStore;
use crate::plan::{CmpOp, Expr, JoinType};

/// Default selectivities used when statistics (and feedback) are missing
/// (§4.6).
pub const DEFAULT_EQ_SELECTIVITY: f64 = 0.1;
pub const DEFAULT_RANGE_SELECTIVITY: f64 = 0.3;
pub const DEFAULT_IN_SELECTIVITY: f64 = 0.1;
pub const DEFAULT_BETWEEN_SELECTIVITY: f64 = 0.3;
pub const DEFAULT_LIKE_SELECTIVITY: f64 = 0.25;

pub struct CardinalityEstimator<'a> {
    pub stats: &'a StatisticsStore,
    pub feedback: &'a FeedbackStore,
}

impl<'a> CardinalityEstimator<'a> {
    pub fn new(stats: &'a StatisticsStore, feedback: &'a FeedbackStore) -> Self {
        Self { stats, feedback }
    }

    pub fn table_rows(&self, table: &str) -> f64 {
        if let Some(rows) = self.feedback.table_size(table) {
            return rows;
        }
        self.stats.row_count(table).map(|r| r as f64).unwrap_or(1000.0)
    }

    /// Selectivity of a single atomic predicate against `table`.
    pub fn predicate_selectivity(&self, table: &str, pred: &Expr) -> f64 {
        let Expr::Predicate { column, op, values } = pred else {
            return 1.0;
        };
        if let Some(learned) = self.feedback.selectivity(table, column) {
            return learned;
        }
        let col_stats = self.stats.column_stats(table, column);
        match op {
            CmpOp::Eq => col_stats
                .as_ref()
                .filter(|c| c.ndv > 0)
                .map(|c| 1.0 / c.ndv as f64)
                .unwrap_or(DEFAULT_EQ_SELECTIVITY),
            CmpOp::Ne => {
                let eq = col_stats
                    .as_ref()
                    .filter(|c| c.ndv > 0)
                    .map(|c| 1.0 / c.ndv as f64)
                    .unwrap_or(DEFAULT_EQ_SELECTIVITY);
                1.0 - eq
            }
            CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => col_stats
                .as_ref()
                .and_then(|c| match (c.min, c.max, values.first().and_then(|v| v.as_f64())) {
                    (Some(min), Some(max), Some(target)) if max > min => {
                        let frac = ((target - min) / (max - min)).clamp(0.0, 1.0);
                        Some(match op {
                            CmpOp::Lt | CmpOp::Le => frac,
                            CmpOp::Gt | CmpOp::Ge => 1.0 - frac,
                            _ => unreachable!(),
                        })
                    }
                    _ => None,
                })
                .unwrap_or(DEFAULT_RANGE_SELECTIVITY),
            CmpOp::In => {
                let k = values.len().max(1) as f64;
                col_stats
                    .as_ref()
                    .filter(|c| c.ndv > 0)
                    .map(|c| (k / c.ndv as f64).min(1.0))
                    .unwrap_or(DEFAULT_IN_SELECTIVITY)
            }
            CmpOp::Between => {
                if values.len() == 2 {
                    if let (Some(ref c), Some(lo), Some(hi)) = (
                        col_stats.as_ref(),
                        values[0].as_f64(),
                        values[1].as_f64(),
                    ) {
                        if let (Some(min), Some(max)) = (c.min, c.max) {
                            if max > min {
                                let lo_sel = ((lo - min) / (max - min)).clamp(0.0, 1.0);
                                let hi_sel = ((hi - min) / (max - min)).clamp(0.0, 1.0);
                                return (hi_sel - lo_sel).abs().max(0.0);
                            }
                        }
                    }
                }
                DEFAULT_BETWEEN_SELECTIVITY
            }
            CmpOp::Like => DEFAULT_LIKE_SELECTIVITY,
        }
    }

    /// AND combines multiplicatively; OR combines additively, capped at
    /// 0.95 (§4.6).
    pub fn combine_and(selectivities: &[f64]) -> f64 {
        selectivities.iter().product()
    }

    pub fn combine_or(selectivities: &[f64]) -> f64 {
        selectivities.iter().sum::<f64>().min(0.95)
    }

    pub fn join_cardinality(
        &self,
        join_type: JoinType,
        left_table: &str,
        right_table: &str,
        left_rows: f64,
        right_rows: f64,
    ) -> f64 {
        if let Some(factor) = self.feedback.join_factor(left_table, right_table) {
            return (left_rows * factor).max(0.0);
        }
        match join_type {
            JoinType::Inner => left_rows.min(right_rows),
            JoinType::Left => left_rows,
            JoinType::Right => right_rows,
            JoinType::Full => left_rows + right_rows / 2.0,
        }
    }

    /// DISTINCT over columns: `min(ndv(cols))`, default `rows/2`.
    pub fn distinct_cardinality(&self, table: &str, columns: &[String], rows: f64) -> f64 {
        let min_ndv = columns
            .iter()
            .filter_map(|c| self.stats.column_stats(table, c))
            .map(|c| c.ndv as f64)
            .filter(|n| *n > 0.0)
            .fold(None, |acc: Option<f64>, n| Some(acc.map_or(n, |a| a.min(n))));
        min_ndv.unwrap_or(rows / 2.0)
    }
}

/// Cost functions (§4.5): `cost(scan)=rows`, `cost(filter)=input_rows`,
/// `cost(hash_join)=build_rows+probe_rows+output_rows`,
/// `cost(agg)=input_rows+groups*log(groups)`.
pub fn cost_scan(rows: f64) -> f64 {
    rows
}

pub fn cost_filter(input_rows: f64) -> f64 {
    input_rows
}

pub fn cost_hash_join(build_rows: f64, probe_rows: f64, output_rows: f64) -> f64 {
    build_rows + probe_rows + output_rows
}

pub fn cost_aggregate(input_rows: f64, groups: f64) -> f64 {
    if groups <= 1.0 {
        input_rows
    } else {
        input_rows + groups * groups.log2()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn eq_selectivity_falls_back_without_stats() {
        let stats = StatisticsStore::new();
        let feedback = FeedbackStore::new();
        let est = CardinalityEstimator::new(&stats, &feedback);
        let pred = Expr::Predicate {
            column: "k".into(),
            op: CmpOp::Eq,
            values: vec![Value::Int(7)],
        };
        assert_eq!(est.predicate_selectivity("t", &pred), DEFAULT_EQ_SELECTIVITY);
    }

    #[test]
    fn feedback_overrides_default_selectivity() {
        let stats = StatisticsStore::new();
        let feedback = FeedbackStore::new();
        feedback.observe_filter("t", "k", 0.42);
        let est = CardinalityEstimator::new(&stats, &feedback);
        let pred = Expr::Predicate {
            column: "k".into(),
            op: CmpOp::Eq,
            values: vec![Value::Int(7)],
        };
        assert_eq!(est.predicate_selectivity("t", &pred), 0.42);
    }

    #[test]
    fn or_caps_at_0_95() {
        assert_eq!(CardinalityEstimator::combine_or(&[0.6, 0.6]), 0.95);
    }
}
