use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

const EMA_ALPHA: f64 = 0.3;

/// Process-wide execution-feedback state (§3, §4.6). Lifecycle: lazily
/// initialized on first use, never torn down for the life of the process —
/// but, unlike the teacher's module-level globals, this is an explicit
/// handle threaded through the optimization context rather than a global
/// singleton (see spec DESIGN NOTES).
#[derive(Clone)]
pub struct FeedbackStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    table_size: DashMap<String, f64>,
    column_selectivity: DashMap<(String, String), f64>,
    join_factor: DashMap<(String, String), f64>,
}

impl FeedbackStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::default()),
        }
    }

    fn ema(old: Option<f64>, observed: f64) -> f64 {
        match old {
            Some(old) => EMA_ALPHA.mul_add(observed, (1.0 - EMA_ALPHA) * old),
            None => observed,
        }
    }

    pub fn observe_table_size(&self, table: &str, observed_rows: f64) {
        let updated = {
            let old = self.inner.table_size.get(table).map(|v| *v);
            Self::ema(old, observed_rows)
        };
        self.inner.table_size.insert(table.to_string(), updated);
        debug!(table, updated, "feedback: table size EMA updated");
    }

    pub fn table_size(&self, table: &str) -> Option<f64> {
        self.inner.table_size.get(table).map(|v| *v)
    }

    pub fn observe_filter(&self, table: &str, column: &str, observed_selectivity: f64) {
        let key = (table.to_string(), column.to_string());
        let updated = {
            let old = self.inner.column_selectivity.get(&key).map(|v| *v);
            Self::ema(old, observed_selectivity)
        };
        self.inner.column_selectivity.insert(key, updated);
    }

    pub fn selectivity(&self, table: &str, column: &str) -> Option<f64> {
        self.inner
            .column_selectivity
            .get(&(table.to_string(), column.to_string()))
            .map(|v| *v)
    }

    pub fn observe_join(&self, left_table: &str, right_table: &str, observed_factor: f64) {
        let key = (left_table.to_string(), right_table.to_string());
        let updated = {
            let old = self.inner.join_factor.get(&key).map(|v| *v);
            Self::ema(old, observed_factor)
        };
        self.inner.join_factor.insert(key, updated);
    }

    pub fn join_factor(&self, left_table: &str, right_table: &str) -> Option<f64> {
        self.inner
            .join_factor
            .get(&(left_table.to_string(), right_table.to_string()))
            .map(|v| *v)
    }
}

impl Default for FeedbackStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ema_converges_as_spec_example() {
        let fb = FeedbackStore::new();
        // First sample overwrites.
        fb.observe_filter("t", "c", 0.1);
        assert_eq!(fb.selectivity("t", "c"), Some(0.1));
        // 0.7*0.1 + 0.3*0.1 = 0.1
        fb.observe_filter("t", "c", 0.1);
        assert!((fb.selectivity("t", "c").unwrap() - 0.1).abs() < 1e-9);
        // 0.7*0.1 + 0.3*0.05 = 0.085
        fb.observe_filter("t", "c", 0.05);
        assert!((fb.selectivity("t", "c").unwrap() - 0.085).abs() < 1e-9);
    }

    #[test]
    fn repeated_identical_observations_converge_geometrically() {
        // v_n = observed + 0.7^n * (first - observed); error shrinks by 0.7 each round.
        let fb = FeedbackStore::new();
        let first = 0.2;
        let observed = 0.9;
        fb.observe_filter("t", "c", first);
        for n in 1..12 {
            fb.observe_filter("t", "c", observed);
            let expected_err = 0.7f64.powi(n as i32) * (first - observed).abs();
            let current = fb.selectivity("t", "c").unwrap();
            assert!(
                (current - observed).abs() - expected_err < 1e-9,
                "n={n} current={current} expected_err={expected_err}"
            );
        }
    }

    proptest! {
        // §8 generalized: after n identical observations the error to
        // `observed` shrinks geometrically by `(1 - EMA_ALPHA)` per round
        // (see `repeated_identical_observations_converge_geometrically`
        // for the worked derivation), for arbitrary starting/observed
        // selectivities and arbitrary n.
        #[test]
        fn ema_error_shrinks_geometrically_for_arbitrary_values(
            first in 0.0f64..1.0,
            observed in 0.0f64..1.0,
            n in 1u32..20,
        ) {
            let fb = FeedbackStore::new();
            fb.observe_filter("t", "c", first);
            for _ in 0..n {
                fb.observe_filter("t", "c", observed);
            }
            let expected_err = (1.0 - EMA_ALPHA).powi(n as i32) * (first - observed).abs();
            let current = fb.selectivity("t", "c").unwrap();
            prop_assert!((current - observed).abs() - expected_err < 1e-9);
        }
    }
}
