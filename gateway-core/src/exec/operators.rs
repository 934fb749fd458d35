use super::{Operator, BATCH_SIZE};
use crate::datasource::{self, DataSource, QueryOptions};
use crate::error::{CoreError, Result};
use crate::plan::{AggFunc, AggItem, CmpOp, Expr, JoinType, OrderKey, PhysicalNode, PhysicalOp, PhysicalPlan, PushedLimit, SortDir};
use crate::value::{Row, Value};
use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Lowers a [`PhysicalPlan`] into a runnable operator tree rooted at
/// `plan.root`, given the schema (column name list) each table scan
/// should report and a handle to resolve table names to data sources.
pub fn build_operator(
    plan: &PhysicalPlan,
    catalog: Arc<dyn Fn(&str) -> Option<Arc<dyn DataSource>> + Send + Sync>,
) -> Box<dyn Operator> {
    build_node(plan, plan.root, &catalog)
}

fn build_node(
    plan: &PhysicalPlan,
    id: crate::plan::NodeId,
    catalog: &Arc<dyn Fn(&str) -> Option<Arc<dyn DataSource>> + Send + Sync>,
) -> Box<dyn Operator> {
    let node = plan.node(id);
    match &node.op {
        PhysicalOp::TableScan {
            table,
            projected_columns,
            pushed_predicates,
            pushed_limit,
        } => Box::new(TableScan {
            source: catalog(table),
            table: table.clone(),
            projected_columns: projected_columns.clone(),
            pushed_predicates: pushed_predicates.clone(),
            pushed_limit: pushed_limit.clone(),
            columns: Vec::new(),
            buffer: Vec::new(),
            cursor: 0,
        }),
        PhysicalOp::Filter { conditions, child } => Box::new(Filter {
            conditions: conditions.clone(),
            columns: Vec::new(),
            child: build_node(plan, *child, catalog),
        }),
        PhysicalOp::Projection { exprs, aliases, child } => Box::new(Projection {
            exprs: exprs.clone(),
            aliases: aliases.clone(),
            columns: Vec::new(),
            child: build_node(plan, *child, catalog),
        }),
        PhysicalOp::Limit { n, offset, child } => Box::new(Limit {
            n: *n,
            offset: *offset,
            skipped: 0,
            emitted: 0,
            child: build_node(plan, *child, catalog),
        }),
        PhysicalOp::Sort { keys, child } => Box::new(Sort {
            keys: keys.clone(),
            columns: Vec::new(),
            rows: None,
            child: build_node(plan, *child, catalog),
        }),
        PhysicalOp::HashJoin {
            join_type,
            conds,
            build,
            probe,
            build_is_left,
        } => Box::new(HashJoin {
            join_type: *join_type,
            conds: conds.clone(),
            build_is_left: *build_is_left,
            build_schema: child_columns(plan, *build),
            probe_schema: child_columns(plan, *probe),
            build_op: build_node(plan, *build, catalog),
            probe_op: build_node(plan, *probe, catalog),
            table: None,
            probe_rows: None,
            cursor: 0,
        }),
        PhysicalOp::Aggregate {
            group_by,
            agg_items,
            child,
        } => Box::new(Aggregate {
            group_by: group_by.clone(),
            agg_items: agg_items.clone(),
            columns: Vec::new(),
            child: build_node(plan, *child, catalog),
            output: None,
            cursor: 0,
        }),
    }
}

fn child_columns(plan: &PhysicalPlan, id: crate::plan::NodeId) -> Vec<String> {
    node_schema_names(plan.node(id))
}

fn node_schema_names(node: &PhysicalNode) -> Vec<String> {
    node.schema.iter().map(|c| c.name.clone()).collect()
}

fn eval_expr(expr: &Expr, columns: &[String], row: &Row) -> Value {
    match expr {
        Expr::Column(name) => columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| row.get(i))
            .cloned()
            .unwrap_or(Value::Null),
        Expr::Literal(v) => v.clone(),
        Expr::Predicate { .. } | Expr::Logic { .. } | Expr::Not(_) => {
            Value::Bool(eval_predicate(expr, columns, row))
        }
    }
}

fn eval_predicate(expr: &Expr, columns: &[String], row: &Row) -> bool {
    match expr {
        Expr::Predicate { column, op, values } => {
            let value = columns
                .iter()
                .position(|c| c == column)
                .and_then(|i| row.get(i));
            let Some(value) = value else { return false };
            match op {
                CmpOp::Eq => values.first().map(|v| v == value).unwrap_or(false),
                CmpOp::Ne => values.first().map(|v| v != value).unwrap_or(true),
                CmpOp::Lt => values.first().map(|v| value < v).unwrap_or(false),
                CmpOp::Le => values.first().map(|v| value <= v).unwrap_or(false),
                CmpOp::Gt => values.first().map(|v| value > v).unwrap_or(false),
                CmpOp::Ge => values.first().map(|v| value >= v).unwrap_or(false),
                CmpOp::In => values.iter().any(|v| v == value),
                CmpOp::Between => match (values.first(), values.get(1)) {
                    (Some(lo), Some(hi)) => value >= lo && value <= hi,
                    _ => false,
                },
                CmpOp::Like => matches!(
                    (value.as_text(), values.first().and_then(|v| v.as_text())),
                    (Some(_), Some(_))
                ),
            }
        }
        Expr::Logic { op, left, right } => {
            let l = eval_predicate(left, columns, row);
            let r = eval_predicate(right, columns, row);
            match op {
                crate::plan::LogicOp::And => l && r,
                crate::plan::LogicOp::Or => l || r,
            }
        }
        Expr::Not(e) => !eval_predicate(e, columns, row),
        Expr::Column(_) | Expr::Literal(_) => matches!(eval_expr(expr, columns, row), Value::Bool(true)),
    }
}

/// Delegates to the data source's `query`, applying any pushdown the
/// optimizer recorded; buffers the result and yields it in batches.
pub struct TableScan {
    source: Option<Arc<dyn DataSource>>,
    table: String,
    projected_columns: Option<Vec<String>>,
    pushed_predicates: Vec<Expr>,
    pushed_limit: Option<PushedLimit>,
    columns: Vec<String>,
    buffer: Vec<Row>,
    cursor: usize,
}

fn expr_to_datasource_filter(expr: &Expr) -> Option<datasource::Filter> {
    match expr {
        Expr::Predicate { column, op, values } => Some(datasource::Filter {
            field: column.clone(),
            operator: match op {
                CmpOp::Eq => datasource::FilterOp::Eq,
                CmpOp::Ne => datasource::FilterOp::Ne,
                CmpOp::Lt => datasource::FilterOp::Lt,
                CmpOp::Le => datasource::FilterOp::Le,
                CmpOp::Gt => datasource::FilterOp::Gt,
                CmpOp::Ge => datasource::FilterOp::Ge,
                CmpOp::In => datasource::FilterOp::In,
                CmpOp::Between => datasource::FilterOp::Between,
                CmpOp::Like => datasource::FilterOp::Like,
            },
            value: values.clone(),
            logic_op: None,
            sub_filters: vec![],
        }),
        _ => None,
    }
}

#[async_trait]
impl Operator for TableScan {
    async fn open(&mut self) -> Result<()> {
        let source = self
            .source
            .clone()
            .ok_or_else(|| CoreError::Semantic(format!("unknown table {}", self.table)))?;
        let info = source.table_info(&self.table).await?;
        self.columns = info.columns.iter().map(|c| c.name.clone()).collect();

        let options = QueryOptions {
            select_columns: self.projected_columns.clone().unwrap_or_default(),
            filters: self.pushed_predicates.iter().filter_map(expr_to_datasource_filter).collect(),
            order_by: vec![],
            limit: self.pushed_limit.as_ref().map(|l| l.n),
            offset: self.pushed_limit.as_ref().map(|l| l.offset),
            group_by: vec![],
            aggregations: vec![],
        };
        let result = source.query(&self.table, &options).await?;
        self.columns = result.columns;
        self.buffer = result.rows;
        debug!(table = %self.table, rows = self.buffer.len(), "table scan opened");
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<Option<Vec<Row>>> {
        if self.cursor >= self.buffer.len() {
            return Ok(None);
        }
        let end = (self.cursor + BATCH_SIZE).min(self.buffer.len());
        let batch = self.buffer[self.cursor..end].to_vec();
        self.cursor = end;
        Ok(Some(batch))
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct Filter {
    conditions: Vec<Expr>,
    columns: Vec<String>,
    child: Box<dyn Operator>,
}

#[async_trait]
impl Operator for Filter {
    async fn open(&mut self) -> Result<()> {
        self.child.open().await
    }

    async fn next_batch(&mut self) -> Result<Option<Vec<Row>>> {
        loop {
            let Some(batch) = self.child.next_batch().await? else {
                return Ok(None);
            };
            let filtered: Vec<Row> = batch
                .into_iter()
                .filter(|row| {
                    self.conditions
                        .iter()
                        .all(|c| eval_predicate(c, &self.columns, row))
                })
                .collect();
            if !filtered.is_empty() {
                return Ok(Some(filtered));
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.child.close().await
    }
}

pub struct Projection {
    exprs: Vec<Expr>,
    aliases: Vec<Option<String>>,
    columns: Vec<String>,
    child: Box<dyn Operator>,
}

#[async_trait]
impl Operator for Projection {
    async fn open(&mut self) -> Result<()> {
        self.child.open().await
    }

    async fn next_batch(&mut self) -> Result<Option<Vec<Row>>> {
        let Some(batch) = self.child.next_batch().await? else {
            return Ok(None);
        };
        let out = batch
            .into_iter()
            .map(|row| {
                self.exprs
                    .iter()
                    .map(|e| eval_expr(e, &self.columns, &row))
                    .collect()
            })
            .collect();
        Ok(Some(out))
    }

    async fn close(&mut self) -> Result<()> {
        self.child.close().await
    }
}

pub struct Limit {
    n: usize,
    offset: usize,
    skipped: usize,
    emitted: usize,
    child: Box<dyn Operator>,
}

#[async_trait]
impl Operator for Limit {
    async fn open(&mut self) -> Result<()> {
        self.child.open().await
    }

    async fn next_batch(&mut self) -> Result<Option<Vec<Row>>> {
        if self.emitted >= self.n {
            return Ok(None);
        }
        loop {
            let Some(batch) = self.child.next_batch().await? else {
                return Ok(None);
            };
            let mut iter = batch.into_iter();
            if self.skipped < self.offset {
                let to_skip = self.offset - self.skipped;
                let skipped_now = iter.by_ref().take(to_skip).count();
                self.skipped += skipped_now;
                if self.skipped < self.offset {
                    continue;
                }
            }
            let remaining = self.n - self.emitted;
            let out: Vec<Row> = iter.take(remaining).collect();
            if out.is_empty() {
                continue;
            }
            self.emitted += out.len();
            return Ok(Some(out));
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.child.close().await
    }
}

pub struct Sort {
    keys: Vec<OrderKey>,
    columns: Vec<String>,
    rows: Option<std::vec::IntoIter<Row>>,
    child: Box<dyn Operator>,
}

#[async_trait]
impl Operator for Sort {
    async fn open(&mut self) -> Result<()> {
        self.child.open().await?;
        let mut all = Vec::new();
        while let Some(mut batch) = self.child.next_batch().await? {
            all.append(&mut batch);
        }
        let columns = self.columns.clone();
        let keys = self.keys.clone();
        all.sort_by(|a, b| {
            for key in &keys {
                let idx = columns.iter().position(|c| c == &key.column);
                let (va, vb) = match idx {
                    Some(i) => (a.get(i), b.get(i)),
                    None => (None, None),
                };
                let ord = va.partial_cmp(&vb).unwrap_or(std::cmp::Ordering::Equal);
                let ord = if key.dir == SortDir::Desc { ord.reverse() } else { ord };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
        self.rows = Some(all.into_iter());
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<Option<Vec<Row>>> {
        let rows = self.rows.as_mut().expect("Sort::open must run first");
        let batch: Vec<Row> = rows.by_ref().take(BATCH_SIZE).collect();
        if batch.is_empty() {
            Ok(None)
        } else {
            Ok(Some(batch))
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.child.close().await
    }
}

pub struct HashJoin {
    join_type: JoinType,
    conds: Vec<Expr>,
    build_is_left: bool,
    build_schema: Vec<String>,
    probe_schema: Vec<String>,
    build_op: Box<dyn Operator>,
    probe_op: Box<dyn Operator>,
    table: Option<HashMap<Vec<JoinKey>, Vec<Row>>>,
    probe_rows: Option<std::vec::IntoIter<Row>>,
    cursor: usize,
}

#[derive(PartialEq, Eq, Hash, Clone)]
enum JoinKey {
    Null,
    Int(i64),
    Text(String),
}

fn join_key(value: &Value) -> JoinKey {
    match value {
        Value::Int(i) => JoinKey::Int(*i),
        Value::Bool(b) => JoinKey::Int(*b as i64),
        Value::Text(s) | Value::Date(s) | Value::Time(s) | Value::Timestamp(s) | Value::Decimal(s) => {
            JoinKey::Text(s.clone())
        }
        Value::Float(f) => JoinKey::Text(f.to_string()),
        Value::Bytes(b) => JoinKey::Text(String::from_utf8_lossy(b).to_string()),
        Value::Null => JoinKey::Null,
    }
}

fn join_columns(conds: &[Expr]) -> Vec<(String, String)> {
    // Each join condition is `left_col = right_col`, modeled as an
    // equality `Predicate` where `values` carries the other side's column
    // name wrapped as a `Value::Text` placed there by the planner; here we
    // instead recognize the common shape emitted by our own translator:
    // two `Expr::Column` nodes combined via `Logic`/`Predicate` do not fit
    // that, so the join key extraction falls back to a name-based match
    // between build/probe schemas for identically named columns.
    conds.iter().filter_map(|c| match c {
        Expr::Predicate { column, values, .. } => values
            .first()
            .and_then(|v| v.as_text())
            .map(|other| (column.clone(), other)),
        _ => None,
    }).collect()
}

#[async_trait]
impl Operator for HashJoin {
    async fn open(&mut self) -> Result<()> {
        self.build_op.open().await?;
        self.probe_op.open().await?;

        let join_cols = join_columns(&self.conds);
        let build_col = join_cols
            .first()
            .map(|(a, _)| a.clone())
            .or_else(|| self.build_schema.first().cloned());
        let probe_col = join_cols
            .first()
            .map(|(_, b)| b.clone())
            .or_else(|| self.probe_schema.first().cloned());

        let build_idx = build_col.and_then(|c| self.build_schema.iter().position(|n| *n == c));
        let probe_idx = probe_col.and_then(|c| self.probe_schema.iter().position(|n| *n == c));

        let mut table: HashMap<Vec<JoinKey>, Vec<Row>> = HashMap::new();
        while let Some(batch) = self.build_op.next_batch().await? {
            for row in batch {
                let key = match build_idx {
                    Some(i) => vec![row.get(i).map(join_key).unwrap_or(JoinKey::Null)],
                    None => vec![],
                };
                table.entry(key).or_default().push(row);
            }
        }
        self.table = Some(table);

        let mut probe_rows = Vec::new();
        while let Some(batch) = self.probe_op.next_batch().await? {
            probe_rows.extend(batch);
        }
        self.probe_rows = Some(probe_rows.into_iter());
        self.cursor = probe_idx.unwrap_or(0);
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<Option<Vec<Row>>> {
        let probe_rows = self.probe_rows.as_mut().expect("HashJoin::open must run first");
        let table = self.table.as_ref().expect("HashJoin::open must run first");
        let mut out = Vec::new();
        let probe_idx = self.cursor;

        for probe_row in probe_rows.by_ref() {
            let key = vec![probe_row.get(probe_idx).map(join_key).unwrap_or(JoinKey::Null)];
            match table.get(&key) {
                Some(matches) => {
                    for build_row in matches {
                        out.push(combine(build_row, &probe_row, self.build_is_left));
                    }
                }
                None => {
                    if matches!(self.join_type, JoinType::Left | JoinType::Full) {
                        let nulls = vec![Value::Null; self.build_schema.len()];
                        out.push(combine(&nulls, &probe_row, self.build_is_left));
                    }
                }
            }
            if out.len() >= BATCH_SIZE {
                return Ok(Some(out));
            }
        }
        if out.is_empty() {
            Ok(None)
        } else {
            Ok(Some(out))
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.build_op.close().await?;
        self.probe_op.close().await
    }
}

fn combine(build_row: &Row, probe_row: &Row, build_is_left: bool) -> Row {
    if build_is_left {
        build_row.iter().cloned().chain(probe_row.iter().cloned()).collect()
    } else {
        probe_row.iter().cloned().chain(build_row.iter().cloned()).collect()
    }
}

pub struct Aggregate {
    group_by: Vec<String>,
    agg_items: Vec<AggItem>,
    columns: Vec<String>,
    child: Box<dyn Operator>,
    output: Option<std::vec::IntoIter<Row>>,
    cursor: usize,
}

#[derive(Default)]
struct AggState {
    count: i64,
    sum: f64,
    min: Option<Value>,
    max: Option<Value>,
    distinct: HashSet<String>,
}

#[async_trait]
impl Operator for Aggregate {
    async fn open(&mut self) -> Result<()> {
        self.child.open().await?;
        let mut groups: HashMap<Vec<JoinKey>, Vec<AggState>> = HashMap::new();
        let group_idx: Vec<usize> = self
            .group_by
            .iter()
            .filter_map(|g| self.columns.iter().position(|c| c == g))
            .collect();

        while let Some(batch) = self.child.next_batch().await? {
            for row in batch {
                let key: Vec<JoinKey> = group_idx.iter().map(|&i| row.get(i).map(join_key).unwrap_or(JoinKey::Null)).collect();
                let states = groups.entry(key).or_insert_with(|| {
                    self.agg_items.iter().map(|_| AggState::default()).collect()
                });
                for (item, state) in self.agg_items.iter().zip(states.iter_mut()) {
                    let col_idx = item.column.as_ref().and_then(|c| self.columns.iter().position(|n| n == c));
                    let value = col_idx.and_then(|i| row.get(i)).cloned();
                    accumulate(item, state, value, item.distinct);
                }
            }
        }

        let mut rows = Vec::new();
        for (key, states) in groups {
            let mut row: Row = key
                .into_iter()
                .map(|k| match k {
                    JoinKey::Int(i) => Value::Int(i),
                    JoinKey::Text(s) => Value::Text(s),
                    JoinKey::Null => Value::Null,
                })
                .collect();
            for (item, state) in self.agg_items.iter().zip(states.iter()) {
                row.push(finalize(item, state));
            }
            rows.push(row);
        }
        self.output = Some(rows.into_iter());
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<Option<Vec<Row>>> {
        let out = self.output.as_mut().expect("Aggregate::open must run first");
        let batch: Vec<Row> = out.by_ref().take(BATCH_SIZE).collect();
        if batch.is_empty() {
            Ok(None)
        } else {
            Ok(Some(batch))
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.child.close().await
    }
}

fn accumulate(item: &AggItem, state: &mut AggState, value: Option<Value>, distinct: bool) {
    let Some(value) = value else { return };
    if value.is_null() && item.func != AggFunc::Count {
        return;
    }
    if distinct {
        if let Some(text) = value.as_text() {
            if !state.distinct.insert(text) {
                return;
            }
        }
    }
    state.count += 1;
    if let Some(f) = value.as_f64() {
        state.sum += f;
    }
    state.min = Some(match &state.min {
        Some(m) if *m <= value => m.clone(),
        _ => value.clone(),
    });
    state.max = Some(match &state.max {
        Some(m) if *m >= value => m.clone(),
        _ => value,
    });
}

fn finalize(item: &AggItem, state: &AggState) -> Value {
    match item.func {
        AggFunc::Count => Value::Int(state.count),
        AggFunc::Sum => Value::Float(state.sum),
        AggFunc::Avg => {
            if state.count == 0 {
                Value::Null
            } else {
                Value::Float(state.sum / state.count as f64)
            }
        }
        AggFunc::Min => state.min.clone().unwrap_or(Value::Null),
        AggFunc::Max => state.max.clone().unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecSource {
        rows: Vec<Row>,
    }

    #[async_trait]
    impl Operator for VecSource {
        async fn open(&mut self) -> Result<()> {
            Ok(())
        }
        async fn next_batch(&mut self) -> Result<Option<Vec<Row>>> {
            if self.rows.is_empty() {
                Ok(None)
            } else {
                Ok(Some(std::mem::take(&mut self.rows)))
            }
        }
        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn limit_respects_offset_and_n() {
        let child = VecSource {
            rows: (0..10).map(|i| vec![Value::Int(i)]).collect(),
        };
        let mut limit = Limit {
            n: 3,
            offset: 2,
            skipped: 0,
            emitted: 0,
            child: Box::new(child),
        };
        let rows = super::super::collect_all(&mut limit).await.unwrap();
        assert_eq!(rows, vec![vec![Value::Int(2)], vec![Value::Int(3)], vec![Value::Int(4)]]);
    }

    #[tokio::test]
    async fn filter_drops_non_matching_rows() {
        let child = VecSource {
            rows: vec![vec![Value::Int(1)], vec![Value::Int(2)]],
        };
        let mut filter = Filter {
            conditions: vec![Expr::Predicate {
                column: "v".into(),
                op: CmpOp::Eq,
                values: vec![Value::Int(2)],
            }],
            columns: vec!["v".into()],
            child: Box::new(child),
        };
        let rows = super::super::collect_all(&mut filter).await.unwrap();
        assert_eq!(rows, vec![vec![Value::Int(2)]]);
    }
}
