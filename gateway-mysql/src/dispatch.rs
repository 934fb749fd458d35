//! Command dispatch (C4): the per-connection loop that turns a parsed
//! [`Command`] into wire bytes. Grounded on the teacher's
//! `MySQLProtocol::handle_command` match-on-command-byte shape, rebuilt
//! around real execution against `gateway_core` instead of mock rows.

use crate::codec::write_lenenc_int;
use crate::error::{ProtoError, Result};
use crate::parser::{self, Statement};
use crate::protocol::packets::{ColumnDefinition, Command, EOFPacket, ERRPacket, OKPacket, TextRow};
use crate::session::Session;
use bytes::BytesMut;
use gateway_core::datasource::{Filter, FilterOp, QueryOptions};
use gateway_core::exec::{build_operator, collect_all};
use gateway_core::plan::{lower_direct, physical, CmpOp, Expr, LogicalPlan};
use gateway_core::{ColumnDef, Value};
use tracing::{debug, warn};

/// `false` tells the caller to close the connection (`COM_QUIT`).
pub async fn dispatch(session: &mut Session, command: Command, out: &mut BytesMut) -> Result<bool> {
    session.begin_command();
    match command {
        Command::Quit => return Ok(false),
        Command::Ping => write_ok(session, out, 0, String::new()),
        Command::InitDb { schema } => {
            session.current_db = Some(schema);
            write_ok(session, out, 0, String::new());
        }
        Command::Query { sql } => {
            if let Err(e) = run_query(session, &sql, out).await {
                warn!(error = %e, "query failed");
                write_err(session, out, &e);
            }
        }
        Command::FieldList { table } => write_field_list(session, out, &table),
        Command::Statistics => {
            let info = format!(
                "Uptime: 0  Threads: 1  Questions: 0  Slow queries: 0  Tables: {}",
                session.catalog.list_tables().len()
            );
            // The statistics response is a framed packet carrying a bare
            // string, not the usual OK/ERR/result-set header byte (§9: the
            // source disagreed with itself on this across two versions;
            // resolved here in favor of "framed packet with length prefix").
            write_framed(session, out, info.as_bytes());
            return Ok(true);
        }
        Command::ProcessKill { connection_id } => {
            debug!(connection_id, "process kill requested");
            write_ok(session, out, 0, String::new());
        }
        Command::SetOption { .. } => write_ok(session, out, 0, String::new()),
        Command::Sleep | Command::Refresh | Command::Shutdown | Command::Debug => write_ok(session, out, 0, String::new()),
        Command::Unknown { byte } => {
            write_err(session, out, &ProtoError::Protocol(format!("unsupported command byte {byte:#x}")));
        }
    }
    Ok(true)
}

fn write_ok(session: &mut Session, out: &mut BytesMut, affected_rows: u64, info: String) {
    let mut payload = BytesMut::new();
    OKPacket {
        affected_rows,
        last_insert_id: 0,
        status_flags: 0x0002,
        warnings: 0,
        info,
    }
    .write(&mut payload);
    write_framed(session, out, &payload);
}

fn write_err(session: &mut Session, out: &mut BytesMut, err: &ProtoError) {
    let (code, state, message) = err.to_mysql_error();
    let mut payload = BytesMut::new();
    ERRPacket {
        error_code: code,
        sql_state: state.to_string(),
        error_message: message,
    }
    .write(&mut payload);
    write_framed(session, out, &payload);
}

fn write_framed(session: &mut Session, out: &mut BytesMut, payload: &[u8]) {
    let mut seq = session.seq.next();
    crate::protocol::write_packet(payload, &mut seq, out);
    // write_packet may have incremented seq further (continuation
    // packets); hand the cursor back whatever it landed on.
    session.seq.observe(seq.wrapping_sub(1));
}

fn write_field_list(session: &mut Session, out: &mut BytesMut, table: &str) {
    for col in session.catalog.table_schema(table) {
        let mut payload = BytesMut::new();
        ColumnDefinition::from_descriptor(&col).write(&mut payload);
        write_framed(session, out, &payload);
    }
    let mut eof = BytesMut::new();
    EOFPacket {
        warnings: 0,
        status_flags: 0x0002,
    }
    .write(&mut eof);
    write_framed(session, out, &eof);
}

async fn run_query(session: &mut Session, sql: &str, out: &mut BytesMut) -> Result<()> {
    let statement = parser::parse(sql)?;
    match statement {
        Statement::Select(plan) => run_select(session, plan, out).await,
        Statement::Insert { table, columns, rows } => run_insert(session, &table, columns, rows, out).await,
        Statement::Update {
            table,
            assignments,
            filter,
        } => run_update(session, &table, assignments, filter, out).await,
        Statement::Delete { table, filter } => run_delete(session, &table, filter, out).await,
        Statement::CreateTable { table, columns } => run_create_table(session, &table, columns, out).await,
        Statement::DropTable { table } => run_drop_table(session, &table, out).await,
        Statement::TruncateTable { table } => run_truncate_table(session, &table, out).await,
        // Statements the gateway accepts syntactically but has no
        // semantics for yet (`SET`, `SHOW`, ...): answer with a bare OK
        // rather than refusing the session over something like a client
        // handshake variable setting.
        Statement::Passthrough => {
            write_ok(session, out, 0, String::new());
            Ok(())
        }
    }
}

async fn run_select(session: &mut Session, plan: LogicalPlan, out: &mut BytesMut) -> Result<()> {
    let (optimized_schema, rows) = {
        let catalog = &session.catalog;
        let optimized = gateway_core::optimizer::optimize(&plan, &catalog.stats, &catalog.feedback);
        let mut physical_plan = lower_direct(&optimized);
        physical::annotate(&mut physical_plan, catalog.table_schema_resolver());
        let schema = physical_plan.node(physical_plan.root).schema.clone();
        let mut operator = build_operator(&physical_plan, catalog.source_resolver());
        let rows = collect_all(operator.as_mut()).await.map_err(ProtoError::Core)?;
        (schema, rows)
    };

    let deprecate_eof = session.deprecates_eof();

    let mut header = BytesMut::new();
    write_lenenc_int(&mut header, optimized_schema.len() as u64);
    write_framed(session, out, &header);

    for col in &optimized_schema {
        let mut payload = BytesMut::new();
        ColumnDefinition::from_descriptor(col).write(&mut payload);
        write_framed(session, out, &payload);
    }
    if !deprecate_eof {
        let mut eof = BytesMut::new();
        EOFPacket {
            warnings: 0,
            status_flags: 0x0002,
        }
        .write(&mut eof);
        write_framed(session, out, &eof);
    }
    for row in &rows {
        let mut payload = BytesMut::new();
        TextRow {
            values: row.iter().map(|v| v.as_text()).collect(),
        }
        .write(&mut payload);
        write_framed(session, out, &payload);
    }

    let mut tail = BytesMut::new();
    if deprecate_eof {
        OKPacket {
            affected_rows: 0,
            last_insert_id: 0,
            status_flags: 0x0002,
            warnings: 0,
            info: String::new(),
        }
        .write(&mut tail);
    } else {
        EOFPacket {
            warnings: 0,
            status_flags: 0x0002,
        }
        .write(&mut tail);
    }
    write_framed(session, out, &tail);
    Ok(())
}

async fn run_insert(
    session: &mut Session,
    table: &str,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    out: &mut BytesMut,
) -> Result<()> {
    let source = session.catalog.resolve(table).map_err(ProtoError::Core)?;
    let table_columns = session.catalog.columns_of(table);
    let full_rows = align_insert_rows(&table_columns, &columns, rows)?;
    let n = source.insert(table, full_rows).await.map_err(ProtoError::Core)?;
    write_ok(session, out, n as u64, String::new());
    Ok(())
}

fn align_insert_rows(table_columns: &[ColumnDef], columns: &[String], rows: Vec<Vec<Value>>) -> Result<Vec<Vec<Value>>> {
    if columns.is_empty() {
        return Ok(rows);
    }
    rows.into_iter()
        .map(|row| {
            if row.len() != columns.len() {
                return Err(ProtoError::Semantic("column count doesn't match value count".into()));
            }
            let mut full = vec![Value::Null; table_columns.len()];
            for (col_name, value) in columns.iter().zip(row.into_iter()) {
                let idx = table_columns
                    .iter()
                    .position(|c| &c.name == col_name)
                    .ok_or_else(|| ProtoError::Semantic(format!("unknown column {col_name}")))?;
                full[idx] = value;
            }
            Ok(full)
        })
        .collect()
}

/// Translates a WHERE conjunction into the `datasource::Filter` list
/// `DataSource::query`/`update`/`delete` expect. Only AND-chains of plain
/// comparisons (plus the handful of `Not(...)` shapes the DML parser
/// itself produces) are supported — `OR` inside an UPDATE/DELETE WHERE
/// clause has no faithful single-pass translation into this filter model
/// and is rejected rather than silently mistranslated (see DESIGN.md).
fn translate_dml_filters(conjuncts: &[Expr]) -> Result<Vec<Filter>> {
    conjuncts.iter().map(translate_dml_filter).collect()
}

fn translate_dml_filter(expr: &Expr) -> Result<Filter> {
    match expr {
        Expr::Predicate { column, op, values } => Ok(Filter {
            field: column.clone(),
            operator: cmp_to_filter_op(*op),
            value: values.clone(),
            logic_op: None,
            sub_filters: vec![],
        }),
        Expr::Not(inner) => negate_filter(inner),
        Expr::Logic { .. } => Err(ProtoError::Syntax(
            "OR is not supported in UPDATE/DELETE WHERE clauses".into(),
        )),
        Expr::Column(_) | Expr::Literal(_) => Err(ProtoError::Syntax("expected a predicate".into())),
    }
}

fn negate_filter(expr: &Expr) -> Result<Filter> {
    let Expr::Predicate { column, op, values } = expr else {
        return Err(ProtoError::Syntax("unsupported NOT expression in WHERE clause".into()));
    };
    let negated = match op {
        CmpOp::Eq => FilterOp::Ne,
        CmpOp::Ne => FilterOp::Eq,
        CmpOp::Lt => FilterOp::Ge,
        CmpOp::Le => FilterOp::Gt,
        CmpOp::Gt => FilterOp::Le,
        CmpOp::Ge => FilterOp::Lt,
        CmpOp::In | CmpOp::Between | CmpOp::Like => {
            return Err(ProtoError::Syntax(
                "NOT IN/BETWEEN/LIKE is not supported in UPDATE/DELETE WHERE clauses".into(),
            ))
        }
    };
    Ok(Filter {
        field: column.clone(),
        operator: negated,
        value: values.clone(),
        logic_op: None,
        sub_filters: vec![],
    })
}

fn cmp_to_filter_op(op: CmpOp) -> FilterOp {
    match op {
        CmpOp::Eq => FilterOp::Eq,
        CmpOp::Ne => FilterOp::Ne,
        CmpOp::Lt => FilterOp::Lt,
        CmpOp::Le => FilterOp::Le,
        CmpOp::Gt => FilterOp::Gt,
        CmpOp::Ge => FilterOp::Ge,
        CmpOp::In => FilterOp::In,
        CmpOp::Between => FilterOp::Between,
        CmpOp::Like => FilterOp::Like,
    }
}

fn row_identity_filters(table_columns: &[ColumnDef], row: &[Value]) -> Vec<Filter> {
    table_columns
        .iter()
        .zip(row.iter())
        .map(|(col, val)| Filter {
            field: col.name.clone(),
            operator: FilterOp::Eq,
            value: vec![val.clone()],
            logic_op: None,
            sub_filters: vec![],
        })
        .collect()
}

/// `DataSource::update` replaces a matched row wholesale (confirmed
/// against `datasource::memory::MemorySource::update`), so a `SET col =
/// val` against a subset of columns has to read the current row first,
/// overlay the assignments, and write the merged row back — one
/// `update()` call per matched row, targeted by an exact-value filter on
/// every column so a single `update()` call can't fan out onto rows the
/// read didn't select.
async fn run_update(
    session: &mut Session,
    table: &str,
    assignments: Vec<(String, Value)>,
    filter: Vec<Expr>,
    out: &mut BytesMut,
) -> Result<()> {
    let source = session.catalog.resolve(table).map_err(ProtoError::Core)?;
    let table_columns = session.catalog.columns_of(table);
    if table_columns.is_empty() {
        return Err(ProtoError::Semantic(format!("unknown table {table}")));
    }
    let filters = translate_dml_filters(&filter)?;

    let existing = source
        .query(table, &QueryOptions { filters, ..Default::default() })
        .await
        .map_err(ProtoError::Core)?;

    let mut affected = 0usize;
    for row in &existing.rows {
        let mut merged = row.clone();
        for (col_name, value) in &assignments {
            let idx = table_columns
                .iter()
                .position(|c| &c.name == col_name)
                .ok_or_else(|| ProtoError::Semantic(format!("unknown column {col_name}")))?;
            merged[idx] = value.clone();
        }
        let identity = row_identity_filters(&table_columns, row);
        affected += source.update(table, &identity, merged).await.map_err(ProtoError::Core)?;
    }

    write_ok(session, out, affected as u64, String::new());
    Ok(())
}

async fn run_delete(session: &mut Session, table: &str, filter: Vec<Expr>, out: &mut BytesMut) -> Result<()> {
    let source = session.catalog.resolve(table).map_err(ProtoError::Core)?;
    let filters = translate_dml_filters(&filter)?;
    let n = source.delete(table, &filters).await.map_err(ProtoError::Core)?;
    write_ok(session, out, n as u64, String::new());
    Ok(())
}

async fn run_create_table(session: &mut Session, table: &str, columns: Vec<ColumnDef>, out: &mut BytesMut) -> Result<()> {
    let source = session
        .catalog
        .default_source()
        .ok_or_else(|| ProtoError::Runtime("no default data source configured".into()))?;
    source.create_table(table, columns.clone()).await.map_err(ProtoError::Core)?;
    session.catalog.register_table(table, source, columns);
    write_ok(session, out, 0, String::new());
    Ok(())
}

async fn run_drop_table(session: &mut Session, table: &str, out: &mut BytesMut) -> Result<()> {
    let source = session.catalog.resolve(table).map_err(ProtoError::Core)?;
    source.drop_table(table).await.map_err(ProtoError::Core)?;
    write_ok(session, out, 0, String::new());
    Ok(())
}

async fn run_truncate_table(session: &mut Session, table: &str, out: &mut BytesMut) -> Result<()> {
    let source = session.catalog.resolve(table).map_err(ProtoError::Core)?;
    source.truncate_table(table).await.map_err(ProtoError::Core)?;
    write_ok(session, out, 0, String::new());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::datasource::MemorySource;
    use gateway_core::Catalog;
    use std::sync::Arc;

    fn new_session() -> Session {
        let catalog = Arc::new(Catalog::new());
        catalog.set_default_source(Arc::new(MemorySource::new()));
        Session::new("root".into(), None, 0, 45, catalog)
    }

    #[tokio::test]
    async fn ping_writes_a_single_framed_ok_packet() {
        let mut session = new_session();
        let mut out = BytesMut::new();
        let keep_going = dispatch(&mut session, Command::Ping, &mut out).await.unwrap();
        assert!(keep_going);
        assert_eq!(&out[0..4], &[1, 0, 0, 0]); // 1-byte OK payload, seq 0
        assert_eq!(out[4], 0x00);
    }

    #[tokio::test]
    async fn quit_returns_false_and_writes_nothing() {
        let mut session = new_session();
        let mut out = BytesMut::new();
        let keep_going = dispatch(&mut session, Command::Quit, &mut out).await.unwrap();
        assert!(!keep_going);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn statistics_response_is_length_prefixed_not_bare() {
        let mut session = new_session();
        let mut out = BytesMut::new();
        dispatch(&mut session, Command::Statistics, &mut out).await.unwrap();
        let len = (out[0] as usize) | ((out[1] as usize) << 8) | ((out[2] as usize) << 16);
        assert_eq!(len, out.len() - 4);
        assert!(out[4..].starts_with(b"Uptime:"));
    }

    #[tokio::test]
    async fn create_insert_select_update_delete_round_trip() {
        let mut session = new_session();
        let mut out = BytesMut::new();

        dispatch(
            &mut session,
            Command::Query {
                sql: "CREATE TABLE users (id INT, name VARCHAR(32))".into(),
            },
            &mut out,
        )
        .await
        .unwrap();
        assert_eq!(out[4], 0x00); // OK

        out.clear();
        dispatch(
            &mut session,
            Command::Query {
                sql: "INSERT INTO users (id, name) VALUES (1, 'a'), (2, 'b')".into(),
            },
            &mut out,
        )
        .await
        .unwrap();
        assert_eq!(out[4], 0x00);
        assert_eq!(out[5], 2); // affected_rows lenenc 2

        out.clear();
        dispatch(
            &mut session,
            Command::Query {
                sql: "UPDATE users SET name = 'z' WHERE id = 1".into(),
            },
            &mut out,
        )
        .await
        .unwrap();
        assert_eq!(out[4], 0x00);
        assert_eq!(out[5], 1);

        out.clear();
        dispatch(
            &mut session,
            Command::Query {
                sql: "SELECT id, name FROM users ORDER BY id".into(),
            },
            &mut out,
        )
        .await
        .unwrap();
        assert_eq!(out[4], 2); // two columns

        out.clear();
        dispatch(
            &mut session,
            Command::Query {
                sql: "DELETE FROM users WHERE id = 2".into(),
            },
            &mut out,
        )
        .await
        .unwrap();
        assert_eq!(out[4], 0x00);
        assert_eq!(out[5], 1);
    }

    #[tokio::test]
    async fn update_with_or_in_where_is_rejected() {
        let mut session = new_session();
        let mut out = BytesMut::new();
        dispatch(
            &mut session,
            Command::Query {
                sql: "CREATE TABLE t (id INT)".into(),
            },
            &mut out,
        )
        .await
        .unwrap();

        out.clear();
        dispatch(
            &mut session,
            Command::Query {
                sql: "UPDATE t SET id = 1 WHERE id = 1 OR id = 2".into(),
            },
            &mut out,
        )
        .await
        .unwrap();
        // Rejected WHERE clause surfaces as an ERR packet, not a crash.
        assert_eq!(out[4], 0xff);
    }
}
