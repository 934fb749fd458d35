//! Hand-rolled statement scanner for INSERT/UPDATE/DELETE/CREATE
//! TABLE/DROP TABLE/TRUNCATE TABLE (see `parser.rs` module docs for why
//! these go around `sqlparser` rather than through it).

use super::Statement;
use crate::error::{ProtoError, Result};
use gateway_core::plan::{CmpOp, Expr, LogicOp};
use gateway_core::{ColumnDef, Value};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(String),
    Punct(char),
}

fn tokenize(sql: &str) -> Result<Vec<Token>> {
    let mut out = Vec::new();
    let chars: Vec<char> = sql.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '\'' || c == '"' {
            let quote = c;
            let mut s = String::new();
            i += 1;
            while i < chars.len() {
                if chars[i] == quote {
                    if i + 1 < chars.len() && chars[i + 1] == quote {
                        s.push(quote);
                        i += 2;
                        continue;
                    }
                    break;
                }
                s.push(chars[i]);
                i += 1;
            }
            if i >= chars.len() {
                return Err(ProtoError::Syntax("unterminated string literal".into()));
            }
            i += 1; // closing quote
            out.push(Token::Str(s));
            continue;
        }
        if c == '`' {
            let mut s = String::new();
            i += 1;
            while i < chars.len() && chars[i] != '`' {
                s.push(chars[i]);
                i += 1;
            }
            i += 1;
            out.push(Token::Ident(s));
            continue;
        }
        if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) {
            let start = i;
            i += 1;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            out.push(Token::Num(chars[start..i].iter().collect()));
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            out.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }
        if "(),.;=".contains(c) {
            out.push(Token::Punct(c));
            i += 1;
            continue;
        }
        if c == '!' || c == '<' || c == '>' {
            let mut op = String::from(c);
            i += 1;
            if i < chars.len() && chars[i] == '=' {
                op.push('=');
                i += 1;
            }
            out.push(Token::Ident(op));
            continue;
        }
        return Err(ProtoError::Syntax(format!("unexpected character '{c}'")));
    }
    Ok(out)
}

struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl Cursor {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect_punct(&mut self, c: char) -> Result<()> {
        match self.next() {
            Some(Token::Punct(p)) if p == c => Ok(()),
            other => Err(ProtoError::Syntax(format!("expected '{c}', found {other:?}"))),
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.next() {
            Some(Token::Ident(s)) => Ok(s),
            other => Err(ProtoError::Syntax(format!("expected identifier, found {other:?}"))),
        }
    }

    /// Matches a keyword case-insensitively without consuming on mismatch.
    fn eat_keyword(&mut self, kw: &str) -> bool {
        if let Some(Token::Ident(s)) = self.peek() {
            if s.eq_ignore_ascii_case(kw) {
                self.pos += 1;
                return true;
            }
        }
        false
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(ProtoError::Syntax(format!("expected keyword '{kw}'")))
        }
    }

}

fn parse_value(cur: &mut Cursor) -> Result<Value> {
    match cur.next() {
        Some(Token::Str(s)) => Ok(Value::Text(s)),
        Some(Token::Num(n)) => {
            if let Ok(i) = n.parse::<i64>() {
                Ok(Value::Int(i))
            } else {
                n.parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| ProtoError::Syntax(format!("invalid number: {n}")))
            }
        }
        Some(Token::Ident(s)) if s.eq_ignore_ascii_case("NULL") => Ok(Value::Null),
        Some(Token::Ident(s)) if s.eq_ignore_ascii_case("TRUE") => Ok(Value::Bool(true)),
        Some(Token::Ident(s)) if s.eq_ignore_ascii_case("FALSE") => Ok(Value::Bool(false)),
        other => Err(ProtoError::Syntax(format!("expected a literal value, found {other:?}"))),
    }
}

fn parse_column_list(cur: &mut Cursor) -> Result<Vec<String>> {
    cur.expect_punct('(')?;
    let mut cols = Vec::new();
    loop {
        cols.push(cur.expect_ident()?);
        match cur.next() {
            Some(Token::Punct(',')) => continue,
            Some(Token::Punct(')')) => break,
            other => return Err(ProtoError::Syntax(format!("expected ',' or ')', found {other:?}"))),
        }
    }
    Ok(cols)
}

fn parse_value_tuple(cur: &mut Cursor) -> Result<Vec<Value>> {
    cur.expect_punct('(')?;
    let mut values = Vec::new();
    loop {
        values.push(parse_value(cur)?);
        match cur.next() {
            Some(Token::Punct(',')) => continue,
            Some(Token::Punct(')')) => break,
            other => return Err(ProtoError::Syntax(format!("expected ',' or ')', found {other:?}"))),
        }
    }
    Ok(values)
}

pub fn parse_insert(sql: &str) -> Result<Statement> {
    let mut cur = Cursor::new(tokenize(sql)?);
    cur.expect_keyword("INSERT")?;
    cur.eat_keyword("IGNORE");
    cur.expect_keyword("INTO")?;
    let table = cur.expect_ident()?;

    let columns = if matches!(cur.peek(), Some(Token::Punct('('))) {
        parse_column_list(&mut cur)?
    } else {
        Vec::new()
    };

    cur.expect_keyword("VALUES")?;
    let mut rows = Vec::new();
    loop {
        rows.push(parse_value_tuple(&mut cur)?);
        if matches!(cur.peek(), Some(Token::Punct(','))) {
            cur.next();
            continue;
        }
        break;
    }

    Ok(Statement::Insert { table, columns, rows })
}

fn parse_where(cur: &mut Cursor) -> Result<Vec<Expr>> {
    if !cur.eat_keyword("WHERE") {
        return Ok(Vec::new());
    }
    let expr = parse_or_expr(cur)?;
    Ok(expr.conjuncts())
}

fn parse_or_expr(cur: &mut Cursor) -> Result<Expr> {
    let mut left = parse_and_expr(cur)?;
    while cur.eat_keyword("OR") {
        let right = parse_and_expr(cur)?;
        left = Expr::Logic {
            op: LogicOp::Or,
            left: Box::new(left),
            right: Box::new(right),
        };
    }
    Ok(left)
}

fn parse_and_expr(cur: &mut Cursor) -> Result<Expr> {
    let mut left = parse_condition(cur)?;
    while cur.eat_keyword("AND") {
        let right = parse_condition(cur)?;
        left = Expr::Logic {
            op: LogicOp::And,
            left: Box::new(left),
            right: Box::new(right),
        };
    }
    Ok(left)
}

fn parse_condition(cur: &mut Cursor) -> Result<Expr> {
    if matches!(cur.peek(), Some(Token::Punct('('))) {
        cur.next();
        let inner = parse_or_expr(cur)?;
        cur.expect_punct(')')?;
        return Ok(inner);
    }

    let column = cur.expect_ident()?;

    if cur.eat_keyword("IS") {
        let negated = cur.eat_keyword("NOT");
        cur.expect_keyword("NULL")?;
        let pred = Expr::Predicate {
            column,
            op: CmpOp::Eq,
            values: vec![Value::Null],
        };
        return Ok(if negated { Expr::Not(Box::new(pred)) } else { pred });
    }

    if cur.eat_keyword("BETWEEN") {
        let low = parse_value(cur)?;
        cur.expect_keyword("AND")?;
        let high = parse_value(cur)?;
        return Ok(Expr::Predicate {
            column,
            op: CmpOp::Between,
            values: vec![low, high],
        });
    }

    if cur.eat_keyword("NOT") {
        if cur.eat_keyword("IN") {
            let values = parse_value_tuple(cur)?;
            return Ok(Expr::Not(Box::new(Expr::Predicate {
                column,
                op: CmpOp::In,
                values,
            })));
        }
        if cur.eat_keyword("LIKE") {
            let value = parse_value(cur)?;
            return Ok(Expr::Not(Box::new(Expr::Predicate {
                column,
                op: CmpOp::Like,
                values: vec![value],
            })));
        }
        return Err(ProtoError::Syntax("expected IN or LIKE after NOT".into()));
    }

    if cur.eat_keyword("IN") {
        let values = parse_value_tuple(cur)?;
        return Ok(Expr::Predicate { column, op: CmpOp::In, values });
    }

    if cur.eat_keyword("LIKE") {
        let value = parse_value(cur)?;
        return Ok(Expr::Predicate {
            column,
            op: CmpOp::Like,
            values: vec![value],
        });
    }

    let op = match cur.next() {
        Some(Token::Punct('=')) => CmpOp::Eq,
        Some(Token::Ident(s)) if s == "!=" || s == "<>" => CmpOp::Ne,
        Some(Token::Ident(s)) if s == "<" => CmpOp::Lt,
        Some(Token::Ident(s)) if s == "<=" => CmpOp::Le,
        Some(Token::Ident(s)) if s == ">" => CmpOp::Gt,
        Some(Token::Ident(s)) if s == ">=" => CmpOp::Ge,
        other => return Err(ProtoError::Syntax(format!("expected comparison operator, found {other:?}"))),
    };
    let value = parse_value(cur)?;
    Ok(Expr::Predicate { column, op, values: vec![value] })
}

pub fn parse_update(sql: &str) -> Result<Statement> {
    let mut cur = Cursor::new(tokenize(sql)?);
    cur.expect_keyword("UPDATE")?;
    let table = cur.expect_ident()?;
    cur.expect_keyword("SET")?;

    let mut assignments = Vec::new();
    loop {
        let col = cur.expect_ident()?;
        cur.expect_punct('=')?;
        let val = parse_value(&mut cur)?;
        assignments.push((col, val));
        if matches!(cur.peek(), Some(Token::Punct(','))) {
            cur.next();
            continue;
        }
        break;
    }

    let filter = parse_where(&mut cur)?;
    Ok(Statement::Update { table, assignments, filter })
}

pub fn parse_delete(sql: &str) -> Result<Statement> {
    let mut cur = Cursor::new(tokenize(sql)?);
    cur.expect_keyword("DELETE")?;
    cur.expect_keyword("FROM")?;
    let table = cur.expect_ident()?;
    let filter = parse_where(&mut cur)?;
    Ok(Statement::Delete { table, filter })
}

/// Maps a SQL type name to the wire `mysql_type` byte (§3 ColumnDescriptor).
fn mysql_type_for(name: &str) -> u8 {
    match name.to_ascii_uppercase().as_str() {
        "TINYINT" => 0x01,
        "SMALLINT" => 0x02,
        "INT" | "INTEGER" => 0x03,
        "FLOAT" => 0x04,
        "DOUBLE" => 0x05,
        "TIMESTAMP" => 0x07,
        "BIGINT" => 0x08,
        "DATE" => 0x0a,
        "TIME" => 0x0b,
        "DATETIME" => 0x0c,
        "BLOB" => 0xfc,
        "VARCHAR" | "TEXT" | "CHAR" => 0xfd,
        "BOOLEAN" | "BOOL" => 0x01,
        "DECIMAL" => 0x00,
        _ => 0xfd, // unrecognized types default to VARCHAR's wire type
    }
}

pub fn parse_create_table(sql: &str) -> Result<Statement> {
    let mut cur = Cursor::new(tokenize(sql)?);
    cur.expect_keyword("CREATE")?;
    cur.expect_keyword("TABLE")?;
    cur.eat_keyword("IF") && cur.eat_keyword("NOT") && cur.eat_keyword("EXISTS");
    let table = cur.expect_ident()?;
    cur.expect_punct('(')?;

    let mut columns = Vec::new();
    loop {
        let name = cur.expect_ident()?;
        let type_name = cur.expect_ident()?;
        // Skip an optional type argument, e.g. VARCHAR(255).
        if matches!(cur.peek(), Some(Token::Punct('('))) {
            cur.next();
            while !matches!(cur.peek(), Some(Token::Punct(')')) | None) {
                cur.next();
            }
            cur.next();
        }
        let mut nullable = true;
        loop {
            if cur.eat_keyword("NOT") {
                cur.expect_keyword("NULL")?;
                nullable = false;
                continue;
            }
            if cur.eat_keyword("NULL") {
                nullable = true;
                continue;
            }
            if cur.eat_keyword("PRIMARY") {
                cur.expect_keyword("KEY")?;
                nullable = false;
                continue;
            }
            if cur.eat_keyword("UNIQUE") {
                continue;
            }
            break;
        }
        columns.push(ColumnDef {
            name,
            nullable,
            mysql_type: mysql_type_for(&type_name),
        });
        match cur.next() {
            Some(Token::Punct(',')) => continue,
            Some(Token::Punct(')')) => break,
            other => return Err(ProtoError::Syntax(format!("expected ',' or ')', found {other:?}"))),
        }
    }

    Ok(Statement::CreateTable { table, columns })
}

pub fn parse_drop_table(sql: &str) -> Result<Statement> {
    let mut cur = Cursor::new(tokenize(sql)?);
    cur.expect_keyword("DROP")?;
    cur.expect_keyword("TABLE")?;
    cur.eat_keyword("IF") && cur.eat_keyword("EXISTS");
    let table = cur.expect_ident()?;
    Ok(Statement::DropTable { table })
}

pub fn parse_truncate_table(sql: &str) -> Result<Statement> {
    let mut cur = Cursor::new(tokenize(sql)?);
    cur.expect_keyword("TRUNCATE")?;
    cur.eat_keyword("TABLE");
    let table = cur.expect_ident()?;
    Ok(Statement::TruncateTable { table })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_insert_with_explicit_columns_and_multiple_rows() {
        let stmt = parse_insert("INSERT INTO users (id, name) VALUES (1, 'a'), (2, 'b')").unwrap();
        match stmt {
            Statement::Insert { table, columns, rows } => {
                assert_eq!(table, "users");
                assert_eq!(columns, vec!["id", "name"]);
                assert_eq!(rows.len(), 2);
            }
            _ => panic!("expected Insert"),
        }
    }

    #[test]
    fn parses_update_with_multiple_assignments_and_where() {
        let stmt = parse_update("UPDATE users SET name = 'bob', age = 30 WHERE id = 1").unwrap();
        match stmt {
            Statement::Update { table, assignments, filter } => {
                assert_eq!(table, "users");
                assert_eq!(assignments.len(), 2);
                assert_eq!(filter.len(), 1);
            }
            _ => panic!("expected Update"),
        }
    }

    #[test]
    fn parses_delete_with_in_predicate() {
        let stmt = parse_delete("DELETE FROM users WHERE id IN (1, 2, 3)").unwrap();
        match stmt {
            Statement::Delete { table, filter } => {
                assert_eq!(table, "users");
                assert_eq!(filter.len(), 1);
            }
            _ => panic!("expected Delete"),
        }
    }

    #[test]
    fn parses_create_table_with_constraints() {
        let stmt = parse_create_table("CREATE TABLE users (id INT PRIMARY KEY, name VARCHAR(64) NOT NULL, bio TEXT)").unwrap();
        match stmt {
            Statement::CreateTable { table, columns } => {
                assert_eq!(table, "users");
                assert_eq!(columns.len(), 3);
                assert!(!columns[0].nullable);
                assert!(!columns[1].nullable);
                assert!(columns[2].nullable);
            }
            _ => panic!("expected CreateTable"),
        }
    }

    #[test]
    fn parses_drop_and_truncate() {
        assert!(matches!(parse_drop_table("DROP TABLE IF EXISTS users").unwrap(), Statement::DropTable { .. }));
        assert!(matches!(parse_truncate_table("TRUNCATE TABLE users").unwrap(), Statement::TruncateTable { .. }));
    }
}
