use crate::value::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Between,
    Like,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicOp {
    And,
    Or,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    Column(String),
    Literal(Value),
    /// An atomic predicate: `column op value(s)`. `values` holds >1 entry
    /// for IN/BETWEEN.
    Predicate {
        column: String,
        op: CmpOp,
        values: Vec<Value>,
    },
    Logic {
        op: LogicOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
}

impl Expr {
    /// Columns referenced, for projection pushdown and index-candidate
    /// extraction.
    pub fn referenced_columns(&self, out: &mut Vec<String>) {
        match self {
            Expr::Column(c) => out.push(c.clone()),
            Expr::Literal(_) => {}
            Expr::Predicate { column, .. } => out.push(column.clone()),
            Expr::Logic { left, right, .. } => {
                left.referenced_columns(out);
                right.referenced_columns(out);
            }
            Expr::Not(e) => e.referenced_columns(out),
        }
    }

    /// Splits a conjunction into its atomic conjuncts (predicate pushdown
    /// works conjunct-by-conjunct).
    pub fn conjuncts(self) -> Vec<Expr> {
        match self {
            Expr::Logic {
                op: LogicOp::And,
                left,
                right,
            } => {
                let mut out = left.conjuncts();
                out.extend(right.conjuncts());
                out
            }
            other => vec![other],
        }
    }

    /// Constant folding: literal-literal comparisons collapse to a
    /// boolean literal; everything else passes through unchanged.
    pub fn fold_constants(self) -> Expr {
        match self {
            Expr::Logic { op, left, right } => {
                let left = left.fold_constants();
                let right = right.fold_constants();
                if let (Expr::Literal(Value::Bool(l)), Expr::Literal(Value::Bool(r))) =
                    (&left, &right)
                {
                    let v = match op {
                        LogicOp::And => *l && *r,
                        LogicOp::Or => *l || *r,
                    };
                    return Expr::Literal(Value::Bool(v));
                }
                Expr::Logic {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
            Expr::Not(e) => {
                let e = e.fold_constants();
                if let Expr::Literal(Value::Bool(b)) = e {
                    return Expr::Literal(Value::Bool(!b));
                }
                Expr::Not(Box::new(e))
            }
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderKey {
    pub column: String,
    pub dir: SortDir,
}
