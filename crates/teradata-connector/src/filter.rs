//! Predicate pushdown: DataFusion filter expressions to SQL `WHERE` fragments.

use datafusion::logical_expr::expr::{Between, BinaryExpr, InList, Like};
use datafusion::logical_expr::{Expr, Operator};
use datafusion::scalar::ScalarValue;

#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    pub column: String,
    pub op: FilterOp,
    pub value: FilterValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Between,
    In,
    Like,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    String(String),
    Integer(i64),
    Number(f64),
    Range(Box<FilterValue>, Box<FilterValue>),
    List(Vec<FilterValue>),
}

fn sanitize_sql_string(s: &str) -> String {
    s.replace('\'', "''")
}

/// Wrap an identifier in `quote`, doubling any embedded quote. An empty
/// quote leaves the identifier bare.
pub fn quote_identifier(name: &str, quote: &str) -> String {
    if quote.is_empty() {
        return name.to_string();
    }
    format!("{}{}{}", quote, name.replace(quote, &quote.repeat(2)), quote)
}

impl FilterValue {
    fn to_sql_literal(&self) -> Option<String> {
        match self {
            FilterValue::String(v) => Some(format!("'{}'", sanitize_sql_string(v))),
            FilterValue::Integer(v) => Some(v.to_string()),
            FilterValue::Number(v) => Some(format_number(*v)),
            FilterValue::Range(..) | FilterValue::List(_) => None,
        }
    }

    fn from_scalar(value: &ScalarValue) -> Option<Self> {
        match value {
            ScalarValue::Utf8(Some(s))
            | ScalarValue::LargeUtf8(Some(s))
            | ScalarValue::Utf8View(Some(s)) => Some(FilterValue::String(s.clone())),
            ScalarValue::Int8(Some(v)) => Some(FilterValue::Integer(*v as i64)),
            ScalarValue::Int16(Some(v)) => Some(FilterValue::Integer(*v as i64)),
            ScalarValue::Int32(Some(v)) => Some(FilterValue::Integer(*v as i64)),
            ScalarValue::Int64(Some(v)) => Some(FilterValue::Integer(*v)),
            ScalarValue::UInt8(Some(v)) => Some(FilterValue::Integer(*v as i64)),
            ScalarValue::UInt16(Some(v)) => Some(FilterValue::Integer(*v as i64)),
            ScalarValue::UInt32(Some(v)) => Some(FilterValue::Integer(*v as i64)),
            ScalarValue::UInt64(Some(v)) => i64::try_from(*v).ok().map(FilterValue::Integer),
            ScalarValue::Float32(Some(v)) if v.is_finite() => Some(FilterValue::Number(*v as f64)),
            ScalarValue::Float64(Some(v)) if v.is_finite() => Some(FilterValue::Number(*v)),
            _ => None,
        }
    }
}

impl FilterCondition {
    pub fn new(column: impl Into<String>, op: FilterOp, value: FilterValue) -> Self {
        Self {
            column: column.into(),
            op,
            value,
        }
    }

    /// Convert a DataFusion filter into a condition, if it has a shape the
    /// remote database can evaluate: a single column compared to literals.
    pub fn from_expr(expr: &Expr) -> Option<Self> {
        match expr {
            Expr::BinaryExpr(BinaryExpr { left, op, right }) => {
                let op = comparison_op(op)?;
                match (left.as_ref(), right.as_ref()) {
                    (Expr::Column(col), Expr::Literal(lit)) => {
                        Some(Self::new(&col.name, op, FilterValue::from_scalar(lit)?))
                    }
                    (Expr::Literal(lit), Expr::Column(col)) => {
                        Some(Self::new(&col.name, flip(op), FilterValue::from_scalar(lit)?))
                    }
                    _ => None,
                }
            }
            Expr::Between(Between {
                expr,
                negated: false,
                low,
                high,
            }) => match (expr.as_ref(), low.as_ref(), high.as_ref()) {
                (Expr::Column(col), Expr::Literal(low), Expr::Literal(high)) => Some(Self::new(
                    &col.name,
                    FilterOp::Between,
                    FilterValue::Range(
                        Box::new(FilterValue::from_scalar(low)?),
                        Box::new(FilterValue::from_scalar(high)?),
                    ),
                )),
                _ => None,
            },
            Expr::InList(InList {
                expr,
                list,
                negated: false,
            }) => {
                let Expr::Column(col) = expr.as_ref() else {
                    return None;
                };
                if list.is_empty() {
                    return None;
                }
                let values = list
                    .iter()
                    .map(|item| match item {
                        Expr::Literal(lit) => FilterValue::from_scalar(lit),
                        _ => None,
                    })
                    .collect::<Option<Vec<_>>>()?;
                Some(Self::new(&col.name, FilterOp::In, FilterValue::List(values)))
            }
            Expr::Like(Like {
                negated: false,
                expr,
                pattern,
                escape_char: None,
                case_insensitive: false,
            }) => match (expr.as_ref(), pattern.as_ref()) {
                (Expr::Column(col), Expr::Literal(lit)) => match FilterValue::from_scalar(lit)? {
                    value @ FilterValue::String(_) => Some(Self::new(&col.name, FilterOp::Like, value)),
                    _ => None,
                },
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether the remote result is a superset of the rows the engine keeps.
    ///
    /// Teradata compares strings `NOT CASESPECIFIC` and ignores trailing
    /// blanks, so only equality, membership and `LIKE` are safe on strings.
    /// Inequality and ranges would drop rows the engine still wants.
    pub fn is_remote_superset(&self) -> bool {
        let has_string = match &self.value {
            FilterValue::String(_) => true,
            FilterValue::Range(low, high) => {
                matches!(**low, FilterValue::String(_)) || matches!(**high, FilterValue::String(_))
            }
            FilterValue::List(values) => values.iter().any(|v| matches!(v, FilterValue::String(_))),
            FilterValue::Integer(_) | FilterValue::Number(_) => false,
        };
        !has_string || matches!(self.op, FilterOp::Eq | FilterOp::In | FilterOp::Like)
    }

    /// Same condition against a different column name.
    pub fn with_column(&self, column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ..self.clone()
        }
    }

    /// Render as SQL. Returns `None` when the value does not fit the operator.
    pub fn to_sql_where(&self, quote: &str) -> Option<String> {
        let col = quote_identifier(&self.column, quote);
        match (&self.op, &self.value) {
            (FilterOp::Between, FilterValue::Range(low, high)) => Some(format!(
                "{} BETWEEN {} AND {}",
                col,
                low.to_sql_literal()?,
                high.to_sql_literal()?
            )),
            (FilterOp::In, FilterValue::List(values)) if !values.is_empty() => {
                let list = values
                    .iter()
                    .map(FilterValue::to_sql_literal)
                    .collect::<Option<Vec<_>>>()?
                    .join(", ");
                Some(format!("{} IN ({})", col, list))
            }
            (FilterOp::Like, FilterValue::String(v)) => {
                Some(format!("{} LIKE '{}'", col, sanitize_sql_string(v)))
            }
            (FilterOp::Between | FilterOp::In | FilterOp::Like, _) => None,
            (op, value) => {
                let symbol = match op {
                    FilterOp::Eq => "=",
                    FilterOp::Neq => "<>",
                    FilterOp::Gt => ">",
                    FilterOp::Gte => ">=",
                    FilterOp::Lt => "<",
                    FilterOp::Lte => "<=",
                    FilterOp::Between | FilterOp::In | FilterOp::Like => return None,
                };
                Some(format!("{} {} {}", col, symbol, value.to_sql_literal()?))
            }
        }
    }
}

fn comparison_op(op: &Operator) -> Option<FilterOp> {
    match op {
        Operator::Eq => Some(FilterOp::Eq),
        Operator::NotEq => Some(FilterOp::Neq),
        Operator::Gt => Some(FilterOp::Gt),
        Operator::GtEq => Some(FilterOp::Gte),
        Operator::Lt => Some(FilterOp::Lt),
        Operator::LtEq => Some(FilterOp::Lte),
        _ => None,
    }
}

/// `5 < col` is `col > 5`.
fn flip(op: FilterOp) -> FilterOp {
    match op {
        FilterOp::Gt => FilterOp::Lt,
        FilterOp::Gte => FilterOp::Lte,
        FilterOp::Lt => FilterOp::Gt,
        FilterOp::Lte => FilterOp::Gte,
        other => other,
    }
}

fn format_number(n: f64) -> String {
    if n == n.floor() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Join conditions into a ` WHERE ...` suffix. Conditions that cannot be
/// rendered are skipped; the engine still re-applies every filter.
pub fn build_where_clause(conditions: &[FilterCondition], quote: &str) -> String {
    let parts: Vec<String> = conditions
        .iter()
        .filter_map(|c| c.to_sql_where(quote))
        .collect();
    if parts.is_empty() {
        return String::new();
    }
    format!(" WHERE {}", parts.join(" AND "))
}
