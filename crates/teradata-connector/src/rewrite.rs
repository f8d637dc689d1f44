//! SQL rewriting applied to every statement before it reaches the database.

use std::fmt;

/// Dialect rewrite hook. Implementations must be pure string transforms.
pub trait QueryRewriter: Send + Sync + fmt::Debug {
    fn rewrite(&self, sql: &str) -> String;
}

/// Leaves SQL untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityRewriter;

impl QueryRewriter for IdentityRewriter {
    fn rewrite(&self, sql: &str) -> String {
        sql.to_string()
    }
}

/// Turns `SELECT ... LIMIT n` into Teradata's `SELECT TOP n ...`.
///
/// Only a trailing `LIMIT <count>` on a plain top-level `SELECT` is handled.
/// `OFFSET`, `DISTINCT`, set operations, subqueries and statements that
/// already use `TOP` pass through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct TopNRewriter;

impl QueryRewriter for TopNRewriter {
    fn rewrite(&self, sql: &str) -> String {
        let trimmed = sql.trim_end().trim_end_matches(';').trim_end();
        let Some((head, count)) = split_trailing_limit(trimmed) else {
            return sql.to_string();
        };
        let Some(projection) = strip_keyword(head.trim_start(), "SELECT") else {
            return sql.to_string();
        };
        if strip_keyword(projection, "DISTINCT").is_some() || strip_keyword(projection, "TOP").is_some() {
            return sql.to_string();
        }
        if is_compound(projection) {
            return sql.to_string();
        }
        format!("SELECT TOP {} {}", count, projection)
    }
}

fn split_trailing_limit(sql: &str) -> Option<(&str, u64)> {
    let (head, count) = sql.rsplit_once(char::is_whitespace)?;
    let count: u64 = count.parse().ok()?;
    let (body, keyword) = head.trim_end().rsplit_once(char::is_whitespace)?;
    keyword
        .eq_ignore_ascii_case("LIMIT")
        .then(|| (body.trim_end(), count))
}

const SET_OPERATORS: [&str; 4] = ["UNION", "INTERSECT", "EXCEPT", "MINUS"];

/// True when `body` holds a top-level set operation or a nested query.
///
/// Quoted literals and identifiers are skipped.
fn is_compound(body: &str) -> bool {
    let mut depth = 0usize;
    let mut after_paren = false;
    let mut word = String::new();
    let mut chars = body.chars();

    while let Some(c) = chars.next() {
        if c.is_alphanumeric() || c == '_' {
            word.push(c);
            continue;
        }
        if !word.is_empty() {
            if after_paren && (word.eq_ignore_ascii_case("SELECT") || word.eq_ignore_ascii_case("WITH")) {
                return true;
            }
            if depth == 0 && SET_OPERATORS.iter().any(|op| word.eq_ignore_ascii_case(op)) {
                return true;
            }
            word.clear();
            after_paren = false;
        }
        match c {
            '\'' | '"' => {
                // A doubled quote inside the literal re-enters it on the next pass.
                for inner in chars.by_ref() {
                    if inner == c {
                        break;
                    }
                }
                after_paren = false;
            }
            '(' => {
                depth += 1;
                after_paren = true;
            }
            ')' => {
                depth = depth.saturating_sub(1);
                after_paren = false;
            }
            c if c.is_whitespace() => {}
            _ => after_paren = false,
        }
    }
    depth == 0 && SET_OPERATORS.iter().any(|op| word.eq_ignore_ascii_case(op))
}

/// Strip a leading keyword followed by whitespace, returning the rest.
fn strip_keyword<'a>(sql: &'a str, keyword: &str) -> Option<&'a str> {
    let prefix = sql.get(..keyword.len())?;
    let rest = &sql[keyword.len()..];
    (prefix.eq_ignore_ascii_case(keyword) && rest.starts_with(char::is_whitespace))
        .then(|| rest.trim_start())
}
