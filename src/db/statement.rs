//! Statement preparation: named placeholder rewriting and guard rails.
//!
//! Callers may write `:name` placeholders; they are rewritten to Postgres
//! positional `$n` parameters before the statement reaches the driver.
//! Postgres casts (`::text`) and quoted literals are left untouched.

use regex::RegexSet;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::LazyLock;
use uuid::Uuid;

use super::DbError;

static FORBIDDEN_PATTERNS: LazyLock<Option<RegexSet>> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\b(ALTER|CREATE|DROP|RENAME|TRUNCATE)\b",
        r"(?i)\b(GRANT|REVOKE)\b",
        r"(?i)\b(INSERT|UPDATE|DELETE)\b.+?\b(pg_catalog|information_schema)\.",
        r";\s*$",
        r"(?i)\bUNION\s+ALL\b|\bSELECT\s+\*",
        r"(?i)\b(pg_read_file|pg_read_binary_file|pg_ls_dir|lo_import|lo_export)\b",
        r"(?i)\b(pg_sleep|SLEEP|BENCHMARK)\s*\(",
    ])
    .ok()
});

/// A single bound value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum Param {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Uuid(Uuid),
    Null,
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Uuid> for Param {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

/// Statement parameters, either positional (`$1`) or named (`:email`).
#[derive(Debug, Clone, Default)]
pub struct Params {
    positional: Vec<Param>,
    named: HashMap<String, Param>,
}

impl Params {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional parameter.
    #[must_use]
    pub fn push(mut self, value: impl Into<Param>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Bind a named parameter.
    #[must_use]
    pub fn bind(mut self, name: &str, value: impl Into<Param>) -> Self {
        self.named.insert(name.to_string(), value.into());
        self
    }
}

/// A statement ready for the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Prepared {
    pub sql: String,
    pub params: Vec<Param>,
    pub returns_rows: bool,
    pub is_select: bool,
}

/// Rewrite placeholders, order parameters and reject dangerous statements.
///
/// # Errors
/// Returns `DbError::InvalidParameters` for empty statements, missing named
/// parameters or mixed parameter styles, and `DbError::Rejected` when the
/// statement matches a forbidden pattern.
pub fn prepare(sql: &str, params: Params) -> Result<Prepared, DbError> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(DbError::InvalidParameters("empty query".to_string()));
    }

    let (rewritten, names) = rewrite_named(trimmed);

    let ordered = if names.is_empty() {
        params.positional
    } else {
        if !params.positional.is_empty() {
            return Err(DbError::InvalidParameters(
                "cannot mix named and positional parameters".to_string(),
            ));
        }
        let mut ordered = Vec::with_capacity(names.len());
        for name in &names {
            let value = params
                .named
                .get(name)
                .ok_or_else(|| DbError::InvalidParameters(format!("missing parameter: {name}")))?;
            ordered.push(value.clone());
        }
        ordered
    };

    let forbidden = FORBIDDEN_PATTERNS
        .as_ref()
        .ok_or_else(|| DbError::InvalidParameters("statement guard unavailable".to_string()))?;
    if forbidden.is_match(&rewritten) {
        return Err(DbError::Rejected);
    }

    let upper = rewritten.to_ascii_uppercase();
    let is_select = upper.starts_with("SELECT");
    let returns_rows = is_select || upper.contains("RETURNING");

    Ok(Prepared {
        sql: rewritten,
        params: ordered,
        returns_rows,
        is_select,
    })
}

/// Replace `:name` placeholders with `$n`, returning the distinct names in
/// positional order. A name used twice maps to the same position.
fn rewrite_named(sql: &str) -> (String, Vec<String>) {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut names: Vec<String> = Vec::new();
    let mut in_literal = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            in_literal = !in_literal;
            out.push(c);
            i += 1;
            continue;
        }
        if in_literal || c != ':' {
            out.push(c);
            i += 1;
            continue;
        }
        // `::` is a cast
        if chars.get(i + 1) == Some(&':') {
            out.push_str("::");
            i += 2;
            continue;
        }
        let starts_ident = chars
            .get(i + 1)
            .is_some_and(|next| next.is_ascii_alphabetic() || *next == '_');
        if !starts_ident {
            out.push(c);
            i += 1;
            continue;
        }

        let mut end = i + 1;
        while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
            end += 1;
        }
        let name: String = chars[i + 1..end].iter().collect();
        let position = match names.iter().position(|existing| *existing == name) {
            Some(index) => index + 1,
            None => {
                names.push(name);
                names.len()
            }
        };
        out.push('$');
        out.push_str(&position.to_string());
        i = end;
    }

    (out, names)
}
