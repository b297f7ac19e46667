//! Optimizer parameter-value files (`.par`)
//!
//! ```text
//! single point
//!   hk0104      7.75000000      1.00000000      0.00000000
//! ```
//!
//! One `name value scale offset` row per parameter, in control-file order.

use std::collections::HashSet;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use tracing::debug;

use super::{format_number, parse_number, ProtocolError};
use crate::types::ParameterRecord;

/// Optional first line: precision and decimal-point keywords.
#[allow(clippy::expect_used)]
static PRECISION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(single|double)\s+(point|nopoint)$").expect("precision pattern is a valid literal")
});

const NAME_WIDTH: usize = 12;
const NUMBER_WIDTH: usize = 16;

/// Reads parameter-value files against the control file's parameter order.
#[derive(Debug, Clone)]
pub struct ResultReader {
    names: Vec<String>,
}

impl ResultReader {
    pub fn new(parameters: &[ParameterRecord]) -> Self {
        Self::from_names(parameters.iter().map(|p| p.name.clone()))
    }

    pub fn from_names(names: impl IntoIterator<Item = String>) -> Self {
        Self {
            names: names.into_iter().collect(),
        }
    }

    /// Parse `text` into `name -> value` in control-file order, keyed by the
    /// names as the control file spells them.
    ///
    /// Fails with `ParameterCountMismatch` when the number of rows differs from
    /// the number of parameters, and `ParameterOrderMismatch` when a row names
    /// a known parameter out of order.
    pub fn read(&self, text: &str) -> Result<IndexMap<String, f64>, ProtocolError> {
        let mut rows: Vec<(String, f64)> = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || (rows.is_empty() && PRECISION_RE.is_match(trimmed)) {
                continue;
            }
            let bad = |message: String| ProtocolError::Parse {
                line: index + 1,
                message,
            };
            let mut fields = trimmed.split_whitespace();
            let (Some(name), Some(value)) = (fields.next(), fields.next()) else {
                return Err(bad(format!("expected 'name value', found '{trimmed}'")));
            };
            let value = parse_number(value).ok_or_else(|| bad(format!("'{value}' is not a number")))?;
            rows.push((name.to_string(), value));
        }

        if rows.len() != self.names.len() {
            return Err(ProtocolError::ParameterCountMismatch {
                expected: self.names.len(),
                found: rows.len(),
            });
        }

        let known: HashSet<String> = self.names.iter().map(|n| n.to_lowercase()).collect();
        let mut values = IndexMap::with_capacity(rows.len());
        for (index, ((found, value), expected)) in rows.into_iter().zip(&self.names).enumerate() {
            if !found.eq_ignore_ascii_case(expected) {
                if !known.contains(&found.to_lowercase()) {
                    return Err(ProtocolError::UnknownParameter(found));
                }
                return Err(ProtocolError::ParameterOrderMismatch {
                    index,
                    expected: expected.clone(),
                    found,
                });
            }
            values.insert(expected.clone(), value);
        }
        debug!(parameters = values.len(), "Parsed optimizer parameter values");
        Ok(values)
    }
}

/// Write a parameter-value file for `parameters` with `values` in the same
/// order, carrying each record's scale and offset.
pub fn render_results(parameters: &[ParameterRecord], values: &[f64]) -> Result<String, ProtocolError> {
    if parameters.len() != values.len() {
        return Err(ProtocolError::ParameterCountMismatch {
            expected: parameters.len(),
            found: values.len(),
        });
    }
    let number = |name: &str, v: f64| {
        format_number(v, NUMBER_WIDTH - 1).ok_or_else(|| ProtocolError::InvalidRecord {
            name: name.to_string(),
            reason: format!("{v} cannot be written"),
        })
    };
    let mut out = String::from("single point\n");
    for (p, &v) in parameters.iter().zip(values) {
        out.push_str(&format!(
            "{:>NAME_WIDTH$}{:>NUMBER_WIDTH$}{:>NUMBER_WIDTH$}{:>NUMBER_WIDTH$}\n",
            p.name,
            number(&p.name, v)?,
            number(&p.name, p.scale)?,
            number(&p.name, p.offset)?,
        ));
    }
    Ok(out)
}
