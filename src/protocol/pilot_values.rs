//! Pilot-value input file
//!
//! The model input file that the template mirrors, one fixed-width row per
//! pilot point:
//!
//! ```text
//! # id             row   col             x             y            value
//! hk0104              1     4      -150.000       360.000                5
//! ```
//!
//! Only the value column changes between optimizer iterations. Its columns
//! are fixed so a template site can address them directly.

use super::{format_number, parse_number, ProtocolError, TemplateSite, MAX_PARAMETER_NAME};

const ID_WIDTH: usize = MAX_PARAMETER_NAME;
const INDEX_WIDTH: usize = 5;
const COORD_WIDTH: usize = 13;

/// Width of the value field.
pub const VALUE_WIDTH: usize = 16;

/// 0-based column where the value field starts.
pub const VALUE_START: usize = ID_WIDTH + 1 + INDEX_WIDTH + 1 + INDEX_WIDTH + 1 + COORD_WIDTH + 1 + COORD_WIDTH + 1;

const HEADER: &str = "# id";

#[derive(Debug, Clone, PartialEq)]
pub struct PilotValueRow {
    pub id: String,
    pub row: usize,
    pub col: usize,
    pub x: f64,
    pub y: f64,
    pub value: f64,
}

fn header_line() -> String {
    format!(
        "{HEADER:<ID_WIDTH$} {:>INDEX_WIDTH$} {:>INDEX_WIDTH$} {:>COORD_WIDTH$} {:>COORD_WIDTH$} {:>VALUE_WIDTH$}",
        "row", "col", "x", "y", "value"
    )
}

/// Render the input file. Row `i` lands on line `i + 1`, after the header.
pub fn render_pilot_values(rows: &[PilotValueRow]) -> Result<String, ProtocolError> {
    let mut out = header_line();
    out.push('\n');
    for r in rows {
        let invalid = |reason: String| ProtocolError::InvalidRecord {
            name: r.id.clone(),
            reason,
        };
        if r.id.is_empty() || r.id.len() > ID_WIDTH || r.id.contains(char::is_whitespace) {
            return Err(invalid(format!(
                "id must be 1-{ID_WIDTH} characters without whitespace"
            )));
        }
        let prefix = format!(
            "{:<ID_WIDTH$} {:>INDEX_WIDTH$} {:>INDEX_WIDTH$} {:>COORD_WIDTH$.3} {:>COORD_WIDTH$.3} ",
            r.id, r.row, r.col, r.x, r.y
        );
        if prefix.len() != VALUE_START {
            return Err(invalid("row, column or coordinate too wide for its field".to_string()));
        }
        let value = format_number(r.value, VALUE_WIDTH)
            .ok_or_else(|| invalid(format!("value {} cannot be written", r.value)))?;
        out.push_str(&prefix);
        out.push_str(&format!("{value:>VALUE_WIDTH$}\n"));
    }
    Ok(out)
}

/// Template sites for the value column of a file rendered from `rows`.
pub fn template_sites(rows: &[PilotValueRow]) -> Vec<TemplateSite> {
    rows.iter()
        .enumerate()
        .map(|(i, r)| TemplateSite::new(r.id.clone(), i + 1, VALUE_START, VALUE_WIDTH))
        .collect()
}

/// Parse a pilot-value file; whitespace-delimited, `#` lines are comments.
pub fn parse_pilot_values(text: &str) -> Result<Vec<PilotValueRow>, ProtocolError> {
    let mut rows = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let bad = |message: String| ProtocolError::Parse {
            line: index + 1,
            message,
        };
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        let [id, row, col, x, y, value] = fields.as_slice() else {
            return Err(bad(format!("expected 6 fields, found {}", fields.len())));
        };
        let index_field = |s: &str| {
            s.parse::<usize>()
                .map_err(|_| bad(format!("'{s}' is not a cell index")))
        };
        let real = |s: &str| parse_number(s).ok_or_else(|| bad(format!("'{s}' is not a number")));
        rows.push(PilotValueRow {
            id: (*id).to_string(),
            row: index_field(*row)?,
            col: index_field(*col)?,
            x: real(*x)?,
            y: real(*y)?,
            value: real(*value)?,
        });
    }
    Ok(rows)
}
