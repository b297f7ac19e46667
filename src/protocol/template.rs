//! Template files (`ptf`)
//!
//! A template mirrors a model input file line for line. Each estimated value is
//! replaced by a substitution field `@name   @` spanning exactly the columns the
//! value occupied, so the optimizer can write a new value into the same
//! columns without disturbing the rest of the file.

use std::collections::HashMap;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use super::{
    format_number, parse_number, validate_names, ProtocolError, MARKER, MAX_PARAMETER_NAME,
};

#[allow(clippy::expect_used)]
static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S+").expect("token pattern is a valid literal"));

/// Columns of one substitution field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSite {
    pub parameter: String,
    /// 0-based line of the source file.
    pub line: usize,
    /// 0-based byte column where the field starts.
    pub start: usize,
    /// Field width in columns, markers included.
    pub width: usize,
}

impl TemplateSite {
    pub fn new(parameter: impl Into<String>, line: usize, start: usize, width: usize) -> Self {
        Self {
            parameter: parameter.into(),
            line,
            start,
            width,
        }
    }

    /// Site covering the `field`-th whitespace-delimited token of `line`,
    /// which must be a number. The field width is the token's width.
    pub fn from_token(
        source: &str,
        parameter: impl Into<String>,
        line: usize,
        field: usize,
    ) -> Result<Self, ProtocolError> {
        let parameter = parameter.into();
        let invalid = |reason: String| ProtocolError::InvalidSite {
            parameter: parameter.clone(),
            reason,
        };
        let text = source
            .lines()
            .nth(line)
            .ok_or_else(|| invalid(format!("source has no line {line}")))?;
        let token = TOKEN_RE
            .find_iter(text)
            .nth(field)
            .ok_or_else(|| invalid(format!("line {line} has no field {field}")))?;
        if parse_number(token.as_str()).is_none() {
            return Err(invalid(format!("'{}' is not a number", token.as_str())));
        }
        Ok(Self {
            start: token.start(),
            width: token.len(),
            line,
            parameter,
        })
    }

    fn end(&self) -> usize {
        self.start + self.width
    }
}

/// Build a template from `source`, one substitution field per site.
///
/// The output starts with the `ptf @` header line. Fails with
/// `FieldWidthExceeded` when `@name@` does not fit in a site's width.
pub fn render_template(source: &str, sites: &[TemplateSite]) -> Result<String, ProtocolError> {
    for site in sites {
        let required = site.parameter.len() + 2;
        if required > site.width {
            return Err(ProtocolError::FieldWidthExceeded {
                name: site.parameter.clone(),
                width: site.width,
                required,
            });
        }
    }
    validate_names(
        "parameter",
        sites.iter().map(|s| s.parameter.as_str()),
        MAX_PARAMETER_NAME,
    )?;
    if source.contains(MARKER) {
        return Err(ProtocolError::MarkerInText("template source".to_string()));
    }

    let mut lines: Vec<String> = source.lines().map(str::to_string).collect();
    let mut ordered: Vec<&TemplateSite> = sites.iter().collect();
    ordered.sort_by_key(|s| (s.line, s.start));

    let mut previous: Option<&TemplateSite> = None;
    for site in ordered {
        let invalid = |reason: String| ProtocolError::InvalidSite {
            parameter: site.parameter.clone(),
            reason,
        };
        if let Some(prev) = previous {
            if prev.line == site.line && prev.end() > site.start {
                return Err(invalid(format!("overlaps field of '{}'", prev.parameter)));
            }
        }
        let text = lines
            .get_mut(site.line)
            .ok_or_else(|| invalid(format!("source has no line {}", site.line)))?;
        let original = text
            .get(site.start..site.end())
            .ok_or_else(|| invalid(format!("columns {}..{} out of range", site.start, site.end())))?;
        if parse_number(original).is_none() {
            return Err(invalid(format!("'{}' is not a number", original.trim())));
        }

        let field = format!(
            "{MARKER}{:<inner$}{MARKER}",
            site.parameter,
            inner = site.width - 2
        );
        text.replace_range(site.start..site.end(), &field);
        previous = Some(site);
    }

    let mut out = format!("ptf {MARKER}\n");
    for line in &lines {
        out.push_str(line);
        out.push('\n');
    }
    Ok(out)
}

/// Substitute `values` into a template, producing the model input file.
///
/// Each value is written right-aligned with as much precision as its field
/// allows. Parameter names match ignoring case.
pub fn apply_template(
    template: &str,
    values: &IndexMap<String, f64>,
) -> Result<String, ProtocolError> {
    let mut lines = template.lines();
    let header = lines.next().unwrap_or_default();
    let marker = parse_header(header, "ptf")?;

    let lookup: HashMap<String, f64> = values
        .iter()
        .map(|(name, v)| (name.to_lowercase(), *v))
        .collect();

    let mut out = String::with_capacity(template.len());
    for (index, line) in lines.enumerate() {
        let positions: Vec<usize> = line.match_indices(marker).map(|(i, _)| i).collect();
        if positions.len() % 2 != 0 {
            return Err(ProtocolError::Parse {
                line: index + 2,
                message: "unmatched marker".to_string(),
            });
        }

        let mut cursor = 0;
        for pair in positions.chunks(2) {
            let (open, close) = (pair[0], pair[1]);
            let width = close + marker.len_utf8() - open;
            let name = line[open + marker.len_utf8()..close].trim();
            let value = lookup
                .get(&name.to_lowercase())
                .copied()
                .ok_or_else(|| ProtocolError::UnknownParameter(name.to_string()))?;
            let formatted =
                format_number(value, width).ok_or_else(|| ProtocolError::FieldWidthExceeded {
                    name: name.to_string(),
                    width,
                    required: value.to_string().len(),
                })?;
            out.push_str(&line[cursor..open]);
            out.push_str(&format!("{formatted:>width$}"));
            cursor = close + marker.len_utf8();
        }
        out.push_str(&line[cursor..]);
        out.push('\n');
    }
    Ok(out)
}

/// Marker character declared by a `ptf @` / `pif @` header.
pub(crate) fn parse_header(header: &str, keyword: &str) -> Result<char, ProtocolError> {
    let mut parts = header.split_whitespace();
    let bad = || ProtocolError::Parse {
        line: 1,
        message: format!("expected '{keyword} <marker>' header, found '{header}'"),
    };
    if !parts.next().is_some_and(|k| k.eq_ignore_ascii_case(keyword)) {
        return Err(bad());
    }
    let marker = parts.next().ok_or_else(bad)?;
    let mut chars = marker.chars();
    match (chars.next(), chars.next(), parts.next()) {
        (Some(c), None, None) => Ok(c),
        _ => Err(bad()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "# k values\nzone1   1.5   2.25\nzone2   10.000000   3\n";

    #[test]
    fn test_from_token_measures_numeric_field() {
        let site = TemplateSite::from_token(SOURCE, "kz2", 2, 1).unwrap();
        assert_eq!(site.start, 8);
        assert_eq!(site.width, 9);
        assert!(TemplateSite::from_token(SOURCE, "kz", 1, 0).is_err());
        assert!(TemplateSite::from_token(SOURCE, "kz", 9, 0).is_err());
    }

    #[test]
    fn test_render_replaces_exact_columns() {
        let site = TemplateSite::from_token(SOURCE, "kz2", 2, 1).unwrap();
        let tpl = render_template(SOURCE, &[site]).unwrap();
        let lines: Vec<&str> = tpl.lines().collect();
        assert_eq!(lines[0], "ptf @");
        assert_eq!(lines[1], "# k values");
        assert_eq!(lines[2], "zone1   1.5   2.25");
        assert_eq!(lines[3], "zone2   @kz2    @   3");
        assert_eq!(lines[3].len(), "zone2   10.000000   3".len());
    }

    #[test]
    fn test_name_longer_than_field_fails() {
        let site = TemplateSite::from_token(SOURCE, "hk0101", 1, 1).unwrap();
        assert_eq!(site.width, 3);
        assert!(matches!(
            render_template(SOURCE, &[site]),
            Err(ProtocolError::FieldWidthExceeded {
                width: 3,
                required: 8,
                ..
            })
        ));
    }

    #[test]
    fn test_width_checked_before_name_rules() {
        // Too long for the optimizer and for the field: the field width wins
        let site = TemplateSite::new("hk_north_zone_01", 1, 8, 3);
        assert!(matches!(
            render_template(SOURCE, &[site]),
            Err(ProtocolError::FieldWidthExceeded {
                width: 3,
                required: 18,
                ..
            })
        ));

        // Wide enough field, name still over the limit
        let site = TemplateSite::new("hk_north_zone_01", 2, 0, 20);
        assert!(matches!(
            render_template(SOURCE, &[site]),
            Err(ProtocolError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let a = TemplateSite::from_token(SOURCE, "k", 2, 1).unwrap();
        let b = TemplateSite::from_token(SOURCE, "K", 2, 2).unwrap();
        assert!(matches!(
            render_template(SOURCE, &[a, b]),
            Err(ProtocolError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_overlapping_sites_rejected() {
        let a = TemplateSite::new("ka", 2, 8, 9);
        let b = TemplateSite::new("kb", 2, 12, 6);
        assert!(matches!(
            render_template(SOURCE, &[a, b]),
            Err(ProtocolError::InvalidSite { .. })
        ));
    }

    #[test]
    fn test_apply_restores_layout() {
        let site = TemplateSite::from_token(SOURCE, "kz2", 2, 1).unwrap();
        let tpl = render_template(SOURCE, &[site]).unwrap();
        let mut values = IndexMap::new();
        values.insert("KZ2".to_string(), 0.125);
        let filled = apply_template(&tpl, &values).unwrap();
        assert_eq!(filled, "# k values\nzone1   1.5   2.25\nzone2       0.125   3\n");
    }

    #[test]
    fn test_apply_unknown_parameter() {
        let tpl = "ptf @\nx @missing @\n";
        assert!(matches!(
            apply_template(tpl, &IndexMap::new()),
            Err(ProtocolError::UnknownParameter(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_apply_rejects_bad_header_and_unmatched_marker() {
        assert!(matches!(
            apply_template("ptf\nx\n", &IndexMap::new()),
            Err(ProtocolError::Parse { line: 1, .. })
        ));
        assert!(matches!(
            apply_template("ptf @\n@open\n", &IndexMap::new()),
            Err(ProtocolError::Parse { line: 2, .. })
        ));
    }
}
