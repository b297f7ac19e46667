//! Instruction files (`pif`)
//!
//! ```text
//! pif @
//! @HEADS OUTPUT FOR USE WITH PEST@
//! l1 [obs0101]13:28
//! l1 [obs0102]13:28
//! ```
//!
//! The primary marker anchors the reader on the header line of the model
//! output; each readout then advances `N` lines and reads a fixed column span
//! (1-based, inclusive) as one observation.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use tracing::debug;

use super::template::parse_header;
use super::{parse_number, validate_names, ProtocolError, MARKER, MAX_OBSERVATION_NAME};

/// `l<N> [name]<start>:<end>`
#[allow(clippy::expect_used)]
static READOUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^l(\d+)\s+\[([^\]]+)\](\d+):(\d+)$").expect("readout pattern is a valid literal")
});

/// Read one observation `line_advance` lines below the previous position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationReadout {
    pub observation: String,
    pub line_advance: usize,
    pub start_col: usize,
    pub end_col: usize,
}

impl ObservationReadout {
    pub fn new(observation: impl Into<String>, line_advance: usize, start_col: usize, end_col: usize) -> Self {
        Self {
            observation: observation.into(),
            line_advance,
            start_col,
            end_col,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionSet {
    primary_marker: String,
    readouts: Vec<ObservationReadout>,
}

/// Primary marker for a model output file: the first `width` characters of
/// its header line, trailing whitespace removed.
pub fn primary_marker_from_header(header: &str, width: usize) -> String {
    header
        .lines()
        .next()
        .unwrap_or_default()
        .chars()
        .take(width)
        .collect::<String>()
        .trim_end()
        .to_string()
}

impl InstructionSet {
    /// Validated instruction set; readouts are kept in the given order.
    pub fn new(
        primary_marker: impl Into<String>,
        readouts: Vec<ObservationReadout>,
    ) -> Result<Self, ProtocolError> {
        let primary_marker = primary_marker.into();
        if primary_marker.trim().is_empty() {
            return Err(ProtocolError::Parse {
                line: 2,
                message: "primary marker is empty".to_string(),
            });
        }
        if primary_marker.contains(MARKER) {
            return Err(ProtocolError::MarkerInText("primary marker".to_string()));
        }
        validate_names(
            "observation",
            readouts.iter().map(|r| r.observation.as_str()),
            MAX_OBSERVATION_NAME,
        )?;
        for r in &readouts {
            let invalid = |reason: &str| ProtocolError::InvalidReadout {
                observation: r.observation.clone(),
                reason: reason.to_string(),
            };
            if r.line_advance == 0 {
                return Err(invalid("line advance must be at least 1"));
            }
            if r.start_col == 0 || r.end_col < r.start_col {
                return Err(invalid("columns must satisfy 1 <= start <= end"));
            }
        }
        Ok(Self {
            primary_marker,
            readouts,
        })
    }

    pub fn primary_marker(&self) -> &str {
        &self.primary_marker
    }

    pub fn readouts(&self) -> &[ObservationReadout] {
        &self.readouts
    }

    pub fn render(&self) -> String {
        let mut out = format!("pif {MARKER}\n{MARKER}{}{MARKER}\n", self.primary_marker);
        for r in &self.readouts {
            out.push_str(&format!(
                "l{} [{}]{}:{}\n",
                r.line_advance, r.observation, r.start_col, r.end_col
            ));
        }
        out
    }

    /// Parse an instruction file written by [`InstructionSet::render`].
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let mut lines = text.lines().enumerate();
        let (_, header) = lines.next().unwrap_or((0, ""));
        let marker = parse_header(header, "pif")?;

        let (_, marker_line) = lines.next().ok_or_else(|| ProtocolError::Parse {
            line: 2,
            message: "missing primary marker line".to_string(),
        })?;
        let marker_line = marker_line.trim();
        let primary = marker_line
            .strip_prefix(marker)
            .and_then(|s| s.strip_suffix(marker))
            .ok_or_else(|| ProtocolError::Parse {
                line: 2,
                message: format!("expected {marker}<header>{marker}, found '{marker_line}'"),
            })?;

        let mut readouts = Vec::new();
        for (index, line) in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let bad = |message: String| ProtocolError::Parse {
                line: index + 1,
                message,
            };
            let caps = READOUT_RE
                .captures(line)
                .ok_or_else(|| bad(format!("unrecognised instruction '{line}'")))?;
            let number = |i: usize| -> Result<usize, ProtocolError> {
                caps[i]
                    .parse()
                    .map_err(|_| bad(format!("'{}' is not a column or line count", &caps[i])))
            };
            readouts.push(ObservationReadout {
                observation: caps[2].to_string(),
                line_advance: number(1)?,
                start_col: number(3)?,
                end_col: number(4)?,
            });
        }
        Self::new(primary, readouts)
    }

    /// Execute the instructions against model output text.
    pub fn read_observations(&self, output: &str) -> Result<IndexMap<String, f64>, ProtocolError> {
        let lines: Vec<&str> = output.lines().collect();
        let mut cursor = lines
            .iter()
            .position(|l| l.contains(&self.primary_marker))
            .ok_or_else(|| ProtocolError::MarkerNotFound(self.primary_marker.clone()))?;

        let mut values = IndexMap::with_capacity(self.readouts.len());
        for r in &self.readouts {
            cursor += r.line_advance;
            let bad = |message: String| ProtocolError::Parse {
                line: cursor + 1,
                message,
            };
            let line = lines
                .get(cursor)
                .ok_or_else(|| bad(format!("output ends before observation '{}'", r.observation)))?;
            let span: String = line
                .chars()
                .skip(r.start_col - 1)
                .take(r.end_col - r.start_col + 1)
                .collect();
            let value = parse_number(&span).ok_or_else(|| {
                bad(format!(
                    "columns {}:{} ('{}') are not a number for '{}'",
                    r.start_col,
                    r.end_col,
                    span.trim(),
                    r.observation
                ))
            })?;
            values.insert(r.observation.clone(), value);
        }
        debug!(observations = values.len(), "Read simulated observations");
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InstructionSet {
        InstructionSet::new(
            "HEADS OUTPUT",
            vec![
                ObservationReadout::new("obs0101", 1, 7, 15),
                ObservationReadout::new("obs0102", 1, 7, 15),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_render_format() {
        assert_eq!(
            sample().render(),
            "pif @\n@HEADS OUTPUT@\nl1 [obs0101]7:15\nl1 [obs0102]7:15\n"
        );
    }

    #[test]
    fn test_parse_render_agree() {
        let parsed = InstructionSet::parse(&sample().render()).unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn test_read_observations_in_order() {
        let output = "preamble\nHEADS OUTPUT FOR USE WITH PEST\nobs00 10.523400\nobs01 11.000000\n";
        let values = sample().read_observations(output).unwrap();
        let names: Vec<&String> = values.keys().collect();
        assert_eq!(names, ["obs0101", "obs0102"]);
        assert!((values["obs0101"] - 10.5234).abs() < 1e-9);
        assert!((values["obs0102"] - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_read_missing_marker() {
        assert!(matches!(
            sample().read_observations("nothing here\n1 2\n"),
            Err(ProtocolError::MarkerNotFound(_))
        ));
    }

    #[test]
    fn test_read_truncated_output() {
        let output = "HEADS OUTPUT\nobs00 10.500000\n";
        assert!(matches!(
            sample().read_observations(output),
            Err(ProtocolError::Parse { line: 3, .. })
        ));
    }

    #[test]
    fn test_invalid_readouts_rejected() {
        let zero_advance = InstructionSet::new("H", vec![ObservationReadout::new("a", 0, 1, 2)]);
        assert!(matches!(zero_advance, Err(ProtocolError::InvalidReadout { .. })));
        let inverted = InstructionSet::new("H", vec![ObservationReadout::new("a", 1, 5, 2)]);
        assert!(matches!(inverted, Err(ProtocolError::InvalidReadout { .. })));
        let dup = InstructionSet::new(
            "H",
            vec![
                ObservationReadout::new("a", 1, 1, 2),
                ObservationReadout::new("A", 1, 1, 2),
            ],
        );
        assert!(matches!(dup, Err(ProtocolError::DuplicateName { .. })));
        assert!(matches!(
            InstructionSet::new("bad@marker", Vec::new()),
            Err(ProtocolError::MarkerInText(_))
        ));
    }

    #[test]
    fn test_primary_marker_from_header() {
        assert_eq!(
            primary_marker_from_header("HEADS OUTPUT FOR USE WITH PEST \n", 30),
            "HEADS OUTPUT FOR USE WITH PEST"
        );
        assert_eq!(primary_marker_from_header("HEADS OUTPUT", 5), "HEADS");
    }
}
