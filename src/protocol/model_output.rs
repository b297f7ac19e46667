//! Simulated-observation table
//!
//! The text file the simulator side writes after each run: one header line
//! followed by one `name value` row per observation in fixed columns. The
//! column layout decides the instruction file's read span, so both are
//! derived from the same `ObservationTableLayout`.

use serde::{Deserialize, Serialize};

use super::{
    format_number, primary_marker_from_header, InstructionSet, ObservationReadout, ProtocolError,
};
use crate::types::ObservationRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationTableLayout {
    pub header: String,
    /// Columns reserved for the observation name.
    pub name_width: usize,
    /// Columns reserved for the right-aligned value.
    pub value_width: usize,
    /// Leading header characters used as the primary marker.
    pub marker_width: usize,
}

impl Default for ObservationTableLayout {
    fn default() -> Self {
        Self {
            header: "HEADS OUTPUT FOR USE WITH PEST".to_string(),
            name_width: 12,
            value_width: 16,
            marker_width: 30,
        }
    }
}

impl ObservationTableLayout {
    /// 1-based inclusive columns of the value field.
    pub const fn value_columns(&self) -> (usize, usize) {
        (self.name_width + 1, self.name_width + self.value_width)
    }

    pub fn primary_marker(&self) -> String {
        primary_marker_from_header(&self.header, self.marker_width)
    }

    /// Write the table for `(name, value)` rows in the given order.
    pub fn render(&self, rows: &[(String, f64)]) -> Result<String, ProtocolError> {
        let mut out = format!("{}\n", self.header.trim_end());
        for (name, value) in rows {
            if name.chars().count() > self.name_width {
                return Err(ProtocolError::InvalidRecord {
                    name: name.clone(),
                    reason: format!("name wider than {} columns", self.name_width),
                });
            }
            // One column is kept free so the value never touches the name
            let text = format_number(*value, self.value_width.saturating_sub(1)).ok_or_else(|| {
                ProtocolError::InvalidRecord {
                    name: name.clone(),
                    reason: format!("value {value} does not fit in {} columns", self.value_width),
                }
            })?;
            out.push_str(&format!(
                "{name:<nw$}{text:>vw$}\n",
                nw = self.name_width,
                vw = self.value_width
            ));
        }
        Ok(out)
    }

    /// Instructions reading `observations` back from a table in this layout,
    /// one row per observation in order.
    pub fn instruction_set(
        &self,
        observations: &[ObservationRecord],
    ) -> Result<InstructionSet, ProtocolError> {
        let (start, end) = self.value_columns();
        let readouts = observations
            .iter()
            .map(|o| ObservationReadout::new(o.name.clone(), 1, start, end))
            .collect();
        InstructionSet::new(self.primary_marker(), readouts)
    }
}
