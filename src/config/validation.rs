//! Config validation: unknown-key detection with Levenshtein suggestions
//! and plausibility checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

use super::CalibrationConfig;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for CalibrationConfig.
///
/// Maintained by hand to match the struct hierarchy; a new config field
/// must be added here too.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [grid]
        "grid",
        "grid.nrow",
        "grid.ncol",
        "grid.delr",
        "grid.delc",
        "grid.row_spacings",
        "grid.col_spacings",
        "grid.x_origin",
        "grid.y_origin",
        "grid.top",
        "grid.botm",
        "grid.length_unit",
        // [variogram]
        "variogram",
        "variogram.kind",
        "variogram.fit",
        "variogram.sill",
        "variogram.range",
        "variogram.nugget",
        "variogram.nlags",
        // [sampling]
        "sampling",
        "sampling.nx",
        "sampling.ny",
        "sampling.margin_x",
        "sampling.margin_y",
        // [parameters]
        "parameters",
        "parameters.prefix",
        "parameters.initial",
        "parameters.lower",
        "parameters.upper",
        "parameters.group",
        "parameters.transform",
        "parameters.transform.tied",
        "parameters.transform.tied.parent",
        "parameters.change_limit",
        "parameters.scale",
        "parameters.offset",
        // [observations]
        "observations",
        "observations.prefix",
        "observations.weight",
        "observations.group",
        // [control]
        "control",
        "control.rstfle",
        "control.pestmode",
        "control.precis",
        "control.dpoint",
        "control.numcom",
        "control.jacfile",
        "control.messfile",
        "control.rlambda1",
        "control.rlamfac",
        "control.phiratsuf",
        "control.phiredlam",
        "control.numlam",
        "control.jacupdate",
        "control.lamforgive",
        "control.derforgive",
        "control.phiredswh",
        "control.noptmax",
        "control.phiredstp",
        "control.nphistp",
        "control.nphinored",
        "control.relparstp",
        "control.nrelpar",
        "control.icov",
        "control.icor",
        "control.ieig",
        // [control.change]
        "control.change",
        "control.change.relparmax",
        "control.change.facparmax",
        "control.change.facorig",
        "control.change.iboundstick",
        // [control.derivatives]
        "control.derivatives",
        "control.derivatives.inctyp",
        "control.derivatives.derinc",
        "control.derivatives.derinclb",
        "control.derivatives.forcen",
        "control.derivatives.derincmul",
        "control.derivatives.dermthd",
        // [files]
        "files",
        "files.command",
        "files.pilot_values",
        "files.template",
        "files.instruction",
        "files.model_output",
        "files.control",
        "files.snapshot",
        "files.field",
        // [output_layout]
        "output_layout",
        "output_layout.header",
        "output_layout.name_width",
        "output_layout.value_width",
        "output_layout.marker_width",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let b_len = b_chars.len();
    if a.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for &k in known {
        let dist = levenshtein(unknown, k);
        if dist > 3 {
            continue;
        }
        // Ties resolve alphabetically so suggestions are stable
        let better = match best {
            None => true,
            Some((best_key, best_dist)) => dist < best_dist || (dist == best_dist && k < best_key),
        };
        if better {
            best = Some((k, dist));
        }
    }
    best.map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys, it only warns.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    let found = walk_toml_keys(&value, "");
    let mut warnings = Vec::new();

    for key in &found {
        if !known.contains(key.as_str()) {
            let suggestion = suggest_correction(key, &known);
            let message = format!("Unknown config key '{key}'");
            warnings.push(ValidationWarning {
                field: key.clone(),
                message,
                suggestion,
            });
        }
    }

    warnings
}

// ============================================================================
// Plausibility Checks
// ============================================================================

/// Values that are legal but probably not what the user meant.
pub fn validate_plausibility(config: &CalibrationConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut warn = |field: &str, message: String| {
        warnings.push(ValidationWarning {
            field: field.to_string(),
            message,
            suggestion: None,
        });
    };

    let cells = config.grid.nrow * config.grid.ncol;
    let pilots = config.sampling.count();
    // Beyond a quarter of the cells the kriging system costs more than it buys
    if cells > 0 && pilots * 4 > cells {
        warn(
            "sampling",
            format!("{pilots} pilot points on a {cells}-cell grid is unusually dense"),
        );
    }

    if config.observations.weight == 0.0 {
        warn(
            "observations.weight",
            "observations.weight = 0 removes every observation from the objective function"
                .to_string(),
        );
    }

    if config.control.noptmax == 0 {
        warn(
            "control.noptmax",
            "control.noptmax = 0 runs the model once without estimating parameters".to_string(),
        );
    }

    if let (Some(range), Ok(grid)) = (config.variogram.range, config.grid.to_grid_spec()) {
        let diagonal = grid.width().hypot(grid.height());
        if !config.variogram.fit && range > 10.0 * diagonal {
            warn(
                "variogram.range",
                format!(
                    "variogram.range = {range} is more than ten times the domain diagonal ({diagonal:.1})"
                ),
            );
        }
    }

    warnings
}
