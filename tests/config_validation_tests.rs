//! Config Validation Tests
//!
//! Typo detection on raw TOML and range validation on the parsed
//! `CalibrationConfig`, exercised independently from the calibration stages.

use pilot_points::config::validation::{
    known_config_keys, suggest_correction, validate_plausibility, validate_unknown_keys,
};
use pilot_points::config::{CalibrationConfig, ConfigError};
use pilot_points::types::ParTransform;

fn validation_errors(config: &CalibrationConfig) -> Vec<String> {
    match config.validate() {
        Err(ConfigError::Validation(errors)) => errors,
        other => panic!("expected validation errors, got {other:?}"),
    }
}

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_variogram_section_warns_with_suggestion() {
    let toml_str = r#"
[variogram]
nugett = 0.1
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert!(warnings[0].field.contains("nugett"));
    assert_eq!(warnings[0].suggestion.as_deref(), Some("variogram.nugget"));
    assert!(warnings[0].to_string().contains("did you mean 'variogram.nugget'?"));
}

#[test]
fn typo_in_nested_control_table_warns() {
    let toml_str = r#"
[control.derivatives]
derinc = 0.01
dermthd = "parabolic"
derinclbb = 0.0
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].field, "control.derivatives.derinclbb");
    assert_eq!(
        warnings[0].suggestion.as_deref(),
        Some("control.derivatives.derinclb")
    );
}

#[test]
fn valid_config_produces_zero_warnings() {
    let toml_str = r#"
[grid]
nrow = 40
ncol = 25
delr = 20.0
delc = 20.0
top = 0.0
botm = [-10.0]
length_unit = "meters"

[variogram]
kind = "exponential"
fit = false
sill = 1.5
range = 300.0
nugget = 0.05

[sampling]
nx = 4
ny = 8
margin_x = 40.0
margin_y = 40.0

[parameters]
prefix = "kx"
initial = 2.0
lower = 0.01
upper = 100.0
group = "kx"
transform = "log"

[observations]
prefix = "h"
weight = 2.0
group = "heads"

[control]
noptmax = 20
rlambda1 = 5.0

[control.change]
relparmax = 5.0
facparmax = 5.0

[files]
command = "run_model.sh"
snapshot = "state/pilot_points.json"

[output_layout]
header = "SIMULATED HEADS"
name_width = 14
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert!(warnings.is_empty(), "Unexpected warnings: {warnings:?}");
    let config = CalibrationConfig::from_toml_str(toml_str).unwrap();
    assert_eq!(config.parameters.transform, ParTransform::Log);
    assert_eq!(config.grid.nrow, 40);
}

#[test]
fn unknown_section_warns() {
    let toml_str = r#"
[plotting]
colormap = "viridis"
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 2, "section and its key: {warnings:?}");
    assert!(warnings.iter().any(|w| w.field == "plotting"));
    assert!(warnings.iter().any(|w| w.field == "plotting.colormap"));
}

#[test]
fn multiple_typos_all_warned() {
    let toml_str = r#"
[grid]
nrows = 10
[sampling]
margn_x = 5.0
[files]
comand = "model.sh"
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 3);
    assert!(warnings.iter().all(|w| w.suggestion.is_some()));
}

#[test]
fn unknown_keys_do_not_block_loading() {
    let config = CalibrationConfig::from_toml_str("[grid]\nnrow = 20\nncool = 3\n").unwrap();
    assert_eq!(config.grid.nrow, 20);
    assert_eq!(config.grid.ncol, 50);
}

#[test]
fn empty_toml_produces_zero_warnings() {
    assert!(validate_unknown_keys("").is_empty());
}

#[test]
fn known_keys_set_covers_every_section() {
    let keys = known_config_keys();
    for section in [
        "grid",
        "variogram",
        "sampling",
        "parameters",
        "observations",
        "control",
        "control.change",
        "control.derivatives",
        "files",
        "output_layout",
    ] {
        assert!(keys.contains(section), "missing section {section}");
    }
    assert!(keys.contains("parameters.transform.tied.parent"));
}

#[test]
fn suggest_correction_finds_close_match() {
    let keys = known_config_keys();
    assert_eq!(
        suggest_correction("sampling.margin_z", &keys).as_deref(),
        Some("sampling.margin_x")
    );
}

#[test]
fn suggest_correction_returns_none_for_garbage() {
    let keys = known_config_keys();
    assert_eq!(suggest_correction("completely_unrelated_key", &keys), None);
}

// ============================================================================
// Range Validation
// ============================================================================

#[test]
fn all_defaults_pass_validation() {
    CalibrationConfig::default().validate().unwrap();
}

#[test]
fn empty_grid_is_error() {
    let mut config = CalibrationConfig::default();
    config.grid.nrow = 0;
    let errors = validation_errors(&config);
    assert!(errors.iter().any(|e| e.starts_with("grid:")), "{errors:?}");
}

#[test]
fn margins_wider_than_domain_are_error() {
    let mut config = CalibrationConfig::default();
    config.sampling.margin_x = 300.0;
    let errors = validation_errors(&config);
    assert!(errors.iter().any(|e| e.starts_with("sampling:")), "{errors:?}");
}

#[test]
fn fixed_variogram_without_range_is_error() {
    let mut config = CalibrationConfig::default();
    config.variogram.fit = false;
    config.variogram.sill = Some(1.0);
    let errors = validation_errors(&config);
    assert!(errors.iter().any(|e| e.contains("variogram.range")), "{errors:?}");
}

#[test]
fn fixed_variogram_with_negative_nugget_is_error() {
    let mut config = CalibrationConfig::default();
    config.variogram.fit = false;
    config.variogram.sill = Some(1.0);
    config.variogram.range = Some(100.0);
    config.variogram.nugget = Some(-0.5);
    let errors = validation_errors(&config);
    assert!(errors.iter().any(|e| e.starts_with("variogram:")), "{errors:?}");
}

#[test]
fn too_few_lags_for_fitting_is_error() {
    let mut config = CalibrationConfig::default();
    config.variogram.nlags = 2;
    let errors = validation_errors(&config);
    assert!(errors.iter().any(|e| e.contains("variogram.nlags")), "{errors:?}");
}

#[test]
fn initial_value_outside_bounds_is_error() {
    let mut config = CalibrationConfig::default();
    config.parameters.initial = 75.0;
    assert!(!validation_errors(&config).is_empty());
}

#[test]
fn tied_transform_in_defaults_is_error() {
    let mut config = CalibrationConfig::default();
    config.parameters.transform = ParTransform::Tied {
        parent: "hk0000".to_string(),
    };
    assert!(!validation_errors(&config).is_empty());
}

#[test]
fn observation_names_wider_than_output_column_are_error() {
    let mut config = CalibrationConfig::default();
    config.output_layout.name_width = 5;
    let errors = validation_errors(&config);
    assert!(errors.iter().any(|e| e.contains("observations.prefix")), "{errors:?}");
}

#[test]
fn narrow_value_column_is_error() {
    let mut config = CalibrationConfig::default();
    config.output_layout.value_width = 6;
    let errors = validation_errors(&config);
    assert!(errors.iter().any(|e| e.contains("value_width")), "{errors:?}");
}

#[test]
fn empty_model_command_is_error() {
    let mut config = CalibrationConfig::default();
    config.files.command = "  ".to_string();
    let errors = validation_errors(&config);
    assert!(errors.iter().any(|e| e.contains("files.command")), "{errors:?}");
}

#[test]
fn validation_error_display_lists_each_problem() {
    let mut config = CalibrationConfig::default();
    config.files.command = String::new();
    config.observations.group = String::new();
    let text = config.validate().unwrap_err().to_string();
    assert!(text.starts_with("Config validation failed:"));
    assert!(text.contains("  - files.command"));
    assert!(text.contains("  - observations.group"));
}

// ============================================================================
// Plausibility Warnings
// ============================================================================

#[test]
fn dense_layout_is_warning_not_error() {
    let mut config = CalibrationConfig::default();
    config.grid.nrow = 10;
    config.grid.ncol = 10;
    config.sampling.nx = 5;
    config.sampling.ny = 6;
    config.sampling.margin_x = 5.0;
    config.sampling.margin_y = 5.0;
    config.validate().unwrap();
    let warnings = validate_plausibility(&config);
    assert!(warnings.iter().any(|w| w.field == "sampling"), "{warnings:?}");
}

#[test]
fn zero_iterations_is_warning() {
    let mut config = CalibrationConfig::default();
    config.control.noptmax = 0;
    let warnings = validate_plausibility(&config);
    assert!(warnings.iter().any(|w| w.field == "control.noptmax"));
}

#[test]
fn huge_fixed_range_is_warning() {
    let mut config = CalibrationConfig::default();
    config.variogram.fit = false;
    config.variogram.sill = Some(1.0);
    config.variogram.range = Some(1.0e6);
    config.validate().unwrap();
    let warnings = validate_plausibility(&config);
    assert!(warnings.iter().any(|w| w.field == "variogram.range"));
}

#[test]
fn defaults_produce_no_plausibility_warnings() {
    assert!(validate_plausibility(&CalibrationConfig::default()).is_empty());
}
