//! Tests for semantic validation of rule documents

use soa_dsl::prelude::*;
use soa_dsl::validator::DiagnosticSeverity;
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn strict() -> ValidationOptions {
    ValidationOptions { strict_mode: true }
}

#[test]
fn test_valid_rules_pass_strict() {
    let report = SoaDslCore::validate_file(&fixture_path("bcd90_rules.yaml"), &strict())
        .expect("Should parse");

    assert!(
        report.passed,
        "Clean rule set should pass strict validation: {:?}",
        report
            .errors
            .iter()
            .chain(report.warnings.iter())
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
    );
    assert_eq!(report.total(), 0);
}

#[test]
fn test_invalid_rules_report_every_defect() {
    let report = SoaDslCore::validate_file(
        &fixture_path("invalid_rules.yaml"),
        &ValidationOptions::default(),
    )
    .expect("Should parse");

    assert!(!report.passed);
    let errors: Vec<&str> = report.errors.iter().map(|d| d.message.as_str()).collect();
    assert_eq!(
        errors,
        vec![
            "tmaxfrac levels must be in ascending order",
            "vhigh must be greater than vlow (vhigh=5, vlow=5)",
            "Too many branches (7), maximum is 6",
            "Invalid severity: bogus",
            "Duplicate rule name (first defined at rule 1)",
        ]
    );

    let warnings: Vec<&str> = report.warnings.iter().map(|d| d.message.as_str()).collect();
    assert_eq!(
        warnings,
        vec![
            "Unknown device type: widget_x",
            "Undefined variable in vhigh: vmax_undefined",
        ]
    );
    assert!(report
        .warnings
        .iter()
        .all(|d| d.severity == DiagnosticSeverity::Warning));
}

#[test]
fn test_strictness_decides_pass() {
    let content = r#"
global:
  timing: {tmin: 0, tdelay: 0, vballmsg: 1}
  tmaxfrac: {level0: 0, level1: 0.01, level2: 0.1, level3: -1}
rules:
  - name: Core VDS
    device: nmos_core
    parameter: v[d,s]
    type: voltage
    severity: high
    constraint: {vhigh: 1.32}
"#;
    let lenient = SoaDslCore::validate(content, &ValidationOptions::default()).unwrap();
    assert!(lenient.passed, "Warnings alone should not fail non-strict runs");
    assert_eq!(lenient.warnings.len(), 1);
    assert_eq!(lenient.warnings[0].message, "Missing timing parameter: stop");

    let strict = SoaDslCore::validate(content, &strict()).unwrap();
    assert!(!strict.passed, "Strict runs fail on any warning");
}

#[test]
fn test_report_json() {
    let report = SoaDslCore::validate_file(
        &fixture_path("invalid_rules.yaml"),
        &ValidationOptions::default(),
    )
    .unwrap();
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

    assert_eq!(json["passed"], false);
    assert_eq!(json["errors"].as_array().map(Vec::len), Some(5));
    assert_eq!(json["errors"][0]["rule_name"], "global");
    assert_eq!(json["warnings"][0]["severity"], "warning");
}

#[test]
fn test_render_lists_errors_first() {
    let report = SoaDslCore::validate_file(
        &fixture_path("invalid_rules.yaml"),
        &ValidationOptions::default(),
    )
    .unwrap();
    let text = report.render();

    assert!(text.starts_with("5 error(s):\n"));
    assert!(text.contains("  [ERROR] Inverted limits: Duplicate rule name (first defined at rule 1)\n"));
    assert!(text.contains("2 warning(s):\n  [WARNING] Mystery device: Unknown device type: widget_x\n"));
}
