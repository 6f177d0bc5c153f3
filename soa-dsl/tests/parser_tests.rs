//! Tests for SOA document parsing

use soa_dsl::parser::{
    detect_and_parse_file, Document, DocumentFormat, KindParams, MonitorKind, OvcheckParams,
    ParamValue, ParseError, RuleType,
};
use soa_dsl::{parse_monitors, parse_rules, SoaDslError, SoaParser};
use std::io::Write;
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

#[test]
fn test_parse_rule_document() {
    let doc = parse_rules(&fixture_path("bcd90_rules.yaml")).expect("Should parse");

    assert_eq!(doc.process, "BCD90");
    assert_eq!(doc.date, "2024-12-16");
    assert_eq!(doc.rules.len(), 7, "Should have all rules");

    let core = &doc.rules[0];
    assert_eq!(core.rule_type, RuleType::Voltage);
    assert_eq!(core.device.len(), 2, "Device list should keep both targets");
    assert_eq!(
        core.constraint.as_ref().and_then(|c| c.vhigh.clone()),
        Some(ParamValue::expr("vmax_core * 1.1"))
    );

    assert_eq!(doc.global_config.timing.tdelay, Some(ParamValue::Number(1e-9)));
    assert_eq!(doc.global_config.get_tmaxfrac(3), -1.0);
    assert_eq!(doc.global_config.get_limit("vmax_hv"), Some(&ParamValue::Number(10.5)));
}

#[test]
fn test_parse_rule_shapes() {
    let doc = parse_rules(&fixture_path("bcd90_rules.yaml")).expect("Should parse");

    let gate = doc.rules.iter().find(|r| r.name == "HV gate stack").unwrap();
    assert!(gate.is_multi_branch());
    assert_eq!(gate.branches.len(), 3);
    assert_eq!(gate.branches[0].message.as_deref(), Some("VGS overvoltage"));

    let state = doc.rules.iter().find(|r| r.name == "HV VDS state").unwrap();
    assert!(state.is_state_dependent());
    assert!(state.gate_control.is_some());

    let heating = doc
        .rules
        .iter()
        .find(|r| r.name == "Bipolar collector current")
        .unwrap();
    assert!(heating.is_current_with_heating());
    assert_eq!(heating.constraints.len(), 2);
    assert_eq!(heating.constraints[1].kind, "ipeak");

    assert_eq!(doc.rules_for_device("nmoshs45_10hv").len(), 2);
}

#[test]
fn test_parse_monitor_document() {
    let doc = parse_monitors(&fixture_path("bcd90_monitors.yaml")).expect("Should parse");

    assert_eq!(doc.monitors.len(), 3);
    assert_eq!(doc.parameters.get("vmax_core"), Some(&ParamValue::Number(1.32)));

    let core = &doc.monitors[0];
    assert_eq!(core.kind(), MonitorKind::Ovcheck);
    assert_eq!(core.common.tmaxfrac.as_deref(), Some("tmaxfrac0"));
    match &core.params {
        KindParams::Ovcheck(OvcheckParams::Branch(limits)) => {
            assert_eq!(limits.branch.as_deref(), Some("V(d,s)"));
            assert_eq!(limits.vlow, Some(ParamValue::Number(-0.1)));
        }
        other => panic!("Unexpected parameters: {:?}", other),
    }

    match &doc.monitors[1].params {
        KindParams::Ovcheck6(branches) => {
            assert_eq!(branches.len(), 2);
            assert_eq!(branches[1].message, "Branch2", "Missing message gets a default");
        }
        other => panic!("Unexpected parameters: {:?}", other),
    }

    let aging = &doc.monitors[2];
    assert_eq!(aging.extra.get("lifetime"), Some(&ParamValue::Number(10.0)));
}

#[test]
fn test_monitor_yaml_round_trip() {
    let doc = parse_monitors(&fixture_path("bcd90_monitors.yaml")).expect("Should parse");
    let yaml = doc.to_yaml().expect("Should serialize");
    let reparsed = SoaParser::parse_monitor(&yaml).expect("Should reparse");
    assert_eq!(doc, reparsed);
}

#[test]
fn test_detect_flavor_from_file() {
    let rules = detect_and_parse_file(&fixture_path("bcd90_rules.yaml")).unwrap();
    assert_eq!(rules.format(), DocumentFormat::Universal);

    let monitors = detect_and_parse_file(&fixture_path("bcd90_monitors.yaml")).unwrap();
    assert!(matches!(monitors, Document::Monitor(_)));
}

#[test]
fn test_missing_file() {
    let result = parse_rules(&PathBuf::from("not_a_real_file.yaml"));
    assert!(
        matches!(result, Err(SoaDslError::Parse(ParseError::Io(_)))),
        "Should fail on nonexistent file"
    );
}

#[test]
fn test_rejects_non_yaml_extension() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    writeln!(file, "{{\"rules\": []}}").unwrap();

    match SoaParser::parse_universal_file(file.path()) {
        Err(ParseError::UnsupportedExtension(ext)) => assert_eq!(ext, ".json"),
        other => panic!("Expected unsupported extension, got {:?}", other),
    }
}

#[test]
fn test_monitor_missing_field_names_path() {
    let content = std::fs::read_to_string(fixture_path("bcd90_monitors.yaml"))
        .unwrap()
        .replacen("      stop: global_stop\n", "", 1);

    match SoaParser::parse_monitor(&content) {
        Err(ParseError::MissingField(field)) => {
            assert_eq!(field, "monitors[0].parameters.stop")
        }
        other => panic!("Expected missing field, got {:?}", other),
    }
}
