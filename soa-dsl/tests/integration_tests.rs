//! Integration tests for the SOA DSL compiler pipeline

use soa_dsl::converter::{ConversionError, DeviceCatalog, MonitorCatalog};
use soa_dsl::parser::{KindParams, MonitorKind, OvcheckParams, ParamValue};
use soa_dsl::prelude::*;
use soa_dsl::SoaParser;
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn catalogs() -> (DeviceCatalog, MonitorCatalog) {
    let devices = DeviceCatalog::from_file(&fixture_path("devices.yaml")).expect("device library");
    let monitors =
        MonitorCatalog::from_file(&fixture_path("monitors.yaml")).expect("monitor library");
    (devices, monitors)
}

fn compile_fixture() -> CompileOutput {
    let (devices, monitors) = catalogs();
    SoaDslCore::compile_file(
        &fixture_path("bcd90_rules.yaml"),
        Libraries::new(&devices, &monitors),
        &ValidationOptions { strict_mode: true },
        &GeneratorOptions::default(),
    )
    .expect("Fixture should compile")
}

#[test]
fn test_convert_one_monitor_per_device() {
    let (devices, monitors) = catalogs();
    let doc = SoaDslCore::convert_file(
        &fixture_path("bcd90_rules.yaml"),
        Libraries::new(&devices, &monitors),
    )
    .expect("Should convert");

    // Core VDS targets two devices, every other rule one.
    assert_eq!(doc.monitors.len(), 8);
    assert_eq!(doc.process, "BCD90");

    let kinds: Vec<MonitorKind> = doc.monitors.iter().map(|m| m.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            MonitorKind::Ovcheck,
            MonitorKind::Ovcheck,
            MonitorKind::Ovcheck6,
            MonitorKind::OvcheckMos2,
            MonitorKind::OvcheckPwl,
            MonitorKind::OvcheckHciTddb,
            MonitorKind::Parcheck3,
            MonitorKind::Ovcheck,
        ]
    );

    assert_eq!(doc.monitors[1].model_name, "ovcheck_pmos_core_core_vds");
    assert_eq!(
        doc.monitors[4].section,
        "soacheck_poly_10hv_poly_voltage_vs_temperature_shared"
    );
    assert_eq!(doc.monitors[4].common.tmaxfrac.as_deref(), Some("tmaxfrac1"));
    assert_eq!(doc.parameters.get("tcelsius0"), Some(&ParamValue::Number(25.0)));
}

#[test]
fn test_self_heating_limits() {
    let (devices, monitors) = catalogs();
    let doc = SoaDslCore::convert_file(
        &fixture_path("bcd90_rules.yaml"),
        Libraries::new(&devices, &monitors),
    )
    .unwrap();

    let heating = doc.monitors_for_device("npn_b");
    assert_eq!(heating.len(), 1);
    match &heating[0].params {
        KindParams::Ovcheck(OvcheckParams::SelfHeating(sh)) => {
            assert_eq!(sh.dtmax, ParamValue::Number(10.0));
            assert_eq!(sh.theat, ParamValue::Number(1e-7));
            assert_eq!(sh.idc_high, Some(ParamValue::Number(0.01)));
            assert_eq!(sh.ipeak_high, Some(ParamValue::expr("$area * 0.002")));
            assert_eq!(sh.irms_high, None);
        }
        other => panic!("Unexpected parameters: {:?}", other),
    }
}

#[test]
fn test_compiled_netlist_sections() {
    let output = compile_fixture();
    let netlist = &output.netlist;

    assert!(netlist.starts_with("simulator lang=spectre\n// Generated from SOA DSL\n"));
    assert!(netlist.contains("+ tcelsius0=25\n+ vmax_core=1.32\n+ vmax_hv=10.5\n"));

    assert!(netlist.contains(
        "model ovcheck_nmos_core_core_vds ovcheck\n\
         + tmin=global_tmin tdelay=global_tdelay vballmsg=global_vballmsg stop=global_stop\n\
         + tmaxfrac=tmaxfrac0\n\
         + vlow=-0.1 vhigh=vmax_core * 1.1 branch1=\"V(d,s)\" message1=\"Core drain-source overvoltage\"\n\
         endsection soacheck_nmos_core_core_vds_shared\n"
    ));

    assert!(netlist.contains(
        "+ vlow1=-0.5 vhigh1=5.5 branch1=\"V(g,s)\" message1=\"VGS overvoltage\"\n\
         + vhigh2=12 branch2=\"V(g,d)\" message2=\"Branch2\"\n\
         + vhigh3=vmax_hv branch3=\"V(d,b)\" message3=\"Branch3\"\n"
    ));

    assert!(netlist.contains(
        "+ vhigh_on=10\n+ vhigh_off=12\n+ vhigh_gc=1.5\n+ vlow_gc=0.5\n+ param=\"vth\"\n+ vgt=0.2\n"
    ));

    assert!(netlist.contains(
        "+ vlow=-5 + 0.01 * (temp - 25)\n+ vhigh=5 - 0.01 * (temp - 25)\n+ branch1=\"V(p,n)\"\n"
    ));

    assert!(netlist.contains(
        "+ atype=atype\n+ soa_hcitddb_a=1.2\n+ soa_hcitddb_b=0.3\n+ soa_hcitddb_n=2\n+ lifetime=10\n"
    ));

    assert!(netlist.contains("+ param=\"vth\"\n+ vgt=0.1\n+ vlow=0.2\n+ vhigh=0.8\n"));

    assert!(netlist.contains(
        "+ dtmax=10 theat=1e-7 monitor=shmonitor_nofeedback\n\
         + idc_high=0.01\n\
         + ipeak_high=area * 0.002\n"
    ));
}

#[test]
fn test_compile_is_deterministic() {
    let first = compile_fixture();
    let second = compile_fixture();
    assert_eq!(first.netlist, second.netlist);
}

#[test]
fn test_converted_document_round_trips() {
    let output = compile_fixture();
    let yaml = output.document.to_yaml().expect("Should serialize");
    let reparsed = SoaParser::parse_monitor(&yaml).expect("Should reparse");

    assert_eq!(reparsed.monitors, output.document.monitors);
    assert_eq!(reparsed.global_config.tmaxfrac, output.document.global_config.tmaxfrac);
}

#[test]
fn test_compile_rejects_invalid_rules() {
    let (devices, monitors) = catalogs();
    let result = SoaDslCore::compile_file(
        &fixture_path("invalid_rules.yaml"),
        Libraries::new(&devices, &monitors),
        &ValidationOptions::default(),
        &GeneratorOptions::default(),
    );

    match result {
        Err(SoaDslError::ValidationFailed(report)) => assert_eq!(report.errors.len(), 5),
        other => panic!("Expected validation failure, got {:?}", other.map(|o| o.netlist)),
    }
}

#[test]
fn test_unknown_device_aborts_conversion() {
    let (_, monitors) = catalogs();
    let devices = DeviceCatalog::from_yaml("devices: {}\n").unwrap();
    let result = SoaDslCore::convert_file(
        &fixture_path("bcd90_rules.yaml"),
        Libraries::new(&devices, &monitors),
    );

    match result {
        Err(SoaDslError::Conversion(ConversionError::UnknownDevice { rule, device })) => {
            assert_eq!(rule, "Core VDS");
            assert_eq!(device, "nmos_core");
        }
        other => panic!("Expected unknown device, got {:?}", other),
    }
}

#[test]
fn test_generate_monitor_document_with_inlined_globals() {
    let netlist = SoaDslCore::generate_file(
        &fixture_path("bcd90_monitors.yaml"),
        None,
        &GeneratorOptions {
            inline_globals: true,
        },
    )
    .expect("Monitor documents need no libraries");

    assert!(netlist.contains("vhigh=1.32 * 1.1 "));
    assert!(netlist.contains("+ lifetime=10\nendsection soacheck_nmoshs45_10hv_ldmos_hci_shared\n"));
}

#[test]
fn test_aging_marker_without_model_type() {
    let (devices, monitors) = catalogs();
    let rules = r#"
process: BCD90
global:
  timing: {tmin: 0, tdelay: 0, vballmsg: 1, stop: 0}
  tmaxfrac: {level0: 0, level1: 0.01, level2: 0.1, level3: -1}
rules:
  - name: LDMOS wear
    device: nmoshs45_10hv
    parameter: v[d,s]
    type: aging
    severity: review
    aging_check:
      params: {a: 1.2}
"#;
    let netlist = SoaDslCore::generate(
        rules,
        Some(Libraries::new(&devices, &monitors)),
        &GeneratorOptions::default(),
    )
    .expect("Aging rule should lower");

    assert!(netlist.contains(
        "model ovcheckva_ldmos_hci_tddb_nmoshs45_10hv_ldmos_wear ovcheckva_ldmos_hci_tddb\n\
         + tmin=global_tmin tdelay=global_tdelay vballmsg=global_vballmsg stop=global_stop\n\
         + tmaxfrac=tmaxfrac0\n\
         + atype=atype\n\
         + soa_hcitddb_a=1.2\n\
         endsection soacheck_nmoshs45_10hv_ldmos_wear_shared\n"
    ));
}
