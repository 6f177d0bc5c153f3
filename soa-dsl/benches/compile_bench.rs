use criterion::{black_box, criterion_group, criterion_main, Criterion};
use soa_dsl::converter::{DeviceCatalog, MonitorCatalog};
use soa_dsl::prelude::*;
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn bench_compile(c: &mut Criterion) {
    let devices = DeviceCatalog::from_file(&fixture_path("devices.yaml")).unwrap();
    let monitors = MonitorCatalog::from_file(&fixture_path("monitors.yaml")).unwrap();
    let rules = std::fs::read_to_string(fixture_path("bcd90_rules.yaml")).unwrap();
    let options = ValidationOptions::default();

    c.bench_function("compile_rules", |b| {
        b.iter(|| {
            SoaDslCore::compile(
                black_box(&rules),
                Libraries::new(&devices, &monitors),
                black_box(&options),
                &GeneratorOptions::default(),
            )
        });
    });
}

fn bench_validate(c: &mut Criterion) {
    let rules = std::fs::read_to_string(fixture_path("bcd90_rules.yaml")).unwrap();
    let options = ValidationOptions { strict_mode: true };

    c.bench_function("validate_rules", |b| {
        b.iter(|| SoaDslCore::validate(black_box(&rules), black_box(&options)));
    });
}

fn bench_generate(c: &mut Criterion) {
    let monitors = std::fs::read_to_string(fixture_path("bcd90_monitors.yaml")).unwrap();

    c.bench_function("generate_monitors", |b| {
        b.iter(|| SoaDslCore::generate(black_box(&monitors), None, &GeneratorOptions::default()));
    });
}

criterion_group!(benches, bench_compile, bench_validate, bench_generate);
criterion_main!(benches);
