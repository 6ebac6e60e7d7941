use criterion::{black_box, criterion_group, criterion_main, Criterion};
use klcheck::prelude::*;
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn bench_parse_library(c: &mut Criterion) {
    let text = std::fs::read_to_string(fixture_path("Violations.kicad_sym")).unwrap();
    c.bench_function("parse_library", |b| {
        b.iter(|| Library::parse(black_box(&text), "Violations.kicad_sym"));
    });
}

fn bench_write_library(c: &mut Criterion) {
    let library = klcheck::load_library(&fixture_path("Violations.kicad_sym")).unwrap();
    c.bench_function("write_library", |b| {
        b.iter(|| black_box(&library).to_sexpr_string());
    });
}

fn bench_check_library(c: &mut Criterion) {
    let core = KlcCore::new(CheckOptions::default()).unwrap();
    c.bench_function("check_library", |b| {
        b.iter(|| core.check_library(black_box(&fixture_path("Violations.kicad_sym"))));
    });
}

criterion_group!(benches, bench_parse_library, bench_write_library, bench_check_library);
criterion_main!(benches);
