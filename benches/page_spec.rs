//! Page Spec Benchmarks
//!
//! Parsing and resolving page specs happens on every tool call before any
//! document work starts, so it should stay in the microsecond range even
//! for long specs against large documents.
//!
//! Run with: `cargo bench --bench page_spec`

use std::path::Path;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use pdfx_server::classify::{sniff_kind, PageSpec};

/// "1,3,5,...": `n` single pages
fn long_spec(n: u32) -> String {
    (0..n)
        .map(|i| (i * 2 + 1).to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("page_spec_parse");

    for spec in ["1", "-1", "1-10,20,-3"] {
        group.bench_with_input(BenchmarkId::from_parameter(spec), spec, |b, spec| {
            b.iter(|| PageSpec::parse(black_box(spec)))
        });
    }

    let long = long_spec(500);
    group.bench_function("500_pages", |b| b.iter(|| PageSpec::parse(black_box(&long))));

    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("page_spec_resolve");

    let all = PageSpec::All;
    let ranges = PageSpec::parse("1-100,50-150,-10").unwrap();
    let singles = PageSpec::parse(&long_spec(500)).unwrap();

    for page_count in [10u32, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("all", page_count), &page_count, |b, &n| {
            b.iter(|| all.resolve(black_box(n)))
        });
    }
    group.bench_function("ranges", |b| b.iter(|| ranges.resolve(black_box(1_000))));
    group.bench_function("500_singles", |b| b.iter(|| singles.resolve(black_box(1_000))));

    group.finish();
}

fn bench_sniff(c: &mut Criterion) {
    let mut pdf = b"%PDF-1.7\n".to_vec();
    pdf.resize(1024, b' ');
    let png = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR".to_vec();

    let mut group = c.benchmark_group("format_detection");

    group.bench_function("pdf_magic_bytes", |b| {
        b.iter(|| sniff_kind(black_box(&pdf), Path::new("doc.pdf")))
    });
    group.bench_function("png_magic_bytes", |b| {
        b.iter(|| sniff_kind(black_box(&png), Path::new("scan.png")))
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_resolve, bench_sniff);
criterion_main!(benches);
