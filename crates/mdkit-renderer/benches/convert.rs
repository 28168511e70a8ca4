//! Benchmarks for environment composition and conversion.

#![allow(clippy::format_push_string)] // Benchmark setup code, performance not critical

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use mdkit_config::Config;
use mdkit_renderer::{Catalog, Markdown, compose};

/// Generate markdown touching every built-in extension.
fn generate_markdown(sections: usize) -> String {
    let mut md = String::with_capacity(sections * 300);
    md.push_str("# Document Title\n\n");

    for i in 0..sections {
        md.push_str(&format!("## Section {i}\n\n"));
        md.push_str("Some \"quoted\" text -- with **bold** and [[Ctrl+C]]... {.lead}\n\n");
        md.push_str(":::note Heads up\nInside a *callout*.\n:::\n\n");
        md.push_str("| a | b |\n|---|---|\n| ~~c~~ | d |\n\n");
    }
    md
}

fn all_extensions() -> Markdown {
    let config = Config::from_toml_str(
        "[extensions.kbd]\nenabled = true\n\n[extensions.typographer]\nenabled = true\n\n[extensions.attributes]\nenabled = true\n",
        std::path::Path::new("."),
    )
    .unwrap();
    Markdown::new(Catalog::builtin(), config)
}

fn bench_compose(c: &mut Criterion) {
    let markdown = all_extensions();
    let parser = markdown.resolved_parser("commonmark");
    let extensions = markdown.extensions_for("commonmark");

    c.bench_function("compose_builtin_environment", |b| {
        b.iter(|| compose(&parser, &extensions));
    });
}

fn bench_convert_cached(c: &mut Criterion) {
    let markdown = all_extensions();
    let text = generate_markdown(1);

    c.bench_function("convert_cached_environment", |b| {
        b.iter(|| markdown.convert(&text));
    });
}

fn bench_convert_varying_sizes(c: &mut Criterion) {
    let markdown = all_extensions();
    let mut group = c.benchmark_group("convert_by_size");

    for sections in [5, 20, 100] {
        let text = generate_markdown(sections);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::new("sections", sections), &text, |b, text| {
            b.iter(|| markdown.convert(text));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_compose,
    bench_convert_cached,
    bench_convert_varying_sizes
);
criterion_main!(benches);
