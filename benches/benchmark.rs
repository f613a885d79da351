use autoflow_runtime::download_log::{parse_datetime, DownloadLog, DownloadLogEntry};
use autoflow_runtime::utils::{format_bytes, sanitize_filename, validate_url};
use autoflow_runtime::variables::VariableStore;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::HashMap;
use std::time::Duration;

fn configure_fast_group(group: &mut criterion::BenchmarkGroup<criterion::measurement::WallTime>) {
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_millis(500));
    group.sample_size(20);
}

fn benchmark_variable_substitution(c: &mut Criterion) {
    let mut group = c.benchmark_group("variable_substitution");
    configure_fast_group(&mut group);

    let mut vars = HashMap::new();
    vars.insert("name".to_string(), autoflow_runtime::variables::Value::String("automation".to_string()));
    vars.insert("count".to_string(), autoflow_runtime::variables::Value::Number(42.0));
    let store = VariableStore::from_map(vars);

    group.bench_function("substitute", |b| {
        b.iter(|| {
            let result = store.substitute("Hello ${name}, run #${count || 0} with ${missing || default}");
            black_box(result);
        });
    });

    group.finish();
}

fn benchmark_download_log_duplicate_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("download_log");
    configure_fast_group(&mut group);

    let dir = tempfile::tempdir().unwrap();
    let mut log = DownloadLog::load(dir.path().join("log.txt")).unwrap();
    for i in 0..200 {
        log.insert(DownloadLogEntry {
            file_id: "#999999999".to_string(),
            creation_time: format!("{:02} Sep 2025 12:00:00", (i % 28) + 1),
            prompt: format!("prompt number {i}"),
            download_timestamp: None,
            file_path: None,
        })
        .unwrap();
    }

    group.bench_function("is_duplicate", |b| {
        b.iter(|| {
            let result = log.is_duplicate("15 Sep 2025 12:00:00", "prompt number 100");
            black_box(result);
        });
    });

    group.finish();
}

fn benchmark_datetime_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("datetime_parse");
    configure_fast_group(&mut group);

    group.bench_function("parse_datetime", |b| {
        b.iter(|| {
            let result = parse_datetime("03 Sep 2025 12:00:00");
            black_box(result);
        });
    });

    group.finish();
}

fn benchmark_url_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("url_validation");
    configure_fast_group(&mut group);

    let test_urls = ["https://example.com", "http://example.com/path", "invalid-url"];

    group.bench_function("validate", |b| {
        b.iter(|| {
            for url in &test_urls {
                let result = validate_url(url);
                let _ = black_box(result);
            }
        });
    });

    group.finish();
}

fn benchmark_filename_sanitization(c: &mut Criterion) {
    let mut group = c.benchmark_group("filename_sanitization");
    configure_fast_group(&mut group);

    let test_filenames = ["normal_file.txt", "file with spaces.txt", "weird:name*.png"];

    group.bench_function("sanitize", |b| {
        b.iter(|| {
            for name in &test_filenames {
                let result = sanitize_filename(name);
                black_box(result);
            }
        });
    });

    group.finish();
}

fn benchmark_format_bytes(c: &mut Criterion) {
    let mut group = c.benchmark_group("format_utilities");
    configure_fast_group(&mut group);

    group.bench_function("format_bytes", |b| {
        b.iter(|| {
            let result = format_bytes(1_572_864);
            black_box(result);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_variable_substitution,
    benchmark_download_log_duplicate_check,
    benchmark_datetime_parse,
    benchmark_url_validation,
    benchmark_filename_sanitization,
    benchmark_format_bytes,
);
criterion_main!(benches);
