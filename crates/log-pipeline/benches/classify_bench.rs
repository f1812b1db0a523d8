//! 분류/추출 벤치마크
//!
//! 라인당 레벨 분류와 메타데이터 추출 비용을 측정합니다.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use opshub_core::types::SourceKind;
use opshub_log_pipeline::{classify, extract};

/// (이름, 라인)
const LINES: &[(&str, &str)] = &[
    ("error_first", "ERROR: connection refused while contacting upstream"),
    ("success_last", "request to /health finished and everything is ok"),
    (
        "no_match",
        "listening on 0.0.0.0:8080 with 4 worker threads and keepalive 75s",
    ),
    (
        "long_info",
        "GET /static/js/app.9f8e7d.js 200 1532 bytes in 0.42 ms client=10.0.0.12 agent=Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 referer=https://webui.local/chat/3a8f",
    ),
];

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");
    group.throughput(Throughput::Elements(1));

    for (name, line) in LINES {
        group.bench_with_input(BenchmarkId::from_parameter(name), line, |b, line| {
            b.iter(|| classify(black_box(line)))
        });
    }

    group.finish();
}

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract");
    group.throughput(Throughput::Elements(1));

    let cases = [
        (SourceKind::OpenWebUi, "POST /api/chat user alice logged in model: llama3"),
        (SourceKind::Ollama, "generating for model: mistral on GPU 0 at 87%"),
        (SourceKind::Generic, "user alice logged in"),
    ];
    for (kind, line) in cases {
        group.bench_with_input(BenchmarkId::from_parameter(kind), &line, |b, line| {
            b.iter(|| extract(black_box(kind), black_box(line)))
        });
    }

    group.finish();
}

fn bench_mixed_batch(c: &mut Criterion) {
    let batch: Vec<&str> = LINES.iter().map(|(_, l)| *l).cycle().take(1000).collect();

    let mut group = c.benchmark_group("mixed_batch");
    group.throughput(Throughput::Elements(batch.len() as u64));
    group.bench_function("classify_and_extract_1000", |b| {
        b.iter(|| {
            for line in &batch {
                let level = classify(black_box(line));
                let meta = extract(SourceKind::OpenWebUi, black_box(line));
                black_box((level, meta));
            }
        })
    });
    group.finish();
}

criterion_group!(benches, bench_classify, bench_extract, bench_mixed_batch);
criterion_main!(benches);
