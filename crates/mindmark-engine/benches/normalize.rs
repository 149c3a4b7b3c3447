use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use mindmark_engine::parsing::{normalize, normalize_fence_lang, scan_fences};
mod common;

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    group.sample_size(20);

    for size in [10, 100, 1000] {
        let content = common::generate_loose_markdown(size);
        group.bench_with_input(BenchmarkId::new("loose", size), &content, |b, content| {
            b.iter(|| std::hint::black_box(normalize(std::hint::black_box(content))));
        });
    }

    let wrapped = common::generate_wrapped_markdown(100);
    group.bench_function("container_wrapped", |b| {
        b.iter(|| std::hint::black_box(normalize(std::hint::black_box(&wrapped))));
    });

    group.finish();
}

fn bench_fences(c: &mut Criterion) {
    let mut group = c.benchmark_group("fences");
    let content = normalize(&common::generate_loose_markdown(100));

    group.bench_function("scan", |b| {
        b.iter(|| std::hint::black_box(scan_fences(std::hint::black_box(&content))));
    });
    group.bench_function("fence_lang", |b| {
        b.iter(|| std::hint::black_box(normalize_fence_lang(std::hint::black_box(&content))));
    });

    group.finish();
}

criterion_group!(benches, bench_normalize, bench_fences);
criterion_main!(benches);
