//! Criterion benchmarks for rust_ark

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rust_ark::core::{MemoryCache, NoopCache, Placeholder, ViewCache, ViewKind};
use rust_ark::prelude::*;
use std::sync::Arc;

// ============================================================================
// Placeholder Rewriting Benchmarks
// ============================================================================

fn bench_placeholder_rewrite(c: &mut Criterion) {
    let mut group = c.benchmark_group("placeholder_rewrite");

    for params in [1usize, 10, 100].iter() {
        let sql = format!(
            "SELECT * FROM users WHERE {}",
            vec!["id = ?"; *params].join(" OR ")
        );
        group.throughput(Throughput::Elements(*params as u64));

        group.bench_with_input(BenchmarkId::new("dollar", params), &sql, |b, sql| {
            b.iter(|| black_box(Placeholder::DOLLAR.rewrite(black_box(sql)).len()));
        });

        group.bench_with_input(BenchmarkId::new("native", params), &sql, |b, sql| {
            b.iter(|| black_box(Placeholder::QUESTION.rewrite(black_box(sql)).len()));
        });
    }

    group.finish();
}

// ============================================================================
// Query Rendering Benchmarks
// ============================================================================

fn sample_options() -> QueryOptions {
    QueryOptions::new()
        .fields(&["id", "name", "email"])
        .where_eq("status", "active")
        .where_gt("age", 18i64)
        .where_in("role", vec!["admin", "editor", "viewer"])
        .order_by_desc("created_at")
        .limit(50)
        .offset(100)
}

fn bench_query_options(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_options");
    let options = sample_options();

    group.bench_function("fingerprint", |b| {
        b.iter(|| black_box(options.fingerprint(ViewKind::List, black_box("users"))));
    });

    group.bench_function("select_sql", |b| {
        b.iter(|| black_box(options.select_sql(black_box("users"))));
    });

    group.finish();
}

// ============================================================================
// View Cache Benchmarks
// ============================================================================

fn sample_rows(count: usize) -> Arc<DatabaseResult> {
    let rows = (0..count)
        .map(|i| {
            let mut row = DatabaseRow::new();
            row.insert("id".to_string(), DatabaseValue::Long(i as i64));
            row.insert("name".to_string(), DatabaseValue::String(format!("user{}", i)));
            row
        })
        .collect();
    Arc::new(rows)
}

fn bench_view_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("view_cache");
    let rows = sample_rows(10);

    for entries in [100usize, 10_000].iter() {
        let cache = MemoryCache::new();
        let keys: Vec<Vec<u8>> = (0..*entries)
            .map(|i| {
                QueryOptions::new()
                    .where_eq("id", i as i64)
                    .fingerprint(ViewKind::Get, "users")
            })
            .collect();
        for key in &keys {
            cache.put(key.clone(), Arc::clone(&rows));
        }

        group.bench_with_input(BenchmarkId::new("get_hit", entries), &keys, |b, keys| {
            let mut i = 0;
            b.iter(|| {
                i = (i + 1) % keys.len();
                black_box(cache.get(&keys[i]))
            });
        });
    }

    group.bench_function("get_miss", |b| {
        let cache = MemoryCache::new();
        let key = sample_options().fingerprint(ViewKind::List, "users");
        b.iter(|| black_box(cache.get(black_box(&key))));
    });

    group.bench_function("put_noop", |b| {
        let cache = NoopCache;
        let key = sample_options().fingerprint(ViewKind::List, "users");
        b.iter(|| cache.put(key.clone(), Arc::clone(&rows)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_placeholder_rewrite,
    bench_query_options,
    bench_view_cache
);
criterion_main!(benches);
