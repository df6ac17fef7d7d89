//! Benchmarks for blocklist domain lookup.
//!
//! Measures how quickly a query name can be classified.

use criterion::{BenchmarkId, Criterion, Throughput, black_box};

use sinkhole::filter::{Blocklist, canonicalize};

fn sample_blocklist() -> Blocklist {
    let entries: Vec<String> = (0..10_000).map(|i| format!("ads{i}.example.com")).collect();
    Blocklist::from_lines(entries)
}

fn bench_contains(c: &mut Criterion) {
    let blocklist = sample_blocklist();

    let mut group = c.benchmark_group("blocklist");

    group.throughput(Throughput::Elements(1));
    group.bench_function(BenchmarkId::new("contains", "hit"), |b| {
        b.iter(|| blocklist.contains(black_box("ads42.example.com")))
    });

    group.bench_function(BenchmarkId::new("contains", "miss"), |b| {
        b.iter(|| blocklist.contains(black_box("www.google.com")))
    });

    // Lookup as the resolver performs it: canonicalize, then match.
    group.bench_function(BenchmarkId::new("contains", "canonicalized_hit"), |b| {
        b.iter(|| {
            let name = canonicalize(black_box("ADS42.Example.Com.")).unwrap();
            blocklist.contains(&name)
        })
    });

    group.finish();
}

fn main() {
    let mut criterion = Criterion::default().configure_from_args();
    bench_contains(&mut criterion);
    criterion.final_summary();
}
