//! Benchmarks for pv-export
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn benchmark_btsf_append(c: &mut Criterion) {
    use pv_export::btsf::{BinaryTimeSeriesFile, Metric, MetricType};

    c.bench_function("btsf_append_double", |b| {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.btsf");
        let mut file = BinaryTimeSeriesFile::create(
            &path,
            vec![Metric::time(), Metric::new("BENCH:PV", MetricType::Double)],
            vec![],
        )
        .unwrap();
        let mut time = 1_700_000_000.0;

        b.iter(|| {
            time += 0.001;
            file.append(black_box(time), black_box(1.5f64)).unwrap();
        })
    });
}

fn benchmark_selector(c: &mut Criterion) {
    use pv_export::export::PvSelector;

    let selector = PvSelector::new(
        &["SR:".to_string(), "BR:".to_string()],
        &[".*:Spare".to_string(), "SR:C0[1-3]".to_string()],
    )
    .unwrap();

    c.bench_function("selector_matches", |b| {
        b.iter(|| {
            black_box(selector.matches(black_box("SR:C07:BPM3:X")));
            black_box(selector.matches(black_box("LI:Gun:Voltage")));
        })
    });
}

fn benchmark_pv_paths(c: &mut Criterion) {
    use pv_export::export::task::{check_pv_name, target_path};
    use std::path::Path;

    c.bench_function("pv_name_to_path", |b| {
        let root = Path::new("/data/btsf");
        b.iter(|| {
            let name = black_box("SR:C07:BPM3:X");
            black_box(check_pv_name(name));
            black_box(target_path(root, name));
        })
    });
}

criterion_group!(benches, benchmark_btsf_append, benchmark_selector, benchmark_pv_paths);
criterion_main!(benches);
