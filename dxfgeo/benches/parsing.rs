//! Benchmarks pour le parsing DXF

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// Génère un document DXF synthétique de `n` entités mélangées
fn synthetic_dxf(n: usize) -> String {
    let mut out = String::with_capacity(n * 96);
    out.push_str("0\nSECTION\n2\nHEADER\n9\n$EXTMIN\n10\n2600000.0\n20\n1199000.0\n0\nENDSEC\n");
    out.push_str("0\nSECTION\n2\nENTITIES\n");

    for i in 0..n {
        let x = 2_600_000.0 + (i % 1000) as f64;
        let y = 1_199_000.0 + (i / 1000) as f64;
        match i % 3 {
            0 => {
                out.push_str(&format!(
                    "0\nLINE\n8\nSite\n10\n{x:.2}\n20\n{y:.2}\n11\n{:.2}\n21\n{:.2}\n",
                    x + 10.0,
                    y + 10.0
                ));
            }
            1 => {
                out.push_str(&format!(
                    "0\nLWPOLYLINE\n8\nBuilding\n90\n4\n70\n1\n\
                     10\n{x:.2}\n20\n{y:.2}\n10\n{:.2}\n20\n{y:.2}\n\
                     10\n{:.2}\n20\n{:.2}\n10\n{x:.2}\n20\n{:.2}\n",
                    x + 5.0,
                    x + 5.0,
                    y + 5.0,
                    y + 5.0
                ));
            }
            _ => {
                out.push_str(&format!("0\nPOINT\n8\nPoints\n10\n{x:.2}\n20\n{y:.2}\n"));
            }
        }
    }

    out.push_str("0\nENDSEC\n0\nEOF\n");
    out
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    for &n in &[1_000usize, 10_000, 50_000] {
        let content = synthetic_dxf(n);
        group.throughput(Throughput::Bytes(content.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &content, |b, content| {
            b.iter(|| {
                let output =
                    dxfgeo::parse_str(black_box(content), &dxfgeo::ParseOptions::default())
                        .unwrap();
                black_box(output.features.len())
            })
        });
    }

    group.finish();
}

fn bench_reader_only(c: &mut Criterion) {
    let content = synthetic_dxf(10_000);

    let mut group = c.benchmark_group("reader");
    group.throughput(Throughput::Bytes(content.len() as u64));
    group.bench_function("read_pairs", |b| {
        b.iter(|| {
            let pairs = dxfgeo::reader::read_pairs(black_box(&content)).unwrap();
            black_box(pairs.len())
        })
    });
    group.finish();
}

criterion_group!(benches, bench_parse, bench_reader_only);
criterion_main!(benches);
