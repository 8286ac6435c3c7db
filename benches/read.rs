use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use wpconfig::{Reader, parse_program};

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for entries in [16usize, 256, 4_096] {
        let input = make_script(entries);
        group.bench_with_input(BenchmarkId::from_parameter(entries), &input, |b, input| {
            b.iter(|| parse_program(black_box(input)).expect("parse should succeed"));
        });
    }
    group.finish();
}

fn bench_read(c: &mut Criterion) {
    let reader = Reader::new();
    let mut group = c.benchmark_group("read");
    for entries in [16usize, 256, 4_096] {
        let input = make_script(entries);
        group.bench_with_input(BenchmarkId::from_parameter(entries), &input, |b, input| {
            b.iter(|| {
                reader
                    .read_source(black_box(input), "/srv/site/wp-config.php")
                    .expect("read should succeed")
            });
        });
    }
    group.finish();
}

fn make_script(entries: usize) -> String {
    let mut script = String::from("<?php\n");
    for idx in 0..entries {
        match idx % 4 {
            0 => script.push_str(&format!("define( 'SETTING_{idx}', 'value-{idx}' );\n")),
            1 => script.push_str(&format!("$setting_{idx} = {idx} * 2 + 1;\n")),
            2 => script.push_str(&format!(
                "if ( ! defined( 'GUARDED_{idx}' ) ) {{\n\tdefine( 'GUARDED_{idx}', __DIR__ . '/{idx}' );\n}}\n"
            )),
            _ => script.push_str(&format!(
                "define( 'RUNTIME_{idx}', getenv( 'RUNTIME_{idx}' ) ?: 'fallback' );\n"
            )),
        }
    }
    script
}

criterion_group!(benches, bench_parse, bench_read);
criterion_main!(benches);
