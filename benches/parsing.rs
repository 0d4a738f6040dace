use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use std::io::Cursor;
use std::path::Path;

use mailchunk::config::ChunkingConfig;
use mailchunk::parser::chunker::chunk_body;
use mailchunk::parser::scanner::scan_headers;

fn synthetic_body() -> String {
    let mut body = String::new();
    for i in 0..40 {
        body.push_str(&format!(
            "Paragraph {i} has a reasonably long line of prose that will need soft wrapping at eighty columns.\n\n"
        ));
        body.push_str("On Mon, Jan 1, 2024, someone wrote:\n");
        body.push_str("> quoted text from an earlier message\n> and a second quoted line\n\n");
    }
    body.push_str("-- \nSigned\n");
    body
}

fn bench_chunk_body(c: &mut Criterion) {
    let body = synthetic_body();
    let cfg = ChunkingConfig::default();
    c.bench_function("chunk_body_synthetic", |b| {
        b.iter(|| chunk_body(black_box(&body), &cfg))
    });
}

fn bench_scan_headers(c: &mut Criterion) {
    let fixture_path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("simple.mbox");
    let data = std::fs::read(fixture_path).unwrap();

    c.bench_function("scan_headers_first_record", |b| {
        b.iter(|| {
            let mut reader = Cursor::new(black_box(&data[..]));
            scan_headers(&mut reader).unwrap()
        })
    });
}

criterion_group!(benches, bench_chunk_body, bench_scan_headers);
criterion_main!(benches);
