use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use zc_csv::RowReader;

fn unquoted_csv(rows: usize) -> Vec<u8> {
    let mut data = Vec::new();

    for i in 0..rows {
        data.extend_from_slice(
            format!("{},user-{},{}.5,interaction,2017-03-0{}\n", i, i, i % 997, 1 + i % 9)
                .as_bytes(),
        );
    }

    data
}

fn quoted_csv(rows: usize) -> Vec<u8> {
    let mut data = Vec::new();

    for i in 0..rows {
        data.extend_from_slice(
            format!(
                "\"{}\",\"landy, the \"\"everlasting\"\" bastard\",\"note {} here\"\n",
                i,
                i % 113
            )
            .as_bytes(),
        );
    }

    data
}

fn count_cells(data: &[u8]) -> u64 {
    let mut reader = RowReader::from_reader(data);
    let mut cells: u64 = 0;

    while reader.read_row() {
        cells += reader.row().len() as u64;
    }

    cells
}

fn decode_cells(data: &[u8]) -> u64 {
    let mut reader = RowReader::from_reader(data);
    let mut bytes: u64 = 0;

    while reader.read_row() {
        for cell in reader.row().iter() {
            bytes += cell.decode().len() as u64;
        }
    }

    bytes
}

fn bench_read_row(c: &mut Criterion) {
    let unquoted = unquoted_csv(50_000);
    let quoted = quoted_csv(50_000);

    let mut group = c.benchmark_group("read_row");

    group.throughput(Throughput::Bytes(unquoted.len() as u64));
    group.bench_function("unquoted", |b| b.iter(|| count_cells(black_box(&unquoted))));

    group.throughput(Throughput::Bytes(quoted.len() as u64));
    group.bench_function("quoted", |b| b.iter(|| count_cells(black_box(&quoted))));

    group.throughput(Throughput::Bytes(quoted.len() as u64));
    group.bench_function("quoted_decode", |b| b.iter(|| decode_cells(black_box(&quoted))));

    group.finish();
}

criterion_group!(benches, bench_read_row);
criterion_main!(benches);
