use criterion::{
    BenchmarkId,
    criterion_group,
    criterion_main,
    Criterion,
    Throughput,
};

use bevy_progressive_points::{
    io::ply::{decode_ply, gzip, write_ascii_ply},
    random_points,
    sample,
};


const POINT_COUNTS: [usize; 3] = [
    1000,
    10000,
    250_000,
];

fn ply_decode_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode ply tiers");
    for count in POINT_COUNTS.iter() {
        let text = write_ascii_ply(&random_points(*count, 7));
        let compressed = gzip(text.as_bytes()).unwrap();

        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("ascii", count),
            &text,
            |b, text| b.iter(|| decode_ply(text.as_bytes())),
        );
        group.bench_with_input(
            BenchmarkId::new("gzip", count),
            &compressed,
            |b, compressed| b.iter(|| decode_ply(compressed)),
        );
    }
}

fn sample_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("sample point buffers");
    for count in POINT_COUNTS.iter() {
        let cloud = random_points(*count, 7);

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(
            BenchmarkId::new("quarter", count),
            &cloud,
            |b, cloud| b.iter(|| sample(cloud, 0.25).into_owned()),
        );
    }
}

criterion_group!{
    name = io_benches;
    config = Criterion::default().sample_size(10);
    targets = ply_decode_benchmark, sample_benchmark
}
criterion_main!(io_benches);
