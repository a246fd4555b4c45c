use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use deviceapps_pack::{payload, Compress, ContainerReader, ContainerWriter, Device, Options, Record};
use rand::Rng;
use std::hint::black_box;

fn generate_records(count: usize) -> Vec<Record> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            Record::new()
                .device(
                    Device::new()
                        .id(format!("{:032x}", rng.gen::<u128>()))
                        .kind(["idfa", "gaid", "adid"][rng.gen_range(0..3)]),
                )
                .latitude(rng.gen_range(-90.0..90.0))
                .longitude(rng.gen_range(-180.0..180.0))
                .apps((0..rng.gen_range(0..50)).map(|_| rng.gen_range(0..10_000)))
        })
        .collect()
}

fn bench_payload(c: &mut Criterion) {
    let records = generate_records(10_000);
    let bytes: usize = records.iter().map(payload::encoded_len).sum();
    let encoded: Vec<Vec<u8>> = records.iter().map(payload::encode).collect();

    let mut group = c.benchmark_group("payload");
    group.throughput(Throughput::Bytes(bytes as u64));
    group.bench_function("encode", |b| {
        let mut buf = Vec::with_capacity(bytes);
        b.iter(|| {
            buf.clear();
            for rec in black_box(&records) {
                payload::encode_into(rec, &mut buf);
            }
        });
    });
    group.bench_function("decode", |b| {
        b.iter(|| {
            for data in black_box(&encoded) {
                payload::decode(data).unwrap();
            }
        });
    });
    group.finish();
}

fn bench_container(c: &mut Criterion) {
    let records = generate_records(10_000);

    let mut group = c.benchmark_group("container");
    for (name, compress) in [("plain", Compress::None), ("zstd_3", Compress::new_zstd(3))] {
        let opts = Options::new().compress(compress);
        let mut writer = ContainerWriter::with_options(Vec::new(), &opts).unwrap();
        for rec in &records {
            writer.write_record(rec).unwrap();
        }
        group.throughput(Throughput::Bytes(writer.bytes_written()));
        let container = writer.into_inner().unwrap();
        println!("{}: {} bytes on disk", name, container.len());

        group.bench_function(format!("write_{}", name), |b| {
            b.iter(|| {
                let mut writer = ContainerWriter::with_options(Vec::new(), &opts).unwrap();
                for rec in black_box(&records) {
                    writer.write_record(rec).unwrap();
                }
                writer.into_inner().unwrap()
            });
        });
        group.bench_function(format!("read_{}", name), |b| {
            b.iter(|| {
                let reader = ContainerReader::with_options(black_box(&container[..]), &opts);
                reader.records().map(|r| r.unwrap()).count()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_payload, bench_container);
criterion_main!(benches);
