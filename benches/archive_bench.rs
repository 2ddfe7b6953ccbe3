use cdflow2_config_common::release::{
    build_archive, extract_archive, sha256_hex, MemoryStore,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn make_release(root: &Path, file_count: usize, plugin_count: usize) {
    fs::create_dir_all(root.join("modules")).unwrap();
    for i in 0..file_count {
        fs::write(
            root.join(format!("modules/file{}.tf", i)),
            format!("resource \"null_resource\" \"r{}\" {{}}\n", i).repeat(20),
        )
        .unwrap();
    }

    let plugins = root.join(".terraform/plugins/linux_amd64");
    fs::create_dir_all(&plugins).unwrap();
    for i in 0..plugin_count {
        fs::write(
            plugins.join(format!("terraform-provider-{}", i)),
            vec![i as u8; 4 * 1024 * 1024],
        )
        .unwrap();
    }
}

fn bench_build_archive(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_archive");
    group.sample_size(10);

    for plugin_count in [0, 4, 16].iter() {
        let src = TempDir::new().unwrap();
        make_release(src.path(), 200, *plugin_count);

        group.bench_with_input(
            BenchmarkId::from_parameter(plugin_count),
            plugin_count,
            |b, _| {
                b.iter(|| {
                    let store = MemoryStore::new();
                    let mut archive = Vec::new();
                    build_archive(
                        &mut archive,
                        black_box(src.path()),
                        "svc",
                        "1",
                        "img",
                        &store,
                    )
                    .unwrap();
                    archive
                });
            },
        );
    }
    group.finish();
}

fn bench_extract_archive(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract_archive");
    group.sample_size(10);

    for plugin_count in [0, 4, 16].iter() {
        let src = TempDir::new().unwrap();
        make_release(src.path(), 200, *plugin_count);

        let store = MemoryStore::new();
        let mut archive = Vec::new();
        build_archive(&mut archive, src.path(), "svc", "1", "img", &store).unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(plugin_count),
            plugin_count,
            |b, _| {
                b.iter(|| {
                    let dest = TempDir::new().unwrap();
                    extract_archive(
                        &mut black_box(archive.as_slice()),
                        dest.path(),
                        "svc",
                        "1",
                        &store,
                    )
                    .unwrap()
                });
            },
        );
    }
    group.finish();
}

fn bench_sha256(c: &mut Criterion) {
    let mut group = c.benchmark_group("sha256_hex");

    for size in [64 * 1024, 1024 * 1024, 16 * 1024 * 1024].iter() {
        let data = vec![0xabu8; *size];
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| sha256_hex(&mut black_box(data.as_slice())).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build_archive, bench_extract_archive, bench_sha256);
criterion_main!(benches);
