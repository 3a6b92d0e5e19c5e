use criterion::{black_box, criterion_group, criterion_main, Criterion};
use cryptvfs::{Image, ImageConfig, OpenDisposition};
use std::io::{Read, Seek, SeekFrom, Write};
use tempfile::tempdir;

fn bench_sequential_write(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let img = Image::create(dir.path().join("bench_write.cvfs"), 4096, ImageConfig::default(), "pw").unwrap();
    img.add_file("/f").unwrap();
    let data = vec![0xABu8; 1024 * 1024];

    c.bench_function("sequential_write_1mb", |b| {
        b.iter(|| {
            let mut f = img.open_file("/f", OpenDisposition::overwrite()).unwrap();
            f.write_all(black_box(&data)).unwrap();
        })
    });
}

fn bench_sequential_read(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let img = Image::create(dir.path().join("bench_read.cvfs"), 4096, ImageConfig::default(), "pw").unwrap();
    img.add_file("/f").unwrap();
    let data = vec![0xCDu8; 1024 * 1024];
    {
        let mut f = img.open_file("/f", OpenDisposition::overwrite()).unwrap();
        f.write_all(&data).unwrap();
    }

    c.bench_function("sequential_read_1mb", |b| {
        b.iter(|| {
            let mut f = img.open_file("/f", OpenDisposition::read_only()).unwrap();
            let mut out = Vec::with_capacity(data.len());
            f.read_to_end(&mut out).unwrap();
            black_box(out);
        })
    });
}

fn bench_random_seek_read(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let img = Image::create(dir.path().join("bench_seek.cvfs"), 4096, ImageConfig::default(), "pw").unwrap();
    img.add_file("/f").unwrap();
    let data = vec![0xEFu8; 1024 * 1024];
    {
        let mut f = img.open_file("/f", OpenDisposition::overwrite()).unwrap();
        f.write_all(&data).unwrap();
    }
    let mut f = img.open_file("/f", OpenDisposition::read_only()).unwrap();

    c.bench_function("random_seek_and_read_4k", |b| {
        b.iter(|| {
            f.seek(SeekFrom::Start(512 * 1024)).unwrap();
            let mut buf = [0u8; 4096];
            f.read_exact(black_box(&mut buf)).unwrap();
        })
    });
}

criterion_group!(benches, bench_sequential_write, bench_sequential_read, bench_random_seek_read);
criterion_main!(benches);
