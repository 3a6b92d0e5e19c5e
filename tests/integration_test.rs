use std::io::{Read, Seek, SeekFrom, Write};

use cryptvfs::{Image, ImageConfig, OpenDisposition};
use proptest::prelude::*;
use tempfile::tempdir;

const PAYLOAD: u64 = 4084; // B=4096 minus 12-byte block metadata

fn image(dir: &std::path::Path, name: &str, blocks: u64) -> Image {
    Image::create(dir.join(name), blocks, ImageConfig::default(), "hunter2").unwrap()
}

/// S1: first write to a fresh file produces a single, terminal block.
#[test]
fn s1_single_block_write() {
    let dir = tempdir().unwrap();
    let img = image(dir.path(), "s1.cvfs", 64);
    img.add_file("/hello.txt").unwrap();
    {
        let mut f = img.open_file("/hello.txt", OpenDisposition::overwrite()).unwrap();
        f.write_all(b"Hello, world!").unwrap();
    }
    let info = img.stat("/hello.txt").unwrap();
    assert_eq!(info.size, 13);
    assert_eq!(img.list("/").unwrap().len(), 1);
}

/// S2: a write spanning many blocks round-trips exactly and the chain
/// length matches ceil(len / payload).
#[test]
fn s2_multi_block_round_trip() {
    let dir = tempdir().unwrap();
    let img = image(dir.path(), "s2.cvfs", 64);
    img.add_file("/big.txt").unwrap();

    let pattern = b"Hello, World!";
    let data: Vec<u8> = pattern.iter().cycle().take(13 * 5000).copied().collect();
    assert_eq!(data.len(), 65000);

    {
        let mut f = img.open_file("/big.txt", OpenDisposition::overwrite()).unwrap();
        f.write_all(&data).unwrap();
    }

    let mut out = Vec::new();
    {
        let mut f = img.open_file("/big.txt", OpenDisposition::read_only()).unwrap();
        f.read_to_end(&mut out).unwrap();
    }
    assert_eq!(out, data);

    let expected_blocks = (65000u64 + PAYLOAD - 1) / PAYLOAD;
    assert_eq!(expected_blocks, 16);
    let handle = img.open_file("/big.txt", OpenDisposition::read_only()).unwrap();
    assert_eq!(handle.size(), 65000);
}

/// S3: seeking into the middle of a multi-block file lands on the right
/// bytes of the repeating pattern.
#[test]
fn s3_seek_and_partial_read() {
    let dir = tempdir().unwrap();
    let img = image(dir.path(), "s3.cvfs", 64);
    img.add_file("/big.txt").unwrap();

    let pattern = b"Hello, World!";
    let data: Vec<u8> = pattern.iter().cycle().take(13 * 5000).copied().collect();
    {
        let mut f = img.open_file("/big.txt", OpenDisposition::overwrite()).unwrap();
        f.write_all(&data).unwrap();
    }

    let mut f = img.open_file("/big.txt", OpenDisposition::read_only()).unwrap();
    f.seek(SeekFrom::Start(10)).unwrap();
    let mut buf = [0u8; 8];
    f.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"lo, Worl");
}

/// S4: appending past an existing multi-block file lands new bytes after
/// the prior end, independent of where the read cursor was left.
#[test]
fn s4_append_after_existing_data() {
    let dir = tempdir().unwrap();
    let img = image(dir.path(), "s4.cvfs", 64);
    img.add_file("/big.txt").unwrap();

    let pattern = b"Hello, World!";
    let data: Vec<u8> = pattern.iter().cycle().take(13 * 5000).copied().collect();
    {
        let mut f = img.open_file("/big.txt", OpenDisposition::overwrite()).unwrap();
        f.write_all(&data).unwrap();
    }
    {
        let mut f = img.open_file("/big.txt", OpenDisposition::write_append()).unwrap();
        f.write_all(b"appended!").unwrap();
    }

    let mut f = img.open_file("/big.txt", OpenDisposition::read_only()).unwrap();
    f.seek(SeekFrom::Start(65000)).unwrap();
    let mut buf = [0u8; 9];
    f.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"appended!");
    assert_eq!(img.stat("/big.txt").unwrap().size, 65009);
}

/// S5: recursive remove of a nested tree frees every block back to the
/// pre-creation count, and the root folder is left empty.
#[test]
fn s5_recursive_remove_restores_free_blocks() {
    let dir = tempdir().unwrap();
    let img = image(dir.path(), "s5.cvfs", 128);
    let before = img.statvfs().free_blocks;

    img.add_folder("/a").unwrap();
    img.add_file("/a/x").unwrap();
    img.add_folder("/a/b").unwrap();
    img.add_file("/a/b/y").unwrap();

    img.remove("/a", true).unwrap();

    assert!(img.list("/").unwrap().is_empty());
    assert_eq!(img.statvfs().free_blocks, before);
}

/// S6: a write that cannot fully fit reports the bytes actually written
/// and leaves the bitmap reflecting only that partial progress.
#[test]
fn s6_out_of_space_reports_partial_write() {
    let dir = tempdir().unwrap();
    let img = image(dir.path(), "s6.cvfs", 6);
    img.add_file("/f").unwrap();

    let free_before = img.statvfs().free_blocks;
    assert_eq!(free_before, 4); // 6 total - root - this file's first block

    let mut f = img.open_file("/f", OpenDisposition::write_append()).unwrap();
    // Fills the existing first block exactly (0 new blocks), then grows by
    // 2 more full blocks, leaving exactly 2 blocks free.
    f.write_all(&vec![0x41u8; PAYLOAD as usize]).unwrap();
    f.write_all(&vec![0x41u8; 2 * PAYLOAD as usize]).unwrap();
    assert_eq!(img.statvfs().free_blocks, 2);

    // A write demanding 3 new blocks can only place 2 before running out.
    let big = vec![0x42u8; 3 * PAYLOAD as usize];
    let written = std::io::Write::write(&mut f, &big).unwrap_or(0);
    assert_eq!(written as u64, 2 * PAYLOAD);
    assert_eq!(img.statvfs().free_blocks, 0);
}

#[test]
fn reopen_requires_correct_password() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("locked.cvfs");
    {
        let img = Image::create(&path, 32, ImageConfig::default(), "correct-horse").unwrap();
        img.add_file("/f").unwrap();
        img.close().unwrap();
    }
    assert!(Image::open(&path, "wrong-password").is_err());
    assert!(Image::open(&path, "correct-horse").is_ok());
}

proptest! {
    /// Property 1: round-trip bytes for arbitrary payloads.
    #[test]
    fn prop_round_trip_bytes(data in proptest::collection::vec(any::<u8>(), 0..20_000)) {
        let dir = tempdir().unwrap();
        let img = image(dir.path(), "prop_rt.cvfs", 64);
        img.add_file("/f").unwrap();
        {
            let mut f = img.open_file("/f", OpenDisposition::overwrite()).unwrap();
            f.write_all(&data).unwrap();
        }
        let mut out = Vec::new();
        let mut f = img.open_file("/f", OpenDisposition::read_only()).unwrap();
        f.read_to_end(&mut out).unwrap();
        prop_assert_eq!(out, data);
    }

    /// Property 7: truncate(0) is idempotent with respect to free space.
    #[test]
    fn prop_idempotent_truncate_zero(data in proptest::collection::vec(any::<u8>(), 1..10_000)) {
        let dir = tempdir().unwrap();
        let img = image(dir.path(), "prop_trunc.cvfs", 64);
        img.add_file("/f").unwrap();
        {
            let mut f = img.open_file("/f", OpenDisposition::overwrite()).unwrap();
            f.write_all(&data).unwrap();
        }
        img.truncate("/f", 0).unwrap();
        let free_after_first = img.statvfs().free_blocks;
        img.truncate("/f", 0).unwrap();
        prop_assert_eq!(img.statvfs().free_blocks, free_after_first);
    }
}
