//! End-to-end sharing: files written on one side appear on the other, and
//! the image bytes the device sees stay a valid RT-11 volume throughout.

#![allow(clippy::arithmetic_side_effects)]

mod common;

use std::fs;

use common::{ShareHarness, SMALL_BLOCKS, blank, image_with, mscp, parse_bytes};
use decshare_image::DriveType;
use decshare_rt11::BLOCK_SIZE;

#[test]
fn test_dec_file_round_trips_through_host() {
    let h = ShareHarness::new(blank(&mscp(SMALL_BLOCKS)), mscp(SMALL_BLOCKS));
    h.volume.format().unwrap();
    assert_eq!(h.free_blocks(), 10);

    let data: Vec<u8> = (0..1536u32).map(|i| (i % 251) as u8).collect();
    h.volume.write_file("TEST.TXT", data.clone()).unwrap();
    h.volume.tick_now().unwrap();
    assert_eq!(h.host_names(), ["TEST.TXT"]);
    assert_eq!(fs::read(h.path("TEST.TXT")).unwrap(), data);
    assert_eq!(h.free_blocks(), 7);

    fs::remove_file(h.path("TEST.TXT")).unwrap();
    assert!(h.tick_until(|h| h.volume.with_dec(|d| d.file("TEST.TXT").is_none()).unwrap()));
    assert_eq!(h.free_blocks(), 10);

    // The rendered image agrees with the in-memory view.
    let reparsed = parse_bytes(&h.layout, h.image_bytes());
    assert!(reparsed.fault().is_none());
    assert!(reparsed.file("TEST.TXT").is_none());
    assert_eq!(reparsed.free_blocks(), 10);
}

#[test]
fn test_host_file_lands_in_image_bytes() {
    let layout = mscp(64);
    let h = ShareHarness::new(image_with(&layout, &[]), layout);
    h.volume.tick_now().unwrap();

    let data = vec![0o125; 3 * BLOCK_SIZE + 17];
    fs::write(h.path("PROG.SAV"), &data).unwrap();
    assert!(h.tick_until(|h| h.volume.with_dec(|d| d.file("PROG.SAV").is_some()).unwrap()));

    let reparsed = parse_bytes(&h.layout, h.image_bytes());
    let file = reparsed.file("PROG.SAV").unwrap();
    // RT-11 files are whole blocks.
    assert_eq!(file.data.size, 4 * BLOCK_SIZE);
    assert_eq!(&file.data.data[..data.len()], data.as_slice());
}

#[test]
fn test_interleaved_floppy_round_trip() {
    let layout = DriveType::Rx01.layout(BLOCK_SIZE, None);
    let h = ShareHarness::new(blank(&layout), layout);
    h.volume.format().unwrap();
    let empty = h.free_blocks();

    let data: Vec<u8> = (0..5 * BLOCK_SIZE).map(|i| (i % 256) as u8).collect();
    h.volume.write_file("FLOPPY.DAT", data.clone()).unwrap();
    h.volume.tick_now().unwrap();
    assert_eq!(fs::read(h.path("FLOPPY.DAT")).unwrap(), data);
    assert_eq!(h.free_blocks(), empty - 5);

    // A fresh mapper over the raw bytes finds the same file.
    let reparsed = parse_bytes(&h.layout, h.image_bytes());
    assert_eq!(reparsed.file("FLOPPY.DAT").unwrap().data.data, data);

    // Track 0 is outside the filesystem and stays untouched.
    assert!(h.image_bytes()[..26 * 128].iter().all(|b| *b == 0));
}

#[test]
fn test_device_writes_reach_host() {
    let layout = mscp(SMALL_BLOCKS);
    let h = ShareHarness::new(image_with(&layout, &[]), mscp(SMALL_BLOCKS));
    h.volume.tick_now().unwrap();
    assert!(h.host_names().is_empty());

    // The emulated machine rewrites the whole volume block by block.
    let staged = image_with(&layout, &[("DEVICE.TXT", b"written by the guest")]).into_bytes();
    for (index, bytes) in staged.chunks(BLOCK_SIZE).enumerate() {
        h.volume.write(bytes, (index * BLOCK_SIZE) as u64).unwrap();
    }
    assert!(h.tick_until(|h| h.host_names() == ["DEVICE.TXT"]));
    let host = fs::read(h.path("DEVICE.TXT")).unwrap();
    assert_eq!(&host[..20], b"written by the guest");
}

#[test]
fn test_free_space_accounting_across_changes() {
    let layout = mscp(SMALL_BLOCKS);
    let h = ShareHarness::new(image_with(&layout, &[]), mscp(SMALL_BLOCKS));
    h.volume.write_file("A.DAT", vec![1; 2 * BLOCK_SIZE]).unwrap();
    h.volume.write_file("B.DAT", vec![2; 3 * BLOCK_SIZE]).unwrap();
    assert_eq!(h.free_blocks(), 5);
    assert!(h.volume.delete_file("A.DAT").unwrap());
    assert_eq!(h.free_blocks(), 7);
    assert!(!h.volume.delete_file("A.DAT").unwrap());

    h.volume.tick_now().unwrap();
    assert_eq!(h.host_names(), ["B.DAT"]);
    assert_eq!(parse_bytes(&h.layout, h.image_bytes()).free_blocks(), 7);
}

#[test]
fn test_capacity_overflow_is_rejected() {
    let layout = mscp(SMALL_BLOCKS);
    let h = ShareHarness::new(image_with(&layout, &[]), mscp(SMALL_BLOCKS));
    assert!(h.volume.write_file("BIG.DAT", vec![0; 11 * BLOCK_SIZE]).is_err());
    assert!(h.volume.with_dec(|d| d.file("BIG.DAT").is_none()).unwrap());
    assert_eq!(h.free_blocks(), 10);
}
