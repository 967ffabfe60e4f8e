//! Sharing damaged or unformatted volumes.

#![allow(clippy::arithmetic_side_effects)]

mod common;

use std::fs;

use common::{ShareHarness, SMALL_BLOCKS, blank, image_with, mscp};
use decshare_image::{DriveType, MemoryImage, Partition};
use decshare_rt11::BLOCK_SIZE;
use decshare_rt11::home::HOME_BLOCK;

/// Byte offset of the checksum word inside the home block.
const CHECKSUM: usize = 0o776;

fn edit_home_block(image: &mut MemoryImage, edit: impl FnOnce(&mut [u8])) {
    let layout = mscp(SMALL_BLOCKS);
    let partition = Partition::from_spec(&layout.filesystem, BLOCK_SIZE).unwrap();
    let mut home = partition.get_blocks(image, HOME_BLOCK, 1).unwrap();
    edit(&mut home);
    partition.set_blocks(image, HOME_BLOCK, &home).unwrap();
}

#[test]
fn test_zero_image_is_empty_and_clean() {
    let h = ShareHarness::new(blank(&mscp(SMALL_BLOCKS)), mscp(SMALL_BLOCKS));
    h.volume.tick_now().unwrap();
    h.volume
        .with_dec(|d| {
            assert!(d.fault().is_none());
            assert!(!d.is_formatted());
            assert_eq!(d.user_files().count(), 0);
        })
        .unwrap();
    assert!(h.host_names().is_empty());
}

#[test]
fn test_host_file_formats_zero_image() {
    let h = ShareHarness::new(blank(&mscp(SMALL_BLOCKS)), mscp(SMALL_BLOCKS));
    fs::write(h.path("FIRST.TXT"), b"first file").unwrap();
    assert!(h.tick_until(|h| h.volume.with_dec(|d| d.file("FIRST.TXT").is_some()).unwrap()));
    assert!(h.volume.with_dec(|d| d.is_formatted()).unwrap());
    assert_eq!(h.free_blocks(), 9);
}

#[test]
fn test_zero_checksum_is_accepted() {
    let layout = mscp(SMALL_BLOCKS);
    let mut image = image_with(&layout, &[("KEEP.TXT", b"still here")]);
    edit_home_block(&mut image, |home| {
        home[CHECKSUM] = 0;
        home[CHECKSUM + 1] = 0;
    });

    let h = ShareHarness::new(image, layout);
    assert!(h.volume.with_dec(|d| d.fault().is_none()).unwrap());
    h.volume.tick_now().unwrap();
    assert_eq!(h.host_names(), ["KEEP.TXT"]);
}

#[test]
fn test_checksum_mismatch_blocks_host_changes() {
    let layout = mscp(SMALL_BLOCKS);
    let mut image = image_with(&layout, &[("KEEP.TXT", b"still here")]);
    edit_home_block(&mut image, |home| home[0o731] ^= 0x40);
    let before = image.as_bytes().to_vec();

    let h = ShareHarness::new(image, layout);
    let fault = h.volume.with_dec(|d| d.fault().map(str::to_owned)).unwrap();
    assert!(fault.unwrap().contains("checksum"));

    fs::write(h.path("NEW.TXT"), b"must not be written").unwrap();
    h.settle_ticks(10);
    assert!(h.volume.with_dec(|d| d.file("NEW.TXT").is_none()).unwrap());
    assert_eq!(h.image_bytes(), before);
}

#[test]
fn test_bad_sector_table_initialized() {
    let layout = DriveType::Rl01.layout(BLOCK_SIZE, None);
    let spec = layout.bad_sector.clone().unwrap();
    let h = ShareHarness::new(blank(&layout), layout);

    let mut table = vec![0; usize::try_from(spec.size).unwrap()];
    h.volume.read(&mut table, spec.offset).unwrap();
    assert!(table.iter().any(|b| *b != 0));

    // The table lives outside the RT-11 partition.
    h.volume.format().unwrap();
    let mut after = vec![0; table.len()];
    h.volume.read(&mut after, spec.offset).unwrap();
    assert_eq!(after, table);
}

#[test]
fn test_close_flushes_pending_changes() {
    let layout = mscp(SMALL_BLOCKS);
    let h = ShareHarness::new(image_with(&layout, &[]), layout);
    h.volume.write_file("LAST.TXT", b"written before close".to_vec()).unwrap();

    let (volume, share) = h.into_parts();
    volume.close().unwrap();
    assert_eq!(
        fs::read(share.path().join("LAST.TXT")).unwrap(),
        b"written before close"
    );
}
