//! Changes applied to one side must not bounce back from the other.

#![allow(clippy::arithmetic_side_effects)]

mod common;

use std::fs;
use std::time::{Duration, Instant};

use common::{ShareHarness, SMALL_BLOCKS, image_with, mscp};
use decshare_rt11::BLOCK_SIZE;
use decshare_sync::TickReport;

fn total(reports: &[TickReport]) -> TickReport {
    reports.iter().fold(TickReport::default(), |sum, r| TickReport {
        host_changes: sum.host_changes + r.host_changes,
        imported: sum.imported + r.imported,
        rendered: sum.rendered || r.rendered,
        dec_events: sum.dec_events + r.dec_events,
        exported: sum.exported + r.exported,
    })
}

fn ticks(h: &ShareHarness, count: usize) -> Vec<TickReport> {
    (0..count)
        .map(|_| {
            std::thread::sleep(Duration::from_millis(20));
            h.volume.tick_now().unwrap()
        })
        .collect()
}

#[test]
fn test_exported_files_are_not_reimported() {
    let layout = mscp(SMALL_BLOCKS);
    let h = ShareHarness::new(image_with(&layout, &[]), layout);
    h.volume.write_file("ONE.TXT", vec![1; 100]).unwrap();
    h.volume.write_file("TWO.TXT", vec![2; 700]).unwrap();
    assert_eq!(h.volume.tick_now().unwrap().exported, 2);

    let after = total(&ticks(&h, 10));
    assert_eq!(after.imported, 0);
    assert_eq!(after.exported, 0);
    assert_eq!(h.host_names(), ["ONE.TXT", "TWO.TXT"]);
}

#[test]
fn test_imported_files_are_not_reexported() {
    let layout = mscp(SMALL_BLOCKS);
    let h = ShareHarness::new(image_with(&layout, &[]), layout);
    h.volume.tick_now().unwrap();

    fs::write(h.path("HOST.TXT"), vec![3; BLOCK_SIZE]).unwrap();
    let mut reports = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline && total(&reports).imported == 0 {
        reports.extend(ticks(&h, 1));
    }
    reports.extend(ticks(&h, 10));

    let sum = total(&reports);
    assert_eq!(sum.imported, 1);
    assert!(sum.rendered);
    assert_eq!(sum.exported, 0);
}

#[test]
fn test_dec_rewrite_after_export_is_exported_again() {
    let layout = mscp(SMALL_BLOCKS);
    let h = ShareHarness::new(image_with(&layout, &[]), layout);
    h.volume.write_file("DATA.TXT", b"first".to_vec()).unwrap();
    h.volume.tick_now().unwrap();
    ticks(&h, 5);

    // Acks are gone once the echo was swallowed.
    h.volume.write_file("DATA.TXT", b"second".to_vec()).unwrap();
    assert!(h.tick_until(|h| {
        fs::read(h.path("DATA.TXT")).is_ok_and(|d| d.starts_with(b"second"))
    }));
}

#[test]
fn test_settle_window_defers_host_import() {
    let layout = mscp(SMALL_BLOCKS);
    let h = ShareHarness::with_settle(image_with(&layout, &[]), layout, Duration::from_secs(2));
    h.clock.advance(Duration::from_secs(3));
    h.volume.tick_now().unwrap();

    fs::write(h.path("SLOW.TXT"), b"still writing").unwrap();
    let early = total(&ticks(&h, 10));
    assert_eq!(early.imported, 0);
    assert!(early.host_changes > 0);

    h.clock.advance(Duration::from_secs(3));
    assert!(h.tick_until(|h| h.volume.with_dec(|d| d.file("SLOW.TXT").is_some()).unwrap()));
}
