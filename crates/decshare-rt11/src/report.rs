use std::fmt::Write as _;

use chrono::{Datelike, NaiveDate};

use crate::filesystem::Rt11Filesystem;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// RT-11 style `dd-Mmm-yy` date.
#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    let month = MONTHS.get(date.month0() as usize).copied().unwrap_or("???");
    format!("{:02}-{month}-{:02}", date.day(), date.year().rem_euclid(100))
}

/// Text of `$VOLUM.INF`.
#[must_use]
pub fn volume_info(fs: &Rt11Filesystem) -> String {
    let mut out = String::from("RT-11 volume information\n\n");
    let Some(home) = fs.home() else {
        let _ = writeln!(out, "Volume is not formatted ({} blocks)", fs.block_count());
        return out;
    };
    let _ = writeln!(out, "Volume id      : {}", home.volume_id);
    let _ = writeln!(out, "Owner name     : {}", home.owner_name);
    let _ = writeln!(out, "System id      : {}", home.system_id);
    let _ = writeln!(out, "System version : {}", home.system_version);
    let _ = writeln!(out, "Pack cluster   : {}", home.pack_cluster_size);
    let _ = writeln!(out, "Total blocks   : {}", fs.block_count());
    if let Some(layout) = fs.layout() {
        let _ = writeln!(
            out,
            "Directory      : {} segments, {} in use, {} entries each, {} extra bytes",
            layout.total_segments,
            layout.used_segments,
            layout.entries_per_segment,
            layout.extra_bytes
        );
        let _ = writeln!(out, "Files          : {}", layout.file_count);
        let _ = writeln!(out, "Used blocks    : {}", layout.used_blocks);
        let _ = writeln!(out, "Free blocks    : {}", layout.free_blocks);
    }
    if fs.tentative_blocks() > 0 {
        let _ = writeln!(out, "Tentative      : {} blocks", fs.tentative_blocks());
    }
    if let Some(fault) = fs.fault() {
        let _ = writeln!(out, "Fault          : {fault}");
    }
    out
}

/// Directory listing in the style of the RT-11 `DIR` command.
#[must_use]
pub fn directory_listing(fs: &Rt11Filesystem) -> String {
    let mut out = String::new();
    let mut files = 0usize;
    let mut blocks = 0u32;
    for (node, file) in fs.user_files() {
        let marker = if node.meta.readonly { "P" } else { " " };
        let _ = writeln!(
            out,
            "{:<6}.{:<3} {:>5}{marker} {}",
            file.name.basename,
            file.name.extension,
            file.total_blocks(),
            format_date(node.meta.mtime.date())
        );
        files = files.saturating_add(1);
        blocks = blocks.saturating_add(file.total_blocks());
    }
    let _ = writeln!(
        out,
        " {files} Files, {blocks} Blocks\n {} Free blocks",
        fs.free_blocks()
    );
    if let Some(fault) = fs.fault() {
        let _ = writeln!(out, " ?DIR-F-{fault}");
    }
    out
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use std::sync::Arc;

    use decshare_image::{MemoryImage, Partition};
    use decshare_tree::{ManualClock, StreamKind};

    use super::*;
    use crate::filesystem::Rt11Options;

    #[test]
    fn test_format_date() {
        let d = NaiveDate::from_ymd_opt(1985, 7, 4).unwrap();
        assert_eq!(format_date(d), "04-Jul-85");
    }

    #[test]
    fn test_listing_and_info() {
        let mut image = MemoryImage::new(0);
        let mut partition = Partition::new("rt11", 0, 494 * 512, 512, 512).unwrap();
        let mut fs = Rt11Filesystem::new(Rt11Options::default(), 494, Arc::new(ManualClock::new()));
        let date = NaiveDate::from_ymd_opt(1985, 7, 4).unwrap().and_hms_opt(0, 0, 0);
        fs.write_stream("TEST.TXT", StreamKind::Data, vec![1; 1536], date, true)
            .unwrap();
        fs.render(&mut partition, &mut image).unwrap();

        let listing = directory_listing(&fs);
        assert!(listing.starts_with("TEST  .TXT     3P 04-Jul-85\n"), "{listing}");
        assert!(listing.contains(" 1 Files, 3 Blocks"));

        let info = String::from_utf8(fs.file("$VOLUM.INF").unwrap().data.data.clone()).unwrap();
        assert!(info.contains("Volume id      : RT11A"));
        assert!(info.contains("Files          : 1"));
        assert!(info.contains(&format!("Free blocks    : {}", fs.free_blocks())));
    }

    #[test]
    fn test_unformatted_info() {
        let fs = Rt11Filesystem::new(Rt11Options::default(), 494, Arc::new(ManualClock::new()));
        assert!(volume_info(&fs).contains("not formatted"));
    }
}
