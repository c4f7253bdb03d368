use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use filetime::FileTime;
use imgdupe::reorganize::{copy_preserving_times, CaptureDateSource, Reorganizer};
use tempfile::tempdir;

use super::fixtures::{write_bmp, write_png};

struct Dates(HashMap<&'static str, NaiveDateTime>);

impl CaptureDateSource for Dates {
    fn capture_date(&self, path: &Path) -> Option<NaiveDateTime> {
        self.0.get(path.file_name()?.to_str()?).copied()
    }
}

fn taken(y: i32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, 14)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap()
}

#[test]
fn test_copy_preserves_times() {
    let dir = tempdir().unwrap();
    let from = dir.path().join("a.png");
    let to = dir.path().join("b.png");
    write_png(&from, 1);

    let atime = FileTime::from_unix_time(1_500_000_000, 0);
    let mtime = FileTime::from_unix_time(1_400_000_000, 0);
    filetime::set_file_times(&from, atime, mtime).unwrap();

    copy_preserving_times(&from, &to).unwrap();

    let meta = fs::metadata(&to).unwrap();
    assert_eq!(FileTime::from_last_modification_time(&meta), mtime);
    assert_eq!(fs::read(&from).unwrap(), fs::read(&to).unwrap());
}

#[cfg(unix)]
#[test]
fn test_copy_preserves_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let from = dir.path().join("a.png");
    let to = dir.path().join("b.png");
    write_png(&from, 1);
    fs::set_permissions(&from, fs::Permissions::from_mode(0o640)).unwrap();

    copy_preserving_times(&from, &to).unwrap();

    let mode = fs::metadata(&to).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o640);
}

#[test]
fn test_reorganize_nested_tree() {
    let source = tempdir().unwrap();
    let dest = tempdir().unwrap();
    fs::create_dir_all(source.path().join("2019/trip")).unwrap();
    write_png(&source.path().join("2019/trip/beach.png"), 1);
    write_bmp(&source.path().join("scan.bmp"), 4, 4, 7);
    write_png(&source.path().join("undated.png"), 3);
    fs::write(source.path().join("readme.md"), b"# photos").unwrap();

    let mtime = FileTime::from_unix_time(1_300_000_000, 0);
    filetime::set_file_mtime(source.path().join("scan.bmp"), mtime).unwrap();

    let dates = Dates(HashMap::from([
        ("beach.png", taken(2019, 8)),
        ("scan.bmp", taken(2003, 11)),
    ]));
    let report = Reorganizer::with_date_source(dates)
        .reorganize(source.path(), dest.path())
        .unwrap();

    assert_eq!(report.copied.len(), 2);
    assert!(dest.path().join("2019/08/beach.png").is_file());
    let scan = dest.path().join("2003/11/scan.bmp");
    assert_eq!(
        FileTime::from_last_modification_time(&fs::metadata(&scan).unwrap()),
        mtime
    );
    assert_eq!(report.undated.len(), 1);
    assert_eq!(report.not_images.len(), 1);
    assert!(report.failed.is_empty());

    // Sources are left in place
    assert!(source.path().join("2019/trip/beach.png").is_file());
}

#[test]
fn test_reorganize_second_run_copies_nothing() {
    let source = tempdir().unwrap();
    let dest = tempdir().unwrap();
    write_png(&source.path().join("a.png"), 1);

    let dates = || Dates(HashMap::from([("a.png", taken(2020, 2))]));
    Reorganizer::with_date_source(dates())
        .reorganize(source.path(), dest.path())
        .unwrap();
    let second = Reorganizer::with_date_source(dates())
        .reorganize(source.path(), dest.path())
        .unwrap();

    assert!(second.copied.is_empty());
    assert_eq!(second.existing.len(), 1);
}
