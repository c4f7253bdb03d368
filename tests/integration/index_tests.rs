use std::fs;

use imgdupe::duplicates::{build_index, classify, Policy, ScanConfig, ScanOrchestrator, Verdict};
use imgdupe::index::{DuplicateIndex, Lookup, RecordLookup};
use tempfile::tempdir;

use super::fixtures::{write_noise_png, write_png};

fn quick_config() -> ScanConfig {
    ScanConfig::default().with_perceptual(false)
}

#[test]
fn test_build_then_classify_identical_copy_is_duplicate() {
    let source = tempdir().unwrap();
    let target = tempdir().unwrap();
    let db = tempdir().unwrap();

    write_png(&source.path().join("a.png"), 1);
    write_png(&source.path().join("b.png"), 2);
    fs::copy(source.path().join("a.png"), target.path().join("a.png")).unwrap();

    let index = DuplicateIndex::open(&db.path().join("index.sqlite"), "images").unwrap();
    let (ingest, stats) = build_index(source.path(), &index, ScanConfig::default()).unwrap();
    assert_eq!(ingest.migrate_count(), 2);
    assert_eq!(stats.total_images, 2);
    assert_eq!(stats.image_types, 1);

    let report = classify(target.path(), &index, ScanConfig::default()).unwrap();
    assert_eq!(
        report.verdict_of(&target.path().join("a.png")),
        Some(Verdict::Duplicate)
    );
    assert_eq!(report.duplicate_matches[0].original, source.path().join("a.png"));
}

#[test]
fn test_rebuilding_unchanged_source_adds_no_rows() {
    let source = tempdir().unwrap();
    for i in 0..5 {
        write_png(&source.path().join(format!("img{i}.png")), i);
    }
    let index = DuplicateIndex::open_in_memory("images").unwrap();

    let (_, first) = build_index(source.path(), &index, quick_config()).unwrap();
    let (second_report, second) = build_index(source.path(), &index, quick_config()).unwrap();

    assert_eq!(first.total_images, 5);
    assert_eq!(second.total_images, 5);
    assert_eq!(second_report.migrate_count(), 0);
    assert_eq!(second_report.duplicate_count(), 5);
}

#[test]
fn test_rebuilding_unchanged_source_fast_policy() {
    let source = tempdir().unwrap();
    for i in 0..3 {
        write_png(&source.path().join(format!("img{i}.png")), i);
    }
    let index = DuplicateIndex::open_in_memory("images").unwrap();
    let config = || quick_config().with_policy(Policy::Fast);

    build_index(source.path(), &index, config()).unwrap();
    let (report, stats) = build_index(source.path(), &index, config()).unwrap();

    assert_eq!(stats.total_images, 3);
    assert_eq!(report.duplicate_count(), 3);
}

#[test]
fn test_non_images_never_enter_the_index() {
    let source = tempdir().unwrap();
    write_png(&source.path().join("real.png"), 9);
    fs::write(source.path().join("notes.txt"), b"hello").unwrap();
    fs::write(source.path().join("fake.png"), b"this is not a png").unwrap();
    fs::write(source.path().join("empty.png"), b"").unwrap();

    let index = DuplicateIndex::open_in_memory("images").unwrap();
    let (report, stats) = build_index(source.path(), &index, quick_config()).unwrap();

    assert_eq!(stats.total_images, 1);
    assert_eq!(report.skipped, 3);
    assert!(report.failed.is_empty());
    for name in ["notes.txt", "fake.png", "empty.png"] {
        assert_eq!(report.verdict_of(&source.path().join(name)), None);
    }
}

#[test]
fn test_thousand_distinct_files_ingested_concurrently() {
    let source = tempdir().unwrap();
    let db = tempdir().unwrap();
    for i in 0..1000u32 {
        let sub = source.path().join(format!("d{}", i % 10));
        fs::create_dir_all(&sub).unwrap();
        write_png(&sub.join(format!("f{i}.png")), i);
    }

    let index = DuplicateIndex::open(&db.path().join("index.sqlite"), "images").unwrap();
    let config = quick_config().with_io_threads(8);
    let (report, stats) = build_index(source.path(), &index, config).unwrap();

    assert_eq!(report.migrate_count(), 1000);
    assert!(report.failed.is_empty());
    assert_eq!(stats.total_images, 1000);
    assert_eq!(index.count().unwrap(), 1000);
}

#[test]
fn test_identical_files_in_source_produce_one_row() {
    let source = tempdir().unwrap();
    for i in 0..8 {
        write_png(&source.path().join(format!("copy{i}.png")), 42);
    }

    let index = DuplicateIndex::open_in_memory("images").unwrap();
    let (report, stats) =
        build_index(source.path(), &index, quick_config().with_io_threads(8)).unwrap();

    assert_eq!(stats.total_images, 1);
    assert_eq!(report.migrate_count(), 1);
    assert_eq!(report.duplicate_count(), 7);
}

#[test]
fn test_changed_file_at_indexed_path_fails_without_mutation() {
    let source = tempdir().unwrap();
    let path = source.path().join("a.png");
    write_png(&path, 1);

    let index = DuplicateIndex::open_in_memory("images").unwrap();
    build_index(source.path(), &index, quick_config()).unwrap();
    let before = index
        .lookup(&Lookup::Path(path.to_str().unwrap()))
        .unwrap()
        .unwrap();

    write_png(&path, 2);
    let (report, stats) = build_index(source.path(), &index, quick_config()).unwrap();

    assert_eq!(report.failed, vec![path.clone()]);
    assert_eq!(stats.total_images, 1);
    let after = index
        .lookup(&Lookup::Path(path.to_str().unwrap()))
        .unwrap()
        .unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_ingest_stores_every_signal() {
    let source = tempdir().unwrap();
    let path = source.path().join("big.png");
    write_noise_png(&path, 64, 7);

    let index = DuplicateIndex::open_in_memory("images").unwrap();
    build_index(source.path(), &index, ScanConfig::default()).unwrap();

    let record = index
        .lookup(&Lookup::Path(path.to_str().unwrap()))
        .unwrap()
        .unwrap();
    let bytes = fs::read(&path).unwrap();

    assert_eq!(record.filename, "big.png");
    assert_eq!(record.size, bytes.len() as u64);
    assert_eq!(record.crc32, format!("{:08x}", crc32fast::hash(&bytes)));
    assert_eq!(record.content_hash, blake3::hash(&bytes).to_hex().to_string());
    assert_eq!(record.media_type, "png");
    assert!(!record.perceptual.average.is_empty());
    assert_eq!(record.perceptual.wavelet.len(), 16);
}

#[test]
fn test_truncated_image_is_indexed_without_perceptual_hashes() {
    let source = tempdir().unwrap();
    let good = source.path().join("good.png");
    write_noise_png(&good, 32, 3);
    let bytes = fs::read(&good).unwrap();
    let broken = source.path().join("broken.png");
    fs::write(&broken, &bytes[..bytes.len() / 2]).unwrap();
    fs::remove_file(&good).unwrap();

    let index = DuplicateIndex::open_in_memory("images").unwrap();
    let (report, stats) = build_index(source.path(), &index, ScanConfig::default()).unwrap();

    assert!(report.failed.is_empty());
    assert_eq!(stats.total_images, 1);
    let record = index
        .lookup(&Lookup::Path(broken.to_str().unwrap()))
        .unwrap()
        .unwrap();
    assert!(record.perceptual.is_empty());
    assert!(!record.content_hash.is_empty());
}

#[test]
fn test_orchestrator_reuse_across_passes() {
    let source = tempdir().unwrap();
    let target = tempdir().unwrap();
    write_png(&source.path().join("a.png"), 5);
    write_png(&target.path().join("new.png"), 6);

    let index = DuplicateIndex::open_in_memory("images").unwrap();
    let orchestrator = ScanOrchestrator::new(quick_config());
    orchestrator.ingest(source.path(), &index).unwrap();
    let report = orchestrator.scan(target.path(), &index).unwrap();

    assert_eq!(report.migrate, vec![target.path().join("new.png")]);
    assert_eq!(index.count().unwrap(), 1);
}
