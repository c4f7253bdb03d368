use std::fs;

use imgdupe::duplicates::{
    build_index, classify, Classifier, FinderError, Policy, ScanConfig, Verdict,
};
use imgdupe::index::DuplicateIndex;
use imgdupe::scanner::IdentityExtractor;
use tempfile::{tempdir, TempDir};

use super::fixtures::{write_bmp, write_noise_png, write_png};

fn config(policy: Policy) -> ScanConfig {
    ScanConfig::default().with_policy(policy).with_perceptual(false)
}

/// Source holds `a.png` (about 500 KB); target holds a byte-identical `b.png`.
fn renamed_copy_trees() -> (TempDir, TempDir) {
    let source = tempdir().unwrap();
    let target = tempdir().unwrap();
    write_noise_png(&source.path().join("a.png"), 410, 11);
    fs::copy(source.path().join("a.png"), target.path().join("b.png")).unwrap();
    (source, target)
}

#[test]
fn test_renamed_copy_precise_policy_is_duplicate() {
    let (source, target) = renamed_copy_trees();
    let index = DuplicateIndex::open_in_memory("images").unwrap();
    build_index(source.path(), &index, config(Policy::Precise)).unwrap();

    let report = classify(target.path(), &index, config(Policy::Precise)).unwrap();

    assert_eq!(report.duplicates, vec![target.path().join("b.png")]);
    assert!(report.ambiguous.is_empty());
    assert!(report.migrate.is_empty());
}

#[test]
fn test_renamed_copy_fast_policy_is_migrate() {
    let (source, target) = renamed_copy_trees();
    let index = DuplicateIndex::open_in_memory("images").unwrap();
    build_index(source.path(), &index, config(Policy::Fast)).unwrap();

    let report = classify(target.path(), &index, config(Policy::Fast)).unwrap();

    assert_eq!(report.migrate, vec![target.path().join("b.png")]);
    assert!(report.duplicates.is_empty());
    assert!(report.ambiguous.is_empty());
}

#[test]
fn test_renamed_copy_fast_policy_with_checksum_fallback_is_ambiguous() {
    let (source, target) = renamed_copy_trees();
    let index = DuplicateIndex::open_in_memory("images").unwrap();
    build_index(source.path(), &index, config(Policy::Fast)).unwrap();

    let extractor = IdentityExtractor::new().with_perceptual(false);
    let mut fp = extractor.check_type(&target.path().join("b.png")).unwrap();
    let classification = Classifier::new(Policy::Fast)
        .with_checksum_fallback(true)
        .classify(&mut fp, &index, &extractor)
        .unwrap();

    assert_eq!(classification.verdict, Verdict::Ambiguous);
}

#[test]
fn test_same_name_and_size_different_content_is_ambiguous_under_fast() {
    let source = tempdir().unwrap();
    let target = tempdir().unwrap();
    write_bmp(&source.path().join("shot.bmp"), 16, 16, 10);
    write_bmp(&target.path().join("shot.bmp"), 16, 16, 200);
    assert_eq!(
        fs::metadata(source.path().join("shot.bmp")).unwrap().len(),
        fs::metadata(target.path().join("shot.bmp")).unwrap().len()
    );

    let index = DuplicateIndex::open_in_memory("images").unwrap();
    build_index(source.path(), &index, config(Policy::Fast)).unwrap();
    let report = classify(target.path(), &index, config(Policy::Fast)).unwrap();

    assert_eq!(report.ambiguous, vec![target.path().join("shot.bmp")]);
    assert!(report.duplicates.is_empty());
    assert_eq!(
        report.ambiguous_matches[0].original,
        source.path().join("shot.bmp")
    );
}

#[test]
fn test_same_name_and_content_is_duplicate_under_fast() {
    let source = tempdir().unwrap();
    let target = tempdir().unwrap();
    write_png(&source.path().join("x.png"), 77);
    write_png(&target.path().join("x.png"), 77);

    let index = DuplicateIndex::open_in_memory("images").unwrap();
    build_index(source.path(), &index, config(Policy::Fast)).unwrap();
    let report = classify(target.path(), &index, config(Policy::Fast)).unwrap();

    assert_eq!(report.duplicates, vec![target.path().join("x.png")]);
}

#[test]
fn test_fast_duplicate_of_either_same_named_original() {
    let source = tempdir().unwrap();
    let target = tempdir().unwrap();
    fs::create_dir_all(source.path().join("x")).unwrap();
    fs::create_dir_all(source.path().join("y")).unwrap();
    write_png(&source.path().join("x/IMG.png"), 40);
    let mut flipped = fs::read(source.path().join("x/IMG.png")).unwrap();
    let last = flipped.len() - 1;
    flipped[last] ^= 0x01;
    fs::write(source.path().join("y/IMG.png"), &flipped).unwrap();

    let index = DuplicateIndex::open_in_memory("images").unwrap();
    build_index(source.path(), &index, config(Policy::Precise)).unwrap();
    assert_eq!(index.count().unwrap(), 2);

    for dir in ["x", "y"] {
        let original = source.path().join(dir).join("IMG.png");
        fs::copy(&original, target.path().join("IMG.png")).unwrap();

        let report = classify(target.path(), &index, config(Policy::Fast)).unwrap();

        assert_eq!(report.duplicates, vec![target.path().join("IMG.png")]);
        assert!(report.ambiguous.is_empty());
        assert_eq!(report.duplicate_matches[0].original, original);
    }
}

#[test]
fn test_precise_policy_never_reports_ambiguous() {
    let source = tempdir().unwrap();
    let target = tempdir().unwrap();
    write_bmp(&source.path().join("shot.bmp"), 16, 16, 10);
    write_bmp(&target.path().join("shot.bmp"), 16, 16, 200);
    write_png(&target.path().join("other.png"), 3);

    let index = DuplicateIndex::open_in_memory("images").unwrap();
    build_index(source.path(), &index, config(Policy::Precise)).unwrap();
    let report = classify(target.path(), &index, config(Policy::Precise)).unwrap();

    assert!(report.ambiguous.is_empty());
    assert_eq!(report.migrate_count(), 2);
}

#[test]
fn test_zero_byte_image_name_is_skipped() {
    let source = tempdir().unwrap();
    let target = tempdir().unwrap();
    write_png(&source.path().join("a.png"), 1);
    fs::write(target.path().join("empty.png"), b"").unwrap();

    let index = DuplicateIndex::open_in_memory("images").unwrap();
    build_index(source.path(), &index, config(Policy::Precise)).unwrap();

    for policy in [Policy::Precise, Policy::Fast] {
        let report = classify(target.path(), &index, config(policy)).unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.total_processed, 0);
        assert_eq!(report.verdict_of(&target.path().join("empty.png")), None);
        assert!(report.failed.is_empty());
    }
}

#[test]
fn test_non_image_copy_of_indexed_bytes_is_not_classified() {
    let source = tempdir().unwrap();
    let target = tempdir().unwrap();
    write_png(&source.path().join("a.png"), 1);
    fs::write(target.path().join("a.png"), b"plain text pretending").unwrap();

    let index = DuplicateIndex::open_in_memory("images").unwrap();
    build_index(source.path(), &index, config(Policy::Fast)).unwrap();
    let report = classify(target.path(), &index, config(Policy::Fast)).unwrap();

    assert!(report.duplicates.is_empty());
    assert!(report.ambiguous.is_empty());
    assert_eq!(report.skipped, 1);
}

#[test]
fn test_classify_does_not_modify_index() {
    let source = tempdir().unwrap();
    let target = tempdir().unwrap();
    write_png(&source.path().join("a.png"), 1);
    for i in 10..15 {
        write_png(&target.path().join(format!("n{i}.png")), i);
    }

    let index = DuplicateIndex::open_in_memory("images").unwrap();
    build_index(source.path(), &index, config(Policy::Precise)).unwrap();
    let report = classify(target.path(), &index, config(Policy::Precise)).unwrap();

    assert_eq!(report.migrate_count(), 5);
    assert_eq!(index.count().unwrap(), 1);
}

#[test]
fn test_buckets_are_disjoint_and_complete() {
    let source = tempdir().unwrap();
    let target = tempdir().unwrap();
    write_png(&source.path().join("keep.png"), 1);
    write_bmp(&source.path().join("shot.bmp"), 8, 8, 1);
    fs::copy(source.path().join("keep.png"), target.path().join("keep.png")).unwrap();
    write_bmp(&target.path().join("shot.bmp"), 8, 8, 99);
    write_png(&target.path().join("fresh.png"), 2);

    let index = DuplicateIndex::open_in_memory("images").unwrap();
    build_index(source.path(), &index, config(Policy::Fast)).unwrap();
    let report = classify(target.path(), &index, config(Policy::Fast)).unwrap();

    assert_eq!(report.total_processed, 3);
    assert_eq!(
        report.duplicate_count() + report.ambiguous_count() + report.migrate_count(),
        report.total_processed
    );
    assert_eq!(report.verdict_of(&target.path().join("keep.png")), Some(Verdict::Duplicate));
    assert_eq!(report.verdict_of(&target.path().join("shot.bmp")), Some(Verdict::Ambiguous));
    assert_eq!(report.verdict_of(&target.path().join("fresh.png")), Some(Verdict::Migrate));
}

#[test]
fn test_missing_target_is_fatal() {
    let index = DuplicateIndex::open_in_memory("images").unwrap();
    let result = classify(
        std::path::Path::new("/definitely/not/a/dir"),
        &index,
        ScanConfig::default(),
    );
    assert!(matches!(result, Err(FinderError::PathNotFound(_))));
}

#[test]
fn test_shutdown_before_scan_interrupts() {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    let target = tempdir().unwrap();
    write_png(&target.path().join("a.png"), 1);
    let index = DuplicateIndex::open_in_memory("images").unwrap();

    let flag = Arc::new(AtomicBool::new(true));
    let result = classify(
        target.path(),
        &index,
        ScanConfig::default().with_shutdown_flag(flag),
    );
    assert!(matches!(result, Err(FinderError::Interrupted)));
}
