//! Human-readable end-of-run summaries.
//!
//! Counts for duplicates, ambiguous and migrate are always printed, even
//! when some files failed. Color is applied only when the caller enables it.

use std::io::Write;

use bytesize::ByteSize;
use yansi::{Paint, Style};

use crate::duplicates::{ClassificationReport, Policy};
use crate::index::IndexStats;

/// Writes summaries to any writer.
#[derive(Debug, Clone, Copy)]
pub struct TextSummary {
    color: bool,
    /// List every matched pair instead of counts only
    detailed: bool,
}

impl TextSummary {
    #[must_use]
    pub fn new(color: bool, detailed: bool) -> Self {
        Self { color, detailed }
    }

    fn paint(&self, text: &str, style: Style) -> String {
        if self.color {
            text.paint(style).to_string()
        } else {
            text.to_string()
        }
    }

    fn header(&self, title: &str) -> String {
        self.paint(title, Style::new().bold())
    }

    /// Summary of an index build.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_index<W: Write>(
        &self,
        writer: &mut W,
        report: &ClassificationReport,
        stats: &IndexStats,
    ) -> std::io::Result<()> {
        writeln!(writer, "{}", self.header("Index built"))?;
        writeln!(writer, "  Images indexed: {}", stats.total_images)?;
        writeln!(writer, "  Image types:    {}", stats.image_types)?;
        writeln!(
            writer,
            "  Total size:     {}",
            ByteSize::b(stats.total_size)
        )?;
        writeln!(
            writer,
            "  Average size:   {}",
            ByteSize::b(stats.average_size.round() as u64)
        )?;
        writeln!(writer, "  Added this run: {}", report.migrate_count())?;
        self.write_counts(writer, report, false)?;
        Ok(())
    }

    /// Summary of a target classification.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_classification<W: Write>(
        &self,
        writer: &mut W,
        report: &ClassificationReport,
        policy: Policy,
    ) -> std::io::Result<()> {
        writeln!(
            writer,
            "{} ({} policy)",
            self.header("Classification complete"),
            policy
        )?;
        self.write_counts(writer, report, true)
    }

    fn write_counts<W: Write>(
        &self,
        writer: &mut W,
        report: &ClassificationReport,
        show_migrate: bool,
    ) -> std::io::Result<()> {
        let duplicates = report.duplicate_count().to_string();
        let ambiguous = report.ambiguous_count().to_string();
        let migrate = report.migrate_count().to_string();

        writeln!(writer, "  Duplicates:     {}", self.paint(&duplicates, Style::new().green()))?;
        writeln!(writer, "  Ambiguous:      {}", self.paint(&ambiguous, Style::new().yellow()))?;
        if show_migrate {
            writeln!(writer, "  Unique:         {}", self.paint(&migrate, Style::new().cyan()))?;
        }
        if report.skipped > 0 {
            writeln!(writer, "  Not images:     {}", report.skipped)?;
        }
        if report.failed_count() > 0 {
            let failed = report.failed_count().to_string();
            writeln!(writer, "  Failed:         {}", self.paint(&failed, Style::new().red()))?;
        }
        writeln!(writer, "  Elapsed:        {:.2}s", report.elapsed_secs())?;

        if self.detailed {
            for pair in &report.duplicate_matches {
                writeln!(
                    writer,
                    "  = {} -> {}",
                    pair.duplicate.display(),
                    pair.original.display()
                )?;
            }
            for pair in &report.ambiguous_matches {
                writeln!(
                    writer,
                    "  ? {} ~ {}",
                    pair.duplicate.display(),
                    pair.original.display()
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duplicates::MatchedPair;
    use std::path::PathBuf;
    use std::time::Duration;

    fn report() -> ClassificationReport {
        ClassificationReport {
            duplicates: vec![PathBuf::from("/t/b.png")],
            migrate: vec![PathBuf::from("/t/c.png"), PathBuf::from("/t/d.png")],
            duplicate_matches: vec![MatchedPair {
                original: PathBuf::from("/s/a.png"),
                duplicate: PathBuf::from("/t/b.png"),
            }],
            failed: vec![PathBuf::from("/t/broken.png")],
            total_processed: 3,
            elapsed: Duration::from_millis(2500),
            ..Default::default()
        }
    }

    #[test]
    fn test_classification_summary_plain() {
        let mut out = Vec::new();
        TextSummary::new(false, false)
            .write_classification(&mut out, &report(), Policy::Precise)
            .unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Classification complete (precise policy)"));
        assert!(text.contains("Duplicates:     1"));
        assert!(text.contains("Ambiguous:      0"));
        assert!(text.contains("Unique:         2"));
        assert!(text.contains("Failed:         1"));
        assert!(text.contains("Elapsed:        2.50s"));
        assert!(!text.contains("->"));
    }

    #[test]
    fn test_detailed_summary_lists_pairs() {
        let mut out = Vec::new();
        TextSummary::new(false, true)
            .write_classification(&mut out, &report(), Policy::Fast)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("= /t/b.png -> /s/a.png"));
    }

    #[test]
    fn test_index_summary() {
        let stats = IndexStats {
            total_images: 10,
            image_types: 2,
            average_size: 1000.0,
            total_size: 10_000,
        };
        let mut out = Vec::new();
        TextSummary::new(false, false)
            .write_index(&mut out, &report(), &stats)
            .unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Images indexed: 10"));
        assert!(text.contains("Added this run: 2"));
        assert!(!text.contains("Unique:"));
    }
}
