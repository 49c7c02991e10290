use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use super::extraction_worker::FileOutcome;
use super::merge_store::MergeSummary;
use crate::error::{Result, SkipStage};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFile {
    pub url: String,
    pub stage: SkipStage,
    pub reason: String,
}

/// Completeness of one run: what was submitted, what was skipped and why,
/// and what reached the archive.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub files_submitted: usize,
    pub files_succeeded: usize,
    pub files_skipped: usize,
    pub records_extracted: usize,
    pub station_failures: usize,
    pub skips_by_stage: BTreeMap<SkipStage, usize>,
    pub skipped_files: Vec<SkippedFile>,
    pub partitions: Vec<MergeSummary>,
}

impl RunReport {
    pub fn new(files_submitted: usize) -> Self {
        Self {
            files_submitted,
            ..Default::default()
        }
    }

    pub fn record_outcome(&mut self, outcome: &FileOutcome) {
        match &outcome.error {
            Some(error) => self.record_skip(&outcome.url, error.stage(), error.to_string()),
            None => {
                self.files_succeeded += 1;
                self.records_extracted += outcome.records.len();
                self.station_failures += outcome.station_failures.len();
            }
        }
    }

    pub fn record_skip(&mut self, url: &str, stage: SkipStage, reason: String) {
        self.files_skipped += 1;
        *self.skips_by_stage.entry(stage).or_insert(0) += 1;
        self.skipped_files.push(SkippedFile {
            url: url.to_string(),
            stage,
            reason,
        });
    }

    pub fn add_partitions(&mut self, summaries: Vec<MergeSummary>) {
        self.partitions.extend(summaries);
    }

    pub fn rows_added(&self) -> usize {
        self.partitions.iter().map(|p| p.rows_added + p.rows_replaced).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.files_skipped == 0 && self.files_succeeded == self.files_submitted
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Generate a summary report
    pub fn generate_summary(&self) -> String {
        let mut summary = String::new();
        let pct = |n: usize| {
            if self.files_submitted == 0 {
                0.0
            } else {
                100.0 * n as f64 / self.files_submitted as f64
            }
        };

        summary.push_str("=== Extraction Run Report ===\n");
        summary.push_str(&format!("Files Submitted: {}\n", self.files_submitted));
        summary.push_str(&format!(
            "Files Succeeded: {} ({:.1}%)\n",
            self.files_succeeded,
            pct(self.files_succeeded)
        ));
        summary.push_str(&format!(
            "Files Skipped: {} ({:.1}%)\n",
            self.files_skipped,
            pct(self.files_skipped)
        ));
        for (stage, count) in &self.skips_by_stage {
            summary.push_str(&format!("  {}: {}\n", stage, count));
        }
        summary.push_str(&format!("Records Extracted: {}\n", self.records_extracted));
        summary.push_str(&format!("Station Failures: {}\n", self.station_failures));

        if !self.partitions.is_empty() {
            summary.push_str("\nPartitions:\n");
            for p in &self.partitions {
                summary.push_str(&format!(
                    "  {}: {} -> {} rows (+{} new, {} replaced)\n",
                    p.partition.display(),
                    p.rows_before,
                    p.rows_after,
                    p.rows_added,
                    p.rows_replaced
                ));
            }
        }

        if !self.skipped_files.is_empty() {
            summary.push_str("\nFirst 10 Skipped Files:\n");
            for (i, skipped) in self.skipped_files.iter().take(10).enumerate() {
                summary.push_str(&format!(
                    "  {}. [{}] {}\n",
                    i + 1,
                    skipped.stage,
                    skipped.reason
                ));
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionError;
    use std::path::PathBuf;

    fn skipped(url: &str, error: ExtractionError) -> FileOutcome {
        FileOutcome::skipped(url, error)
    }

    fn succeeded(url: &str) -> FileOutcome {
        FileOutcome {
            url: url.to_string(),
            records: Vec::new(),
            station_failures: Vec::new(),
            error: None,
        }
    }

    #[test]
    fn test_counts_by_stage() {
        let mut report = RunReport::new(4);
        report.record_outcome(&succeeded("a"));
        report.record_outcome(&skipped(
            "b",
            ExtractionError::IndexUnavailable {
                url: "b.idx".to_string(),
                reason: "HTTP status 404".to_string(),
            },
        ));
        report.record_outcome(&skipped(
            "c",
            ExtractionError::IncompleteFieldMatch {
                url: "c".to_string(),
                matched: vec![],
                requested: vec![":WIND:".to_string()],
            },
        ));
        report.record_outcome(&skipped(
            "d",
            ExtractionError::IndexUnavailable {
                url: "d.idx".to_string(),
                reason: "timeout".to_string(),
            },
        ));

        assert_eq!(report.files_succeeded, 1);
        assert_eq!(report.files_skipped, 3);
        assert_eq!(report.skips_by_stage[&SkipStage::Index], 2);
        assert_eq!(report.skips_by_stage[&SkipStage::FieldMatch], 1);
        assert!(!report.is_complete());

        let summary = report.generate_summary();
        assert!(summary.contains("Files Skipped: 3 (75.0%)"));
        assert!(summary.contains("index: 2"));
    }

    #[test]
    fn test_json_output() -> Result<()> {
        let mut report = RunReport::new(1);
        report.record_outcome(&succeeded("a"));
        report.add_partitions(vec![MergeSummary {
            partition: PathBuf::from("archive/nbm/wind/2025_01_nbm_wind_archive.parquet"),
            rows_before: 0,
            rows_incoming: 3,
            rows_added: 3,
            rows_replaced: 0,
            rows_after: 3,
            rewritten: true,
        }]);
        assert!(report.is_complete());
        assert_eq!(report.rows_added(), 3);

        let file = tempfile::NamedTempFile::new()?;
        report.write_json(file.path())?;

        let value: serde_json::Value = serde_json::from_reader(File::open(file.path())?)?;
        assert_eq!(value["files_succeeded"], 1);
        assert_eq!(value["partitions"][0]["rows_added"], 3);
        Ok(())
    }
}
