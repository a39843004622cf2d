//! Batch report models and mutable report builder.

use std::collections::BTreeMap;
use std::fmt;

/// Aggregate counters and diagnostics for one `run_batch` call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReportCopyAssets {
    /// Candidate source files considered (direct and walked).
    pub cnt_scanned: u64,
    /// Candidates dropped by the ignore list.
    pub cnt_ignored: u64,
    /// Entries registered in the output set.
    pub cnt_written: u64,
    /// Entries left untouched (already present or not stale).
    pub cnt_skipped: u64,
    /// Non-fatal warnings collected during the walk.
    pub warnings: Vec<String>,
}

impl ReportCopyAssets {
    /// Number of collected warnings.
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Machine-readable counters.
    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_scanned".to_string(), self.cnt_scanned);
        dict_counts.insert("cnt_ignored".to_string(), self.cnt_ignored);
        dict_counts.insert("cnt_written".to_string(), self.cnt_written);
        dict_counts.insert("cnt_skipped".to_string(), self.cnt_skipped);
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        format!(
            "{prefix} scanned={} ignored={} written={} skipped={} warnings={}",
            self.cnt_scanned,
            self.cnt_ignored,
            self.cnt_written,
            self.cnt_skipped,
            self.warning_count()
        )
    }
}

impl fmt::Display for ReportCopyAssets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[ASSETS]"))
    }
}

/// Mutable accumulator for batch statistics.
#[derive(Debug, Default, Clone)]
pub struct ReportCopyAssetsBuilder {
    /// See [`ReportCopyAssets::cnt_scanned`].
    pub cnt_scanned: u64,
    /// See [`ReportCopyAssets::cnt_ignored`].
    pub cnt_ignored: u64,
    /// See [`ReportCopyAssets::cnt_written`].
    pub cnt_written: u64,
    /// See [`ReportCopyAssets::cnt_skipped`].
    pub cnt_skipped: u64,
    /// See [`ReportCopyAssets::warnings`].
    pub warnings: Vec<String>,
}

impl ReportCopyAssetsBuilder {
    /// Increment scanned count by one.
    pub fn add_scanned(&mut self) {
        self.cnt_scanned += 1;
    }

    /// Increment ignored count by one.
    pub fn add_ignored(&mut self) {
        self.cnt_ignored += 1;
    }

    /// Increment written count by one.
    pub fn add_written(&mut self) {
        self.cnt_written += 1;
    }

    /// Increment skipped count by one.
    pub fn add_skipped(&mut self) {
        self.cnt_skipped += 1;
    }

    /// Add warning message.
    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Finalize builder into immutable report.
    pub fn build(self) -> ReportCopyAssets {
        ReportCopyAssets {
            cnt_scanned: self.cnt_scanned,
            cnt_ignored: self.cnt_ignored,
            cnt_written: self.cnt_written,
            cnt_skipped: self.cnt_skipped,
            warnings: self.warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ReportCopyAssets, ReportCopyAssetsBuilder};

    #[test]
    fn report_to_dict_and_format_agree() {
        let report = ReportCopyAssets {
            cnt_scanned: 6,
            cnt_ignored: 1,
            cnt_written: 4,
            cnt_skipped: 1,
            warnings: vec!["w".to_string()],
        };

        let dict_counts = report.to_dict();
        assert_eq!(dict_counts["cnt_scanned"], 6);
        assert_eq!(dict_counts["cnt_ignored"], 1);
        assert_eq!(dict_counts["cnt_written"], 4);
        assert_eq!(dict_counts["cnt_skipped"], 1);
        assert_eq!(dict_counts["cnt_warnings"], 1);

        let txt = report.format("[ASSETS]");
        assert_eq!(
            txt,
            "[ASSETS] scanned=6 ignored=1 written=4 skipped=1 warnings=1"
        );
        assert_eq!(report.to_string(), txt);
    }

    #[test]
    fn builder_accumulates_counters() {
        let mut builder = ReportCopyAssetsBuilder::default();
        builder.add_scanned();
        builder.add_scanned();
        builder.add_written();
        builder.add_skipped();
        builder.add_warning("loop".to_string());

        let report = builder.build();
        assert_eq!(report.cnt_scanned, 2);
        assert_eq!(report.cnt_written, 1);
        assert_eq!(report.cnt_skipped, 1);
        assert_eq!(report.cnt_ignored, 0);
        assert_eq!(report.warnings, vec!["loop".to_string()]);
    }
}
