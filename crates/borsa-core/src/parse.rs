//! Best-effort row aggregation.
//!
//! Upstream payloads are parsed row by row. A malformed row yields a
//! [`SkipReason`] instead of failing the whole call, and the skips are kept in
//! a [`ParseReport`] for diagnostics.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Why a single upstream row was skipped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipReason {
    /// Zero-based position of the row in the upstream payload.
    pub row: usize,
    /// What was wrong with it.
    pub reason: String,
}

impl SkipReason {
    /// Creates a skip reason.
    pub fn new(row: usize, reason: impl Into<String>) -> Self {
        Self {
            row,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {}", self.row, self.reason)
    }
}

/// Outcome of parsing a multi-row payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseReport {
    /// Rows that produced a record.
    pub parsed: usize,
    /// Rows that were skipped.
    pub skipped: Vec<SkipReason>,
}

impl ParseReport {
    /// Total rows seen.
    #[must_use]
    pub fn total(&self) -> usize {
        self.parsed + self.skipped.len()
    }

    /// Returns true if any row was skipped.
    #[must_use]
    pub fn has_skips(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Splits per-row results into the parsed records and a report.
///
/// Skipped rows are logged at `warn` with the given context.
pub fn collect_rows<T, I>(context: &str, rows: I) -> (Vec<T>, ParseReport)
where
    I: IntoIterator<Item = Result<T, SkipReason>>,
{
    let mut parsed = Vec::new();
    let mut report = ParseReport::default();

    for row in rows {
        match row {
            Ok(value) => parsed.push(value),
            Err(skip) => {
                warn!(context, row = skip.row, reason = %skip.reason, "Skipping malformed row");
                report.skipped.push(skip);
            }
        }
    }

    report.parsed = parsed.len();
    (parsed, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_rows_keeps_good_rows() {
        let raw = ["1", "2", "x", "4", "", "6", "7", "8", "9", "10"];
        let rows = raw.iter().enumerate().map(|(i, s)| {
            s.parse::<u32>()
                .map_err(|e| SkipReason::new(i, e.to_string()))
        });

        let (values, report) = collect_rows("test", rows);
        assert_eq!(values, vec![1, 2, 4, 6, 7, 8, 9, 10]);
        assert_eq!(report.parsed, 8);
        assert_eq!(report.total(), 10);
        assert_eq!(
            report.skipped.iter().map(|s| s.row).collect::<Vec<_>>(),
            vec![2, 4]
        );
    }

    #[test]
    fn test_collect_rows_empty() {
        let (values, report) = collect_rows::<u32, _>("test", Vec::new());
        assert!(values.is_empty());
        assert!(!report.has_skips());
        assert_eq!(report.total(), 0);
    }
}
