//! Per-sheet migration report.
//!
//! Outcomes are appended as rows are assembled, in any order; [`MigrationReport::finalize`]
//! restores row order before anything is exported.

use std::collections::BTreeMap;

use log::{info, warn};

use crate::{
    failure::{FailureKind, FieldFailure},
    record::{Record, RecordFailure, RecordOutcome},
    table::render_table,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationReport {
    model: String,
    outcomes: Vec<RecordOutcome>,
}

impl MigrationReport {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            outcomes: Vec::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn record(&mut self, outcome: RecordOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn extend<I>(&mut self, outcomes: I)
    where
        I: IntoIterator<Item = RecordOutcome>,
    {
        self.outcomes.extend(outcomes);
    }

    /// Sorts outcomes by row index and logs the pass aggregates.
    pub fn finalize(&mut self) {
        self.outcomes.sort_by_key(RecordOutcome::row_index);

        let mut unresolved: BTreeMap<&str, usize> = BTreeMap::new();
        for (_, failure) in self.field_failures() {
            if failure.kind == FailureKind::NoPrefetchedData {
                *unresolved.entry(failure.field.as_str()).or_default() += 1;
            }
        }
        for (field, rows) in unresolved {
            warn!(
                "{}: field '{field}' references a model with no lookup data; {rows} row(s) failed. \
                 Migrate the referenced sheet first or supply a lookup file",
                self.model
            );
        }
        let warnings = self.warning_count();
        if warnings > 0 {
            warn!(
                "{}: dropped {warnings} array element(s) that did not match their element type",
                self.model
            );
        }
        info!(
            "{}: {} row(s) processed, {} succeeded, {} failed",
            self.model,
            self.total(),
            self.success_count(),
            self.failure_count()
        );
    }

    pub fn outcomes(&self) -> &[RecordOutcome] {
        &self.outcomes
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.total() - self.success_count()
    }

    pub fn warning_count(&self) -> usize {
        self.records().map(|record| record.warnings.len()).sum()
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.outcomes.iter().filter_map(RecordOutcome::record)
    }

    pub fn failures(&self) -> impl Iterator<Item = &RecordFailure> {
        self.outcomes.iter().filter_map(RecordOutcome::failure)
    }

    /// Every field failure with the row it came from, in row order.
    pub fn field_failures(&self) -> impl Iterator<Item = (usize, &FieldFailure)> {
        self.failures().flat_map(|failure| {
            failure
                .failures
                .iter()
                .map(move |field_failure| (failure.row_index, field_failure))
        })
    }

    pub fn failure_kind_counts(&self) -> BTreeMap<FailureKind, usize> {
        let mut counts = BTreeMap::new();
        for (_, failure) in self.field_failures() {
            *counts.entry(failure.kind).or_default() += 1;
        }
        counts
    }

    pub fn render_summary(&self) -> String {
        let mut rows = vec![
            vec!["rows".to_string(), self.total().to_string()],
            vec!["succeeded".to_string(), self.success_count().to_string()],
            vec!["failed".to_string(), self.failure_count().to_string()],
            vec!["warnings".to_string(), self.warning_count().to_string()],
        ];
        rows.extend(
            self.failure_kind_counts()
                .into_iter()
                .map(|(kind, count)| vec![kind.code().to_string(), count.to_string()]),
        );
        let title = format!("{} summary", self.model);
        render_table(&[title.as_str(), "count"], &rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data::Value, failure::FieldWarning};

    fn success(row_index: usize, warnings: usize) -> RecordOutcome {
        RecordOutcome::Success(Record {
            row_index,
            fields: BTreeMap::from([("title".to_string(), Value::String("t".into()))]),
            warnings: (0..warnings)
                .map(|_| FieldWarning {
                    field: "tags".into(),
                    kind: FailureKind::TypeCoercionError,
                    raw_value: "x".into(),
                    detail: "bad".into(),
                })
                .collect(),
        })
    }

    fn failure(row_index: usize, kinds: &[FailureKind]) -> RecordOutcome {
        RecordOutcome::Failure(RecordFailure {
            row_index,
            failures: kinds
                .iter()
                .map(|kind| FieldFailure {
                    field: "reporterId".into(),
                    kind: *kind,
                    raw_value: "r".into(),
                    detail: String::new(),
                })
                .collect(),
        })
    }

    #[test]
    fn finalize_restores_row_order_and_counts() {
        let mut report = MigrationReport::new("Story");
        report.extend([
            failure(2, &[FailureKind::ForeignKeyNotFound]),
            success(0, 1),
            failure(1, &[FailureKind::NoPrefetchedData, FailureKind::RequiredFieldMissing]),
            success(3, 0),
        ]);
        report.finalize();
        let order: Vec<_> = report.outcomes().iter().map(RecordOutcome::row_index).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
        assert_eq!(report.total(), 4);
        assert_eq!(report.success_count(), 2);
        assert_eq!(report.failure_count(), 2);
        assert_eq!(report.warning_count(), 1);
        let rows: Vec<_> = report.field_failures().map(|(row, _)| row).collect();
        assert_eq!(rows, vec![1, 1, 2]);
        assert_eq!(
            report.failure_kind_counts().get(&FailureKind::NoPrefetchedData),
            Some(&1)
        );
    }

    #[test]
    fn summary_lists_counts_and_failure_kinds() {
        let mut report = MigrationReport::new("Story");
        report.record(success(0, 0));
        report.record(failure(1, &[FailureKind::InvalidEnumValue]));
        report.finalize();
        let summary = report.render_summary();
        assert!(summary.starts_with("Story summary"));
        assert!(summary.lines().any(|line| line.starts_with("succeeded") && line.ends_with('1')));
        assert!(summary.contains("INVALID_ENUM_VALUE"));
    }
}
