use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::csv::{read_table, CsvError, CsvTable};
use crate::duplicates::{flag_duplicates, Fingerprint, DEFAULT_SIMILARITY_THRESHOLD};
use crate::mapping::{ColumnMapping, MappingError, ResolvedMapping};
use crate::validate::{validate_rows, ImportRow, ValidationReport};

/// Lifecycle of one upload. Every step is triggered explicitly by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchState {
    Uploaded,
    Mapped,
    Validated,
    Committed,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchState::Uploaded => write!(f, "uploaded"),
            BatchState::Mapped => write!(f, "mapped"),
            BatchState::Validated => write!(f, "validated"),
            BatchState::Committed => write!(f, "committed"),
        }
    }
}

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Cannot {action} an import that is {state}")]
    InvalidState {
        action: &'static str,
        state: BatchState,
    },
    #[error(transparent)]
    Csv(#[from] CsvError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
}

/// One uploaded file moving through upload, mapping, validation and commit.
#[derive(Debug, Clone)]
pub struct ImportBatch {
    pub id: Uuid,
    pub file_name: String,
    pub table: CsvTable,
    pub created_at: DateTime<Utc>,
    pub touched_at: DateTime<Utc>,
    state: BatchState,
    mapping: Option<(ColumnMapping, ResolvedMapping)>,
    report: Option<ValidationReport>,
}

impl ImportBatch {
    pub fn upload(file_name: &str, bytes: &[u8]) -> Result<Self, BatchError> {
        let table = read_table(bytes)?;
        let now = Utc::now();
        Ok(ImportBatch {
            id: Uuid::new_v4(),
            file_name: file_name.to_string(),
            table,
            created_at: now,
            touched_at: now,
            state: BatchState::Uploaded,
            mapping: None,
            report: None,
        })
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn suggested_mapping(&self) -> ColumnMapping {
        ColumnMapping::detect(&self.table.headers)
    }

    pub fn mapping(&self) -> Option<&ColumnMapping> {
        self.mapping.as_ref().map(|(m, _)| m)
    }

    pub fn report(&self) -> Option<&ValidationReport> {
        self.report.as_ref()
    }

    /// Allowed until commit. Re-mapping discards an earlier validation.
    pub fn apply_mapping(&mut self, mapping: ColumnMapping) -> Result<(), BatchError> {
        self.require(
            "map",
            &[BatchState::Uploaded, BatchState::Mapped, BatchState::Validated],
        )?;
        let resolved = mapping.resolve(&self.table)?;
        self.mapping = Some((mapping, resolved));
        self.report = None;
        self.transition(BatchState::Mapped);
        Ok(())
    }

    /// Classifies every row under the current mapping. Leaves the batch
    /// unchanged; see [`ImportBatch::record_validation`].
    pub fn validate(&self) -> Result<ValidationReport, BatchError> {
        self.require("validate", &[BatchState::Mapped, BatchState::Validated])?;
        match &self.mapping {
            Some((_, resolved)) => Ok(validate_rows(&self.table, resolved)),
            None => Err(BatchError::InvalidState {
                action: "validate",
                state: self.state,
            }),
        }
    }

    /// Flags rows repeating `existing` transactions or each other, then stores
    /// the report and moves to `Validated`.
    pub fn record_validation(
        &mut self,
        mut report: ValidationReport,
        existing: &[Fingerprint],
    ) -> Result<&ValidationReport, BatchError> {
        self.require("validate", &[BatchState::Mapped, BatchState::Validated])?;
        flag_duplicates(&mut report.valid, existing, DEFAULT_SIMILARITY_THRESHOLD);
        self.transition(BatchState::Validated);
        Ok(self.report.insert(report))
    }

    /// Valid rows to insert on commit, optionally without flagged duplicates.
    pub fn rows_to_commit(&self, skip_duplicates: bool) -> Result<Vec<&ImportRow>, BatchError> {
        self.require("commit", &[BatchState::Validated])?;
        Ok(self
            .report
            .iter()
            .flat_map(|r| r.valid.iter())
            .filter(|row| !(skip_duplicates && row.duplicate))
            .collect())
    }

    pub fn mark_committed(&mut self) -> Result<(), BatchError> {
        self.require("commit", &[BatchState::Validated])?;
        self.transition(BatchState::Committed);
        Ok(())
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.touched_at > ttl
    }

    fn require(&self, action: &'static str, allowed: &[BatchState]) -> Result<(), BatchError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(BatchError::InvalidState {
                action,
                state: self.state,
            })
        }
    }

    fn transition(&mut self, next: BatchState) {
        tracing::debug!(batch_id = %self.id, from = %self.state, to = %next, "Import batch transition");
        self.state = next;
        self.touched_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use categorizer_core::Money;
    use chrono::NaiveDate;

    const CSV: &[u8] = b"Date,Description,Amount,Merchant,Notes\n\
        2026-02-15,TestTransaction,-25.50,Test Merchant,Test import transaction\n\
        2026-02-14,Another Transaction,-15.00,Another Merchant,Second test transaction\n\
        2026-02-13,Third Transaction,-10.75,Third Merchant,Third test transaction\n";

    fn mapped() -> ImportBatch {
        let mut batch = ImportBatch::upload("test.csv", CSV).unwrap();
        let suggestion = batch.suggested_mapping();
        batch.apply_mapping(suggestion).unwrap();
        batch
    }

    fn validate(batch: &mut ImportBatch) -> Result<&ValidationReport, BatchError> {
        let report = batch.validate()?;
        batch.record_validation(report, &[])
    }

    #[test]
    fn full_lifecycle() {
        let mut batch = ImportBatch::upload("test.csv", CSV).unwrap();
        assert_eq!(batch.state(), BatchState::Uploaded);
        assert_eq!(batch.table.rows.len(), 3);

        let suggestion = batch.suggested_mapping();
        batch.apply_mapping(suggestion).unwrap();
        assert_eq!(batch.state(), BatchState::Mapped);

        let report = validate(&mut batch).unwrap();
        assert_eq!(report.valid_count(), 3);
        assert_eq!(report.error_count(), 0);
        assert_eq!(batch.state(), BatchState::Validated);

        assert_eq!(batch.rows_to_commit(false).unwrap().len(), 3);
        batch.mark_committed().unwrap();
        assert_eq!(batch.state(), BatchState::Committed);
    }

    #[test]
    fn steps_cannot_be_skipped() {
        let mut batch = ImportBatch::upload("test.csv", CSV).unwrap();
        assert!(matches!(
            batch.validate(),
            Err(BatchError::InvalidState { state: BatchState::Uploaded, .. })
        ));
        assert!(batch.rows_to_commit(false).is_err());

        let mut batch = mapped();
        assert!(matches!(
            batch.mark_committed(),
            Err(BatchError::InvalidState { state: BatchState::Mapped, .. })
        ));
        validate(&mut batch).unwrap();
        batch.mark_committed().unwrap();
        assert!(batch.mark_committed().is_err());
        assert!(batch.apply_mapping(ColumnMapping::default()).is_err());
    }

    #[test]
    fn remapping_clears_validation() {
        let mut batch = mapped();
        validate(&mut batch).unwrap();
        assert!(batch.report().is_some());

        let mapping = batch.suggested_mapping();
        batch.apply_mapping(mapping).unwrap();
        assert_eq!(batch.state(), BatchState::Mapped);
        assert!(batch.report().is_none());
    }

    #[test]
    fn bad_mapping_keeps_previous_state() {
        let mut batch = ImportBatch::upload("test.csv", CSV).unwrap();
        let err = batch.apply_mapping(ColumnMapping::default()).unwrap_err();
        assert!(matches!(err, BatchError::Mapping(MappingError::MissingField("date"))));
        assert_eq!(batch.state(), BatchState::Uploaded);
    }

    #[test]
    fn skip_duplicates_on_commit() {
        let mut batch = mapped();
        let report = batch.validate().unwrap();
        let existing = vec![Fingerprint {
            date: NaiveDate::from_ymd_opt(2026, 2, 14).unwrap(),
            description: "another transaction".to_string(),
            amount: Money::from_cents(-1500),
        }];
        let recorded = batch.record_validation(report, &existing).unwrap();
        assert_eq!(recorded.duplicate_count(), 1);
        assert_eq!(batch.rows_to_commit(true).unwrap().len(), 2);
        assert_eq!(batch.rows_to_commit(false).unwrap().len(), 3);
    }

    #[test]
    fn unrecorded_validation_leaves_batch_mapped() {
        let mut batch = mapped();
        let report = batch.validate().unwrap();
        assert_eq!(report.valid_count(), 3);
        // Dropping the report, as when the duplicate lookup fails.
        drop(report);
        assert_eq!(batch.state(), BatchState::Mapped);
        assert!(batch.report().is_none());
        assert!(matches!(
            batch.rows_to_commit(true),
            Err(BatchError::InvalidState { state: BatchState::Mapped, .. })
        ));
    }

    #[test]
    fn upload_rejects_empty_file() {
        assert!(matches!(
            ImportBatch::upload("empty.csv", b"Date,Description,Amount\n"),
            Err(BatchError::Csv(CsvError::NoDataRows))
        ));
    }

    #[test]
    fn expiry_uses_last_touch() {
        let batch = ImportBatch::upload("test.csv", CSV).unwrap();
        let ttl = chrono::Duration::minutes(10);
        assert!(!batch.is_expired(batch.touched_at + chrono::Duration::minutes(5), ttl));
        assert!(batch.is_expired(batch.touched_at + chrono::Duration::minutes(11), ttl));
    }
}
