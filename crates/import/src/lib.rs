pub mod batch;
pub mod csv;
pub mod duplicates;
pub mod mapping;
pub mod rules;
pub(crate) mod util;
pub mod validate;

pub use batch::{BatchError, BatchState, ImportBatch};
pub use csv::{CsvError, CsvTable};
pub use duplicates::{description_similarity, flag_duplicates, Fingerprint};
pub use mapping::{AmountColumns, ColumnMapping, MappingError, ResolvedMapping};
pub use rules::{condition_matches, CategorizableTransaction, CategoryRuleEngine};
pub use validate::{ImportRow, RowError, RowIssue, ValidationReport};
