pub mod color;
pub mod config;
pub mod csv;
pub mod export;
pub mod orchestrator;
pub mod splits;
pub mod summary;
pub(crate) mod util;
pub mod validate;

pub use color::{ColorSource, RandomPalette, SeededPalette};
pub use config::{ConfigError, ImportConfig};
pub use self::csv::{Column, CsvTable, ParseError, RawImportRow, Schema};
pub use export::{commit_failures_to_csv, to_csv, ExportError};
pub use orchestrator::{
    CommitFailure, CommitRequest, ImportError, ImportOrchestrator, ImportPhase, ImportResult,
};
pub use splits::{build_member_splits, group_by_transaction_row, validate_split_rows, ImportSplitRow};
pub use summary::{rows_to_import, summarize, ImportSummary};
pub use validate::{validate, ImportRow, ValidationContext, ValidationStatus};

pub mod import {
    use crate::*;

    /// Everything a user reviews before confirming: validated rows from both
    /// files and the combined summary.
    #[derive(Debug, Clone, serde::Serialize)]
    pub struct Preview {
        pub headers: Vec<String>,
        pub rows: Vec<ImportRow>,
        pub split_rows: Vec<ImportSplitRow>,
        pub summary: ImportSummary,
    }

    /// Parses and validates a primary file and, optionally, its splits file.
    pub fn preview(
        transactions: &[u8],
        splits: Option<&[u8]>,
        ctx: &ValidationContext<'_>,
    ) -> Result<Preview, ParseError> {
        let table = crate::csv::parse(transactions, Schema::Transactions)?;
        let (rows, _) = validate(&table, ctx);

        let split_rows = match splits {
            Some(data) => {
                let split_table = crate::csv::parse(data, Schema::Splits)?;
                validate_split_rows(&split_table, ctx.members)
            }
            None => Vec::new(),
        };

        let summary = summarize(&rows, &split_rows, ctx.categories);
        Ok(Preview {
            headers: table.headers,
            rows,
            split_rows,
            summary,
        })
    }

    pub fn create_orchestrator<B: kitty_core::HouseholdBackend>(
        backend: B,
        config: ImportConfig,
    ) -> ImportOrchestrator<B> {
        ImportOrchestrator::new(backend, config)
    }
}
