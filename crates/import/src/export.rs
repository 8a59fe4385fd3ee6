use std::collections::HashMap;
use thiserror::Error;

use crate::orchestrator::ImportResult;
use crate::validate::{ImportRow, ValidationStatus};

/// Name of the column appended to exported files.
pub const ISSUES_COLUMN: &str = "import_issues";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to flush CSV output: {0}")]
    Flush(String),
    #[error("Output is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Writes every row that is not plainly valid back out in its original columns,
/// with its errors and warnings joined into a trailing column. The result parses
/// back with [`crate::csv::parse`].
pub fn to_csv(headers: &[String], rows: &[ImportRow]) -> Result<String, ExportError> {
    let flagged = rows
        .iter()
        .filter(|r| r.validation_status != ValidationStatus::Valid)
        .map(|r| {
            let issues: Vec<&str> = r
                .errors
                .iter()
                .chain(r.warnings.iter())
                .map(String::as_str)
                .collect();
            (r, issues.join("; "))
        });
    write_rows(headers, flagged)
}

/// Rows whose create call failed during commit, each with the backend message.
pub fn commit_failures_to_csv(
    headers: &[String],
    rows: &[ImportRow],
    result: &ImportResult,
) -> Result<String, ExportError> {
    let messages: HashMap<usize, &str> = result
        .failed_rows
        .iter()
        .map(|f| (f.row_number, f.message.as_str()))
        .collect();
    let failed = rows
        .iter()
        .filter_map(|r| messages.get(&r.row_number).map(|m| (r, m.to_string())));
    write_rows(headers, failed)
}

fn write_rows<'a>(
    headers: &[String],
    rows: impl Iterator<Item = (&'a ImportRow, String)>,
) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header_record: Vec<&str> = headers.iter().map(String::as_str).collect();
    header_record.push(ISSUES_COLUMN);
    writer.write_record(&header_record)?;

    for (row, issues) in rows {
        // Short rows are padded; fields past the header had no column to begin with.
        let mut record: Vec<&str> = (0..headers.len())
            .map(|i| row.source_fields.get(i).map_or("", String::as_str))
            .collect();
        record.push(&issues);
        writer.write_record(&record)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Flush(e.error().to_string()))?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImportConfig;
    use crate::csv::{parse, Column, Schema};
    use crate::orchestrator::CommitFailure;
    use crate::validate::{validate, ValidationContext};
    use chrono::NaiveDate;
    use kitty_core::UserId;

    fn validated(csv: &str) -> (Vec<String>, Vec<ImportRow>) {
        let table = parse(csv.as_bytes(), Schema::Transactions).unwrap();
        let config = ImportConfig::default();
        let ctx = ValidationContext {
            categories: &[],
            members: &[],
            current_user_id: UserId::new(),
            today: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            config: &config,
        };
        let (rows, _) = validate(&table, &ctx);
        (table.headers.clone(), rows)
    }

    #[test]
    fn exports_flagged_rows_and_parses_back() {
        let (headers, rows) = validated(
            "date,description,amount,type,paid_by,notes\n\
             2024-01-01,Rent,900,expense,,\n\
             2024-01-02,\"Pizza, large\",abc,expense,,\"said \"\"hi\"\"\nand left\"\n",
        );
        // Both rows carry at least one warning (no matching members), the second an error.
        assert_eq!(rows.len(), 2);
        let text = to_csv(&headers, &rows).unwrap();

        let reparsed = parse(text.as_bytes(), Schema::Transactions).unwrap();
        assert_eq!(reparsed.headers.last().map(String::as_str), Some(ISSUES_COLUMN));
        assert_eq!(reparsed.rows.len(), 2);
        let pizza = &reparsed.rows[1];
        assert_eq!(reparsed.field(pizza, Column::Description), "Pizza, large");
        assert_eq!(reparsed.field(pizza, Column::Notes), "said \"hi\"\nand left");
        assert_eq!(pizza.fields[..headers.len()], rows[1].source_fields[..]);
        assert!(pizza.fields.last().unwrap().contains("Amount 'abc' is not a number"));
    }

    #[test]
    fn clean_rows_are_left_out() {
        let (headers, mut rows) = validated("description,amount\nTea,2\nCake,x\n");
        rows[0].validation_status = ValidationStatus::Valid;
        rows[0].warnings.clear();
        let text = to_csv(&headers, &rows).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.starts_with("description,amount,import_issues\n"));
        assert!(text.contains("Cake,x,"));
    }

    #[test]
    fn short_rows_are_padded() {
        let (headers, rows) = validated("description,amount,notes\nTea\n");
        let text = to_csv(&headers, &rows).unwrap();
        assert!(text.lines().nth(1).unwrap().starts_with("Tea,,,"));
    }

    #[test]
    fn commit_failures_carry_backend_message() {
        let (headers, rows) = validated("description,amount\nA,1\nB,2\nC,3\n");
        let result = ImportResult {
            success_count: 2,
            failed_count: 1,
            failed_rows: vec![CommitFailure {
                row_number: 3,
                message: "backend unavailable: timeout".to_string(),
            }],
            ..Default::default()
        };
        let text = commit_failures_to_csv(&headers, &rows, &result).unwrap();
        assert_eq!(text, "description,amount,import_issues\nB,2,backend unavailable: timeout\n");
    }
}
