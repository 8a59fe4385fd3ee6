use kitty_core::{Category, Money};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::splits::ImportSplitRow;
use crate::util::normalize_name;
use crate::validate::{ImportRow, ValidationStatus};

/// Dataset-level numbers shown to the user before they confirm an import.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImportSummary {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub warning_rows: usize,
    pub invalid_rows: usize,
    pub total_split_rows: usize,
    pub orphaned_split_rows: usize,
    /// Split rows that point at a transaction but carry errors; they are not applied.
    pub invalid_split_rows: usize,
    pub transactions_with_splits: usize,
    /// Distinct (case-insensitive) names in file order, first spelling kept.
    pub new_categories_to_create: Vec<String>,
    /// Sum of amounts over rows that will be imported.
    pub total_amount: Money,
}

impl ImportSummary {
    pub fn importable_rows(&self) -> usize {
        self.valid_rows + self.warning_rows
    }
}

/// Rows the orchestrator will try to commit, in file order.
pub fn rows_to_import(rows: &[ImportRow]) -> Vec<&ImportRow> {
    rows.iter().filter(|r| r.is_valid()).collect()
}

pub fn summarize(
    rows: &[ImportRow],
    split_rows: &[ImportSplitRow],
    existing_categories: &[Category],
) -> ImportSummary {
    let mut summary = ImportSummary {
        total_rows: rows.len(),
        total_split_rows: split_rows.len(),
        ..Default::default()
    };

    for row in rows {
        match row.validation_status {
            ValidationStatus::Valid => summary.valid_rows += 1,
            ValidationStatus::ValidWithWarnings => summary.warning_rows += 1,
            ValidationStatus::Invalid => summary.invalid_rows += 1,
        }
    }

    let existing: HashSet<String> = existing_categories
        .iter()
        .map(|c| normalize_name(&c.name))
        .collect();
    let mut seen = HashSet::new();
    for row in rows.iter().filter(|r| r.is_valid()) {
        if row.category.is_empty() || row.matched_category_id.is_some() {
            continue;
        }
        let key = normalize_name(&row.category);
        if !existing.contains(&key) && seen.insert(key) {
            summary.new_categories_to_create.push(row.category.clone());
        }
    }

    summary.total_amount = rows
        .iter()
        .filter(|r| r.is_valid())
        .filter_map(|r| r.parsed_amount)
        .sum();

    summary.orphaned_split_rows = split_rows
        .iter()
        .filter(|s| s.parsed_transaction_row.is_none())
        .count();
    summary.invalid_split_rows = split_rows
        .iter()
        .filter(|s| s.parsed_transaction_row.is_some() && !s.errors.is_empty())
        .count();
    let split_keys: HashSet<i64> = split_rows
        .iter()
        .filter(|s| s.errors.is_empty())
        .filter_map(|s| s.parsed_transaction_row)
        .collect();
    summary.transactions_with_splits = rows
        .iter()
        .filter(|r| r.is_valid() && split_keys.contains(&r.split_key()))
        .count();

    summary
}
