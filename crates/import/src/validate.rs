use chrono::NaiveDate;
use kitty_core::{
    Category, CategoryId, Member, MemberId, Money, SplitType, TransactionType, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::config::ImportConfig;
use crate::csv::{Column, CsvTable, RawImportRow};
use crate::summary::{summarize, ImportSummary};
use crate::util::{closest_match, normalize_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Valid,
    ValidWithWarnings,
    Invalid,
}

/// A primary-file row after validation. Raw text is kept next to the parsed
/// values so a failed row can be written back out unchanged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportRow {
    pub row_number: usize,
    pub parsed_csv_row: Option<i64>,
    pub description: String,
    pub category: String,
    pub notes: String,
    pub parsed_date: Option<NaiveDate>,
    pub parsed_amount: Option<Money>,
    pub parsed_type: TransactionType,
    pub parsed_split_type: SplitType,
    pub parsed_excluded_from_budget: bool,
    pub matched_category_id: Option<CategoryId>,
    pub matched_paid_by_member_id: Option<MemberId>,
    pub matched_paid_to_member_id: Option<MemberId>,
    pub matched_split_member_id: Option<MemberId>,
    pub parsed_reimburses_row: Option<i64>,
    pub validation_status: ValidationStatus,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub source_fields: Vec<String>,
}

impl ImportRow {
    pub fn is_valid(&self) -> bool {
        self.validation_status != ValidationStatus::Invalid
    }

    pub fn is_reimbursement_with_reference(&self) -> bool {
        self.parsed_type == TransactionType::Reimbursement && self.parsed_reimburses_row.is_some()
    }

    /// Key a splits file uses to point at this row.
    pub fn split_key(&self) -> i64 {
        self.parsed_csv_row.unwrap_or(self.row_number as i64)
    }
}

/// The snapshot a validation run is measured against. Two runs over the same
/// rows with the same context produce identical output.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub categories: &'a [Category],
    pub members: &'a [Member],
    pub current_user_id: UserId,
    /// Stands in for rows without a date.
    pub today: NaiveDate,
    pub config: &'a ImportConfig,
}

pub(crate) enum NameMatch<T> {
    Found(T),
    Ambiguous,
    Missing,
}

/// Case-insensitive name → id lookup built once per validation pass.
pub(crate) struct NameIndex<'a, T> {
    by_name: HashMap<String, Vec<T>>,
    names: Vec<&'a str>,
}

impl<'a, T: Copy> NameIndex<'a, T> {
    pub(crate) fn new(entries: impl IntoIterator<Item = (&'a str, T)>) -> Self {
        let mut by_name: HashMap<String, Vec<T>> = HashMap::new();
        let mut names = Vec::new();
        for (name, id) in entries {
            by_name.entry(normalize_name(name)).or_default().push(id);
            names.push(name);
        }
        Self { by_name, names }
    }

    pub(crate) fn lookup(&self, name: &str) -> NameMatch<T> {
        match self.by_name.get(&normalize_name(name)).map(Vec::as_slice) {
            Some([id]) => NameMatch::Found(*id),
            Some([_, _, ..]) => NameMatch::Ambiguous,
            _ => NameMatch::Missing,
        }
    }

    fn first(&self, name: &str) -> Option<T> {
        self.by_name
            .get(&normalize_name(name))
            .and_then(|ids| ids.first().copied())
    }

    fn suggestion(&self, name: &str, threshold: f32) -> String {
        closest_match(name, self.names.iter().copied(), threshold)
            .map(|s| format!(" (did you mean '{s}'?)"))
            .unwrap_or_default()
    }
}

pub(crate) fn member_index(members: &[Member]) -> NameIndex<'_, MemberId> {
    NameIndex::new(members.iter().map(|m| (m.display_name.as_str(), m.id)))
}

/// Validates every primary row against the snapshot in `ctx`.
pub fn validate(table: &CsvTable, ctx: &ValidationContext<'_>) -> (Vec<ImportRow>, ImportSummary) {
    let categories = NameIndex::new(ctx.categories.iter().map(|c| (c.name.as_str(), c.id)));
    let members = member_index(ctx.members);
    let current_member = ctx
        .members
        .iter()
        .find(|m| m.user_id == Some(ctx.current_user_id))
        .map(|m| m.display_name.as_str())
        .unwrap_or("you");

    let mut validator = RowValidator {
        table,
        ctx,
        categories,
        members,
        current_member,
        seen_row_ids: HashMap::new(),
    };

    let rows: Vec<ImportRow> = table.rows.iter().map(|raw| validator.validate_row(raw)).collect();
    let summary = summarize(&rows, &[], ctx.categories);
    (rows, summary)
}

struct RowValidator<'t, 'c> {
    table: &'t CsvTable,
    ctx: &'t ValidationContext<'c>,
    categories: NameIndex<'c, CategoryId>,
    members: NameIndex<'c, MemberId>,
    current_member: &'c str,
    seen_row_ids: HashMap<i64, usize>,
}

impl RowValidator<'_, '_> {
    fn validate_row(&mut self, raw: &RawImportRow) -> ImportRow {
        let table = self.table;
        let field = |column: Column| table.field(raw, column);
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let description = field(Column::Description).to_string();
        if description.is_empty() {
            errors.push("Description is required".to_string());
        }

        let parsed_date = self.check_date(field(Column::Date), &mut errors, &mut warnings);
        let parsed_amount = check_amount(field(Column::Amount), &mut errors, &mut warnings);

        let reimburses_raw = field(Column::ReimbursesRow);
        let parsed_type = check_type(field(Column::Type), !reimburses_raw.is_empty(), &mut warnings);

        let parsed_csv_row = self.check_row_id(raw.row_number, field(Column::RowId), &mut errors);

        let parsed_reimburses_row = match (parsed_type, reimburses_raw.is_empty()) {
            (_, true) => None,
            (TransactionType::Reimbursement, false) => match reimburses_raw.parse::<i64>() {
                Ok(target) if Some(target) == parsed_csv_row => {
                    errors.push("A reimbursement cannot reference its own row".to_string());
                    None
                }
                Ok(target) => Some(target),
                Err(_) => {
                    errors.push(format!(
                        "Reimburses row '{reimburses_raw}' is not a whole number"
                    ));
                    None
                }
            },
            (other, false) => {
                warnings.push(format!("Reimburses row ignored for {other} transactions"));
                None
            }
        };

        let category = field(Column::Category).to_string();
        let matched_category_id = self.check_category(&category, &mut warnings);

        let matched_paid_by_member_id = self.check_paid_by(field(Column::PaidBy), &mut warnings);

        let paid_to = field(Column::PaidTo);
        if paid_to.is_empty() && parsed_type == TransactionType::Settlement {
            warnings.push("Settlement has no paid-to member".to_string());
        }
        let matched_paid_to_member_id = self.check_member("Paid to", paid_to, "left empty", &mut warnings);

        let parsed_split_type = match field(Column::SplitType) {
            "" => SplitType::default(),
            raw_split => SplitType::from_str(raw_split).unwrap_or_else(|_| {
                warnings.push(format!("Unknown split type '{raw_split}', splitting equally"));
                SplitType::default()
            }),
        };

        let split_member = field(Column::SplitMember);
        let fallback = format!("defaults to {}", self.current_member);
        if split_member.is_empty() && parsed_split_type == SplitType::MemberOnly {
            warnings.push(format!("Split type member_only has no split member; {fallback}"));
        }
        let matched_split_member_id =
            self.check_member("Split member", split_member, &fallback, &mut warnings);

        let parsed_excluded_from_budget =
            check_flag(field(Column::ExcludedFromBudget), &mut warnings);

        let validation_status = if !errors.is_empty() {
            ValidationStatus::Invalid
        } else if !warnings.is_empty() {
            ValidationStatus::ValidWithWarnings
        } else {
            ValidationStatus::Valid
        };

        ImportRow {
            row_number: raw.row_number,
            parsed_csv_row,
            description,
            category,
            notes: field(Column::Notes).to_string(),
            parsed_date,
            parsed_amount,
            parsed_type,
            parsed_split_type,
            parsed_excluded_from_budget,
            matched_category_id,
            matched_paid_by_member_id,
            matched_paid_to_member_id,
            matched_split_member_id,
            parsed_reimburses_row,
            validation_status,
            errors,
            warnings,
            source_fields: raw.fields.clone(),
        }
    }

    fn check_date(
        &self,
        raw: &str,
        errors: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) -> Option<NaiveDate> {
        if raw.is_empty() {
            warnings.push(format!("No date given, using {}", self.ctx.today));
            return Some(self.ctx.today);
        }
        let parsed = parse_date(raw, &self.ctx.config.date_formats);
        if parsed.is_none() {
            errors.push(format!(
                "Invalid date '{raw}' (accepted formats: {})",
                self.ctx.config.date_formats.join(", ")
            ));
        }
        parsed
    }

    fn check_row_id(&mut self, row_number: usize, raw: &str, errors: &mut Vec<String>) -> Option<i64> {
        if raw.is_empty() {
            return None;
        }
        let Ok(id) = raw.parse::<i64>() else {
            errors.push(format!("Row id '{raw}' is not a whole number"));
            return None;
        };
        if let Some(first) = self.seen_row_ids.get(&id) {
            errors.push(format!("Row id {id} is already used on row {first}"));
            return None;
        }
        self.seen_row_ids.insert(id, row_number);
        Some(id)
    }

    fn check_category(&self, raw: &str, warnings: &mut Vec<String>) -> Option<CategoryId> {
        if raw.is_empty() {
            return None;
        }
        // Duplicate category names cannot be told apart, so the first one wins.
        let found = self.categories.first(raw);
        if found.is_none() {
            warnings.push(format!(
                "New category '{raw}' will be created{}",
                self.categories.suggestion(raw, self.ctx.config.suggestion_threshold)
            ));
        }
        found
    }

    fn check_paid_by(&self, raw: &str, warnings: &mut Vec<String>) -> Option<MemberId> {
        if raw.is_empty() {
            warnings.push(format!("Paid by not given; defaults to {}", self.current_member));
            return None;
        }
        let fallback = format!("defaults to {}", self.current_member);
        self.check_member("Paid by", raw, &fallback, warnings)
    }

    fn check_member(
        &self,
        label: &str,
        raw: &str,
        fallback: &str,
        warnings: &mut Vec<String>,
    ) -> Option<MemberId> {
        if raw.is_empty() {
            return None;
        }
        match self.members.lookup(raw) {
            NameMatch::Found(id) => Some(id),
            NameMatch::Ambiguous => {
                warnings.push(format!("{label} '{raw}' matches more than one member; {fallback}"));
                None
            }
            NameMatch::Missing => {
                warnings.push(format!(
                    "{label} '{raw}' is not a household member{}; {fallback}",
                    self.members.suggestion(raw, self.ctx.config.suggestion_threshold)
                ));
                None
            }
        }
    }
}

fn check_amount(raw: &str, errors: &mut Vec<String>, warnings: &mut Vec<String>) -> Option<Money> {
    if raw.is_empty() {
        errors.push("Amount is required".to_string());
        return None;
    }
    let value = match parse_decimal(raw) {
        Some(v) => v,
        None => {
            errors.push(format!("Amount '{raw}' is not a number"));
            return None;
        }
    };
    if value.is_zero() {
        errors.push("Amount must be greater than zero".to_string());
        return None;
    }
    if value.is_sign_negative() {
        errors.push(format!(
            "Amount '{raw}' is negative; use the type column for income and reimbursements"
        ));
        return None;
    }
    let amount = Money::from_decimal(value);
    if amount > Money::MAX {
        errors.push(format!("Amount '{raw}' is larger than {}", Money::MAX));
        return None;
    }
    if amount.as_decimal() != value {
        warnings.push(format!("Amount {value} rounded to {amount}"));
    }
    if !amount.is_positive() {
        errors.push(format!("Amount '{raw}' rounds to zero"));
        return None;
    }
    Some(amount)
}

fn check_type(raw: &str, has_reference: bool, warnings: &mut Vec<String>) -> TransactionType {
    if let Ok(t) = TransactionType::from_str(raw) {
        return t;
    }
    let (fallback, why) = if has_reference {
        (TransactionType::Reimbursement, "it references another row")
    } else {
        (TransactionType::Expense, "default")
    };
    if raw.is_empty() {
        warnings.push(format!("No type given, using {fallback} ({why})"));
    } else {
        warnings.push(format!("Unknown type '{raw}', using {fallback} ({why})"));
    }
    fallback
}

fn check_flag(raw: &str, warnings: &mut Vec<String>) -> bool {
    match raw.to_lowercase().as_str() {
        "" | "false" | "no" | "n" | "0" => false,
        "true" | "yes" | "y" | "1" | "x" => true,
        _ => {
            warnings.push(format!("Excluded from budget '{raw}' not understood, using no"));
            false
        }
    }
}

pub(crate) fn parse_date(raw: &str, formats: &[String]) -> Option<NaiveDate> {
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw.trim(), fmt).ok())
}

/// Exact decimal parse tolerating a currency sign, thousands separators, and
/// accounting parentheses for negatives.
pub(crate) fn parse_decimal(raw: &str) -> Option<Decimal> {
    let s = raw.trim();
    let (negative, s) = match s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, s),
    };
    let cleaned = s.replace([',', '$', ' '], "");
    if cleaned.is_empty() {
        return None;
    }
    let value = Decimal::from_str(&cleaned).ok()?;
    Some(if negative { -value } else { value })
}
