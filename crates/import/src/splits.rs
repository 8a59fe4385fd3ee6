use kitty_core::{Member, MemberId, Money, Split};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::csv::{Column, CsvTable, RawImportRow};
use crate::validate::{member_index, parse_decimal, NameMatch};

/// One line of the optional splits file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportSplitRow {
    pub row_number: usize,
    /// `row_id` (or physical row number) of the transaction this split belongs to.
    pub parsed_transaction_row: Option<i64>,
    pub member: String,
    pub matched_member_id: Option<MemberId>,
    pub parsed_owed_amount: Option<Money>,
    pub parsed_owed_percentage: Option<Decimal>,
    pub parsed_paid_amount: Option<Money>,
    pub parsed_paid_percentage: Option<Decimal>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

pub fn validate_split_rows(table: &CsvTable, members: &[Member]) -> Vec<ImportSplitRow> {
    let index = member_index(members);
    table
        .rows
        .iter()
        .map(|raw| validate_split_row(table, raw, &index))
        .collect()
}

fn validate_split_row(
    table: &CsvTable,
    raw: &RawImportRow,
    index: &crate::validate::NameIndex<'_, MemberId>,
) -> ImportSplitRow {
    let field = |column: Column| table.field(raw, column);
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let transaction_raw = field(Column::TransactionRow);
    let parsed_transaction_row = if transaction_raw.is_empty() {
        errors.push("Transaction row is required".to_string());
        None
    } else {
        transaction_raw.parse::<i64>().ok().or_else(|| {
            errors.push(format!("Transaction row '{transaction_raw}' is not a whole number"));
            None
        })
    };

    let member = field(Column::Member).to_string();
    let matched_member_id = if member.is_empty() {
        errors.push("Member is required".to_string());
        None
    } else {
        match index.lookup(&member) {
            NameMatch::Found(id) => Some(id),
            NameMatch::Ambiguous => {
                warnings.push(format!("Member '{member}' matches more than one member; split skipped"));
                None
            }
            NameMatch::Missing => {
                warnings.push(format!("Member '{member}' is not a household member; split skipped"));
                None
            }
        }
    };

    let parsed_owed_amount = amount_field("Owed amount", field(Column::OwedAmount), &mut errors);
    let parsed_owed_percentage =
        percentage_field("Owed percentage", field(Column::OwedPercentage), &mut errors);
    let parsed_paid_amount = amount_field("Paid amount", field(Column::PaidAmount), &mut errors);
    let parsed_paid_percentage =
        percentage_field("Paid percentage", field(Column::PaidPercentage), &mut errors);

    let has_values = [
        field(Column::OwedAmount),
        field(Column::OwedPercentage),
        field(Column::PaidAmount),
        field(Column::PaidPercentage),
    ]
    .iter()
    .any(|v| !v.is_empty());
    if !has_values {
        warnings.push("No owed or paid values given".to_string());
    }

    ImportSplitRow {
        row_number: raw.row_number,
        parsed_transaction_row,
        member,
        matched_member_id,
        parsed_owed_amount,
        parsed_owed_percentage,
        parsed_paid_amount,
        parsed_paid_percentage,
        errors,
        warnings,
    }
}

fn amount_field(label: &str, raw: &str, errors: &mut Vec<String>) -> Option<Money> {
    if raw.is_empty() {
        return None;
    }
    match parse_decimal(raw) {
        Some(v) if v.is_sign_negative() && !v.is_zero() => {
            errors.push(format!("{label} '{raw}' is negative"));
            None
        }
        Some(v) => Some(Money::from_decimal(v)),
        None => {
            errors.push(format!("{label} '{raw}' is not a number"));
            None
        }
    }
}

fn percentage_field(label: &str, raw: &str, errors: &mut Vec<String>) -> Option<Decimal> {
    if raw.is_empty() {
        return None;
    }
    match parse_decimal(raw.trim_end_matches('%')) {
        Some(v) if v < Decimal::ZERO || v > Decimal::ONE_HUNDRED => {
            errors.push(format!("{label} '{raw}' must be between 0 and 100"));
            None
        }
        Some(v) => Some(v),
        None => {
            errors.push(format!("{label} '{raw}' is not a number"));
            None
        }
    }
}

/// Groups split rows by the transaction row they point at. Orphans (no usable
/// transaction row) are dropped.
pub fn group_by_transaction_row(rows: &[ImportSplitRow]) -> BTreeMap<i64, Vec<ImportSplitRow>> {
    let mut groups: BTreeMap<i64, Vec<ImportSplitRow>> = BTreeMap::new();
    for row in rows {
        if let Some(key) = row.parsed_transaction_row {
            groups.entry(key).or_default().push(row.clone());
        }
    }
    groups
}

/// Turns one transaction's split rows into backend splits. `None` means "no
/// explicit split", so the backend applies its default equal split.
///
/// Only rows with a matched member and no errors contribute. A missing amount
/// is derived from its percentage of `total_amount` and vice versa. The splits
/// are not checked to add up to the total.
pub fn build_member_splits(rows: &[ImportSplitRow], total_amount: Money) -> Option<Vec<Split>> {
    let splits: Vec<Split> = rows
        .iter()
        .filter(|row| row.errors.is_empty())
        .filter_map(|row| {
            let member_id = row.matched_member_id?;

            let owed_amount = row
                .parsed_owed_amount
                .or_else(|| row.parsed_owed_percentage.and_then(|p| total_amount.percent(p)));
            let owed_percentage = row
                .parsed_owed_percentage
                .or_else(|| row.parsed_owed_amount.and_then(|a| a.percentage_of(total_amount)));
            let paid_amount = row
                .parsed_paid_amount
                .or_else(|| row.parsed_paid_percentage.and_then(|p| total_amount.percent(p)));
            let paid_percentage = row
                .parsed_paid_percentage
                .or_else(|| row.parsed_paid_amount.and_then(|a| a.percentage_of(total_amount)));

            Some(Split {
                member_id,
                owed_amount,
                owed_percentage,
                paid_amount,
                paid_percentage,
            })
        })
        .collect();

    if splits.is_empty() {
        None
    } else {
        Some(splits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv::{parse, Schema};
    use kitty_core::HouseholdId;
    use std::str::FromStr;

    fn members() -> Vec<Member> {
        named(&["Alex", "Sam"])
    }

    fn named(names: &[&str]) -> Vec<Member> {
        let household_id = HouseholdId::new();
        names
            .iter()
            .map(|name| Member {
                id: MemberId::new(),
                household_id,
                user_id: None,
                display_name: name.to_string(),
            })
            .collect()
    }

    fn split_rows(csv: &str, members: &[Member]) -> Vec<ImportSplitRow> {
        let table = parse(csv.as_bytes(), Schema::Splits).unwrap();
        validate_split_rows(&table, members)
    }

    #[test]
    fn parses_and_matches_members() {
        let m = members();
        let rows = split_rows(
            "transaction_row,member,owed_amount,owed_percentage,paid_amount,paid_percentage\n\
             1,alex,12.50,,25,\n\
             1,Sam,,50%,,\n",
            &m,
        );
        assert_eq!(rows[0].parsed_transaction_row, Some(1));
        assert_eq!(rows[0].matched_member_id, Some(m[0].id));
        assert_eq!(rows[0].parsed_owed_amount, Some(Money::from_cents(1250)));
        assert_eq!(rows[0].parsed_paid_amount, Some(Money::from_cents(2500)));
        assert_eq!(rows[1].parsed_owed_percentage, Some(Decimal::from(50)));
        assert!(rows.iter().all(|r| r.errors.is_empty()));
    }

    #[test]
    fn bad_values_become_errors() {
        let m = members();
        let rows = split_rows(
            "transaction_row,member,owed_amount,owed_percentage\n\
             one,Alex,5,\n\
             2,Alex,-5,\n\
             3,Alex,,150\n\
             4,Nobody,,\n",
            &m,
        );
        assert_eq!(rows[0].parsed_transaction_row, None);
        assert!(rows[0].errors[0].contains("not a whole number"));
        assert!(rows[1].errors[0].contains("negative"));
        assert!(rows[2].errors[0].contains("between 0 and 100"));
        assert_eq!(rows[3].matched_member_id, None);
        assert_eq!(rows[3].warnings.len(), 2);
    }

    #[test]
    fn grouping_drops_orphans_and_keeps_order() {
        let m = members();
        let rows = split_rows(
            "transaction_row,member,owed_amount\n2,Alex,1\n,Sam,1\n1,Sam,2\n2,Sam,3\n",
            &m,
        );
        let groups = group_by_transaction_row(&rows);
        assert_eq!(groups.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        let two: Vec<_> = groups[&2].iter().map(|r| r.member.as_str()).collect();
        assert_eq!(two, vec!["Alex", "Sam"]);
    }

    #[test]
    fn builds_splits_deriving_missing_halves() {
        let m = members();
        let rows = split_rows(
            "transaction_row,member,owed_amount,owed_percentage\n1,Alex,30,\n1,Sam,,70\n",
            &m,
        );
        let splits = build_member_splits(&rows, Money::from_cents(10_000)).unwrap();
        assert_eq!(splits.len(), 2);
        assert_eq!(splits[0].member_id, m[0].id);
        assert_eq!(splits[0].owed_percentage, Some(Decimal::from_str("30").unwrap()));
        assert_eq!(splits[1].owed_amount, Some(Money::from_cents(7000)));
        assert_eq!(splits[1].paid_amount, None);
    }

    #[test]
    fn unmatched_members_are_skipped() {
        let m = members();
        let rows = split_rows("transaction_row,member,owed_amount\n1,Nobody,5\n", &m);
        assert_eq!(build_member_splits(&rows, Money::from_cents(500)), None);
    }

    #[test]
    fn ambiguous_member_gets_no_split() {
        let m = named(&["Sam", "sam", "Alex"]);
        let rows = split_rows("transaction_row,member,owed_amount\n1,Sam,5\n1,Alex,5\n", &m);
        assert_eq!(rows[0].matched_member_id, None);
        assert!(rows[0].warnings[0].contains("more than one member"));

        let splits = build_member_splits(&rows, Money::from_cents(1000)).unwrap();
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0].member_id, m[2].id);
        assert_eq!(build_member_splits(&rows[..1], Money::from_cents(1000)), None);
    }

    #[test]
    fn rows_with_errors_do_not_become_splits() {
        let m = members();
        let rows = split_rows(
            "transaction_row,member,owed_amount,owed_percentage\n1,Alex,-5,\n1,Alex,,150\n",
            &m,
        );
        assert!(rows.iter().all(|r| !r.errors.is_empty()));
        assert_eq!(build_member_splits(&rows, Money::from_cents(1000)), None);
    }

    #[test]
    fn percentage_of_huge_total_is_left_empty() {
        let m = members();
        let rows = split_rows("transaction_row,member,owed_percentage\n1,Alex,50\n", &m);
        let splits = build_member_splits(&rows, Money::from_decimal(Decimal::MAX)).unwrap();
        assert_eq!(splits[0].owed_amount, None);
        assert_eq!(splits[0].owed_percentage, Some(Decimal::from(50)));
    }

    #[test]
    fn empty_input_means_default_split() {
        assert_eq!(build_member_splits(&[], Money::from_cents(100)), None);
    }

    #[test]
    fn amounts_are_not_checked_against_total() {
        let m = members();
        let rows = split_rows("transaction_row,member,owed_amount\n1,Alex,80\n1,Sam,80\n", &m);
        let splits = build_member_splits(&rows, Money::from_cents(10_000)).unwrap();
        let owed: Money = splits.iter().filter_map(|s| s.owed_amount).sum();
        assert_eq!(owed, Money::from_cents(16_000));
    }
}
