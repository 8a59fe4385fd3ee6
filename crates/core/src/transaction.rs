use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::household::{
    CategoryId, HouseholdId, MemberId, PaidByType, SplitType, TransactionId, TransactionType,
    UserId,
};
use super::money::Money;

/// One member's share of a transaction. Amounts and percentages are optional
/// independently; the backend fills whatever is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub member_id: MemberId,
    pub owed_amount: Option<Money>,
    pub owed_percentage: Option<Decimal>,
    pub paid_amount: Option<Money>,
    pub paid_percentage: Option<Decimal>,
}

/// Everything the backend needs to record a transaction together with its splits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub household_id: HouseholdId,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Money,
    pub transaction_type: TransactionType,
    pub paid_by_member_id: Option<MemberId>,
    pub paid_to_member_id: Option<MemberId>,
    pub category_id: Option<CategoryId>,
    pub split_type: SplitType,
    pub paid_by_type: PaidByType,
    pub split_member_id: Option<MemberId>,
    pub reimburses_transaction_id: Option<TransactionId>,
    pub excluded_from_budget: bool,
    pub notes: Option<String>,
    pub created_by_user_id: UserId,
    /// `None` means "let the backend apply its default equal split".
    pub splits: Option<Vec<Split>>,
}

impl NewTransaction {
    pub fn total_owed(&self) -> Money {
        self.splits
            .iter()
            .flatten()
            .filter_map(|s| s.owed_amount)
            .sum()
    }
}

/// More than one member contributing a paid amount makes it a shared payment.
pub fn paid_by_type_for(splits: Option<&[Split]>) -> PaidByType {
    let payers = splits
        .unwrap_or_default()
        .iter()
        .filter(|s| s.paid_amount.is_some_and(|m| m.is_positive()))
        .count();
    if payers > 1 {
        PaidByType::Multiple
    } else {
        PaidByType::Single
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(paid: Option<i64>, owed: Option<i64>) -> Split {
        Split {
            member_id: MemberId::new(),
            owed_amount: owed.map(Money::from_cents),
            owed_percentage: None,
            paid_amount: paid.map(Money::from_cents),
            paid_percentage: None,
        }
    }

    #[test]
    fn single_payer_without_splits() {
        assert_eq!(paid_by_type_for(None), PaidByType::Single);
        assert_eq!(paid_by_type_for(Some(&[])), PaidByType::Single);
    }

    #[test]
    fn multiple_payers_from_paid_amounts() {
        let splits = vec![split(Some(1000), None), split(Some(500), None)];
        assert_eq!(paid_by_type_for(Some(&splits)), PaidByType::Multiple);

        let one = vec![split(Some(1500), None), split(None, Some(750))];
        assert_eq!(paid_by_type_for(Some(&one)), PaidByType::Single);
    }

    #[test]
    fn total_owed_sums_present_amounts() {
        let tx = NewTransaction {
            household_id: HouseholdId::new(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            description: "Dinner".to_string(),
            amount: Money::from_cents(3000),
            transaction_type: TransactionType::Expense,
            paid_by_member_id: None,
            paid_to_member_id: None,
            category_id: None,
            split_type: SplitType::Amount,
            paid_by_type: PaidByType::Single,
            split_member_id: None,
            reimburses_transaction_id: None,
            excluded_from_budget: false,
            notes: None,
            created_by_user_id: UserId::new(),
            splits: Some(vec![split(None, Some(1000)), split(None, Some(2000)), split(None, None)]),
        };
        assert_eq!(tx.total_owed(), Money::from_cents(3000));
    }
}
