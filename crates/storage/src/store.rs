use async_trait::async_trait;
use kitty_core::{
    BackendError, Category, CategoryId, HouseholdBackend, HouseholdId, MemberId, Money,
    NewTransaction, Split, SplitType, TransactionId,
};
use tracing::debug;

use crate::db::{get_categories, get_members, DbPool, StoreError};

/// [`HouseholdBackend`] over the local SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Splits for a transaction that came without explicit ones: the payer paid
    /// everything and the owed side follows the split type. Equal splits spread
    /// leftover cents over the first members.
    async fn default_splits(&self, transaction: &NewTransaction) -> Result<Vec<Split>, StoreError> {
        let total = transaction
            .amount
            .to_cents()
            .ok_or_else(|| StoreError::Invalid(format!("amount {} out of range", transaction.amount)))?;

        let owed_by: Vec<MemberId> = match transaction.split_type {
            SplitType::MemberOnly => transaction.split_member_id.into_iter().collect(),
            SplitType::PayerOnly => transaction.paid_by_member_id.into_iter().collect(),
            SplitType::Equal | SplitType::Amount | SplitType::Percentage => {
                get_members(&self.pool, transaction.household_id)
                    .await?
                    .into_iter()
                    .map(|m| m.id)
                    .collect()
            }
        };

        let mut splits: Vec<Split> = Vec::new();
        if !owed_by.is_empty() {
            let count = owed_by.len() as i64;
            let (share, remainder) = (total / count, total % count);
            for (i, member_id) in owed_by.into_iter().enumerate() {
                let owed = Money::from_cents(share + i64::from((i as i64) < remainder));
                splits.push(Split {
                    member_id,
                    owed_amount: Some(owed),
                    owed_percentage: owed.percentage_of(transaction.amount),
                    paid_amount: None,
                    paid_percentage: None,
                });
            }
        }

        if let Some(payer) = transaction.paid_by_member_id {
            match splits.iter_mut().find(|s| s.member_id == payer) {
                Some(split) => split.paid_amount = Some(transaction.amount),
                None => splits.push(Split {
                    member_id: payer,
                    owed_amount: None,
                    owed_percentage: None,
                    paid_amount: Some(transaction.amount),
                    paid_percentage: None,
                }),
            }
            for split in splits.iter_mut().filter(|s| s.member_id == payer) {
                split.paid_percentage = transaction.amount.percentage_of(transaction.amount);
            }
        }

        Ok(splits)
    }
}

fn backend_error(e: sqlx::Error) -> BackendError {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            BackendError::Duplicate(db.message().to_string())
        }
        sqlx::Error::Database(db) => BackendError::Rejected(db.message().to_string()),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            BackendError::Unavailable(e.to_string())
        }
        other => BackendError::Rejected(other.to_string()),
    }
}

impl From<StoreError> for BackendError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Sqlx(e) => backend_error(e),
            other => BackendError::Rejected(other.to_string()),
        }
    }
}

fn cents(amount: Option<Money>) -> Result<Option<i64>, BackendError> {
    amount
        .map(|m| {
            m.to_cents()
                .ok_or_else(|| BackendError::Rejected(format!("amount {m} out of range")))
        })
        .transpose()
}

#[async_trait]
impl HouseholdBackend for SqliteStore {
    async fn create_category(
        &self,
        household_id: HouseholdId,
        name: &str,
        icon: Option<&str>,
        color: Option<&str>,
        image_url: Option<&str>,
        sort_order: i32,
    ) -> Result<Category, BackendError> {
        let category = Category {
            id: CategoryId::new(),
            household_id,
            name: name.to_string(),
            icon: icon.map(str::to_string),
            color: color.map(str::to_string),
            image_url: image_url.map(str::to_string),
            sort_order,
        };
        sqlx::query(
            "INSERT INTO categories (id, household_id, name, icon, color, image_url, sort_order) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(category.id.to_string())
        .bind(household_id.to_string())
        .bind(&category.name)
        .bind(&category.icon)
        .bind(&category.color)
        .bind(&category.image_url)
        .bind(sort_order)
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;

        debug!(name, id = %category.id, "category stored");
        Ok(category)
    }

    async fn fetch_categories(&self, household_id: HouseholdId) -> Result<Vec<Category>, BackendError> {
        Ok(get_categories(&self.pool, household_id).await?)
    }

    async fn create_transaction_with_splits(
        &self,
        transaction: NewTransaction,
    ) -> Result<TransactionId, BackendError> {
        let amount_cents = cents(Some(transaction.amount))?;
        let splits = match &transaction.splits {
            Some(splits) => splits.clone(),
            None => self.default_splits(&transaction).await?,
        };

        let id = TransactionId::new();
        let mut tx = self.pool.begin().await.map_err(backend_error)?;

        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, household_id, date, description, amount_cents, transaction_type,
                paid_by_member_id, paid_to_member_id, category_id, split_type, paid_by_type,
                split_member_id, reimburses_transaction_id, excluded_from_budget, notes,
                created_by_user_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(transaction.household_id.to_string())
        .bind(transaction.date)
        .bind(&transaction.description)
        .bind(amount_cents)
        .bind(transaction.transaction_type.to_string())
        .bind(transaction.paid_by_member_id.map(|m| m.to_string()))
        .bind(transaction.paid_to_member_id.map(|m| m.to_string()))
        .bind(transaction.category_id.map(|c| c.to_string()))
        .bind(transaction.split_type.to_string())
        .bind(transaction.paid_by_type.to_string())
        .bind(transaction.split_member_id.map(|m| m.to_string()))
        .bind(transaction.reimburses_transaction_id.map(|t| t.to_string()))
        .bind(transaction.excluded_from_budget)
        .bind(&transaction.notes)
        .bind(transaction.created_by_user_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(backend_error)?;

        for split in &splits {
            sqlx::query(
                "INSERT INTO transaction_splits (transaction_id, member_id, owed_cents, owed_percentage, paid_cents, paid_percentage) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(id.to_string())
            .bind(split.member_id.to_string())
            .bind(cents(split.owed_amount)?)
            .bind(split.owed_percentage.map(|p| p.to_string()))
            .bind(cents(split.paid_amount)?)
            .bind(split.paid_percentage.map(|p| p.to_string()))
            .execute(&mut *tx)
            .await
            .map_err(backend_error)?;
        }

        tx.commit().await.map_err(backend_error)?;
        debug!(id = %id, splits = splits.len(), "transaction stored");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_db, create_household, get_split_cents, get_transactions, insert_member};
    use chrono::NaiveDate;
    use kitty_core::{Member, PaidByType, TransactionType, UserId};
    use rust_decimal::Decimal;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: SqliteStore,
        household: HouseholdId,
        alex: Member,
        sam: Member,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("kitty.db")).await.unwrap();
        let household = create_household(&pool, "Flat 4").await.unwrap();
        let alex = insert_member(&pool, household, "Alex", Some(UserId::new())).await.unwrap();
        let sam = insert_member(&pool, household, "Sam", None).await.unwrap();
        Fixture {
            _dir: dir,
            store: SqliteStore::new(pool),
            household,
            alex,
            sam,
        }
    }

    fn expense(f: &Fixture, description: &str, cents: i64) -> NewTransaction {
        NewTransaction {
            household_id: f.household,
            date: NaiveDate::from_ymd_opt(2024, 2, 3).unwrap(),
            description: description.to_string(),
            amount: Money::from_cents(cents),
            transaction_type: TransactionType::Expense,
            paid_by_member_id: Some(f.alex.id),
            paid_to_member_id: None,
            category_id: None,
            split_type: SplitType::Equal,
            paid_by_type: PaidByType::Single,
            split_member_id: None,
            reimburses_transaction_id: None,
            excluded_from_budget: false,
            notes: None,
            created_by_user_id: UserId::new(),
            splits: None,
        }
    }

    #[tokio::test]
    async fn category_names_are_unique_per_household() {
        let f = fixture().await;
        f.store
            .create_category(f.household, "Pets", Some("tag"), Some("#4CAF50"), None, 0)
            .await
            .unwrap();
        let err = f
            .store
            .create_category(f.household, "PETS", None, None, None, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Duplicate(_)), "{err:?}");

        let categories = f.store.fetch_categories(f.household).await.unwrap();
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].color.as_deref(), Some("#4CAF50"));
    }

    #[tokio::test]
    async fn equal_default_split_spreads_cents() {
        let f = fixture().await;
        let id = f
            .store
            .create_transaction_with_splits(expense(&f, "Pizza", 1001))
            .await
            .unwrap();
        let splits = get_split_cents(f.store.pool(), id).await.unwrap();
        assert_eq!(
            splits,
            vec![(f.alex.id, Some(501), Some(1001)), (f.sam.id, Some(500), None)]
        );
    }

    #[tokio::test]
    async fn explicit_splits_are_stored_as_given() {
        let f = fixture().await;
        let mut tx = expense(&f, "Dinner", 9000);
        tx.splits = Some(vec![
            Split {
                member_id: f.alex.id,
                owed_amount: Some(Money::from_cents(3000)),
                owed_percentage: Some(Decimal::new(3333, 2)),
                paid_amount: Some(Money::from_cents(9000)),
                paid_percentage: Some(Decimal::ONE_HUNDRED),
            },
            Split {
                member_id: f.sam.id,
                owed_amount: Some(Money::from_cents(6000)),
                owed_percentage: None,
                paid_amount: None,
                paid_percentage: None,
            },
        ]);
        let id = f.store.create_transaction_with_splits(tx).await.unwrap();
        let splits = get_split_cents(f.store.pool(), id).await.unwrap();
        assert_eq!(splits[1], (f.sam.id, Some(6000), None));
    }

    #[tokio::test]
    async fn reimbursement_link_is_persisted() {
        let f = fixture().await;
        let original = f
            .store
            .create_transaction_with_splits(expense(&f, "Groceries", 5000))
            .await
            .unwrap();
        let mut back = expense(&f, "Payback", 2000);
        back.transaction_type = TransactionType::Reimbursement;
        back.split_type = SplitType::PayerOnly;
        back.reimburses_transaction_id = Some(original);
        f.store.create_transaction_with_splits(back).await.unwrap();

        let stored = get_transactions(f.store.pool(), f.household).await.unwrap();
        assert_eq!(stored.len(), 2);
        let payback = stored.iter().find(|t| t.description == "Payback").unwrap();
        assert_eq!(payback.reimburses_transaction_id, Some(original));
        assert_eq!(payback.amount, Money::from_cents(2000));
        assert_eq!(payback.transaction_type, TransactionType::Reimbursement);
    }

    #[tokio::test]
    async fn dangling_references_are_rejected_and_nothing_is_kept() {
        let f = fixture().await;
        let mut tx = expense(&f, "Ghost", 100);
        tx.reimburses_transaction_id = Some(TransactionId::new());
        let err = f.store.create_transaction_with_splits(tx).await.unwrap_err();
        assert!(matches!(err, BackendError::Rejected(_)), "{err:?}");

        let mut tx = expense(&f, "Bad split", 100);
        tx.splits = Some(vec![Split {
            member_id: MemberId::new(),
            owed_amount: Some(Money::from_cents(100)),
            owed_percentage: None,
            paid_amount: None,
            paid_percentage: None,
        }]);
        assert!(f.store.create_transaction_with_splits(tx).await.is_err());
        assert!(get_transactions(f.store.pool(), f.household).await.unwrap().is_empty());
    }
}
