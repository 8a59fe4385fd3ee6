use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use thiserror::Error;

use crate::household::{Category, CategoryId, HouseholdId, TransactionId};
use crate::transaction::NewTransaction;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    #[error("{0}")]
    Rejected(String),
    #[error("duplicate key value violates unique constraint: {0}")]
    Duplicate(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// The narrow create/read contract the import engine needs from the household store.
#[async_trait]
pub trait HouseholdBackend: Send + Sync {
    async fn create_category(
        &self,
        household_id: HouseholdId,
        name: &str,
        icon: Option<&str>,
        color: Option<&str>,
        image_url: Option<&str>,
        sort_order: i32,
    ) -> Result<Category, BackendError>;

    async fn fetch_categories(&self, household_id: HouseholdId) -> Result<Vec<Category>, BackendError>;

    async fn create_transaction_with_splits(
        &self,
        transaction: NewTransaction,
    ) -> Result<TransactionId, BackendError>;
}

// ── In-memory backend (always available, used for tests and dry runs) ─────────

#[derive(Default)]
struct MemoryState {
    categories: Vec<Category>,
    transactions: Vec<(TransactionId, NewTransaction)>,
    failing_categories: HashSet<String>,
    failing_descriptions: HashSet<String>,
    fail_fetch: bool,
}

/// Keeps everything in a `Vec`. Category names are unique per household
/// (case-insensitive), like the hosted store's unique index.
#[derive(Default)]
pub struct InMemoryBackend {
    state: Mutex<MemoryState>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_categories(categories: Vec<Category>) -> Self {
        let backend = Self::default();
        backend.lock().categories = categories;
        backend
    }

    /// Any `create_category` call for this name (case-insensitive) fails.
    pub fn fail_category(&self, name: &str) {
        self.lock().failing_categories.insert(name.to_lowercase());
    }

    /// Any transaction with exactly this description is rejected.
    pub fn fail_transaction(&self, description: &str) {
        self.lock().failing_descriptions.insert(description.to_string());
    }

    pub fn fail_fetch(&self) {
        self.lock().fail_fetch = true;
    }

    pub fn categories(&self) -> Vec<Category> {
        self.lock().categories.clone()
    }

    pub fn transactions(&self) -> Vec<(TransactionId, NewTransaction)> {
        self.lock().transactions.clone()
    }

    pub fn transaction_by_description(&self, description: &str) -> Option<(TransactionId, NewTransaction)> {
        self.lock()
            .transactions
            .iter()
            .find(|(_, t)| t.description == description)
            .cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A poisoned lock only means a test panicked mid-call; the data is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl HouseholdBackend for InMemoryBackend {
    async fn create_category(
        &self,
        household_id: HouseholdId,
        name: &str,
        icon: Option<&str>,
        color: Option<&str>,
        image_url: Option<&str>,
        sort_order: i32,
    ) -> Result<Category, BackendError> {
        let mut state = self.lock();
        let key = name.to_lowercase();
        if state.failing_categories.contains(&key) {
            return Err(BackendError::Unavailable(format!("cannot create category '{name}'")));
        }
        if state
            .categories
            .iter()
            .any(|c| c.household_id == household_id && c.name.to_lowercase() == key)
        {
            return Err(BackendError::Duplicate("categories_household_id_name_key".to_string()));
        }
        let category = Category {
            id: CategoryId::new(),
            household_id,
            name: name.to_string(),
            icon: icon.map(str::to_string),
            color: color.map(str::to_string),
            image_url: image_url.map(str::to_string),
            sort_order,
        };
        state.categories.push(category.clone());
        Ok(category)
    }

    async fn fetch_categories(&self, household_id: HouseholdId) -> Result<Vec<Category>, BackendError> {
        let state = self.lock();
        if state.fail_fetch {
            return Err(BackendError::Unavailable("fetch failed".to_string()));
        }
        let mut categories: Vec<Category> = state
            .categories
            .iter()
            .filter(|c| c.household_id == household_id)
            .cloned()
            .collect();
        categories.sort_by_key(|c| c.sort_order);
        Ok(categories)
    }

    async fn create_transaction_with_splits(
        &self,
        transaction: NewTransaction,
    ) -> Result<TransactionId, BackendError> {
        let mut state = self.lock();
        if state.failing_descriptions.contains(&transaction.description) {
            return Err(BackendError::Rejected(format!(
                "new row for relation \"transactions\" violates check constraint ({})",
                transaction.description
            )));
        }
        if !transaction.amount.is_positive() {
            return Err(BackendError::Rejected("amount must be positive".to_string()));
        }
        let id = TransactionId::new();
        state.transactions.push((id, transaction));
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::household::{PaidByType, SplitType, TransactionType, UserId};
    use crate::money::Money;
    use chrono::NaiveDate;

    fn new_tx(household_id: HouseholdId, description: &str) -> NewTransaction {
        NewTransaction {
            household_id,
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            description: description.to_string(),
            amount: Money::from_cents(1250),
            transaction_type: TransactionType::Expense,
            paid_by_member_id: None,
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
    async fn duplicate_category_names_are_rejected() {
        let backend = InMemoryBackend::new();
        let hh = HouseholdId::new();
        backend.create_category(hh, "Groceries", None, None, None, 0).await.unwrap();
        let err = backend
            .create_category(hh, "groceries", None, None, None, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Duplicate(_)));
    }

    #[tokio::test]
    async fn fetch_is_scoped_and_ordered() {
        let backend = InMemoryBackend::new();
        let hh = HouseholdId::new();
        backend.create_category(hh, "B", None, None, None, 2).await.unwrap();
        backend.create_category(hh, "A", None, None, None, 1).await.unwrap();
        backend
            .create_category(HouseholdId::new(), "Other", None, None, None, 0)
            .await
            .unwrap();
        let names: Vec<_> = backend
            .fetch_categories(hh)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn injected_transaction_failure() {
        let backend = InMemoryBackend::new();
        let hh = HouseholdId::new();
        backend.fail_transaction("Broken");
        assert!(backend.create_transaction_with_splits(new_tx(hh, "Broken")).await.is_err());
        assert!(backend.create_transaction_with_splits(new_tx(hh, "Fine")).await.is_ok());
        assert_eq!(backend.transactions().len(), 1);
    }
}
