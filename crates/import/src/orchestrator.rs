use kitty_core::{
    paid_by_type_for, Category, CategoryId, HouseholdBackend, HouseholdId, Member, MemberId,
    NewTransaction, SplitType, TransactionId, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::color::{ColorSource, RandomPalette};
use crate::config::ImportConfig;
use crate::splits::{build_member_splits, group_by_transaction_row, ImportSplitRow};
use crate::summary::{rows_to_import, summarize};
use crate::util::normalize_name;
use crate::validate::ImportRow;

#[derive(Debug, Error, PartialEq)]
pub enum ImportError {
    #[error("Another import is already in progress")]
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportPhase {
    Idle,
    CreatingCategories,
    ImportingPrimary,
    ImportingReimbursements,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitFailure {
    pub row_number: usize,
    pub message: String,
}

/// What a commit did. `errors` is in commit order: category failures, then
/// primary rows, then reimbursements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportResult {
    pub success_count: usize,
    pub failed_count: usize,
    pub created_categories: Vec<String>,
    pub errors: Vec<String>,
    pub failed_rows: Vec<CommitFailure>,
    /// Fresh category list, present when categories were created and the re-fetch worked.
    pub categories: Option<Vec<Category>>,
}

/// Everything one commit needs. `rows` is the full validated set; invalid rows
/// are skipped.
#[derive(Debug, Clone, Copy)]
pub struct CommitRequest<'a> {
    pub household_id: HouseholdId,
    pub created_by: UserId,
    /// Stands in for a missing or unmatched paid-by member.
    pub current_member_id: Option<MemberId>,
    pub rows: &'a [ImportRow],
    pub split_rows: &'a [ImportSplitRow],
    pub categories: &'a [Category],
    pub members: &'a [Member],
}

impl<'a> CommitRequest<'a> {
    /// Picks the current member out of `members` by user id.
    pub fn new(
        household_id: HouseholdId,
        created_by: UserId,
        rows: &'a [ImportRow],
        categories: &'a [Category],
        members: &'a [Member],
    ) -> Self {
        let current_member_id = members
            .iter()
            .find(|m| m.user_id == Some(created_by))
            .map(|m| m.id);
        Self {
            household_id,
            created_by,
            current_member_id,
            rows,
            split_rows: &[],
            categories,
            members,
        }
    }

    pub fn with_splits(mut self, split_rows: &'a [ImportSplitRow]) -> Self {
        self.split_rows = split_rows;
        self
    }
}

/// Working state owned by a single commit call.
struct CommitState {
    category_ids: HashMap<String, CategoryId>,
    csv_row_to_transaction_id: HashMap<i64, TransactionId>,
    split_groups: BTreeMap<i64, Vec<ImportSplitRow>>,
    result: ImportResult,
}

/// Commits validated rows: categories → non-reimbursements → reimbursements.
/// Best effort: a failed call is recorded and the rest carry on; nothing is
/// rolled back.
pub struct ImportOrchestrator<B: HouseholdBackend> {
    backend: B,
    config: ImportConfig,
    colors: Box<dyn ColorSource>,
    running: Mutex<()>,
    phase: watch::Sender<ImportPhase>,
}

impl<B: HouseholdBackend> ImportOrchestrator<B> {
    pub fn new(backend: B, config: ImportConfig) -> Self {
        let colors = Box::new(RandomPalette::new(config.category_colors.clone()));
        let (phase, _) = watch::channel(ImportPhase::Idle);
        Self {
            backend,
            config,
            colors,
            running: Mutex::new(()),
            phase,
        }
    }

    pub fn with_color_source(mut self, colors: impl ColorSource + 'static) -> Self {
        self.colors = Box::new(colors);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Progress feed for a UI.
    pub fn subscribe(&self) -> watch::Receiver<ImportPhase> {
        self.phase.subscribe()
    }

    pub async fn commit(&self, req: CommitRequest<'_>) -> Result<ImportResult, ImportError> {
        let _guard = self.running.try_lock().map_err(|_| ImportError::AlreadyRunning)?;

        let mut category_ids = HashMap::new();
        for category in req.categories {
            category_ids
                .entry(normalize_name(&category.name))
                .or_insert(category.id);
        }
        let mut state = CommitState {
            category_ids,
            csv_row_to_transaction_id: HashMap::new(),
            split_groups: group_by_transaction_row(req.split_rows),
            result: ImportResult::default(),
        };

        self.phase.send_replace(ImportPhase::CreatingCategories);
        self.create_categories(&req, &mut state).await;

        let (reimbursements, primary): (Vec<&ImportRow>, Vec<&ImportRow>) = rows_to_import(req.rows)
            .into_iter()
            .partition(|r| r.is_reimbursement_with_reference());

        self.phase.send_replace(ImportPhase::ImportingPrimary);
        info!(rows = primary.len(), "importing transactions");
        for row in primary {
            self.commit_row(&req, &mut state, row, None).await;
        }

        // Sequential on purpose: each success may be the target of a later row.
        self.phase.send_replace(ImportPhase::ImportingReimbursements);
        info!(rows = reimbursements.len(), "importing reimbursements");
        for row in reimbursements {
            let target = row.parsed_reimburses_row;
            let linked = target.and_then(|t| state.csv_row_to_transaction_id.get(&t).copied());
            if let (Some(target), None) = (target, linked) {
                warn!(row = row.row_number, target, "reimbursed row not found");
                state.result.errors.push(format!(
                    "Row {}: reimbursed row {target} was not imported; saved without a link",
                    row.row_number
                ));
            }
            self.commit_row(&req, &mut state, row, linked).await;
        }

        self.phase.send_replace(ImportPhase::Done);
        let result = state.result;
        info!(
            succeeded = result.success_count,
            failed = result.failed_count,
            categories = result.created_categories.len(),
            "import finished"
        );
        Ok(result)
    }

    async fn create_categories(&self, req: &CommitRequest<'_>, state: &mut CommitState) {
        let names = summarize(req.rows, &[], req.categories).new_categories_to_create;
        if names.is_empty() {
            return;
        }
        info!(count = names.len(), "creating categories");

        let first_sort_order = req
            .categories
            .iter()
            .map(|c| c.sort_order)
            .max()
            .map_or(0, |m| m + 1);

        for (offset, name) in names.iter().enumerate() {
            let color = self.colors.next_color();
            let created = self
                .backend
                .create_category(
                    req.household_id,
                    name,
                    Some(&self.config.default_category_icon),
                    Some(&color),
                    None,
                    first_sort_order + offset as i32,
                )
                .await;
            match created {
                Ok(category) => {
                    debug!(name = %category.name, id = %category.id, "category created");
                    state.category_ids.insert(normalize_name(name), category.id);
                    state.result.created_categories.push(category.name);
                }
                Err(e) => {
                    warn!(name = %name, error = %e, "category creation failed");
                    state
                        .result
                        .errors
                        .push(format!("Could not create category '{name}': {e}"));
                }
            }
        }

        if !state.result.created_categories.is_empty() {
            match self.backend.fetch_categories(req.household_id).await {
                Ok(categories) => state.result.categories = Some(categories),
                Err(e) => warn!(error = %e, "category refresh failed"),
            }
        }
    }

    async fn commit_row(
        &self,
        req: &CommitRequest<'_>,
        state: &mut CommitState,
        row: &ImportRow,
        reimburses_transaction_id: Option<TransactionId>,
    ) {
        let outcome = match self.build_transaction(req, state, row, reimburses_transaction_id) {
            Some(tx) => self
                .backend
                .create_transaction_with_splits(tx)
                .await
                .map_err(|e| e.to_string()),
            None => Err("missing date or amount".to_string()),
        };

        match outcome {
            Ok(id) => {
                debug!(row = row.row_number, id = %id, "transaction created");
                state.result.success_count += 1;
                if let Some(csv_row) = row.parsed_csv_row {
                    state.csv_row_to_transaction_id.insert(csv_row, id);
                }
            }
            Err(message) => {
                warn!(row = row.row_number, error = %message, "transaction failed");
                state.result.failed_count += 1;
                state
                    .result
                    .errors
                    .push(format!("Row {}: {message}", row.row_number));
                state.result.failed_rows.push(CommitFailure {
                    row_number: row.row_number,
                    message,
                });
            }
        }
    }

    fn build_transaction(
        &self,
        req: &CommitRequest<'_>,
        state: &CommitState,
        row: &ImportRow,
        reimburses_transaction_id: Option<TransactionId>,
    ) -> Option<NewTransaction> {
        let date = row.parsed_date?;
        let amount = row.parsed_amount?;

        let category_id = row.matched_category_id.or_else(|| {
            (!row.category.is_empty())
                .then(|| state.category_ids.get(&normalize_name(&row.category)).copied())
                .flatten()
        });

        let split_member_id = row.matched_split_member_id.or(
            if row.parsed_split_type == SplitType::MemberOnly {
                req.current_member_id
            } else {
                None
            },
        );

        let splits = state
            .split_groups
            .get(&row.split_key())
            .and_then(|group| build_member_splits(group, amount));

        Some(NewTransaction {
            household_id: req.household_id,
            date,
            description: row.description.clone(),
            amount,
            transaction_type: row.parsed_type,
            paid_by_member_id: row.matched_paid_by_member_id.or(req.current_member_id),
            paid_to_member_id: row.matched_paid_to_member_id,
            category_id,
            split_type: row.parsed_split_type,
            paid_by_type: paid_by_type_for(splits.as_deref()),
            split_member_id,
            reimburses_transaction_id,
            excluded_from_budget: row.parsed_excluded_from_budget,
            notes: (!row.notes.is_empty()).then(|| row.notes.clone()),
            created_by_user_id: req.created_by,
            splits,
        })
    }
}
