use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use kitty_core::{Category, HouseholdId, Member, UserId};
use kitty_import::import::{preview, Preview};
use kitty_import::{
    CommitRequest, ImportConfig, ImportOrchestrator, ImportResult, ValidationContext,
};
use kitty_storage::{DbPool, SqliteStore};
use serde::Serialize;
use std::path::Path;
use tracing::info;

pub async fn open_db(path: &Path) -> Result<DbPool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    kitty_storage::create_db(path)
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))
}

/// An explicit path must exist; the default path is optional.
pub fn load_config(explicit: Option<&Path>, default: Option<&Path>) -> Result<ImportConfig> {
    let path = match (explicit, default) {
        (Some(path), _) => path,
        (None, Some(path)) if path.exists() => path,
        _ => return Ok(ImportConfig::default()),
    };
    ImportConfig::load(path).with_context(|| format!("Failed to load config {}", path.display()))
}

pub async fn init(pool: &DbPool, name: &str) -> Result<HouseholdId> {
    if let Some(existing) = kitty_storage::get_default_household(pool).await? {
        bail!("Database already has a household ({existing})");
    }
    let id = kitty_storage::create_household(pool, name).await?;
    info!(household = %id, name, "household created");
    Ok(id)
}

async fn household(pool: &DbPool) -> Result<HouseholdId> {
    kitty_storage::get_default_household(pool)
        .await?
        .context("No household yet; run `kitty init NAME` first")
}

/// `owner` links the member to a fresh user id so they can run imports.
pub async fn add_member(pool: &DbPool, name: &str, owner: bool) -> Result<Member> {
    let household_id = household(pool).await?;
    let existing = kitty_storage::get_members(pool, household_id).await?;
    if existing
        .iter()
        .any(|m| m.display_name.eq_ignore_ascii_case(name))
    {
        bail!("A member named '{name}' already exists");
    }
    let user_id = owner.then(UserId::new);
    Ok(kitty_storage::insert_member(pool, household_id, name, user_id).await?)
}

pub async fn list_members(pool: &DbPool) -> Result<Vec<Member>> {
    let household_id = household(pool).await?;
    Ok(kitty_storage::get_members(pool, household_id).await?)
}

/// The household snapshot an import is validated and committed against.
pub struct Session {
    pub household_id: HouseholdId,
    pub user_id: UserId,
    pub members: Vec<Member>,
    pub categories: Vec<Category>,
}

impl Session {
    /// `as_member` picks who is importing; otherwise the first member linked to a user.
    pub async fn load(pool: &DbPool, as_member: Option<&str>) -> Result<Self> {
        let household_id = household(pool).await?;
        let members = kitty_storage::get_members(pool, household_id).await?;
        let categories = kitty_storage::get_categories(pool, household_id).await?;

        let importer = match as_member {
            Some(name) => members
                .iter()
                .find(|m| m.display_name.eq_ignore_ascii_case(name))
                .with_context(|| format!("No member named '{name}'"))?,
            None => members
                .iter()
                .find(|m| m.user_id.is_some())
                .context("No member can import; add one with `kitty members add NAME --owner`")?,
        };
        let Some(user_id) = importer.user_id else {
            bail!("Member '{}' is not linked to a user", importer.display_name);
        };

        Ok(Self {
            household_id,
            user_id,
            members,
            categories,
        })
    }

    pub fn context<'a>(&'a self, config: &'a ImportConfig, today: NaiveDate) -> ValidationContext<'a> {
        ValidationContext {
            categories: &self.categories,
            members: &self.members,
            current_user_id: self.user_id,
            today,
            config,
        }
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

pub fn build_preview(
    session: &Session,
    config: &ImportConfig,
    today: NaiveDate,
    file: &Path,
    splits: Option<&Path>,
) -> Result<Preview> {
    let data = read(file)?;
    let split_data = splits.map(read).transpose()?;
    preview(&data, split_data.as_deref(), &session.context(config, today))
        .with_context(|| format!("Failed to parse {}", file.display()))
}

#[derive(Debug, Serialize)]
pub struct ImportRun {
    pub preview: Preview,
    pub result: ImportResult,
}

pub async fn run_import(
    pool: &DbPool,
    session: &Session,
    config: &ImportConfig,
    today: NaiveDate,
    file: &Path,
    splits: Option<&Path>,
) -> Result<ImportRun> {
    let preview = build_preview(session, config, today, file, splits)?;
    info!(
        importable = preview.summary.importable_rows(),
        invalid = preview.summary.invalid_rows,
        "file validated"
    );

    let orchestrator = ImportOrchestrator::new(SqliteStore::new(pool.clone()), config.clone());
    let request = CommitRequest::new(
        session.household_id,
        session.user_id,
        &preview.rows,
        &session.categories,
        &session.members,
    )
    .with_splits(&preview.split_rows);
    let result = orchestrator.commit(request).await?;

    Ok(ImportRun { preview, result })
}

pub fn write_issues(path: &Path, preview: &Preview) -> Result<usize> {
    let text = kitty_import::to_csv(&preview.headers, &preview.rows)?;
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(preview.rows.iter().filter(|r| !r.warnings.is_empty() || !r.errors.is_empty()).count())
}

pub fn write_failures(path: &Path, run: &ImportRun) -> Result<()> {
    let text = kitty_import::commit_failures_to_csv(&run.preview.headers, &run.preview.rows, &run.result)?;
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

pub fn print_preview(preview: &Preview) {
    let s = &preview.summary;
    println!(
        "{} rows: {} valid, {} with warnings, {} invalid",
        s.total_rows, s.valid_rows, s.warning_rows, s.invalid_rows
    );
    println!("Total to import: {}", s.total_amount);
    if s.total_split_rows > 0 {
        println!(
            "{} split rows for {} transactions ({} orphaned, {} with errors)",
            s.total_split_rows, s.transactions_with_splits, s.orphaned_split_rows, s.invalid_split_rows
        );
    }
    if !s.new_categories_to_create.is_empty() {
        println!("New categories: {}", s.new_categories_to_create.join(", "));
    }
    for row in preview.rows.iter().filter(|r| !r.errors.is_empty() || !r.warnings.is_empty()) {
        for error in &row.errors {
            println!("  row {}: error: {error}", row.row_number);
        }
        for warning in &row.warnings {
            println!("  row {}: warning: {warning}", row.row_number);
        }
    }
    for split in preview.split_rows.iter().filter(|r| !r.errors.is_empty() || !r.warnings.is_empty()) {
        for issue in split.errors.iter().chain(&split.warnings) {
            println!("  split row {}: {issue}", split.row_number);
        }
    }
}

pub fn print_result(result: &ImportResult) {
    println!("{} imported, {} failed", result.success_count, result.failed_count);
    if !result.created_categories.is_empty() {
        println!("Created categories: {}", result.created_categories.join(", "));
    }
    for error in &result.errors {
        println!("  {error}");
    }
}
