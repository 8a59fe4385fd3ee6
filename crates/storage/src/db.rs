use chrono::NaiveDate;
use kitty_core::{
    Category, CategoryId, HouseholdId, Member, MemberId, Money, TransactionId, TransactionType,
    UserId,
};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub type DbPool = Pool<Sqlite>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Stored id is not a UUID: {0}")]
    CorruptId(#[from] uuid::Error),
    #[error("Stored value is invalid: {0}")]
    Invalid(String),
}

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS households (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS members (
            id TEXT PRIMARY KEY,
            household_id TEXT NOT NULL,
            user_id TEXT,
            display_name TEXT NOT NULL,
            FOREIGN KEY (household_id) REFERENCES households(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY,
            household_id TEXT NOT NULL,
            name TEXT NOT NULL,
            icon TEXT,
            color TEXT,
            image_url TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (household_id) REFERENCES households(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS categories_household_id_name_key ON categories (household_id, name COLLATE NOCASE)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            household_id TEXT NOT NULL,
            date TEXT NOT NULL,
            description TEXT NOT NULL,
            amount_cents INTEGER NOT NULL CHECK (amount_cents > 0),
            transaction_type TEXT NOT NULL,
            paid_by_member_id TEXT,
            paid_to_member_id TEXT,
            category_id TEXT,
            split_type TEXT NOT NULL,
            paid_by_type TEXT NOT NULL,
            split_member_id TEXT,
            reimburses_transaction_id TEXT,
            excluded_from_budget INTEGER NOT NULL DEFAULT 0,
            notes TEXT,
            created_by_user_id TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (household_id) REFERENCES households(id) ON DELETE CASCADE,
            FOREIGN KEY (paid_by_member_id) REFERENCES members(id),
            FOREIGN KEY (paid_to_member_id) REFERENCES members(id),
            FOREIGN KEY (category_id) REFERENCES categories(id),
            FOREIGN KEY (split_member_id) REFERENCES members(id),
            FOREIGN KEY (reimburses_transaction_id) REFERENCES transactions(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transaction_splits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            transaction_id TEXT NOT NULL,
            member_id TEXT NOT NULL,
            owed_cents INTEGER,
            owed_percentage TEXT,
            paid_cents INTEGER,
            paid_percentage TEXT,
            FOREIGN KEY (transaction_id) REFERENCES transactions(id) ON DELETE CASCADE,
            FOREIGN KEY (member_id) REFERENCES members(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub(crate) fn parse_id(raw: &str) -> Result<Uuid, StoreError> {
    Ok(Uuid::parse_str(raw)?)
}

pub async fn create_household(pool: &DbPool, name: &str) -> Result<HouseholdId, StoreError> {
    let id = HouseholdId::new();
    sqlx::query("INSERT INTO households (id, name) VALUES (?, ?)")
        .bind(id.to_string())
        .bind(name)
        .execute(pool)
        .await?;
    Ok(id)
}

/// The first household by creation order, for single-household databases.
pub async fn get_default_household(pool: &DbPool) -> Result<Option<HouseholdId>, StoreError> {
    let row = sqlx::query_as::<_, (String,)>(
        "SELECT id FROM households ORDER BY created_at, rowid LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;
    row.map(|(id,)| parse_id(&id).map(HouseholdId)).transpose()
}

pub async fn insert_member(
    pool: &DbPool,
    household_id: HouseholdId,
    display_name: &str,
    user_id: Option<UserId>,
) -> Result<Member, StoreError> {
    let member = Member {
        id: MemberId::new(),
        household_id,
        user_id,
        display_name: display_name.to_string(),
    };
    sqlx::query("INSERT INTO members (id, household_id, user_id, display_name) VALUES (?, ?, ?, ?)")
        .bind(member.id.to_string())
        .bind(household_id.to_string())
        .bind(user_id.map(|u| u.to_string()))
        .bind(display_name)
        .execute(pool)
        .await?;
    Ok(member)
}

pub async fn get_members(pool: &DbPool, household_id: HouseholdId) -> Result<Vec<Member>, StoreError> {
    let rows = sqlx::query_as::<_, (String, Option<String>, String)>(
        "SELECT id, user_id, display_name FROM members WHERE household_id = ? ORDER BY rowid",
    )
    .bind(household_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(id, user_id, display_name)| {
            Ok(Member {
                id: MemberId(parse_id(&id)?),
                household_id,
                user_id: user_id.as_deref().map(parse_id).transpose()?.map(UserId),
                display_name,
            })
        })
        .collect()
}

pub async fn get_categories(pool: &DbPool, household_id: HouseholdId) -> Result<Vec<Category>, StoreError> {
    let rows = sqlx::query_as::<_, (String, String, Option<String>, Option<String>, Option<String>, i32)>(
        "SELECT id, name, icon, color, image_url, sort_order FROM categories WHERE household_id = ? ORDER BY sort_order, name",
    )
    .bind(household_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(id, name, icon, color, image_url, sort_order)| {
            Ok(Category {
                id: CategoryId(parse_id(&id)?),
                household_id,
                name,
                icon,
                color,
                image_url,
                sort_order,
            })
        })
        .collect()
}

/// A stored transaction as read back for listing.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Money,
    pub transaction_type: TransactionType,
    pub category_id: Option<CategoryId>,
    pub paid_by_member_id: Option<MemberId>,
    pub reimburses_transaction_id: Option<TransactionId>,
}

type TransactionRow = (
    String,
    NaiveDate,
    String,
    i64,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
);

pub async fn get_transactions(
    pool: &DbPool,
    household_id: HouseholdId,
) -> Result<Vec<TransactionRecord>, StoreError> {
    let rows = sqlx::query_as::<_, TransactionRow>(
        "SELECT id, date, description, amount_cents, transaction_type, category_id, paid_by_member_id, reimburses_transaction_id FROM transactions WHERE household_id = ? ORDER BY date, rowid",
    )
    .bind(household_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            Ok(TransactionRecord {
                id: TransactionId(parse_id(&r.0)?),
                date: r.1,
                description: r.2,
                amount: Money::from_cents(r.3),
                transaction_type: TransactionType::from_str(&r.4).map_err(StoreError::Invalid)?,
                category_id: r.5.as_deref().map(parse_id).transpose()?.map(CategoryId),
                paid_by_member_id: r.6.as_deref().map(parse_id).transpose()?.map(MemberId),
                reimburses_transaction_id: r.7.as_deref().map(parse_id).transpose()?.map(TransactionId),
            })
        })
        .collect()
}

/// Owed/paid cents per member for one transaction, in insertion order.
pub async fn get_split_cents(
    pool: &DbPool,
    transaction_id: TransactionId,
) -> Result<Vec<(MemberId, Option<i64>, Option<i64>)>, StoreError> {
    let rows = sqlx::query_as::<_, (String, Option<i64>, Option<i64>)>(
        "SELECT member_id, owed_cents, paid_cents FROM transaction_splits WHERE transaction_id = ? ORDER BY id",
    )
    .bind(transaction_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(member_id, owed, paid)| Ok((MemberId(parse_id(&member_id)?), owed, paid)))
        .collect()
}
