pub mod db;
pub mod store;

pub use db::{
    create_db, create_household, get_categories, get_default_household, get_members,
    get_split_cents, get_transactions, insert_member, DbPool, StoreError, TransactionRecord,
};
pub use store::SqliteStore;
