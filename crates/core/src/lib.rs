pub mod backend;
pub mod household;
pub mod money;
pub mod transaction;

pub use backend::{BackendError, HouseholdBackend, InMemoryBackend};
pub use household::{
    Category, CategoryId, HouseholdId, Member, MemberId, PaidByType, SplitType, TransactionId,
    TransactionType, UserId,
};
pub use money::Money;
pub use transaction::{paid_by_type_for, NewTransaction, Split};
