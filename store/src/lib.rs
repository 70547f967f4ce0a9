pub mod db;
pub mod error;
pub mod memory;
pub mod repo;
pub mod rows;
pub mod schema;
pub mod sqlx_store;
pub mod types;

pub use db::Db;
pub use error::{classify_sql_error, StoreError, UniqueViolation};
pub use memory::MemoryStore;
pub use repo::Store;
pub use sqlx_store::SqlxStore;
pub use types::{
    CreateBidWindowOutcome, InstantAssignOutcome, NewAssignment, NewBidWindow, ResolveOutcome,
    ScoredBid, TransitionOutcome,
};
