//! Storage layer: trait definitions, data types, and the SQLite backend.

mod sqlite;
mod traits;
mod types;

pub use sqlite::SqliteStore;
pub use traits::{LedgerStore, PendingStore};
pub use types::{
    round_cents, ExpenseRow, FieldUpdates, NewExpense, Party, PendingDelete, PendingEdit,
    MONEY_EPSILON, SETTLE_MARKER,
};
