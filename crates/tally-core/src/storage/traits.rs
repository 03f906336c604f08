//! Storage trait definitions.
//!
//! `LedgerStore` owns the ordered sequence of expense rows and assigns
//! row indices; `PendingStore` owns the two pending-action tables. The
//! SQLite backend implements both, but the engines only depend on the
//! traits so tests can substitute fakes.

use super::types::{ExpenseRow, FieldUpdates, NewExpense, PendingDelete, PendingEdit};
use crate::error::Result;

/// Append-only expense ledger with indexed update and delete.
///
/// Implementations must ensure:
/// - `row_index` values are strictly increasing in append order
/// - indices are never reused after a delete
/// - `list_expenses` returns rows oldest first
pub trait LedgerStore {
    /// Append a new expense row.
    ///
    /// # Returns
    ///
    /// The `row_index` assigned to the new row.
    ///
    /// # Errors
    ///
    /// Returns `TallyError::Validation` if the row invariants fail
    /// (see [`NewExpense::validate`]).
    fn append_expense(&mut self, expense: &NewExpense) -> Result<i64>;

    /// Full scan of the ledger in append order (oldest first).
    fn list_expenses(&self) -> Result<Vec<ExpenseRow>>;

    /// Fetch a single row by index.
    ///
    /// Returns `Ok(None)` if no row has that index.
    fn get_expense(&self, row_index: i64) -> Result<Option<ExpenseRow>>;

    /// Find the row logged from a given chat message, if any.
    fn find_by_message_id(&self, message_id: &str) -> Result<Option<ExpenseRow>>;

    /// Apply field-level updates to a row.
    ///
    /// The stored amount column is recomputed from the final paid split.
    ///
    /// # Returns
    ///
    /// The updated row.
    ///
    /// # Errors
    ///
    /// Returns `TallyError::NotFound` if the index does not exist.
    fn update_expense(&mut self, row_index: i64, updates: &FieldUpdates) -> Result<ExpenseRow>;

    /// Remove a row by index.
    ///
    /// # Returns
    ///
    /// The deleted row (for confirmation messages).
    ///
    /// # Errors
    ///
    /// Returns `TallyError::NotFound` if the index does not exist.
    fn delete_expense(&mut self, row_index: i64) -> Result<ExpenseRow>;
}

/// Storage for short-lived confirmation records.
///
/// Records are addressed by the external message id of the bot's
/// confirmation message. Expiry is *not* enforced here; the
/// pending-action manager checks `expires_at` lazily at read time.
pub trait PendingStore {
    fn put_pending_delete(&mut self, record: &PendingDelete) -> Result<()>;

    /// Raw lookup, expired records included.
    fn get_pending_delete(&self, message_id: &str) -> Result<Option<PendingDelete>>;

    /// Remove a record. Clearing a missing id is a no-op, not an error.
    ///
    /// # Returns
    ///
    /// `true` if a record was removed.
    fn clear_pending_delete(&mut self, message_id: &str) -> Result<bool>;

    fn put_pending_edit(&mut self, record: &PendingEdit) -> Result<()>;

    /// Raw lookup, expired records included.
    fn get_pending_edit(&self, message_id: &str) -> Result<Option<PendingEdit>>;

    /// Remove a record. Clearing a missing id is a no-op, not an error.
    fn clear_pending_edit(&mut self, message_id: &str) -> Result<bool>;
}
