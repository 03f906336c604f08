//! Pending-action manager: short-lived confirmation records guarded by
//! random short codes.
//!
//! Records live in the two pending tables keyed by the confirmation
//! message id. Expiry is checked lazily at read time; nothing sweeps
//! expired rows, callers clear consumed ones explicitly.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::error::{Result, TallyError};
use crate::storage::{FieldUpdates, PendingDelete, PendingEdit, PendingStore};

/// Default confirmation window.
pub const DEFAULT_TTL_MINUTES: i64 = 30;

const CODE_LENGTH: usize = 3;

/// Generate a random short confirmation code (3 lowercase letters).
///
/// Collisions across concurrently pending actions are possible and
/// accepted; callers staging several codes at once should regenerate on
/// collision within their own mapping.
pub fn short_code() -> Result<String> {
    let mut bytes = [0u8; CODE_LENGTH];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| TallyError::Storage(format!("RNG failure: {}", e)))?;
    Ok(bytes
        .iter()
        .map(|b| (b'a' + (b % 26)) as char)
        .collect())
}

/// Whether a reply looks like a short confirmation code.
pub fn looks_like_code(text: &str) -> bool {
    text.len() == CODE_LENGTH && text.chars().all(|c| c.is_ascii_alphabetic())
}

/// TTL-aware facade over the pending-action tables.
#[derive(Debug, Clone, Copy)]
pub struct PendingActions {
    ttl: Duration,
}

impl Default for PendingActions {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_MINUTES)
    }
}

impl PendingActions {
    pub fn new(ttl_minutes: i64) -> Self {
        Self {
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    /// Stage a delete confirmation: one code per candidate row.
    ///
    /// # Returns
    ///
    /// The absolute expiry timestamp of the record.
    pub fn stage_delete<S: PendingStore + ?Sized>(
        &self,
        store: &mut S,
        message_id: &str,
        code_mapping: BTreeMap<String, i64>,
    ) -> Result<DateTime<Utc>> {
        let expires_at = Utc::now() + self.ttl;
        store.put_pending_delete(&PendingDelete {
            message_id: message_id.to_string(),
            code_mapping,
            expires_at,
        })?;
        Ok(expires_at)
    }

    /// Stage an edit confirmation guarded by a single code.
    pub fn stage_edit<S: PendingStore + ?Sized>(
        &self,
        store: &mut S,
        message_id: &str,
        code: &str,
        row_index: i64,
        updates: FieldUpdates,
    ) -> Result<DateTime<Utc>> {
        let expires_at = Utc::now() + self.ttl;
        store.put_pending_edit(&PendingEdit {
            message_id: message_id.to_string(),
            code: code.to_string(),
            row_index,
            updates,
            expires_at,
        })?;
        Ok(expires_at)
    }

    /// Look up a live pending delete. Expired records are reported
    /// absent but left in storage.
    pub fn delete_for<S: PendingStore + ?Sized>(
        &self,
        store: &S,
        message_id: &str,
    ) -> Result<Option<PendingDelete>> {
        Ok(store
            .get_pending_delete(message_id)?
            .filter(|record| Utc::now() <= record.expires_at))
    }

    /// Look up a live pending edit. Expired records are reported absent
    /// but left in storage.
    pub fn edit_for<S: PendingStore + ?Sized>(
        &self,
        store: &S,
        message_id: &str,
    ) -> Result<Option<PendingEdit>> {
        Ok(store
            .get_pending_edit(message_id)?
            .filter(|record| Utc::now() <= record.expires_at))
    }

    /// Remove a consumed or abandoned delete record. Idempotent.
    pub fn clear_delete<S: PendingStore + ?Sized>(
        &self,
        store: &mut S,
        message_id: &str,
    ) -> Result<bool> {
        store.clear_pending_delete(message_id)
    }

    /// Remove a consumed or abandoned edit record. Idempotent.
    pub fn clear_edit<S: PendingStore + ?Sized>(
        &self,
        store: &mut S,
        message_id: &str,
    ) -> Result<bool> {
        store.clear_pending_edit(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;

    #[test]
    fn test_short_code_shape() {
        for _ in 0..50 {
            let code = short_code().unwrap();
            assert_eq!(code.len(), 3);
            assert!(code.chars().all(|c| c.is_ascii_lowercase()));
            assert!(looks_like_code(&code));
        }
    }

    #[test]
    fn test_looks_like_code() {
        assert!(looks_like_code("abc"));
        assert!(looks_like_code("XYZ"));
        assert!(!looks_like_code("ab"));
        assert!(!looks_like_code("abcd"));
        assert!(!looks_like_code("a1c"));
    }

    #[test]
    fn test_stage_and_fetch_delete() {
        let mut store = SqliteStore::open_in_memory().expect("open");
        let pending = PendingActions::default();

        let mut mapping = BTreeMap::new();
        mapping.insert("abc".to_string(), 4);
        pending
            .stage_delete(&mut store, "wamid.1", mapping.clone())
            .unwrap();

        let record = pending.delete_for(&store, "wamid.1").unwrap().unwrap();
        assert_eq!(record.code_mapping, mapping);
        assert!(pending.delete_for(&store, "wamid.2").unwrap().is_none());
    }

    #[test]
    fn test_expired_record_reported_absent_but_kept() {
        let mut store = SqliteStore::open_in_memory().expect("open");
        let pending = PendingActions::default();

        // Insert an already-expired record directly through the store.
        store
            .put_pending_edit(&PendingEdit {
                message_id: "wamid.old".to_string(),
                code: "abc".to_string(),
                row_index: 2,
                updates: FieldUpdates::default(),
                expires_at: Utc::now() - Duration::minutes(5),
            })
            .unwrap();

        assert!(pending.edit_for(&store, "wamid.old").unwrap().is_none());
        // The raw record is still in storage; expiry is lazy, not a sweep.
        assert!(store.get_pending_edit("wamid.old").unwrap().is_some());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut store = SqliteStore::open_in_memory().expect("open");
        let pending = PendingActions::default();

        pending
            .stage_edit(&mut store, "wamid.e", "abc", 1, FieldUpdates::default())
            .unwrap();
        assert!(pending.clear_edit(&mut store, "wamid.e").unwrap());
        assert!(!pending.clear_edit(&mut store, "wamid.e").unwrap());
        assert!(!pending.clear_delete(&mut store, "wamid.never").unwrap());
    }
}
