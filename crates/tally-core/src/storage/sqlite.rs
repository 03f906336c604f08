//! SQLite storage backend.
//!
//! Three tables: `expenses` (the ledger), `pending_deletes` and
//! `pending_edits` (the confirmation records). Row indices come from
//! `INTEGER PRIMARY KEY AUTOINCREMENT`, so they are strictly increasing
//! in append order and never reused after a delete.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

use crate::error::{Result, TallyError};
use crate::storage::traits::{LedgerStore, PendingStore};
use crate::storage::types::{ExpenseRow, FieldUpdates, NewExpense, PendingDelete, PendingEdit};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS expenses (
    row_index INTEGER PRIMARY KEY AUTOINCREMENT,
    date TEXT NOT NULL,
    name TEXT NOT NULL,
    amount REAL NOT NULL,
    v_paid REAL NOT NULL,
    y_paid REAL NOT NULL,
    v_owes REAL NOT NULL,
    y_owes REAL NOT NULL,
    labels TEXT NOT NULL DEFAULT '',
    notes TEXT,
    source_message_id TEXT
);

CREATE TABLE IF NOT EXISTS pending_deletes (
    message_id TEXT PRIMARY KEY,
    code_mapping TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pending_edits (
    message_id TEXT PRIMARY KEY,
    code TEXT NOT NULL,
    row_index INTEGER NOT NULL,
    edit_data TEXT NOT NULL,
    expires_at TEXT NOT NULL
);
"#;

/// SQLite-backed ledger and pending-action store.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if necessary) a ledger database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open an in-memory store, used by tests and throwaway sessions.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| TallyError::Storage(format!("Invalid timestamp: {}", e)))
    }

    fn join_labels(labels: &[String]) -> String {
        labels.join(", ")
    }

    fn split_labels(joined: &str) -> Vec<String> {
        joined
            .split(',')
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty())
            .collect()
    }
}

type ExpenseColumns = (
    i64,
    String,
    String,
    f64,
    f64,
    f64,
    f64,
    String,
    Option<String>,
    Option<String>,
);

const EXPENSE_COLUMNS: &str =
    "row_index, date, name, v_paid, y_paid, v_owes, y_owes, labels, notes, source_message_id";

fn read_expense_columns(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExpenseColumns> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn expense_from_columns(columns: ExpenseColumns) -> Result<ExpenseRow> {
    let (row_index, date, name, v_paid, y_paid, v_owes, y_owes, labels, notes, message_id) =
        columns;
    Ok(ExpenseRow {
        row_index,
        date: SqliteStore::parse_timestamp(&date)?,
        name,
        v_paid,
        y_paid,
        v_owes,
        y_owes,
        labels: SqliteStore::split_labels(&labels),
        notes,
        source_message_id: message_id,
    })
}

impl LedgerStore for SqliteStore {
    fn append_expense(&mut self, expense: &NewExpense) -> Result<i64> {
        expense.validate()?;

        self.conn.execute(
            r#"
            INSERT INTO expenses (
                date, name, amount, v_paid, y_paid, v_owes, y_owes,
                labels, notes, source_message_id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            (
                expense.date.to_rfc3339(),
                &expense.name,
                expense.amount,
                expense.v_paid,
                expense.y_paid,
                expense.v_owes,
                expense.y_owes,
                Self::join_labels(&expense.labels),
                &expense.notes,
                &expense.source_message_id,
            ),
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    fn list_expenses(&self) -> Result<Vec<ExpenseRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM expenses ORDER BY row_index ASC",
            EXPENSE_COLUMNS
        ))?;
        let rows = stmt.query_map([], read_expense_columns)?;

        let mut expenses = Vec::new();
        for row in rows {
            expenses.push(expense_from_columns(row?)?);
        }
        Ok(expenses)
    }

    fn get_expense(&self, row_index: i64) -> Result<Option<ExpenseRow>> {
        let columns = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM expenses WHERE row_index = ?",
                    EXPENSE_COLUMNS
                ),
                [row_index],
                read_expense_columns,
            )
            .optional()?;

        columns.map(expense_from_columns).transpose()
    }

    fn find_by_message_id(&self, message_id: &str) -> Result<Option<ExpenseRow>> {
        let columns = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM expenses WHERE source_message_id = ?",
                    EXPENSE_COLUMNS
                ),
                [message_id],
                read_expense_columns,
            )
            .optional()?;

        columns.map(expense_from_columns).transpose()
    }

    fn update_expense(&mut self, row_index: i64, updates: &FieldUpdates) -> Result<ExpenseRow> {
        let mut row = self
            .get_expense(row_index)?
            .ok_or_else(|| TallyError::NotFound(format!("Row {} not found", row_index)))?;

        updates.apply_to(&mut row);

        self.conn.execute(
            r#"
            UPDATE expenses
            SET name = ?, amount = ?, v_paid = ?, y_paid = ?, v_owes = ?, y_owes = ?,
                labels = ?, notes = ?
            WHERE row_index = ?
            "#,
            (
                &row.name,
                row.amount(),
                row.v_paid,
                row.y_paid,
                row.v_owes,
                row.y_owes,
                Self::join_labels(&row.labels),
                &row.notes,
                row_index,
            ),
        )?;

        Ok(row)
    }

    fn delete_expense(&mut self, row_index: i64) -> Result<ExpenseRow> {
        let row = self
            .get_expense(row_index)?
            .ok_or_else(|| TallyError::NotFound(format!("Row {} not found", row_index)))?;

        self.conn
            .execute("DELETE FROM expenses WHERE row_index = ?", [row_index])?;

        Ok(row)
    }
}

impl PendingStore for SqliteStore {
    fn put_pending_delete(&mut self, record: &PendingDelete) -> Result<()> {
        let code_mapping = serde_json::to_string(&record.code_mapping)?;
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO pending_deletes (message_id, code_mapping, expires_at)
            VALUES (?, ?, ?)
            "#,
            (
                &record.message_id,
                code_mapping,
                record.expires_at.to_rfc3339(),
            ),
        )?;
        Ok(())
    }

    fn get_pending_delete(&self, message_id: &str) -> Result<Option<PendingDelete>> {
        let columns: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT code_mapping, expires_at FROM pending_deletes WHERE message_id = ?",
                [message_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((mapping_json, expires_at_str)) = columns else {
            return Ok(None);
        };

        let code_mapping: BTreeMap<String, i64> = serde_json::from_str(&mapping_json)
            .map_err(|e| TallyError::Storage(format!("Invalid code mapping JSON: {}", e)))?;

        Ok(Some(PendingDelete {
            message_id: message_id.to_string(),
            code_mapping,
            expires_at: Self::parse_timestamp(&expires_at_str)?,
        }))
    }

    fn clear_pending_delete(&mut self, message_id: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM pending_deletes WHERE message_id = ?", [
                message_id,
            ])?;
        Ok(removed > 0)
    }

    fn put_pending_edit(&mut self, record: &PendingEdit) -> Result<()> {
        let edit_data = serde_json::to_string(&record.updates)?;
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO pending_edits (message_id, code, row_index, edit_data, expires_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
            (
                &record.message_id,
                &record.code,
                record.row_index,
                edit_data,
                record.expires_at.to_rfc3339(),
            ),
        )?;
        Ok(())
    }

    fn get_pending_edit(&self, message_id: &str) -> Result<Option<PendingEdit>> {
        let columns: Option<(String, i64, String, String)> = self
            .conn
            .query_row(
                "SELECT code, row_index, edit_data, expires_at FROM pending_edits WHERE message_id = ?",
                [message_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((code, row_index, edit_json, expires_at_str)) = columns else {
            return Ok(None);
        };

        let updates: FieldUpdates = serde_json::from_str(&edit_json)
            .map_err(|e| TallyError::Storage(format!("Invalid edit data JSON: {}", e)))?;

        Ok(Some(PendingEdit {
            message_id: message_id.to_string(),
            code,
            row_index,
            updates,
            expires_at: Self::parse_timestamp(&expires_at_str)?,
        }))
    }

    fn clear_pending_edit(&mut self, message_id: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM pending_edits WHERE message_id = ?", [
                message_id,
            ])?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(name: &str, v_paid: f64, y_paid: f64) -> NewExpense {
        NewExpense::new(Utc::now(), name, v_paid + y_paid, v_paid, y_paid)
    }

    #[test]
    fn test_append_assigns_increasing_indices() {
        let mut store = SqliteStore::open_in_memory().expect("open");
        let first = store.append_expense(&sample("Costco", 25.0, 25.0)).unwrap();
        let second = store.append_expense(&sample("Target", 30.0, 0.0)).unwrap();
        assert!(second > first);

        let rows = store.list_expenses().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Costco");
        assert_eq!(rows[1].name, "Target");
    }

    #[test]
    fn test_indices_not_reused_after_delete() {
        let mut store = SqliteStore::open_in_memory().expect("open");
        store.append_expense(&sample("A", 10.0, 0.0)).unwrap();
        let second = store.append_expense(&sample("B", 10.0, 0.0)).unwrap();
        store.delete_expense(second).unwrap();
        let third = store.append_expense(&sample("C", 10.0, 0.0)).unwrap();
        assert!(third > second);
    }

    #[test]
    fn test_labels_round_trip() {
        let mut store = SqliteStore::open_in_memory().expect("open");
        let expense = sample("Brunch", 15.0, 15.0)
            .with_labels(vec!["dining".to_string(), "brunch".to_string()]);
        let index = store.append_expense(&expense).unwrap();

        let row = store.get_expense(index).unwrap().expect("row");
        assert_eq!(row.labels, vec!["dining", "brunch"]);
    }

    #[test]
    fn test_find_by_message_id() {
        let mut store = SqliteStore::open_in_memory().expect("open");
        store
            .append_expense(&sample("Coffee", 5.0, 5.0).with_message_id("wamid.42"))
            .unwrap();

        let found = store.find_by_message_id("wamid.42").unwrap();
        assert_eq!(found.map(|r| r.name), Some("Coffee".to_string()));
        assert!(store.find_by_message_id("wamid.missing").unwrap().is_none());
    }

    #[test]
    fn test_update_recomputes_amount() {
        let mut store = SqliteStore::open_in_memory().expect("open");
        let index = store.append_expense(&sample("Gas", 20.0, 20.0)).unwrap();

        let updates = FieldUpdates {
            v_paid: Some(30.0),
            y_paid: Some(10.0),
            ..FieldUpdates::default()
        };
        let updated = store.update_expense(index, &updates).unwrap();
        assert_eq!(updated.amount(), 40.0);

        let stored_amount: f64 = store
            .conn
            .query_row(
                "SELECT amount FROM expenses WHERE row_index = ?",
                [index],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(stored_amount, 40.0);
    }

    #[test]
    fn test_update_missing_row_is_not_found() {
        let mut store = SqliteStore::open_in_memory().expect("open");
        let result = store.update_expense(99, &FieldUpdates::default());
        assert!(matches!(result, Err(TallyError::NotFound(_))));
    }

    #[test]
    fn test_pending_delete_round_trip() {
        let mut store = SqliteStore::open_in_memory().expect("open");
        let mut code_mapping = BTreeMap::new();
        code_mapping.insert("abc".to_string(), 7);
        code_mapping.insert("xyz".to_string(), 9);

        let record = PendingDelete {
            message_id: "wamid.confirm".to_string(),
            code_mapping: code_mapping.clone(),
            expires_at: Utc::now() + Duration::minutes(30),
        };
        store.put_pending_delete(&record).unwrap();

        let loaded = store.get_pending_delete("wamid.confirm").unwrap().unwrap();
        assert_eq!(loaded.code_mapping, code_mapping);

        assert!(store.clear_pending_delete("wamid.confirm").unwrap());
        assert!(!store.clear_pending_delete("wamid.confirm").unwrap());
    }

    #[test]
    fn test_pending_edit_round_trip() {
        let mut store = SqliteStore::open_in_memory().expect("open");
        let record = PendingEdit {
            message_id: "wamid.edit".to_string(),
            code: "qrs".to_string(),
            row_index: 3,
            updates: FieldUpdates {
                v_paid: Some(12.5),
                ..FieldUpdates::default()
            },
            expires_at: Utc::now() + Duration::minutes(30),
        };
        store.put_pending_edit(&record).unwrap();

        let loaded = store.get_pending_edit("wamid.edit").unwrap().unwrap();
        assert_eq!(loaded.code, "qrs");
        assert_eq!(loaded.updates.v_paid, Some(12.5));
        assert!(store.get_pending_edit("wamid.other").unwrap().is_none());
    }
}
