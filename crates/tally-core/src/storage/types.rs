//! Core data types for the ledger storage layer.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};

/// Reserved label marking a settlement checkpoint row.
pub const SETTLE_MARKER: &str = "settle-up";

/// Monetary comparisons tolerate rounding to the cent.
pub const MONEY_EPSILON: f64 = 0.01;

/// One of the two parties sharing the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    V,
    Y,
}

impl Party {
    pub fn other(self) -> Party {
        match self {
            Party::V => Party::Y,
            Party::Y => Party::V,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Party::V => "V",
            Party::Y => "Y",
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Round a monetary value to the cent.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One ledger entry.
///
/// `row_index` is assigned by the store at append time, is strictly
/// increasing, and is never reused after a delete. It is the sole handle
/// for update and delete operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRow {
    pub row_index: i64,
    pub date: DateTime<Utc>,
    pub name: String,
    pub v_paid: f64,
    pub y_paid: f64,
    pub v_owes: f64,
    pub y_owes: f64,
    pub labels: Vec<String>,
    pub notes: Option<String>,
    pub source_message_id: Option<String>,
}

impl ExpenseRow {
    /// Total amount, always derived from the paid columns.
    pub fn amount(&self) -> f64 {
        self.v_paid + self.y_paid
    }

    pub fn paid_by(&self, party: Party) -> f64 {
        match party {
            Party::V => self.v_paid,
            Party::Y => self.y_paid,
        }
    }

    pub fn labels_joined(&self) -> String {
        self.labels.join(", ")
    }

    /// Whether this row is a settlement checkpoint.
    pub fn is_settle_marker(&self) -> bool {
        self.labels_joined()
            .to_lowercase()
            .contains(SETTLE_MARKER)
    }
}

/// Builder for appending new ledger entries.
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub date: DateTime<Utc>,
    pub name: String,
    pub amount: f64,
    pub v_paid: f64,
    pub y_paid: f64,
    pub v_owes: f64,
    pub y_owes: f64,
    pub labels: Vec<String>,
    pub notes: Option<String>,
    pub source_message_id: Option<String>,
}

impl NewExpense {
    /// Create a new expense with a default 50/50 owed split.
    pub fn new(
        date: DateTime<Utc>,
        name: impl Into<String>,
        amount: f64,
        v_paid: f64,
        y_paid: f64,
    ) -> Self {
        Self {
            date,
            name: name.into(),
            amount,
            v_paid,
            y_paid,
            v_owes: round_cents(amount / 2.0),
            y_owes: round_cents(amount / 2.0),
            labels: Vec::new(),
            notes: None,
            source_message_id: None,
        }
    }

    /// Set the owed split from V's share fraction of the amount.
    pub fn with_share(mut self, share: f64) -> Self {
        self.v_owes = round_cents(self.amount * share);
        self.y_owes = round_cents(self.amount * (1.0 - share));
        self
    }

    pub fn with_owes(mut self, v_owes: f64, y_owes: f64) -> Self {
        self.v_owes = v_owes;
        self.y_owes = y_owes;
        self
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.source_message_id = Some(message_id.into());
        self
    }

    /// Check the row invariants before the store accepts the entry.
    ///
    /// # Errors
    ///
    /// Returns `TallyError::Validation` if:
    /// - any monetary field is negative
    /// - `amount` differs from `v_paid + y_paid` by more than a cent
    /// - the owed columns do not sum back to the amount
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("amount", self.amount),
            ("v_paid", self.v_paid),
            ("y_paid", self.y_paid),
            ("v_owes", self.v_owes),
            ("y_owes", self.y_owes),
        ] {
            if value < 0.0 {
                return Err(TallyError::Validation(format!(
                    "{} cannot be negative (got {})",
                    field, value
                )));
            }
        }

        if (self.amount - (self.v_paid + self.y_paid)).abs() > MONEY_EPSILON {
            return Err(TallyError::Validation(format!(
                "amount {} does not match paid split {} + {}",
                self.amount, self.v_paid, self.y_paid
            )));
        }

        if (self.amount - (self.v_owes + self.y_owes)).abs() > MONEY_EPSILON {
            return Err(TallyError::Validation(format!(
                "owed split {} + {} does not sum to amount {}",
                self.v_owes, self.y_owes, self.amount
            )));
        }

        Ok(())
    }
}

/// Field-level updates applied to an existing row.
///
/// Serialized as the `edit_data` JSON column of a pending edit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldUpdates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v_paid: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_paid: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v_owes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_owes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl FieldUpdates {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.v_paid.is_none()
            && self.y_paid.is_none()
            && self.v_owes.is_none()
            && self.y_owes.is_none()
            && self.labels.is_none()
            && self.notes.is_none()
    }

    /// Apply the updates in place. The caller is responsible for keeping
    /// the derived amount column in sync.
    pub fn apply_to(&self, row: &mut ExpenseRow) {
        if let Some(name) = &self.name {
            row.name = name.clone();
        }
        if let Some(v_paid) = self.v_paid {
            row.v_paid = v_paid;
        }
        if let Some(y_paid) = self.y_paid {
            row.y_paid = y_paid;
        }
        if let Some(v_owes) = self.v_owes {
            row.v_owes = v_owes;
        }
        if let Some(y_owes) = self.y_owes {
            row.y_owes = y_owes;
        }
        if let Some(labels) = &self.labels {
            row.labels = labels.clone();
        }
        if let Some(notes) = &self.notes {
            row.notes = Some(notes.clone());
        }
    }
}

/// A pending delete awaiting short-code confirmation.
///
/// Keyed by the message id of the bot's confirmation message. The code
/// mapping supports up to three simultaneous candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDelete {
    pub message_id: String,
    pub code_mapping: BTreeMap<String, i64>,
    pub expires_at: DateTime<Utc>,
}

/// A pending edit awaiting short-code confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEdit {
    pub message_id: String,
    pub code: String,
    pub row_index: i64,
    pub updates: FieldUpdates,
    pub expires_at: DateTime<Utc>,
}
