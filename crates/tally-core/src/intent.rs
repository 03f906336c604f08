//! Structured intents produced by the external classifier.
//!
//! One tagged-union variant per intent name, each carrying its own
//! strongly-typed argument record. Dispatch is an exhaustive match, not
//! string branching; a payload that does not parse into this enum is an
//! unknown intent and surfaces as a structured error result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::query::{GroupedAggQuery, RowsQuery};

/// A classified intent with its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", content = "args", rename_all = "snake_case")]
pub enum Intent {
    LogExpense(LogExpenseArgs),
    QueryGroupedAgg(GroupedAggQuery),
    QueryRows(RowsQuery),
    GetBalance {},
    SettleBalance {},
    DeleteExpense(DeleteExpenseArgs),
    EditExpense(EditExpenseArgs),
    Clarify(ClarifyArgs),
}

impl Intent {
    /// Intent name as the classifier and renderer know it.
    pub fn name(&self) -> &'static str {
        match self {
            Intent::LogExpense(_) => "log_expense",
            Intent::QueryGroupedAgg(_) => "query_grouped_agg",
            Intent::QueryRows(_) => "query_rows",
            Intent::GetBalance {} => "get_balance",
            Intent::SettleBalance {} => "settle_balance",
            Intent::DeleteExpense(_) => "delete_expense",
            Intent::EditExpense(_) => "edit_expense",
            Intent::Clarify(_) => "clarify",
        }
    }
}

/// Classifier output for one prompt. A failed or unrecognized
/// classification carries `intent: None` — the classifier fails closed
/// rather than erroring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedIntent {
    pub reasoning: String,
    pub intent: Option<Intent>,
}

impl ClassifiedIntent {
    pub fn unknown(reasoning: impl Into<String>) -> Self {
        Self {
            reasoning: reasoning.into(),
            intent: None,
        }
    }
}

fn default_share() -> f64 {
    0.5
}

/// Arguments for logging a new expense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogExpenseArgs {
    /// Defaults to now when the classifier omits it.
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    pub name: String,
    pub amount: f64,
    pub v_paid: f64,
    pub y_paid: f64,
    /// V's fraction of the owed split.
    #[serde(default = "default_share")]
    pub share: f64,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Injected by the handler from the inbound message, never by the
    /// classifier.
    #[serde(default)]
    pub source_message_id: Option<String>,
}

/// How a delete request targets its candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    Last,
    ByDate,
    ByMerchant,
}

/// Arguments for a delete request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteExpenseArgs {
    pub delete_mode: DeleteMode,
    /// Required for `by_date`.
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    /// Required for `by_merchant`.
    #[serde(default)]
    pub merchant: Option<String>,
}

/// Arguments for an edit request; only the fields being changed are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditExpenseArgs {
    #[serde(default)]
    pub new_amount: Option<f64>,
    #[serde(default)]
    pub new_v_paid: Option<f64>,
    #[serde(default)]
    pub new_y_paid: Option<f64>,
    #[serde(default)]
    pub new_merchant: Option<String>,
}

/// Arguments for asking the user for missing information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarifyArgs {
    pub message: String,
    #[serde(default)]
    pub missing_fields: Vec<String>,
}
