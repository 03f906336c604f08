//! External collaborator contracts: classifier, renderer, preprocessor,
//! transport, and the static identity directory.
//!
//! The language-model collaborators are black boxes to the core. They
//! are injected as trait objects (never globals) so tests and front
//! ends substitute fakes freely. Failure policy: the classifier fails
//! closed (unknown intent), the preprocessor fails open (whole message
//! as one ask), the renderer's failures fall back to the deterministic
//! strings below.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::intent::ClassifiedIntent;
use crate::storage::Party;

/// Result of splitting a raw message into individual asks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessOutcome {
    pub is_valid: bool,
    #[serde(default)]
    pub asks: Vec<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default = "default_in_domain")]
    pub is_in_domain: bool,
}

fn default_in_domain() -> bool {
    true
}

impl PreprocessOutcome {
    /// The whole message as a single ask — also the fail-open shape.
    pub fn single(message: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            asks: vec![message.into()],
            error_message: None,
            is_in_domain: true,
        }
    }

    pub fn valid(asks: Vec<String>) -> Self {
        Self {
            is_valid: true,
            asks,
            error_message: None,
            is_in_domain: true,
        }
    }

    pub fn out_of_domain(error_message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            asks: Vec::new(),
            error_message: Some(error_message.into()),
            is_in_domain: false,
        }
    }

    pub fn too_many_asks(error_message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            asks: Vec::new(),
            error_message: Some(error_message.into()),
            is_in_domain: true,
        }
    }
}

/// Splits a raw message into at most five domain-relevant asks.
///
/// Implementations must fail open: on transport error, return the whole
/// message as one ask rather than erroring.
pub trait MessagePreprocessor {
    fn split(&self, message: &str) -> PreprocessOutcome;
}

/// Maps actor-prefixed prompts to structured intents.
///
/// Must return exactly one result per prompt and fail closed: a
/// transport error or unrecognized intent becomes
/// `ClassifiedIntent { intent: None, .. }`, never a panic.
pub trait IntentClassifier {
    fn classify(&self, prompts: &[String]) -> Vec<ClassifiedIntent>;
}

/// One executed intent, paired with the ask that produced it, as input
/// to response generation.
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    pub query: String,
    pub intent: String,
    pub success: bool,
    pub result: serde_json::Value,
}

/// Turns executed intents into one natural-language reply.
pub trait ResponseRenderer {
    fn render(&self, exchanges: &[Exchange]) -> Result<String>;
}

/// Outbound message transport.
///
/// The returned id of the delivered message is the correlation key for
/// pending confirmations; `None` means the transport cannot report one
/// and confirmation is unsupported for that exchange.
pub trait Messenger {
    fn send(&mut self, to: &str, text: &str) -> Result<Option<String>>;
}

/// Static mapping from external sender ids to parties.
#[derive(Debug, Clone, Default)]
pub struct PartyDirectory {
    entries: HashMap<String, Party>,
}

impl PartyDirectory {
    pub fn new(entries: HashMap<String, Party>) -> Self {
        Self { entries }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, Party)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Resolve a sender id. Unmapped senders are rejected before any
    /// core operation runs.
    pub fn resolve(&self, sender: &str) -> Option<Party> {
        self.entries.get(sender).copied()
    }
}

/// Deterministic per-intent reply used when the renderer fails.
pub fn fallback_reply(exchanges: &[Exchange]) -> String {
    if exchanges.len() == 1 {
        return single_fallback(&exchanges[0]);
    }

    let lines: Vec<String> = exchanges.iter().map(batch_fallback_line).collect();
    format!("{}.", lines.join(". "))
}

fn single_fallback(exchange: &Exchange) -> String {
    if !exchange.success {
        if let Some(error) = exchange.result.get("error").and_then(|v| v.as_str()) {
            return format!("❌ {}", error);
        }
        return "Something went wrong. Please try again.".to_string();
    }

    match exchange.intent.as_str() {
        "log_expense" => "✅ Expense logged!".to_string(),
        "query_grouped_agg" => format!(
            "Results: {}",
            exchange.result.get("results").unwrap_or(&serde_json::Value::Null)
        ),
        "query_rows" => "Here are your records.".to_string(),
        "get_balance" => format!("Balance: ${}", balance_amount(&exchange.result)),
        "settle_balance" => "✅ Settled up!".to_string(),
        "delete_expense" => "Looking for that expense...".to_string(),
        "edit_expense" => "✅ Expense updated!".to_string(),
        "clarify" => exchange
            .result
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("Could you clarify?")
            .to_string(),
        _ => "Something went wrong. Please try again.".to_string(),
    }
}

fn batch_fallback_line(exchange: &Exchange) -> String {
    if !exchange.success {
        let error = exchange
            .result
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("Something went wrong");
        return format!("❌ {}", error);
    }

    match exchange.intent.as_str() {
        "log_expense" => "✅ Expense logged".to_string(),
        "get_balance" => format!("✅ Balance: ${}", balance_amount(&exchange.result)),
        "settle_balance" => "✅ Settled up".to_string(),
        "edit_expense" => "✅ Expense updated".to_string(),
        "clarify" => format!(
            "❌ {}",
            exchange
                .result
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("Need clarification")
        ),
        _ => "✅ Done".to_string(),
    }
}

fn balance_amount(result: &serde_json::Value) -> String {
    result
        .get("amount_owed")
        .and_then(|v| v.as_f64())
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| "N/A".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn exchange(intent: &str, success: bool, result: serde_json::Value) -> Exchange {
        Exchange {
            query: "q".to_string(),
            intent: intent.to_string(),
            success,
            result,
        }
    }

    #[test]
    fn test_directory_resolves_known_senders() {
        let directory = PartyDirectory::from_entries([
            ("15550001".to_string(), Party::V),
            ("15550002".to_string(), Party::Y),
        ]);
        assert_eq!(directory.resolve("15550001"), Some(Party::V));
        assert_eq!(directory.resolve("15559999"), None);
    }

    #[test]
    fn test_single_fallbacks_per_intent() {
        assert_eq!(
            fallback_reply(&[exchange("log_expense", true, json!({}))]),
            "✅ Expense logged!"
        );
        assert_eq!(
            fallback_reply(&[exchange("get_balance", true, json!({"amount_owed": 12.5}))]),
            "Balance: $12.50"
        );
        assert_eq!(
            fallback_reply(&[exchange("clarify", true, json!({"message": "How much?"}))]),
            "How much?"
        );
    }

    #[test]
    fn test_single_fallback_failure_carries_error() {
        let reply = fallback_reply(&[exchange(
            "log_expense",
            false,
            json!({"error": "amount missing"}),
        )]);
        assert_eq!(reply, "❌ amount missing");
    }

    #[test]
    fn test_batch_fallback_mixes_marks() {
        let reply = fallback_reply(&[
            exchange("log_expense", true, json!({})),
            exchange("error", false, json!({"error": "Could not understand request"})),
        ]);
        assert!(reply.contains("✅ Expense logged"));
        assert!(reply.contains("❌ Could not understand request"));
    }

    #[test]
    fn test_preprocess_fail_open_shape() {
        let outcome = PreprocessOutcome::single("log $20 at costco");
        assert!(outcome.is_valid);
        assert_eq!(outcome.asks.len(), 1);
        assert!(outcome.is_in_domain);
    }
}
