//! Balance engine: running balance and settlement over the rows since
//! the last settlement marker.

use chrono::Utc;
use serde::Serialize;

use crate::error::Result;
use crate::query::after_last_settlement;
use crate::storage::{LedgerStore, NewExpense, Party, SETTLE_MARKER};

/// Nets closer than half a cent are considered settled.
const SETTLED_EPSILON: f64 = 0.005;

const SETTLEMENT_NAME: &str = "Settlement";
const SETTLEMENT_NOTES: &str = "settling up from last batch of payments";

/// Who owes whom, derived from rows since the last settlement.
///
/// Each party's net position is paid minus owed; the row invariant
/// (paid and owed splits both sum to the amount) makes the two nets
/// opposite, so a single `amount_owed` describes the imbalance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Balance {
    pub v_paid_total: f64,
    pub y_paid_total: f64,
    pub v_owes_total: f64,
    pub y_owes_total: f64,
    pub total: f64,
    pub amount_owed: f64,
    pub who_owes: Option<Party>,
}

/// Outcome of a settle-up request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettleOutcome {
    pub settled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<Party>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payee: Option<Party>,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Compute the balance over rows after the last settlement marker.
pub fn get_balance<S: LedgerStore + ?Sized>(store: &S) -> Result<Balance> {
    let rows = after_last_settlement(store.list_expenses()?);

    let mut v_paid_total = 0.0;
    let mut y_paid_total = 0.0;
    let mut v_owes_total = 0.0;
    let mut y_owes_total = 0.0;
    for row in &rows {
        v_paid_total += row.v_paid;
        y_paid_total += row.y_paid;
        v_owes_total += row.v_owes;
        y_owes_total += row.y_owes;
    }

    let net_v = v_paid_total - v_owes_total;
    let who_owes = if net_v.abs() < SETTLED_EPSILON {
        None
    } else if net_v < 0.0 {
        Some(Party::V)
    } else {
        Some(Party::Y)
    };

    Ok(Balance {
        v_paid_total,
        y_paid_total,
        v_owes_total,
        y_owes_total,
        total: v_paid_total + y_paid_total,
        amount_owed: net_v.abs(),
        who_owes,
    })
}

/// Record a settlement payment clearing the current balance.
///
/// Appends one synthetic row tagged with the settlement marker: the
/// debtor's paid column carries the owed amount and the owed columns
/// mirror it, so the row satisfies the invariants and becomes the new
/// scope boundary. A balanced ledger is a no-op.
pub fn settle_balance<S: LedgerStore + ?Sized>(store: &mut S) -> Result<SettleOutcome> {
    let balance = get_balance(store)?;

    let Some(payer) = balance.who_owes else {
        return Ok(SettleOutcome {
            settled: false,
            payer: None,
            payee: None,
            amount: 0.0,
            message: Some("No balance to settle!".to_string()),
        });
    };

    let amount = balance.amount_owed;
    let (v_paid, y_paid) = match payer {
        Party::V => (amount, 0.0),
        Party::Y => (0.0, amount),
    };

    let settlement = NewExpense::new(Utc::now(), SETTLEMENT_NAME, amount, v_paid, y_paid)
        .with_owes(v_paid, y_paid)
        .with_labels(vec![SETTLE_MARKER.to_string()])
        .with_notes(SETTLEMENT_NOTES);
    store.append_expense(&settlement)?;

    Ok(SettleOutcome {
        settled: true,
        payer: Some(payer),
        payee: Some(payer.other()),
        amount,
        message: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;

    fn store_with(rows: &[NewExpense]) -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().expect("open");
        for row in rows {
            store.append_expense(row).unwrap();
        }
        store
    }

    #[test]
    fn test_balanced_ledger_has_no_debtor() {
        let store = store_with(&[
            NewExpense::new(Utc::now(), "Costco", 50.0, 25.0, 25.0),
            NewExpense::new(Utc::now(), "Cafe", 20.0, 10.0, 10.0),
        ]);
        let balance = get_balance(&store).unwrap();
        assert_eq!(balance.who_owes, None);
        assert_eq!(balance.total, 70.0);
        assert_eq!(balance.total, balance.v_paid_total + balance.y_paid_total);
    }

    #[test]
    fn test_uneven_payment_even_split() {
        // V fronted the whole $50 on a 50/50 split: Y owes V $25.
        let store = store_with(&[NewExpense::new(Utc::now(), "Costco", 50.0, 50.0, 0.0)]);
        let balance = get_balance(&store).unwrap();
        assert_eq!(balance.who_owes, Some(Party::Y));
        assert_eq!(balance.amount_owed, 25.0);
    }

    #[test]
    fn test_uneven_split_respects_owed_columns() {
        // Y fronted $30 on a 60/40 split: V owes its $18 share.
        let store = store_with(&[
            NewExpense::new(Utc::now(), "Target", 30.0, 0.0, 30.0).with_share(0.6),
        ]);
        let balance = get_balance(&store).unwrap();
        assert_eq!(balance.who_owes, Some(Party::V));
        assert_eq!(balance.amount_owed, 18.0);
    }

    #[test]
    fn test_balance_scoped_to_rows_after_marker() {
        let mut store = store_with(&[
            NewExpense::new(Utc::now(), "Costco", 50.0, 50.0, 0.0),
            NewExpense::new(Utc::now(), "Target", 30.0, 0.0, 30.0).with_share(0.6),
        ]);
        store
            .append_expense(
                &NewExpense::new(Utc::now(), "Settlement", 7.0, 0.0, 7.0)
                    .with_owes(0.0, 7.0)
                    .with_labels(vec![SETTLE_MARKER.to_string()]),
            )
            .unwrap();

        let balance = get_balance(&store).unwrap();
        assert_eq!(balance.total, 0.0);
        assert_eq!(balance.who_owes, None);

        store
            .append_expense(&NewExpense::new(Utc::now(), "Deli", 12.0, 12.0, 0.0))
            .unwrap();
        let balance = get_balance(&store).unwrap();
        assert_eq!(balance.total, 12.0);
        assert_eq!(balance.who_owes, Some(Party::Y));
        assert_eq!(balance.amount_owed, 6.0);
    }

    #[test]
    fn test_settle_on_balanced_ledger_is_noop() {
        let mut store = store_with(&[NewExpense::new(Utc::now(), "Costco", 50.0, 25.0, 25.0)]);
        let outcome = settle_balance(&mut store).unwrap();
        assert!(!outcome.settled);
        assert_eq!(store.list_expenses().unwrap().len(), 1);
    }

    #[test]
    fn test_settle_appends_marker_and_clears_balance() {
        let mut store = store_with(&[NewExpense::new(Utc::now(), "Costco", 50.0, 50.0, 0.0)]);
        let outcome = settle_balance(&mut store).unwrap();
        assert!(outcome.settled);
        assert_eq!(outcome.payer, Some(Party::Y));
        assert_eq!(outcome.payee, Some(Party::V));
        assert_eq!(outcome.amount, 25.0);

        let rows = store.list_expenses().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[1].is_settle_marker());
        assert_eq!(rows[1].name, "Settlement");

        let balance = get_balance(&store).unwrap();
        assert_eq!(balance.who_owes, None);
        assert_eq!(balance.total, 0.0);
    }
}
