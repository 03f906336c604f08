//! Intent dispatcher: routes structured intents to the ledger, query,
//! balance, and pending-action operations.
//!
//! Destructive operations never mutate directly. A delete or edit
//! request produces candidates guarded by short codes; the mutation only
//! happens when a matching code arrives before the pending record
//! expires. Per-intent errors are converted to structured outcome
//! records so one failing intent never aborts its siblings.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::balance::{get_balance, settle_balance};
use crate::condition::{Column, CompareOp, Condition};
use crate::error::{Result, TallyError};
use crate::intent::{DeleteExpenseArgs, DeleteMode, EditExpenseArgs, Intent, LogExpenseArgs};
use crate::pending::{short_code, PendingActions};
use crate::query::{query_grouped_agg, query_rows, RowsQuery};
use crate::storage::{
    round_cents, ExpenseRow, FieldUpdates, LedgerStore, NewExpense, Party, PendingStore,
};

/// At most this many delete candidates are proposed at once.
pub const MAX_DELETE_CANDIDATES: usize = 3;

/// Values within one unit of 100 are read as a percentage split.
const PERCENT_SUM_TOLERANCE: f64 = 1.0;

/// Per-request context supplied by the chat or CLI front end.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Which party sent the request, when known.
    pub actor: Option<Party>,
    /// Id of the inbound message, recorded on logged expenses so later
    /// replies can target them.
    pub message_id: Option<String>,
}

/// Structured result of one intent execution.
#[derive(Debug, Clone, Serialize)]
pub struct IntentOutcome {
    pub intent: String,
    pub success: bool,
    pub result: serde_json::Value,
}

impl IntentOutcome {
    pub fn ok(intent: &str, result: serde_json::Value) -> Self {
        Self {
            intent: intent.to_string(),
            success: true,
            result,
        }
    }

    pub fn fail(intent: &str, error: &str) -> Self {
        Self {
            intent: intent.to_string(),
            success: false,
            result: json!({ "error": error }),
        }
    }
}

/// A freshly logged expense, echoed back for response generation.
#[derive(Debug, Clone, Serialize)]
pub struct LoggedExpense {
    pub row_index: i64,
    pub merchant: String,
    pub amount: f64,
    pub v_paid: f64,
    pub y_paid: f64,
    pub labels: Vec<String>,
    pub notes: Option<String>,
}

/// One delete candidate with its confirmation code.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteCandidate {
    pub code: String,
    pub row: ExpenseRow,
}

/// Proposed delete candidates awaiting confirmation.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteProposal {
    pub delete_mode: DeleteMode,
    pub candidates: Vec<DeleteCandidate>,
}

/// A staged edit awaiting confirmation.
#[derive(Debug, Clone, Serialize)]
pub struct EditStaging {
    pub code: String,
    pub row_index: i64,
    pub original: ExpenseRow,
    pub updates: FieldUpdates,
}

/// Mutation applied by a confirmed short code.
#[derive(Debug, Clone, Serialize)]
pub enum Confirmed {
    Edited(ExpenseRow),
    Deleted(ExpenseRow),
}

/// Routes intents to ledger operations and owns the confirmation
/// workflow for destructive ones.
pub struct Dispatcher<S> {
    store: S,
    pending: PendingActions,
}

impl<S: LedgerStore + PendingStore> Dispatcher<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            pending: PendingActions::default(),
        }
    }

    pub fn with_pending(store: S, pending: PendingActions) -> Self {
        Self { store, pending }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Execute one classified intent, converting any error into a
    /// structured failure outcome.
    pub fn execute(&mut self, classified: Option<Intent>, ctx: &RequestContext) -> IntentOutcome {
        let Some(intent) = classified else {
            return IntentOutcome::fail("error", "Could not understand request");
        };

        let name = intent.name();
        debug!(intent = name, "executing intent");
        match self.run(intent, ctx) {
            Ok(result) => IntentOutcome::ok(name, result),
            Err(err) => {
                warn!(intent = name, error = %err, "intent execution failed");
                IntentOutcome::fail(name, &err.to_string())
            }
        }
    }

    fn run(&mut self, intent: Intent, ctx: &RequestContext) -> Result<serde_json::Value> {
        match intent {
            Intent::LogExpense(mut args) => {
                if args.source_message_id.is_none() {
                    args.source_message_id = ctx.message_id.clone();
                }
                Ok(serde_json::to_value(self.log_expense(&args)?)?)
            }
            Intent::QueryGroupedAgg(query) => {
                Ok(serde_json::to_value(query_grouped_agg(&self.store, &query)?)?)
            }
            Intent::QueryRows(query) => {
                Ok(serde_json::to_value(query_rows(&self.store, &query)?)?)
            }
            Intent::GetBalance {} => Ok(serde_json::to_value(get_balance(&self.store)?)?),
            Intent::SettleBalance {} => {
                Ok(serde_json::to_value(settle_balance(&mut self.store)?)?)
            }
            Intent::DeleteExpense(args) => {
                let proposal = self.propose_delete(&args, ctx.actor)?;
                Ok(serde_json::to_value(proposal)?)
            }
            Intent::EditExpense(_) => Err(TallyError::Validation(
                "Edit requests must reply to the logged expense message".to_string(),
            )),
            Intent::Clarify(args) => Ok(json!({
                "message": args.message,
                "missing_fields": args.missing_fields,
            })),
        }
    }

    fn log_expense(&mut self, args: &LogExpenseArgs) -> Result<LoggedExpense> {
        if !(0.0..=1.0).contains(&args.share) {
            return Err(TallyError::Validation(format!(
                "share must be between 0 and 1 (got {})",
                args.share
            )));
        }

        let date = args.date.unwrap_or_else(Utc::now);
        let mut expense =
            NewExpense::new(date, args.name.clone(), args.amount, args.v_paid, args.y_paid)
                .with_share(args.share)
                .with_labels(args.labels.clone());
        if let Some(notes) = &args.notes {
            expense = expense.with_notes(notes.clone());
        }
        if let Some(message_id) = &args.source_message_id {
            expense = expense.with_message_id(message_id.clone());
        }

        let row_index = self.store.append_expense(&expense)?;
        Ok(LoggedExpense {
            row_index,
            merchant: args.name.clone(),
            amount: args.amount,
            v_paid: args.v_paid,
            y_paid: args.y_paid,
            labels: args.labels.clone(),
            notes: args.notes.clone(),
        })
    }

    /// Phase one of a delete: query candidates and mint their codes.
    /// Nothing is deleted and nothing is registered yet — the caller
    /// registers the proposal under the confirmation message id once the
    /// transport reports one.
    pub fn propose_delete(
        &mut self,
        args: &DeleteExpenseArgs,
        actor: Option<Party>,
    ) -> Result<DeleteProposal> {
        let mut conditions = Vec::new();
        match args.delete_mode {
            DeleteMode::Last => {}
            DeleteMode::ByDate => {
                let date = args.date.ok_or_else(|| {
                    TallyError::Validation("Delete by date requires a date".to_string())
                })?;
                conditions.push(Condition::new(
                    Column::Date,
                    CompareOp::Contains,
                    date.format("%Y-%m-%d").to_string(),
                ));
            }
            DeleteMode::ByMerchant => {
                let merchant = args.merchant.clone().ok_or_else(|| {
                    TallyError::Validation("Delete by merchant requires a merchant".to_string())
                })?;
                conditions.push(Condition::new(Column::Name, CompareOp::Contains, merchant));
            }
        }

        let limit = match args.delete_mode {
            DeleteMode::Last => 1,
            _ => MAX_DELETE_CANDIDATES,
        };
        let result = query_rows(
            &self.store,
            &RowsQuery {
                conditions,
                limit: Some(limit),
            },
        )?;

        let mut rows = result.rows;
        if let Some(actor) = actor {
            // A party can only delete expenses it actually paid into.
            rows.retain(|row| row.paid_by(actor) > 0.0);
        }
        if rows.is_empty() {
            return Err(TallyError::NotFound(
                "No matching expenses found".to_string(),
            ));
        }

        let mut used = HashSet::new();
        let mut candidates = Vec::with_capacity(rows.len());
        for row in rows.into_iter().take(MAX_DELETE_CANDIDATES) {
            let mut code = short_code()?;
            while !used.insert(code.clone()) {
                code = short_code()?;
            }
            candidates.push(DeleteCandidate { code, row });
        }

        Ok(DeleteProposal {
            delete_mode: args.delete_mode,
            candidates,
        })
    }

    /// Register a proposal under the confirmation message id returned by
    /// the transport.
    pub fn register_pending_delete(
        &mut self,
        confirmation_id: &str,
        proposal: &DeleteProposal,
    ) -> Result<()> {
        let code_mapping: BTreeMap<String, i64> = proposal
            .candidates
            .iter()
            .map(|c| (c.code.clone(), c.row.row_index))
            .collect();
        self.pending
            .stage_delete(&mut self.store, confirmation_id, code_mapping)?;
        Ok(())
    }

    /// Resolve an edit request against the row logged from the
    /// replied-to message and stage the resulting field updates.
    pub fn stage_edit_for_reply(
        &mut self,
        reply_to_message_id: &str,
        args: &EditExpenseArgs,
    ) -> Result<EditStaging> {
        let original = self
            .store
            .find_by_message_id(reply_to_message_id)?
            .ok_or_else(|| {
                TallyError::NotFound(
                    "Could not find that expense. Make sure you're replying to an expense log message."
                        .to_string(),
                )
            })?;

        Self::stage_edit(original, args)
    }

    /// Stage an edit against a row addressed by index (the CLI front end
    /// has no reply-context message ids).
    pub fn stage_edit_for_row(
        &mut self,
        row_index: i64,
        args: &EditExpenseArgs,
    ) -> Result<EditStaging> {
        let original = self
            .store
            .get_expense(row_index)?
            .ok_or_else(|| TallyError::NotFound(format!("Row {} not found", row_index)))?;
        Self::stage_edit(original, args)
    }

    fn stage_edit(original: ExpenseRow, args: &EditExpenseArgs) -> Result<EditStaging> {
        let updates = compute_edit_updates(&original, args)?;
        Ok(EditStaging {
            code: short_code()?,
            row_index: original.row_index,
            original,
            updates,
        })
    }

    /// Register a staged edit under the confirmation message id.
    pub fn register_pending_edit(
        &mut self,
        confirmation_id: &str,
        staging: &EditStaging,
    ) -> Result<()> {
        self.pending.stage_edit(
            &mut self.store,
            confirmation_id,
            &staging.code,
            staging.row_index,
            staging.updates.clone(),
        )?;
        Ok(())
    }

    /// Apply the pending action guarded by a short code.
    ///
    /// Pending edits are checked before pending deletes (one message can
    /// only carry one of the two).
    ///
    /// # Errors
    ///
    /// - `TallyError::CodeMismatch` — a live record exists but the code
    ///   does not match.
    /// - `TallyError::Expired` — no live record under this message id.
    pub fn confirm(&mut self, confirmation_id: &str, code: &str) -> Result<Confirmed> {
        if let Some(edit) = self.pending.edit_for(&self.store, confirmation_id)? {
            if edit.code != code {
                return Err(TallyError::CodeMismatch(format!(
                    "Invalid code '{}'. Please use the code shown above.",
                    code
                )));
            }
            let updated = self.store.update_expense(edit.row_index, &edit.updates)?;
            self.pending.clear_edit(&mut self.store, confirmation_id)?;
            debug!(row_index = edit.row_index, "confirmed pending edit");
            return Ok(Confirmed::Edited(updated));
        }

        if let Some(delete) = self.pending.delete_for(&self.store, confirmation_id)? {
            let Some(&row_index) = delete.code_mapping.get(code) else {
                return Err(TallyError::CodeMismatch(format!(
                    "Invalid code '{}'. Please use the code shown above.",
                    code
                )));
            };
            let deleted = self.store.delete_expense(row_index)?;
            self.pending.clear_delete(&mut self.store, confirmation_id)?;
            debug!(row_index, "confirmed pending delete");
            return Ok(Confirmed::Deleted(deleted));
        }

        Err(TallyError::Expired(
            "This request has expired. Please try again.".to_string(),
        ))
    }

    /// Reply-based delete: remove the expense logged from a message.
    pub fn delete_by_message_id(&mut self, message_id: &str) -> Result<ExpenseRow> {
        let row = self
            .store
            .find_by_message_id(message_id)?
            .ok_or_else(|| {
                TallyError::NotFound("Expense not found for this message".to_string())
            })?;
        self.store.delete_expense(row.row_index)
    }
}

/// Compute the field updates for an edit request.
///
/// The owed split preserves the original share fraction
/// (`orig_v_owes / orig_amount`, 0.5 fallback) unless the edit itself
/// changes the split as a percentage. Two split values summing to ~100
/// are read as percentages of the current amount — an inherent ambiguity
/// for absolute splits near $100, accepted as-is.
pub fn compute_edit_updates(
    original: &ExpenseRow,
    args: &EditExpenseArgs,
) -> Result<FieldUpdates> {
    let orig_v = original.v_paid;
    let orig_y = original.y_paid;
    let mut current_amount = orig_v + orig_y;

    let mut share = if current_amount > 0.0 {
        original.v_owes / current_amount
    } else {
        0.5
    };

    let mut updates = FieldUpdates::default();

    if let Some(new_amount) = args.new_amount {
        if new_amount < 0.0 {
            return Err(TallyError::Validation(format!(
                "amount cannot be negative (got {})",
                new_amount
            )));
        }
        // Re-split the payment proportionally to who originally paid.
        if current_amount > 0.0 {
            let v_ratio = orig_v / current_amount;
            updates.v_paid = Some(round_cents(new_amount * v_ratio));
            updates.y_paid = Some(round_cents(new_amount * (1.0 - v_ratio)));
        } else {
            updates.v_paid = Some(round_cents(new_amount / 2.0));
            updates.y_paid = Some(round_cents(new_amount / 2.0));
        }
        current_amount = new_amount;
    }

    match (args.new_v_paid, args.new_y_paid) {
        (Some(new_v), Some(new_y)) => {
            if ((new_v + new_y) - 100.0).abs() < PERCENT_SUM_TOLERANCE {
                share = new_v / 100.0;
                updates.v_paid = Some(round_cents(current_amount * new_v / 100.0));
                updates.y_paid = Some(round_cents(current_amount * new_y / 100.0));
            } else {
                updates.v_paid = Some(new_v);
                updates.y_paid = Some(new_y);
            }
        }
        (Some(new_v), None) => {
            if new_v == 0.0 {
                updates.v_paid = Some(0.0);
                updates.y_paid = Some(current_amount);
            } else {
                updates.v_paid = Some(new_v);
                updates.y_paid = Some(current_amount - new_v);
            }
        }
        (None, Some(new_y)) => {
            if new_y == 0.0 {
                updates.y_paid = Some(0.0);
                updates.v_paid = Some(current_amount);
            } else {
                updates.y_paid = Some(new_y);
                updates.v_paid = Some(current_amount - new_y);
            }
        }
        (None, None) => {}
    }

    if let Some(merchant) = &args.new_merchant {
        updates.name = Some(merchant.clone());
    }

    if updates.v_paid.is_some() || updates.y_paid.is_some() {
        let final_v = updates.v_paid.unwrap_or(orig_v);
        let final_y = updates.y_paid.unwrap_or(orig_y);
        if final_v < 0.0 || final_y < 0.0 {
            return Err(TallyError::Validation(
                "Split amounts cannot be negative".to_string(),
            ));
        }
        let final_amount = final_v + final_y;
        updates.v_owes = Some(round_cents(final_amount * share));
        updates.y_owes = Some(round_cents(final_amount * (1.0 - share)));
    }

    if updates.is_empty() {
        return Err(TallyError::Validation(
            "Could not determine what to change".to_string(),
        ));
    }

    Ok(updates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;
    use chrono::{TimeZone, Utc};

    fn dispatcher() -> Dispatcher<SqliteStore> {
        Dispatcher::new(SqliteStore::open_in_memory().expect("open"))
    }

    fn log(dispatcher: &mut Dispatcher<SqliteStore>, args: LogExpenseArgs) -> IntentOutcome {
        dispatcher.execute(Some(Intent::LogExpense(args)), &RequestContext::default())
    }

    fn costco_args() -> LogExpenseArgs {
        LogExpenseArgs {
            date: None,
            name: "Costco".to_string(),
            amount: 50.0,
            v_paid: 25.0,
            y_paid: 25.0,
            share: 0.5,
            labels: vec!["groceries".to_string()],
            notes: None,
            source_message_id: None,
        }
    }

    fn sample_row(v_paid: f64, y_paid: f64, v_owes: f64, y_owes: f64) -> ExpenseRow {
        ExpenseRow {
            row_index: 1,
            date: Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap(),
            name: "Costco".to_string(),
            v_paid,
            y_paid,
            v_owes,
            y_owes,
            labels: Vec::new(),
            notes: None,
            source_message_id: None,
        }
    }

    #[test]
    fn test_log_expense_outcome() {
        let mut dispatcher = dispatcher();
        let outcome = log(&mut dispatcher, costco_args());
        assert!(outcome.success);
        assert_eq!(outcome.intent, "log_expense");
        assert_eq!(outcome.result["merchant"], "Costco");

        let rows = dispatcher.store().list_expenses().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].v_owes + rows[0].y_owes, rows[0].amount());
    }

    #[test]
    fn test_log_expense_records_message_id_from_context() {
        let mut dispatcher = dispatcher();
        let ctx = RequestContext {
            actor: Some(Party::V),
            message_id: Some("wamid.7".to_string()),
        };
        dispatcher.execute(Some(Intent::LogExpense(costco_args())), &ctx);

        let row = dispatcher
            .store()
            .find_by_message_id("wamid.7")
            .unwrap()
            .expect("row");
        assert_eq!(row.name, "Costco");
    }

    #[test]
    fn test_unknown_intent_is_structured_error() {
        let mut dispatcher = dispatcher();
        let outcome = dispatcher.execute(None, &RequestContext::default());
        assert!(!outcome.success);
        assert_eq!(outcome.intent, "error");
        assert_eq!(outcome.result["error"], "Could not understand request");
    }

    #[test]
    fn test_failed_intent_does_not_panic_siblings() {
        let mut dispatcher = dispatcher();
        let bad = LogExpenseArgs {
            amount: 50.0,
            v_paid: 10.0,
            y_paid: 10.0,
            ..costco_args()
        };
        let outcome = log(&mut dispatcher, bad);
        assert!(!outcome.success);

        let outcome = log(&mut dispatcher, costco_args());
        assert!(outcome.success);
    }

    #[test]
    fn test_propose_delete_last() {
        let mut dispatcher = dispatcher();
        log(&mut dispatcher, costco_args());
        log(
            &mut dispatcher,
            LogExpenseArgs {
                name: "Target".to_string(),
                amount: 30.0,
                v_paid: 30.0,
                y_paid: 0.0,
                ..costco_args()
            },
        );

        let proposal = dispatcher
            .propose_delete(
                &DeleteExpenseArgs {
                    delete_mode: DeleteMode::Last,
                    date: None,
                    merchant: None,
                },
                None,
            )
            .unwrap();
        assert_eq!(proposal.candidates.len(), 1);
        assert_eq!(proposal.candidates[0].row.name, "Target");
    }

    #[test]
    fn test_propose_delete_by_merchant_respects_actor() {
        let mut dispatcher = dispatcher();
        // Y paid nothing on this one, so Y cannot delete it.
        log(
            &mut dispatcher,
            LogExpenseArgs {
                v_paid: 50.0,
                y_paid: 0.0,
                ..costco_args()
            },
        );

        let args = DeleteExpenseArgs {
            delete_mode: DeleteMode::ByMerchant,
            date: None,
            merchant: Some("costco".to_string()),
        };

        let proposal = dispatcher.propose_delete(&args, Some(Party::V)).unwrap();
        assert_eq!(proposal.candidates.len(), 1);

        let err = dispatcher.propose_delete(&args, Some(Party::Y)).unwrap_err();
        assert!(matches!(err, TallyError::NotFound(_)));
    }

    #[test]
    fn test_propose_delete_by_date_requires_date() {
        let mut dispatcher = dispatcher();
        log(&mut dispatcher, costco_args());
        let err = dispatcher
            .propose_delete(
                &DeleteExpenseArgs {
                    delete_mode: DeleteMode::ByDate,
                    date: None,
                    merchant: None,
                },
                None,
            )
            .unwrap_err();
        assert!(matches!(err, TallyError::Validation(_)));
    }

    #[test]
    fn test_proposal_codes_are_distinct() {
        let mut dispatcher = dispatcher();
        for _ in 0..3 {
            log(&mut dispatcher, costco_args());
        }
        let proposal = dispatcher
            .propose_delete(
                &DeleteExpenseArgs {
                    delete_mode: DeleteMode::ByMerchant,
                    date: None,
                    merchant: Some("Costco".to_string()),
                },
                None,
            )
            .unwrap();
        assert_eq!(proposal.candidates.len(), 3);
        let codes: HashSet<&str> = proposal
            .candidates
            .iter()
            .map(|c| c.code.as_str())
            .collect();
        assert_eq!(codes.len(), 3);
    }

    #[test]
    fn test_confirm_delete_flow() {
        let mut dispatcher = dispatcher();
        log(&mut dispatcher, costco_args());
        log(
            &mut dispatcher,
            LogExpenseArgs {
                name: "Costco Gas".to_string(),
                ..costco_args()
            },
        );

        let proposal = dispatcher
            .propose_delete(
                &DeleteExpenseArgs {
                    delete_mode: DeleteMode::ByMerchant,
                    date: None,
                    merchant: Some("Costco".to_string()),
                },
                None,
            )
            .unwrap();
        assert_eq!(proposal.candidates.len(), 2);
        dispatcher
            .register_pending_delete("wamid.confirm", &proposal)
            .unwrap();

        // A wrong code rejects and leaves both rows intact.
        let err = dispatcher.confirm("wamid.confirm", "zzz").unwrap_err();
        assert!(matches!(err, TallyError::CodeMismatch(_)));
        assert_eq!(dispatcher.store().list_expenses().unwrap().len(), 2);

        // The right code deletes exactly the targeted row and clears the
        // pending record.
        let target = &proposal.candidates[0];
        let confirmed = dispatcher
            .confirm("wamid.confirm", &target.code)
            .unwrap();
        let Confirmed::Deleted(deleted) = confirmed else {
            panic!("expected delete");
        };
        assert_eq!(deleted.row_index, target.row.row_index);
        assert_eq!(dispatcher.store().list_expenses().unwrap().len(), 1);

        let err = dispatcher.confirm("wamid.confirm", &target.code).unwrap_err();
        assert!(matches!(err, TallyError::Expired(_)));
    }

    #[test]
    fn test_stage_and_confirm_edit() {
        let mut dispatcher = dispatcher();
        let ctx = RequestContext {
            actor: Some(Party::V),
            message_id: Some("wamid.log".to_string()),
        };
        dispatcher.execute(Some(Intent::LogExpense(costco_args())), &ctx);

        let staging = dispatcher
            .stage_edit_for_reply(
                "wamid.log",
                &EditExpenseArgs {
                    new_amount: Some(80.0),
                    ..EditExpenseArgs::default()
                },
            )
            .unwrap();
        dispatcher
            .register_pending_edit("wamid.confirm", &staging)
            .unwrap();

        let confirmed = dispatcher.confirm("wamid.confirm", &staging.code).unwrap();
        let Confirmed::Edited(row) = confirmed else {
            panic!("expected edit");
        };
        assert_eq!(row.amount(), 80.0);
        assert_eq!(row.v_owes, 40.0);
        assert_eq!(row.y_owes, 40.0);
    }

    #[test]
    fn test_edit_requires_reply_context() {
        let mut dispatcher = dispatcher();
        let outcome = dispatcher.execute(
            Some(Intent::EditExpense(EditExpenseArgs::default())),
            &RequestContext::default(),
        );
        assert!(!outcome.success);
    }

    #[test]
    fn test_edit_updates_amount_preserves_paid_ratio() {
        let row = sample_row(30.0, 0.0, 15.0, 15.0);
        let updates = compute_edit_updates(
            &row,
            &EditExpenseArgs {
                new_amount: Some(60.0),
                ..EditExpenseArgs::default()
            },
        )
        .unwrap();
        assert_eq!(updates.v_paid, Some(60.0));
        assert_eq!(updates.y_paid, Some(0.0));
        assert_eq!(updates.v_owes, Some(30.0));
        assert_eq!(updates.y_owes, Some(30.0));
    }

    #[test]
    fn test_edit_percentage_split() {
        let row = sample_row(25.0, 25.0, 25.0, 25.0);
        let updates = compute_edit_updates(
            &row,
            &EditExpenseArgs {
                new_v_paid: Some(60.0),
                new_y_paid: Some(40.0),
                ..EditExpenseArgs::default()
            },
        )
        .unwrap();
        assert_eq!(updates.v_paid, Some(30.0));
        assert_eq!(updates.y_paid, Some(20.0));
        // The percentage split also moves the owed share to 60/40.
        assert_eq!(updates.v_owes, Some(30.0));
        assert_eq!(updates.y_owes, Some(20.0));
    }

    #[test]
    fn test_edit_absolute_split() {
        let row = sample_row(25.0, 25.0, 25.0, 25.0);
        let updates = compute_edit_updates(
            &row,
            &EditExpenseArgs {
                new_v_paid: Some(40.0),
                new_y_paid: Some(10.0),
                ..EditExpenseArgs::default()
            },
        )
        .unwrap();
        assert_eq!(updates.v_paid, Some(40.0));
        assert_eq!(updates.y_paid, Some(10.0));
        // Owed split keeps the original 50/50 share of the new amount.
        assert_eq!(updates.v_owes, Some(25.0));
        assert_eq!(updates.y_owes, Some(25.0));
    }

    #[test]
    fn test_edit_put_it_all_on_y() {
        let row = sample_row(25.0, 25.0, 25.0, 25.0);
        let updates = compute_edit_updates(
            &row,
            &EditExpenseArgs {
                new_v_paid: Some(0.0),
                ..EditExpenseArgs::default()
            },
        )
        .unwrap();
        assert_eq!(updates.v_paid, Some(0.0));
        assert_eq!(updates.y_paid, Some(50.0));
    }

    #[test]
    fn test_edit_merchant_only() {
        let row = sample_row(25.0, 25.0, 25.0, 25.0);
        let updates = compute_edit_updates(
            &row,
            &EditExpenseArgs {
                new_merchant: Some("Target".to_string()),
                ..EditExpenseArgs::default()
            },
        )
        .unwrap();
        assert_eq!(updates.name, Some("Target".to_string()));
        assert!(updates.v_owes.is_none());
    }

    #[test]
    fn test_edit_with_no_changes_is_validation_error() {
        let row = sample_row(25.0, 25.0, 25.0, 25.0);
        let err = compute_edit_updates(&row, &EditExpenseArgs::default()).unwrap_err();
        assert!(matches!(err, TallyError::Validation(_)));
    }

    #[test]
    fn test_edit_oversized_single_split_rejected() {
        let row = sample_row(25.0, 25.0, 25.0, 25.0);
        let err = compute_edit_updates(
            &row,
            &EditExpenseArgs {
                new_v_paid: Some(80.0),
                ..EditExpenseArgs::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, TallyError::Validation(_)));
    }

    #[test]
    fn test_delete_by_message_id() {
        let mut dispatcher = dispatcher();
        let ctx = RequestContext {
            actor: None,
            message_id: Some("wamid.9".to_string()),
        };
        dispatcher.execute(Some(Intent::LogExpense(costco_args())), &ctx);

        let deleted = dispatcher.delete_by_message_id("wamid.9").unwrap();
        assert_eq!(deleted.name, "Costco");
        assert!(dispatcher.store().list_expenses().unwrap().is_empty());

        let err = dispatcher.delete_by_message_id("wamid.9").unwrap_err();
        assert!(matches!(err, TallyError::NotFound(_)));
    }
}
