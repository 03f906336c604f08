//! Chat engine: the end-to-end flow from one inbound message to one
//! reply.
//!
//! Routing order mirrors what users actually type: reply-based delete,
//! reply-based edit, short-code confirmation, the static capability
//! list, and finally the preprocess → classify → execute → render
//! pipeline. Collaborator failures degrade to deterministic fallbacks;
//! nothing in here panics on a bad message.

use serde_json::json;
use tracing::{debug, warn};

use crate::assist::{
    fallback_reply, Exchange, IntentClassifier, MessagePreprocessor, Messenger, PartyDirectory,
    ResponseRenderer,
};
use crate::dispatch::{Confirmed, DeleteProposal, Dispatcher, EditStaging, RequestContext};
use crate::error::{Result, TallyError};
use crate::intent::Intent;
use crate::pending::looks_like_code;
use crate::storage::{LedgerStore, Party, PendingStore};

const UNAUTHORIZED_NOTICE: &str = "Sorry, this number is not authorized to use this bot.";

const EDIT_HELP: &str =
    "I couldn't understand what you want to edit. Try something like 'edit to $50' or 'change split to 60/40'";

const OUT_OF_DOMAIN_NOTICE: &str = "This is not related to expense tracking";

const CAPABILITIES: &str = "Here's what I can do:\n\n\
Log expense — \"$50 at Costco\"\n\
Query totals — \"How much on groceries?\"\n\
List expenses — \"Show last 5 expenses\"\n\
Check balance — \"Who owes whom?\"\n\
Settle up — \"We settled up\"\n\
Delete expense — \"Delete the Costco expense\"\n\
Edit expense — Reply to a logged expense with \"edit to $50\"";

const EDIT_KEYWORDS: [&str; 4] = ["edit", "change", "update", "modify"];

/// One inbound chat message, already stripped of transport framing.
#[derive(Debug, Clone, Default)]
pub struct InboundMessage {
    pub sender: String,
    pub text: String,
    /// Id of this message, recorded on logged expenses.
    pub message_id: Option<String>,
    /// Id of the message this one replies to, if any.
    pub reply_to: Option<String>,
}

fn is_edit_request(text: &str) -> bool {
    let lowered = text.to_lowercase();
    EDIT_KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

/// Message a core error for users without leaking storage internals.
fn user_text(err: &TallyError) -> String {
    match err {
        TallyError::Validation(msg)
        | TallyError::NotFound(msg)
        | TallyError::Expired(msg)
        | TallyError::CodeMismatch(msg)
        | TallyError::UnknownIntent(msg) => msg.clone(),
        TallyError::Storage(_) | TallyError::Upstream(_) => {
            "Something went wrong. Please try again.".to_string()
        }
    }
}

fn delete_confirmation_text(proposal: &DeleteProposal) -> String {
    let lines: Vec<String> = proposal
        .candidates
        .iter()
        .map(|candidate| {
            format!(
                "• ${:.2} at {} ({}) → reply '{}'",
                candidate.row.amount(),
                candidate.row.name,
                candidate.row.date.format("%Y-%m-%d"),
                candidate.code
            )
        })
        .collect();

    if lines.len() == 1 {
        format!("Delete this expense?\n{}", lines[0])
    } else {
        format!("Which expense to delete?\n{}", lines.join("\n"))
    }
}

fn split_line(v_paid: f64, y_paid: f64) -> Option<String> {
    let total = v_paid + y_paid;
    if total <= 0.0 {
        return None;
    }
    let v_pct = (v_paid / total * 100.0).round() as i64;
    Some(format!(
        "  Split: {}/{} (V: ${:.2}, Y: ${:.2})",
        v_pct,
        100 - v_pct,
        v_paid,
        y_paid
    ))
}

fn edit_confirmation_text(staging: &EditStaging) -> String {
    let original = &staging.original;
    let new_v = staging.updates.v_paid.unwrap_or(original.v_paid);
    let new_y = staging.updates.y_paid.unwrap_or(original.y_paid);
    let new_name = staging
        .updates
        .name
        .clone()
        .unwrap_or_else(|| original.name.clone());

    let mut lines = vec!["Edit this expense?\n".to_string()];
    lines.push(format!(
        "Original: ${:.2} at {}",
        original.amount(),
        original.name
    ));
    if let Some(line) = split_line(original.v_paid, original.y_paid) {
        lines.push(line);
    }
    lines.push("    ↓".to_string());
    lines.push(format!("New: ${:.2} at {}", new_v + new_y, new_name));
    if let Some(line) = split_line(new_v, new_y) {
        lines.push(line);
    }
    lines.push(format!("\nReply '{}' to confirm", staging.code));
    lines.join("\n")
}

/// Drives the full conversational flow over injected collaborators.
pub struct ChatEngine<S> {
    dispatcher: Dispatcher<S>,
    directory: PartyDirectory,
    preprocessor: Box<dyn MessagePreprocessor>,
    classifier: Box<dyn IntentClassifier>,
    renderer: Box<dyn ResponseRenderer>,
}

impl<S: LedgerStore + PendingStore> ChatEngine<S> {
    pub fn new(
        dispatcher: Dispatcher<S>,
        directory: PartyDirectory,
        preprocessor: Box<dyn MessagePreprocessor>,
        classifier: Box<dyn IntentClassifier>,
        renderer: Box<dyn ResponseRenderer>,
    ) -> Self {
        Self {
            dispatcher,
            directory,
            preprocessor,
            classifier,
            renderer,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<S> {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher<S> {
        &mut self.dispatcher
    }

    /// Process one inbound message, sending any replies through the
    /// given transport.
    pub fn handle(
        &mut self,
        message: &InboundMessage,
        transport: &mut dyn Messenger,
    ) -> Result<()> {
        let Some(actor) = self.directory.resolve(&message.sender) else {
            warn!(sender = %message.sender, "unauthorized sender");
            transport.send(&message.sender, UNAUTHORIZED_NOTICE)?;
            return Ok(());
        };

        let trimmed = message.text.trim();
        debug!(sender = %message.sender, actor = %actor, "handling message");

        if let Some(reply_to) = message.reply_to.clone() {
            if trimmed.eq_ignore_ascii_case("delete") {
                return self.reply_delete(message, &reply_to, transport);
            }
            let code = trimmed.to_lowercase();
            if looks_like_code(&code) {
                return self.confirm_code(message, &reply_to, &code, transport);
            }
            if is_edit_request(trimmed) {
                return self.reply_edit(message, actor, &reply_to, transport);
            }
        }

        let lowered = trimmed.to_lowercase();
        if lowered == "/list" || lowered == "list" {
            transport.send(&message.sender, CAPABILITIES)?;
            return Ok(());
        }

        self.pipeline(message, actor, transport)
    }

    fn reply_delete(
        &mut self,
        message: &InboundMessage,
        reply_to: &str,
        transport: &mut dyn Messenger,
    ) -> Result<()> {
        let text = match self.dispatcher.delete_by_message_id(reply_to) {
            Ok(row) => self.render_or_fallback(&[Exchange {
                query: "delete expense".to_string(),
                intent: "delete_expense".to_string(),
                success: true,
                result: json!({
                    "deleted": true,
                    "expense": row.name,
                    "amount": row.amount(),
                }),
            }]),
            Err(err) => user_text(&err),
        };
        transport.send(&message.sender, &text)?;
        Ok(())
    }

    fn reply_edit(
        &mut self,
        message: &InboundMessage,
        actor: Party,
        reply_to: &str,
        transport: &mut dyn Messenger,
    ) -> Result<()> {
        let prompt = format!("{} said: {}", actor, message.text.trim());
        let classified = self.classifier.classify(std::slice::from_ref(&prompt));
        let intent = classified.into_iter().next().and_then(|c| c.intent);

        let Some(Intent::EditExpense(args)) = intent else {
            transport.send(&message.sender, EDIT_HELP)?;
            return Ok(());
        };

        match self.dispatcher.stage_edit_for_reply(reply_to, &args) {
            Ok(staging) => {
                let confirmation = edit_confirmation_text(&staging);
                let sent_id = transport.send(&message.sender, &confirmation)?;
                match sent_id {
                    Some(id) => {
                        self.dispatcher.register_pending_edit(&id, &staging)?;
                        debug!(row_index = staging.row_index, "stored pending edit");
                    }
                    None => warn!("no message id from transport; edit cannot be confirmed"),
                }
            }
            Err(err) => {
                transport.send(&message.sender, &user_text(&err))?;
            }
        }
        Ok(())
    }

    fn confirm_code(
        &mut self,
        message: &InboundMessage,
        reply_to: &str,
        code: &str,
        transport: &mut dyn Messenger,
    ) -> Result<()> {
        let text = match self.dispatcher.confirm(reply_to, code) {
            Ok(Confirmed::Edited(row)) => self.render_or_fallback(&[Exchange {
                query: format!("edit expense {}", code),
                intent: "edit_expense".to_string(),
                success: true,
                result: json!({
                    "edited": true,
                    "expense": row.name,
                    "amount": row.amount(),
                }),
            }]),
            Ok(Confirmed::Deleted(row)) => self.render_or_fallback(&[Exchange {
                query: format!("delete expense {}", code),
                intent: "delete_expense".to_string(),
                success: true,
                result: json!({
                    "deleted": true,
                    "expense": row.name,
                    "amount": row.amount(),
                }),
            }]),
            Err(err @ (TallyError::CodeMismatch(_) | TallyError::Expired(_))) => user_text(&err),
            Err(err) => {
                warn!(error = %err, "confirmation failed");
                user_text(&err)
            }
        };
        transport.send(&message.sender, &text)?;
        Ok(())
    }

    fn pipeline(
        &mut self,
        message: &InboundMessage,
        actor: Party,
        transport: &mut dyn Messenger,
    ) -> Result<()> {
        let outcome = self.preprocessor.split(&message.text);
        if !outcome.is_valid {
            let text = if !outcome.is_in_domain {
                self.render_or_fallback(&[Exchange {
                    query: message.text.clone(),
                    intent: "clarify".to_string(),
                    success: true,
                    result: json!({ "message": OUT_OF_DOMAIN_NOTICE }),
                }])
            } else {
                outcome
                    .error_message
                    .unwrap_or_else(|| "Too many requests. Maximum 5 allowed.".to_string())
            };
            transport.send(&message.sender, &text)?;
            return Ok(());
        }

        let asks = if outcome.asks.is_empty() {
            vec![message.text.clone()]
        } else {
            outcome.asks
        };
        let prompts: Vec<String> = asks
            .iter()
            .map(|ask| format!("{} said: {}", actor, ask))
            .collect();
        debug!(count = asks.len(), "classifying asks");
        let classified = self.classifier.classify(&prompts);

        let mut exchanges = Vec::new();
        let mut delete_handled = false;

        for (index, item) in classified.into_iter().enumerate() {
            let query = asks.get(index).cloned().unwrap_or_default();

            match item.intent {
                Some(Intent::DeleteExpense(args)) => {
                    match self.dispatcher.propose_delete(&args, Some(actor)) {
                        Ok(proposal) => {
                            let confirmation = delete_confirmation_text(&proposal);
                            let sent_id = transport.send(&message.sender, &confirmation)?;
                            match sent_id {
                                Some(id) => {
                                    self.dispatcher.register_pending_delete(&id, &proposal)?;
                                    debug!(
                                        candidates = proposal.candidates.len(),
                                        "stored pending delete"
                                    );
                                }
                                None => warn!(
                                    "no message id from transport; delete cannot be confirmed"
                                ),
                            }
                            delete_handled = true;
                        }
                        Err(err) => exchanges.push(Exchange {
                            query,
                            intent: "delete_expense".to_string(),
                            success: false,
                            result: json!({ "error": user_text(&err) }),
                        }),
                    }
                }
                other => {
                    let ctx = RequestContext {
                        actor: Some(actor),
                        message_id: message.message_id.clone(),
                    };
                    let outcome = self.dispatcher.execute(other, &ctx);
                    exchanges.push(Exchange {
                        query,
                        intent: outcome.intent,
                        success: outcome.success,
                        result: outcome.result,
                    });
                }
            }
        }

        if delete_handled && exchanges.is_empty() {
            return Ok(());
        }

        let text = self.render_or_fallback(&exchanges);
        transport.send(&message.sender, &text)?;
        Ok(())
    }

    fn render_or_fallback(&self, exchanges: &[Exchange]) -> String {
        match self.renderer.render(exchanges) {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "renderer failed, using fallback");
                fallback_reply(exchanges)
            }
        }
    }
}
