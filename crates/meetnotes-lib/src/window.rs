//! Token-budgeted context window.
//!
//! The window is the system message followed by the longest trailing run of
//! turns whose serialized payload stays within the budget. Turns are
//! considered newest first; the first turn that would overflow the budget
//! ends the search, so the result is always a contiguous suffix of the
//! conversation and never skips a long turn in favor of an older short one.
//!
//! The payload measured is exactly what is sent to the generation service:
//! a JSON array of `{role, content}` objects.

use thiserror::Error;
use tracing::debug;

use crate::model::message::{Message, Role};
use crate::tokenizer::Tokenizer;

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("serializing candidate window: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// System message plus the kept suffix of the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextWindow {
    messages: Vec<Message>,
    /// Token count of the final serialized window.
    pub token_count: usize,
    /// Number of leading conversation turns left out.
    pub dropped: usize,
}

impl ContextWindow {
    /// All messages, system first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn system(&self) -> &Message {
        &self.messages[0]
    }

    /// The kept conversation turns, oldest first.
    pub fn turns(&self) -> &[Message] {
        &self.messages[1..]
    }

    /// True when the budget could not fit even one turn.
    pub fn is_system_only(&self) -> bool {
        self.messages.len() == 1
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

/// Serialize messages exactly as the generation request carries them.
pub fn serialize_payload(messages: &[&Message]) -> Result<String, WindowError> {
    Ok(serde_json::to_string(messages)?)
}

fn count_payload(messages: &[&Message], tokenizer: &dyn Tokenizer) -> Result<usize, WindowError> {
    Ok(tokenizer.count_tokens(&serialize_payload(messages)?))
}

/// Select the longest trailing suffix of `conversation` that fits `token_budget`
/// together with `system`.
///
/// The system message is always included, even when it alone exceeds the
/// budget.
pub fn build_context_window(
    conversation: &[Message],
    system: &Message,
    token_budget: usize,
    tokenizer: &dyn Tokenizer,
) -> Result<ContextWindow, WindowError> {
    debug_assert_eq!(system.role, Role::System);

    // Kept turns, newest first.
    let mut kept_rev: Vec<&Message> = Vec::new();
    let mut token_count = count_payload(&[system], tokenizer)?;

    for message in conversation.iter().rev() {
        let mut candidate: Vec<&Message> = Vec::with_capacity(kept_rev.len() + 2);
        candidate.push(system);
        candidate.push(message);
        candidate.extend(kept_rev.iter().rev());

        let count = count_payload(&candidate, tokenizer)?;
        if count > token_budget {
            debug!(
                count,
                token_budget,
                kept = kept_rev.len(),
                "token budget reached, dropping older turns"
            );
            break;
        }
        token_count = count;
        kept_rev.push(message);
    }

    if kept_rev.is_empty() && token_count > token_budget {
        debug!(
            token_count,
            token_budget, "system prompt alone exceeds token budget"
        );
    }

    let kept = kept_rev.len();
    let mut messages = Vec::with_capacity(kept + 1);
    messages.push(system.clone());
    messages.extend(conversation[conversation.len() - kept..].iter().cloned());

    Ok(ContextWindow {
        messages,
        token_count,
        dropped: conversation.len() - kept,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_conversation;
    use crate::tokenizer::CharEstimateTokenizer;

    /// One token per character keeps the arithmetic exact.
    fn chars() -> CharEstimateTokenizer {
        CharEstimateTokenizer::new(1)
    }

    fn system() -> Message {
        Message::system("Ask one question.")
    }

    fn sample() -> Vec<Message> {
        parse_conversation("[A]: hello\n[B]: hi there\n[A]: what's next?")
    }

    fn cost(messages: &[Message]) -> usize {
        let refs: Vec<&Message> = messages.iter().collect();
        serialize_payload(&refs).unwrap().chars().count()
    }

    fn window_with(conv: &[Message], tail: usize) -> Vec<Message> {
        let mut out = vec![system()];
        out.extend(conv[conv.len() - tail..].iter().cloned());
        out
    }

    #[test]
    fn large_budget_keeps_everything() {
        let conv = sample();
        let window = build_context_window(&conv, &system(), 100_000, &chars()).unwrap();
        assert_eq!(window.turns(), conv.as_slice());
        assert_eq!(window.dropped, 0);
        assert_eq!(window.token_count, cost(window.messages()));
    }

    #[test]
    fn budget_for_last_message_only() {
        let conv = sample();
        let budget = cost(&window_with(&conv, 1));
        let window = build_context_window(&conv, &system(), budget, &chars()).unwrap();
        assert_eq!(window.messages().len(), 2);
        assert_eq!(window.turns()[0].content, "A: what's next?");
        assert_eq!(window.dropped, 2);
    }

    #[test]
    fn exact_budget_is_inclusive() {
        let conv = sample();
        let budget = cost(&window_with(&conv, 2));
        let window = build_context_window(&conv, &system(), budget, &chars()).unwrap();
        assert_eq!(window.turns().len(), 2);
        assert_eq!(window.token_count, budget);

        let window = build_context_window(&conv, &system(), budget - 1, &chars()).unwrap();
        assert_eq!(window.turns().len(), 1);
    }

    #[test]
    fn zero_budget_returns_system_only() {
        let window = build_context_window(&sample(), &system(), 0, &chars()).unwrap();
        assert!(window.is_system_only());
        assert_eq!(window.system(), &system());
        assert_eq!(window.token_count, cost(&[system()]));
    }

    #[test]
    fn empty_conversation_returns_system_only() {
        let conv = parse_conversation("no markers at all");
        let window = build_context_window(&conv, &system(), 100_000, &chars()).unwrap();
        assert_eq!(window.messages(), &[system()]);
        assert_eq!(window.dropped, 0);
    }

    #[test]
    fn long_turn_blocks_older_short_turns() {
        let conv = vec![
            Message::user("A: a"),
            Message::user(format!("B: {}", "x".repeat(500))),
            Message::user("C: c"),
        ];
        let budget = cost(&window_with(&conv, 1)) + 20;
        let window = build_context_window(&conv, &system(), budget, &chars()).unwrap();
        // "A: a" would fit on its own, but the suffix stops at the long turn.
        assert_eq!(window.turns(), &conv[2..]);
    }

    #[test]
    fn into_messages_starts_with_system() {
        let window = build_context_window(&sample(), &system(), 100_000, &chars()).unwrap();
        let messages = window.into_messages();
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[1..].iter().all(|m| m.role == Role::User));
    }
}
