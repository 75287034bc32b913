//! Context trimming — keeps an agent's message history within the
//! model's context window before each call.
//!
//! Budget: `window - max(4000, 20% of window)`. Token counts are the
//! bytes/4 heuristic (a conservative overestimate); images count a flat
//! 1200 tokens. System messages are always retained. Non-system messages
//! are kept newest-first until the budget is spent, and a `tool` message
//! is never kept without the assistant message carrying its matching
//! tool call.

use std::collections::HashSet;
use tm_domain::message::{ContentPart, Message, MessageContent, Role};
use tm_domain::stream::Usage;

/// Flat token charge for an image content part.
const IMAGE_TOKENS: u32 = 1_200;

/// Tokens reserved for the model's reply: at least 4000, at least 20%
/// of the window.
pub fn reserve_tokens(context_window: u32) -> u32 {
    (context_window / 5).max(4_000)
}

/// Estimate token count for a message using the bytes/4 heuristic.
pub fn estimate_message_tokens(msg: &Message) -> u32 {
    let tokens = match &msg.content {
        MessageContent::Text(t) => (t.len() / 4) as u32,
        MessageContent::Parts(parts) => parts
            .iter()
            .map(|p| match p {
                ContentPart::Text { text } => (text.len() / 4) as u32,
                ContentPart::ToolUse { input, .. } => (input.to_string().len() / 4) as u32,
                ContentPart::ToolResult { content, .. } => (content.len() / 4) as u32,
                ContentPart::Image { .. } => IMAGE_TOKENS,
            })
            .sum(),
    };
    tokens.max(1)
}

fn estimate_history_tokens(messages: &[Message]) -> u32 {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Trim `messages` in place so the history fits the budget.
///
/// `last_usage` (prompt + completion tokens of the previous call) is the
/// preferred measure of the existing prefix: the API counted those
/// tokens, the heuristic only guesses. Messages added since are not in
/// that figure, so the estimate is taken as a floor under it.
pub fn trim_history(messages: &mut Vec<Message>, context_window: u32, last_usage: Option<&Usage>) {
    if messages.is_empty() {
        return;
    }

    let budget = context_window.saturating_sub(reserve_tokens(context_window));

    let estimated = estimate_history_tokens(messages);
    let current = match last_usage {
        Some(u) => estimated.max(u.prompt_tokens + u.completion_tokens),
        None => estimated,
    };

    if current <= budget {
        return;
    }

    let before_count = messages.len();

    // Split out system messages; they are always retained.
    let mut system_messages = Vec::new();
    let mut other_messages = Vec::new();
    for msg in messages.drain(..) {
        if msg.role == Role::System {
            system_messages.push(msg);
        } else {
            other_messages.push(msg);
        }
    }

    let system_tokens: u32 = system_messages.iter().map(estimate_message_tokens).sum();
    let available = budget.saturating_sub(system_tokens);

    // Keep from newest, accumulating tokens.
    let mut kept: Vec<Message> = Vec::new();
    let mut accumulated: u32 = 0;
    for msg in other_messages.into_iter().rev() {
        let msg_tokens = estimate_message_tokens(&msg);
        if accumulated + msg_tokens > available {
            break;
        }
        accumulated += msg_tokens;
        kept.push(msg);
    }
    kept.reverse();

    // Pairing pass: drop any tool message whose assistant tool-call
    // partner did not survive.
    let mut seen_call_ids: HashSet<String> = HashSet::new();
    let mut paired: Vec<Message> = Vec::with_capacity(kept.len());
    for msg in kept {
        for id in msg.tool_use_ids() {
            seen_call_ids.insert(id.to_string());
        }
        if let Some(result_id) = msg.tool_result_id() {
            if !seen_call_ids.contains(result_id) {
                continue;
            }
        }
        paired.push(msg);
    }

    let after_tokens: u32 = system_tokens + paired.iter().map(estimate_message_tokens).sum::<u32>();

    messages.extend(system_messages);
    messages.extend(paired);

    let after_count = messages.len();
    if after_count < before_count {
        tracing::info!(
            before_messages = before_count,
            after_messages = after_count,
            before_tokens = current,
            after_tokens,
            budget,
            "context trimmed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_domain::message::ToolCall;

    fn text_of(n: usize) -> String {
        "x".repeat(n)
    }

    #[test]
    fn reserve_is_at_least_4000() {
        assert_eq!(reserve_tokens(10_000), 4_000);
        assert_eq!(reserve_tokens(200_000), 40_000);
    }

    #[test]
    fn estimates_use_bytes_over_four() {
        let msg = Message::user(text_of(400));
        assert_eq!(estimate_message_tokens(&msg), 100);
        // Never below one.
        assert_eq!(estimate_message_tokens(&Message::user("")), 1);
    }

    #[test]
    fn image_parts_cost_a_flat_amount() {
        let msg = Message {
            role: Role::User,
            content: MessageContent::Parts(vec![ContentPart::Image {
                url: "data".into(),
                media_type: None,
            }]),
        };
        assert_eq!(estimate_message_tokens(&msg), IMAGE_TOKENS);
    }

    #[test]
    fn under_budget_history_is_untouched() {
        let mut messages = vec![
            Message::system("sys"),
            Message::user("hello"),
            Message::assistant("hi"),
        ];
        trim_history(&mut messages, 10_000, None);
        assert_eq!(messages.len(), 3);
    }

    #[test]
    fn oldest_non_system_messages_are_dropped_first() {
        // window 10_000 → budget 6_000 tokens. Each message ~500 tokens.
        let mut messages = vec![Message::system("sys")];
        for i in 0..20 {
            messages.push(Message::user(format!("{i}:{}", text_of(2_000))));
        }
        trim_history(&mut messages, 10_000, None);

        // System survives, newest messages survive, oldest are gone.
        assert_eq!(messages[0].role, Role::System);
        assert!(messages.len() < 21);
        let last = messages.last().unwrap().content.extract_all_text();
        assert!(last.starts_with("19:"));
        let first_kept = messages[1].content.extract_all_text();
        assert!(!first_kept.starts_with("0:"));
    }

    #[test]
    fn every_system_message_survives_trimming() {
        let mut messages = vec![Message::system("sys one")];
        for _ in 0..20 {
            messages.push(Message::user(text_of(2_000)));
        }
        messages.push(Message::system("sys two"));
        trim_history(&mut messages, 10_000, None);
        let system_count = messages.iter().filter(|m| m.role == Role::System).count();
        assert_eq!(system_count, 2);
    }

    #[test]
    fn orphaned_tool_results_are_dropped_with_their_assistant() {
        let call = ToolCall {
            id: "c1".into(),
            name: "bash".into(),
            arguments: "{}".into(),
        };
        // Big assistant-with-calls message followed by a small tool result:
        // the assistant message falls out of budget, the tool result fits.
        let mut messages = vec![
            Message::system("sys"),
            Message::assistant_with_calls(&text_of(40_000), &[call]),
            Message::tool_result("c1", "ok"),
            Message::user(text_of(2_000)),
        ];
        trim_history(&mut messages, 10_000, None);

        // No tool message without its matching assistant tool call.
        let mut seen = std::collections::HashSet::new();
        for msg in &messages {
            for id in msg.tool_use_ids() {
                seen.insert(id.to_string());
            }
            if let Some(rid) = msg.tool_result_id() {
                assert!(seen.contains(rid), "orphaned tool result survived trim");
            }
        }
    }

    #[test]
    fn paired_tool_messages_survive_together_when_they_fit() {
        let call = ToolCall {
            id: "c1".into(),
            name: "bash".into(),
            arguments: "{}".into(),
        };
        let mut messages = vec![
            Message::system("sys"),
            Message::user(text_of(2_000)),
            Message::assistant_with_calls("running", &[call]),
            Message::tool_result("c1", "done"),
        ];
        trim_history(&mut messages, 200_000, None);
        assert_eq!(messages.len(), 4);
    }

    #[test]
    fn reported_usage_overrides_a_low_estimate() {
        // Tiny messages, but the provider said the last call was huge.
        let mut messages = vec![Message::system("sys")];
        for i in 0..5 {
            messages.push(Message::user(format!("m{i}")));
        }
        let usage = Usage {
            prompt_tokens: 9_000,
            completion_tokens: 500,
            total_tokens: 9_500,
        };
        // budget = 6_000 < 9_500 → trimming runs even though estimates are tiny.
        let before = messages.len();
        trim_history(&mut messages, 10_000, Some(&usage));
        // Estimates being tiny, everything fits once re-measured; but the
        // trim pass must have executed without removing system messages.
        assert!(messages.iter().any(|m| m.role == Role::System));
        assert!(messages.len() <= before);
    }
}
