//! Request shaping: fit the conversation into the model's context window.
//!
//! Token counts are estimated (about four characters per token plus a small
//! per-message overhead). Trimming only affects the outgoing request; the
//! transcript itself is never shortened.

use crate::llm::ChatMessage;

const CHARS_PER_TOKEN: usize = 4;
const MESSAGE_OVERHEAD_TOKENS: usize = 4;

pub fn estimate_tokens(message: &ChatMessage) -> usize {
    message.content.chars().count().div_ceil(CHARS_PER_TOKEN) + MESSAGE_OVERHEAD_TOKENS
}

pub fn estimate_total(messages: &[ChatMessage]) -> usize {
    messages.iter().map(estimate_tokens).sum()
}

/// Build the request: optional system message, then as many of the newest
/// `history` messages as fit in `context_window - max_tokens`.
///
/// The newest message is always kept, even when it alone exceeds the budget;
/// the provider is left to reject it. `context_window == 0` disables trimming.
pub fn fit_to_context(
    system: Option<&str>,
    history: Vec<ChatMessage>,
    context_window: usize,
    max_tokens: usize,
) -> Vec<ChatMessage> {
    let system = system.map(|s| ChatMessage::new("system", s));

    let kept = if context_window == 0 {
        history
    } else {
        let mut budget = context_window
            .saturating_sub(max_tokens)
            .saturating_sub(system.as_ref().map(estimate_tokens).unwrap_or(0));

        let mut start = history.len();
        for (idx, msg) in history.iter().enumerate().rev() {
            let cost = estimate_tokens(msg);
            if cost > budget && start < history.len() {
                break;
            }
            budget = budget.saturating_sub(cost);
            start = idx;
        }
        history.into_iter().skip(start).collect()
    };

    system.into_iter().chain(kept).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: &str, chars: usize) -> ChatMessage {
        ChatMessage::new(role, "x".repeat(chars))
    }

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate_tokens(&msg("user", 0)), 4);
        assert_eq!(estimate_tokens(&msg("user", 1)), 5);
        assert_eq!(estimate_tokens(&msg("user", 8)), 6);
        assert_eq!(estimate_tokens(&ChatMessage::new("user", "ыыыы")), 5);
    }

    #[test]
    fn everything_fits() {
        let history = vec![msg("user", 40), msg("assistant", 40)];
        let out = fit_to_context(Some("sys"), history.clone(), 1000, 100);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].role, "system");
        assert_eq!(&out[1..], &history[..]);
    }

    #[test]
    fn oldest_messages_are_dropped_first() {
        // Each message costs 40/4 + 4 = 14 tokens; budget = 100 - 60 = 40.
        let history: Vec<_> = (0..5)
            .map(|i| ChatMessage::new("user", format!("{i}").repeat(40)))
            .collect();
        let out = fit_to_context(None, history, 100, 60);
        assert_eq!(out.len(), 2);
        assert!(out[0].content.starts_with('3'));
        assert!(out[1].content.starts_with('4'));
    }

    #[test]
    fn newest_message_is_always_kept() {
        let out = fit_to_context(None, vec![msg("user", 10), msg("user", 4000)], 100, 50);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content.len(), 4000);
    }

    #[test]
    fn zero_window_disables_trimming() {
        let history: Vec<_> = (0..50).map(|_| msg("user", 1000)).collect();
        assert_eq!(fit_to_context(None, history, 0, 4096).len(), 50);
    }

    #[test]
    fn empty_history_yields_only_system() {
        let out = fit_to_context(Some("be brief"), Vec::new(), 1000, 10);
        assert_eq!(out, vec![ChatMessage::new("system", "be brief")]);
    }
}
