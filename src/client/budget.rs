//! 输入预算：在提交前按字符预算裁剪会话历史。
//!
//! Conversation trimming to a character budget.

use crate::types::message::Message;
use std::borrow::Cow;

/// Trim `messages` to fit `max_length` characters (as measured by
/// [`Message::content_length`]).
///
/// - `max_length <= 0` disables trimming.
/// - A leading system message is always kept and charged against the budget.
/// - Remaining messages are taken newest first; any that do not fit, or are empty,
///   are skipped whole. Chronological order is restored in the output.
///
/// Returns the input borrowed when nothing needs to change.
pub fn truncate_messages(messages: &[Message], max_length: i64) -> Cow<'_, [Message]> {
    if messages.is_empty() || max_length <= 0 {
        return Cow::Borrowed(messages);
    }

    let mut remaining = usize::try_from(max_length).unwrap_or(usize::MAX);
    let total: usize = messages.iter().map(Message::content_length).sum();
    if total <= remaining {
        return Cow::Borrowed(messages);
    }

    let mut result: Vec<Message> = Vec::with_capacity(messages.len());
    let mut start = 0;

    if messages[0].is_system() {
        result.push(messages[0].clone());
        remaining = remaining.saturating_sub(messages[0].content_length());
        start = 1;
    }

    let mut used = 0usize;
    let mut collected: Vec<&Message> = Vec::new();
    for msg in messages[start..].iter().rev() {
        let len = msg.content_length();
        if len == 0 || used + len > remaining {
            continue;
        }
        collected.push(msg);
        used += len;
    }

    result.extend(collected.into_iter().rev().cloned());
    Cow::Owned(result)
}
