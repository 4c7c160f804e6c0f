//! Token accounting pass.
//!
//! Attaches a `token_count` to every part that carries countable text.
//! Image and file parts are skipped; their payloads are not text. Tool
//! parts count a synthetic string so that tool identity contributes to
//! cost accounting: the tool name, a space, and the compact-serialized
//! input (tool-call) or output (tool-result).
//!
//! The pass is pure: the same conversation and tokenizer always produce
//! the same counts. [`count_tokens_chunked`] wraps the same per-part work
//! in cooperative yielding for callers that must not block an event loop;
//! its result is identical to the batch function.

use std::borrow::Cow;

use crate::tokenizer::Tokenizer;
use crate::types::{Conversation, Part};

/// Attach token counts to every countable part.
///
/// Existing counts are overwritten, so the pass can be re-run after a
/// structural change such as segmentation.
pub fn count_tokens(mut conversation: Conversation, tokenizer: &dyn Tokenizer) -> Conversation {
    for message in &mut conversation.messages {
        for part in &mut message.parts {
            count_part(part, tokenizer);
        }
    }
    conversation
}

/// [`count_tokens`] with cooperative yielding.
///
/// Processes messages in order and yields to the scheduler after every
/// `chunk_size` messages. Message order and the resulting counts are
/// identical to the batch function; the yielding is purely an
/// execution-strategy concern.
pub async fn count_tokens_chunked(
    mut conversation: Conversation,
    tokenizer: &dyn Tokenizer,
    chunk_size: usize,
) -> Conversation {
    let chunk_size = chunk_size.max(1);
    let mut since_yield = 0usize;

    for message in &mut conversation.messages {
        for part in &mut message.parts {
            count_part(part, tokenizer);
        }
        since_yield += 1;
        if since_yield >= chunk_size {
            since_yield = 0;
            tokio::task::yield_now().await;
        }
    }
    conversation
}

fn count_part(part: &mut Part, tokenizer: &dyn Tokenizer) {
    let count = match countable_text(part) {
        Some(text) => tokenizer.count(&text),
        None => return,
    };
    part.set_token_count(Some(count));
}

/// The textual surrogate a part is counted over, or `None` for variants
/// that carry no countable text.
fn countable_text(part: &Part) -> Option<Cow<'_, str>> {
    match part {
        Part::Text { text, .. } | Part::Reasoning { text, .. } => {
            Some(Cow::Borrowed(text.as_str()))
        }
        Part::ToolCall {
            tool_name, input, ..
        } => Some(Cow::Owned(format!("{} {}", tool_name, input))),
        Part::ToolResult {
            tool_name, output, ..
        } => Some(Cow::Owned(format!("{} {}", tool_name, output))),
        Part::Image { .. } | Part::File { .. } => None,
    }
}
