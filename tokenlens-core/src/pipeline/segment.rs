//! Segmentation pass: split parts that dominate the conversation's tokens.
//!
//! A part holding a tenth of the whole conversation is hard to inspect as
//! one blob. This pass asks the collaborator where the semantic breaks in
//! such a part are, expressed as short regex fragments, and splits the
//! part's text at those markers. The original part is replaced by one new
//! part per fragment, ids suffixed `.1`, `.2`, ... so the parent id stays
//! recognizable, with `token_count` cleared for the follow-up accounting
//! run.
//!
//! The pass never fails. Every collaborator problem (request error, reply
//! without a JSON array, markers that do not compile as a pattern, a split
//! that yields fewer than two fragments) degrades to leaving that part
//! unsplit. Marker requests for distinct parts run concurrently; results
//! are merged by original part index, so completion order cannot reorder
//! the conversation.

use std::collections::HashMap;

use futures::future::join_all;
use regex::Regex;
use tracing::{debug, warn};

use crate::llm::{self, TextGenerator};
use crate::pipeline::prompts;
use crate::types::{Conversation, Part};

/// Split every part whose `token_count` exceeds `ratio` times the
/// conversation total. Conversations without token counts pass through
/// untouched.
pub async fn segment_oversized(
    mut conversation: Conversation,
    generator: &dyn TextGenerator,
    ratio: f64,
) -> Conversation {
    let total = conversation.total_token_count();
    if total == 0 {
        return conversation;
    }
    let threshold = ratio * total as f64;

    // (message index, part index, textual surrogate) per oversized part
    let targets: Vec<(usize, usize, String)> = conversation
        .messages
        .iter()
        .enumerate()
        .flat_map(|(mi, message)| {
            message
                .parts
                .iter()
                .enumerate()
                .filter_map(move |(pi, part)| {
                    let count = part.token_count()?;
                    if f64::from(count) <= threshold {
                        return None;
                    }
                    segmentable_text(part).map(|text| (mi, pi, text))
                })
        })
        .collect();

    if targets.is_empty() {
        return conversation;
    }
    debug!(
        candidates = targets.len(),
        total_tokens = total,
        "requesting split markers for oversized parts"
    );

    let marker_sets = join_all(
        targets
            .iter()
            .map(|(_, _, text)| request_markers(generator, text)),
    )
    .await;

    // message index -> [(part index, fragments)]
    let mut planned: HashMap<usize, Vec<(usize, Vec<String>)>> = HashMap::new();
    for ((mi, pi, text), markers) in targets.iter().zip(marker_sets) {
        let Some(markers) = markers else {
            continue;
        };
        let fragments = split_on_markers(text, &markers);
        if fragments.len() < 2 {
            continue;
        }
        planned.entry(*mi).or_default().push((*pi, fragments));
    }

    for (mi, mut splits) in planned {
        // Descending part index keeps the remaining indices valid while
        // splicing.
        splits.sort_by(|a, b| b.0.cmp(&a.0));
        for (pi, fragments) in splits {
            let replacement = rebuild_parts(&conversation.messages[mi].parts[pi], &fragments);
            let Some(parts) = replacement else {
                continue;
            };
            debug!(
                part_id = %conversation.messages[mi].parts[pi].id(),
                segments = parts.len(),
                "split oversized part"
            );
            conversation.messages[mi].parts.splice(pi..=pi, parts);
        }
    }

    conversation
}

/// The text an eligible part would be split over. Tool results use their
/// serialized output as the textual surrogate; tool calls, images, and
/// files are never split.
fn segmentable_text(part: &Part) -> Option<String> {
    match part {
        Part::Text { text, .. } | Part::Reasoning { text, .. } => Some(text.clone()),
        Part::ToolResult { output, .. } => Some(match output {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        }),
        _ => None,
    }
}

async fn request_markers(generator: &dyn TextGenerator, text: &str) -> Option<Vec<String>> {
    let prompt = prompts::split_markers(text);
    let response = match generator.generate(&prompt).await {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "split marker request failed; leaving part unsplit");
            return None;
        }
    };
    parse_markers(&response)
}

/// Pull a non-empty list of marker strings out of a collaborator reply.
fn parse_markers(response: &str) -> Option<Vec<String>> {
    let raw = llm::extract_json_array(response).ok()?;
    let values: Vec<serde_json::Value> = serde_json::from_str(&raw).ok()?;
    let markers: Vec<String> = values
        .into_iter()
        .filter_map(|value| value.as_str().map(str::to_string))
        .filter(|marker| !marker.trim().is_empty())
        .collect();
    if markers.is_empty() {
        None
    } else {
        Some(markers)
    }
}

/// Split `text` before each match of the combined marker pattern.
///
/// Rust's regex engine has no lookahead, so the markers are joined into
/// one alternation and the text is cut at match starts, which splits
/// before each marker exactly as a lookahead pattern would. Fragments are
/// trimmed and empties dropped.
fn split_on_markers(text: &str, markers: &[String]) -> Vec<String> {
    let pattern = markers
        .iter()
        .map(|marker| format!("(?:{})", marker))
        .collect::<Vec<_>>()
        .join("|");
    let regex = match Regex::new(&pattern) {
        Ok(regex) => regex,
        Err(err) => {
            warn!(error = %err, "markers do not form a valid pattern; leaving part unsplit");
            return Vec::new();
        }
    };

    let mut cuts = Vec::new();
    let mut start = 0usize;
    for found in regex.find_iter(text) {
        // Zero-width matches and a match at the current cut point cut nothing
        if found.start() == found.end() || found.start() <= start {
            continue;
        }
        cuts.push(text[start..found.start()].to_string());
        start = found.start();
    }
    cuts.push(text[start..].to_string());

    cuts.into_iter()
        .map(|fragment| fragment.trim().to_string())
        .filter(|fragment| !fragment.is_empty())
        .collect()
}

/// Replacement parts for one split: the parent's variant and metadata,
/// ids `<parentId>.<1-based index>`, counts cleared. `None` when the
/// parent variant cannot be split.
fn rebuild_parts(original: &Part, fragments: &[String]) -> Option<Vec<Part>> {
    fragments
        .iter()
        .enumerate()
        .map(|(i, fragment)| {
            let id = format!("{}.{}", original.id(), i + 1);
            match original {
                Part::Text { .. } => Some(Part::text(id, fragment.clone())),
                Part::Reasoning { .. } => Some(Part::reasoning(id, fragment.clone())),
                Part::ToolResult {
                    tool_call_id,
                    tool_name,
                    is_error,
                    ..
                } => Some(Part::tool_result(
                    id,
                    tool_call_id.clone(),
                    tool_name.clone(),
                    serde_json::Value::String(fragment.clone()),
                    *is_error,
                )),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::llm::TextStream;
    use crate::types::{Message, Role};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns one canned reply (or error) to every generate call and
    /// counts how often it was asked.
    struct ScriptedGenerator {
        reply: std::result::Result<String, String>,
        calls: AtomicUsize,
    }

    impl ScriptedGenerator {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, _prompt: &str) -> crate::error::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(reply) => Ok(reply.clone()),
                Err(message) => Err(Error::Collaborator(message.clone())),
            }
        }

        async fn generate_stream(&self, _prompt: &str) -> crate::error::Result<TextStream> {
            Ok(Box::pin(futures::stream::empty()))
        }
    }

    /// One user message: a large text part (90 tokens) and a small one
    /// (10 tokens). Threshold at ratio 0.10 is 10, so only the first
    /// part is eligible.
    fn skewed_conversation() -> Conversation {
        let mut large = Part::text("part-1", "intro ## second section ## third section");
        large.set_token_count(Some(90));
        let mut small = Part::text("part-2", "short remark");
        small.set_token_count(Some(10));
        Conversation::new(vec![Message::new(
            "msg-1",
            Role::User,
            vec![large, small],
        )])
    }

    #[tokio::test]
    async fn test_uncounted_conversation_passes_through() {
        let conv = Conversation::new(vec![Message::new(
            "msg-1",
            Role::User,
            vec![Part::text("part-1", "never counted")],
        )]);
        let generator = ScriptedGenerator::replying("[\"## \"]");
        let out = segment_oversized(conv.clone(), &generator, 0.10).await;
        assert_eq!(out, conv);
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_threshold_is_strict() {
        // 10 == 0.10 * 100 exactly; not "large"
        let mut a = Part::text("part-1", "one ## two");
        a.set_token_count(Some(10));
        let mut b = Part::text("part-2", "filler");
        b.set_token_count(Some(90));
        let conv = Conversation::new(vec![
            Message::new("msg-1", Role::User, vec![a]),
            Message::new("msg-2", Role::Assistant, vec![b]),
        ]);
        let generator = ScriptedGenerator::replying("[\"## \"]");
        let out = segment_oversized(conv, &generator, 0.90).await;
        // Threshold 90: neither part exceeds it strictly
        assert_eq!(out.messages[0].parts.len(), 1);
        assert_eq!(out.messages[1].parts.len(), 1);
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_split_replaces_part_with_indexed_segments() {
        let generator = ScriptedGenerator::replying("[\"## \"]");
        let out = segment_oversized(skewed_conversation(), &generator, 0.10).await;

        let parts = &out.messages[0].parts;
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0].id(), "part-1.1");
        assert_eq!(parts[1].id(), "part-1.2");
        assert_eq!(parts[2].id(), "part-1.3");
        assert_eq!(parts[3].id(), "part-2");

        match &parts[0] {
            Part::Text { text, token_count, .. } => {
                assert_eq!(text, "intro");
                assert_eq!(*token_count, None);
            }
            other => panic!("expected text part, got {:?}", other),
        }
        match &parts[1] {
            Part::Text { text, .. } => assert_eq!(text, "## second section"),
            other => panic!("expected text part, got {:?}", other),
        }
        match &parts[2] {
            Part::Text { text, .. } => assert_eq!(text, "## third section"),
            other => panic!("expected text part, got {:?}", other),
        }

        assert!(out.validate().is_ok());
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_marker_list_is_a_noop() {
        let generator = ScriptedGenerator::replying("[]");
        let conv = skewed_conversation();
        let out = segment_oversized(conv.clone(), &generator, 0.10).await;
        assert_eq!(out, conv);
    }

    #[tokio::test]
    async fn test_collaborator_failure_leaves_part_unsplit() {
        let generator = ScriptedGenerator::failing("connection refused");
        let conv = skewed_conversation();
        let out = segment_oversized(conv.clone(), &generator, 0.10).await;
        assert_eq!(out, conv);
    }

    #[tokio::test]
    async fn test_reply_without_array_leaves_part_unsplit() {
        let generator = ScriptedGenerator::replying("I could not find any sections.");
        let conv = skewed_conversation();
        let out = segment_oversized(conv.clone(), &generator, 0.10).await;
        assert_eq!(out, conv);
    }

    #[tokio::test]
    async fn test_invalid_marker_pattern_leaves_part_unsplit() {
        let generator = ScriptedGenerator::replying(r#"["(unclosed"]"#);
        let conv = skewed_conversation();
        let out = segment_oversized(conv.clone(), &generator, 0.10).await;
        assert_eq!(out, conv);
    }

    #[tokio::test]
    async fn test_marker_matching_only_at_start_is_a_noop() {
        let mut only = Part::text("part-1", "## sole section body");
        only.set_token_count(Some(50));
        let mut pad = Part::text("part-2", "x");
        pad.set_token_count(Some(1));
        let conv = Conversation::new(vec![Message::new("msg-1", Role::User, vec![only, pad])]);
        let generator = ScriptedGenerator::replying("[\"## \"]");
        let out = segment_oversized(conv.clone(), &generator, 0.10).await;
        assert_eq!(out, conv);
    }

    #[tokio::test]
    async fn test_multiple_large_parts_splice_in_order() {
        let mut first = Part::text("part-1", "alpha ## beta");
        first.set_token_count(Some(40));
        let mut middle = Part::text("part-2", "tiny");
        middle.set_token_count(Some(2));
        let mut last = Part::reasoning("part-3", "gamma ## delta");
        last.set_token_count(Some(40));
        let conv = Conversation::new(vec![Message::new(
            "msg-1",
            Role::Assistant,
            vec![first, middle, last],
        )]);

        let generator = ScriptedGenerator::replying("[\"## \"]");
        let out = segment_oversized(conv, &generator, 0.10).await;

        let ids: Vec<&str> = out.messages[0].parts.iter().map(|p| p.id()).collect();
        assert_eq!(
            ids,
            vec!["part-1.1", "part-1.2", "part-2", "part-3.1", "part-3.2"]
        );
        assert!(matches!(out.messages[0].parts[3], Part::Reasoning { .. }));
        assert!(out.validate().is_ok());
        assert_eq!(generator.call_count(), 2);
    }

    #[tokio::test]
    async fn test_tool_result_splits_into_string_outputs() {
        let mut result = Part::tool_result(
            "part-1",
            "call-1",
            "read_file",
            json!("fn main() {} ## fn helper() {}"),
            Some(false),
        );
        result.set_token_count(Some(50));
        let mut pad = Part::tool_result("part-2", "call-2", "ls", json!("ok"), None);
        pad.set_token_count(Some(1));
        let conv = Conversation::new(vec![Message::new("msg-1", Role::Tool, vec![result, pad])]);

        let generator = ScriptedGenerator::replying("[\"## \"]");
        let out = segment_oversized(conv, &generator, 0.10).await;

        let parts = &out.messages[0].parts;
        assert_eq!(parts.len(), 3);
        match &parts[0] {
            Part::ToolResult {
                tool_call_id,
                tool_name,
                output,
                is_error,
                token_count,
                ..
            } => {
                assert_eq!(tool_call_id, "call-1");
                assert_eq!(tool_name, "read_file");
                assert_eq!(output, &json!("fn main() {}"));
                assert_eq!(*is_error, Some(false));
                assert_eq!(*token_count, None);
            }
            other => panic!("expected tool-result part, got {:?}", other),
        }
        assert_eq!(parts[1].id(), "part-1.2");
    }

    #[test]
    fn test_split_preserves_content_order() {
        let text = "one ## two ## three";
        let fragments = split_on_markers(text, &["## ".to_string()]);
        assert_eq!(fragments, vec!["one", "## two", "## three"]);
    }

    #[test]
    fn test_markers_combine_into_one_alternation() {
        let text = "alpha STEP beta PHASE gamma";
        let fragments = split_on_markers(text, &["STEP".to_string(), "PHASE".to_string()]);
        assert_eq!(fragments, vec!["alpha", "STEP beta", "PHASE gamma"]);
    }

    #[test]
    fn test_zero_width_markers_cut_nothing() {
        let fragments = split_on_markers("plain text", &["z*".to_string()]);
        assert_eq!(fragments, vec!["plain text"]);
    }
}
