//! Responses-style payload adapter
//!
//! Normalizes item-list exports: payloads tagged `"object": "response"` or
//! carrying top-level `input`/`output` arrays of typed items (`message`,
//! `reasoning`, `function_call`, `function_call_output`).
//!
//! Item lists are flatter than the canonical model: one assistant turn
//! arrives as a run of separate items (its reasoning, its prose, its tool
//! calls). Consecutive items that normalize to the same role are merged
//! into a single canonical message so the turn stays one message.
//!
//! Tool names for `function_call_output` items are resolved from the
//! `function_call` with the same `call_id`; an output whose call id was
//! never declared is a format error.

use crate::error::{Error, Result};
use crate::ingest::adapter::{FormatAdapter, IdGen};
use crate::ingest::adapters::media_type_from_data_url;
use crate::types::{Conversation, Message, Part, Role};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Adapter for Responses-style conversation exports.
pub struct ResponsesAdapter;

impl ResponsesAdapter {
    pub fn new() -> Self {
        Self
    }

    fn error(&self, reason: String) -> Error {
        Error::Format {
            adapter: self.name().to_string(),
            reason,
        }
    }
}

impl Default for ResponsesAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================
// Raw wire types (serde deserialization)
// ============================================

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawPayload {
    input: Option<RawInput>,
    output: Option<Vec<RawItem>>,
}

/// Request `input` is either one prompt string or an item list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawInput {
    Text(String),
    Items(Vec<RawItem>),
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawItem {
    #[serde(rename = "type")]
    item_type: Option<String>,
    role: Option<String>,
    content: Option<Vec<RawContentBlock>>,
    name: Option<String>,
    arguments: Option<String>,
    call_id: Option<String>,
    output: Option<Value>,
    summary: Option<Vec<RawSummaryBlock>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum RawContentBlock {
    #[serde(rename = "input_text")]
    InputText { text: String },
    #[serde(rename = "output_text")]
    OutputText { text: String },
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "input_image")]
    InputImage { image_url: String },
    #[serde(rename = "input_file")]
    InputFile {
        file_data: Option<String>,
        file_url: Option<String>,
        filename: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawSummaryBlock {
    text: Option<String>,
}

fn map_message_role(role: &str) -> Option<Role> {
    match role {
        "system" | "developer" => Some(Role::System),
        "user" => Some(Role::User),
        "assistant" => Some(Role::Assistant),
        _ => None,
    }
}

impl FormatAdapter for ResponsesAdapter {
    fn name(&self) -> &'static str {
        "responses"
    }

    fn can_handle(&self, raw: &Value) -> bool {
        let Some(obj) = raw.as_object() else {
            return false;
        };
        if obj.get("object").and_then(Value::as_str) == Some("response") {
            return true;
        }
        obj.get("output").map(Value::is_array).unwrap_or(false)
            || obj.get("input").map(Value::is_array).unwrap_or(false)
    }

    fn transform(&self, raw: &Value) -> Result<Conversation> {
        let payload = RawPayload::deserialize(raw)
            .map_err(|e| self.error(format!("payload does not deserialize: {e}")))?;

        // Request history (`input`) precedes fresh model output (`output`).
        let mut items: Vec<RawItem> = Vec::new();
        match payload.input {
            Some(RawInput::Text(prompt)) => {
                if !prompt.is_empty() {
                    items.push(RawItem {
                        item_type: Some("message".to_string()),
                        role: Some("user".to_string()),
                        content: Some(vec![RawContentBlock::Text { text: prompt }]),
                        ..Default::default()
                    });
                }
            }
            Some(RawInput::Items(input_items)) => items.extend(input_items),
            None => {}
        }
        if let Some(output_items) = payload.output {
            items.extend(output_items);
        }
        if items.is_empty() {
            return Err(self.error("expected a non-empty `input` or `output` item list".to_string()));
        }

        let mut ids = IdGen::new();
        let mut call_names: HashMap<String, String> = HashMap::new();
        let mut messages: Vec<Message> = Vec::new();
        let mut current: Option<(Role, Vec<Part>)> = None;

        for (index, item) in items.into_iter().enumerate() {
            // Bare `{role, content}` input items are messages without a tag
            let item_type = match (item.item_type.as_deref(), item.role.as_deref()) {
                (Some(t), _) => t,
                (None, Some(_)) => "message",
                (None, None) => {
                    return Err(self.error(format!("item {index} is missing `type`")));
                }
            };

            let (role, new_parts) = match item_type {
                "message" => {
                    let role_name = item.role.as_deref().unwrap_or_default();
                    let role = map_message_role(role_name).ok_or_else(|| {
                        self.error(format!(
                            "message item {index} has unsupported role `{role_name}`"
                        ))
                    })?;
                    let blocks = item.content.unwrap_or_default();
                    let mut parts = Vec::new();
                    for (bi, block) in blocks.into_iter().enumerate() {
                        match block {
                            RawContentBlock::InputText { text }
                            | RawContentBlock::OutputText { text }
                            | RawContentBlock::Text { text } => {
                                if !text.is_empty() {
                                    parts.push(Part::text(ids.next_part(), text));
                                }
                            }
                            RawContentBlock::InputImage { image_url } => {
                                let media_type = media_type_from_data_url(&image_url);
                                parts.push(Part::image(ids.next_part(), image_url, media_type));
                            }
                            RawContentBlock::InputFile {
                                file_data,
                                file_url,
                                filename,
                            } => {
                                let data = file_data.or(file_url).ok_or_else(|| {
                                    self.error(format!(
                                        "file block {bi} in item {index} has neither `file_data` nor `file_url`"
                                    ))
                                })?;
                                let media_type = media_type_from_data_url(&data)
                                    .unwrap_or_else(|| "application/octet-stream".to_string());
                                parts.push(Part::file(ids.next_part(), data, media_type, filename));
                            }
                            RawContentBlock::Unknown => {
                                return Err(self.error(format!(
                                    "content block {bi} in item {index} has an unsupported type"
                                )));
                            }
                        }
                    }
                    (role, parts)
                }

                "reasoning" => {
                    let mut parts = Vec::new();
                    for block in item.summary.unwrap_or_default() {
                        if let Some(text) = block.text {
                            if !text.is_empty() {
                                parts.push(Part::reasoning(ids.next_part(), text));
                            }
                        }
                    }
                    (Role::Assistant, parts)
                }

                "function_call" => {
                    let call_id = item.call_id.ok_or_else(|| {
                        self.error(format!("function_call item {index} is missing `call_id`"))
                    })?;
                    let tool_name = item.name.ok_or_else(|| {
                        self.error(format!("function_call item {index} is missing `name`"))
                    })?;
                    let input = match item.arguments {
                        Some(args) => serde_json::from_str(&args).unwrap_or(Value::String(args)),
                        None => Value::Null,
                    };
                    call_names.insert(call_id.clone(), tool_name.clone());
                    let part = Part::tool_call(ids.next_part(), call_id, tool_name, input);
                    (Role::Assistant, vec![part])
                }

                "function_call_output" => {
                    let call_id = item.call_id.ok_or_else(|| {
                        self.error(format!(
                            "function_call_output item {index} is missing `call_id`"
                        ))
                    })?;
                    let tool_name = call_names.get(&call_id).cloned().ok_or_else(|| {
                        self.error(format!(
                            "function_call_output item {index} references undeclared call id `{call_id}`"
                        ))
                    })?;
                    let output = item.output.unwrap_or(Value::String(String::new()));
                    let part =
                        Part::tool_result(ids.next_part(), call_id, tool_name, output, None);
                    (Role::Tool, vec![part])
                }

                other => {
                    return Err(self.error(format!(
                        "item {index} has unsupported type `{other}`"
                    )));
                }
            };

            // Items that contribute nothing (empty reasoning summary,
            // all-empty text blocks) neither open nor close a message run.
            if new_parts.is_empty() {
                continue;
            }

            match current.as_mut() {
                Some((current_role, parts)) if *current_role == role => {
                    parts.extend(new_parts);
                }
                _ => {
                    if let Some((r, p)) = current.take() {
                        messages.push(Message::new(ids.next_message(), r, p));
                    }
                    current = Some((role, new_parts));
                }
            }
        }

        if let Some((r, p)) = current.take() {
            messages.push(Message::new(ids.next_message(), r, p));
        }

        Ok(Conversation::new(messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PartKind;
    use serde_json::json;

    fn full_payload() -> Value {
        json!({
            "object": "response",
            "input": [
                { "role": "user", "content": [ { "type": "input_text", "text": "Tally the frontend spend." } ] }
            ],
            "output": [
                {
                    "type": "reasoning",
                    "summary": [ { "type": "summary_text", "text": "Need the ledger first." } ]
                },
                {
                    "type": "message",
                    "role": "assistant",
                    "content": [ { "type": "output_text", "text": "Fetching the ledger." } ]
                },
                {
                    "type": "function_call",
                    "name": "ledger_read",
                    "call_id": "call-7",
                    "arguments": "{\"section\":\"frontend\"}"
                },
                {
                    "type": "function_call_output",
                    "call_id": "call-7",
                    "output": "frontend: 4123 tokens"
                }
            ]
        })
    }

    #[test]
    fn test_can_handle_object_tag_and_item_arrays() {
        let adapter = ResponsesAdapter::new();
        assert!(adapter.can_handle(&full_payload()));
        assert!(adapter.can_handle(&json!({ "output": [] })));
        assert!(adapter.can_handle(&json!({ "input": [] })));
    }

    #[test]
    fn test_rejects_foreign_payloads() {
        let adapter = ResponsesAdapter::new();
        assert!(!adapter.can_handle(&json!({ "messages": [] })));
        assert!(!adapter.can_handle(&json!({ "input": "a bare prompt" })));
        assert!(!adapter.can_handle(&json!(42)));
    }

    #[test]
    fn test_same_role_runs_merge_into_one_message() {
        let adapter = ResponsesAdapter::new();
        let conv = adapter.transform(&full_payload()).unwrap();
        assert!(conv.validate().is_ok());
        assert_eq!(conv.messages.len(), 3);

        assert_eq!(conv.messages[0].role, Role::User);

        // reasoning + message + function_call collapse into one turn
        let kinds: Vec<PartKind> = conv.messages[1].parts.iter().map(|p| p.kind()).collect();
        assert_eq!(
            kinds,
            vec![PartKind::Reasoning, PartKind::Text, PartKind::ToolCall]
        );

        match &conv.messages[2].parts[0] {
            Part::ToolResult {
                tool_name, output, ..
            } => {
                assert_eq!(tool_name, "ledger_read");
                assert_eq!(output, &json!("frontend: 4123 tokens"));
            }
            other => panic!("expected tool-result, got {:?}", other),
        }
    }

    #[test]
    fn test_transform_is_deterministic() {
        let adapter = ResponsesAdapter::new();
        let payload = full_payload();
        assert_eq!(
            adapter.transform(&payload).unwrap(),
            adapter.transform(&payload).unwrap()
        );
    }

    #[test]
    fn test_string_input_becomes_user_turn() {
        let adapter = ResponsesAdapter::new();
        let payload = json!({
            "object": "response",
            "input": "Summarize the session.",
            "output": [
                {
                    "type": "message",
                    "role": "assistant",
                    "content": [ { "type": "output_text", "text": "It was short." } ]
                }
            ]
        });
        let conv = adapter.transform(&payload).unwrap();
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[0].role, Role::User);
        assert_eq!(conv.messages[1].role, Role::Assistant);
    }

    #[test]
    fn test_empty_reasoning_summary_contributes_nothing() {
        let adapter = ResponsesAdapter::new();
        let payload = json!({
            "output": [
                { "type": "reasoning", "summary": [] },
                {
                    "type": "message",
                    "role": "assistant",
                    "content": [ { "type": "output_text", "text": "Done." } ]
                }
            ]
        });
        let conv = adapter.transform(&payload).unwrap();
        assert_eq!(conv.messages.len(), 1);
        assert_eq!(conv.messages[0].parts.len(), 1);
    }

    #[test]
    fn test_input_image_and_file_blocks() {
        let adapter = ResponsesAdapter::new();
        let payload = json!({
            "input": [
                {
                    "role": "user",
                    "content": [
                        { "type": "input_text", "text": "Read these." },
                        { "type": "input_image", "image_url": "data:image/jpeg;base64,CCCC" },
                        { "type": "input_file", "file_url": "https://example.test/spec.pdf", "filename": "spec.pdf" }
                    ]
                }
            ]
        });
        let conv = adapter.transform(&payload).unwrap();
        let parts = &conv.messages[0].parts;
        match &parts[1] {
            Part::Image { media_type, .. } => {
                assert_eq!(media_type.as_deref(), Some("image/jpeg"))
            }
            other => panic!("expected image, got {:?}", other),
        }
        match &parts[2] {
            Part::File {
                media_type,
                filename,
                ..
            } => {
                assert_eq!(media_type, "application/octet-stream");
                assert_eq!(filename.as_deref(), Some("spec.pdf"));
            }
            other => panic!("expected file, got {:?}", other),
        }
    }

    #[test]
    fn test_undeclared_call_id_is_a_format_error() {
        let adapter = ResponsesAdapter::new();
        let payload = json!({
            "output": [
                { "type": "function_call_output", "call_id": "call-404", "output": "?" }
            ]
        });
        let err = adapter.transform(&payload).unwrap_err();
        match err {
            Error::Format { adapter, reason } => {
                assert_eq!(adapter, "responses");
                assert!(reason.contains("call-404"));
            }
            other => panic!("expected format error, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_item_type_is_a_format_error() {
        let adapter = ResponsesAdapter::new();
        let payload = json!({
            "output": [ { "type": "web_search_call", "status": "completed" } ]
        });
        let err = adapter.transform(&payload).unwrap_err();
        match err {
            Error::Format { reason, .. } => assert!(reason.contains("web_search_call")),
            other => panic!("expected format error, got {:?}", other),
        }
    }
}
