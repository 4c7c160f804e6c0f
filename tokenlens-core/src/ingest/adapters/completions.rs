//! Completions-style payload adapter
//!
//! Normalizes chat-completion exports: a top-level `messages` array of
//! `{role, content}` objects, optionally wrapped in an API response object
//! tagged `"object": "chat.completion"`.
//!
//! Mapping summary:
//!
//! | Wire shape | Canonical part |
//! |------------|----------------|
//! | string `content` | one text part |
//! | `content` block `text` | text part |
//! | `content` block `image_url` | image part |
//! | `content` block `file` | file part |
//! | assistant `reasoning_content` | reasoning part |
//! | assistant `tool_calls[]` | tool-call parts |
//! | `tool` role message | tool-result part |
//!
//! Tool-result parts need a tool name the wire format does not always carry;
//! it is resolved from the `tool_calls` entry with the same call id seen
//! earlier in the payload. A tool message whose call id was never declared
//! is a format error.

use crate::error::{Error, Result};
use crate::ingest::adapter::{FormatAdapter, IdGen};
use crate::ingest::adapters::media_type_from_data_url;
use crate::types::{Conversation, Message, Part, Role};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Adapter for Completions-style conversation exports.
pub struct CompletionsAdapter;

impl CompletionsAdapter {
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

impl Default for CompletionsAdapter {
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
    messages: Option<Vec<RawChatMessage>>,
    choices: Option<Vec<RawChoice>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawChoice {
    message: Option<RawChatMessage>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawChatMessage {
    role: Option<String>,
    content: Option<RawContent>,
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<RawToolCall>>,
    tool_call_id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Blocks(Vec<RawContentBlock>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum RawContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: RawImageUrl },
    #[serde(rename = "file")]
    File { file: RawFilePayload },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawImageUrl {
    url: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawFilePayload {
    file_data: Option<String>,
    filename: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawToolCall {
    id: Option<String>,
    function: Option<RawFunction>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawFunction {
    name: Option<String>,
    arguments: Option<String>,
}

fn map_role(role: &str) -> Option<Role> {
    match role {
        "system" | "developer" => Some(Role::System),
        "user" => Some(Role::User),
        "assistant" => Some(Role::Assistant),
        "tool" | "function" => Some(Role::Tool),
        _ => None,
    }
}

impl FormatAdapter for CompletionsAdapter {
    fn name(&self) -> &'static str {
        "completions"
    }

    fn can_handle(&self, raw: &Value) -> bool {
        let Some(obj) = raw.as_object() else {
            return false;
        };
        if obj.get("object").and_then(Value::as_str) == Some("chat.completion") {
            return true;
        }
        obj.get("messages").map(Value::is_array).unwrap_or(false)
    }

    fn transform(&self, raw: &Value) -> Result<Conversation> {
        let payload = RawPayload::deserialize(raw)
            .map_err(|e| self.error(format!("payload does not deserialize: {e}")))?;

        // Conversation exports carry `messages`; single API response dumps
        // carry only `choices`, whose first message stands alone.
        let raw_messages = match payload.messages {
            Some(messages) => messages,
            None => {
                let choice_message = payload
                    .choices
                    .and_then(|mut choices| {
                        if choices.is_empty() {
                            None
                        } else {
                            choices.swap_remove(0).message
                        }
                    })
                    .ok_or_else(|| {
                        self.error("expected a `messages` array or `choices[0].message`".to_string())
                    })?;
                vec![choice_message]
            }
        };

        let mut ids = IdGen::new();
        let mut call_names: HashMap<String, String> = HashMap::new();
        let mut messages = Vec::with_capacity(raw_messages.len());

        for (index, raw_message) in raw_messages.into_iter().enumerate() {
            let role_name = raw_message.role.as_deref().unwrap_or_default();
            let role = map_role(role_name).ok_or_else(|| {
                self.error(format!(
                    "message {index} has unsupported role `{role_name}`"
                ))
            })?;

            let message_id = ids.next_message();
            let mut parts = Vec::new();

            // Model thinking precedes the answer text
            if role == Role::Assistant {
                if let Some(thinking) = raw_message.reasoning_content.as_deref() {
                    if !thinking.is_empty() {
                        parts.push(Part::reasoning(ids.next_part(), thinking));
                    }
                }
            }

            if role == Role::Tool {
                let call_id = raw_message.tool_call_id.clone().ok_or_else(|| {
                    self.error(format!("tool message {index} is missing `tool_call_id`"))
                })?;
                let tool_name = raw_message
                    .name
                    .clone()
                    .or_else(|| call_names.get(&call_id).cloned())
                    .ok_or_else(|| {
                        self.error(format!(
                            "tool message {index} references undeclared call id `{call_id}`"
                        ))
                    })?;
                let output = self.tool_output(raw_message.content, index)?;
                parts.push(Part::tool_result(
                    ids.next_part(),
                    call_id,
                    tool_name,
                    output,
                    None,
                ));
            } else {
                match raw_message.content {
                    Some(RawContent::Text(text)) => {
                        if !text.is_empty() {
                            parts.push(Part::text(ids.next_part(), text));
                        }
                    }
                    Some(RawContent::Blocks(blocks)) => {
                        for (bi, block) in blocks.into_iter().enumerate() {
                            match block {
                                RawContentBlock::Text { text } => {
                                    parts.push(Part::text(ids.next_part(), text));
                                }
                                RawContentBlock::ImageUrl { image_url } => {
                                    let media_type = media_type_from_data_url(&image_url.url);
                                    parts.push(Part::image(
                                        ids.next_part(),
                                        image_url.url,
                                        media_type,
                                    ));
                                }
                                RawContentBlock::File { file } => {
                                    let data = file.file_data.ok_or_else(|| {
                                        self.error(format!(
                                            "file block {bi} in message {index} is missing `file_data`"
                                        ))
                                    })?;
                                    let media_type = media_type_from_data_url(&data)
                                        .unwrap_or_else(|| "application/octet-stream".to_string());
                                    parts.push(Part::file(
                                        ids.next_part(),
                                        data,
                                        media_type,
                                        file.filename,
                                    ));
                                }
                                RawContentBlock::Unknown => {
                                    return Err(self.error(format!(
                                        "content block {bi} in message {index} has an unsupported type"
                                    )));
                                }
                            }
                        }
                    }
                    None => {}
                }
            }

            if role == Role::Assistant {
                for (ci, call) in raw_message.tool_calls.unwrap_or_default().into_iter().enumerate()
                {
                    let call_id = call.id.ok_or_else(|| {
                        self.error(format!("tool call {ci} in message {index} is missing `id`"))
                    })?;
                    let function = call.function.ok_or_else(|| {
                        self.error(format!(
                            "tool call {ci} in message {index} is missing `function`"
                        ))
                    })?;
                    let tool_name = function.name.ok_or_else(|| {
                        self.error(format!(
                            "tool call {ci} in message {index} is missing `function.name`"
                        ))
                    })?;
                    // Arguments arrive JSON-encoded; keep the raw string when
                    // they do not parse.
                    let input = match function.arguments {
                        Some(args) => {
                            serde_json::from_str(&args).unwrap_or(Value::String(args))
                        }
                        None => Value::Null,
                    };
                    call_names.insert(call_id.clone(), tool_name.clone());
                    parts.push(Part::tool_call(ids.next_part(), call_id, tool_name, input));
                }
            }

            if parts.is_empty() && role != Role::Tool {
                return Err(self.error(format!(
                    "{role} message {index} has no mappable content"
                )));
            }

            messages.push(Message::new(message_id, role, parts));
        }

        Ok(Conversation::new(messages))
    }
}

impl CompletionsAdapter {
    fn tool_output(&self, content: Option<RawContent>, index: usize) -> Result<Value> {
        match content {
            None => Ok(Value::String(String::new())),
            Some(RawContent::Text(text)) => Ok(Value::String(text)),
            Some(RawContent::Blocks(blocks)) => {
                let mut pieces = Vec::new();
                for block in blocks {
                    match block {
                        RawContentBlock::Text { text } => pieces.push(text),
                        _ => {
                            return Err(self.error(format!(
                                "tool message {index} has a non-text content block"
                            )));
                        }
                    }
                }
                Ok(Value::String(pieces.join("\n")))
            }
        }
    }
}
