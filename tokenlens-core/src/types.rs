//! Core domain types for tokenlens
//!
//! These types form the canonical conversation model that every supported
//! wire format is normalized into before enrichment. Adapters produce it,
//! pipeline passes consume and re-produce it, and the visualization layer
//! reads its serialized form.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Conversation** | An ordered sequence of Messages, in turn order |
//! | **Message** | One turn: an id, a role, and an ordered sequence of Parts |
//! | **Part** | The atomic content unit within a message |
//! | **Role** | Who speaks a turn: system, user, assistant, or tool |
//! | **Component** | A topical label assigned to parts by componentization |
//! | **Timeline** | Cumulative per-component token totals, one snapshot per message |
//!
//! ### Roles constrain parts
//!
//! Not every part variant may appear under every role. The legality matrix
//! lives in [`Role::allows`] and is enforced by [`Conversation::validate`]:
//!
//! | Role | Legal part variants |
//! |------|---------------------|
//! | `system` | text |
//! | `user` | text, image, file |
//! | `assistant` | text, file, reasoning, tool-call |
//! | `tool` | tool-result |
//!
//! ### Wire shape
//!
//! Serialization matches the consumer's JSON convention: part variants are
//! tagged through a kebab-case `type` field (`"tool-call"`), variant fields
//! are camelCase (`toolCallId`), and `token_count` keeps its snake_case
//! spelling. Rust-side names stay ordinary snake_case.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// ============================================
// Roles
// ============================================

/// Role of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions injected ahead of the exchange
    System,
    /// The human side of the exchange
    User,
    /// The model side of the exchange
    Assistant,
    /// Tool execution results fed back to the model
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    /// Whether a part variant is legal under this role
    pub fn allows(&self, kind: PartKind) -> bool {
        match self {
            Role::System => matches!(kind, PartKind::Text),
            Role::User => matches!(kind, PartKind::Text | PartKind::Image | PartKind::File),
            Role::Assistant => matches!(
                kind,
                PartKind::Text | PartKind::File | PartKind::Reasoning | PartKind::ToolCall
            ),
            Role::Tool => matches!(kind, PartKind::ToolResult),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "tool" => Ok(Role::Tool),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

// ============================================
// Parts
// ============================================

/// Variant discriminant for [`Part`], used in legality checks and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartKind {
    Text,
    Reasoning,
    ToolCall,
    ToolResult,
    Image,
    File,
}

impl PartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartKind::Text => "text",
            PartKind::Reasoning => "reasoning",
            PartKind::ToolCall => "tool-call",
            PartKind::ToolResult => "tool-result",
            PartKind::Image => "image",
            PartKind::File => "file",
        }
    }
}

impl std::fmt::Display for PartKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The atomic content unit within a message.
///
/// A closed sum: adapters must map every input fragment onto one of these
/// variants or fail. `token_count` is absent until the token accounting
/// pass runs and is cleared whenever the owning text changes shape
/// (segmentation replaces parts rather than patching counts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    /// Plain prose
    Text {
        id: String,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        token_count: Option<u32>,
    },
    /// Model thinking surfaced by the provider
    Reasoning {
        id: String,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        token_count: Option<u32>,
    },
    /// Assistant request to invoke a tool
    ToolCall {
        id: String,
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        input: serde_json::Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        token_count: Option<u32>,
    },
    /// Output returned by a tool invocation
    ToolResult {
        id: String,
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        output: serde_json::Value,
        #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        token_count: Option<u32>,
    },
    /// Inline or referenced image
    Image {
        id: String,
        image: String,
        #[serde(rename = "mediaType", skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
    /// Attached file payload
    File {
        id: String,
        data: String,
        #[serde(rename = "mediaType")]
        media_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
}

impl Part {
    pub fn text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Part::Text {
            id: id.into(),
            text: text.into(),
            token_count: None,
        }
    }

    pub fn reasoning(id: impl Into<String>, text: impl Into<String>) -> Self {
        Part::Reasoning {
            id: id.into(),
            text: text.into(),
            token_count: None,
        }
    }

    pub fn tool_call(
        id: impl Into<String>,
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Part::ToolCall {
            id: id.into(),
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            input,
            token_count: None,
        }
    }

    pub fn tool_result(
        id: impl Into<String>,
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        output: serde_json::Value,
        is_error: Option<bool>,
    ) -> Self {
        Part::ToolResult {
            id: id.into(),
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            output,
            is_error,
            token_count: None,
        }
    }

    pub fn image(id: impl Into<String>, image: impl Into<String>, media_type: Option<String>) -> Self {
        Part::Image {
            id: id.into(),
            image: image.into(),
            media_type,
        }
    }

    pub fn file(
        id: impl Into<String>,
        data: impl Into<String>,
        media_type: impl Into<String>,
        filename: Option<String>,
    ) -> Self {
        Part::File {
            id: id.into(),
            data: data.into(),
            media_type: media_type.into(),
            filename,
        }
    }

    /// The part's unique identifier
    pub fn id(&self) -> &str {
        match self {
            Part::Text { id, .. }
            | Part::Reasoning { id, .. }
            | Part::ToolCall { id, .. }
            | Part::ToolResult { id, .. }
            | Part::Image { id, .. }
            | Part::File { id, .. } => id,
        }
    }

    /// Variant discriminant, for legality checks and error messages
    pub fn kind(&self) -> PartKind {
        match self {
            Part::Text { .. } => PartKind::Text,
            Part::Reasoning { .. } => PartKind::Reasoning,
            Part::ToolCall { .. } => PartKind::ToolCall,
            Part::ToolResult { .. } => PartKind::ToolResult,
            Part::Image { .. } => PartKind::Image,
            Part::File { .. } => PartKind::File,
        }
    }

    /// Attached token count, if the accounting pass has run
    pub fn token_count(&self) -> Option<u32> {
        match self {
            Part::Text { token_count, .. }
            | Part::Reasoning { token_count, .. }
            | Part::ToolCall { token_count, .. }
            | Part::ToolResult { token_count, .. } => *token_count,
            Part::Image { .. } | Part::File { .. } => None,
        }
    }

    /// Attach or clear a token count. No-op for variants that carry none.
    pub fn set_token_count(&mut self, count: Option<u32>) {
        match self {
            Part::Text { token_count, .. }
            | Part::Reasoning { token_count, .. }
            | Part::ToolCall { token_count, .. }
            | Part::ToolResult { token_count, .. } => *token_count = count,
            Part::Image { .. } | Part::File { .. } => {}
        }
    }
}

// ============================================
// Messages
// ============================================

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier within the conversation
    pub id: String,
    /// Who speaks this turn
    pub role: Role,
    /// Ordered content units
    pub parts: Vec<Part>,
}

impl Message {
    pub fn new(id: impl Into<String>, role: Role, parts: Vec<Part>) -> Self {
        Self {
            id: id.into(),
            role,
            parts,
        }
    }
}

// ============================================
// Conversations
// ============================================

/// The canonical conversation: an ordered sequence of messages.
///
/// Pipeline passes treat conversations as values: each pass takes ownership
/// and returns a new (or structurally updated) conversation rather than
/// mutating shared state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Sum of every attached `token_count` across all parts.
    ///
    /// Zero both for an empty conversation and for one the accounting pass
    /// has not visited yet.
    pub fn total_token_count(&self) -> u64 {
        self.messages
            .iter()
            .flat_map(|m| m.parts.iter())
            .filter_map(|p| p.token_count())
            .map(u64::from)
            .sum()
    }

    /// Validate the whole conversation against the model invariants.
    ///
    /// Checks, in order per message: message-id uniqueness, the non-empty
    /// rule (tool turns are exempt), then per part: part-id uniqueness
    /// across the entire conversation and role/variant legality.
    ///
    /// Fails closed on the first violation with a path like
    /// `messages[3].parts[1]` and the violated constraint.
    pub fn validate(&self) -> Result<()> {
        let mut message_ids: HashSet<&str> = HashSet::new();
        let mut part_ids: HashSet<&str> = HashSet::new();

        for (mi, message) in self.messages.iter().enumerate() {
            if !message_ids.insert(message.id.as_str()) {
                return Err(Error::Validation {
                    path: format!("messages[{}]", mi),
                    constraint: format!("duplicate message id `{}`", message.id),
                });
            }

            if message.parts.is_empty() && message.role != Role::Tool {
                return Err(Error::Validation {
                    path: format!("messages[{}]", mi),
                    constraint: format!("{} message has no parts", message.role),
                });
            }

            for (pi, part) in message.parts.iter().enumerate() {
                if !part_ids.insert(part.id()) {
                    return Err(Error::Validation {
                        path: format!("messages[{}].parts[{}]", mi, pi),
                        constraint: format!("duplicate part id `{}`", part.id()),
                    });
                }

                if !message.role.allows(part.kind()) {
                    return Err(Error::Validation {
                        path: format!("messages[{}].parts[{}]", mi, pi),
                        constraint: format!(
                            "{} part not allowed in {} message",
                            part.kind(),
                            message.role
                        ),
                    });
                }
            }
        }

        Ok(())
    }
}

// ============================================
// Derived Enrichment
// ============================================

/// Part id to component label. Partial: unmapped parts are excluded from
/// component aggregates.
pub type ComponentMapping = HashMap<String, String>;

/// Cumulative token totals after each message.
///
/// Snapshot `i` covers every mapped part in messages `0..=i`. A timeline
/// has exactly one snapshot per message, in ascending message order, and
/// `total_tokens` never decreases between consecutive snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentTimelineSnapshot {
    /// Index of the message this snapshot was taken after
    pub message_index: usize,
    /// Running token total per component label
    pub component_tokens: HashMap<String, u64>,
    /// Running token total across all mapped parts
    pub total_tokens: u64,
}

/// Output of the componentization pass for one conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentReport {
    /// Component labels, in the order the collaborator proposed them
    pub labels: Vec<String>,
    /// Part id to label assignments
    pub mapping: ComponentMapping,
    /// Cumulative per-message token timeline
    pub timeline: Vec<ComponentTimelineSnapshot>,
    /// Display color per label
    pub colors: HashMap<String, String>,
    /// Hash of the identify prompt that produced this report
    pub prompt_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_conversation() -> Conversation {
        Conversation::new(vec![
            Message::new(
                "msg-1",
                Role::System,
                vec![Part::text("part-1", "Be helpful.")],
            ),
            Message::new(
                "msg-2",
                Role::User,
                vec![
                    Part::text("part-2", "What is in this image?"),
                    Part::image("part-3", "data:image/png;base64,AAAA", Some("image/png".into())),
                ],
            ),
            Message::new(
                "msg-3",
                Role::Assistant,
                vec![
                    Part::reasoning("part-4", "The user attached a chart."),
                    Part::tool_call("part-5", "call-1", "zoom", json!({"region": "top"})),
                ],
            ),
            Message::new(
                "msg-4",
                Role::Tool,
                vec![Part::tool_result(
                    "part-6",
                    "call-1",
                    "zoom",
                    json!("a bar chart"),
                    None,
                )],
            ),
        ])
    }

    #[test]
    fn test_valid_conversation_passes() {
        assert!(valid_conversation().validate().is_ok());
    }

    #[test]
    fn test_empty_tool_message_allowed() {
        let conv = Conversation::new(vec![Message::new("msg-1", Role::Tool, vec![])]);
        assert!(conv.validate().is_ok());
    }

    #[test]
    fn test_empty_user_message_rejected() {
        let conv = Conversation::new(vec![Message::new("msg-1", Role::User, vec![])]);
        let err = conv.validate().unwrap_err();
        match err {
            Error::Validation { path, constraint } => {
                assert_eq!(path, "messages[0]");
                assert!(constraint.contains("no parts"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_illegal_variant_reports_path() {
        let conv = Conversation::new(vec![Message::new(
            "msg-1",
            Role::User,
            vec![
                Part::text("part-1", "hello"),
                Part::reasoning("part-2", "should not be here"),
            ],
        )]);
        let err = conv.validate().unwrap_err();
        match err {
            Error::Validation { path, constraint } => {
                assert_eq!(path, "messages[0].parts[1]");
                assert!(constraint.contains("reasoning"));
                assert!(constraint.contains("user"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_part_id_across_messages_rejected() {
        let conv = Conversation::new(vec![
            Message::new("msg-1", Role::User, vec![Part::text("part-1", "a")]),
            Message::new("msg-2", Role::Assistant, vec![Part::text("part-1", "b")]),
        ]);
        let err = conv.validate().unwrap_err();
        match err {
            Error::Validation { path, .. } => assert_eq!(path, "messages[1].parts[0]"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_message_id_rejected() {
        let conv = Conversation::new(vec![
            Message::new("msg-1", Role::User, vec![Part::text("part-1", "a")]),
            Message::new("msg-1", Role::Assistant, vec![Part::text("part-2", "b")]),
        ]);
        assert!(matches!(
            conv.validate().unwrap_err(),
            Error::Validation { .. }
        ));
    }

    #[test]
    fn test_role_allows_matrix() {
        assert!(Role::System.allows(PartKind::Text));
        assert!(!Role::System.allows(PartKind::Image));
        assert!(Role::User.allows(PartKind::File));
        assert!(!Role::User.allows(PartKind::ToolCall));
        assert!(Role::Assistant.allows(PartKind::Reasoning));
        assert!(!Role::Assistant.allows(PartKind::ToolResult));
        assert!(Role::Tool.allows(PartKind::ToolResult));
        assert!(!Role::Tool.allows(PartKind::Text));
    }

    #[test]
    fn test_part_wire_shape() {
        let part = Part::tool_call("part-1", "call-9", "search", json!({"q": "rust"}));
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(value["type"], "tool-call");
        assert_eq!(value["toolCallId"], "call-9");
        assert_eq!(value["toolName"], "search");
        // Absent until the accounting pass runs
        assert!(value.get("token_count").is_none());
    }

    #[test]
    fn test_part_round_trip() {
        let mut part = Part::tool_result("part-1", "call-2", "grep", json!({"hits": 3}), Some(false));
        part.set_token_count(Some(17));
        let text = serde_json::to_string(&part).unwrap();
        let back: Part = serde_json::from_str(&text).unwrap();
        assert_eq!(part, back);
        assert_eq!(back.token_count(), Some(17));
    }

    #[test]
    fn test_total_token_count() {
        let mut conv = valid_conversation();
        assert_eq!(conv.total_token_count(), 0);
        conv.messages[1].parts[0].set_token_count(Some(7));
        conv.messages[2].parts[1].set_token_count(Some(5));
        // Image parts never carry a count
        conv.messages[1].parts[1].set_token_count(Some(99));
        assert_eq!(conv.total_token_count(), 12);
    }
}
