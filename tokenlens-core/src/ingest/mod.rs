//! Ingestion layer: raw payloads to the canonical model
//!
//! This module turns uploaded JSON payloads (whatever wire format they were
//! exported in) into validated canonical [`Conversation`]s.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌──────────────────┐
//! │ Raw payload  │ ──► │ ParserRegistry │ ──► │   Conversation   │
//! │ (JSON value) │     │                │     │ (validated model)│
//! └──────────────┘     └────────────────┘     └──────────────────┘
//!                             │
//!                             ▼
//!                  ┌───────────────────────┐
//!                  │  FormatAdapter        │
//!                  │  ├─ CompletionsAdapter│
//!                  │  ├─ ResponsesAdapter  │
//!                  │  └─ ...               │
//!                  └───────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tokenlens_core::ingest::ParserRegistry;
//!
//! let registry = ParserRegistry::new();
//! let conversation = registry.parse(&payload)?;
//! ```

mod adapter;
pub mod adapters;

pub use adapter::{FormatAdapter, IdGen};

use crate::error::{Error, Result};
use crate::types::Conversation;
use serde_json::Value;

/// Ordered adapter list with first-claim dispatch.
///
/// Adapters are tried in registration order; the first whose `can_handle`
/// returns true owns the payload. The registry never special-cases a
/// format: supporting a new one means registering one more adapter.
pub struct ParserRegistry {
    adapters: Vec<Box<dyn FormatAdapter>>,
}

impl ParserRegistry {
    /// Create a registry with the built-in adapters.
    pub fn new() -> Self {
        Self {
            adapters: adapters::create_default_adapters(),
        }
    }

    /// Create a registry with a custom adapter list.
    pub fn with_adapters(adapters: Vec<Box<dyn FormatAdapter>>) -> Self {
        Self { adapters }
    }

    /// Append an adapter. It is tried after all previously registered ones.
    pub fn register(&mut self, adapter: Box<dyn FormatAdapter>) {
        self.adapters.push(adapter);
    }

    /// Normalize a raw payload into a validated conversation.
    ///
    /// Dispatches to the first adapter that claims the payload and runs
    /// canonical validation over its output, so every conversation leaving
    /// the registry satisfies the model invariants. A transformed result
    /// that fails validation is that adapter's format error. No claiming
    /// adapter means [`Error::NoMatchingFormat`], which is terminal for the
    /// payload: retrying cannot help.
    pub fn parse(&self, raw: &Value) -> Result<Conversation> {
        for adapter in &self.adapters {
            if !adapter.can_handle(raw) {
                continue;
            }

            tracing::debug!(adapter = adapter.name(), "adapter claimed payload");
            let conversation = adapter.transform(raw)?;

            if let Err(e) = conversation.validate() {
                return Err(Error::Format {
                    adapter: adapter.name().to_string(),
                    reason: e.to_string(),
                });
            }

            tracing::debug!(
                adapter = adapter.name(),
                messages = conversation.messages.len(),
                "payload normalized"
            );
            return Ok(conversation);
        }

        tracing::warn!("no registered adapter claimed the payload");
        Err(Error::NoMatchingFormat)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Message, Part, Role};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubAdapter {
        name: &'static str,
        claims: bool,
        transforms: Arc<AtomicUsize>,
        parts: Vec<Part>,
    }

    impl StubAdapter {
        fn new(name: &'static str, claims: bool, transforms: Arc<AtomicUsize>) -> Self {
            Self {
                name,
                claims,
                transforms,
                parts: vec![Part::text("part-1", "stub")],
            }
        }
    }

    impl FormatAdapter for StubAdapter {
        fn name(&self) -> &'static str {
            self.name
        }

        fn can_handle(&self, _raw: &Value) -> bool {
            self.claims
        }

        fn transform(&self, _raw: &Value) -> Result<Conversation> {
            self.transforms.fetch_add(1, Ordering::SeqCst);
            Ok(Conversation::new(vec![Message::new(
                "msg-1",
                Role::User,
                self.parts.clone(),
            )]))
        }
    }

    #[test]
    fn test_first_claiming_adapter_wins() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let registry = ParserRegistry::with_adapters(vec![
            Box::new(StubAdapter::new("first", true, first.clone())),
            Box::new(StubAdapter::new("second", true, second.clone())),
        ]);

        registry.parse(&json!({})).unwrap();
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_non_claiming_adapters_are_skipped() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let registry = ParserRegistry::with_adapters(vec![
            Box::new(StubAdapter::new("first", false, first.clone())),
            Box::new(StubAdapter::new("second", true, second.clone())),
        ]);

        registry.parse(&json!({})).unwrap();
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_matching_format_before_any_transform() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = ParserRegistry::with_adapters(vec![Box::new(StubAdapter::new(
            "only",
            false,
            calls.clone(),
        ))]);

        assert!(matches!(
            registry.parse(&json!({ "alien": true })),
            Err(Error::NoMatchingFormat)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_transform_output_is_a_format_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut bad = StubAdapter::new("bad", true, calls);
        // Duplicate part ids violate the model
        bad.parts = vec![Part::text("part-1", "a"), Part::text("part-1", "b")];
        let registry = ParserRegistry::with_adapters(vec![Box::new(bad)]);

        let err = registry.parse(&json!({})).unwrap_err();
        match err {
            Error::Format { adapter, reason } => {
                assert_eq!(adapter, "bad");
                assert!(reason.contains("duplicate part id"));
            }
            other => panic!("expected format error, got {:?}", other),
        }
    }

    #[test]
    fn test_default_registry_dispatches_both_formats() {
        let registry = ParserRegistry::new();

        let completions = json!({
            "messages": [ { "role": "user", "content": "hi" } ]
        });
        assert!(registry.parse(&completions).is_ok());

        let responses = json!({
            "object": "response",
            "output": [
                {
                    "type": "message",
                    "role": "assistant",
                    "content": [ { "type": "output_text", "text": "hello" } ]
                }
            ]
        });
        assert!(registry.parse(&responses).is_ok());

        assert!(matches!(
            registry.parse(&json!({ "completely": "different" })),
            Err(Error::NoMatchingFormat)
        ));
    }

    #[test]
    fn test_register_appends_in_dispatch_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ParserRegistry::new();
        registry.register(Box::new(StubAdapter::new("fallback", true, calls.clone())));

        // Built-ins decline, the appended adapter catches it
        registry.parse(&json!({ "strange": [] })).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
