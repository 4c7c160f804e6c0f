//! Format adapter abstraction
//!
//! All wire-format adapters implement the [`FormatAdapter`] trait to give
//! the registry a uniform way to recognize and normalize payloads.
//!
//! ## Design Principles
//!
//! 1. **Cheap recognition**: `can_handle` sniffs a few discriminating fields
//!    and never fails; unparseable input is simply "cannot handle"
//! 2. **Pure transformation**: `transform` is a function of the payload
//!    alone; no I/O, no shared state
//! 3. **Strict mapping**: every input fragment lands on a canonical part
//!    variant or the transform fails naming the field it could not map
//! 4. **Extensible**: new wire formats only require implementing this trait
//!    and registering the adapter

use crate::error::Result;
use crate::types::Conversation;
use serde_json::Value;

/// Trait implemented by all wire-format adapters.
///
/// Each supported export format (Completions-style, Responses-style) has an
/// adapter that implements this trait.
pub trait FormatAdapter: Send + Sync {
    /// Short name used in logs and error attribution
    fn name(&self) -> &'static str;

    /// Whether this adapter recognizes the payload.
    ///
    /// Checks discriminating structure only (an `object` tag, a top-level
    /// array). Must never panic or error.
    fn can_handle(&self, raw: &Value) -> bool;

    /// Map the payload onto the canonical model.
    ///
    /// Deterministic: parsing the same payload twice yields structurally
    /// identical conversations, synthetic ids included. Structure the
    /// adapter cannot map fails with [`Error::Format`] naming the offending
    /// field and what was expected.
    ///
    /// [`Error::Format`]: crate::error::Error::Format
    fn transform(&self, raw: &Value) -> Result<Conversation>;
}

/// Synthetic id generator scoped to a single `transform` call.
///
/// Source formats rarely carry per-part ids, so adapters mint them:
/// `msg-1`, `msg-2`, ... for messages and `part-1`, `part-2`, ... for
/// parts, in encounter order. Scoping the counters to one parse call keeps
/// concurrent parses independent and repeated parses identical.
#[derive(Debug, Default)]
pub struct IdGen {
    messages: usize,
    parts: usize,
}

impl IdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_message(&mut self) -> String {
        self.messages += 1;
        format!("msg-{}", self.messages)
    }

    pub fn next_part(&mut self) -> String {
        self.parts += 1;
        format!("part-{}", self.parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_gen_sequences_independently() {
        let mut ids = IdGen::new();
        assert_eq!(ids.next_message(), "msg-1");
        assert_eq!(ids.next_part(), "part-1");
        assert_eq!(ids.next_part(), "part-2");
        assert_eq!(ids.next_message(), "msg-2");
        assert_eq!(ids.next_part(), "part-3");
    }

    #[test]
    fn test_fresh_generators_restart() {
        let mut a = IdGen::new();
        a.next_message();
        a.next_part();

        let mut b = IdGen::new();
        assert_eq!(b.next_message(), "msg-1");
        assert_eq!(b.next_part(), "part-1");
    }
}
