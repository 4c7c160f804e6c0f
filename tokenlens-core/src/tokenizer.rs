//! Token counting
//!
//! The enrichment passes do their token math through the [`Tokenizer`]
//! trait so tests can substitute cheap deterministic counters. The
//! production implementation is [`BpeTokenizer`]: GPT-4-class BPE over the
//! cl100k_base vocabulary, compiled into the binary, so counting needs no
//! network or file access.

use crate::error::{Error, Result};
use tiktoken_rs::CoreBPE;

/// Counts tokens the way the target model family would.
///
/// Implementations must be deterministic: the same text always yields the
/// same count.
pub trait Tokenizer: Send + Sync {
    /// Number of tokens in `text`
    fn count(&self, text: &str) -> u32;
}

/// BPE tokenizer over the cl100k_base vocabulary
pub struct BpeTokenizer {
    bpe: CoreBPE,
}

impl BpeTokenizer {
    /// Build the tokenizer.
    ///
    /// Construction decodes the embedded vocabulary, which is not free.
    /// Build one and share it by reference.
    pub fn new() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| Error::Tokenizer(e.to_string()))?;
        Ok(Self { bpe })
    }
}

impl Tokenizer for BpeTokenizer {
    fn count(&self, text: &str) -> u32 {
        self.bpe.encode_ordinary(text).len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_counts_zero() {
        let tok = BpeTokenizer::new().unwrap();
        assert_eq!(tok.count(""), 0);
    }

    #[test]
    fn test_count_is_deterministic() {
        let tok = BpeTokenizer::new().unwrap();
        let text = "Normalize the payload, then count every part.";
        assert_eq!(tok.count(text), tok.count(text));
        assert!(tok.count(text) > 0);
    }

    #[test]
    fn test_count_tracks_content_not_length_alone() {
        let tok = BpeTokenizer::new().unwrap();
        // Same byte length, different token structure
        let prose = tok.count("the cat sat on the mat!");
        let noise = tok.count("xqzvbn jkwpfm dhgrtyu");
        assert_ne!(prose, 0);
        assert_ne!(noise, 0);
    }
}
