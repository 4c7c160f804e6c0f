//! Wire-format adapters
//!
//! Each supported export format has an adapter module that implements the
//! [`FormatAdapter`](super::FormatAdapter) trait.
//!
//! ## Supported Formats
//!
//! | Format | Module | Recognized by |
//! |--------|--------|---------------|
//! | Completions-style | [`completions`] | `object == "chat.completion"` or a top-level `messages` array |
//! | Responses-style | [`responses`] | `object == "response"` or a top-level `input`/`output` item array |

mod completions;
mod responses;

pub use completions::CompletionsAdapter;
pub use responses::ResponsesAdapter;

use super::FormatAdapter;

/// Create all built-in adapters, in dispatch order.
///
/// Use this to initialize a [`ParserRegistry`](super::ParserRegistry).
pub fn create_default_adapters() -> Vec<Box<dyn FormatAdapter>> {
    vec![
        Box::new(CompletionsAdapter::new()),
        Box::new(ResponsesAdapter::new()),
    ]
}

/// Pull the media type out of a `data:` URL, if there is one.
pub(crate) fn media_type_from_data_url(url: &str) -> Option<String> {
    let rest = url.strip_prefix("data:")?;
    let end = rest.find([';', ','])?;
    let media_type = &rest[..end];
    if media_type.is_empty() {
        None
    } else {
        Some(media_type.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_default_adapters_order() {
        let adapters = create_default_adapters();
        assert_eq!(adapters.len(), 2);
        assert_eq!(adapters[0].name(), "completions");
        assert_eq!(adapters[1].name(), "responses");
    }

    #[test]
    fn test_media_type_from_data_url() {
        assert_eq!(
            media_type_from_data_url("data:image/png;base64,AAAA").as_deref(),
            Some("image/png")
        );
        assert_eq!(
            media_type_from_data_url("data:text/plain,hello").as_deref(),
            Some("text/plain")
        );
        assert_eq!(media_type_from_data_url("data:;base64,AAAA"), None);
        assert_eq!(media_type_from_data_url("https://example.test/a.png"), None);
    }
}
