//! Prompt construction for the text-generation collaborator.
//!
//! Every pipeline pass that talks to the collaborator builds its prompt
//! here, so the wording lives in one place and tests can match on it.
//! Each template ends with a one-line "Return only ..." contract; the
//! passes parse replies leniently but the contract keeps well-behaved
//! models on the happy path.

use crate::types::{Conversation, Part};

/// Character cap on a single part excerpt embedded in a prompt.
const MAX_PART_CHARS: usize = 16_000;

/// Character cap on a rendered conversation transcript.
const MAX_TRANSCRIPT_CHARS: usize = 16_000;

/// Fixed display palette offered to the color-assignment step.
pub(crate) const PALETTE: [&str; 8] = [
    "#4e79a7", "#f28e2b", "#e15759", "#76b7b2", "#59a14f", "#edc948", "#b07aa1", "#9c755f",
];

/// Fallback when color assignment fails or returns nothing usable.
pub(crate) const DEFAULT_COLOR: &str = PALETTE[0];

const SPLIT_INSTRUCTIONS: &str = "You segment long AI-conversation content into readable sections. \
Read the content below and find the points where the topic or activity shifts. For each shift, \
return a short regular-expression fragment that matches the first few words after the break, \
verbatim, with regex metacharacters escaped. Do not use lookahead or lookbehind. \
Return between 0 and 10 markers; return an empty array if the content has no clear sections.";

const IDENTIFY_INSTRUCTIONS: &str = "You analyze AI-assistant conversations. Read the transcript \
below and name the distinct workstreams or topics it contains, as short labels of one to four \
words each (for example \"database migration\" or \"test fixes\"). Return between 1 and 8 labels. \
Do not invent topics that are not in the transcript.";

const MAP_INSTRUCTIONS: &str = "You analyze AI-assistant conversations. Each transcript line below \
starts with a role and a part id. Assign each part id to exactly one of the component labels \
listed. Omit a part id entirely if none of the labels fits it.";

const COLOR_INSTRUCTIONS: &str = "Assign each component label below a display color, chosen from \
the palette. Reuse palette entries only once all eight have been used.";

/// Prompt asking for split markers over one oversized part's text.
pub(crate) fn split_markers(text: &str) -> String {
    format!(
        "{SPLIT_INSTRUCTIONS}\n\nContent:\n{}\n\nReturn only a JSON array of split markers.",
        excerpt(text, MAX_PART_CHARS)
    )
}

/// Prompt asking for component labels over the whole conversation.
///
/// `extra` carries caller-supplied guidance when a report is rebuilt with
/// different instructions; it is appended after the standing instructions.
pub(crate) fn identify_components(conversation: &Conversation, extra: Option<&str>) -> String {
    let guidance = match extra {
        Some(extra) if !extra.trim().is_empty() => {
            format!("\nAdditional guidance from the caller:\n{}\n", extra.trim())
        }
        _ => String::new(),
    };
    format!(
        "{IDENTIFY_INSTRUCTIONS}\n{guidance}\nTranscript:\n{}\n\nReturn only a JSON array of component labels.",
        transcript(conversation)
    )
}

/// Prompt asking for a part-id to label assignment.
pub(crate) fn map_parts(conversation: &Conversation, labels: &[String]) -> String {
    format!(
        "{MAP_INSTRUCTIONS}\n\nLabels:\n{}\n\nTranscript:\n{}\n\nReturn only a JSON object mapping part ids to component labels.",
        labels.join("\n"),
        transcript(conversation)
    )
}

/// Prompt asking for a label-to-color assignment from the fixed palette.
pub(crate) fn assign_colors(labels: &[String]) -> String {
    format!(
        "{COLOR_INSTRUCTIONS}\n\nLabels:\n{}\n\nPalette:\n{}\n\nReturn only a JSON object mapping each label to a hex color.",
        labels.join("\n"),
        PALETTE.join("\n")
    )
}

/// One line per part: role, part id, variant, flattened content.
fn transcript(conversation: &Conversation) -> String {
    let mut out = String::new();
    'messages: for message in &conversation.messages {
        for part in &message.parts {
            let line = format!(
                "{} {} ({}): {}\n",
                message.role,
                part.id(),
                part.kind(),
                part_body(part).replace('\n', " ")
            );
            out.push_str(&line);
            if out.len() >= MAX_TRANSCRIPT_CHARS {
                out = excerpt(&out, MAX_TRANSCRIPT_CHARS);
                break 'messages;
            }
        }
    }
    out
}

fn part_body(part: &Part) -> String {
    match part {
        Part::Text { text, .. } | Part::Reasoning { text, .. } => text.clone(),
        Part::ToolCall {
            tool_name, input, ..
        } => format!("{} {}", tool_name, input),
        Part::ToolResult {
            tool_name, output, ..
        } => format!("{} {}", tool_name, output),
        Part::Image { .. } => "[image]".to_string(),
        Part::File { filename, .. } => {
            format!("[file {}]", filename.as_deref().unwrap_or("attachment"))
        }
    }
}

/// Clamp to `limit` bytes on a char boundary, marking the cut.
fn excerpt(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n...[truncated]", &text[..end])
}
