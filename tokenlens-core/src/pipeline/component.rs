//! Componentization pass: label parts and aggregate a token timeline.
//!
//! Two collaborator calls and one deterministic fold:
//!
//! 1. **Identify** asks for the conversation's component labels. An empty
//!    or failed reply aborts the pass with an error, so the caller can
//!    tell "the collaborator gave us nothing" apart from "no components
//!    exist".
//! 2. **Map** asks for a part-id to label assignment. Anything unusable
//!    here degrades: unmapped parts are excluded from aggregates, unknown
//!    ids and labels are dropped, a failed call means an empty mapping.
//! 3. **Timeline aggregation** folds the mapped token counts into one
//!    cumulative snapshot per message, in a single forward pass.
//!
//! A final cosmetic step asks for display colors; any problem there falls
//! back to the default palette entry and never fails the pass.

use std::collections::{HashMap, HashSet};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::llm::{self, TextGenerator};
use crate::pipeline::prompts;
use crate::types::{
    ComponentMapping, ComponentReport, ComponentTimelineSnapshot, Conversation,
};

/// Build a component report for a conversation.
pub async fn componentize(
    conversation: &Conversation,
    generator: &dyn TextGenerator,
) -> Result<ComponentReport> {
    componentize_with_instructions(conversation, generator, None).await
}

/// [`componentize`] with caller-supplied guidance appended to the
/// identify prompt. The report's `prompt_hash` covers the guidance, so
/// reports built from different instructions hash differently.
pub async fn componentize_with_instructions(
    conversation: &Conversation,
    generator: &dyn TextGenerator,
    instructions: Option<&str>,
) -> Result<ComponentReport> {
    let identify_prompt = prompts::identify_components(conversation, instructions);
    let mut hasher = Sha256::new();
    hasher.update(identify_prompt.as_bytes());
    let prompt_hash = hex::encode(hasher.finalize());

    let labels = identify_labels(generator, &identify_prompt).await?;
    debug!(labels = labels.len(), "identified components");

    let mapping = request_mapping(conversation, generator, &labels).await;
    debug!(assignments = mapping.len(), "mapped parts to components");

    let timeline = build_timeline(conversation, &labels, &mapping);
    let colors = request_colors(generator, &labels).await;

    Ok(ComponentReport {
        labels,
        mapping,
        timeline,
        colors,
        prompt_hash,
    })
}

/// Identify step. Empty label lists are an error here: downstream steps
/// cannot run without labels, and the caller must see the difference
/// between a degraded collaborator and a genuinely unlabeled conversation.
async fn identify_labels(generator: &dyn TextGenerator, prompt: &str) -> Result<Vec<String>> {
    let response = generator
        .generate(prompt)
        .await
        .map_err(|e| Error::Collaborator(format!("component identification failed: {e}")))?;
    let raw = llm::extract_json_array(&response).map_err(|_| {
        Error::Collaborator("component identification returned no label list".to_string())
    })?;
    let values: Vec<serde_json::Value> = serde_json::from_str(&raw).map_err(|e| {
        Error::Collaborator(format!("component label list is not valid JSON: {e}"))
    })?;

    let mut labels = Vec::new();
    let mut seen = HashSet::new();
    for value in values {
        let Some(label) = value.as_str() else { continue };
        let label = label.trim();
        if !label.is_empty() && seen.insert(label.to_string()) {
            labels.push(label.to_string());
        }
    }

    if labels.is_empty() {
        return Err(Error::Collaborator(
            "component identification returned an empty label list".to_string(),
        ));
    }
    Ok(labels)
}

/// Map step. Never fails: a useless reply means an empty mapping.
async fn request_mapping(
    conversation: &Conversation,
    generator: &dyn TextGenerator,
    labels: &[String],
) -> ComponentMapping {
    let prompt = prompts::map_parts(conversation, labels);
    let response = match generator.generate(&prompt).await {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "component mapping failed; continuing with no assignments");
            return ComponentMapping::new();
        }
    };
    parse_mapping(&response, conversation, labels)
}

fn parse_mapping(
    response: &str,
    conversation: &Conversation,
    labels: &[String],
) -> ComponentMapping {
    let raw = match llm::extract_json_object(response) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(error = %err, "component mapping reply held no JSON object");
            return ComponentMapping::new();
        }
    };
    let parsed: HashMap<String, serde_json::Value> = match serde_json::from_str(&raw) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(error = %err, "component mapping reply is not a JSON object");
            return ComponentMapping::new();
        }
    };

    let known_parts: HashSet<&str> = conversation
        .messages
        .iter()
        .flat_map(|m| m.parts.iter())
        .map(|p| p.id())
        .collect();
    let known_labels: HashSet<&str> = labels.iter().map(String::as_str).collect();

    let mut mapping = ComponentMapping::new();
    for (part_id, value) in parsed {
        let Some(label) = value.as_str() else { continue };
        if !known_parts.contains(part_id.as_str()) {
            debug!(part_id = %part_id, "mapping names an unknown part id, dropped");
            continue;
        }
        if !known_labels.contains(label) {
            debug!(part_id = %part_id, label = %label, "mapping uses an unknown label, dropped");
            continue;
        }
        mapping.insert(part_id, label.to_string());
    }
    mapping
}

/// Cumulative token timeline: one snapshot per message, running per-label
/// sums over all mapped parts up to and including that message.
///
/// Every label appears in every snapshot, zero before its first tokens,
/// so consumers can chart a stable key set. Single forward pass over the
/// parts; nothing is recomputed per message.
fn build_timeline(
    conversation: &Conversation,
    labels: &[String],
    mapping: &ComponentMapping,
) -> Vec<ComponentTimelineSnapshot> {
    let mut running: HashMap<String, u64> = labels.iter().map(|l| (l.clone(), 0)).collect();
    for label in mapping.values() {
        running.entry(label.clone()).or_insert(0);
    }
    let mut total: u64 = 0;

    conversation
        .messages
        .iter()
        .enumerate()
        .map(|(index, message)| {
            for part in &message.parts {
                let Some(label) = mapping.get(part.id()) else {
                    continue;
                };
                let Some(count) = part.token_count() else {
                    continue;
                };
                *running.entry(label.clone()).or_insert(0) += u64::from(count);
                total += u64::from(count);
            }
            ComponentTimelineSnapshot {
                message_index: index,
                component_tokens: running.clone(),
                total_tokens: total,
            }
        })
        .collect()
}

/// Color step. Purely cosmetic: every failure path hands every label the
/// default palette entry.
async fn request_colors(
    generator: &dyn TextGenerator,
    labels: &[String],
) -> HashMap<String, String> {
    let fallback = || {
        labels
            .iter()
            .map(|l| (l.clone(), prompts::DEFAULT_COLOR.to_string()))
            .collect::<HashMap<String, String>>()
    };

    let prompt = prompts::assign_colors(labels);
    let response = match generator.generate(&prompt).await {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "color assignment failed; using the default palette entry");
            return fallback();
        }
    };
    let raw = match llm::extract_json_object(&response) {
        Ok(raw) => raw,
        Err(_) => return fallback(),
    };
    let parsed: HashMap<String, serde_json::Value> = match serde_json::from_str(&raw) {
        Ok(parsed) => parsed,
        Err(_) => return fallback(),
    };

    labels
        .iter()
        .map(|label| {
            let color = parsed
                .get(label)
                .and_then(|value| value.as_str())
                .filter(|color| prompts::PALETTE.contains(color))
                .unwrap_or(prompts::DEFAULT_COLOR);
            (label.clone(), color.to_string())
        })
        .collect()
}
