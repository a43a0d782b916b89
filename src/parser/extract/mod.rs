pub mod state;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::blocks::Block;
use super::sections::{segment, Section};
use state::ExtractionState;

/// Headings containing this are sponsor blocks.
const PROMO_MARKER: &str = "Creator Hooks Pro";
/// The weekly counter-example; its body is authored like a hook but is not one.
const FLOP_TITLE: &str = "Flop of the Week";

const EMBEDDING_MAX_CHARS: usize = 8000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookRecord {
    pub source_url: String,
    pub section_title: String,
    pub title: String,
    pub framework: String,
    pub hook_score: Option<String>,
    pub rationale: String,
}

impl HookRecord {
    /// Text handed to the embedding side of the retrieval pipeline.
    pub fn embedding_text(&self) -> String {
        let joined = format!("{} {} {}", self.title, self.framework, self.rationale);
        match joined.char_indices().nth(EMBEDDING_MAX_CHARS) {
            Some((cut, _)) => joined[..cut].to_string(),
            None => joined,
        }
    }
}

/// Turn one post's blocks into its hook records, in section order.
pub fn extract_records(source_url: &str, blocks: &[Block]) -> Vec<HookRecord> {
    segment(blocks)
        .iter()
        .filter_map(|section| build_record(source_url, section))
        .collect()
}

pub fn is_excluded(heading: &str) -> bool {
    heading.contains(PROMO_MARKER) || heading == FLOP_TITLE
}

/// Fold a section's body through the field classifier from a fresh state.
pub fn reduce_section(section: &Section) -> ExtractionState {
    section
        .body
        .iter()
        .fold(ExtractionState::default(), |mut state, line| {
            state.apply(line);
            state
        })
}

/// Apply the inclusion policy to one section.
pub fn build_record(source_url: &str, section: &Section) -> Option<HookRecord> {
    if is_excluded(section.heading) {
        debug!(heading = section.heading, "Skipping promotional section");
        return None;
    }

    let state = reduce_section(section);
    if !state.has_framework() && state.hook_score.is_none() {
        debug!(heading = section.heading, "Skipping section without framework or score");
        return None;
    }

    let title = match state.title {
        Some(t) if !t.is_empty() => t,
        _ => section.heading.to_string(),
    };

    Some(HookRecord {
        source_url: source_url.to_string(),
        section_title: section.heading.to_string(),
        title,
        framework: state.framework.unwrap_or_default(),
        hook_score: state.hook_score,
        rationale: state.rationale.trim().to_string(),
    })
}

// ── Tests ──
