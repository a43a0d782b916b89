use std::sync::LazyLock;

use regex::Regex;

static SCORE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[+-]?[0-9]+").unwrap());

const TITLE: &str = "Title:";
const FRAMEWORK: &str = "Framework:";
const HOOK_SCORE: &str = "hook score";
const RATIONALE_OPENERS: &[&str] = &["Why this works:", "Why this flopped:"];
const RATIONALE_CLOSER: &str = "How you can use";
const RATIONALE_SKIPS: &[&str] = &["Examples of", "TLDR:"];

/// Fields gathered while walking one section's body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionState {
    pub title: Option<String>,
    pub framework: Option<String>,
    pub hook_score: Option<String>,
    pub rationale: String,
    pub collecting: bool,
}

impl ExtractionState {
    /// Advance the state by one body line.
    ///
    /// The title, framework and score checks run on every line. The
    /// rationale checks form a single chain: an opener restarts the
    /// rationale, otherwise a running rationale is closed, skips the line,
    /// or appends it.
    pub fn apply(&mut self, line: &str) {
        let text = line.trim();

        if let Some(rest) = strip_prefix_ignore_case(text, TITLE) {
            self.title = Some(rest.trim().to_string());
        }

        if let Some(rest) = strip_prefix_ignore_case(text, FRAMEWORK) {
            self.framework = Some(rest.trim().to_string());
        }

        if self.hook_score.is_none() && mentions_hook_score(text) {
            self.hook_score = SCORE_RE.find(text).map(|m| m.as_str().to_string());
        }

        if let Some(rest) = RATIONALE_OPENERS.iter().find_map(|p| text.strip_prefix(p)) {
            self.collecting = true;
            self.rationale = rest.trim().to_string();
        } else if self.collecting {
            if text.starts_with(RATIONALE_CLOSER) {
                self.collecting = false;
            } else if !text.is_empty() && !RATIONALE_SKIPS.iter().any(|p| text.starts_with(p)) {
                self.rationale.push(' ');
                self.rationale.push_str(text);
            }
        }
    }

    pub fn has_framework(&self) -> bool {
        self.framework.as_deref().is_some_and(|f| !f.is_empty())
    }
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

fn mentions_hook_score(text: &str) -> bool {
    text.to_ascii_lowercase().contains(HOOK_SCORE)
}
