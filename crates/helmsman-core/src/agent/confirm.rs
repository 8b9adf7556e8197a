//! Confirmation replies and prompt rendering

use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::agent::{CANCEL_TRIGGER, CONFIRM_TRIGGER};
use crate::tools::ToolCall;

static AFFIRMATIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:confirm|yes|proceed|ok|okay|y)\b").unwrap());
static NEGATIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:cancel|no|stop|abort|n)\b").unwrap());
static AFFIRMATIVE_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:confirm|yes|proceed|ok|okay|y)\b").unwrap());
static NEGATIVE_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:cancel|no|not|don'?t|never|stop|abort|wait|n)\b").unwrap()
});

/// How a reply relates to an outstanding confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyIntent {
    Affirm,
    Decline,
    Unrelated,
}

/// A reply that mixes affirmative and negative words is `Unrelated`.
pub fn classify_reply(text: &str) -> ReplyIntent {
    if AFFIRMATIVE.is_match(text) && !NEGATIVE_WORD.is_match(text) {
        ReplyIntent::Affirm
    } else if NEGATIVE.is_match(text) && !AFFIRMATIVE_WORD.is_match(text) {
        ReplyIntent::Decline
    } else {
        ReplyIntent::Unrelated
    }
}

/// Plain-text confirmation prompt listing each call and the two triggers.
pub fn render_prompt(summary: &str, calls: &[ToolCall]) -> String {
    let mut out = String::new();
    if summary.is_empty() {
        out.push_str("The following changes are ready to apply:\n");
    } else {
        out.push_str(summary);
        out.push('\n');
    }
    for (i, call) in calls.iter().enumerate() {
        out.push_str(&format!("  {}. {}\n", i + 1, call.describe()));
    }
    out.push_str(&format!(
        "Reply '{}' to apply or '{}' to discard.",
        CONFIRM_TRIGGER, CANCEL_TRIGGER
    ));
    out
}
