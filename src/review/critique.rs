//! Critique reply format and its parser
//!
//! The reviewer replies in a fixed section-delimited format:
//!
//! ```text
//! SCORE: 85
//! ISSUES:
//! - missing source for the population figure
//! SUGGESTIONS:
//! - cite the statistics tool output
//! TOOLS:
//! - web_search
//! PARAMETERS:
//! - find_by_budget was called without max
//! FEEDBACK: solid draft, needs sourcing
//! CONTINUE: yes
//! ```
//!
//! The parser is tolerant: each field falls back to a safe default when
//! missing or garbled. A malformed critique must never block answer
//! delivery.

use once_cell::sync::Lazy;

const DEFAULT_SCORE: u8 = 100;

/// Substituted when the reviewer omits `FEEDBACK:`, so the field is never
/// empty.
pub const MISSING_FEEDBACK_NOTICE: &str =
    "The reviewer did not provide written feedback for this pass.";

/// One review pass over a draft answer
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReviewOutcome {
    /// 0..=100, advisory only
    pub score: u8,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub tool_suggestions: Vec<String>,
    pub param_validation: Vec<String>,
    /// Always non-empty
    pub feedback: String,
    pub continue_improving: bool,
}

impl Default for ReviewOutcome {
    fn default() -> Self {
        Self {
            score: DEFAULT_SCORE,
            issues: Vec::new(),
            suggestions: Vec::new(),
            tool_suggestions: Vec::new(),
            param_validation: Vec::new(),
            feedback: String::new(),
            continue_improving: false,
        }
    }
}

impl ReviewOutcome {
    /// Safe outcome for a review pass that could not run at all.
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            feedback: reason.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Score,
    Issues,
    Suggestions,
    Tools,
    Parameters,
    Feedback,
    Continue,
}

static SECTION_HEADERS: Lazy<Vec<(&'static str, Section)>> = Lazy::new(|| {
    vec![
        ("SCORE:", Section::Score),
        ("ISSUES:", Section::Issues),
        ("SUGGESTIONS:", Section::Suggestions),
        ("TOOLS:", Section::Tools),
        ("PARAMETERS:", Section::Parameters),
        ("FEEDBACK:", Section::Feedback),
        ("CONTINUE:", Section::Continue),
    ]
});

/// Header match, case-insensitive; returns the section and the text after
/// the colon.
fn match_header(line: &str) -> Option<(Section, &str)> {
    let line = line.trim_start();
    for (header, section) in SECTION_HEADERS.iter() {
        match line.get(..header.len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case(header) => {
                return Some((*section, line[header.len()..].trim()));
            }
            _ => {}
        }
    }
    None
}

fn parse_score(text: &str) -> u8 {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    match digits.parse::<u32>() {
        Ok(value) => value.min(100) as u8,
        Err(_) => {
            tracing::debug!(raw = %text, "unparseable score, using default");
            DEFAULT_SCORE
        }
    }
}

fn parse_continue(text: &str) -> bool {
    let word = text.split_whitespace().next().unwrap_or("");
    if word.eq_ignore_ascii_case("yes") || word.eq_ignore_ascii_case("true") {
        true
    } else {
        if !word.is_empty() && !word.eq_ignore_ascii_case("no") && !word.eq_ignore_ascii_case("false")
        {
            tracing::debug!(raw = %text, "unrecognized continue flag, treating as stop");
        }
        false
    }
}

/// Parse a critique reply. Every field defaults on failure; `feedback` is
/// substituted when absent so it is never empty.
pub fn parse_critique(raw: &str) -> ReviewOutcome {
    let mut outcome = ReviewOutcome::default();
    let mut current: Option<Section> = None;

    for line in raw.lines() {
        if let Some((section, rest)) = match_header(line) {
            current = Some(section);
            match section {
                Section::Score => outcome.score = parse_score(rest),
                Section::Feedback => {
                    if !rest.is_empty() {
                        outcome.feedback = rest.to_string();
                    }
                }
                Section::Continue => outcome.continue_improving = parse_continue(rest),
                _ => {}
            }
            continue;
        }

        let Some(section) = current else { continue };
        let line = line.trim();
        match section {
            Section::Issues | Section::Suggestions | Section::Tools | Section::Parameters => {
                if let Some(bullet) = line.strip_prefix('-') {
                    let bullet = bullet.trim();
                    if !bullet.is_empty() {
                        let list = match section {
                            Section::Issues => &mut outcome.issues,
                            Section::Suggestions => &mut outcome.suggestions,
                            Section::Tools => &mut outcome.tool_suggestions,
                            Section::Parameters => &mut outcome.param_validation,
                            _ => unreachable!(),
                        };
                        list.push(bullet.to_string());
                    }
                }
            }
            Section::Feedback => {
                if !line.is_empty() {
                    if !outcome.feedback.is_empty() {
                        outcome.feedback.push(' ');
                    }
                    outcome.feedback.push_str(line);
                }
            }
            Section::Score | Section::Continue => {}
        }
    }

    if outcome.feedback.trim().is_empty() {
        tracing::warn!("critique carried no feedback, substituting notice");
        outcome.feedback = MISSING_FEEDBACK_NOTICE.to_string();
    }
    outcome
}
