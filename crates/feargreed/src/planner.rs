//! DOM query planner: locate the score and mood label in markup whose
//! class names and structure change without notice.
//!
//! Extraction runs an ordered list of [`Strategy`] objects per field. Each
//! strategy scans the rendered document in its own way and hands every
//! candidate text to an acceptance predicate; the first accepted candidate
//! wins. Tiers go from most precise (text inside the gauge graphic) to most
//! generic (a walk over every text node). Score and mood are planned
//! independently.

use scraper::{ElementRef, Html, Node, Selector};

use crate::types::{parse_score, MoodFamily};

/// Acceptance predicate: maps a candidate text to the value to keep.
pub type Acceptor = fn(&str) -> Option<String>;

/// Containers that hold the gauge graphic.
pub const GAUGE_CONTAINERS: &[&str] = &["svg", "[class*=\"gauge\"]", "[class*=\"Gauge\"]"];

/// Score selectors, highest priority first.
pub const SCORE_SELECTORS: &[&str] = &[
    "[class*=\"gauge-value\"]",
    "[class*=\"gauge\"] [class*=\"value\"]",
    "[class*=\"Gauge\"] [class*=\"Value\"]",
    "text[class*=\"value\"]",
    "text[class*=\"number\"]",
    "[class*=\"fear-greed\"] [class*=\"value\"]",
    "[class*=\"fear-greed\"] [class*=\"number\"]",
    "[class*=\"fear-greed\"] [class*=\"score\"]",
    "[class*=\"FearAndGreed\"] [class*=\"score\"]",
    "[class*=\"market-mood\"] [class*=\"value\"]",
    "[class*=\"market-mood\"] [class*=\"index\"]",
];

/// Mood selectors, highest priority first.
pub const MOOD_SELECTORS: &[&str] = &[
    "[class*=\"gauge\"] [class*=\"label\"]",
    "[class*=\"Gauge\"] [class*=\"Label\"]",
    "[class*=\"fear-greed\"] [class*=\"status\"]",
    "[class*=\"fear-greed\"] [class*=\"label\"]",
    "[class*=\"FearAndGreed\"] [class*=\"status\"]",
    "[class*=\"market-mood\"] [class*=\"status\"]",
];

/// Elements whose text is never page content.
const SKIPPED_TEXT_PARENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Longest text node (in words) the mood text walk considers a label.
const MAX_MOOD_WORDS: usize = 3;

/// Brackets and quotes that may open a token without being part of it.
const TOKEN_OPENERS: &[char] = &['(', '[', '{', '"', '\'', '\u{201C}', '\u{2018}'];

/// Signs that make a token negative.
const MINUS_SIGNS: &[char] = &['-', '\u{2212}'];

/// Accept an integer score in `0..=100`, returned in canonical form.
pub fn accept_score(text: &str) -> Option<String> {
    parse_score(text).map(|v| v.to_string())
}

/// Accept text mentioning a known mood, returned trimmed and lowercased.
pub fn accept_mood(text: &str) -> Option<String> {
    let lower = text.trim().to_lowercase();
    MoodFamily::classify(&lower).map(|_| lower)
}

/// Strip opening brackets and trailing punctuation from a text-walk token.
///
/// A token that is negative once its brackets are gone yields `None`, so
/// `-3` or `(\u{2212}7)` never reach the acceptor as `3` or `7`.
fn score_token(tok: &str) -> Option<&str> {
    let tok = tok.trim_start_matches(TOKEN_OPENERS);
    if tok.starts_with(MINUS_SIGNS) {
        return None;
    }
    Some(tok.trim_end_matches(|c: char| !c.is_alphanumeric()))
}

/// One way of finding a value in a rendered document.
pub trait Strategy: Send + Sync {
    /// Short identifier used in logs and [`Extraction`] diagnostics.
    fn name(&self) -> &str;

    /// First accepted value in document order, if any.
    fn try_extract(&self, doc: &Html) -> Option<String>;
}

fn parse_selectors(sources: &[&str]) -> Vec<(String, Selector)> {
    sources
        .iter()
        .filter_map(|src| match Selector::parse(src) {
            Ok(sel) => Some((src.to_string(), sel)),
            Err(e) => {
                tracing::warn!(selector = %src, "skipping unparsable selector: {e:?}");
                None
            }
        })
        .collect()
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>()
}

// ── Tier 1: text leaves inside the gauge graphic ──

/// Leaf elements (no element children) inside gauge containers.
pub struct GaugeText {
    selector: Option<Selector>,
    accept: Acceptor,
}

impl GaugeText {
    pub fn new(accept: Acceptor) -> Self {
        // `svg *, [class*="gauge"] *, ...` matches each descendant once, in
        // document order, even when containers nest.
        let group = GAUGE_CONTAINERS
            .iter()
            .map(|c| format!("{c} *"))
            .collect::<Vec<_>>()
            .join(", ");
        let selector = parse_selectors(&[group.as_str()])
            .into_iter()
            .next()
            .map(|(_, sel)| sel);
        Self { selector, accept }
    }
}

impl Strategy for GaugeText {
    fn name(&self) -> &str {
        "gauge-text"
    }

    fn try_extract(&self, doc: &Html) -> Option<String> {
        let selector = self.selector.as_ref()?;
        doc.select(selector)
            .filter(|el| el.children().all(|c| !c.value().is_element()))
            .find_map(|el| (self.accept)(&element_text(&el)))
    }
}

// ── Tier 2: prioritized attribute-substring selectors ──

/// Prioritized selector list; earlier selectors beat later ones even when
/// a later selector matches earlier in the document.
pub struct SelectorList {
    name: String,
    selectors: Vec<(String, Selector)>,
    accept: Acceptor,
}

impl SelectorList {
    pub fn new(name: impl Into<String>, selectors: &[&str], accept: Acceptor) -> Self {
        Self {
            name: name.into(),
            selectors: parse_selectors(selectors),
            accept,
        }
    }
}

impl Strategy for SelectorList {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_extract(&self, doc: &Html) -> Option<String> {
        self.selectors.iter().find_map(|(src, sel)| {
            let found = doc
                .select(sel)
                .find_map(|el| (self.accept)(&element_text(&el)));
            if let Some(value) = &found {
                tracing::debug!(selector = %src, value = %value, "selector matched");
            }
            found
        })
    }
}

// ── Tier 3: whole-document text walk ──

/// How the text walk splits text nodes into candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkUnit {
    /// Each whitespace-separated token, surrounding punctuation stripped.
    Token,
    /// Each whole text node of at most this many words.
    Phrase(usize),
}

/// Every visible text node in document order.
pub struct TextWalk {
    unit: WalkUnit,
    accept: Acceptor,
}

impl TextWalk {
    pub fn new(unit: WalkUnit, accept: Acceptor) -> Self {
        Self { unit, accept }
    }
}

impl Strategy for TextWalk {
    fn name(&self) -> &str {
        match self.unit {
            WalkUnit::Token => "text-walk-token",
            WalkUnit::Phrase(_) => "text-walk-phrase",
        }
    }

    fn try_extract(&self, doc: &Html) -> Option<String> {
        for node in doc.root_element().descendants() {
            let Node::Text(text) = node.value() else {
                continue;
            };
            let skipped = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|e| SKIPPED_TEXT_PARENTS.contains(&e.name()))
            });
            if skipped {
                continue;
            }

            let content: &str = text;
            let hit = match self.unit {
                WalkUnit::Token => content
                    .split_whitespace()
                    .filter_map(score_token)
                    .find_map(|tok| (self.accept)(tok)),
                WalkUnit::Phrase(max_words) => {
                    let words = content.split_whitespace().count();
                    if words == 0 || words > max_words {
                        None
                    } else {
                        (self.accept)(content)
                    }
                }
            };
            if hit.is_some() {
                return hit;
            }
        }
        None
    }
}

// ── Planner ──

/// Outcome of running the planner over one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub score: Option<String>,
    pub mood: Option<String>,
    /// Name of the strategy that produced `score`.
    pub score_strategy: Option<String>,
    /// Name of the strategy that produced `mood`.
    pub mood_strategy: Option<String>,
}

/// Ordered strategy lists for the score and the mood label.
pub struct QueryPlanner {
    score: Vec<Box<dyn Strategy>>,
    mood: Vec<Box<dyn Strategy>>,
}

impl Default for QueryPlanner {
    fn default() -> Self {
        Self::new(
            vec![
                Box::new(GaugeText::new(accept_score)),
                Box::new(SelectorList::new("score-selectors", SCORE_SELECTORS, accept_score)),
                Box::new(TextWalk::new(WalkUnit::Token, accept_score)),
            ],
            vec![
                Box::new(GaugeText::new(accept_mood)),
                Box::new(SelectorList::new("mood-selectors", MOOD_SELECTORS, accept_mood)),
                Box::new(TextWalk::new(WalkUnit::Phrase(MAX_MOOD_WORDS), accept_mood)),
            ],
        )
    }
}

impl QueryPlanner {
    /// Planner over custom strategy lists.
    pub fn new(score: Vec<Box<dyn Strategy>>, mood: Vec<Box<dyn Strategy>>) -> Self {
        Self { score, mood }
    }

    /// Number of score strategies, i.e. tiers tried before giving up.
    pub fn score_tiers(&self) -> usize {
        self.score.len()
    }

    /// Run both strategy lists against a parsed document.
    pub fn extract(&self, doc: &Html) -> Extraction {
        let (score, score_strategy) = run_tiers("score", &self.score, doc);
        let (mood, mood_strategy) = run_tiers("mood", &self.mood, doc);
        Extraction {
            score,
            mood,
            score_strategy,
            mood_strategy,
        }
    }

    /// Parse `html` and run [`extract`](Self::extract).
    pub fn extract_html(&self, html: &str) -> Extraction {
        self.extract(&Html::parse_document(html))
    }
}

fn run_tiers(
    field: &str,
    strategies: &[Box<dyn Strategy>],
    doc: &Html,
) -> (Option<String>, Option<String>) {
    for strategy in strategies {
        match strategy.try_extract(doc) {
            Some(value) => {
                tracing::debug!(field, strategy = strategy.name(), value = %value, "tier matched");
                return (Some(value), Some(strategy.name().to_string()));
            }
            None => tracing::debug!(field, strategy = strategy.name(), "tier found nothing"),
        }
    }
    (None, None)
}
