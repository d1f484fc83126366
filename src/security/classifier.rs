use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::{keys, SecurityConfig};
use crate::models::{ContentItem, Severity};

/// Result of classifying one content item
#[derive(Debug, Clone)]
pub struct FilterResult {
    pub passed: bool,
    pub blocked: bool,
    pub flagged: bool,
    /// Normalized violation likelihood in [0, 1]
    pub score: f64,
    /// Tags naming every check that fired
    pub reasons: Vec<String>,
    /// Human-readable hints for the author
    pub suggestions: Vec<String>,
}

impl FilterResult {
    /// Result for content that tripped nothing
    pub fn clean() -> Self {
        Self {
            passed: true,
            blocked: false,
            flagged: false,
            score: 0.0,
            reasons: Vec::new(),
            suggestions: Vec::new(),
        }
    }
}

/// What a matching custom filter does to the verdict
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterAction {
    Flag,
    Block,
}

/// An operator-defined filter evaluated alongside the built-in families
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CustomFilter {
    pub id: String,
    pub name: String,
    /// Regex source; falls back to substring matching when it fails to compile
    pub pattern: String,
    pub severity: Severity,
    pub action: FilterAction,
    pub enabled: bool,
}

impl CustomFilter {
    pub fn new(
        name: impl Into<String>,
        pattern: impl Into<String>,
        severity: Severity,
        action: FilterAction,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            pattern: pattern.into(),
            severity,
            action,
            enabled: true,
        }
    }

    fn matches(&self, text: &str) -> bool {
        match Regex::new(&self.pattern) {
            Ok(re) => re.is_match(text),
            Err(_) => text.to_lowercase().contains(&self.pattern.to_lowercase()),
        }
    }
}

/// Score contribution of a matching custom filter
pub(crate) fn severity_weight(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 1.0,
        Severity::High => 0.8,
        Severity::Medium => 0.5,
        Severity::Low => 0.2,
    }
}

/// Per-user activity signals supplied by the caller
///
/// The engine does not aggregate these itself; the posting layer computes
/// them from its own counters and passes a snapshot in.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct UserBehaviorSnapshot {
    pub posts_per_minute: f64,
    pub repetitive_content_ratio: f64,
    /// Precomputed spam likelihood for this user in [0, 1]
    pub spam_score: f64,
}

// Pattern families, compiled once at startup

static SPAM_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(buy now|order now|act fast|limited time offer)\b",
        r"(?i)\b(100% guaranteed|risk free|no strings attached)\b",
        r"(?i)\b(make money fast|free money|get rich quick)\b",
        r"(?i)\bearn \$?\d+\s*(per|a)\s*(day|week|hour)\b",
        r"(?i)\b(click here|click the link|visit my profile)\b",
        r"(?i)\b(congratulations.{0,30}(won|winner)|claim your prize)\b",
        r"(?i)\b(crypto|forex|bitcoin)\s+(signals|doubling|giveaway)\b",
        r"(?i)\b(work from home|be your own boss)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static HARASSMENT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(kill yourself|kys|go die)\b",
        r"(?i)\bnobody (likes|wants) you\b",
        r"(?i)\byou('re| are) (a |an )?(idiot|loser|worthless|pathetic|trash)\b",
        r"(?i)\bi('ll| will) (find|hurt|get) you\b",
        r"(?i)\b(shut up|get lost) (forever|loser)\b",
        r"(?i)\bwatch your back\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static INAPPROPRIATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(explicit|uncensored) (photos|videos|content)\b",
        r"(?i)\b(nude|nudes|nsfw)\b",
        r"(?i)\bonlyfans\.com\b",
        r"(?i)\b(hot singles|adult dating) in your area\b",
        r"(?i)\b(escort|cam girl) services?\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static FAKE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(doctors|banks) hate (him|her|this)\b",
        r"(?i)\byou won'?t believe\b",
        r"(?i)\bshocking (truth|secret|discovery)\b",
        r"(?i)\bthis one (weird|simple) trick\b",
        r"(?i)\b(official|verified) (support|account).{0,30}(password|verify)\b",
        r"(?i)\bbreaking:.{0,40}(exposed|leaked)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static URL_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s]+|www\.[^\s]+").unwrap());

// Known URL shorteners; links behind these hide their destination
static SHORTENER_DOMAINS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "bit.ly", "tinyurl.com", "goo.gl", "rebrand.ly", "ow.ly", "t.me", "j.mp", "adf.ly",
        "lnk.co", "short.link", "cutt.ly", "is.gd",
    ]
    .into_iter()
    .collect()
});

// File extensions that should never appear as "images"
const EXECUTABLE_EXTENSIONS: &[&str] = &[
    ".exe", ".bat", ".cmd", ".scr", ".msi", ".apk", ".jar", ".ps1", ".sh",
];

/// Penalty added when the link count exceeds the configured maximum
const LINK_PENALTY: f64 = 0.3;
/// Penalty added for shouting-case text
const CAPS_PENALTY: f64 = 0.2;
/// Caps penalty only applies to text longer than this
const CAPS_MIN_LEN: usize = 10;

/// Thresholds consulted by the classifier, sourced from SecurityConfig
#[derive(Clone, Debug)]
pub struct ClassifierThresholds {
    pub block_score: f64,
    pub flag_score: f64,
    pub max_links: usize,
    pub caps_ratio: f64,
    pub repetition_ratio: f64,
    pub max_images: usize,
    pub max_posts_per_minute: f64,
    pub behavior_repetition_ratio: f64,
    pub behavior_spam_score: f64,
}

impl ClassifierThresholds {
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self {
            block_score: config.get_f64(keys::CLASSIFIER_BLOCK_SCORE, 0.7),
            flag_score: config.get_f64(keys::CLASSIFIER_FLAG_SCORE, 0.4),
            max_links: config.get_u64(keys::CLASSIFIER_MAX_LINKS, 3) as usize,
            caps_ratio: config.get_f64(keys::CLASSIFIER_CAPS_RATIO, 0.7),
            repetition_ratio: config.get_f64(keys::CLASSIFIER_REPETITION_RATIO, 0.5),
            max_images: config.get_u64(keys::CLASSIFIER_MAX_IMAGES, 10) as usize,
            max_posts_per_minute: config.get_f64(keys::BEHAVIOR_MAX_POSTS_PER_MINUTE, 5.0),
            behavior_repetition_ratio: config.get_f64(keys::BEHAVIOR_REPETITION_RATIO, 0.8),
            behavior_spam_score: config.get_f64(keys::BEHAVIOR_SPAM_SCORE, 0.7),
        }
    }
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self::from_config(&SecurityConfig::new())
    }
}

/// Accumulator shared by the text, image and behavior checks
#[derive(Default)]
struct CheckOutcome {
    total_score: f64,
    families: u32,
    reasons: Vec<String>,
    suggestions: Vec<String>,
    hard_block: bool,
}

impl CheckOutcome {
    fn push_reason(&mut self, reason: &str) {
        if !self.reasons.iter().any(|r| r == reason) {
            self.reasons.push(reason.to_string());
        }
    }

    fn push_suggestion(&mut self, suggestion: &str) {
        if !self.suggestions.iter().any(|s| s == suggestion) {
            self.suggestions.push(suggestion.to_string());
        }
    }
}

/// Pure content classifier
///
/// No side effects: the verdict is a function of the item, the enabled
/// custom filters and the configured thresholds. Malformed or empty input
/// never errors; it degrades to a clean result.
#[derive(Clone, Debug, Default)]
pub struct PatternClassifier {
    thresholds: ClassifierThresholds,
    custom_filters: Vec<CustomFilter>,
}

impl PatternClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self {
            thresholds: ClassifierThresholds::from_config(config),
            custom_filters: Vec::new(),
        }
    }

    pub fn with_thresholds(thresholds: ClassifierThresholds) -> Self {
        Self {
            thresholds,
            custom_filters: Vec::new(),
        }
    }

    /// Replace the custom filter set
    pub fn set_custom_filters(&mut self, filters: Vec<CustomFilter>) {
        self.custom_filters = filters;
    }

    /// Classify a content item without behavior signals
    pub fn classify(&self, item: &ContentItem) -> FilterResult {
        self.classify_with_behavior(item, None)
    }

    /// Classify a content item, folding in the user's activity snapshot
    pub fn classify_with_behavior(
        &self,
        item: &ContentItem,
        behavior: Option<&UserBehaviorSnapshot>,
    ) -> FilterResult {
        let mut outcome = CheckOutcome::default();

        self.check_text(item.text.as_deref().unwrap_or(""), &mut outcome);
        self.check_images(&item.image_urls, &mut outcome);
        if let Some(snapshot) = behavior {
            self.check_behavior(snapshot, &mut outcome);
        }

        self.finish(outcome)
    }

    /// Classify bare text
    pub fn classify_text(&self, text: &str) -> FilterResult {
        let mut outcome = CheckOutcome::default();
        self.check_text(text, &mut outcome);
        self.finish(outcome)
    }

    fn finish(&self, outcome: CheckOutcome) -> FilterResult {
        // Mean over the families that contributed; penalty terms only raise
        // the numerator
        let divisor = outcome.families.max(1) as f64;
        let score = (outcome.total_score / divisor).clamp(0.0, 1.0);

        let blocked = outcome.hard_block || score > self.thresholds.block_score;
        let flagged = !blocked && (score > self.thresholds.flag_score || !outcome.reasons.is_empty());

        FilterResult {
            passed: !blocked,
            blocked,
            flagged,
            score,
            reasons: outcome.reasons,
            suggestions: outcome.suggestions,
        }
    }

    fn check_text(&self, text: &str, outcome: &mut CheckOutcome) {
        if text.trim().is_empty() {
            return;
        }

        let families: [(&str, &Lazy<Vec<Regex>>, &str); 4] = [
            ("spam", &SPAM_PATTERNS, "Remove promotional language"),
            ("harassment", &HARASSMENT_PATTERNS, "Remove hostile language aimed at other users"),
            ("inappropriate", &INAPPROPRIATE_PATTERNS, "Remove adult or explicit references"),
            ("fake_content", &FAKE_PATTERNS, "Remove misleading claims"),
        ];

        for (name, patterns, suggestion) in families {
            let matched = patterns.iter().filter(|re| re.is_match(text)).count();
            if matched > 0 {
                outcome.total_score += matched as f64 / patterns.len() as f64;
                outcome.families += 1;
                outcome.push_reason(name);
                outcome.push_suggestion(suggestion);
            }
        }

        // Repetition scores as its own family, with the ratio as its score
        let repetition = word_repetition_ratio(text);
        if repetition > self.thresholds.repetition_ratio {
            outcome.total_score += repetition;
            outcome.families += 1;
            outcome.push_reason("repetitive_content");
            outcome.push_suggestion("Vary the wording instead of repeating it");
        }

        for filter in self.custom_filters.iter().filter(|f| f.enabled) {
            if filter.matches(text) {
                outcome.total_score += severity_weight(filter.severity);
                outcome.families += 1;
                outcome.push_reason(&format!("custom:{}", filter.name));
                if filter.action == FilterAction::Block {
                    // A blocking filter overrides the numeric thresholds
                    outcome.hard_block = true;
                }
            }
        }

        let link_count = URL_REGEX.find_iter(text).count();
        if link_count > self.thresholds.max_links {
            outcome.total_score += LINK_PENALTY;
            outcome.push_reason("excessive_links");
            outcome.push_suggestion("Reduce the number of links");
        }

        if text.chars().count() > CAPS_MIN_LEN && caps_ratio(text) > self.thresholds.caps_ratio {
            outcome.total_score += CAPS_PENALTY;
            outcome.push_reason("excessive_caps");
            outcome.push_suggestion("Avoid writing in all caps");
        }
    }

    fn check_images(&self, urls: &[String], outcome: &mut CheckOutcome) {
        if urls.is_empty() {
            return;
        }

        if urls.len() > self.thresholds.max_images {
            outcome.push_reason("too_many_images");
            outcome.push_suggestion("Attach fewer images");
        }

        for url in urls {
            let lower = url.to_lowercase();
            if SHORTENER_DOMAINS.iter().any(|d| lower.contains(d)) {
                outcome.push_reason("shortened_links");
                outcome.push_suggestion("Link to the destination directly");
            }
            if EXECUTABLE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
                outcome.push_reason("executable_attachment");
                outcome.hard_block = true;
            }
        }

        outcome.total_score += image_content_score(urls);
    }

    fn check_behavior(&self, snapshot: &UserBehaviorSnapshot, outcome: &mut CheckOutcome) {
        if snapshot.posts_per_minute > self.thresholds.max_posts_per_minute {
            outcome.push_reason("posting_rate");
            outcome.push_suggestion("Slow down between posts");
        }
        if snapshot.repetitive_content_ratio > self.thresholds.behavior_repetition_ratio {
            outcome.push_reason("repetitive_behavior");
        }
        if snapshot.spam_score > self.thresholds.behavior_spam_score {
            outcome.push_reason("spam_behavior");
            outcome.hard_block = true;
        }

        outcome.total_score += behavior_model_score(snapshot);
    }
}

/// Visual content scoring is unimplemented; always returns 0.
pub fn image_content_score(_urls: &[String]) -> f64 {
    0.0
}

/// Deep behavior-model scoring is unimplemented; always returns 0.
pub fn behavior_model_score(_snapshot: &UserBehaviorSnapshot) -> f64 {
    0.0
}

/// Share of words that repeat earlier words, in [0, 1]
fn word_repetition_ratio(text: &str) -> f64 {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    if words.len() < 2 {
        return 0.0;
    }

    let unique: HashSet<&String> = words.iter().collect();
    1.0 - unique.len() as f64 / words.len() as f64
}

/// Uppercase share of the alphabetic characters
fn caps_ratio(text: &str) -> f64 {
    let letter_count = text.chars().filter(|c| c.is_alphabetic()).count();
    if letter_count == 0 {
        return 0.0;
    }

    let caps_count = text.chars().filter(|c| c.is_uppercase()).count();
    caps_count as f64 / letter_count as f64
}
