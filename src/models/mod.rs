use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const DEFAULT_MAX_REVIEWS: usize = 5;

/// Ordered, de-duplicated review snippets for one book, capped at `max`.
#[derive(Debug, Clone)]
pub struct ReviewSet {
    snippets: Vec<String>,
    seen: HashSet<String>,
    max: usize,
}

impl ReviewSet {
    pub fn new(max: usize) -> Self {
        Self {
            snippets: Vec::new(),
            seen: HashSet::new(),
            max,
        }
    }

    /// Add a snippet unless it is a duplicate or the set is already full.
    /// Returns whether the snippet was kept.
    pub fn push(&mut self, snippet: String) -> bool {
        if self.is_full() || self.seen.contains(&snippet) {
            return false;
        }
        self.seen.insert(snippet.clone());
        self.snippets.push(snippet);
        true
    }

    pub fn is_full(&self) -> bool {
        self.snippets.len() >= self.max
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.snippets
    }

    pub fn into_vec(self) -> Vec<String> {
        self.snippets
    }
}

/// The fixed set of verdict labels the model is asked to choose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StarLabel {
    MustRead,
    WorthYourTime,
    Middling,
    OnlyForFans,
    SkipIt,
}

impl StarLabel {
    pub const ALL: [StarLabel; 5] = [
        StarLabel::MustRead,
        StarLabel::WorthYourTime,
        StarLabel::Middling,
        StarLabel::OnlyForFans,
        StarLabel::SkipIt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StarLabel::MustRead => "Must-read",
            StarLabel::WorthYourTime => "Worth your time",
            StarLabel::Middling => "Middling",
            StarLabel::OnlyForFans => "Only for fans",
            StarLabel::SkipIt => "Skip it",
        }
    }

    /// Case-insensitive lookup, ignoring surrounding whitespace.
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str().eq_ignore_ascii_case(label))
    }
}

/// Label used by the canned result when no reviews could be found.
pub const NO_RATING_LABEL: &str = "No rating";

/// Structured review summary returned to the web client.
///
/// Every field is always present. `error` and `raw_response` are operator
/// diagnostics and are only serialized when set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub book_title: String,
    pub purpose: String,
    pub verdict: String,
    pub star_rating: i64,
    pub star_label: String,
    pub likes: Vec<String>,
    pub dislikes: Vec<String>,
    pub best_for: Vec<String>,
    pub avoid_if: Vec<String>,
    pub tags: Vec<String>,
    pub analysis: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl AnalysisResult {
    /// A result with every structured field empty and only the title set.
    pub fn empty(book_title: &str) -> Self {
        Self {
            book_title: book_title.to_string(),
            ..Self::default()
        }
    }

    /// Canned answer for a title the review site knows nothing about.
    pub fn not_found(book_title: &str) -> Self {
        Self {
            purpose: "No information found.".to_string(),
            star_label: NO_RATING_LABEL.to_string(),
            analysis: "No reviews found or book not found.".to_string(),
            ..Self::empty(book_title)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub book_title: String,
}

// OpenAI-compatible chat completion wire types

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}
