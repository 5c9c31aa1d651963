use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::llm::{CompletionService, LlmError};
use super::normalizer::normalize;
use super::reviews::ReviewExtractor;
use crate::models::AnalysisResult;

pub const NO_LLM_OUTPUT: &str = "No LLM output";

/// Bounded retry around the completion call. Attempts = 1 + `max_retries`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Review extraction, completion and normalization for one title per call.
pub struct Analyzer {
    extractor: ReviewExtractor,
    llm: Arc<dyn CompletionService>,
    retry: RetryPolicy,
    max_reviews: usize,
}

impl Analyzer {
    pub fn new(
        extractor: ReviewExtractor,
        llm: Arc<dyn CompletionService>,
        retry: RetryPolicy,
        max_reviews: usize,
    ) -> Self {
        Self {
            extractor,
            llm,
            retry,
            max_reviews,
        }
    }

    pub async fn analyze(&self, book_title: &str) -> AnalysisResult {
        let book_title = book_title.trim();
        if book_title.is_empty() {
            return AnalysisResult::not_found(book_title);
        }

        let reviews = self.extractor.extract(book_title, self.max_reviews).await;
        if reviews.is_empty() {
            info!(book_title = %book_title, "No reviews found");
            return AnalysisResult::not_found(book_title);
        }

        let prompt = build_prompt(book_title, reviews.as_slice());
        match self.complete_with_retry(&prompt).await {
            Ok(raw) => normalize(&raw, book_title),
            Err(e) => completion_failure(book_title, &e),
        }
    }

    async fn complete_with_retry(&self, prompt: &str) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.llm.complete(prompt).await {
                Ok(raw) => return Ok(raw),
                Err(e) if attempt <= self.retry.max_retries => {
                    warn!(attempt, error = %e, "Completion failed, retrying");
                    tokio::time::sleep(self.retry.backoff).await;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Completion failed, giving up");
                    return Err(e);
                }
            }
        }
    }
}

fn completion_failure(book_title: &str, error: &LlmError) -> AnalysisResult {
    AnalysisResult {
        analysis: NO_LLM_OUTPUT.to_string(),
        error: Some(error.to_string()),
        raw_response: error.raw_body().map(str::to_string),
        ..AnalysisResult::empty(book_title)
    }
}

pub fn build_prompt(book_title: &str, reviews: &[String]) -> String {
    format!(
        r#"You are an expert, honest book reviewer. Analyze the following real reader reviews of "{book_title}" and return a concise, structured JSON object with exactly these fields:
- book_title (string)
- purpose (string, 1-sentence summary of the book's main aim)
- verdict (string, your truthfully enthusiastic or cautious recommendation)
- star_rating (integer 1-20: rate the book for its intended audience, no fractions)
- star_label (string, one of: Must-read / Worth your time / Middling / Only for fans / Skip it)
- likes (list, up to 5 punchy bullets)
- dislikes (list, up to 5 punchy bullets)
- best_for (list, 1-3 ideal audience types)
- avoid_if (list, 1-3 types who probably won't like it)
- tags (list: writing level, practicality, scientific rigor)
- analysis (string, fallback prose summary paragraph)
Return only valid JSON.

Here are live user reviews:
{}"#,
        reviews.join("\n")
    )
}
