//! Q&A assistant: the review table plus a question, answered by a hosted model

use crate::platform::{Platform, PlatformError};
use crate::reviews::{QueryError, ReviewStore};
use crate::AssistantConfig;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Instructions placed ahead of the data and the question
pub const PROMPT_PREAMBLE: &str = "You are a helpful AI chat assistant. Answer the user's question based on the provided
context data from customer reviews provided below.

Use the data in the context section to inform your answer about customer reviews or sentiments
if the question relates to it. If the question is general and not answerable from the context, answer naturally. Do not explicitly mention \"based on the context\" unless necessary for clarity.";

/// Errors from the assistant panel
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("Question is empty")]
    EmptyQuestion,

    #[error("Could not load review data: {0}")]
    Data(#[from] QueryError),

    #[error("Prompt of {chars} characters exceeds the limit of {limit}")]
    PromptTooLarge { chars: usize, limit: usize },

    #[error("Completion service is rate limiting requests")]
    RateLimited,

    #[error("Completion timed out")]
    Timeout,

    #[error("Malformed completion response: {0}")]
    Malformed(String),

    #[error("Completion failed: {0}")]
    Platform(PlatformError),
}

impl From<PlatformError> for CompletionError {
    fn from(err: PlatformError) -> Self {
        if err.is_timeout() {
            return CompletionError::Timeout;
        }
        match err {
            PlatformError::RateLimited => CompletionError::RateLimited,
            PlatformError::MalformedResponse(msg) => CompletionError::Malformed(msg),
            other => CompletionError::Platform(other),
        }
    }
}

/// Fill the template: preamble, then the data, then the question
pub fn build_prompt(data_text: &str, question: &str) -> String {
    format!("{}\n\n{}\n\n{}\n", PROMPT_PREAMBLE, data_text, question)
}

/// Characters the template adds around the data and the question
fn template_overhead() -> usize {
    build_prompt("", "").chars().count()
}

/// Answer returned to the page
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub model: String,
    /// Trailing rows left out of the prompt to stay within budget
    pub omitted_rows: usize,
    pub prompt_chars: usize,
}

/// Q&A over the shared review snapshot
pub struct Assistant {
    platform: Arc<dyn Platform>,
    reviews: Arc<ReviewStore>,
    model: String,
    max_prompt_chars: usize,
}

impl Assistant {
    pub fn new(
        platform: Arc<dyn Platform>,
        reviews: Arc<ReviewStore>,
        config: &AssistantConfig,
    ) -> Self {
        Self {
            platform,
            reviews,
            model: config.model.clone(),
            max_prompt_chars: config.max_prompt_chars,
        }
    }

    /// Build the bounded prompt for a question
    pub async fn prepare(&self, question: &str) -> Result<(String, usize), CompletionError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(CompletionError::EmptyQuestion);
        }

        let table = self.reviews.load_reviews().await?;
        let data_budget = self
            .max_prompt_chars
            .saturating_sub(template_overhead() + question.chars().count());
        let rendered = table.to_text_within(data_budget);

        if rendered.omitted_rows > 0 {
            warn!(
                omitted_rows = rendered.omitted_rows,
                total_rows = table.len(),
                limit = self.max_prompt_chars,
                "Review data truncated to fit the prompt budget"
            );
        }

        let prompt = build_prompt(&rendered.text, question);
        let chars = prompt.chars().count();
        if chars > self.max_prompt_chars {
            return Err(CompletionError::PromptTooLarge {
                chars,
                limit: self.max_prompt_chars,
            });
        }

        Ok((prompt, rendered.omitted_rows))
    }

    /// Ask a question; the model's text comes back verbatim
    pub async fn ask(&self, question: &str) -> Result<Answer, CompletionError> {
        let (prompt, omitted_rows) = self.prepare(question).await?;
        let prompt_chars = prompt.chars().count();

        info!(model = %self.model, prompt_chars, "Requesting completion");
        let text = self.platform.run_completion(&self.model, &prompt).await?;

        Ok(Answer {
            text,
            model: self.model.clone(),
            omitted_rows,
            prompt_chars,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::FakePlatform;
    use crate::table::tests::review_result;
    use crate::ReviewsConfig;

    fn assistant(platform: Arc<FakePlatform>, max_prompt_chars: usize) -> Assistant {
        let reviews = Arc::new(ReviewStore::new(platform.clone(), &ReviewsConfig::default()));
        Assistant::new(
            platform,
            reviews,
            &AssistantConfig {
                model: "claude-3-5-sonnet".to_string(),
                max_prompt_chars,
            },
        )
    }

    #[test]
    fn test_build_prompt_contains_inputs_verbatim() {
        let data = "   PRODUCT\n0  Skis";
        let question = "Which product has the worst reviews?";
        let prompt = build_prompt(data, question);

        assert!(prompt.contains(data));
        assert!(prompt.contains(question));
        assert_eq!(
            prompt,
            format!("{}\n\n{}\n\n{}\n", PROMPT_PREAMBLE, data, question)
        );
        assert_eq!(
            prompt.replacen(data, "", 1).replacen(question, "", 1),
            build_prompt("", "")
        );
    }

    #[tokio::test]
    async fn test_ask_sends_full_table_and_returns_text() {
        let platform = Arc::new(
            FakePlatform::new()
                .with_table(review_result(&[
                    ("Skis", "Delivered", Some("0.123456789012")),
                    ("Boots", "Late", Some("-0.5")),
                ]))
                .with_completion(|model, prompt| {
                    assert_eq!(model, "claude-3-5-sonnet");
                    assert!(prompt.contains("0.123456789012"));
                    assert!(prompt.contains("Boots"));
                    assert!(prompt.ends_with("How are the boots doing?\n"));
                    Ok("  Boots reviews are negative.\n".to_string())
                }),
        );

        let answer = assistant(platform.clone(), 100_000)
            .ask("How are the boots doing?")
            .await
            .unwrap();
        assert_eq!(answer.text, "  Boots reviews are negative.\n");
        assert_eq!(answer.omitted_rows, 0);
        assert_eq!(platform.table_queries(), 1);
    }

    #[tokio::test]
    async fn test_empty_question_is_rejected() {
        let platform = Arc::new(FakePlatform::new());
        let err = assistant(platform.clone(), 100_000).ask("  ").await.unwrap_err();
        assert!(matches!(err, CompletionError::EmptyQuestion));
        assert!(platform.queries().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_data_is_truncated_to_budget() {
        let rows: Vec<(&str, &str, Option<&str>)> =
            (0..200).map(|_| ("Skis", "Delivered", Some("0.5"))).collect();
        let platform = Arc::new(
            FakePlatform::new()
                .with_table(review_result(&rows))
                .with_completion(|_, prompt| Ok(prompt.chars().count().to_string())),
        );

        let limit = 4_000;
        let answer = assistant(platform, limit).ask("Summarize").await.unwrap();
        assert!(answer.omitted_rows > 0);
        assert!(answer.prompt_chars <= limit);
        assert_eq!(answer.text, answer.prompt_chars.to_string());
    }

    #[tokio::test]
    async fn test_budget_too_small_for_template() {
        let platform = Arc::new(
            FakePlatform::new().with_table(review_result(&[("Skis", "Delivered", Some("0.5"))])),
        );
        let err = assistant(platform.clone(), 50).ask("Summarize").await.unwrap_err();
        assert!(matches!(err, CompletionError::PromptTooLarge { limit: 50, .. }));
        assert_eq!(platform.queries().len(), 1); // data load only, no completion
    }

    #[tokio::test]
    async fn test_platform_errors_are_classified() {
        let platform = Arc::new(
            FakePlatform::new()
                .with_table(review_result(&[("Skis", "Delivered", Some("0.5"))]))
                .with_completion(|_, _| Err(PlatformError::RateLimited)),
        );
        let err = assistant(platform, 100_000).ask("Why?").await.unwrap_err();
        assert!(matches!(err, CompletionError::RateLimited));

        assert!(matches!(
            CompletionError::from(PlatformError::Timeout),
            CompletionError::Timeout
        ));
        assert!(matches!(
            CompletionError::from(PlatformError::Api {
                code: "100".to_string(),
                message: "bad".to_string()
            }),
            CompletionError::Platform(_)
        ));
    }

    #[tokio::test]
    async fn test_data_load_failure_is_reported() {
        let platform = Arc::new(FakePlatform::new().with_query(|_| Err(PlatformError::Timeout)));
        let err = assistant(platform, 100_000).ask("Why?").await.unwrap_err();
        assert!(matches!(err, CompletionError::Data(_)));
    }
}
