//! Retrieval-augmented answering over a built index.
//!
//! Retrieve the `top_k` chunks nearest the question, join their text into
//! a context block, render the prompt and hand it to the generative model
//! under a timeout. The chunks that made up the context come back as
//! [`CitedSource`]s alongside the answer text.

use std::time::Duration;

use crate::embedding::EmbeddingProvider;
use crate::error::{CompanionError, Result};
use crate::index::VectorIndex;
use crate::llm::GenerativeModel;
use crate::models::{Answer, CitedSource, ScoredChunk};
use crate::prompt::{join_context, PromptTemplate};

#[derive(Debug, Clone)]
pub struct AnswerComposer {
    top_k: usize,
    template: PromptTemplate,
    timeout: Duration,
}

impl AnswerComposer {
    pub fn new(top_k: usize, timeout: Duration) -> Self {
        Self {
            top_k,
            template: PromptTemplate::default(),
            timeout,
        }
    }

    #[must_use]
    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieval half of [`answer`](Self::answer): the chunks the model will see.
    pub async fn retrieve(
        &self,
        index: &VectorIndex,
        question: &str,
        provider: &dyn EmbeddingProvider,
    ) -> Result<Vec<ScoredChunk>> {
        let question = validate_question(question)?;
        index.query(question, self.top_k, provider).await
    }

    /// Generation half: render the prompt over `retrieved` and ask `model`.
    pub async fn compose(
        &self,
        question: &str,
        retrieved: Vec<ScoredChunk>,
        model: &dyn GenerativeModel,
    ) -> Result<Answer> {
        let question = validate_question(question)?;
        let context = join_context(retrieved.iter().map(|s| s.chunk.text.as_str()));
        let prompt = self.template.render(&context, question);

        tracing::debug!(
            model = model.name(),
            chunks = retrieved.len(),
            prompt_chars = prompt.len(),
            "generating answer"
        );

        let text = tokio::time::timeout(self.timeout, model.generate(&prompt))
            .await
            .map_err(|_| CompanionError::Timeout {
                provider: model.name().to_string(),
                secs: self.timeout.as_secs(),
            })??;

        let cited_sources = retrieved
            .into_iter()
            .map(|s| CitedSource {
                chunk_id: s.id,
                source_path: s.chunk.source_path,
                offset: s.chunk.offset,
                length: s.chunk.length,
                score: s.score,
            })
            .collect();

        Ok(Answer {
            text,
            cited_sources,
        })
    }

    /// Answer `question` from `index`.
    pub async fn answer(
        &self,
        index: &VectorIndex,
        question: &str,
        provider: &dyn EmbeddingProvider,
        model: &dyn GenerativeModel,
    ) -> Result<Answer> {
        let retrieved = self.retrieve(index, question, provider).await?;
        self.compose(question, retrieved, model).await
    }
}

fn validate_question(question: &str) -> Result<&str> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(CompanionError::InvalidRequest(
            "question must not be empty".into(),
        ));
    }
    Ok(trimmed)
}
