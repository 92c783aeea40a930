//! The instruction template that grounds the model in retrieved code.

/// A preamble followed by labelled context and question slots.
///
/// Rendering is a pure function of the template, the context and the
/// question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub preamble: String,
    pub context_slot: String,
    pub question_slot: String,
    pub answer_cue: String,
}

const DEFAULT_PREAMBLE: &str = "You are an expert programming assistant. \
Use the following pieces of context from a codebase to answer the user's question. \
Your goal is to provide a helpful and accurate summary or explanation based ONLY on the provided code context. \
If you don't know the answer from the context, just say that you don't have enough information from the codebase to answer. \
Do not try to make up an answer or use external knowledge.";

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            preamble: DEFAULT_PREAMBLE.to_string(),
            context_slot: "Context:".to_string(),
            question_slot: "User Question:".to_string(),
            answer_cue: "Helpful Answer:".to_string(),
        }
    }
}

impl PromptTemplate {
    pub fn render(&self, context: &str, question: &str) -> String {
        format!(
            "{}\n\n{}\n{}\n\n{} {}\n{}",
            self.preamble,
            self.context_slot,
            context,
            self.question_slot,
            question,
            self.answer_cue
        )
    }
}

/// Join chunk texts into a single context block, one blank line apart.
pub fn join_context<'a>(texts: impl IntoIterator<Item = &'a str>) -> String {
    texts.into_iter().collect::<Vec<_>>().join("\n\n")
}
