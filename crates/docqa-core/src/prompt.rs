//! Grounding prompt contract and the language model abstraction.
//!
//! The synthesizer never judges answer quality itself. Instead the prompt
//! tells the model to answer only from the supplied context and to reply
//! with [`INSUFFICIENT_INFORMATION`] verbatim when the context does not
//! contain the answer.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::ScoredPassage;

/// Fixed reply when no grounding context exists or the context is
/// inadequate. Returned verbatim.
pub const INSUFFICIENT_INFORMATION: &str =
    "No tengo suficiente información para responder con certeza.";

/// A two-part chat prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Instructions plus the grounding context.
    pub system: String,
    /// The user's question.
    pub user: String,
}

/// External text generation capability.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the model identifier (e.g. `"qwen2.5:7b"`).
    fn model_name(&self) -> &str;

    /// Generate a reply conditioned on `prompt`.
    ///
    /// # Errors
    ///
    /// [`Error::Generation`](crate::error::Error::Generation) when the model
    /// cannot be reached or returns an unusable response.
    async fn generate(&self, prompt: &Prompt) -> Result<String>;
}

/// Concatenate passage texts, separated by blank lines, in rank order.
pub fn build_context(passages: &[ScoredPassage]) -> String {
    passages
        .iter()
        .map(|p| p.passage.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the grounding prompt for `question` over `passages`.
pub fn build_prompt(question: &str, passages: &[ScoredPassage]) -> Prompt {
    let system = format!(
        "You are an assistant that answers precisely and concisely.\n\
         Use only the information in the CONTEXT below. Answer in the language of the question.\n\
         If the CONTEXT does not contain the answer, reply with exactly:\n\
         {sentinel}\n\
         \n\
         CONTEXT:\n\
         {context}\n",
        sentinel = INSUFFICIENT_INFORMATION,
        context = build_context(passages),
    );
    Prompt {
        system,
        user: question.trim().to_string(),
    }
}

/// Normalize a model reply: a blank reply becomes the sentinel.
pub fn finalize_answer(reply: &str) -> String {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        INSUFFICIENT_INFORMATION.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Passage;

    fn scored(text: &str) -> ScoredPassage {
        ScoredPassage {
            passage: Passage {
                id: text.to_string(),
                text: text.to_string(),
                source: "doc.pdf".to_string(),
                page: 1,
                chunk_index: 0,
                start_char: 0,
                end_char: text.chars().count(),
            },
            score: 1.0,
        }
    }

    #[test]
    fn test_context_keeps_rank_order() {
        let ctx = build_context(&[scored("first"), scored(" second "), scored("third")]);
        assert_eq!(ctx, "first\n\nsecond\n\nthird");
    }

    #[test]
    fn test_prompt_carries_sentinel_and_context() {
        let prompt = build_prompt("  Where is the valve? ", &[scored("The valve is under the sink.")]);
        assert!(prompt.system.contains(INSUFFICIENT_INFORMATION));
        assert!(prompt.system.contains("The valve is under the sink."));
        assert!(prompt.system.contains("only the information in the CONTEXT"));
        assert_eq!(prompt.user, "Where is the valve?");
    }

    #[test]
    fn test_blank_reply_becomes_sentinel() {
        assert_eq!(finalize_answer(" \n "), INSUFFICIENT_INFORMATION);
        assert_eq!(finalize_answer(" Paris \n"), "Paris");
    }
}
