//! Answer synthesis: retrieved passages plus a question in, answer text out.

use std::sync::Arc;
use std::time::Duration;

use docqa_core::models::ScoredPassage;
use docqa_core::prompt::{build_prompt, finalize_answer, Generator, INSUFFICIENT_INFORMATION};
use docqa_core::{Error, Result};

pub struct Synthesizer {
    generator: Arc<dyn Generator>,
    timeout: Duration,
}

impl Synthesizer {
    pub fn new(generator: Arc<dyn Generator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    pub fn model_name(&self) -> &str {
        self.generator.model_name()
    }

    /// Answer `question` from `passages`.
    ///
    /// With no passages the model is not consulted and the answer is
    /// exactly [`INSUFFICIENT_INFORMATION`]. A blank model reply is
    /// reported the same way.
    ///
    /// # Errors
    ///
    /// [`Error::SynthesisTimeout`] when the model does not answer within
    /// the configured timeout; [`Error::Generation`] for transport failures.
    pub async fn answer(&self, question: &str, passages: &[ScoredPassage]) -> Result<String> {
        if passages.is_empty() {
            return Ok(INSUFFICIENT_INFORMATION.to_string());
        }

        let prompt = build_prompt(question, passages);
        let reply = tokio::time::timeout(self.timeout, self.generator.generate(&prompt))
            .await
            .map_err(|_| Error::SynthesisTimeout(self.timeout))??;

        Ok(finalize_answer(&reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docqa_core::models::Passage;
    use docqa_core::prompt::Prompt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        reply: String,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(reply: &str, delay: Duration) -> Self {
            Self {
                reply: reply.to_string(),
                delay,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Generator for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _prompt: &Prompt) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(self.reply.clone())
        }
    }

    fn passage(text: &str) -> ScoredPassage {
        ScoredPassage {
            passage: Passage {
                id: "p".to_string(),
                text: text.to_string(),
                source: "doc.pdf".to_string(),
                page: 1,
                chunk_index: 0,
                start_char: 0,
                end_char: text.len(),
            },
            score: 0.9,
        }
    }

    #[tokio::test]
    async fn test_no_passages_skips_model() {
        let generator = Arc::new(Scripted::new("should not be used", Duration::ZERO));
        let synth = Synthesizer::new(generator.clone(), Duration::from_secs(5));
        let answer = synth.answer("anything?", &[]).await.unwrap();
        assert_eq!(answer, INSUFFICIENT_INFORMATION);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reply_is_trimmed() {
        let generator = Arc::new(Scripted::new("  Paris.\n", Duration::ZERO));
        let synth = Synthesizer::new(generator, Duration::from_secs(5));
        let answer = synth
            .answer("Capital of France?", &[passage("Paris is the capital of France.")])
            .await
            .unwrap();
        assert_eq!(answer, "Paris.");
    }

    #[tokio::test]
    async fn test_blank_reply_becomes_sentinel() {
        let generator = Arc::new(Scripted::new("   ", Duration::ZERO));
        let synth = Synthesizer::new(generator, Duration::from_secs(5));
        let answer = synth.answer("q", &[passage("ctx")]).await.unwrap();
        assert_eq!(answer, INSUFFICIENT_INFORMATION);
    }

    #[tokio::test]
    async fn test_slow_model_times_out() {
        let generator = Arc::new(Scripted::new("late", Duration::from_secs(10)));
        let synth = Synthesizer::new(generator, Duration::from_millis(50));
        let err = synth.answer("q", &[passage("ctx")]).await.unwrap_err();
        assert!(matches!(err, Error::SynthesisTimeout(d) if d == Duration::from_millis(50)));
    }
}
