mod persona;
mod provider;

pub use persona::{GeneralAssistant, InterviewAssistant, Persona};
pub use provider::{ChatError, ChatMessage, ChatParams, ChatProvider, ChatRole, OpenAiChat};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::config::RagConfig;
use crate::error::{RagError, RagResult};
use crate::models::{GeneratedAnswer, RetrievalResult, SourceSummary};

/// Safe fallback text returned when the chat provider fails outright.
pub const FALLBACK_ANSWER: &str =
    "There was an error generating a response. Please try again in a moment.";

const PREVIEW_CHARS: usize = 120;
const MINUTE: Duration = Duration::from_secs(60);

/// Instruction template applied by `generate_summary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStyle {
    Concise,
    Detailed,
    Bullet,
}

struct MinuteWindow {
    window_start: Instant,
    count: usize,
}

/// Synthesizes grounded answers from a query and retrieved chunks via a
/// pluggable chat-completion provider, scoring its own confidence.
/// Provider failures are converted to a fallback answer, never raised.
pub struct Generator {
    provider: Arc<dyn ChatProvider>,
    window: Mutex<MinuteWindow>,
    calls_per_minute: usize,
    context_limit: usize,
    answer_params: ChatParams,
    summary_temperature: f32,
    degraded_confidence: f32,
}

impl Generator {
    pub fn new(config: &RagConfig, provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            window: Mutex::new(MinuteWindow {
                window_start: Instant::now(),
                count: 0,
            }),
            calls_per_minute: config.generation_calls_per_minute.max(1),
            context_limit: config.context_chunk_limit.max(1),
            answer_params: ChatParams {
                max_tokens: config.max_answer_tokens,
                temperature: config.answer_temperature,
            },
            summary_temperature: config.summary_temperature,
            degraded_confidence: config.degraded_confidence,
            provider,
        }
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Per-minute call counter: once the ceiling is reached, sleep out the
    /// remainder of the window, then contend for a slot again. Waking from
    /// the sleep never admits by itself; concurrent waiters all go back
    /// through the counting branch.
    async fn throttle(&self) {
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();

                if now.duration_since(window.window_start) >= MINUTE {
                    window.window_start = now;
                    window.count = 0;
                }

                if window.count < self.calls_per_minute {
                    window.count += 1;
                    None
                } else {
                    Some(MINUTE.saturating_sub(now.duration_since(window.window_start)))
                }
            };

            match wait {
                None => return,
                Some(delay) => {
                    debug!("Generation rate limit reached, waiting {:?}", delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Generate a grounded answer from the query and retrieved context.
    pub async fn generate_answer(
        &self,
        query: &str,
        context_chunks: &[RetrievalResult],
        persona: &dyn Persona,
    ) -> GeneratedAnswer {
        let mut ranked: Vec<&RetrievalResult> = context_chunks.iter().collect();
        ranked.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(self.context_limit);

        let system = self.system_message(persona);
        let user = ChatMessage::user(build_user_prompt(query, &ranked));

        self.throttle().await;

        match self.provider.chat(&[system, user], self.answer_params).await {
            Ok(text) => {
                let confidence = score_confidence(&ranked, &text);
                let sources = ranked.iter().map(|r| source_summary(r)).collect();

                GeneratedAnswer {
                    text,
                    confidence,
                    sources,
                    model: self.provider.model_name().to_string(),
                    generated_at: Utc::now(),
                }
            }
            Err(e) => {
                error!("Chat completion failed: {}", e);
                self.fallback_answer()
            }
        }
    }

    /// Degraded-mode answer: no retrieved context, fixed lower confidence.
    pub async fn generate_direct(&self, query: &str, persona: &dyn Persona) -> GeneratedAnswer {
        let system = self.system_message(persona);
        let user = ChatMessage::user(query.to_string());

        self.throttle().await;

        match self.provider.chat(&[system, user], self.answer_params).await {
            Ok(text) => GeneratedAnswer {
                text,
                confidence: self.degraded_confidence,
                sources: Vec::new(),
                model: self.provider.model_name().to_string(),
                generated_at: Utc::now(),
            },
            Err(e) => {
                error!("Chat completion failed: {}", e);
                self.fallback_answer()
            }
        }
    }

    /// Summarize content under one of three fixed instruction templates, at
    /// lower sampling temperature than answering.
    pub async fn generate_summary(
        &self,
        content: &str,
        style: SummaryStyle,
        max_length: usize,
    ) -> RagResult<String> {
        if content.trim().is_empty() {
            return Err(RagError::Validation("Content to summarize is empty".to_string()));
        }

        let instruction = match style {
            SummaryStyle::Concise => format!(
                "Summarize the following content in at most {} words. Be brief and factual.",
                max_length
            ),
            SummaryStyle::Detailed => format!(
                "Write a detailed summary of the following content in at most {} words, \
                 covering every substantive point.",
                max_length
            ),
            SummaryStyle::Bullet => format!(
                "Summarize the following content as a bulleted list of at most {} words. \
                 One fact per bullet.",
                max_length
            ),
        };

        let messages = [
            ChatMessage::system(instruction),
            ChatMessage::user(content.to_string()),
        ];
        let params = ChatParams {
            max_tokens: self.answer_params.max_tokens,
            temperature: self.summary_temperature,
        };

        self.throttle().await;

        self.provider
            .chat(&messages, params)
            .await
            .map_err(|e| RagError::Provider(e.to_string()))
    }

    fn system_message(&self, persona: &dyn Persona) -> ChatMessage {
        let mut prompt = persona.system_prompt().to_string();
        if let Some(instructions) = persona.custom_instructions() {
            prompt.push_str("\n\n");
            prompt.push_str(instructions);
        }
        ChatMessage::system(prompt)
    }

    fn fallback_answer(&self) -> GeneratedAnswer {
        GeneratedAnswer {
            text: FALLBACK_ANSWER.to_string(),
            confidence: 0.0,
            sources: Vec::new(),
            model: self.provider.model_name().to_string(),
            generated_at: Utc::now(),
        }
    }
}

/// Render the retrieved chunks as labeled source blocks and bind them to
/// the query, directing the model to answer only from context.
fn build_user_prompt(query: &str, ranked: &[&RetrievalResult]) -> String {
    if ranked.is_empty() {
        return format!(
            "No context was retrieved for this question. State that the available \
             information is insufficient, then answer as best you can.\n\nQuestion: {}",
            query
        );
    }

    let mut context = String::new();
    for (i, result) in ranked.iter().enumerate() {
        context.push_str(&format!(
            "[Source {}] (type: {}, similarity: {:.2})\n{}\n\n",
            i + 1,
            result.metadata.source_type.as_str(),
            result.similarity_score,
            result.content
        ));
    }

    format!(
        "Answer the question using only the context below. If the context is \
         insufficient, say so explicitly.\n\n<context>\n{}</context>\n\nQuestion: {}",
        context, query
    )
}

/// Confidence heuristic over the assembled context and the answer itself,
/// clamped to [0, 1]. No context means no grounding: confidence 0.
fn score_confidence(context: &[&RetrievalResult], answer: &str) -> f32 {
    if context.is_empty() {
        return 0.0;
    }

    let avg_similarity: f32 =
        context.iter().map(|r| r.similarity_score).sum::<f32>() / context.len() as f32;
    let coverage = (context.len() as f32 / 5.0).min(1.0);
    let answer_words = answer.split_whitespace().count() as f32;
    let length = (answer_words / 100.0).min(1.0);

    (0.5 * avg_similarity + 0.3 * coverage + 0.2 * length).clamp(0.0, 1.0)
}

fn source_summary(result: &RetrievalResult) -> SourceSummary {
    let preview: String = result.content.chars().take(PREVIEW_CHARS).collect();

    SourceSummary {
        chunk_id: result.chunk_id.clone(),
        similarity: result.similarity_score,
        preview,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubChat {
        reply: Result<String, String>,
        calls: AtomicUsize,
    }

    impl StubChat {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChatProvider for StubChat {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _params: ChatParams,
        ) -> Result<String, ChatError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone().map_err(ChatError::Api)
        }

        fn model_name(&self) -> &str {
            "stub-chat"
        }
    }

    fn result(chunk_id: &str, similarity: f32) -> RetrievalResult {
        RetrievalResult {
            chunk_id: chunk_id.to_string(),
            content: format!("stored content of {}", chunk_id),
            metadata: ChunkMetadata::default(),
            similarity_score: similarity,
        }
    }

    #[test]
    fn test_confidence_zero_without_context() {
        assert_eq!(score_confidence(&[], "some long answer"), 0.0);
    }

    #[test]
    fn test_confidence_stays_in_unit_interval() {
        let full = result("a", 1.0);
        let context: Vec<&RetrievalResult> = vec![&full; 5];
        let long_answer = "word ".repeat(300);
        let confidence = score_confidence(&context, &long_answer);
        assert!((0.0..=1.0).contains(&confidence));
        assert!((confidence - 1.0).abs() < 1e-6);

        let weak = result("b", 0.1);
        let confidence = score_confidence(&[&weak], "short");
        assert!((0.0..=1.0).contains(&confidence));
    }

    #[tokio::test]
    async fn test_generate_answer_orders_and_limits_sources() {
        let provider = Arc::new(StubChat::replying("The role is a backend engineer."));
        let generator = Generator::new(&RagConfig::default(), provider);

        let context: Vec<RetrievalResult> = (0..7)
            .map(|i| result(&format!("c{}", i), 0.1 * i as f32))
            .collect();

        let answer = generator
            .generate_answer("What is the role?", &context, &GeneralAssistant)
            .await;

        // Top 5 by similarity, descending
        assert_eq!(answer.sources.len(), 5);
        assert_eq!(answer.sources[0].chunk_id, "c6");
        let sims: Vec<f32> = answer.sources.iter().map(|s| s.similarity).collect();
        assert!(sims.windows(2).all(|w| w[0] >= w[1]));
        assert!(answer.confidence > 0.0);
    }

    #[tokio::test]
    async fn test_provider_failure_yields_fallback() {
        let provider = Arc::new(StubChat::failing("connection reset"));
        let generator = Generator::new(&RagConfig::default(), provider);

        let context = vec![result("c1", 0.9)];
        let answer = generator
            .generate_answer("What is the role?", &context, &GeneralAssistant)
            .await;

        assert_eq!(answer.text, FALLBACK_ANSWER);
        assert_eq!(answer.confidence, 0.0);
        assert!(answer.sources.is_empty());
    }

    #[tokio::test]
    async fn test_generate_direct_uses_fixed_confidence() {
        let provider = Arc::new(StubChat::replying("General guidance."));
        let generator = Generator::new(&RagConfig::default(), provider);

        let answer = generator
            .generate_direct("What is the role?", &GeneralAssistant)
            .await;

        assert_eq!(answer.confidence, RagConfig::default().degraded_confidence);
        assert!(answer.sources.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_ceiling_holds_under_concurrent_waiters() {
        let provider = Arc::new(StubChat::replying("ok"));
        let config = RagConfig {
            generation_calls_per_minute: 2,
            ..RagConfig::default()
        };
        let generator = Arc::new(Generator::new(&config, provider.clone()));

        let before = Instant::now();
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..5 {
            let generator = generator.clone();
            tasks.spawn(async move {
                generator.generate_direct("question", &GeneralAssistant).await;
            });
        }
        while tasks.join_next().await.is_some() {}

        // 5 calls at 2 per minute need three windows; waiters waking
        // together must not all admit themselves into the same window,
        // so the last call cannot land before two full minutes pass
        assert_eq!(provider.calls.load(Ordering::SeqCst), 5);
        assert!(
            Instant::now().duration_since(before) >= Duration::from_secs(120),
            "ceiling was exceeded within a window"
        );
    }

    #[tokio::test]
    async fn test_generate_summary_rejects_empty_content() {
        let provider = Arc::new(StubChat::replying("summary"));
        let generator = Generator::new(&RagConfig::default(), provider.clone());

        let err = generator
            .generate_summary("   ", SummaryStyle::Concise, 50)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
        // Rejected before any provider call
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_generate_summary_styles() {
        let provider = Arc::new(StubChat::replying("the summary"));
        let generator = Generator::new(&RagConfig::default(), provider.clone());

        for style in [SummaryStyle::Concise, SummaryStyle::Detailed, SummaryStyle::Bullet] {
            let summary = generator
                .generate_summary("Long interview transcript.", style, 80)
                .await
                .unwrap();
            assert_eq!(summary, "the summary");
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }
}
