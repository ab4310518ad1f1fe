//! Health-focused answer generation on top of a `TextProvider`.

use crate::services::metrics;
use crate::services::providers::{GenerationParams, ProviderError, TextProvider};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;

pub const UNAVAILABLE_MESSAGE: &str = "I'm sorry, but the AI service is currently unavailable. \
Please try again later or contact support.";

pub const APOLOGY_MESSAGE: &str = "I apologize, but I encountered an issue processing your request. \
This could be due to content safety filters or a temporary issue. \
Please try rephrasing your question or try again later.";

/// Messages kept per conversation (user and assistant turns combined).
const MAX_CONVERSATION_MESSAGES: usize = 20;

const HEALTH_SYSTEM_PROMPT: &str = r#"You are HealthBot, a helpful AI health assistant. Your role is to:

1. **Provide General Health Information**: Answer questions about symptoms, conditions, medications, nutrition, and wellness.

2. **Be Empathetic and Supportive**: Respond with care and understanding to health concerns.

3. **Encourage Professional Consultation**: Always remind users to consult healthcare professionals for serious concerns, diagnoses, or treatment decisions.

4. **Stay Within Limits**:
   - Do NOT diagnose specific conditions
   - Do NOT prescribe medications
   - Do NOT replace professional medical advice
   - Do NOT provide emergency medical guidance

5. **Be Clear and Accurate**: Provide evidence-based information when possible.

6. **Format Responses Well**: Use clear formatting with bullet points and sections when appropriate.

**Important Disclaimer**: Always include a brief reminder that you're an AI assistant and professional medical consultation is recommended for health decisions.

Start each response helpfully and end with appropriate caveats when discussing serious health topics."#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    Generated,
    /// No provider configured; the fixed unavailable message was returned.
    Unavailable,
    Failed { error_kind: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAnswer {
    pub text: String,
    pub tokens_used: u64,
    pub latency_ms: f64,
    pub outcome: AnswerOutcome,
}

pub struct HealthResponder {
    provider: Option<Arc<dyn TextProvider>>,
    model: String,
    params: GenerationParams,
    conversations: DashMap<String, Vec<ConversationTurn>>,
}

impl HealthResponder {
    pub fn new(provider: Option<Arc<dyn TextProvider>>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            params: GenerationParams {
                temperature: Some(0.7),
                top_p: Some(0.9),
                top_k: Some(40),
                max_tokens: Some(1024),
            },
            conversations: DashMap::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.provider.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Check the provider is reachable without generating anything.
    pub async fn check_provider(&self) -> Result<(), ProviderError> {
        match &self.provider {
            Some(provider) => provider.health_check().await,
            None => Err(ProviderError::NotConfigured(
                "no API key configured".to_string(),
            )),
        }
    }

    pub async fn generate_response(
        &self,
        message: &str,
        conversation_id: Option<&str>,
    ) -> GeneratedAnswer {
        let start = Instant::now();

        let Some(provider) = self.provider.as_ref() else {
            return GeneratedAnswer {
                text: UNAVAILABLE_MESSAGE.to_string(),
                tokens_used: 0,
                latency_ms: elapsed_ms(start),
                outcome: AnswerOutcome::Unavailable,
            };
        };

        let prompt = self.build_prompt(message, conversation_id);
        let result = provider.generate(&prompt, &self.params).await;
        let latency_ms = elapsed_ms(start);
        metrics::record_provider_latency(provider.name(), &self.model, latency_ms / 1000.0);

        match result {
            Ok(response) => {
                let input_tokens = response
                    .input_tokens
                    .filter(|t| *t > 0)
                    .unwrap_or_else(|| estimate_tokens(message));
                let output_tokens = response
                    .output_tokens
                    .filter(|t| *t > 0)
                    .unwrap_or_else(|| estimate_tokens(&response.text));
                let tokens_used = input_tokens + output_tokens;

                if let Some(id) = conversation_id {
                    self.remember(id, message, &response.text);
                }
                metrics::record_tokens(&self.model, tokens_used);

                tracing::info!(
                    conversation_id = conversation_id.unwrap_or("-"),
                    input_length = message.len(),
                    output_length = response.text.len(),
                    tokens = tokens_used,
                    finish_reason = response.finish_reason.as_str(),
                    response_time_ms = latency_ms,
                    "Generated health response"
                );

                GeneratedAnswer {
                    text: response.text,
                    tokens_used,
                    latency_ms,
                    outcome: AnswerOutcome::Generated,
                }
            }
            Err(e) => {
                tracing::error!(provider = provider.name(), error = %e, "Error generating response");
                metrics::record_provider_error(provider.name(), e.kind());

                GeneratedAnswer {
                    text: APOLOGY_MESSAGE.to_string(),
                    tokens_used: 0,
                    latency_ms,
                    outcome: AnswerOutcome::Failed {
                        error_kind: e.kind().to_string(),
                    },
                }
            }
        }
    }

    pub fn clear_conversation(&self, conversation_id: &str) -> bool {
        let removed = self.conversations.remove(conversation_id).is_some();
        if removed {
            tracing::info!(conversation_id = %conversation_id, "Conversation cleared");
        }
        removed
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    pub fn conversation_history(&self, conversation_id: &str) -> Vec<ConversationTurn> {
        self.conversations
            .get(conversation_id)
            .map(|turns| turns.clone())
            .unwrap_or_default()
    }

    fn build_prompt(&self, message: &str, conversation_id: Option<&str>) -> String {
        let mut prompt = String::from(HEALTH_SYSTEM_PROMPT);

        if let Some(turns) = conversation_id.and_then(|id| self.conversations.get(id)) {
            if !turns.is_empty() {
                prompt.push_str("\n\nConversation so far:");
                for turn in turns.iter() {
                    let speaker = match turn.role {
                        Role::User => "User",
                        Role::Assistant => "HealthBot",
                    };
                    prompt.push_str(&format!("\n{}: {}", speaker, turn.content));
                }
            }
        }

        prompt.push_str(&format!(
            "\n\nUser's health question: {}\n\nYour helpful response:",
            message
        ));
        prompt
    }

    fn remember(&self, conversation_id: &str, message: &str, answer: &str) {
        let mut turns = self
            .conversations
            .entry(conversation_id.to_string())
            .or_default();

        turns.push(ConversationTurn {
            role: Role::User,
            content: message.to_string(),
        });
        turns.push(ConversationTurn {
            role: Role::Assistant,
            content: answer.to_string(),
        });

        if turns.len() > MAX_CONVERSATION_MESSAGES {
            let excess = turns.len() - MAX_CONVERSATION_MESSAGES;
            turns.drain(..excess);
        }
    }
}

/// Roughly four characters per token.
fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() / 4) as u64
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::mock::MockTextProvider;

    fn responder(provider: MockTextProvider) -> HealthResponder {
        HealthResponder::new(Some(Arc::new(provider)), "gemini-2.5-flash")
    }

    #[tokio::test]
    async fn without_provider_returns_unavailable_message() {
        let responder = HealthResponder::new(None, "gemini-2.5-flash");

        let answer = responder.generate_response("Is coffee bad?", None).await;

        assert!(!responder.is_connected());
        assert_eq!(answer.text, UNAVAILABLE_MESSAGE);
        assert_eq!(answer.tokens_used, 0);
        assert_eq!(answer.outcome, AnswerOutcome::Unavailable);
    }

    #[tokio::test]
    async fn provider_check_reflects_provider_state() {
        assert!(responder(MockTextProvider::new()).check_provider().await.is_ok());

        let err = responder(MockTextProvider::failing())
            .check_provider()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "api_error");

        let err = HealthResponder::new(None, "gemini-2.5-flash")
            .check_provider()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_configured");
    }

    #[tokio::test]
    async fn provider_failure_returns_apology() {
        let responder = responder(MockTextProvider::failing());

        let answer = responder.generate_response("headache", Some("conv_1")).await;

        assert_eq!(answer.text, APOLOGY_MESSAGE);
        assert_eq!(answer.tokens_used, 0);
        assert_eq!(
            answer.outcome,
            AnswerOutcome::Failed {
                error_kind: "api_error".to_string()
            }
        );
        assert_eq!(responder.conversation_count(), 0);
    }

    #[tokio::test]
    async fn provider_usage_is_preferred() {
        let responder = responder(MockTextProvider::new());
        let answer = responder.generate_response("hello", None).await;

        let prompt_len = responder.build_prompt("hello", None).len() as u64;
        assert_eq!(answer.tokens_used, prompt_len / 4 + 10);
        assert_eq!(answer.outcome, AnswerOutcome::Generated);
    }

    #[tokio::test]
    async fn tokens_are_estimated_without_usage() {
        let responder = responder(MockTextProvider::without_usage());
        let message = "a".repeat(40);

        let answer = responder.generate_response(&message, None).await;

        assert_eq!(
            answer.tokens_used,
            10 + estimate_tokens(&answer.text)
        );
    }

    #[tokio::test]
    async fn conversation_history_is_capped() {
        let responder = responder(MockTextProvider::new());

        for i in 0..15 {
            responder
                .generate_response(&format!("question {}", i), Some("conv_a"))
                .await;
        }

        let history = responder.conversation_history("conv_a");
        assert_eq!(history.len(), MAX_CONVERSATION_MESSAGES);
        assert_eq!(history[0].content, "question 5");
        assert_eq!(history[0].role, Role::User);
    }

    #[tokio::test]
    async fn prompt_includes_earlier_turns() {
        let responder = responder(MockTextProvider::new());
        responder.generate_response("I have a cold", Some("conv_b")).await;

        let prompt = responder.build_prompt("What should I drink?", Some("conv_b"));

        assert!(prompt.starts_with("You are HealthBot"));
        assert!(prompt.contains("User: I have a cold"));
        assert!(prompt.ends_with(
            "User's health question: What should I drink?\n\nYour helpful response:"
        ));
    }

    #[tokio::test]
    async fn clear_conversation_reports_presence() {
        let responder = responder(MockTextProvider::new());
        responder.generate_response("hi", Some("conv_c")).await;

        assert_eq!(responder.conversation_count(), 1);
        assert!(responder.clear_conversation("conv_c"));
        assert!(!responder.clear_conversation("conv_c"));
        assert_eq!(responder.conversation_count(), 0);
    }
}
