//! Mock provider implementation for testing.

use super::{FinishReason, GenerationParams, ProviderError, ProviderResponse, TextProvider};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behaviour {
    Respond,
    Fail,
    Panic,
}

/// Mock text provider for testing.
pub struct MockTextProvider {
    behaviour: Behaviour,
    report_usage: bool,
    calls: AtomicU64,
}

impl MockTextProvider {
    /// Answers every prompt and reports provider token usage.
    pub fn new() -> Self {
        Self {
            behaviour: Behaviour::Respond,
            report_usage: true,
            calls: AtomicU64::new(0),
        }
    }

    /// Answers every prompt without usage metadata, forcing token estimation.
    pub fn without_usage() -> Self {
        Self {
            report_usage: false,
            ..Self::new()
        }
    }

    /// Every call fails with an API error.
    pub fn failing() -> Self {
        Self {
            behaviour: Behaviour::Fail,
            ..Self::new()
        }
    }

    /// Every call panics, simulating a bug deep in the generation path.
    pub fn panicking() -> Self {
        Self {
            behaviour: Behaviour::Panic,
            ..Self::new()
        }
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockTextProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextProvider for MockTextProvider {
    async fn generate(
        &self,
        prompt: &str,
        _params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match self.behaviour {
            Behaviour::Fail => Err(ProviderError::ApiError(
                "Mock provider failure".to_string(),
            )),
            Behaviour::Panic => panic!("mock provider panicked"),
            Behaviour::Respond => {
                let text = "Mock health guidance. Please consult a healthcare professional.";
                let (input_tokens, output_tokens) = if self.report_usage {
                    (Some(prompt.len() as u64 / 4), Some(10))
                } else {
                    (None, None)
                };

                Ok(ProviderResponse {
                    text: text.to_string(),
                    input_tokens,
                    output_tokens,
                    finish_reason: FinishReason::Complete,
                })
            }
        }
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        match self.behaviour {
            Behaviour::Respond => Ok(()),
            _ => Err(ProviderError::ApiError("Mock provider unhealthy".to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
