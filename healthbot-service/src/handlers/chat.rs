use crate::middleware::ChatOutcome;
use crate::models::chat::new_conversation_id;
use crate::models::{ChatRequest, ChatResponse, MessageResponse};
use crate::services::aggregator::TrackedRequest;
use crate::services::responder::AnswerOutcome;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use service_core::error::AppError;
use std::time::Instant;
use validator::Validate;

/// Answer a health question. Tracking happens in the surrounding middleware,
/// which reads the `ChatOutcome` attached here.
#[tracing::instrument(skip(state, request), fields(conversation_id = tracing::field::Empty))]
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, AppError> {
    request.validate()?;

    let start = Instant::now();
    let conversation_id = request
        .conversation_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(new_conversation_id);
    tracing::Span::current().record("conversation_id", conversation_id.as_str());

    let answer = state
        .responder
        .generate_response(&request.message, Some(&conversation_id))
        .await;

    let response_time_ms = start.elapsed().as_secs_f64() * 1000.0;

    let tracked = match &answer.outcome {
        AnswerOutcome::Generated | AnswerOutcome::Unavailable => {
            TrackedRequest::success(response_time_ms, answer.tokens_used)
        }
        AnswerOutcome::Failed { error_kind } => {
            TrackedRequest::failure(response_time_ms, error_kind.clone())
        }
    };

    if tracked.success {
        state.aggregator.log_event(
            "chat_completed",
            json!({
                "conversation_id": conversation_id,
                "message_length": request.message.len(),
                "response_length": answer.text.len(),
                "tokens_used": answer.tokens_used,
                "response_time_ms": round2(response_time_ms),
            }),
        );
    }

    let body = ChatResponse {
        response: answer.text,
        conversation_id,
        tokens_used: answer.tokens_used,
        response_time_ms: round2(response_time_ms),
        timestamp: Utc::now(),
    };

    let mut response = Json(body).into_response();
    response.extensions_mut().insert(ChatOutcome(tracked));
    Ok(response)
}

pub async fn clear_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    if state.responder.clear_conversation(&conversation_id) {
        Ok(Json(MessageResponse {
            message: format!("Conversation {} cleared", conversation_id),
        }))
    } else {
        Err(AppError::NotFound(anyhow::anyhow!(
            "Conversation {} not found",
            conversation_id
        )))
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
