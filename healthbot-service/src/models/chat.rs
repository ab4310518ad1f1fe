use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 2000, message = "Message must be 1-2000 characters"))]
    pub message: String,
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub conversation_id: String,
    pub tokens_used: u64,
    pub response_time_ms: f64,
    pub timestamp: DateTime<Utc>,
}

/// `conv_` followed by 12 lowercase hex characters.
pub fn new_conversation_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("conv_{}", &id[..12])
}
