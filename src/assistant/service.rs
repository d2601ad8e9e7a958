use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;

use super::{prompt::build_prompt, TextGenerator};
use crate::errors::ServiceError;
use crate::services::statistics::StatisticsService;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatReply {
    /// The question as asked, trimmed
    pub message: String,
    /// Generated answer, verbatim
    pub response: String,
    /// RFC 3339 generation time
    pub timestamp: String,
}

#[derive(Clone)]
pub struct AssistantService {
    statistics: StatisticsService,
    generator: Arc<dyn TextGenerator>,
}

impl AssistantService {
    pub fn new(statistics: StatisticsService, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            statistics,
            generator,
        }
    }

    #[instrument(skip(self, message))]
    pub async fn chat(&self, user_id: i32, message: &str) -> Result<ChatReply, ServiceError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ServiceError::ValidationError(
                "Mensagem não pode estar vazia".to_string(),
            ));
        }

        let stats = self.statistics.snapshot(user_id).await?;
        let prompt = build_prompt(&stats, message);
        let response = self.generator.generate(&prompt).await?;

        info!(
            user_id,
            total_orders = stats.total_orders,
            response_len = response.len(),
            "Assistant answered"
        );
        Ok(ChatReply {
            message: message.to_string(),
            response,
            timestamp: Utc::now().to_rfc3339(),
        })
    }
}
