/*!
 * # Assistant Module
 *
 * Answers free-text questions about service-order turnaround. Each question
 * is wrapped in a prompt carrying a fresh statistics snapshot and sent once
 * to an external text-generation API.
 */

use async_trait::async_trait;

use crate::errors::ServiceError;

pub mod gemini;
pub mod prompt;
pub mod service;

pub use gemini::{GeminiClient, GeminiConfig};
pub use prompt::build_prompt;
pub use service::{AssistantService, ChatReply, ChatRequest};

/// Something that turns a prompt into reply text
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError>;
}
