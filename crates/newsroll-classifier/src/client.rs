//! Completion service boundary

use async_trait::async_trait;
use newsroll_core::{response_schema, SCHEMA_NAME};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One conversation message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// JSON schema the provider should enforce
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: Value,
    pub strict: bool,
}

impl ResponseSchema {
    /// Schema of the classification response
    pub fn classification() -> newsroll_core::Result<Self> {
        Ok(Self {
            name: SCHEMA_NAME.to_string(),
            schema: response_schema()?,
            strict: true,
        })
    }
}

/// A single completion request
///
/// `schema: None` asks for free-form JSON-object output.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub instructions: String,
    pub schema: Option<ResponseSchema>,
    pub messages: Vec<ChatMessage>,
}

/// Failure modes of the completion service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    /// The provider refused schema-constrained decoding for this session
    #[error("Schema-constrained decoding rejected: {0}")]
    SchemaRejected(String),

    /// The provider asked us to slow down
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication, connectivity or server failure
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Anything that can turn a conversation into raw response text
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Return the raw response text; never interpret it
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

#[async_trait]
impl<T: CompletionClient + ?Sized> CompletionClient for Arc<T> {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        (**self).complete(request).await
    }
}
