//! # newsroll-classifier
//!
//! LLM-backed classification of work items with contract enforcement.
//!
//! ## Features
//!
//! - Dense id sanitization so the model never sees caller ids
//! - Schema-constrained decoding with a sticky fallback to free-form JSON
//! - Validation feedback fed back into the conversation on retry
//! - Exponential backoff with a degraded result instead of a hard failure
//!
//! ## Example
//!
//! ```no_run
//! use newsroll_classifier::{Classifier, OpenAiClient, ARTICLE_CATEGORIZATION_TASK};
//! use newsroll_core::{CategorySpec, Config, WorkItem};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     let classifier = Classifier::new(Arc::new(OpenAiClient::from_config(&config)?))?;
//!
//!     let request = classifier
//!         .request(vec![
//!             WorkItem::new(101).with_field("title", "Nvidia ships new GPU"),
//!             WorkItem::new(102).with_field("title", "EU passes AI act"),
//!         ])
//!         .with_categories(vec![
//!             CategorySpec::new("hardware for AI and GPUs", ""),
//!             CategorySpec::new("AI policy", ""),
//!         ])
//!         .with_instructions(ARTICLE_CATEGORIZATION_TASK);
//!
//!     let result = classifier.classify(&request).await?;
//!     for group in &result.groups {
//!         println!("{}: {:?}", group.label, group.item_ids);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod assembler;
pub mod batch;
pub mod classifier;
pub mod client;
pub mod error;
pub mod openai;
pub mod prompts;
pub mod sleeper;

// Re-exports
pub use batch::{classify_batches, split_batches};
pub use classifier::{Attempt, Classifier, ClassifierOptions, ClassifyRequest, PromptVariant};
pub use client::{
    ChatMessage, CompletionClient, CompletionError, CompletionRequest, ResponseSchema, Role,
};
pub use error::{Error, Result};
pub use openai::OpenAiClient;
pub use prompts::{
    Conversation, PromptComposer, ARTICLE_CATEGORIZATION_TASK, DEFAULT_TASK, TOPIC_GROUPING_TASK,
};
pub use sleeper::{backoff_delay, Sleeper, TokioSleeper};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
