//! # newsroll-core
//!
//! Core library for newsroll classification.
//!
//! ## Features
//!
//! - Work item, category and result types
//! - Dense id mapping so the model never sees raw database ids
//! - Validation of model output against the classification contract
//! - JSON schema for schema-constrained decoding
//! - JSON configuration and SQLite run logs
//!
//! ## Example
//!
//! ```
//! use newsroll_core::{sanitize, ClassifyMode, ResponseValidator, WorkItem};
//!
//! let items = vec![WorkItem::new(801), WorkItem::new(9_000)];
//! let batch = sanitize(&items).unwrap();
//!
//! let validator = ResponseValidator::new(&batch.ids, ClassifyMode::Partition, &[]);
//! let validated = validator
//!     .validate(r#"{"groups":[{"label":"chips","summary":"GPU news","item_ids":[1,2]}]}"#)
//!     .unwrap();
//! assert_eq!(validated.groups[0].item_ids, vec![1, 2]);
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod sanitizer;
pub mod schema;
pub mod storage;
pub mod types;
pub mod validation;

// Re-exports for convenience
pub use config::{ClassificationSettings, Config, DegradedPolicy, OpenAiSettings};
pub use db::Database;
pub use error::{Error, Result};
pub use sanitizer::{sanitize, IdMap, SanitizedBatch, SanitizedWorkItem};
pub use schema::{response_schema, GroupingResponse, ResponseGroup, SCHEMA_NAME};
pub use storage::{ClassificationLog, LogOperations, LogStore, FAILED_OUTCOME};
pub use types::{
    CategorySpec, ClassificationReport, ClassificationResult, ClassifyMode, DecodingMode, Group,
    Outcome, WorkItem,
};
pub use validation::{
    DenseGroup, IdPreview, ResponseValidator, ValidatedResponse, ValidationError,
    ValidationErrorKind,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
