//! Schema command

use newsroll_core::response_schema;

/// Print the response schema sent with schema-constrained requests
///
/// Usage:
///   newsroll schema
pub fn schema() -> anyhow::Result<String> {
    let schema = response_schema()?;
    Ok(serde_json::to_string_pretty(&schema)?)
}
