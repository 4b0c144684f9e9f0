//! Response shape expected from the model
//!
//! The same structures drive both the JSON schema sent in schema-constrained
//! mode and the field names checked by the validator.

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name under which the schema is registered with the provider
pub const SCHEMA_NAME: &str = "classification";

pub const GROUPS_FIELD: &str = "groups";
pub const LABEL_FIELD: &str = "label";
pub const SUMMARY_FIELD: &str = "summary";
pub const ITEM_IDS_FIELD: &str = "item_ids";

/// Top-level object returned by the model
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GroupingResponse {
    /// Groups of items. Every group has a label, a summary and the ids it contains.
    pub groups: Vec<ResponseGroup>,
}

/// One group as returned by the model, still in the dense id namespace
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ResponseGroup {
    /// Category or topic name for this group
    pub label: String,

    /// 1-3 sentence summary of what the items in this group have in common
    pub summary: String,

    /// Ids of the items belonging to this group
    pub item_ids: Vec<i64>,
}

/// JSON schema for [`GroupingResponse`]
///
/// Subschemas are inlined and `title`/`format` keywords removed, since strict
/// providers reject keywords they do not support.
pub fn response_schema() -> crate::Result<Value> {
    let settings = SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
        s.meta_schema = None;
    });
    let root = settings
        .into_generator()
        .into_root_schema_for::<GroupingResponse>();

    let mut value = serde_json::to_value(root)?;
    strip_keywords(&mut value, &["title", "format"]);
    Ok(value)
}

fn strip_keywords(value: &mut Value, keywords: &[&str]) {
    match value {
        Value::Object(map) => {
            // "properties" keys are field names, not keywords
            for keyword in keywords {
                if map.get(*keyword).map(|v| v.is_string()).unwrap_or(false) {
                    map.remove(*keyword);
                }
            }
            for child in map.values_mut() {
                strip_keywords(child, keywords);
            }
        }
        Value::Array(items) => {
            for child in items {
                strip_keywords(child, keywords);
            }
        }
        _ => {}
    }
}
