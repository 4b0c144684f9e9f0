//! Type definitions shared by the classifier and its callers

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// A unit of work submitted for classification (an article, a bullet point, ...)
///
/// The `id` belongs to the caller's namespace and is never shown to the model.
/// `fields` carries the text the model needs to see, e.g. `title`, `summary`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// External identifier (database row id, message number, ...)
    pub id: i64,

    /// Text fields exposed to the model, keyed by field name
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

impl WorkItem {
    /// Create a work item without any text fields
    pub fn new(id: i64) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
        }
    }

    /// Add a text field
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

/// A category from the closed, configured category list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySpec {
    /// Canonical label, matched exactly in model output
    pub label: String,

    /// Guidance shown to the model
    #[serde(default)]
    pub description: String,
}

impl CategorySpec {
    pub fn new(label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: description.into(),
        }
    }
}

/// Check a category list for labels that collide case-insensitively
///
/// Such a list would make label repair ambiguous.
pub fn check_categories(categories: &[CategorySpec]) -> crate::Result<()> {
    let mut seen = HashSet::new();
    for category in categories {
        let key = category.label.trim().to_lowercase();
        if key.is_empty() {
            return Err(crate::Error::Config("category label must not be empty".into()));
        }
        if !seen.insert(key) {
            return Err(crate::Error::DuplicateCategory(category.label.clone()));
        }
    }
    Ok(())
}

/// How strictly the output must cover the input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClassifyMode {
    /// Every input item must land in exactly one group
    #[default]
    Partition,
    /// Groups are discovered freely; items may be left out but never repeated
    Open,
}

impl ClassifyMode {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifyMode::Partition => "partition",
            ClassifyMode::Open => "open",
        }
    }

    /// Whether every item must be assigned
    pub fn is_exhaustive(&self) -> bool {
        matches!(self, ClassifyMode::Partition)
    }
}

impl FromStr for ClassifyMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, crate::Error> {
        match s.to_lowercase().as_str() {
            "partition" => Ok(ClassifyMode::Partition),
            "open" => Ok(ClassifyMode::Open),
            _ => Err(crate::Error::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for ClassifyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Response format requested from the completion service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DecodingMode {
    /// Provider enforces the response JSON schema
    #[default]
    Schema,
    /// Provider only guarantees a JSON object
    Freeform,
}

impl DecodingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecodingMode::Schema => "schema",
            DecodingMode::Freeform => "freeform",
        }
    }
}

impl fmt::Display for DecodingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One output group, in the caller's id namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub label: String,
    pub summary: String,
    pub item_ids: Vec<i64>,
}

impl Group {
    pub fn new(label: impl Into<String>, summary: impl Into<String>, item_ids: Vec<i64>) -> Self {
        Self {
            label: label.into(),
            summary: summary.into(),
            item_ids,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }
}

/// Final state of a classification call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The model output satisfied every invariant
    Success,
    /// The attempt budget ran out; groups hold the degraded placeholder
    Degraded,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Degraded => "degraded",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bookkeeping reported alongside every result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub outcome: Outcome,

    /// Number of completion attempts made (rate-limited ones included)
    pub attempts: u32,

    /// How many of those attempts were answered with a rate limit
    pub rate_limited: u32,

    /// Decoding mode in effect when the call finished
    pub decoding_mode: DecodingMode,

    /// Rendered validation errors of the last failed attempt
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub last_errors: Vec<String>,

    /// Wall-clock time spent in the call
    pub duration_ms: u64,
}

/// Result of one classification call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub groups: Vec<Group>,

    /// Non-fatal notes, e.g. repaired label casing
    #[serde(default)]
    pub warnings: Vec<String>,

    pub report: ClassificationReport,
}

impl ClassificationResult {
    /// Whether the model output was accepted
    pub fn is_success(&self) -> bool {
        self.report.outcome == Outcome::Success
    }

    /// All assigned external ids, in group order
    pub fn assigned_ids(&self) -> Vec<i64> {
        self.groups
            .iter()
            .flat_map(|g| g.item_ids.iter().copied())
            .collect()
    }

    /// Find a group by label
    pub fn group(&self, label: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.label == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_conversion() {
        assert_eq!(
            ClassifyMode::from_str("partition").unwrap(),
            ClassifyMode::Partition
        );
        assert_eq!(ClassifyMode::from_str("OPEN").unwrap(), ClassifyMode::Open);
        assert!(ClassifyMode::from_str("invalid").is_err());
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(ClassifyMode::Partition.to_string(), "partition");
        assert_eq!(ClassifyMode::Open.to_string(), "open");
        assert!(ClassifyMode::Partition.is_exhaustive());
        assert!(!ClassifyMode::Open.is_exhaustive());
    }

    #[test]
    fn test_work_item_fields_flatten() {
        let item = WorkItem::new(42)
            .with_field("title", "GPU prices fall")
            .with_field("source", "weekly@example.com");
        let json = serde_json::to_value(&item).unwrap();

        assert_eq!(json["id"], 42);
        assert_eq!(json["title"], "GPU prices fall");

        let parsed: WorkItem = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, item);
    }

    #[test]
    fn test_check_categories_rejects_case_collisions() {
        let ok = vec![
            CategorySpec::new("Computer Vision", ""),
            CategorySpec::new("AI policy", ""),
        ];
        assert!(check_categories(&ok).is_ok());

        let clash = vec![
            CategorySpec::new("AI policy", ""),
            CategorySpec::new("ai Policy ", ""),
        ];
        assert!(matches!(
            check_categories(&clash),
            Err(crate::Error::DuplicateCategory(_))
        ));

        let empty = vec![CategorySpec::new("  ", "")];
        assert!(check_categories(&empty).is_err());
    }
}
