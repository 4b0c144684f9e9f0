//! Validation of raw model output against the classification contract
//!
//! The validator never stops at the first problem: every violation found in
//! a response is reported, so a single retry can fix all of them at once.

use crate::sanitizer::IdMap;
use crate::schema::{GROUPS_FIELD, ITEM_IDS_FIELD, LABEL_FIELD, SUMMARY_FIELD};
use crate::{CategorySpec, ClassifyMode};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Default number of offending ids quoted back to the model
pub const DEFAULT_PREVIEW_LIMIT: usize = 10;

/// Offending ids, truncated for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdPreview {
    /// Wide enough for ids the model wrote outside the `i64` range
    pub shown: Vec<i128>,
    pub total: usize,
}

impl IdPreview {
    fn new<T: Copy + Into<i128>>(ids: &[T], limit: usize) -> Self {
        Self {
            shown: ids.iter().take(limit.max(1)).map(|&id| id.into()).collect(),
            total: ids.len(),
        }
    }
}

impl fmt::Display for IdPreview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listed: Vec<String> = self.shown.iter().map(|id| id.to_string()).collect();
        write!(f, "{}", listed.join(", "))?;
        if self.total > self.shown.len() {
            write!(f, " (and {} more)", self.total - self.shown.len())?;
        }
        Ok(())
    }
}

/// Coarse kind of a validation error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationErrorKind {
    Parse,
    Structural,
    InvalidId,
    DuplicateAssignment,
    MissingAssignment,
    UnknownCategory,
}

/// A single contract violation, rendered as feedback for the next attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("The response was not valid JSON: {message}")]
    Parse { message: String },

    #[error("The response did not have the required structure: {message}")]
    Structural { message: String },

    #[error("The response referenced ids that do not exist: {ids}. Only use ids from the input.")]
    InvalidId { ids: IdPreview },

    #[error("These ids were assigned to more than one group: {ids}. Each id may appear in only one group, once.")]
    DuplicateAssignment { ids: IdPreview },

    #[error("These ids were not assigned to any group: {ids}. Every id must appear in exactly one group.")]
    MissingAssignment { ids: IdPreview },

    #[error("Unknown category \"{label}\". The label must be exactly one of: {}", quote_all(.allowed))]
    UnknownCategory { label: String, allowed: Vec<String> },
}

impl ValidationError {
    pub fn kind(&self) -> ValidationErrorKind {
        match self {
            ValidationError::Parse { .. } => ValidationErrorKind::Parse,
            ValidationError::Structural { .. } => ValidationErrorKind::Structural,
            ValidationError::InvalidId { .. } => ValidationErrorKind::InvalidId,
            ValidationError::DuplicateAssignment { .. } => ValidationErrorKind::DuplicateAssignment,
            ValidationError::MissingAssignment { .. } => ValidationErrorKind::MissingAssignment,
            ValidationError::UnknownCategory { .. } => ValidationErrorKind::UnknownCategory,
        }
    }

    /// Offending ids carried by the error, if any
    pub fn ids(&self) -> Option<&IdPreview> {
        match self {
            ValidationError::InvalidId { ids }
            | ValidationError::DuplicateAssignment { ids }
            | ValidationError::MissingAssignment { ids } => Some(ids),
            _ => None,
        }
    }

    fn structural(message: impl Into<String>) -> Self {
        ValidationError::Structural {
            message: message.into(),
        }
    }
}

fn quote_all(labels: &[String]) -> String {
    labels
        .iter()
        .map(|l| format!("\"{}\"", l))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A validated group, still in the dense namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenseGroup {
    pub label: String,
    pub summary: String,
    pub item_ids: Vec<u32>,
}

/// Model output that satisfied every check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedResponse {
    pub groups: Vec<DenseGroup>,
    /// Non-fatal repairs applied while validating
    pub warnings: Vec<String>,
}

/// Validates one raw response against the ids and categories of a request
#[derive(Debug, Clone)]
pub struct ResponseValidator<'a> {
    ids: &'a IdMap,
    mode: ClassifyMode,
    categories: &'a [CategorySpec],
    preview_limit: usize,
}

impl<'a> ResponseValidator<'a> {
    pub fn new(ids: &'a IdMap, mode: ClassifyMode, categories: &'a [CategorySpec]) -> Self {
        Self {
            ids,
            mode,
            categories,
            preview_limit: DEFAULT_PREVIEW_LIMIT,
        }
    }

    /// Cap the number of ids quoted per error
    pub fn with_preview_limit(mut self, limit: usize) -> Self {
        self.preview_limit = limit.max(1);
        self
    }

    /// Validate a raw response
    ///
    /// Returns the validated groups, or every violation found.
    pub fn validate(&self, raw: &str) -> Result<ValidatedResponse, Vec<ValidationError>> {
        let root = parse_json(raw).map_err(|e| vec![e])?;

        let root = match root {
            Value::Object(map) => map,
            other => {
                return Err(vec![ValidationError::structural(format!(
                    "expected a JSON object at the top level, found {}",
                    json_type(&other)
                ))])
            }
        };

        let groups = match root.get(GROUPS_FIELD) {
            Some(Value::Array(groups)) => groups,
            Some(other) => {
                return Err(vec![ValidationError::structural(format!(
                    "`{}` must be an array, found {}",
                    GROUPS_FIELD,
                    json_type(other)
                ))])
            }
            None => {
                return Err(vec![ValidationError::structural(format!(
                    "missing required top-level field `{}`",
                    GROUPS_FIELD
                ))])
            }
        };

        let mut errors = Vec::new();
        report_unexpected_fields(&root, &[GROUPS_FIELD], "the top-level object", &mut errors);

        let mut seen = HashSet::new();
        let mut invalid: Vec<i128> = Vec::new();
        let mut duplicates: Vec<i64> = Vec::new();
        let mut unknown_labels: Vec<String> = Vec::new();
        let mut warnings = Vec::new();
        let mut validated = Vec::with_capacity(groups.len());

        for (index, group) in groups.iter().enumerate() {
            let position = index + 1;
            let Value::Object(group) = group else {
                errors.push(ValidationError::structural(format!(
                    "group {} must be an object, found {}",
                    position,
                    json_type(group)
                )));
                continue;
            };

            report_unexpected_fields(
                group,
                &[LABEL_FIELD, SUMMARY_FIELD, ITEM_IDS_FIELD],
                &format!("group {}", position),
                &mut errors,
            );

            let label = string_field(group, LABEL_FIELD, position, &mut errors);
            let summary = string_field(group, SUMMARY_FIELD, position, &mut errors);
            let ids = self.id_field(group, position, &mut errors);

            let mut dense_ids = Vec::new();
            if let Some(ids) = ids {
                for id in ids {
                    let known = i64::try_from(id)
                        .ok()
                        .filter(|&dense| self.ids.contains_dense(dense));
                    match known {
                        None => {
                            if !invalid.contains(&id) {
                                invalid.push(id);
                            }
                        }
                        Some(dense) if !seen.insert(dense) => {
                            if !duplicates.contains(&dense) {
                                duplicates.push(dense);
                            }
                        }
                        Some(dense) => dense_ids.push(dense as u32),
                    }
                }
            }

            let label = match label {
                Some(label) if !self.categories.is_empty() => match self.canonical_label(&label) {
                    LabelMatch::Exact => Some(label),
                    LabelMatch::Repaired(canonical) => {
                        debug!("Repaired category label: {:?} -> {:?}", label, canonical);
                        warnings.push(format!(
                            "Repaired category label \"{}\" to \"{}\"",
                            label, canonical
                        ));
                        Some(canonical)
                    }
                    LabelMatch::Unknown => {
                        if !unknown_labels.contains(&label) {
                            unknown_labels.push(label);
                        }
                        None
                    }
                },
                other => other,
            };

            if let (Some(label), Some(summary)) = (label, summary) {
                validated.push(DenseGroup {
                    label,
                    summary,
                    item_ids: dense_ids,
                });
            }
        }

        if !invalid.is_empty() {
            errors.push(ValidationError::InvalidId {
                ids: IdPreview::new(&invalid, self.preview_limit),
            });
        }
        if !duplicates.is_empty() {
            errors.push(ValidationError::DuplicateAssignment {
                ids: IdPreview::new(&duplicates, self.preview_limit),
            });
        }
        if self.mode.is_exhaustive() {
            let missing: Vec<i64> = self
                .ids
                .dense_ids()
                .map(i64::from)
                .filter(|id| !seen.contains(id))
                .collect();
            if !missing.is_empty() {
                errors.push(ValidationError::MissingAssignment {
                    ids: IdPreview::new(&missing, self.preview_limit),
                });
            }
        }
        let allowed: Vec<String> = self.categories.iter().map(|c| c.label.clone()).collect();
        for label in unknown_labels {
            errors.push(ValidationError::UnknownCategory {
                label,
                allowed: allowed.clone(),
            });
        }

        if errors.is_empty() {
            Ok(ValidatedResponse {
                groups: validated,
                warnings,
            })
        } else {
            Err(errors)
        }
    }

    fn id_field(
        &self,
        group: &Map<String, Value>,
        position: usize,
        errors: &mut Vec<ValidationError>,
    ) -> Option<Vec<i128>> {
        let values = match group.get(ITEM_IDS_FIELD) {
            Some(Value::Array(values)) => values,
            Some(other) => {
                errors.push(ValidationError::structural(format!(
                    "group {}: `{}` must be an array of integers, found {}",
                    position,
                    ITEM_IDS_FIELD,
                    json_type(other)
                )));
                return None;
            }
            None => {
                errors.push(ValidationError::structural(format!(
                    "group {}: missing required field `{}`",
                    position, ITEM_IDS_FIELD
                )));
                return None;
            }
        };

        let mut ids = Vec::with_capacity(values.len());
        for value in values {
            match integral_id(value) {
                Some(id) => ids.push(id),
                None => errors.push(ValidationError::structural(format!(
                    "group {}: `{}` must contain only integers, found {}",
                    position, ITEM_IDS_FIELD, value
                ))),
            }
        }
        Some(ids)
    }

    fn canonical_label(&self, label: &str) -> LabelMatch {
        if self.categories.iter().any(|c| c.label == label) {
            return LabelMatch::Exact;
        }
        let wanted = label.trim().to_lowercase();
        self.categories
            .iter()
            .find(|c| c.label.trim().to_lowercase() == wanted)
            .map(|c| LabelMatch::Repaired(c.label.clone()))
            .unwrap_or(LabelMatch::Unknown)
    }
}

/// An integer id, also when written as `1.0` or beyond the `i64` range
fn integral_id(value: &Value) -> Option<i128> {
    if let Some(id) = value.as_i64() {
        return Some(i128::from(id));
    }
    if let Some(id) = value.as_u64() {
        return Some(i128::from(id));
    }
    value
        .as_f64()
        .filter(|f| f.is_finite() && f.fract() == 0.0)
        .map(|f| f as i128)
}

enum LabelMatch {
    Exact,
    Repaired(String),
    Unknown,
}

fn string_field(
    group: &Map<String, Value>,
    field: &str,
    position: usize,
    errors: &mut Vec<ValidationError>,
) -> Option<String> {
    match group.get(field) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            errors.push(ValidationError::structural(format!(
                "group {}: `{}` must be a string, found {}",
                position,
                field,
                json_type(other)
            )));
            None
        }
        None => {
            errors.push(ValidationError::structural(format!(
                "group {}: missing required field `{}`",
                position, field
            )));
            None
        }
    }
}

fn report_unexpected_fields(
    object: &Map<String, Value>,
    allowed: &[&str],
    location: &str,
    errors: &mut Vec<ValidationError>,
) {
    for key in object.keys() {
        if !allowed.contains(&key.as_str()) {
            errors.push(ValidationError::structural(format!(
                "unexpected field `{}` in {}",
                key, location
            )));
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Strip markdown code fences from a response
fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let clean = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let clean = clean.strip_suffix("```").unwrap_or(clean);
    clean.trim()
}

/// Parse the response, falling back to the outermost `{...}` fragment when
/// the model wrapped the JSON in prose
fn parse_json(raw: &str) -> Result<Value, ValidationError> {
    let clean = strip_markdown_fences(raw);
    if clean.is_empty() {
        return Err(ValidationError::Parse {
            message: "the response was empty".to_string(),
        });
    }

    match serde_json::from_str::<Value>(clean) {
        Ok(value) => Ok(value),
        Err(err) => {
            let fragment = match (clean.find('{'), clean.rfind('}')) {
                (Some(start), Some(end)) if start < end => Some(&clean[start..=end]),
                _ => None,
            };
            fragment
                .filter(|f| f.len() < clean.len())
                .and_then(|f| serde_json::from_str::<Value>(f).ok())
                .ok_or_else(|| ValidationError::Parse {
                    message: err.to_string(),
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: i64) -> IdMap {
        IdMap::build((1..=n).map(|i| i * 100)).unwrap()
    }

    fn kinds(errors: &[ValidationError]) -> Vec<ValidationErrorKind> {
        errors.iter().map(|e| e.kind()).collect()
    }

    #[test]
    fn test_valid_partition() {
        let map = ids(3);
        let validator = ResponseValidator::new(&map, ClassifyMode::Partition, &[]);
        let response = r#"{"groups":[
            {"label":"chips","summary":"GPU news","item_ids":[1,3]},
            {"label":"policy","summary":"EU act","item_ids":[2]}
        ]}"#;

        let validated = validator.validate(response).unwrap();
        assert_eq!(validated.groups.len(), 2);
        assert_eq!(validated.groups[0].item_ids, vec![1, 3]);
        assert!(validated.warnings.is_empty());
    }

    #[test]
    fn test_parse_error_stops_validation() {
        let map = ids(2);
        let validator = ResponseValidator::new(&map, ClassifyMode::Partition, &[]);

        let errors = validator.validate("not json at all").unwrap_err();
        assert_eq!(kinds(&errors), vec![ValidationErrorKind::Parse]);

        let errors = validator.validate("   ").unwrap_err();
        assert_eq!(kinds(&errors), vec![ValidationErrorKind::Parse]);
    }

    #[test]
    fn test_fenced_and_wrapped_json_accepted() {
        let map = ids(1);
        let validator = ResponseValidator::new(&map, ClassifyMode::Partition, &[]);

        let fenced = "```json\n{\"groups\":[{\"label\":\"a\",\"summary\":\"b\",\"item_ids\":[1]}]}\n```";
        assert!(validator.validate(fenced).is_ok());

        let wrapped =
            "Here you go: {\"groups\":[{\"label\":\"a\",\"summary\":\"b\",\"item_ids\":[1]}]} Done.";
        assert!(validator.validate(wrapped).is_ok());
    }

    #[test]
    fn test_missing_groups_field() {
        let map = ids(2);
        let validator = ResponseValidator::new(&map, ClassifyMode::Partition, &[]);

        let errors = validator.validate(r#"{"clusters": []}"#).unwrap_err();
        assert_eq!(kinds(&errors), vec![ValidationErrorKind::Structural]);
        assert!(errors[0].to_string().contains("`groups`"));

        let errors = validator.validate(r#"[1, 2]"#).unwrap_err();
        assert_eq!(kinds(&errors), vec![ValidationErrorKind::Structural]);
    }

    #[test]
    fn test_invalid_id_reported() {
        let map = ids(5);
        let validator = ResponseValidator::new(&map, ClassifyMode::Open, &[]);
        let response = r#"{"groups":[{"label":"a","summary":"b","item_ids":[1,99]}]}"#;

        let errors = validator.validate(response).unwrap_err();
        assert_eq!(kinds(&errors), vec![ValidationErrorKind::InvalidId]);
        assert_eq!(errors[0].ids().unwrap().shown, vec![99]);
        assert!(errors[0].to_string().contains("99"));
    }

    #[test]
    fn test_missing_assignment_in_partition_mode_only() {
        let map = ids(5);
        let response = r#"{"groups":[{"label":"a","summary":"b","item_ids":[1,2,3,4]}]}"#;

        let partition = ResponseValidator::new(&map, ClassifyMode::Partition, &[]);
        let errors = partition.validate(response).unwrap_err();
        assert_eq!(kinds(&errors), vec![ValidationErrorKind::MissingAssignment]);
        assert_eq!(errors[0].ids().unwrap().shown, vec![5]);

        let open = ResponseValidator::new(&map, ClassifyMode::Open, &[]);
        assert!(open.validate(response).is_ok());
    }

    #[test]
    fn test_duplicates_across_and_within_groups() {
        let map = ids(4);
        let validator = ResponseValidator::new(&map, ClassifyMode::Open, &[]);
        let response = r#"{"groups":[
            {"label":"a","summary":"s","item_ids":[1,2,2]},
            {"label":"b","summary":"s","item_ids":[1,3]}
        ]}"#;

        let errors = validator.validate(response).unwrap_err();
        assert_eq!(kinds(&errors), vec![ValidationErrorKind::DuplicateAssignment]);
        assert_eq!(errors[0].ids().unwrap().shown, vec![2, 1]);
    }

    #[test]
    fn test_all_errors_accumulated() {
        let map = ids(4);
        let categories = vec![CategorySpec::new("AI policy", "")];
        let validator = ResponseValidator::new(&map, ClassifyMode::Partition, &categories);
        let response = r#"{"groups":[
            {"label":"robots","summary":"s","item_ids":[1,1,42]},
            {"label":"AI policy","summary":7,"item_ids":[2]}
        ]}"#;

        let errors = validator.validate(response).unwrap_err();
        assert_eq!(
            kinds(&errors),
            vec![
                ValidationErrorKind::Structural,
                ValidationErrorKind::InvalidId,
                ValidationErrorKind::DuplicateAssignment,
                ValidationErrorKind::MissingAssignment,
                ValidationErrorKind::UnknownCategory,
            ]
        );
    }

    #[test]
    fn test_case_insensitive_label_repair() {
        let map = ids(2);
        let categories = vec![CategorySpec::new("Computer Vision", "images")];
        let validator = ResponseValidator::new(&map, ClassifyMode::Partition, &categories);
        let response = r#"{"groups":[{"label":"computer vision ","summary":"s","item_ids":[1,2]}]}"#;

        let validated = validator.validate(response).unwrap();
        assert_eq!(validated.groups[0].label, "Computer Vision");
        assert_eq!(validated.warnings.len(), 1);
    }

    #[test]
    fn test_unknown_category_lists_allowed_labels() {
        let map = ids(1);
        let categories = vec![
            CategorySpec::new("Computer Vision", ""),
            CategorySpec::new("AI policy", ""),
        ];
        let validator = ResponseValidator::new(&map, ClassifyMode::Partition, &categories);
        let response = r#"{"groups":[{"label":"Robotics","summary":"s","item_ids":[1]}]}"#;

        let errors = validator.validate(response).unwrap_err();
        assert_eq!(kinds(&errors), vec![ValidationErrorKind::UnknownCategory]);
        let text = errors[0].to_string();
        assert!(text.contains("\"Robotics\""));
        assert!(text.contains("\"Computer Vision\", \"AI policy\""));
    }

    #[test]
    fn test_extra_fields_are_structural_errors() {
        let map = ids(1);
        let validator = ResponseValidator::new(&map, ClassifyMode::Partition, &[]);
        let response =
            r#"{"groups":[{"label":"a","summary":"b","item_ids":[1],"confidence":0.9}],"note":"x"}"#;

        let errors = validator.validate(response).unwrap_err();
        assert_eq!(
            kinds(&errors),
            vec![ValidationErrorKind::Structural, ValidationErrorKind::Structural]
        );
    }

    #[test]
    fn test_non_integer_ids_rejected() {
        let map = ids(2);
        let validator = ResponseValidator::new(&map, ClassifyMode::Open, &[]);
        let response = r#"{"groups":[{"label":"a","summary":"b","item_ids":[1,"2",2.5]}]}"#;

        let errors = validator.validate(response).unwrap_err();
        assert_eq!(
            kinds(&errors),
            vec![ValidationErrorKind::Structural, ValidationErrorKind::Structural]
        );
    }

    #[test]
    fn test_integral_float_ids_accepted() {
        let map = ids(2);
        let validator = ResponseValidator::new(&map, ClassifyMode::Partition, &[]);
        let response = r#"{"groups":[{"label":"a","summary":"b","item_ids":[1.0,2]}]}"#;

        let validated = validator.validate(response).unwrap();
        assert_eq!(validated.groups[0].item_ids, vec![1, 2]);
    }

    #[test]
    fn test_out_of_range_ids_are_invalid() {
        let map = ids(2);
        let validator = ResponseValidator::new(&map, ClassifyMode::Partition, &[]);
        let response =
            r#"{"groups":[{"label":"a","summary":"b","item_ids":[1,2,18446744073709551615,-4]}]}"#;

        let errors = validator.validate(response).unwrap_err();
        assert_eq!(kinds(&errors), vec![ValidationErrorKind::InvalidId]);
        assert_eq!(
            errors[0].ids().unwrap().shown,
            vec![18_446_744_073_709_551_615, -4]
        );
        assert!(errors[0].to_string().contains("18446744073709551615"));
    }

    #[test]
    fn test_preview_is_capped() {
        let map = ids(30);
        let validator =
            ResponseValidator::new(&map, ClassifyMode::Partition, &[]).with_preview_limit(10);
        let response = r#"{"groups":[{"label":"a","summary":"b","item_ids":[1]}]}"#;

        let errors = validator.validate(response).unwrap_err();
        let preview = errors[0].ids().unwrap();
        assert_eq!(preview.shown.len(), 10);
        assert_eq!(preview.total, 29);
        assert!(errors[0].to_string().contains("(and 19 more)"));
    }
}
