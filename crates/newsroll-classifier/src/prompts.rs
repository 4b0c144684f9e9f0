//! Prompt composition
//!
//! The conversation is additive: the instructions and the initial payload
//! message are never removed, and each content retry appends exactly one
//! feedback message, so the model sees everything it got wrong so far.

use crate::client::{ChatMessage, CompletionRequest, ResponseSchema};
use crate::Result;
use newsroll_core::schema::{GROUPS_FIELD, ITEM_IDS_FIELD, LABEL_FIELD, SUMMARY_FIELD};
use newsroll_core::{CategorySpec, ClassifyMode, IdMap, SanitizedBatch, ValidationError};

/// Instructions used when a request names no task
pub const DEFAULT_TASK: &str =
    "You classify work items into groups. Follow the output rules in the user message exactly.";

/// Task instructions for sorting parsed articles into the configured categories
pub const ARTICLE_CATEGORIZATION_TASK: &str = r#"You are an expert editor of an AI newsletter.

Assign every article to EXACTLY ONE of the predefined categories.

Guidelines:
1. The category label must match one of the provided labels exactly.
2. A catch-all category such as "other topics" is a last resort; if an article has any connection to a specific category, use that category instead.
3. When an article fits several categories, choose the one that best represents its primary focus.
4. The summary of each category is 1-2 sentences describing the developments covered by its articles."#;

/// Task instructions for discovering topic groups among articles
pub const TOPIC_GROUPING_TASK: &str = r#"You are an expert editor of an AI newsletter.

Group articles that report on the same specific topic, event or announcement.

Guidelines:
1. Titles must be highly specific and include company, product or event names (e.g. "Google's Gemini model for Japanese hospitals", not "AI in healthcare").
2. Only group articles that genuinely share a topic; an article without a matching partner may form its own group.
3. The summary is 1-3 sentences explaining the shared topic, with specific details when available."#;

/// Builds and extends the conversation for one classification call
#[derive(Debug, Clone)]
pub struct PromptComposer<'a> {
    instructions: &'a str,
    categories: &'a [CategorySpec],
    mode: ClassifyMode,
}

impl<'a> PromptComposer<'a> {
    pub fn new(instructions: &'a str, categories: &'a [CategorySpec], mode: ClassifyMode) -> Self {
        Self {
            instructions,
            categories,
            mode,
        }
    }

    /// Initial conversation: instructions plus a single payload message
    pub fn compose(&self, batch: &SanitizedBatch) -> Result<Conversation> {
        let payload = serde_json::to_string_pretty(&batch.items)?;

        let mut message = String::new();
        message.push_str("## Output rules\n");
        message.push_str(&format!(
            "- Respond with a single JSON object with one field `{}`: an array of objects with exactly the fields `{}` (string), `{}` (string) and `{}` (array of integer item ids).\n",
            GROUPS_FIELD, LABEL_FIELD, SUMMARY_FIELD, ITEM_IDS_FIELD
        ));
        message.push_str(&format!("- {}\n", self.coverage_rule()));
        message.push_str("- Do not add any other fields or any text outside the JSON object.\n");

        message.push('\n');
        if self.categories.is_empty() {
            message.push_str("## Labels\nChoose your own concise, specific label for each group.\n");
        } else {
            message.push_str(
                "## Categories\nUse only these category labels, spelled exactly as written:\n",
            );
            for category in self.categories {
                let line = if category.description.is_empty() {
                    format!("- \"{}\"\n", category.label)
                } else {
                    format!("- \"{}\": {}\n", category.label, category.description)
                };
                message.push_str(&line);
            }
        }

        message.push_str(&format!(
            "\n## Items\n{}\n\n## Valid ids\nThere are {} items; {}. Do not use any other ids.",
            payload,
            batch.ids.len(),
            batch.ids.describe_range()
        ));

        Ok(Conversation {
            instructions: self.instructions.to_string(),
            messages: vec![ChatMessage::user(message)],
        })
    }

    /// Feedback message for a failed attempt
    pub fn feedback(&self, errors: &[ValidationError], ids: &IdMap) -> ChatMessage {
        let mut message = String::from("Your previous response had the following problems:\n");
        for (index, error) in errors.iter().enumerate() {
            message.push_str(&format!("{}. {}\n", index + 1, error));
        }
        message.push_str(&format!(
            "\nPlease answer again with the complete, corrected JSON object. Remember: {}, and {}",
            ids.describe_range(),
            lowercase_first(self.coverage_rule())
        ));
        ChatMessage::user(message)
    }

    fn coverage_rule(&self) -> &'static str {
        match self.mode {
            ClassifyMode::Partition => {
                "Every item id must appear in exactly one group; no id may be left out or repeated."
            }
            ClassifyMode::Open => {
                "Each item id may appear in at most one group; items that fit no group may be left out."
            }
        }
    }
}

fn lowercase_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Message history of one classification call
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    instructions: String,
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Request for the current history; `schema: None` selects free-form JSON
    pub fn request(&self, schema: Option<&ResponseSchema>) -> CompletionRequest {
        CompletionRequest {
            instructions: self.instructions.clone(),
            schema: schema.cloned(),
            messages: self.messages.clone(),
        }
    }
}
