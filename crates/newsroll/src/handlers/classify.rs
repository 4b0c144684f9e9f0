//! Classify command

use crate::handlers::truncate;
use crate::state::AppState;
use anyhow::Context;
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use newsroll_classifier::{
    classify_batches, split_batches, Classifier, ClassifierOptions, ClassifyRequest,
    CompletionClient, OpenAiClient, ARTICLE_CATEGORIZATION_TASK, TOPIC_GROUPING_TASK,
};
use newsroll_core::{
    ClassificationLog, ClassificationReport, ClassificationResult, ClassifyMode, DecodingMode,
    Group, LogOperations, Outcome, WorkItem,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Classify work items
///
/// Usage:
///   newsroll classify --input items.json
///   newsroll classify --input items.json --mode open --output groups.json
#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// JSON array of items, each with an integer `id` and string fields
    #[arg(short, long)]
    pub input: PathBuf,

    /// partition (every item assigned) or open (items may be left out)
    #[arg(short, long, default_value_t = ClassifyMode::Partition)]
    pub mode: ClassifyMode,

    /// Request plain JSON objects instead of schema-constrained output
    #[arg(long)]
    pub free_form: bool,

    /// File holding the task instructions
    #[arg(long)]
    pub task_file: Option<PathBuf>,

    /// Task name recorded in the run log
    #[arg(long, default_value = "classify")]
    pub task: String,

    /// Write the merged result as JSON
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Merged output across batches
#[derive(Debug, Serialize)]
struct ClassifyOutput {
    groups: Vec<Group>,
    warnings: Vec<String>,
    batches: Vec<ClassificationReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<String>,
}

pub async fn classify(state: &AppState, args: ClassifyArgs) -> anyhow::Result<String> {
    let client = OpenAiClient::from_config(&state.config)?;
    info!("Using model {} (mode={})", client.model(), args.mode);
    run(state, args, Arc::new(client)).await
}

async fn run(
    state: &AppState,
    args: ClassifyArgs,
    client: Arc<dyn CompletionClient>,
) -> anyhow::Result<String> {
    let content = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read input: {}", args.input.display()))?;
    let items: Vec<WorkItem> = serde_json::from_str(&content)
        .context("Input must be a JSON array of objects with an integer `id` and string fields")?;

    let config = &state.config;
    let instructions = match &args.task_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read task file: {}", path.display()))?,
        None if config.categories.is_empty() => TOPIC_GROUPING_TASK.to_string(),
        None => ARTICLE_CATEGORIZATION_TASK.to_string(),
    };

    let mut options = ClassifierOptions::from(&config.classification);
    if args.free_form {
        options.decoding_mode = DecodingMode::Freeform;
    }
    info!("Classifying {} items", items.len());
    let classifier = Classifier::with_options(client, options)?;

    let requests: Vec<ClassifyRequest> = split_batches(items, config.classification.batch_size)
        .into_iter()
        .map(|batch| {
            classifier
                .request(batch)
                .with_categories(config.categories.clone())
                .with_mode(args.mode)
                .with_instructions(instructions.clone())
        })
        .collect();
    let sizes: Vec<usize> = requests.iter().map(|r| r.items.len()).collect();
    let total = requests.len();

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")?);
    spinner.set_message(format!("Classifying {} batches", total));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let results =
        classify_batches(&classifier, requests, config.classification.concurrency).await;
    spinner.finish_and_clear();

    // Every batch gets a log row, failed ones included
    let logs = state.db.logs();
    let mut finished = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for (index, (result, size)) in results.into_iter().zip(sizes).enumerate() {
        let batch = index + 1;
        match result {
            Ok(result) => {
                if result.report.outcome == Outcome::Degraded {
                    warn!(
                        "Batch {} degraded after {} attempts",
                        batch, result.report.attempts
                    );
                }
                logs.record(&ClassificationLog::from_result(
                    &args.task, args.mode, size, &result,
                ))
                .await?;
                finished.push(result);
            }
            Err(e) => {
                error!("Batch {} failed: {}", batch, e);
                logs.record(&ClassificationLog::from_error(
                    &args.task, args.mode, size, &e,
                ))
                .await?;
                failures.push(format!("batch {}: {}", batch, e));
            }
        }
    }

    let mut output = merge_results(finished);
    output.failures = failures;

    if let Some(path) = &args.output {
        std::fs::write(path, serde_json::to_string_pretty(&output)?)
            .with_context(|| format!("Failed to write output: {}", path.display()))?;
    }

    if !output.failures.is_empty() {
        let mut message = format!(
            "{} of {} batches failed: {}",
            output.failures.len(),
            total,
            output.failures.join("; ")
        );
        if let Some(path) = &args.output {
            message.push_str(&format!(
                ". Results of the other batches were written to {}",
                path.display()
            ));
        }
        anyhow::bail!(message);
    }

    Ok(render(&output, args.output.as_ref()))
}

/// Merge per-batch groups by label, keeping first-seen order
fn merge_results(results: Vec<ClassificationResult>) -> ClassifyOutput {
    let mut groups: Vec<Group> = Vec::new();
    let mut warnings = Vec::new();
    let mut batches = Vec::with_capacity(results.len());

    for result in results {
        for group in result.groups {
            match groups.iter_mut().find(|g| g.label == group.label) {
                Some(existing) => {
                    if existing.is_empty() && !group.is_empty() {
                        existing.summary = group.summary;
                    }
                    existing.item_ids.extend(group.item_ids);
                }
                None => groups.push(group),
            }
        }
        warnings.extend(result.warnings);
        batches.push(result.report);
    }

    ClassifyOutput {
        groups,
        warnings,
        batches,
        failures: Vec::new(),
    }
}

fn render(output: &ClassifyOutput, written_to: Option<&PathBuf>) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Label").fg(Color::Green),
            Cell::new("Items").fg(Color::Green),
            Cell::new("Summary").fg(Color::Green),
        ]);

    for group in &output.groups {
        table.add_row(vec![
            group.label.clone(),
            group.item_ids.len().to_string(),
            truncate(&group.summary, 60),
        ]);
    }

    let degraded = output
        .batches
        .iter()
        .filter(|r| r.outcome == Outcome::Degraded)
        .count();
    let attempts: u32 = output.batches.iter().map(|r| r.attempts).sum();

    let mut text = format!(
        "\n{}\n\nBatches: {} ({} degraded), attempts: {}, warnings: {}",
        table,
        output.batches.len(),
        degraded,
        attempts,
        output.warnings.len()
    );
    if let Some(path) = written_to {
        text.push_str(&format!("\n✓ Wrote result to {}", path.display()));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use newsroll_classifier::{CompletionError, CompletionRequest};
    use newsroll_core::{Config, Database, FAILED_OUTCOME};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Answers requests from a fixed script, in order
    struct ScriptedClient(Mutex<VecDeque<Result<String, CompletionError>>>);

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, CompletionError> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(CompletionError::Transport("script exhausted".into())))
        }
    }

    #[tokio::test]
    async fn test_failed_batch_is_logged_and_others_kept() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("items.json");
        let output = temp_dir.path().join("groups.json");
        std::fs::write(
            &input,
            r#"[{"id": 11, "title": "a"}, {"id": 12, "title": "b"}, {"id": 13, "title": "c"}]"#,
        )
        .unwrap();

        let mut config = Config::default();
        config.classification.batch_size = 1;
        config.classification.concurrency = 1;
        let db = Database::open(temp_dir.path().join("runs.db")).await.unwrap();
        let state = AppState {
            config: Arc::new(config),
            db: Arc::new(db),
        };

        let answer = r#"{"groups":[{"label":"chips","summary":"GPU news","item_ids":[1]}]}"#;
        let client = Arc::new(ScriptedClient(Mutex::new(VecDeque::from(vec![
            Ok(answer.to_string()),
            Err(CompletionError::Transport("authentication failed (401)".into())),
            Ok(answer.to_string()),
        ]))));

        let args = ClassifyArgs {
            input,
            mode: ClassifyMode::Partition,
            free_form: false,
            task_file: None,
            task: "topics".to_string(),
            output: Some(output.clone()),
        };
        let err = run(&state, args, client).await.unwrap_err();
        assert!(err.to_string().contains("1 of 3 batches failed: batch 2"));

        let logs = state.db.logs();
        assert_eq!(logs.count().await.unwrap(), 3);
        let failed: Vec<ClassificationLog> = logs
            .recent(10)
            .await
            .unwrap()
            .into_iter()
            .filter(|l| l.outcome == FAILED_OUTCOME)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].items_processed, 1);
        assert!(failed[0].error_message.as_deref().unwrap().contains("401"));

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written["groups"][0]["item_ids"], serde_json::json!([11, 13]));
        assert_eq!(written["batches"].as_array().unwrap().len(), 2);
        assert_eq!(written["failures"].as_array().unwrap().len(), 1);
    }

    fn result(groups: Vec<Group>, outcome: Outcome) -> ClassificationResult {
        ClassificationResult {
            groups,
            warnings: vec![],
            report: ClassificationReport {
                outcome,
                attempts: 1,
                rate_limited: 0,
                decoding_mode: DecodingMode::Schema,
                last_errors: vec![],
                duration_ms: 5,
            },
        }
    }

    #[test]
    fn test_merge_results_by_label() {
        let merged = merge_results(vec![
            result(
                vec![
                    Group::new("AI policy", "No items found for this category.", vec![]),
                    Group::new("Computer Vision", "Vision models", vec![1, 2]),
                ],
                Outcome::Success,
            ),
            result(
                vec![
                    Group::new("AI policy", "EU AI act", vec![7]),
                    Group::new("Computer Vision", "More vision", vec![8]),
                ],
                Outcome::Degraded,
            ),
        ]);

        assert_eq!(merged.groups.len(), 2);
        assert_eq!(merged.groups[0].item_ids, vec![7]);
        assert_eq!(merged.groups[0].summary, "EU AI act");
        assert_eq!(merged.groups[1].item_ids, vec![1, 2, 8]);
        assert_eq!(merged.groups[1].summary, "Vision models");
        assert_eq!(merged.batches.len(), 2);
    }

    #[test]
    fn test_render_counts_degraded_batches() {
        let output = merge_results(vec![
            result(vec![Group::new("a", "s", vec![1])], Outcome::Success),
            result(vec![], Outcome::Degraded),
        ]);

        let text = render(&output, None);
        assert!(text.contains("Batches: 2 (1 degraded), attempts: 2"));
    }
}
