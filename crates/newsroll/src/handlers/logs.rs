//! Logs command

use crate::handlers::truncate;
use crate::state::AppState;
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use newsroll_core::{ClassificationLog, LogOperations, FAILED_OUTCOME};

/// List recent classification runs
///
/// Usage:
///   newsroll logs
///   newsroll logs --limit 50
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Maximum number of runs to show
    #[arg(short, long, default_value_t = 20)]
    pub limit: u32,
}

pub async fn logs(state: &AppState, args: LogsArgs) -> anyhow::Result<String> {
    let store = state.db.logs();
    let entries = store.recent(args.limit).await?;

    if entries.is_empty() {
        return Ok("No classification runs recorded.".to_string());
    }

    let total = store.count().await?;
    Ok(format!(
        "\n{}\n\nShowing {} of {} runs",
        render(&entries),
        entries.len(),
        total
    ))
}

fn render(entries: &[ClassificationLog]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(Color::Cyan),
            Cell::new("Time").fg(Color::Cyan),
            Cell::new("Task").fg(Color::Cyan),
            Cell::new("Mode").fg(Color::Cyan),
            Cell::new("Items").fg(Color::Cyan),
            Cell::new("Groups").fg(Color::Cyan),
            Cell::new("Attempts").fg(Color::Cyan),
            Cell::new("Outcome").fg(Color::Cyan),
            Cell::new("Decoding").fg(Color::Cyan),
            Cell::new("Duration").fg(Color::Cyan),
            Cell::new("Last error").fg(Color::Cyan),
        ]);

    for log in entries {
        let time = chrono::DateTime::from_timestamp(log.created_at, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| log.created_at.to_string());
        let outcome = match log.outcome.as_str() {
            "degraded" => Cell::new(&log.outcome).fg(Color::Yellow),
            FAILED_OUTCOME => Cell::new(&log.outcome).fg(Color::Red),
            _ => Cell::new(&log.outcome),
        };
        let last_error = log
            .error_message
            .as_deref()
            .and_then(|m| m.lines().next())
            .map(|line| truncate(line, 40))
            .unwrap_or_default();

        table.add_row(vec![
            Cell::new(log.id),
            Cell::new(time),
            Cell::new(&log.task),
            Cell::new(&log.mode),
            Cell::new(log.items_processed),
            Cell::new(log.groups_created),
            Cell::new(log.attempts),
            outcome,
            Cell::new(&log.decoding_mode),
            Cell::new(format!("{} ms", log.duration_ms)),
            Cell::new(last_error),
        ]);
    }

    table
}
