//! Operator-facing output rendering.

use owo_colors::OwoColorize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::core::domain::{EventStatus, RunSummary, SyncEvent};

#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "ID")]
    id: i32,
    #[tabled(rename = "Platform")]
    platform: String,
    #[tabled(rename = "External ID")]
    external_id: String,
    #[tabled(rename = "Change")]
    change_type: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Detected")]
    detected_at: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Render events as a table for `sync events`.
#[must_use]
pub fn render_events(events: &[SyncEvent]) -> String {
    if events.is_empty() {
        return "No events need attention.".to_string();
    }

    let rows: Vec<EventRow> = events
        .iter()
        .map(|event| EventRow {
            id: event.id.value(),
            platform: event.platform.to_string(),
            external_id: event.external_id.to_string(),
            change_type: event.change_type.to_string(),
            status: colored_status(event.status),
            detected_at: event.detected_at.format("%Y-%m-%d %H:%M").to_string(),
            reason: event.notes.reason.clone().unwrap_or_default(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

fn colored_status(status: EventStatus) -> String {
    match status {
        EventStatus::Error => status.to_string().red().to_string(),
        EventStatus::Partial => status.to_string().yellow().to_string(),
        EventStatus::Processed => status.to_string().green().to_string(),
        _ => status.to_string(),
    }
}

/// Render the run summary printed after `sync run`.
#[must_use]
pub fn render_summary(summary: &RunSummary) -> String {
    let mut lines = vec![
        format!(
            "events: {} detected, {} processed, {} partial, {} error, {} skipped",
            summary.events_detected,
            summary.events_processed,
            summary.events_partial,
            summary.events_error,
            summary.events_skipped,
        ),
        format!(
            "actions: {} succeeded, {} failed",
            summary.actions_succeeded, summary.actions_failed
        ),
        format!(
            "changes: {} sales, {} price, {} created, {} updated, {} removed",
            summary.sales,
            summary.price_changes,
            summary.listings_created,
            summary.listings_updated,
            summary.listings_removed,
        ),
    ];

    for (platform, report) in &summary.detection {
        let outcome = match &report.outcome {
            crate::core::domain::DetectionOutcome::Completed => "ok".green().to_string(),
            crate::core::domain::DetectionOutcome::TimedOut => "timed out".red().to_string(),
            crate::core::domain::DetectionOutcome::Failed { message } => {
                format!("{}: {message}", "failed".red())
            }
        };
        lines.push(format!(
            "  {platform}: {} listings, {} events, {}ms, {outcome}",
            report.listings_fetched, report.events_written, report.duration_ms
        ));
    }

    lines.join("\n")
}
