//! CLI output formatting

use crate::{
    core::{ExecutionStatus, StepState},
    execution::ExecutionEvent,
    persistence::ExecutionSummary,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Create a progress bar over the steps of a run
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    // The template is a constant; fall back to the default bar if it is ever rejected
    if let Ok(template) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        progress.set_style(template.progress_chars("#>-"));
    }
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a step state for display
pub fn format_step_state(state: &StepState) -> String {
    match state {
        StepState::Pending => style("PENDING").dim().to_string(),
        StepState::Running { .. } => style("RUNNING").yellow().to_string(),
        StepState::Completed { .. } => style("COMPLETED").green().to_string(),
        StepState::Failed { exit_code: Some(code), .. } => {
            style(format!("FAILED (exit {})", code)).red().to_string()
        }
        StepState::Failed { .. } => style("FAILED").red().to_string(),
        StepState::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Skipped => style("SKIPPED").dim().to_string(),
        ExecutionStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

/// Format execution summary for display
pub fn format_execution_summary(summary: &ExecutionSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Completed => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::Skipped => SKIP,
        _ => INFO,
    };

    let failure = match (&summary.failed_step, summary.failure_kind) {
        (Some(step), Some(kind)) => format!(" - {} in {}", kind, style(step).red()),
        (None, Some(kind)) => format!(" - {}", kind),
        _ => String::new(),
    };

    format!(
        "{} {} - {} - {} {} - {} ({}/{}){}",
        status_icon,
        style(&summary.execution_id.to_string()[..8]).dim(),
        style(&summary.pipeline_name).bold(),
        summary.event,
        style(&summary.branch).cyan(),
        format_status(summary.status),
        summary.completed_steps,
        summary.total_steps,
        failure
    )
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name,
        } => format!(
            "{} Starting pipeline {} ({})",
            ROCKET,
            style(pipeline_name).bold(),
            style(&execution_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::PipelineSkipped { reason, .. } => {
            format!("{} Not triggered: {}", SKIP, style(reason).dim())
        }
        ExecutionEvent::JobStarted { job_id, name } => {
            if name == job_id {
                format!("{} Job {}", ROCKET, style(job_id).bold())
            } else {
                format!("{} Job {} ({})", ROCKET, style(name).bold(), style(job_id).dim())
            }
        }
        ExecutionEvent::JobProvisioned {
            workspace,
            runtime_version,
            ..
        } => match runtime_version {
            Some(version) => format!(
                "{} Workspace {} (runtime {})",
                INFO,
                style(workspace.display()).dim(),
                style(version).cyan()
            ),
            None => format!("{} Workspace {}", INFO, style(workspace.display()).dim()),
        },
        ExecutionEvent::ProvisioningFailed { job_id, error } => format!(
            "{} Provisioning {} failed: {}",
            CROSS,
            style(job_id).red(),
            style(error).dim()
        ),
        ExecutionEvent::StepStarted {
            step_id,
            index,
            total,
            ..
        } => format!(
            "{} [{}/{}] {}",
            SPINNER,
            style(index).dim(),
            style(total).dim(),
            style(step_id).cyan()
        ),
        ExecutionEvent::StepOutput { step_id, output, .. } => {
            format!("{} Output from {}:\n{}", INFO, style(step_id).dim(), output)
        }
        ExecutionEvent::StepCompleted {
            step_id,
            duration_ms,
            ..
        } => format!(
            "{} {} ({})",
            CHECK,
            style(step_id).green(),
            style(format_duration(Duration::from_millis(*duration_ms))).dim()
        ),
        ExecutionEvent::StepFailed {
            step_id,
            kind,
            error,
            ..
        } => format!(
            "{} {}: {} ({})",
            CROSS,
            style(step_id).red(),
            kind,
            style(error).dim()
        ),
        ExecutionEvent::StepSkipped { step_id, reason, .. } => {
            format!("{} {} ({})", SKIP, style(step_id).dim(), style(reason).dim())
        }
        ExecutionEvent::JobFinished { job_id, status } => {
            format!("{} Job {} {}", INFO, style(job_id).bold(), format_status(*status))
        }
        ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
        } => {
            let status_str = match status {
                ExecutionStatus::Completed => format!("{} completed", style("successfully").green()),
                ExecutionStatus::Failed => style("failed").red().to_string(),
                ExecutionStatus::Skipped => style("skipped").dim().to_string(),
                _ => format!("{:?}", status),
            };
            format!(
                "{} Pipeline ({}) {}",
                INFO,
                style(&execution_id.to_string()[..8]).dim(),
                status_str
            )
        }
    }
}

/// Format step output with truncation
///
/// Keeps the last `max_lines` lines; failures print at the end.
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.trim_end().to_string()
    } else {
        let kept = lines[lines.len() - max_lines..].join("\n");
        format!(
            "{}... ({} earlier lines)\n{}",
            style("[truncated]").dim(),
            lines.len() - max_lines,
            kept
        )
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
