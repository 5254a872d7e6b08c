//! Job queue inspection.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use flowplane_core::queue::JobQueue;

use crate::state::AppState;

pub async fn list_jobs(state: &AppState, json: bool) -> Result<()> {
    let jobs = state.queue.list().await?;

    if json {
        let rows: Vec<_> = jobs
            .iter()
            .map(|job| {
                serde_json::json!({
                    "jobId": job.job_id.to_string(),
                    "type": job.data.kind(),
                    "flowId": job.data.flow_id(),
                    "state": job.state.as_str(),
                    "attemptsMade": job.attempts_made,
                    "maxAttempts": job.max_attempts,
                    "runAt": job.run_at,
                    "lastError": job.last_error,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if jobs.is_empty() {
        println!();
        println!("  {} No queued jobs.", style("i").blue().bold());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Job").fg(Color::White),
        Cell::new("State").fg(Color::White),
        Cell::new("Attempts").fg(Color::White),
        Cell::new("Run at").fg(Color::White),
        Cell::new("Last error").fg(Color::White),
    ]);

    for job in &jobs {
        table.add_row(vec![
            Cell::new(job.job_id.to_string()).fg(Color::Cyan),
            Cell::new(job.state.as_str()),
            Cell::new(format!("{}/{}", job.attempts_made, job.max_attempts)),
            Cell::new(job.run_at.format("%Y-%m-%d %H:%M:%S").to_string()).fg(Color::DarkGrey),
            Cell::new(job.last_error.as_deref().unwrap_or("-")).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}
