//! Flow CLI subcommands.
//!
//! Lifecycle commands (`publish`, `status`, `delete`) queue a job in the
//! database and return. A running `flowplane serve` picks the job up; `--wait`
//! drains the queue in this process instead.

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use flowplane_types::flow::{
    CreateFlowRequest, Flow, FlowId, FlowOperation, FlowOperationStatus, FlowStatus, PopulatedFlow,
};

use crate::state::AppState;

#[derive(Subcommand)]
pub enum FlowCommand {
    /// Create a disabled flow with an empty draft.
    Create {
        /// Display name.
        name: String,

        /// Owning project.
        #[arg(short, long)]
        project: String,

        /// Folder to place the flow in.
        #[arg(long)]
        folder: Option<String>,
    },

    /// List a project's flows.
    #[command(alias = "ls")]
    List {
        #[arg(short, long)]
        project: String,
    },

    /// Show a flow and its current version.
    Show { id: String },

    /// Lock the current draft, publish it and switch the flow's status.
    Publish {
        id: String,

        /// Status after publishing (enabled or disabled).
        #[arg(long, default_value = "enabled")]
        status: String,

        /// Run queued jobs in this process before returning.
        #[arg(long)]
        wait: bool,
    },

    /// Enable or disable the published version.
    Status {
        id: String,

        /// enabled or disabled
        status: String,

        #[arg(long)]
        wait: bool,
    },

    /// Delete a flow, its versions, trigger sources and stored values.
    #[command(alias = "rm")]
    Delete {
        id: String,

        #[arg(long)]
        wait: bool,
    },
}

pub async fn handle_flow_command(cmd: FlowCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        FlowCommand::Create { name, project, folder } => {
            let created = state
                .flow_service
                .create(CreateFlowRequest {
                    project_id: project,
                    display_name: name,
                    folder_id: folder,
                })
                .await?;
            print_flow(&created, json, "Created")
        }
        FlowCommand::List { project } => list_flows(state, &project, json).await,
        FlowCommand::Show { id } => {
            let flow = state.flow_service.get(&parse_id(&id)?).await?;
            print_flow(&flow, json, "Flow")
        }
        FlowCommand::Publish { id, status, wait } => {
            let status = parse_status(&status)?;
            lifecycle(state, &id, FlowOperation::LockAndPublish { status: Some(status) }, wait, json).await
        }
        FlowCommand::Status { id, status, wait } => {
            let status = parse_status(&status)?;
            lifecycle(state, &id, FlowOperation::ChangeStatus { status }, wait, json).await
        }
        FlowCommand::Delete { id, wait } => delete_flow(state, &id, wait, json).await,
    }
}

fn parse_id(raw: &str) -> Result<FlowId> {
    raw.parse().with_context(|| format!("'{raw}' is not a flow id"))
}

fn parse_status(raw: &str) -> Result<FlowStatus> {
    raw.parse::<FlowStatus>().map_err(anyhow::Error::msg)
}

/// Run due jobs until the queue has nothing left to claim.
async fn drain(state: &AppState) -> Result<usize> {
    let mut processed = 0;
    while state.worker.run_once().await? {
        processed += 1;
    }
    Ok(processed)
}

async fn lifecycle(state: &AppState, id: &str, operation: FlowOperation, wait: bool, json: bool) -> Result<()> {
    let flow_id = parse_id(id)?;
    let mut flow = state.flow_service.update(&flow_id, None, operation).await?;

    if wait {
        let processed = drain(state).await?;
        tracing::debug!(%flow_id, processed, "drained job queue");
        flow = state.flow_service.get(&flow_id).await?;
    }

    let title = if flow.flow.operation_status == FlowOperationStatus::None {
        "Updated"
    } else {
        "Queued"
    };
    print_flow(&flow, json, title)
}

async fn delete_flow(state: &AppState, id: &str, wait: bool, json: bool) -> Result<()> {
    let flow_id = parse_id(id)?;
    state.flow_service.delete(&flow_id).await?;

    let deleted = if wait {
        drain(state).await?;
        state.flow_service.get(&flow_id).await.is_err()
    } else {
        false
    };

    if json {
        let result = serde_json::json!({
            "flowId": flow_id,
            "deleted": deleted,
            "queued": !deleted,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!();
        if deleted {
            println!("  {} Deleted flow {}", style("ok").green(), style(flow_id).cyan());
        } else {
            println!(
                "  {} Deletion of {} queued",
                style("ok").green(),
                style(flow_id).cyan()
            );
        }
        println!();
    }
    Ok(())
}

async fn list_flows(state: &AppState, project: &str, json: bool) -> Result<()> {
    let flows = state.flow_service.list(project).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&flows)?);
        return Ok(());
    }

    if flows.is_empty() {
        println!();
        println!(
            "  {} No flows in project '{}'.",
            style("i").blue().bold(),
            style(project).cyan()
        );
        println!("     Create one with: flowplane flow create <name> --project {project}");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Id").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Operation").fg(Color::White),
        Cell::new("Published").fg(Color::White),
        Cell::new("Created").fg(Color::White),
    ]);

    for flow in &flows {
        table.add_row(vec![
            Cell::new(flow.id).fg(Color::Cyan),
            status_cell(flow),
            Cell::new(flow.operation_status.as_str()),
            Cell::new(
                flow.published_version_id
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            )
            .fg(Color::DarkGrey),
            Cell::new(flow.created_at.format("%Y-%m-%d %H:%M").to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("  Flows in '{}' ({})", style(project).cyan(), flows.len());
    println!();
    println!("{table}");
    println!();
    Ok(())
}

fn status_cell(flow: &Flow) -> Cell {
    let color = match flow.status {
        FlowStatus::Enabled => Color::Green,
        FlowStatus::Disabled => Color::Yellow,
    };
    Cell::new(flow.status.as_str()).fg(color)
}

fn print_flow(populated: &PopulatedFlow, json: bool, title: &str) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(populated)?);
        return Ok(());
    }

    let flow = &populated.flow;
    let version = &populated.version;
    println!();
    println!(
        "  {} {} '{}'",
        style(title).green().bold(),
        style(flow.id).cyan(),
        version.display_name
    );
    println!();
    println!("  {:<18} {}", style("Project").dim(), flow.project_id);
    println!("  {:<18} {}", style("Status").dim(), flow.status);
    println!("  {:<18} {}", style("Operation").dim(), flow.operation_status);
    if let Some(published) = flow.published_version_id {
        println!("  {:<18} {}", style("Published").dim(), published);
    }
    println!(
        "  {:<18} {} ({}{})",
        style("Current version").dim(),
        version.id,
        version.state,
        if version.valid { "" } else { ", invalid" }
    );
    println!();
    Ok(())
}
