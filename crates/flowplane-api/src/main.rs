//! Flowplane CLI and REST API entry point.
//!
//! Binary name: `flowplane`
//!
//! Parses CLI arguments, initializes tracing, the database and services, then
//! dispatches to a command handler or starts the server.

mod cli;
mod http;
mod state;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use flowplane_core::queue::JobQueue;
use flowplane_observe::tracing_setup::{LogFormat, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.default_filter(), LogFormat::parse(&cli.log_format), cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let state = AppState::init().await?;

    let result = match cli.command {
        Commands::Serve { port, host } => serve(state, &host, port).await,
        Commands::Flow { action } => cli::flow::handle_flow_command(action, &state, cli.json).await,
        Commands::Jobs => cli::jobs::list_jobs(&state, cli.json).await,
    };

    shutdown_tracing();
    result
}

/// Run the API, the job worker pool and the polling loop until Ctrl+C or
/// SIGTERM.
async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let recovered = state.queue.requeue_running().await?;
    if recovered > 0 {
        tracing::info!(recovered, "requeued jobs left running by a previous process");
    }

    let cancel = CancellationToken::new();
    let mut tasks = state.worker.spawn(state.config.queue.workers, &cancel);

    let scheduler = state.scheduler.clone();
    let scheduler_cancel = cancel.clone();
    tasks.push(tokio::spawn(async move { scheduler.run(scheduler_cancel).await }));

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!(
        "  {} Flowplane API listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}")).cyan()
    );
    println!(
        "  {} data dir {}, {} worker(s), trigger engine {}",
        console::style("·").dim(),
        state.data_dir.display(),
        state.config.queue.workers,
        state.config.engine_url
    );
    println!("  {}", console::style("Press Ctrl+C to stop").dim());

    let router = http::router::build_router(state);
    let server_cancel = cancel.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_cancel.cancel();
        })
        .await?;

    cancel.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "background task ended abnormally");
        }
    }

    println!("\n  Server stopped.");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
