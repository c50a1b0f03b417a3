//! Paperflow CLI
//!
//! Submits paper titles to the pipeline, follows their progress and inspects
//! stored sessions.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use paperflow_core::models::{GenerationConfig, PaperflowConfig};
use paperflow_core::orchestrator::{Orchestrator, PipelineEvent, SessionStatus};
use paperflow_core::state::{Session, StatusView};
use std::path::PathBuf;
use tokio::sync::broadcast;

#[derive(Parser, Clone)]
#[command(author, version, about = "Paperflow - research, draft, edit and screen a paper from its title")]
struct Args {
    /// SQLite database file (defaults to $PAPERFLOW_DB or .paperflow/paperflow.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Never call a live generation backend
    #[arg(long, global = true)]
    offline: bool,
    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Run the pipeline for a title and print the report
    Run {
        /// Paper title
        title: String,
        /// Stream progress events while the session runs
        #[arg(short, long)]
        follow: bool,
    },
    /// Show the status of a session
    Status {
        session_id: String,
    },
    /// List recent sessions
    List {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Write a session record to <out>/<session_id>.json
    Export {
        session_id: String,
        #[arg(short, long, default_value = "sessions")]
        out: PathBuf,
    },
    /// Continue sessions interrupted by a previous process
    Resume,
}

fn init_tracing(verbose: bool) {
    let fallback_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(args: &Args) -> Result<PaperflowConfig> {
    let mut config = match &args.config {
        Some(path) => PaperflowConfig::load(path)?,
        None => PaperflowConfig::default(),
    };
    if let Some(db) = &args.db {
        config.database_path = db.clone();
    }
    if args.offline {
        config.generation = GenerationConfig::offline();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials may live in .env
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing(args.verbose);

    let config = load_config(&args)?;
    let orchestrator = Orchestrator::from_config(&config)?;

    match args.command {
        CliCommand::Run { title, follow } => {
            let events = orchestrator.subscribe();
            let session_id = orchestrator.submit(&title)?;
            println!("Session {}", session_id);

            let session = if follow {
                tokio::select! {
                    session = follow_session(&orchestrator, &session_id, events) => session?,
                    _ = tokio::signal::ctrl_c() => cancel_and_wait(&orchestrator, &session_id).await?,
                }
            } else {
                tokio::select! {
                    session = orchestrator.wait(&session_id) => session?,
                    _ = tokio::signal::ctrl_c() => cancel_and_wait(&orchestrator, &session_id).await?,
                }
            };
            print_outcome(&session);
        }
        CliCommand::Status { session_id } => {
            let view = orchestrator.status(&session_id)?;
            print_status(&view)?;
        }
        CliCommand::List { limit } => {
            let sessions = orchestrator.store().list(limit)?;
            if sessions.is_empty() {
                println!("No sessions yet.");
            }
            for summary in sessions {
                println!(
                    "{}  {:<16}  {}  {}",
                    summary.session_id,
                    summary.status,
                    summary.updated_at.format("%Y-%m-%d %H:%M:%S"),
                    summary.title
                );
            }
        }
        CliCommand::Export { session_id, out } => {
            let path = orchestrator
                .store()
                .export_json(&session_id, &out)
                .with_context(|| format!("Failed to export session {}", session_id))?;
            println!("Exported to {}", path.display());
        }
        CliCommand::Resume => {
            let resumed = orchestrator.resume_interrupted()?;
            if resumed.is_empty() {
                println!("Nothing to resume.");
            }
            for session_id in resumed {
                let session = orchestrator.wait(&session_id).await?;
                println!("{}  {}", session.session_id, session.status);
            }
        }
    }

    Ok(())
}

/// Print events for one session until it ends, then load it
async fn follow_session(
    orchestrator: &Orchestrator,
    session_id: &str,
    mut events: broadcast::Receiver<PipelineEvent>,
) -> Result<Session> {
    loop {
        match events.recv().await {
            Ok(event) if event.session_id == session_id => {
                println!("{}", format_event(&event));
                if event.kind.is_terminal() {
                    break;
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Skipped {} progress events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    Ok(orchestrator.wait(session_id).await?)
}

async fn cancel_and_wait(orchestrator: &Orchestrator, session_id: &str) -> Result<Session> {
    eprintln!("Interrupted; cancelling {}", session_id);
    orchestrator.cancel(session_id)?;
    Ok(orchestrator.wait(session_id).await?)
}

fn format_event(event: &PipelineEvent) -> String {
    let mut line = format!(
        "[{}] {:?}",
        event.timestamp.format("%H:%M:%S"),
        event.kind
    );
    if let Some(stage) = event.stage {
        line.push_str(&format!(" {}", stage));
    }
    if let Some(data) = &event.data {
        line.push_str(&format!(" {}", data));
    }
    line
}

fn print_status(view: &StatusView) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(view)?);
    Ok(())
}

fn print_outcome(session: &Session) {
    match (&session.status, &session.result, &session.error) {
        (SessionStatus::Completed, Some(report), _) => {
            println!("{}", report.edited);
            println!("---");
            println!("Similarity: {}", report.plagiarism.summary());
            println!("  {}", report.plagiarism.rationale);
            println!("  ({})", report.plagiarism.disclaimer);
            for note in &report.edit_summary {
                println!("Editor: {}", note);
            }
            println!(
                "Finished in {} ms ({} findings, {} -> {} chars)",
                report.metrics.total_ms,
                report.metrics.findings,
                report.metrics.draft_chars,
                report.metrics.edited_chars
            );
            if !report.metrics.fallback_stages.is_empty() {
                let stages: Vec<&str> = report
                    .metrics
                    .fallback_stages
                    .iter()
                    .map(|s| s.as_str())
                    .collect();
                println!("Offline fallback used in: {}", stages.join(", "));
            }
        }
        (_, _, Some(error)) => {
            eprintln!("Session failed at {}: {}", error.stage, error.message);
        }
        _ => println!("Session {} is {}", session.session_id, session.status),
    }
}
