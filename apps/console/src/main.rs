mod config;
mod presenter;

use std::{path::PathBuf, sync::Arc};

use agent_core::{run_session, Decision, Endpoints, HttpDataSource, Orchestrator, SequenceTiming};
use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{config::load_settings, presenter::TerminalPresenter};

#[derive(Parser, Debug)]
#[command(about = "Walks through IDOC failure triage against the support backend")]
struct Args {
    /// Config file; defaults to ./support_agent.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Backend base URL, e.g. http://127.0.0.1:8000/api
    #[arg(long)]
    api_url: Option<String>,
    /// Answer the reprocess prompt up front (yes/no).
    #[arg(long)]
    decision: Option<Decision>,
    /// Skip the pacing delays between stages.
    #[arg(long)]
    immediate: bool,
    /// Used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_filter: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_filter))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(api_url) = args.api_url {
        settings.api_url = api_url;
    }
    let timing = if args.immediate {
        SequenceTiming::immediate()
    } else {
        settings.timing()
    };

    let data_source = HttpDataSource::with_options(
        &settings.api_url,
        Endpoints::default(),
        settings.request_timeout(),
    )
    .with_context(|| format!("cannot use API url '{}'", settings.api_url))?;
    let orchestrator = Orchestrator::builder(Arc::new(data_source), settings.sanitizer())
        .catalog(settings.catalog()?)
        .timing(timing)
        .fetch_failure_policy(settings.fetch_failure_policy)
        .build()?;
    info!(
        api_url = %settings.api_url,
        stages = orchestrator.catalog().len(),
        "support console ready"
    );

    let mut presenter = TerminalPresenter::new(std::io::stdout(), orchestrator.catalog().clone());
    presenter = match args.decision {
        Some(decision) => presenter.with_decision(decision),
        None => presenter.with_input(BufReader::new(tokio::io::stdin())),
    };

    tokio::select! {
        finished = run_session(&orchestrator, &mut presenter) => {
            let terminal = finished?;
            info!(
                outcome = ?terminal.outcome,
                failures = terminal.failures.len(),
                "session finished"
            );
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted; cancelling the run");
        }
    }

    orchestrator.shutdown();
    Ok(())
}
