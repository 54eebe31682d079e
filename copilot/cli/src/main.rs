//! Copilot - Line-Oriented Terminal Surface
//!
//! Reads lines from stdin, feeds them to the copilot core and prints each
//! execution as it updates.
//!
//! # Usage
//!
//! ```bash
//! # Interactive
//! copilot
//!
//! # One command, then exit
//! copilot --run "/new"
//!
//! # Against another server
//! copilot --base-url https://copilot.example.com/api --token "$TOKEN"
//!
//! # Verbose logging
//! RUST_LOG=debug copilot
//! ```
//!
//! # Environment Variables
//!
//! - `COPILOT_CONFIG`: Configuration file path
//! - `COPILOT_BASE_URL`, `COPILOT_TOKEN`: Service endpoint and credentials
//! - `COPILOT_POLL_INTERVAL_MS`: Delay between polls of a working conversation
//! - `RUST_LOG`: Log filter (overrides `--log-level`)

mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{debug, info};

use copilot_core::{
    default_config_path, load_config_from_path, ConfigOverrides, Copilot, CopilotEvent,
    CopilotService, Dispatch, EventKind, ExecutionHandle, HttpCopilotService,
};

use render::{format_alert, format_incomplete, TerminalRenderer};

/// Copilot - command line for a conversational copilot
#[derive(Parser, Debug)]
#[command(name = "copilot")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "COPILOT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Copilot API base URL
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Bearer token for the copilot API
    #[arg(long, value_name = "TOKEN")]
    token: Option<String>,

    /// Delay between polls of a working conversation
    #[arg(long, value_name = "MS")]
    poll_interval_ms: Option<u64>,

    /// Run one command line and exit
    #[arg(short = 'r', long, value_name = "TEXT")]
    run: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "COPILOT_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Shorthand for `--log-level debug`
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref url) = self.base_url {
            overrides = overrides.with_base_url(url);
        }
        if let Some(ref token) = self.token {
            overrides = overrides.with_token(token);
        }
        if let Some(ms) = self.poll_interval_ms {
            overrides = overrides.with_poll_interval_ms(ms);
        }
        overrides
    }

    fn level(&self) -> &str {
        if self.verbose {
            "debug"
        } else {
            &self.log_level
        }
    }
}

/// Initialize logging with the specified level
///
/// Logs go to stderr so they never interleave with rendered output.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("copilot={level},copilot_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.level());

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(config_path).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        base_url = %config.base_url,
        source = %config.source(),
        "Configuration resolved"
    );

    let mut service = HttpCopilotService::new(config.base_url.clone(), config.request_timeout)
        .context("Failed to create HTTP client")?;
    if let Some(ref token) = config.token {
        service = service.with_token(token.clone());
    }
    info!(
        service = service.name(),
        base_url = %service.base_url(),
        authenticated = config.token.is_some(),
        "Copilot service ready"
    );

    let renderer = Arc::new(TerminalRenderer::new(textwrap::termwidth()));
    let copilot = Copilot::new(&config, Arc::new(service), renderer.clone())
        .context("Failed to build command tree")?;

    let subscriptions = vec![
        copilot.bus().subscribe(EventKind::Alert, |event| {
            if let CopilotEvent::Alert(alert) = event {
                eprintln!("{}", format_alert(alert));
            }
        }),
        copilot.bus().subscribe(EventKind::ClearScreen, {
            let renderer = Arc::clone(&renderer);
            move |_| renderer.clear()
        }),
        copilot
            .bus()
            .subscribe(EventKind::RequestsInFlight, |event| {
                if let CopilotEvent::RequestsInFlight(count) = event {
                    debug!(count, "Requests in flight");
                }
            }),
    ];

    let outcome = match args.run {
        Some(ref text) => run_once(&copilot, text).await,
        None => read_lines(&copilot, None).await,
    };

    for subscription in subscriptions {
        subscription.unsubscribe();
    }
    copilot.shutdown();
    outcome
}

/// Dispatch one line and keep reading stdin until its execution finishes
async fn run_once(copilot: &Copilot, text: &str) -> Result<()> {
    match copilot.run(text, None) {
        Dispatch::Started(handle) => read_lines(copilot, Some(handle)).await,
        Dispatch::Incomplete(matched) => anyhow::bail!("{}", format_incomplete(&matched)),
    }
}

/// Read lines until EOF, ctrl-c or until `until` finishes
///
/// Executions run in the background so a retry prompt can be answered while
/// its request is still waiting.
async fn read_lines(copilot: &Copilot, until: Option<ExecutionHandle>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let waiting = until.is_some();
    let mut stdin_open = true;
    let finished = async move {
        match until {
            Some(handle) => handle.finished().await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(finished);

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received ctrl-c, exiting");
                break;
            }
            joined = &mut finished => {
                joined.context("Execution task failed")?;
                break;
            }
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    debug!("stdin closed");
                    stdin_open = false;
                    if waiting {
                        continue;
                    }
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match copilot.submit(&line) {
                    Dispatch::Started(handle) => debug!(execution = %handle.id, "Started"),
                    Dispatch::Incomplete(matched) => println!("{}", format_incomplete(&matched)),
                }
            }
        }
    }

    Ok(())
}
