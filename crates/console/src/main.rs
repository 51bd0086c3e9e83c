// Chatflow console
//
// Design Decision: Use clap derive with env fallbacks; .env is loaded first so
// it feeds the same variables.
// Design Decision: Logs go to stderr so stdout only carries replies.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chatflow_console::{
    parse_line, ConsoleConfig, ConsoleTransport, InputError, OutputFormat, Router,
};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "chatflow")]
#[command(about = "Chatflow console - drive step-by-step conversations from stdin")]
#[command(version)]
pub struct Cli {
    /// Seconds before an unfinished conversation is cleared
    #[arg(long, env = "CHATFLOW_FLOW_TIMEOUT_SECS", default_value = "180")]
    pub flow_timeout_secs: u64,

    /// Seconds between idle flow sweeps
    #[arg(long, env = "CHATFLOW_SWEEP_INTERVAL_SECS", default_value = "60")]
    pub sweep_interval_secs: u64,

    /// Seconds a flow may sit idle before its state is dropped
    #[arg(long, env = "CHATFLOW_IDLE_TTL_SECS", default_value = "600")]
    pub idle_ttl_secs: u64,

    /// Base URL of the placeholder image service
    #[arg(long, env = "CHATFLOW_IMAGE_BASE_URL", default_value = chatflow_console::config::DEFAULT_IMAGE_BASE_URL)]
    pub image_base_url: String,

    /// Output format
    #[arg(long, short, default_value = "text", value_parser = ["text", "json"])]
    pub output: String,
}

impl Cli {
    fn console_config(&self) -> ConsoleConfig {
        ConsoleConfig::default()
            .with_flow_timeout(Duration::from_secs(self.flow_timeout_secs))
            .with_sweep_interval(Duration::from_secs(self.sweep_interval_secs))
            .with_idle_ttl(Duration::from_secs(self.idle_ttl_secs))
            .with_image_base_url(&self.image_base_url)
    }
}

fn init_tracing() {
    // RUST_LOG wins over LOG_LEVEL
    let filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| {
            std::env::var("LOG_LEVEL")
                .ok()
                .and_then(|level| EnvFilter::try_new(level).ok())
        })
        .unwrap_or_else(|| EnvFilter::new("chatflow=info,chatflow_console=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is not an error
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing();

    let config = cli.console_config();
    let transport = Arc::new(ConsoleTransport::stdout(OutputFormat::parse(&cli.output)));
    let router = Router::new(config, transport).context("Failed to start console router")?;

    tracing::info!(
        flow_timeout_secs = cli.flow_timeout_secs,
        idle_ttl_secs = cli.idle_ttl_secs,
        "chatflow console ready, one update per line: <user> <text>|/command|#button"
    );

    let sweeper = router.spawn_sweeper();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        let incoming = match parse_line(&line) {
            Ok(incoming) => incoming,
            Err(InputError::Empty) => continue,
            Err(e) => {
                tracing::warn!(error = %e, line = %line, "skipping malformed line");
                continue;
            }
        };

        if let Err(e) = router.handle(incoming).await {
            tracing::error!(error = %e, "failed to handle update");
        }
    }

    sweeper.abort();
    tracing::info!(flows = router.registry().flow_count(), "chatflow console stopped");
    Ok(())
}
