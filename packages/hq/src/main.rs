use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::prelude::*;

use hq::config::{FileConfig, HqConfig, load_config};
use hq::dispatcher::Dispatcher;
use hq::session;

#[derive(Parser)]
#[command(name = "hq")]
#[command(about = "Interactive job-control shell")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "HQ_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Do not print a prompt before each command
    #[arg(long)]
    no_prompt: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(path) = &args.config {
        if !path.exists() {
            bail!("Config file not found: {}", path.display());
        }
    }
    let file_config: FileConfig = load_config(args.config.as_deref())
        .extract()
        .context("Failed to load configuration")?;
    let config = HqConfig::from_file(&file_config, args.no_prompt)?;

    init_logging(&config, args.debug)?;
    info!("Starting hq (pid {})", std::process::id());

    let lines = session::spawn_line_reader(std::io::BufReader::new(std::io::stdin()));
    let mut dispatcher = Dispatcher::new(std::io::stdout(), config.shutdown);
    session::run(lines, &mut dispatcher, config.prompt.as_deref()).await?;

    info!("Exiting");
    Ok(())
}

/// Logs go to stderr or a file, never stdout, which carries the transcript
fn init_logging(config: &HqConfig, debug: bool) -> Result<()> {
    let default_directive = config.log_filter.clone().unwrap_or_else(|| {
        if debug {
            "hq=debug,job_manager=debug,warn".to_string()
        } else {
            "warn".to_string()
        }
    });
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    match &config.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {:?}", path))?;
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .with(env_filter)
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .with(env_filter)
                .init();
        }
    }
    Ok(())
}
