//! CLI entry point for the mediafetch tool.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mediafetch_core::transport::render::welcome_text;
use mediafetch_core::transport::{Command, parse_command};
use mediafetch_core::{AcquisitionSession, ConsoleTransport, RequesterId, Transport, YtDlpExtractor};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

mod app_config;
mod cli;

use cli::Args;

const UNKNOWN_COMMAND_TEXT: &str = "Send a video link, or /start for help.";
const NOTHING_TO_CANCEL_TEXT: &str = "No download is running.";

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let file_config = app_config::load_file_config_for(args.config.as_deref())?;
    let settings = app_config::resolve_settings(&args, file_config.as_ref());

    // Priority: RUST_LOG env var > quiet flag > verbose flag > config verbosity > info
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(settings.log_level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    debug!(?args, ?settings, "configuration resolved");
    info!(
        ceiling = %settings.engine.ceiling,
        work_dir = %settings.engine.work_dir.display(),
        output_dir = %settings.output_dir.display(),
        "mediafetch starting"
    );

    let extractor = Arc::new(YtDlpExtractor::with_program(settings.yt_dlp.clone()));
    let transport = Arc::new(ConsoleTransport::stdout(settings.output_dir.clone()));
    let engine = Arc::new(
        AcquisitionSession::new(&settings.engine, extractor, transport.clone())
            .context("invalid engine configuration")?,
    );
    let requester = RequesterId::new(args.requester.clone());
    let ceiling_text = settings.engine.ceiling.to_string();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut downloads = JoinSet::new();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "failed to listen for ctrl-c");
                }
                info!("interrupted; cancelling in-flight download");
                engine.cancel(&requester);
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        let Some(command) = parse_command(&line) else {
            continue;
        };

        match command {
            Command::Start => {
                send(transport.as_ref(), &requester, &welcome_text(&ceiling_text)).await;
            }
            Command::Submit(locator) => {
                if let Err(e) = engine.submit_locator(&requester, &locator).await {
                    debug!(error = %e, "submission ended with error");
                }
            }
            Command::Select(variant_id) => {
                let engine = Arc::clone(&engine);
                let requester = requester.clone();
                downloads.spawn(async move {
                    if let Err(e) = engine.select_variant(&requester, &variant_id).await {
                        debug!(error = %e, "selection ended with error");
                    }
                });
            }
            Command::Cancel => {
                if !engine.cancel(&requester) {
                    send(transport.as_ref(), &requester, NOTHING_TO_CANCEL_TEXT).await;
                }
            }
            Command::Unknown(text) => {
                debug!(text = %text, "unrecognized input");
                send(transport.as_ref(), &requester, UNKNOWN_COMMAND_TEXT).await;
            }
        }

        // Reap finished downloads so the set does not grow unbounded.
        while let Some(joined) = downloads.try_join_next() {
            if let Err(e) = joined {
                warn!(error = %e, "download task failed");
            }
        }
    }

    if !downloads.is_empty() {
        info!(pending = downloads.len(), "waiting for downloads to finish");
    }
    loop {
        tokio::select! {
            joined = downloads.join_next() => match joined {
                None => break,
                Some(Err(e)) => warn!(error = %e, "download task failed"),
                Some(Ok(())) => {}
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "failed to listen for ctrl-c");
                    break;
                }
                info!("interrupted; cancelling in-flight download");
                engine.cancel(&requester);
            }
        }
    }

    info!("mediafetch finished");
    Ok(())
}

async fn send(transport: &dyn Transport, requester: &RequesterId, text: &str) {
    if let Err(e) = transport.notify(requester, text).await {
        warn!(error = %e, "failed to write message");
    }
}
