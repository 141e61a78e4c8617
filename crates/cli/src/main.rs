//! `arcana-reveal` -- generate the reveal video for one tarot card.
//!
//! Submits the card to the generation backend, prints each progress change,
//! and exits once the reveal settles.
//!
//! # Exit status
//!
//! | Code  | Meaning                              |
//! |-------|--------------------------------------|
//! | `0`   | Video ready; its reference was printed |
//! | `1`   | Generation failed or was rejected    |
//! | `130` | Interrupted with Ctrl-C              |
//!
//! Configuration is read from `REVEAL_*` environment variables (see
//! [`RevealConfig::from_env`]); a `.env` file is honoured.

use std::process::ExitCode;

use anyhow::Context;
use arcana_cli::{exit_status, render, Args, EXIT_INTERRUPTED};
use arcana_reveal::config::RevealConfig;
use arcana_reveal::controller::RevealController;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args);

    let mut config = RevealConfig::from_env().context("Invalid REVEAL_* configuration")?;
    args.apply(&mut config).context("Invalid command-line override")?;

    tracing::info!(
        api_url = %config.api_url,
        style = %config.style,
        seconds = config.seconds,
        deadline_ms = config.timing.deadline.as_millis() as u64,
        "Starting arcana-reveal",
    );

    let controller = RevealController::from_config(config)?;
    let mut display = controller.subscribe_display();
    controller.submit(args.subject())?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let settled = loop {
        tokio::select! {
            changed = display.changed() => {
                if changed.is_err() {
                    break controller.display();
                }
                let state = display.borrow_and_update().clone();
                if args.json {
                    println!("{}", serde_json::to_string(&state)?);
                } else {
                    println!("{}", render(&state));
                }
                if state.is_terminal() {
                    break state;
                }
            }
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted, cancelling reveal");
                controller.shutdown().await;
                return Ok(ExitCode::from(EXIT_INTERRUPTED));
            }
        }
    };

    Ok(ExitCode::from(exit_status(&settled)))
}

fn init_tracing(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| args.default_log_filter().into());
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout carries only display states.
    if args.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
