//! joinwarden
//!
//! A bot that walks its admin through a platform account login, then keeps
//! every join request for one channel approved: the existing backlog once,
//! and new requests as they arrive.

mod approval;
mod config;
mod logging;
mod login;
mod session;
mod session_actor;
mod session_command;
mod state;
mod surface;
mod telegram;
mod transition;

#[cfg(test)]
mod test_support;

use std::process::ExitCode;
use std::sync::Arc;

use clap::error::ErrorKind;
use clap::Parser;
use joinwarden_connector_bridge::BridgeClientFactory;
use teloxide::prelude::*;
use tracing::{error, info, info_span, Instrument};

use crate::approval::ApprovalEngine;
use crate::config::Config;
use crate::login::LoginFlow;
use crate::state::SessionRegistry;
use crate::telegram::{TelegramFrontend, TelegramSurface};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::try_parse() {
        Ok(config) => config,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
            let _ = e.print();
            return code;
        }
    };

    let log_handle = match logging::init_logging(&config.data_dir()) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let span = info_span!("joinwarden", run_id = %log_handle.run_id);
    match run(config).instrument(span).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(
                component = "server",
                event = "server.failed",
                error = %format!("{e:#}"),
                "Stopped with an error"
            );
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let admin = config.admin();
    let bot = Bot::new(&config.bot_token);

    let me = bot.get_me().await?;
    info!(
        component = "server",
        event = "server.bot_verified",
        bot_username = %me.user.username.as_deref().unwrap_or_default(),
        admin_id = %admin,
        "Bot started"
    );

    let surface = Arc::new(TelegramSurface::new(bot.clone()));
    let factory = Arc::new(BridgeClientFactory::new(config.bridge_config()));
    let engine = ApprovalEngine::new(config.approval_config(), surface.clone(), admin);
    let flow = Arc::new(LoginFlow::new(factory, surface, engine));
    let registry = Arc::new(SessionRegistry::new(flow));

    let frontend = Arc::new(TelegramFrontend::new(bot, admin, registry.clone()));
    let outcome = frontend.run(shutdown_signal()).await;

    info!(
        component = "server",
        event = "server.shutting_down",
        sessions = registry.len(),
        "Releasing platform connections"
    );
    registry.shutdown_all().await;
    info!(
        component = "server",
        event = "server.stopped",
        "Shutdown complete"
    );
    outcome
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(
                component = "server",
                event = "server.signal_failed",
                error = %e,
                "Ctrl-C handler unavailable"
            );
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
                error!(
                    component = "server",
                    event = "server.signal_failed",
                    error = %e,
                    "SIGTERM handler unavailable"
                );
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
