// Crosstalk: LAN chat with discovery, session transport and optional translation.

mod config;
mod console;
mod coordinator;
mod discovery;
mod translate;
mod transport;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use crosstalk_core::{ChatSession, DeliveryOrder, PeerId};

use crate::coordinator::{Coordinator, Ports};
use crate::translate::HttpTranslationClient;

#[derive(Debug, Parser)]
#[command(name = "crosstalk", version, about = "Chat with nearby devices on the local network")]
struct Args {
    /// Config file (default: ~/.config/crosstalk/config.toml, then /etc/crosstalk/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Display name shown to peers.
    #[arg(long)]
    username: Option<String>,
    /// Translate incoming messages.
    #[arg(long)]
    translate: bool,
    /// Target language for translation.
    #[arg(long)]
    language: Option<String>,
    /// Show received messages strictly in arrival order.
    #[arg(long)]
    strict_order: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = config::load(args.config.as_deref()).context("loading config")?;
    if let Some(name) = args.username {
        cfg.username = name;
    }
    if let Some(code) = args.language {
        cfg.translation_language = code;
    }
    cfg.translate |= args.translate;
    cfg.strict_order |= args.strict_order;
    if cfg.translate && cfg.api_key.is_none() {
        log::warn!("translation enabled without api_key; messages will show untranslated");
    }

    let local = PeerId::generate(cfg.username.clone());
    let order = if cfg.strict_order {
        DeliveryOrder::Arrival
    } else {
        DeliveryOrder::Settled
    };
    let mut session = ChatSession::new(local).with_delivery_order(order);
    session.set_translating(cfg.translate);
    session.set_translation_language(cfg.translation_language.clone());

    let client = HttpTranslationClient::new(
        cfg.api_url.clone(),
        cfg.api_key.clone().unwrap_or_default(),
        Duration::from_secs(cfg.translation_timeout_secs),
    )
    .context("building translation client")?;
    let ports = Ports {
        discovery: cfg.discovery_port,
        transport: cfg.transport_port,
    };

    let rt = tokio::runtime::Runtime::new().context("starting runtime")?;
    rt.block_on(async {
        let (coordinator, handle) = Coordinator::new(session, ports, client);
        let coordinator_task = tokio::spawn(coordinator.run());
        tokio::spawn(console::run_output(
            cfg.username.clone(),
            handle.state(),
            handle.messages(),
        ));
        tokio::select! {
            r = console::run_input(handle.clone()) => {
                if let Err(e) = r {
                    log::warn!("stdin closed: {}", e);
                }
            }
            r = shutdown_signal() => r?,
        }
        handle.shutdown();
        let _ = coordinator_task.await;
        Ok::<(), anyhow::Error>(())
    })?;
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
