//! Gong - contract notification listener
//!
//! Joins the contracts channel and logs every acquisition and resale
//! contract until interrupted.

use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use gong::{
    config::{Args, LogFormat},
    contracts::{ContractEvent, ContractKind},
    Client, Frame,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // tokio-tungstenite leaves the rustls provider choice to the binary
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }

    let config = args.load_config()?;
    let client_config = config.client_config(&args.guardian_token)?;

    info!("======================================");
    info!("  Gong - contract notifications");
    info!("======================================");
    info!("Endpoint: {}", config.endpoint);
    info!("Topics: {}", config.topics.join(", "));
    info!(
        "Heartbeat: every {}s, timeout {}s",
        config.heartbeat_interval_secs, config.heartbeat_timeout_secs
    );
    info!("======================================");

    let client = Client::websocket(client_config)?;
    let mut events = client.start()?;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            frame = events.recv() => match frame {
                Some(frame) => handle_event(&frame),
                None => {
                    warn!("Event stream ended");
                    break;
                }
            },
        }
    }

    client.close().await;
    info!(dropped_events = client.dropped_events(), "Gong stopped");
    Ok(())
}

fn init_tracing(log_level: &str, format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("gong={},info", log_level).into());

    let fmt_layer = match format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn handle_event(frame: &Frame) {
    match ContractEvent::from_frame(frame) {
        Some(Ok(contract)) => {
            let kind = match contract.kind {
                ContractKind::Acquisition => "acquisition",
                ContractKind::Resale => "resale",
            };
            info!(kind, address = %contract.address, topic = %frame.topic, "Ring! Contract received");
        }
        Some(Err(e)) => {
            warn!(event = %frame.event, error = %e, "Malformed contract payload");
        }
        None => {
            debug!(topic = %frame.topic, event = %frame.event, "Ignoring event");
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM, only Ctrl-C will stop gong");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
