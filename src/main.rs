//! STP Client - command-line monitor
//!
//! Connects to an STP service, subscribes to every notification kind and logs
//! what arrives until interrupted.
//!
//! ## Usage
//!
//! ```bash
//! # Defaults: ws://localhost:9555, service name StpRustClient
//! stp-client
//!
//! # Join the running scenario as a given role
//! STP_URL=ws://stp-host:9555 stp-client --join-scenario --role S3
//!
//! # More detail
//! RUST_LOG=stp_client=debug stp-client
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use stp_client::config::default_config_path;
use stp_client::{Config, Handlers, Recognizer, Severity};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stp-client")]
#[command(about = "Monitor for the STP sketch-recognition service")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// STP service WebSocket URL
    #[arg(long, env = "STP_URL")]
    url: Option<String>,

    /// Service name to register as
    #[arg(long, env = "STP_SERVICE_NAME")]
    service_name: Option<String>,

    /// Default timeout for each operation, in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Join the service's scenario session after connecting
    #[arg(long)]
    join_scenario: bool,

    /// Switch to this role after connecting
    #[arg(long)]
    role: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("stp_client=info".parse()?))
        .init();

    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let mut config = if config_path.exists() {
        Config::load(&config_path)?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(url) = args.url {
        config.url = url;
    }
    if let Some(service_name) = args.service_name {
        config.service_name = service_name;
    }
    if let Some(secs) = args.timeout {
        config.default_timeout_secs = secs;
    }
    config.validate()?;

    info!(
        url = %config.url,
        service_name = %config.service_name,
        "Starting stp-client"
    );

    let recognizer = Recognizer::new(&config, logging_handlers());
    let session_id = recognizer.connect(None).await?;
    info!(session_id = %session_id, machine_id = %recognizer.connector().machine_id(), "Connected");

    if args.join_scenario {
        match recognizer.join_scenario_session(None).await {
            Ok(()) => info!("Joined scenario session"),
            Err(e) => warn!(error = %e, "Could not join scenario session"),
        }
        match recognizer.has_active_scenario(None).await {
            Ok(active) => info!(active = active, "Scenario status"),
            Err(e) => warn!(error = %e, "Could not query scenario status"),
        }
    }

    if let Some(role) = args.role.as_deref() {
        if let Err(e) = recognizer.switch_role(role, None).await {
            warn!(role = %role, error = %e, "Could not switch role");
        }
    }

    info!("Listening for notifications, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await.ok();

    info!("Shutting down");
    if let Err(e) = recognizer.disconnect(Some(Duration::from_secs(5))).await {
        error!(error = %e, "Disconnect failed");
    }
    Ok(())
}

/// A handler for every notification kind, each writing one log line.
fn logging_handlers() -> Handlers {
    Handlers::new()
        .on_symbol_added(|ev| {
            let best = ev.alternates.first().map(|s| s.poid.as_str()).unwrap_or("-");
            info!(alternates = ev.alternates.len(), best = %best, undo = ev.is_undo, "SymbolAdded");
        })
        .on_symbol_modified(|ev| info!(poid = %ev.poid, undo = ev.is_undo, "SymbolModified"))
        .on_symbol_deleted(|ev| info!(poid = %ev.poid, undo = ev.is_undo, "SymbolDeleted"))
        .on_ink_processed(|_| debug!("InkProcessed"))
        .on_speech_recognized(|ev| info!(phrases = ?ev.phrases, "SpeechRecognized"))
        .on_stp_message(|msg| match msg.level {
            Severity::Error => error!(message = %msg.message, "StpMessage"),
            Severity::Warning => warn!(message = %msg.message, "StpMessage"),
            Severity::Info => info!(message = %msg.message, "StpMessage"),
            Severity::Debug => debug!(message = %msg.message, "StpMessage"),
        })
        .on_role_switched(|ev| info!(role = %ev.role, "RoleSwitched"))
        .on_task_org_added(|ev| info!(poid = %ev.task_org.poid, name = %ev.task_org.name, "TaskOrgAdded"))
        .on_task_org_modified(|ev| info!(poid = %ev.poid, "TaskOrgModified"))
        .on_task_org_deleted(|ev| info!(poid = %ev.poid, "TaskOrgDeleted"))
        .on_task_org_switched(|ev| info!(poid = %ev.task_org.poid, "TaskOrgSwitched"))
        .on_task_added(|ev| info!(poid = %ev.poid, name = %ev.task.name, "TaskAdded"))
        .on_task_modified(|ev| info!(poid = %ev.poid, "TaskModified"))
        .on_task_deleted(|ev| info!(poid = %ev.poid, "TaskDeleted"))
        .on_c2sim_symbol_report(|ev| info!(symbols = ev.symbols.len(), "C2SIMSymbolReport"))
}
