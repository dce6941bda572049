//! Launching the external MCP inspector instead of the built-in path.

use crate::config::InspectorConfig;
use anyhow::Context;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run the configured inspector in the foreground until it exits.
///
/// Cancelling `cancel` (Ctrl-C) kills the child and waits for it.
pub async fn launch(config: &InspectorConfig, cancel: &CancellationToken) -> anyhow::Result<ExitStatus> {
    info!(command = %config.command, args = ?config.args, "Launching MCP inspector");
    let mut child = Command::new(&config.command)
        .args(&config.args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to launch inspector '{}'", config.command))?;

    tokio::select! {
        status = child.wait() => Ok(status?),
        _ = cancel.cancelled() => {
            warn!("Interrupted, stopping inspector");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill inspector");
            }
            Ok(child.wait().await?)
        }
    }
}
