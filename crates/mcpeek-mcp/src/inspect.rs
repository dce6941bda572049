//! Inspection coordinator: connect and probe every declared server
//! concurrently, then merge the results in declaration order.

use crate::connection::{ConnectionManager, Connector, TransportConnector};
use crate::probe::probe;
use crate::session::McpSession;
use chrono::Utc;
use mcpeek_core::{
    CancelScope, ConnectionFailure, InspectionOutcome, InspectionReport, McpeekError, McpeekResult,
    ReportEntry, TransportDescriptor,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Which servers (and tool) the caller is interested in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InspectFilter {
    /// Case-insensitive substring of the server name.
    pub server: Option<String>,
    /// Exact tool name to show in detail. Requires `server`.
    pub tool: Option<String>,
}

impl InspectFilter {
    /// Reject a tool filter without a server filter.
    pub fn validate(&self) -> McpeekResult<()> {
        if self.tool.is_some() && self.server.is_none() {
            return Err(McpeekError::Config(
                "--tool requires --server to be specified".into(),
            ));
        }
        Ok(())
    }

    /// Whether `descriptor` passes the server filter.
    pub fn matches(&self, descriptor: &TransportDescriptor) -> bool {
        match &self.server {
            None => true,
            Some(filter) => descriptor
                .name
                .to_lowercase()
                .contains(&filter.to_lowercase()),
        }
    }
}

/// Runs one inspection unit per descriptor with bounded concurrency.
pub struct InspectionCoordinator<C: Connector = TransportConnector> {
    manager: Arc<ConnectionManager<C>>,
    max_concurrency: usize,
    default_timeout: Option<Duration>,
}

impl<C: Connector + 'static> InspectionCoordinator<C> {
    /// Coordinator over `manager` running at most `max_concurrency` units.
    pub fn new(manager: ConnectionManager<C>, max_concurrency: usize) -> Self {
        Self {
            manager: Arc::new(manager),
            max_concurrency: max_concurrency.max(1),
            default_timeout: None,
        }
    }

    /// Per-server timeout for descriptors that do not set their own.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Inspect every descriptor passing `filter`.
    ///
    /// Fails only on an invalid filter, before any connection is attempted.
    /// Per-server failures are recorded in the report.
    pub async fn inspect(
        &self,
        scope: &CancelScope,
        descriptors: &[TransportDescriptor],
        filter: &InspectFilter,
    ) -> McpeekResult<InspectionReport> {
        filter.validate()?;
        let started_at = Utc::now();

        let selected: Vec<TransportDescriptor> = descriptors
            .iter()
            .filter(|d| filter.matches(d))
            .cloned()
            .map(|mut d| {
                if d.timeout.is_none() {
                    d.timeout = self.default_timeout;
                }
                d
            })
            .collect();
        info!(
            servers = selected.len(),
            declared = descriptors.len(),
            concurrency = self.max_concurrency,
            "Inspecting MCP servers"
        );

        let (tx, mut rx) = mpsc::channel::<(usize, ReportEntry)>(selected.len().max(1));
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut handles = Vec::with_capacity(selected.len());

        for (index, descriptor) in selected.iter().cloned().enumerate() {
            let tx = tx.clone();
            let manager = Arc::clone(&self.manager);
            let semaphore = Arc::clone(&semaphore);
            let scope = scope.child();
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let entry = inspect_one(&manager, &scope, descriptor).await;
                let _ = tx.send((index, entry)).await;
            }));
        }
        drop(tx);

        // single writer: only this loop touches the slots
        let mut slots: Vec<Option<ReportEntry>> = vec![None; selected.len()];
        while let Some((index, entry)) = rx.recv().await {
            slots[index] = Some(entry);
        }

        for (index, handle) in handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!(server = %selected[index].name, error = %e, "Inspection task failed");
            }
        }

        let entries = slots
            .into_iter()
            .zip(selected)
            .map(|(slot, descriptor)| {
                slot.unwrap_or_else(|| ReportEntry {
                    outcome: InspectionOutcome::ConnectionFailed(ConnectionFailure::aborted(
                        format!("inspection of '{}' aborted", descriptor.name),
                    )),
                    descriptor,
                    elapsed_ms: 0,
                })
            })
            .collect();

        Ok(InspectionReport {
            started_at,
            entries,
        })
    }
}

/// Connect, probe and close one server. The session is closed on every path.
async fn inspect_one<C: Connector>(
    manager: &ConnectionManager<C>,
    scope: &CancelScope,
    descriptor: TransportDescriptor,
) -> ReportEntry {
    let started = Instant::now();
    let outcome = match manager.connect(scope, &descriptor).await {
        Err(e) => {
            warn!(server = %descriptor.name, error = %e, "MCP server unavailable");
            InspectionOutcome::ConnectionFailed(ConnectionFailure::from_error(&e))
        }
        Ok(mut session) => {
            let probed = probe(&session, scope).await;
            session.close().await;
            match probed {
                Ok(set) => InspectionOutcome::Capabilities(set),
                Err(e) => InspectionOutcome::ConnectionFailed(ConnectionFailure::from_error(&e)),
            }
        }
    };
    ReportEntry {
        descriptor,
        outcome,
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_without_server_is_config_error() {
        let filter = InspectFilter {
            server: None,
            tool: Some("get_issue".into()),
        };
        let err = filter.validate().unwrap_err();
        assert!(matches!(err, McpeekError::Config(_)));
        assert!(err.to_string().contains("--tool requires --server"));
    }

    #[test]
    fn test_server_filter_is_case_insensitive_substring() {
        let filter = InspectFilter {
            server: Some("GIT".into()),
            tool: None,
        };
        assert!(filter.matches(&TransportDescriptor::http("github", "https://x")));
        assert!(!filter.matches(&TransportDescriptor::http("playwright", "https://x")));
        assert!(InspectFilter::default().matches(&TransportDescriptor::http("any", "https://x")));
    }
}
