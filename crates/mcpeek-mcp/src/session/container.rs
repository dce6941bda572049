//! Containerized stdio transport via `docker run -i`.

use super::{McpSession, SessionOptions, StdioSession};
use async_trait::async_trait;
use mcpeek_core::{CancelScope, McpeekResult, ResourceDescriptor, RootDescriptor, ToolDescriptor};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Session with a server running inside a throwaway container.
///
/// Environment values are handed to the `docker` client process and only the
/// variable names appear on its command line.
pub struct ContainerSession {
    inner: StdioSession,
    container_name: String,
    close_grace: Duration,
}

impl ContainerSession {
    /// An unopened session for `image args...`.
    pub fn new(
        name: impl Into<String>,
        image: &str,
        args: &[String],
        run_args: &[String],
        env: BTreeMap<String, String>,
        options: SessionOptions,
    ) -> Self {
        let name = name.into();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let container_name = format!("mcpeek-{}-{}", sanitize(&name), &suffix[..8]);

        let mut docker_args: Vec<String> = vec![
            "run".into(),
            "--rm".into(),
            "-i".into(),
            "--name".into(),
            container_name.clone(),
        ];
        for key in env.keys() {
            docker_args.push("-e".into());
            docker_args.push(key.clone());
        }
        docker_args.extend(run_args.iter().cloned());
        docker_args.push(image.to_string());
        docker_args.extend(args.iter().cloned());

        let close_grace = options.close_grace;
        let handshake = options.container_handshake_timeout;
        let inner = StdioSession::new(name, "docker", docker_args, env, options)
            .with_handshake_timeout(handshake);

        Self {
            inner,
            container_name,
            close_grace,
        }
    }

    /// Name passed to `docker run --name`.
    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// Full `docker` argument list.
    pub fn docker_args(&self) -> &[String] {
        self.inner.args()
    }
}

/// Docker container names allow `[a-zA-Z0-9_.-]`.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

async fn remove_container(name: &str, grace: Duration) {
    let status = Command::new("docker")
        .args(["rm", "-f", name])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .status();
    match tokio::time::timeout(grace, status).await {
        Ok(Ok(s)) if s.success() => debug!(container = %name, "Container removed"),
        Ok(Ok(_)) => debug!(container = %name, "Container already gone"),
        Ok(Err(e)) => debug!(container = %name, error = %e, "Could not run docker rm"),
        Err(_) => warn!(container = %name, "docker rm did not finish in time"),
    }
}

#[async_trait]
impl McpSession for ContainerSession {
    fn server_name(&self) -> &str {
        self.inner.server_name()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn server_info(&self) -> Option<String> {
        self.inner.server_info()
    }

    async fn open(&mut self, scope: &CancelScope) -> McpeekResult<()> {
        self.inner.open(scope).await
    }

    async fn close(&mut self) {
        let had_process = self.inner.has_process();
        self.inner.close().await;
        if had_process {
            remove_container(&self.container_name, self.close_grace).await;
        }
    }

    async fn list_tools(&self, scope: &CancelScope) -> McpeekResult<Vec<ToolDescriptor>> {
        self.inner.list_tools(scope).await
    }

    async fn list_resources(&self, scope: &CancelScope) -> McpeekResult<Vec<ResourceDescriptor>> {
        self.inner.list_resources(scope).await
    }

    async fn list_roots(&self, scope: &CancelScope) -> McpeekResult<Vec<RootDescriptor>> {
        self.inner.list_roots(scope).await
    }
}
