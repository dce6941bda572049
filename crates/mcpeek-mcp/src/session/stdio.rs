//! Stdio transport: a local subprocess speaking newline-delimited JSON-RPC.

use super::{list_resources_via, list_roots_via, list_tools_via, McpSession, RpcChannel, SessionOptions};
use crate::protocol::{initialize_params, InitializeResult, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use async_trait::async_trait;
use mcpeek_core::{
    CancelScope, McpeekError, McpeekResult, ResourceDescriptor, RootDescriptor, ToolDescriptor,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// Stderr lines kept for error messages.
const STDERR_TAIL_LINES: usize = 20;

/// Session with a server launched as a child process.
pub struct StdioSession {
    name: String,
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    options: SessionOptions,
    handshake_timeout: Duration,
    conn: Option<StdioConnection>,
    server_info: Option<String>,
    initialized: bool,
}

struct StdioConnection {
    child: Child,
    stdin: Mutex<Option<ChildStdin>>,
    pending: PendingMap,
    next_id: AtomicU64,
    /// Set by the reader task once stdout reaches EOF.
    closed: Arc<AtomicBool>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl StdioSession {
    /// An unopened session that will launch `program args...` with `env`
    /// layered over the inherited environment.
    pub fn new(
        name: impl Into<String>,
        program: impl Into<String>,
        args: Vec<String>,
        env: BTreeMap<String, String>,
        options: SessionOptions,
    ) -> Self {
        let handshake_timeout = options.handshake_timeout;
        Self {
            name: name.into(),
            program: program.into(),
            args,
            env,
            options,
            handshake_timeout,
            conn: None,
            server_info: None,
            initialized: false,
        }
    }

    /// Override the timeout of the `initialize` request.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Arguments the process is launched with.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// True while a child process exists, even if the handshake failed.
    pub(crate) fn has_process(&self) -> bool {
        self.conn.is_some()
    }

    fn target(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    fn spawn(&self) -> McpeekResult<StdioConnection> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(&self.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| McpeekError::dial(self.target(), e))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpeekError::Protocol("MCP server stdin not available".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpeekError::Protocol("MCP server stdout not available".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| McpeekError::Protocol("MCP server stderr not available".into()))?;

        debug!(server = %self.name, pid = ?child.id(), command = %self.program, "MCP server spawned");

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));

        let tasks = vec![
            tokio::spawn(read_stdout(
                self.name.clone(),
                stdout,
                pending.clone(),
                closed.clone(),
            )),
            tokio::spawn(drain_stderr(self.name.clone(), stderr, stderr_tail.clone())),
        ];

        Ok(StdioConnection {
            child,
            stdin: Mutex::new(Some(stdin)),
            pending,
            next_id: AtomicU64::new(1),
            closed,
            stderr_tail,
            tasks,
        })
    }

    fn connection(&self) -> McpeekResult<&StdioConnection> {
        self.conn
            .as_ref()
            .ok_or_else(|| McpeekError::NotConnected(self.name.clone()))
    }

    fn ensure_open(&self) -> McpeekResult<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(McpeekError::NotConnected(self.name.clone()))
        }
    }

    /// Send a request and wait for the matching response.
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
        scope: &CancelScope,
    ) -> McpeekResult<serde_json::Value> {
        let conn = self.connection()?;
        let id = conn.next_id.fetch_add(1, Ordering::SeqCst);
        let req = JsonRpcRequest::new(id, method, params);

        let (tx, rx) = oneshot::channel();
        conn.pending.lock().await.insert(id, tx);

        let result = scope
            .run(async {
                if conn.closed.load(Ordering::SeqCst) {
                    return Err(self.exited_error(conn, method).await);
                }
                conn.send(&req).await?;
                match tokio::time::timeout(timeout, rx).await {
                    Err(_) => Err(McpeekError::Timeout(format!(
                        "'{method}' on server '{}' after {timeout:?}",
                        self.name
                    ))),
                    Ok(Err(_)) => Err(self.exited_error(conn, method).await),
                    Ok(Ok(resp)) => resp.into_result(method),
                }
            })
            .await;

        if result.is_err() {
            conn.pending.lock().await.remove(&id);
        }
        result
    }

    async fn exited_error(&self, conn: &StdioConnection, method: &str) -> McpeekError {
        let tail: Vec<String> = conn.stderr_tail.lock().await.iter().cloned().collect();
        let detail = if tail.is_empty() {
            "server exited".to_string()
        } else {
            format!("server exited; stderr:\n{}", tail.join("\n"))
        };
        McpeekError::transport(
            format!("'{method}' on server '{}' got no response", self.name),
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, detail),
        )
    }
}

impl StdioConnection {
    async fn send<T: Serialize>(&self, msg: &T) -> McpeekResult<()> {
        let mut line = serde_json::to_vec(msg)?;
        line.push(b'\n');

        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| McpeekError::Protocol("MCP server stdin already closed".into()))?;
        stdin
            .write_all(&line)
            .await
            .map_err(|e| McpeekError::transport("failed to write to MCP server stdin", e))?;
        stdin
            .flush()
            .await
            .map_err(|e| McpeekError::transport("failed to flush MCP server stdin", e))?;
        Ok(())
    }

    /// Close stdin, wait up to `grace` for the process to exit, then kill it.
    async fn shutdown(mut self, server: &str, grace: Duration) {
        self.stdin.get_mut().take();

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => debug!(server = %server, %status, "MCP server exited"),
            Ok(Err(e)) => warn!(server = %server, error = %e, "Failed to wait for MCP server"),
            Err(_) => {
                warn!(
                    server = %server,
                    grace_secs = grace.as_secs(),
                    "MCP server did not exit in time, killing"
                );
                if let Err(e) = self.child.kill().await {
                    warn!(server = %server, error = %e, "Failed to kill MCP server");
                }
            }
        }

        for task in &self.tasks {
            task.abort();
        }
        self.pending.lock().await.clear();
    }
}

async fn read_stdout(server: String, stdout: ChildStdout, pending: PendingMap, closed: Arc<AtomicBool>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                    Ok(msg) if msg.is_server_message() => {
                        debug!(server = %server, method = ?msg.method, "Ignoring server-initiated message");
                    }
                    Ok(msg) => {
                        if let Some(id) = msg.id {
                            if let Some(tx) = pending.lock().await.remove(&id) {
                                let _ = tx.send(msg);
                            }
                        }
                    }
                    Err(e) => {
                        debug!(server = %server, line = %trimmed, error = %e, "Non-JSON-RPC line from MCP server");
                    }
                }
            }
            Ok(None) => {
                debug!(server = %server, "MCP server stdout closed");
                break;
            }
            Err(e) => {
                warn!(server = %server, error = %e, "Error reading MCP server stdout");
                break;
            }
        }
    }
    // waiters must observe `closed` before their sender disappears
    closed.store(true, Ordering::SeqCst);
    pending.lock().await.clear();
}

async fn drain_stderr(server: String, stderr: ChildStderr, tail: Arc<Mutex<VecDeque<String>>>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(server = %server, stderr = %line, "MCP server stderr");
        let mut tail = tail.lock().await;
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
}

#[async_trait]
impl RpcChannel for StdioSession {
    async fn call(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        scope: &CancelScope,
    ) -> McpeekResult<serde_json::Value> {
        self.request(method, params, self.options.request_timeout, scope)
            .await
    }
}

#[async_trait]
impl McpSession for StdioSession {
    fn server_name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.initialized
    }

    fn server_info(&self) -> Option<String> {
        self.server_info.clone()
    }

    async fn open(&mut self, scope: &CancelScope) -> McpeekResult<()> {
        if self.initialized {
            return Ok(());
        }
        // leftover process from a failed handshake
        if self.conn.is_some() {
            self.close().await;
        }
        if let Some(err) = scope.error() {
            return Err(err);
        }

        self.conn = Some(self.spawn()?);

        let result = self
            .request("initialize", Some(initialize_params()), self.handshake_timeout, scope)
            .await?;
        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| McpeekError::Protocol(format!("invalid initialize result: {e}")))?;

        let notification = JsonRpcNotification::new("notifications/initialized", None);
        let conn = self.connection()?;
        scope.run(conn.send(&notification)).await?;

        self.server_info = init.server_label();
        self.initialized = true;
        info!(
            server = %self.name,
            version = %init.protocol_version,
            "MCP server initialized"
        );
        Ok(())
    }

    async fn close(&mut self) {
        self.initialized = false;
        if let Some(conn) = self.conn.take() {
            conn.shutdown(&self.name, self.options.close_grace).await;
        }
    }

    async fn list_tools(&self, scope: &CancelScope) -> McpeekResult<Vec<ToolDescriptor>> {
        self.ensure_open()?;
        list_tools_via(self, scope).await
    }

    async fn list_resources(&self, scope: &CancelScope) -> McpeekResult<Vec<ResourceDescriptor>> {
        self.ensure_open()?;
        list_resources_via(self, scope).await
    }

    async fn list_roots(&self, scope: &CancelScope) -> McpeekResult<Vec<RootDescriptor>> {
        self.ensure_open()?;
        list_roots_via(self, scope).await
    }
}
