//! Streamable HTTP transport.
//!
//! Every JSON-RPC message is POSTed to the server URL. The server answers
//! with either a JSON body or an event stream carrying the response. The
//! session id handed out during `initialize` is replayed on every request
//! and released with a `DELETE` on close.

use super::sse::SseParser;
use super::{list_resources_via, list_roots_via, list_tools_via, McpSession, RpcChannel, SessionOptions};
use crate::protocol::{initialize_params, InitializeResult, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use async_trait::async_trait;
use mcpeek_core::{
    CancelScope, McpeekError, McpeekResult, ResourceDescriptor, RootDescriptor, ToolDescriptor,
};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

const SESSION_HEADER: &str = "Mcp-Session-Id";
const PROTOCOL_HEADER: &str = "MCP-Protocol-Version";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const ERROR_BODY_LIMIT: usize = 512;

/// Session with a remote MCP server over streamable HTTP.
pub struct HttpSession {
    name: String,
    url: String,
    headers: BTreeMap<String, String>,
    options: SessionOptions,
    conn: Option<HttpConnection>,
    server_info: Option<String>,
    initialized: bool,
}

struct HttpConnection {
    client: reqwest::Client,
    session_id: Option<String>,
    protocol_version: Option<String>,
    next_id: AtomicU64,
}

impl HttpSession {
    /// An unopened session for `url`, sending `headers` on every request.
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        headers: BTreeMap<String, String>,
        options: SessionOptions,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            headers,
            options,
            conn: None,
            server_info: None,
            initialized: false,
        }
    }

    /// Session id assigned by the server, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.conn.as_ref().and_then(|c| c.session_id.as_deref())
    }

    fn build_client(&self) -> McpeekResult<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("mcpeek/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| McpeekError::transport("failed to build HTTP client", e))
    }

    fn connection(&self) -> McpeekResult<&HttpConnection> {
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

    fn request_error(&self, e: reqwest::Error) -> McpeekError {
        if e.is_connect() {
            McpeekError::dial(self.url.clone(), e)
        } else {
            McpeekError::transport(format!("HTTP request to {} failed", self.url), e)
        }
    }

    /// POST one message. With `expect_id` set, waits for the response with
    /// that id; otherwise only checks the status.
    async fn post<B: Serialize + ?Sized>(
        &self,
        conn: &HttpConnection,
        body: &B,
        expect_id: Option<u64>,
        timeout: Duration,
        scope: &CancelScope,
    ) -> McpeekResult<(Option<JsonRpcResponse>, Option<String>)> {
        let mut req = conn
            .client
            .post(&self.url)
            .header(ACCEPT, "application/json, text/event-stream")
            .timeout(timeout)
            .json(body);
        for (key, value) in &self.headers {
            req = req.header(key.as_str(), value.as_str());
        }
        if let Some(id) = &conn.session_id {
            req = req.header(SESSION_HEADER, id.as_str());
        }
        if let Some(version) = &conn.protocol_version {
            req = req.header(PROTOCOL_HEADER, version.as_str());
        }

        scope
            .run(async {
                let resp = req.send().await.map_err(|e| self.request_error(e))?;
                let session_id = resp
                    .headers()
                    .get(SESSION_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                let status = resp.status();

                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                    return Err(McpeekError::Auth(format!("{} returned {status}", self.url)));
                }
                if !status.is_success() {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(McpeekError::HttpStatus {
                        status: status.as_u16(),
                        body: truncate(&body, ERROR_BODY_LIMIT),
                    });
                }

                let Some(id) = expect_id else {
                    return Ok((None, session_id));
                };
                if status == StatusCode::ACCEPTED {
                    return Err(McpeekError::Protocol(format!(
                        "server accepted request {id} without answering it"
                    )));
                }

                let is_stream = resp
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|ct| ct.starts_with("text/event-stream"));
                let msg = if is_stream {
                    self.read_event_stream(resp, id).await?
                } else {
                    resp.json::<JsonRpcResponse>()
                        .await
                        .map_err(|e| self.request_error(e))?
                };
                Ok((Some(msg), session_id))
            })
            .await
    }

    /// Read events until the response for `id` shows up.
    async fn read_event_stream(&self, mut resp: reqwest::Response, id: u64) -> McpeekResult<JsonRpcResponse> {
        let mut parser = SseParser::default();
        loop {
            let chunk = resp.chunk().await.map_err(|e| self.request_error(e))?;
            let done = chunk.is_none();
            let events = match chunk {
                Some(bytes) => parser.push(&bytes),
                None => parser.finish().into_iter().collect(),
            };
            for event in events {
                match serde_json::from_str::<JsonRpcResponse>(&event.data) {
                    Ok(msg) if msg.id == Some(id) && !msg.is_server_message() => return Ok(msg),
                    Ok(msg) => {
                        debug!(server = %self.name, method = ?msg.method, "Skipping unrelated event");
                    }
                    Err(e) => {
                        debug!(server = %self.name, error = %e, "Non-JSON-RPC event from MCP server");
                    }
                }
            }
            if done {
                break;
            }
        }
        Err(McpeekError::Protocol(format!(
            "event stream ended without a response to request {id}"
        )))
    }
}

fn truncate(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[async_trait]
impl RpcChannel for HttpSession {
    async fn call(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        scope: &CancelScope,
    ) -> McpeekResult<serde_json::Value> {
        let conn = self.connection()?;
        let id = conn.next_id.fetch_add(1, Ordering::SeqCst);
        let req = JsonRpcRequest::new(id, method, params);
        let (msg, _) = self
            .post(conn, &req, Some(id), self.options.request_timeout, scope)
            .await?;
        msg.ok_or_else(|| McpeekError::Protocol(format!("no response to '{method}'")))?
            .into_result(method)
    }
}

#[async_trait]
impl McpSession for HttpSession {
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
        if self.conn.is_some() {
            self.close().await;
        }
        if let Some(err) = scope.error() {
            return Err(err);
        }

        let mut conn = HttpConnection {
            client: self.build_client()?,
            session_id: None,
            protocol_version: None,
            next_id: AtomicU64::new(1),
        };
        let id = conn.next_id.fetch_add(1, Ordering::SeqCst);
        let req = JsonRpcRequest::new(id, "initialize", Some(initialize_params()));
        let (msg, session_id) = self
            .post(&conn, &req, Some(id), self.options.handshake_timeout, scope)
            .await?;
        let result = msg
            .ok_or_else(|| McpeekError::Protocol("no response to 'initialize'".into()))?
            .into_result("initialize")?;
        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| McpeekError::Protocol(format!("invalid initialize result: {e}")))?;

        conn.session_id = session_id;
        conn.protocol_version = Some(init.protocol_version.clone());
        // stored before notifying so a failure still releases the server session
        self.conn = Some(conn);

        let notification = JsonRpcNotification::new("notifications/initialized", None);
        let conn = self.connection()?;
        self.post(conn, &notification, None, self.options.request_timeout, scope)
            .await?;

        self.server_info = init.server_label();
        self.initialized = true;
        info!(
            server = %self.name,
            version = %init.protocol_version,
            session = ?self.session_id(),
            "MCP server initialized"
        );
        Ok(())
    }

    async fn close(&mut self) {
        self.initialized = false;
        let Some(conn) = self.conn.take() else {
            return;
        };
        let Some(session_id) = conn.session_id else {
            return;
        };

        let mut req = conn
            .client
            .delete(&self.url)
            .header(SESSION_HEADER, session_id.as_str())
            .timeout(self.options.close_grace);
        for (key, value) in &self.headers {
            req = req.header(key.as_str(), value.as_str());
        }
        match req.send().await {
            Ok(resp) => debug!(server = %self.name, status = %resp.status(), "MCP HTTP session terminated"),
            Err(e) => debug!(server = %self.name, error = %e, "Failed to terminate MCP HTTP session"),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("\u{e9}\u{e9}\u{e9}", 2), "\u{e9}\u{e9}...");
    }

    #[tokio::test]
    async fn test_close_without_open_is_noop() {
        let mut s = HttpSession::new("r", "http://127.0.0.1:9/mcp", BTreeMap::new(), SessionOptions::default());
        s.close().await;
        s.close().await;
        assert!(!s.is_open());
        assert!(s.session_id().is_none());
    }
}
