//! Sessions: one open connection to one MCP server.
//!
//! [`Session`] is a closed set of transports dispatched by `match`. Every
//! variant implements [`McpSession`], which is also the seam tests use to
//! substitute scripted servers.

mod container;
mod http;
pub mod sse;
mod stdio;

pub use container::ContainerSession;
pub use http::HttpSession;
pub use stdio::StdioSession;

use crate::protocol::{ListResourcesResult, ListRootsResult, ListToolsResult};
use async_trait::async_trait;
use mcpeek_core::{
    CancelScope, CapabilityKind, McpeekError, McpeekResult, ResourceDescriptor, RootDescriptor,
    ToolDescriptor, TransportDescriptor, TransportKind,
};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Listings longer than this many pages are treated as a misbehaving server.
const MAX_PAGES: usize = 100;

/// Timeouts shared by all transports.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Per-request timeout for listings and notifications.
    pub request_timeout: Duration,
    /// Timeout for the `initialize` request of stdio and HTTP servers.
    pub handshake_timeout: Duration,
    /// Timeout for the `initialize` request of containerized servers, which
    /// may need to pull an image first.
    pub container_handshake_timeout: Duration,
    /// How long `close` waits for a graceful exit before killing.
    pub close_grace: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(30),
            container_handshake_timeout: Duration::from_secs(120),
            close_grace: Duration::from_secs(5),
        }
    }
}

/// An open (or openable) connection to one MCP server.
#[async_trait]
pub trait McpSession: Send + Sync {
    /// Name of the server this session talks to.
    fn server_name(&self) -> &str;

    /// True after a successful `open` and before `close`.
    fn is_open(&self) -> bool;

    /// `name version` reported during the handshake.
    fn server_info(&self) -> Option<String> {
        None
    }

    /// Connect and run the MCP handshake. A no-op on an open session.
    async fn open(&mut self, scope: &CancelScope) -> McpeekResult<()>;

    /// Release the process or HTTP session. Safe to call at any time,
    /// any number of times.
    async fn close(&mut self);

    /// `tools/list`, following pagination.
    async fn list_tools(&self, scope: &CancelScope) -> McpeekResult<Vec<ToolDescriptor>>;

    /// `resources/list`, following pagination.
    async fn list_resources(&self, scope: &CancelScope) -> McpeekResult<Vec<ResourceDescriptor>>;

    /// `roots/list`.
    async fn list_roots(&self, scope: &CancelScope) -> McpeekResult<Vec<RootDescriptor>>;
}

/// A session over one of the supported transports.
pub enum Session {
    /// Local subprocess.
    Stdio(StdioSession),
    /// Subprocess inside a container.
    Container(ContainerSession),
    /// Remote streamable-HTTP server.
    Http(HttpSession),
}

impl Session {
    /// Build an unopened session for `descriptor`.
    pub fn for_descriptor(descriptor: &TransportDescriptor, options: &SessionOptions) -> Self {
        let name = descriptor.name.clone();
        match &descriptor.transport {
            TransportKind::Stdio { command, args } => Self::Stdio(StdioSession::new(
                name,
                command.clone(),
                args.clone(),
                descriptor.env.clone(),
                options.clone(),
            )),
            TransportKind::Container {
                image,
                args,
                run_args,
            } => Self::Container(ContainerSession::new(
                name,
                image,
                args,
                run_args,
                descriptor.env.clone(),
                options.clone(),
            )),
            TransportKind::Http { url, headers } => Self::Http(HttpSession::new(
                name,
                url.clone(),
                headers.clone(),
                options.clone(),
            )),
        }
    }

    fn inner(&self) -> &dyn McpSession {
        match self {
            Self::Stdio(s) => s,
            Self::Container(s) => s,
            Self::Http(s) => s,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn McpSession {
        match self {
            Self::Stdio(s) => s,
            Self::Container(s) => s,
            Self::Http(s) => s,
        }
    }
}

#[async_trait]
impl McpSession for Session {
    fn server_name(&self) -> &str {
        self.inner().server_name()
    }

    fn is_open(&self) -> bool {
        self.inner().is_open()
    }

    fn server_info(&self) -> Option<String> {
        self.inner().server_info()
    }

    async fn open(&mut self, scope: &CancelScope) -> McpeekResult<()> {
        self.inner_mut().open(scope).await
    }

    async fn close(&mut self) {
        self.inner_mut().close().await;
    }

    async fn list_tools(&self, scope: &CancelScope) -> McpeekResult<Vec<ToolDescriptor>> {
        self.inner().list_tools(scope).await
    }

    async fn list_resources(&self, scope: &CancelScope) -> McpeekResult<Vec<ResourceDescriptor>> {
        self.inner().list_resources(scope).await
    }

    async fn list_roots(&self, scope: &CancelScope) -> McpeekResult<Vec<RootDescriptor>> {
        self.inner().list_roots(scope).await
    }
}

/// Request/response channel to an initialized server.
#[async_trait]
pub(crate) trait RpcChannel: Send + Sync {
    async fn call(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        scope: &CancelScope,
    ) -> McpeekResult<serde_json::Value>;
}

async fn fetch<R, P>(rpc: &R, method: &str, cursor: Option<String>, scope: &CancelScope) -> McpeekResult<P>
where
    R: RpcChannel + ?Sized,
    P: DeserializeOwned,
{
    let params = cursor.map(|c| serde_json::json!({ "cursor": c }));
    let value = rpc.call(method, params, scope).await?;
    serde_json::from_value(value)
        .map_err(|e| McpeekError::Protocol(format!("invalid '{method}' result: {e}")))
}

async fn paginate<R, P, T>(
    rpc: &R,
    kind: CapabilityKind,
    scope: &CancelScope,
    split: fn(P) -> (Vec<T>, Option<String>),
) -> McpeekResult<Vec<T>>
where
    R: RpcChannel + ?Sized,
    P: DeserializeOwned,
{
    let mut items = Vec::new();
    let mut cursor = None;
    for _ in 0..MAX_PAGES {
        let (page, next) = split(fetch(rpc, kind.method(), cursor.take(), scope).await?);
        items.extend(page);
        match next {
            Some(c) if !c.is_empty() => cursor = Some(c),
            _ => return Ok(items),
        }
    }
    Err(McpeekError::Protocol(format!(
        "'{}' returned more than {MAX_PAGES} pages",
        kind.method()
    )))
}

pub(crate) async fn list_tools_via<R: RpcChannel + ?Sized>(
    rpc: &R,
    scope: &CancelScope,
) -> McpeekResult<Vec<ToolDescriptor>> {
    paginate(rpc, CapabilityKind::Tools, scope, |p: ListToolsResult| {
        (p.tools, p.next_cursor)
    })
    .await
}

pub(crate) async fn list_resources_via<R: RpcChannel + ?Sized>(
    rpc: &R,
    scope: &CancelScope,
) -> McpeekResult<Vec<ResourceDescriptor>> {
    paginate(rpc, CapabilityKind::Resources, scope, |p: ListResourcesResult| {
        (p.resources, p.next_cursor)
    })
    .await
}

pub(crate) async fn list_roots_via<R: RpcChannel + ?Sized>(
    rpc: &R,
    scope: &CancelScope,
) -> McpeekResult<Vec<RootDescriptor>> {
    let result: ListRootsResult = fetch(rpc, CapabilityKind::Roots.method(), None, scope).await?;
    Ok(result.roots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serves canned pages keyed by method and cursor.
    struct Pages {
        calls: Mutex<Vec<(String, Option<serde_json::Value>)>>,
    }

    #[async_trait]
    impl RpcChannel for Pages {
        async fn call(
            &self,
            method: &str,
            params: Option<serde_json::Value>,
            _scope: &CancelScope,
        ) -> McpeekResult<serde_json::Value> {
            self.calls.lock().unwrap().push((method.to_string(), params.clone()));
            let cursor = params.and_then(|p| p["cursor"].as_str().map(String::from));
            Ok(match (method, cursor.as_deref()) {
                ("tools/list", None) => serde_json::json!({"tools":[{"name":"a"}],"nextCursor":"2"}),
                ("tools/list", Some("2")) => serde_json::json!({"tools":[{"name":"b"}]}),
                ("roots/list", _) => serde_json::json!({"roots":[{"uri":"file:///w"}]}),
                _ => return Err(McpeekError::Server { code: -32601, message: "Method not found".into() }),
            })
        }
    }

    #[tokio::test]
    async fn test_pagination_follows_cursor() {
        let rpc = Pages { calls: Mutex::new(Vec::new()) };
        let tools = list_tools_via(&rpc, &CancelScope::new()).await.unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        let calls = rpc.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].1.is_none());
        assert_eq!(calls[1].1.as_ref().unwrap()["cursor"], "2");
    }

    #[tokio::test]
    async fn test_listing_error_propagates() {
        let rpc = Pages { calls: Mutex::new(Vec::new()) };
        let err = list_resources_via(&rpc, &CancelScope::new()).await.unwrap_err();
        assert!(matches!(err, McpeekError::Server { code: -32601, .. }));
        let roots = list_roots_via(&rpc, &CancelScope::new()).await.unwrap();
        assert_eq!(roots[0].uri, "file:///w");
    }

    #[test]
    fn test_for_descriptor_picks_variant() {
        let opts = SessionOptions::default();
        let s = Session::for_descriptor(&TransportDescriptor::http("r", "http://localhost:1/mcp"), &opts);
        assert!(matches!(s, Session::Http(_)));
        assert_eq!(s.server_name(), "r");
        assert!(!s.is_open());

        let s = Session::for_descriptor(
            &TransportDescriptor::container("c", "alpine", ["mcp"]),
            &opts,
        );
        assert!(matches!(s, Session::Container(_)));
    }
}
