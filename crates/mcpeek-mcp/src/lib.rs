//! MCP connection layer for mcpeek.
//!
//! Sessions over stdio, containerized stdio and streamable HTTP; a retrying
//! [`ConnectionManager`]; the capability [`probe`]; and the
//! [`InspectionCoordinator`] that fans out over every declared server.

pub mod classify;
pub mod connection;
pub mod inspect;
pub mod probe;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod workflow;

pub use classify::{classify, classify_error, ErrorClass};
pub use connection::{ConnectionAttempt, ConnectionManager, Connector, RetryPolicy, TransportConnector};
pub use inspect::{InspectFilter, InspectionCoordinator};
pub use probe::probe;
pub use registry::{RegistryClient, RegistryServer, DEFAULT_REGISTRY_URL};
pub use session::{ContainerSession, HttpSession, McpSession, Session, SessionOptions, StdioSession};
pub use workflow::{find_workflows_with_mcp, load_workflow, parse_workflow, SecretResolver, WorkflowSummary};
