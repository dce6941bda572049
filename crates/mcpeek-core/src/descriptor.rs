//! How to reach one MCP server.

use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::Duration;

/// Transport variant and the parameters that variant needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportKind {
    /// Local subprocess speaking newline-delimited JSON-RPC on stdio.
    Stdio {
        /// Executable to launch.
        command: String,
        /// Arguments passed to the executable.
        #[serde(default)]
        args: Vec<String>,
    },
    /// Subprocess launched inside a container via `docker run -i`.
    Container {
        /// Container image reference.
        image: String,
        /// Arguments appended after the image (entrypoint arguments).
        #[serde(default)]
        args: Vec<String>,
        /// Extra arguments for `docker run` placed before the image.
        #[serde(default)]
        run_args: Vec<String>,
    },
    /// Remote server reached over streamable HTTP.
    Http {
        /// Endpoint URL.
        url: String,
        /// Headers sent on every request.
        #[serde(default, serialize_with = "redacted")]
        headers: BTreeMap<String, String>,
    },
}

/// Immutable description of one declared MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportDescriptor {
    /// Server name as declared in the workflow.
    pub name: String,
    /// Transport and its parameters.
    #[serde(flatten)]
    pub transport: TransportKind,
    /// Environment variables for the server process.
    #[serde(default, serialize_with = "redacted")]
    pub env: BTreeMap<String, String>,
    /// Tool allow-list. `None` allows every tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
    /// Budget for all connection attempts to this server.
    #[serde(default, rename = "timeout_secs", with = "opt_secs")]
    pub timeout: Option<Duration>,
    /// Secret names referenced by the declaration but absent from the environment.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_secrets: Vec<String>,
}

impl TransportDescriptor {
    fn with_transport(name: impl Into<String>, transport: TransportKind) -> Self {
        Self {
            name: name.into(),
            transport,
            env: BTreeMap::new(),
            allowed: None,
            timeout: None,
            missing_secrets: Vec::new(),
        }
    }

    /// A stdio server launched as `command args...`.
    pub fn stdio<I, S>(name: impl Into<String>, command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_transport(
            name,
            TransportKind::Stdio {
                command: command.into(),
                args: args.into_iter().map(Into::into).collect(),
            },
        )
    }

    /// A containerized server running `image args...`.
    pub fn container<I, S>(name: impl Into<String>, image: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_transport(
            name,
            TransportKind::Container {
                image: image.into(),
                args: args.into_iter().map(Into::into).collect(),
                run_args: Vec::new(),
            },
        )
    }

    /// A remote streamable-HTTP server.
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::with_transport(
            name,
            TransportKind::Http {
                url: url.into(),
                headers: BTreeMap::new(),
            },
        )
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add an HTTP header. Ignored for non-HTTP transports.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let TransportKind::Http { headers, .. } = &mut self.transport {
            headers.insert(key.into(), value.into());
        }
        self
    }

    /// Restrict the tools this server is allowed to expose.
    pub fn with_allowed<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    /// Bound the total time spent connecting to this server.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Short transport label: `stdio`, `container` or `http`.
    pub fn kind_label(&self) -> &'static str {
        match self.transport {
            TransportKind::Stdio { .. } => "stdio",
            TransportKind::Container { .. } => "container",
            TransportKind::Http { .. } => "http",
        }
    }

    /// Human-readable connection target: command line, image or URL.
    pub fn target(&self) -> String {
        match &self.transport {
            TransportKind::Stdio { command, args } => join_command(command, args),
            TransportKind::Container { image, args, .. } => join_command(image, args),
            TransportKind::Http { url, .. } => url.clone(),
        }
    }

    /// Whether `tool` passes the allow-list. `*` allows everything.
    pub fn is_tool_allowed(&self, tool: &str) -> bool {
        match &self.allowed {
            None => true,
            Some(list) => list.iter().any(|t| t == "*" || t == tool),
        }
    }
}

fn join_command(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", args.join(" "))
    }
}

/// Serialize map keys only; values may hold credentials.
fn redacted<S: Serializer>(map: &BTreeMap<String, String>, ser: S) -> Result<S::Ok, S::Error> {
    ser.collect_map(map.keys().map(|k| (k, "***")))
}

mod opt_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, ser: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => ser.serialize_some(&d.as_secs()),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(de)?.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_and_label() {
        let d = TransportDescriptor::stdio("fs", "npx", ["-y", "server-fs"]);
        assert_eq!(d.kind_label(), "stdio");
        assert_eq!(d.target(), "npx -y server-fs");

        let d = TransportDescriptor::http("remote", "https://example.com/mcp");
        assert_eq!(d.kind_label(), "http");
        assert_eq!(d.target(), "https://example.com/mcp");
    }

    #[test]
    fn test_allow_list() {
        let d = TransportDescriptor::container("gh", "ghcr.io/github/github-mcp-server", Vec::<String>::new());
        assert!(d.is_tool_allowed("anything"));

        let d = d.with_allowed(["get_issue"]);
        assert!(d.is_tool_allowed("get_issue"));
        assert!(!d.is_tool_allowed("create_issue"));

        let d = d.with_allowed(["*"]);
        assert!(d.is_tool_allowed("create_issue"));
    }

    #[test]
    fn test_header_ignored_for_stdio() {
        let d = TransportDescriptor::stdio("x", "cat", Vec::<String>::new()).with_header("A", "b");
        assert!(matches!(d.transport, TransportKind::Stdio { .. }));
    }

    #[test]
    fn test_serialization_redacts_secrets() {
        let d = TransportDescriptor::http("remote", "https://example.com/mcp")
            .with_header("Authorization", "Bearer s3cret")
            .with_env("TOKEN", "hunter2")
            .with_timeout(Duration::from_secs(15));
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["type"], "http");
        assert_eq!(json["headers"]["Authorization"], "***");
        assert_eq!(json["env"]["TOKEN"], "***");
        assert_eq!(json["timeout_secs"], 15);
        let text = json.to_string();
        assert!(!text.contains("s3cret"));
        assert!(!text.contains("hunter2"));
    }

    #[test]
    fn test_deserialize_defaults() {
        let d: TransportDescriptor =
            serde_json::from_str(r#"{"name":"fs","type":"stdio","command":"mcp-fs"}"#).unwrap();
        assert_eq!(d.target(), "mcp-fs");
        assert!(d.env.is_empty());
        assert!(d.timeout.is_none());
        assert!(d.allowed.is_none());
    }
}
