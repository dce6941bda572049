//! Capability listings collected from one server.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A tool exposed by a server (`tools/list`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema of the tool arguments.
    #[serde(default = "empty_schema", rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

fn empty_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// A resource exposed by a server (`resources/list`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Resource URI.
    pub uri: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type, if known.
    #[serde(default, rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// A filesystem root reported by a server (`roots/list`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootDescriptor {
    /// Root URI, usually `file://...`.
    pub uri: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The three capability listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    /// `tools/list`
    Tools,
    /// `resources/list`
    Resources,
    /// `roots/list`
    Roots,
}

impl CapabilityKind {
    /// All kinds in probe order.
    pub const ALL: [CapabilityKind; 3] = [Self::Tools, Self::Resources, Self::Roots];

    /// JSON-RPC method that lists this kind.
    pub fn method(self) -> &'static str {
        match self {
            Self::Tools => "tools/list",
            Self::Resources => "resources/list",
            Self::Roots => "roots/list",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tools => "tools",
            Self::Resources => "resources",
            Self::Roots => "roots",
        })
    }
}

/// Everything a probe learned about one server.
///
/// A kind that failed has an empty listing and exactly one entry in `errors`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySet {
    /// Server name and version from the handshake, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_info: Option<String>,
    /// Tools.
    pub tools: Vec<ToolDescriptor>,
    /// Resources.
    pub resources: Vec<ResourceDescriptor>,
    /// Roots.
    pub roots: Vec<RootDescriptor>,
    /// Per-kind listing failures.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<CapabilityKind, String>,
}

impl CapabilitySet {
    /// Record the failure of one listing. A later failure for the same kind
    /// replaces the earlier one.
    pub fn record_error(&mut self, kind: CapabilityKind, err: impl fmt::Display) {
        self.errors.insert(kind, err.to_string());
    }

    /// Failure recorded for `kind`, if any.
    pub fn error(&self, kind: CapabilityKind) -> Option<&str> {
        self.errors.get(&kind).map(String::as_str)
    }

    /// True when every listing succeeded.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// Look up a tool by exact name.
    pub fn tool(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_error_once_per_kind() {
        let mut set = CapabilitySet::default();
        set.record_error(CapabilityKind::Roots, "method not found");
        set.record_error(CapabilityKind::Roots, "still not found");
        assert_eq!(set.errors.len(), 1);
        assert_eq!(set.error(CapabilityKind::Roots), Some("still not found"));
        assert!(set.error(CapabilityKind::Tools).is_none());
        assert!(!set.is_complete());
    }

    #[test]
    fn test_tool_parse_uses_mcp_field_names() {
        let json = r#"{"name":"read_file","description":"Read a file","inputSchema":{"type":"object"}}"#;
        let tool: ToolDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(tool.name, "read_file");
        assert_eq!(tool.description.as_deref(), Some("Read a file"));

        let bare: ToolDescriptor = serde_json::from_str(r#"{"name":"ping"}"#).unwrap();
        assert_eq!(bare.input_schema["type"], "object");
    }

    #[test]
    fn test_errors_serialize_keyed_by_kind() {
        let mut set = CapabilitySet::default();
        set.record_error(CapabilityKind::Resources, "boom");
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["errors"]["resources"], "boom");
    }

    #[test]
    fn test_kind_methods() {
        let methods: Vec<_> = CapabilityKind::ALL.iter().map(|k| k.method()).collect();
        assert_eq!(methods, ["tools/list", "resources/list", "roots/list"]);
    }
}
