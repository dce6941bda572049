//! Client for an MCP server registry (`/v0/servers`).
//!
//! Registry entries are flattened into [`TransportDescriptor`]s: the first
//! package becomes a stdio or container launch, otherwise the first remote
//! becomes an HTTP endpoint. Secret inputs turn into `${NAME}` placeholders.

use mcpeek_core::{McpeekError, McpeekResult, TransportDescriptor};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Public registry used when none is configured.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.modelcontextprotocol.io";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ServerList {
    #[serde(default)]
    servers: Vec<ServerRecord>,
}

/// Newer registries wrap each server with metadata; older ones do not.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ServerRecord {
    Wrapped {
        server: RawServer,
        #[serde(default, rename = "_meta")]
        meta: Option<serde_json::Value>,
    },
    Bare(RawServer),
}

#[derive(Debug, Deserialize)]
struct RawServer {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    repository: Option<Repository>,
    #[serde(default)]
    packages: Vec<Package>,
    #[serde(default)]
    remotes: Vec<Remote>,
}

#[derive(Debug, Deserialize)]
struct Repository {
    #[serde(default)]
    url: String,
}

#[derive(Debug, Deserialize)]
struct Package {
    #[serde(default, alias = "registry_type", alias = "registry_name", rename = "registryType")]
    registry_type: String,
    #[serde(default, alias = "name")]
    identifier: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default, alias = "package_arguments", rename = "packageArguments")]
    package_arguments: Vec<Argument>,
    #[serde(default, alias = "environment_variables", rename = "environmentVariables")]
    environment_variables: Vec<Input>,
}

#[derive(Debug, Deserialize)]
struct Argument {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Remote {
    #[serde(default, rename = "type")]
    kind: String,
    url: String,
    #[serde(default)]
    headers: Vec<Input>,
}

#[derive(Debug, Deserialize)]
struct Input {
    name: String,
    #[serde(default, alias = "is_secret", rename = "isSecret")]
    is_secret: bool,
    #[serde(default)]
    default: Option<String>,
}

impl Input {
    fn value(&self) -> String {
        match &self.default {
            Some(d) if !self.is_secret && !d.is_empty() => d.clone(),
            _ => format!("${{{}}}", self.name),
        }
    }
}

/// A registry entry ready to inspect.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryServer {
    /// Registry name, e.g. `io.github.acme/weather`.
    pub name: String,
    /// Short description.
    pub description: String,
    /// Published version.
    pub version: String,
    /// Source repository URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    /// How to reach it.
    pub descriptor: TransportDescriptor,
}

/// Thin registry client. No retries: failures are reported as-is.
pub struct RegistryClient {
    base_url: String,
    client: reqwest::Client,
}

impl RegistryClient {
    /// Client for the registry at `base_url`.
    pub fn new(base_url: impl Into<String>) -> McpeekResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("mcpeek/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| McpeekError::Registry(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Active servers whose name or description contains `query`
    /// (case-insensitive). An empty query lists every active server.
    pub async fn search(&self, query: &str) -> McpeekResult<Vec<RegistryServer>> {
        let servers = self.fetch(None).await?;
        let needle = query.to_lowercase();
        let matched: Vec<_> = servers
            .into_iter()
            .filter(|s| {
                needle.is_empty()
                    || s.name.to_lowercase().contains(&needle)
                    || s.description.to_lowercase().contains(&needle)
            })
            .collect();
        info!(query = %query, results = matched.len(), "Registry search complete");
        Ok(matched)
    }

    /// The active server named exactly `name`.
    pub async fn get(&self, name: &str) -> McpeekResult<RegistryServer> {
        self.fetch(Some(name))
            .await?
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| McpeekError::Registry(format!("server '{name}' not found in registry")))
    }

    async fn fetch(&self, search: Option<&str>) -> McpeekResult<Vec<RegistryServer>> {
        let url = format!("{}/v0/servers", self.base_url);
        let mut req = self.client.get(&url);
        if let Some(term) = search {
            req = req.query(&[("search", term)]);
        }
        debug!(url = %url, search = ?search, "Querying MCP registry");

        let resp = req
            .send()
            .await
            .map_err(|e| McpeekError::Registry(format!("failed to query {url}: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(McpeekError::Registry(format!(
                "registry returned status {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }
        let list: ServerList = resp
            .json()
            .await
            .map_err(|e| McpeekError::Registry(format!("failed to parse registry response: {e}")))?;

        Ok(list.servers.into_iter().filter_map(flatten).collect())
    }
}

/// Flatten one record, dropping anything that is not active.
fn flatten(record: ServerRecord) -> Option<RegistryServer> {
    let (raw, meta) = match record {
        ServerRecord::Wrapped { server, meta } => (server, meta),
        ServerRecord::Bare(server) => (server, None),
    };
    let status = raw.status.clone().or_else(|| {
        meta.as_ref()
            .and_then(|m| m.get("io.modelcontextprotocol.registry/official"))
            .and_then(|o| o.get("status"))
            .and_then(|s| s.as_str())
            .map(String::from)
    });
    if status.as_deref().is_some_and(|s| s != "active") {
        return None;
    }

    let descriptor = if let Some(pkg) = raw.packages.first() {
        package_descriptor(&raw.name, pkg)
    } else if let Some(remote) = raw.remotes.first() {
        let mut d = TransportDescriptor::http(&raw.name, &remote.url);
        for header in &remote.headers {
            d = d.with_header(&header.name, header.value());
        }
        debug!(server = %raw.name, kind = %remote.kind, "Using registry remote");
        d
    } else {
        return None;
    };

    Some(RegistryServer {
        name: raw.name,
        description: raw.description,
        version: raw.version,
        repository: raw.repository.map(|r| r.url).filter(|u| !u.is_empty()),
        descriptor,
    })
}

fn package_descriptor(name: &str, pkg: &Package) -> TransportDescriptor {
    let positional: Vec<String> = pkg
        .package_arguments
        .iter()
        .filter(|a| a.kind == "positional")
        .filter_map(|a| a.value.clone())
        .collect();
    let versioned = |sep: &str| match &pkg.version {
        Some(v) if !v.is_empty() => format!("{}{sep}{v}", pkg.identifier),
        _ => pkg.identifier.clone(),
    };

    let mut descriptor = match pkg.registry_type.as_str() {
        "npm" => {
            let mut args = vec!["-y".to_string(), versioned("@")];
            args.extend(positional);
            TransportDescriptor::stdio(name, "npx", args)
        }
        "pypi" => {
            let mut args = vec![versioned("==")];
            args.extend(positional);
            TransportDescriptor::stdio(name, "uvx", args)
        }
        "oci" | "docker" => TransportDescriptor::container(name, versioned(":"), positional),
        _ => TransportDescriptor::stdio(name, pkg.identifier.clone(), positional),
    };
    for input in &pkg.environment_variables {
        descriptor = descriptor.with_env(&input.name, input.value());
    }
    descriptor
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpeek_core::TransportKind;

    fn record(json: serde_json::Value) -> ServerRecord {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_npm_package_flattens_to_npx() {
        let r = record(serde_json::json!({
            "server": {
                "name": "io.github.acme/weather",
                "description": "Weather",
                "version": "1.0.0",
                "packages": [{
                    "registryType": "npm",
                    "identifier": "@acme/weather-mcp",
                    "version": "1.0.0",
                    "packageArguments": [{"type": "positional", "value": "--stdio"}],
                    "environmentVariables": [
                        {"name": "WEATHER_KEY", "isSecret": true},
                        {"name": "UNITS", "default": "metric"}
                    ]
                }]
            },
            "_meta": {"io.modelcontextprotocol.registry/official": {"status": "active"}}
        }));
        let s = flatten(r).unwrap();
        assert_eq!(s.descriptor.target(), "npx -y @acme/weather-mcp@1.0.0 --stdio");
        assert_eq!(s.descriptor.env["WEATHER_KEY"], "${WEATHER_KEY}");
        assert_eq!(s.descriptor.env["UNITS"], "metric");
    }

    #[test]
    fn test_remote_flattens_to_http() {
        let r = record(serde_json::json!({
            "name": "remote-one",
            "status": "active",
            "remotes": [{"type": "streamable-http", "url": "https://mcp.example.com/",
                         "headers": [{"name": "Authorization", "isSecret": true}]}]
        }));
        let s = flatten(r).unwrap();
        match &s.descriptor.transport {
            TransportKind::Http { url, headers } => {
                assert_eq!(url, "https://mcp.example.com/");
                assert_eq!(headers["Authorization"], "${Authorization}");
            }
            other => panic!("unexpected transport: {other:?}"),
        }
    }

    #[test]
    fn test_inactive_servers_are_dropped() {
        let r = record(serde_json::json!({
            "name": "old", "status": "deprecated",
            "packages": [{"registry_type": "npm", "name": "old-mcp"}]
        }));
        assert!(flatten(r).is_none());
    }

    #[test]
    fn test_oci_package_is_container() {
        let r = record(serde_json::json!({
            "name": "boxed",
            "packages": [{"registryType": "oci", "identifier": "ghcr.io/acme/boxed", "version": "2"}]
        }));
        let s = flatten(r).unwrap();
        assert_eq!(s.descriptor.kind_label(), "container");
        assert_eq!(s.descriptor.target(), "ghcr.io/acme/boxed:2");
    }
}
