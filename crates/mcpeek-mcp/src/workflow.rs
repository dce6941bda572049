//! Extract MCP server declarations from workflow markdown frontmatter.
//!
//! Two sources are recognised: the `mcp-servers` map and the built-in
//! `github` / `playwright` entries under `tools`. Built-ins come first,
//! then `mcp-servers`, each in the order written in the file.

use mcpeek_core::{McpeekError, McpeekResult, TransportDescriptor, TransportKind};
use regex::{Captures, Regex};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default tag of the GitHub MCP server image.
pub const DEFAULT_GITHUB_MCP_VERSION: &str = "v0.26.3";
const GITHUB_IMAGE: &str = "ghcr.io/github/github-mcp-server";
const GITHUB_REMOTE_URL: &str = "https://api.githubcopilot.com/mcp/";
const GITHUB_TOKEN_SECRET: &str = "${{ secrets.GITHUB_TOKEN }}";
const PLAYWRIGHT_IMAGE: &str = "mcr.microsoft.com/playwright";
const LOCALHOST_DOMAINS: [&str; 4] = ["localhost", "localhost:*", "127.0.0.1", "127.0.0.1:*"];

#[derive(Debug, Default, Deserialize)]
struct Frontmatter {
    #[serde(default)]
    tools: Mapping,
    #[serde(default, rename = "mcp-servers")]
    mcp_servers: Mapping,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSpec {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    container: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default, rename = "entrypointArgs")]
    entrypoint_args: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    allowed: Option<Vec<String>>,
    /// Seconds.
    #[serde(default)]
    timeout: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct GithubTool {
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    allowed: Option<Vec<String>>,
    #[serde(default)]
    read_only: bool,
    #[serde(default)]
    toolsets: Vec<String>,
    #[serde(default)]
    github_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PlaywrightTool {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    allowed: Option<Vec<String>>,
    #[serde(default)]
    allowed_domains: Option<Domains>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Domains {
    One(String),
    Many(Vec<String>),
}

/// Replaces `${{ secrets.NAME }}` and `${NAME}` placeholders.
pub struct SecretResolver {
    pattern: Regex,
    lookup: Box<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

impl SecretResolver {
    /// Resolver backed by an arbitrary lookup.
    pub fn new(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> McpeekResult<Self> {
        let pattern = Regex::new(
            r"\$\{\{\s*secrets\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}|\$\{([A-Za-z_][A-Za-z0-9_]*)\}",
        )
        .map_err(|e| McpeekError::Config(format!("invalid secret pattern: {e}")))?;
        Ok(Self {
            pattern,
            lookup: Box::new(lookup),
        })
    }

    /// Resolver reading the process environment. `GITHUB_TOKEN` falls back
    /// to `GH_TOKEN`.
    pub fn from_env() -> McpeekResult<Self> {
        Self::new(|name| {
            let value = std::env::var(name).ok().filter(|v| !v.is_empty());
            if value.is_none() && name == "GITHUB_TOKEN" {
                return std::env::var("GH_TOKEN").ok().filter(|v| !v.is_empty());
            }
            value
        })
    }

    /// Substitute every placeholder in `value`. Unresolved names are
    /// appended to `missing` once and their placeholder is left in place.
    pub fn resolve(&self, value: &str, missing: &mut Vec<String>) -> String {
        self.pattern
            .replace_all(value, |caps: &Captures<'_>| {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map_or("", |m| m.as_str());
                match (self.lookup)(name) {
                    Some(v) => v,
                    None => {
                        if !missing.iter().any(|m| m == name) {
                            missing.push(name.to_string());
                        }
                        caps[0].to_string()
                    }
                }
            })
            .into_owned()
    }

    fn apply(&self, mut descriptor: TransportDescriptor) -> TransportDescriptor {
        let mut missing = std::mem::take(&mut descriptor.missing_secrets);
        for value in descriptor.env.values_mut() {
            *value = self.resolve(value, &mut missing);
        }
        if let TransportKind::Http { headers, .. } = &mut descriptor.transport {
            for value in headers.values_mut() {
                *value = self.resolve(value, &mut missing);
            }
        }
        descriptor.missing_secrets = missing;
        descriptor
    }
}

/// YAML between the leading `---` fences, if the document has frontmatter.
pub fn extract_frontmatter(content: &str) -> Option<&str> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut lines = content.split_inclusive('\n');
    let first = lines.next()?;
    if first.trim_end() != "---" {
        return None;
    }
    let start = first.len();
    let mut offset = start;
    for line in lines {
        if line.trim_end() == "---" {
            return Some(&content[start..offset]);
        }
        offset += line.len();
    }
    None
}

/// Parse the MCP servers declared by a workflow document.
pub fn parse_workflow(content: &str, secrets: &SecretResolver) -> McpeekResult<Vec<TransportDescriptor>> {
    let Some(yaml) = extract_frontmatter(content) else {
        return Ok(Vec::new());
    };
    let frontmatter: Frontmatter = if yaml.trim().is_empty() {
        Frontmatter::default()
    } else {
        serde_yaml::from_str(yaml)
            .map_err(|e| McpeekError::Config(format!("invalid workflow frontmatter: {e}")))?
    };

    let mut descriptors = Vec::new();
    for (key, value) in &frontmatter.tools {
        match key.as_str() {
            Some("github") => descriptors.push(github_descriptor(value)?),
            Some("playwright") => descriptors.push(playwright_descriptor(value)?),
            _ => {}
        }
    }
    for (key, value) in &frontmatter.mcp_servers {
        let name = key
            .as_str()
            .ok_or_else(|| McpeekError::Config("mcp-servers keys must be strings".into()))?;
        if !value.is_mapping() {
            debug!(server = name, "Skipping mcp-servers entry that is not a mapping");
            continue;
        }
        let spec: ServerSpec = serde_yaml::from_value(value.clone())
            .map_err(|e| McpeekError::Config(format!("invalid MCP server '{name}': {e}")))?;
        descriptors.push(server_descriptor(name, spec)?);
    }

    Ok(descriptors.into_iter().map(|d| secrets.apply(d)).collect())
}

fn server_descriptor(name: &str, spec: ServerSpec) -> McpeekResult<TransportDescriptor> {
    let kind = match spec.kind.as_deref().map(str::to_ascii_lowercase) {
        Some(kind) => kind,
        None if spec.url.is_some() => "http".to_string(),
        None if spec.container.is_some() => "docker".to_string(),
        None if spec.command.is_some() => "stdio".to_string(),
        None => {
            return Err(McpeekError::Config(format!(
                "MCP server '{name}' must set one of command, container or url"
            )))
        }
    };

    let mut descriptor = match kind.as_str() {
        "stdio" | "local" | "docker" | "container" => {
            if let Some(container) = &spec.container {
                let image = match &spec.version {
                    Some(v) if !container.contains(':') => format!("{container}:{v}"),
                    _ => container.clone(),
                };
                TransportDescriptor::container(name, image, spec.entrypoint_args.clone())
            } else if kind == "docker" || kind == "container" {
                return Err(McpeekError::Config(format!(
                    "MCP server '{name}' of type {kind} needs a container image"
                )));
            } else {
                let command = spec.command.clone().ok_or_else(|| {
                    McpeekError::Config(format!("MCP server '{name}' of type {kind} needs a command"))
                })?;
                TransportDescriptor::stdio(name, command, spec.args.clone())
            }
        }
        "http" => {
            let url = spec.url.clone().ok_or_else(|| {
                McpeekError::Config(format!("MCP server '{name}' of type http needs a url"))
            })?;
            let mut d = TransportDescriptor::http(name, url);
            for (k, v) in &spec.headers {
                d = d.with_header(k.clone(), v.clone());
            }
            d
        }
        other => {
            return Err(McpeekError::Config(format!(
                "MCP server '{name}' has unsupported type '{other}'"
            )))
        }
    };

    // for containers `args` are extra `docker run` arguments
    if let TransportKind::Container { run_args, .. } = &mut descriptor.transport {
        run_args.extend(spec.args.iter().cloned());
    }
    descriptor.env = spec.env;
    descriptor.allowed = spec.allowed;
    descriptor.timeout = spec.timeout.filter(|s| *s > 0).map(Duration::from_secs);
    Ok(descriptor)
}

fn tool_config<T: Default + for<'de> Deserialize<'de>>(name: &str, value: &Value) -> McpeekResult<T> {
    match value {
        Value::Mapping(_) => serde_yaml::from_value(value.clone())
            .map_err(|e| McpeekError::Config(format!("invalid '{name}' tool configuration: {e}"))),
        _ => Ok(T::default()),
    }
}

fn github_descriptor(value: &Value) -> McpeekResult<TransportDescriptor> {
    let cfg: GithubTool = tool_config("github", value)?;
    let token = cfg.github_token.clone().unwrap_or_else(|| GITHUB_TOKEN_SECRET.to_string());

    let mut descriptor = if cfg.mode.as_deref() == Some("remote") {
        let mut d = TransportDescriptor::http("github", GITHUB_REMOTE_URL)
            .with_header("Authorization", format!("Bearer {token}"));
        if cfg.read_only {
            d = d.with_header("X-MCP-Readonly", "true");
        }
        d
    } else {
        let version = cfg.version.as_deref().unwrap_or(DEFAULT_GITHUB_MCP_VERSION);
        let mut d = TransportDescriptor::container("github", format!("{GITHUB_IMAGE}:{version}"), cfg.args.clone())
            .with_env("GITHUB_PERSONAL_ACCESS_TOKEN", token);
        if cfg.read_only {
            d = d.with_env("GITHUB_READ_ONLY", "1");
        }
        if !cfg.toolsets.is_empty() {
            d = d.with_env("GITHUB_TOOLSETS", cfg.toolsets.join(","));
        }
        d
    };
    descriptor.allowed = cfg.allowed;
    Ok(descriptor)
}

fn playwright_descriptor(value: &Value) -> McpeekResult<TransportDescriptor> {
    let cfg: PlaywrightTool = tool_config("playwright", value)?;
    let version = cfg.version.as_deref().unwrap_or("latest");

    let mut domains: Vec<String> = match cfg.allowed_domains {
        Some(Domains::One(d)) => vec![d],
        Some(Domains::Many(list)) => list,
        None => Vec::new(),
    };
    for local in LOCALHOST_DOMAINS {
        if !domains.iter().any(|d| d == local) {
            domains.push(local.to_string());
        }
    }

    let mut descriptor = TransportDescriptor::container(
        "playwright",
        format!("{PLAYWRIGHT_IMAGE}:{version}"),
        cfg.args.clone(),
    )
    .with_env("PLAYWRIGHT_ALLOWED_DOMAINS", domains.join(","));
    if let TransportKind::Container { run_args, .. } = &mut descriptor.transport {
        run_args.extend(["--shm-size=2gb".to_string(), "--cap-add=SYS_ADMIN".to_string()]);
    }
    descriptor.allowed = cfg.allowed;
    Ok(descriptor)
}

/// Read and parse a workflow file, resolving secrets from the environment.
pub async fn load_workflow(path: &Path) -> McpeekResult<Vec<TransportDescriptor>> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        McpeekError::Config(format!("failed to read workflow '{}': {e}", path.display()))
    })?;
    parse_workflow(&content, &SecretResolver::from_env()?)
        .map_err(|e| McpeekError::Config(format!("{}: {e}", path.display())))
}

/// Resolve a workflow argument: an existing path, or a name inside `dir`
/// with `.md` appended when missing.
pub fn resolve_workflow_path(dir: &Path, workflow: &str) -> PathBuf {
    let direct = PathBuf::from(workflow);
    if direct.is_file() {
        return direct;
    }
    if workflow.ends_with(".md") {
        dir.join(workflow)
    } else {
        dir.join(format!("{workflow}.md"))
    }
}

/// A workflow file that declares MCP servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSummary {
    /// File stem.
    pub name: String,
    /// Path to the file.
    pub path: PathBuf,
    /// Declared server names in order.
    pub servers: Vec<String>,
}

/// List the `.md` workflows in `dir` that declare at least one MCP server,
/// sorted by name. Files that fail to parse are skipped.
pub async fn find_workflows_with_mcp(dir: &Path) -> McpeekResult<Vec<WorkflowSummary>> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
        McpeekError::Config(format!("failed to read workflows directory '{}': {e}", dir.display()))
    })?;
    let secrets = SecretResolver::new(|_| None)?;

    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping unreadable workflow");
                continue;
            }
        };
        match parse_workflow(&content, &secrets) {
            Ok(servers) if !servers.is_empty() => found.push(WorkflowSummary {
                name: path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                servers: servers.into_iter().map(|d| d.name).collect(),
                path,
            }),
            Ok(_) => {}
            Err(e) => debug!(path = %path.display(), error = %e, "Skipping workflow with invalid frontmatter"),
        }
    }
    found.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_secrets() -> SecretResolver {
        SecretResolver::new(|_| None).unwrap()
    }

    #[test]
    fn test_extract_frontmatter() {
        let doc = "---\non: push\n---\n# Body\n";
        assert_eq!(extract_frontmatter(doc), Some("on: push\n"));
        assert_eq!(extract_frontmatter("# no frontmatter"), None);
        assert_eq!(extract_frontmatter("---\nunterminated: true\n"), None);
        assert_eq!(extract_frontmatter("---\r\na: 1\r\n---\r\n"), Some("a: 1\r\n"));
    }

    #[test]
    fn test_non_mapping_server_entry_is_skipped() {
        let doc = "---\nmcp-servers:\n  broken: just-a-string\n  empty:\n  fs:\n    command: mcp-fs\n---\n";
        let servers = parse_workflow(doc, &no_secrets()).unwrap();
        let names: Vec<_> = servers.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["fs"]);
    }

    #[test]
    fn test_declaration_order_and_type_inference() {
        let doc = r#"---
mcp-servers:
  zeta:
    command: node
    args: [server.js]
  alpha:
    url: https://example.com/mcp
    headers:
      X-Api-Key: abc
  mid:
    container: ghcr.io/acme/mcp
    version: "1.2"
    entrypointArgs: [serve]
    args: ["--network=host"]
---
"#;
        let servers = parse_workflow(doc, &no_secrets()).unwrap();
        let names: Vec<_> = servers.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
        assert_eq!(servers[0].kind_label(), "stdio");
        assert_eq!(servers[0].target(), "node server.js");
        assert_eq!(servers[1].kind_label(), "http");
        match &servers[2].transport {
            TransportKind::Container { image, args, run_args } => {
                assert_eq!(image, "ghcr.io/acme/mcp:1.2");
                assert_eq!(args, &["serve"]);
                assert_eq!(run_args, &["--network=host"]);
            }
            other => panic!("unexpected transport: {other:?}"),
        }
    }

    #[test]
    fn test_local_type_is_stdio() {
        let doc = "---\nmcp-servers:\n  x:\n    type: local\n    command: mcp-x\n    timeout: 20\n---\n";
        let servers = parse_workflow(doc, &no_secrets()).unwrap();
        assert_eq!(servers[0].kind_label(), "stdio");
        assert_eq!(servers[0].timeout, Some(Duration::from_secs(20)));
    }

    #[test]
    fn test_missing_connection_fields_is_config_error() {
        let doc = "---\nmcp-servers:\n  broken:\n    env:\n      A: b\n---\n";
        let err = parse_workflow(doc, &no_secrets()).unwrap_err();
        assert!(matches!(err, McpeekError::Config(_)));

        let doc = "---\nmcp-servers:\n  broken:\n    type: http\n---\n";
        assert!(parse_workflow(doc, &no_secrets()).is_err());
    }

    #[test]
    fn test_builtin_github_defaults_to_container() {
        let doc = "---\ntools:\n  github:\n    allowed: [get_issue]\n    read-only: true\n  bash: true\n---\n";
        let servers = parse_workflow(doc, &no_secrets()).unwrap();
        assert_eq!(servers.len(), 1);
        let gh = &servers[0];
        assert_eq!(gh.name, "github");
        assert_eq!(gh.target(), format!("{GITHUB_IMAGE}:{DEFAULT_GITHUB_MCP_VERSION}"));
        assert_eq!(gh.env.get("GITHUB_READ_ONLY").map(String::as_str), Some("1"));
        assert!(gh.is_tool_allowed("get_issue"));
        assert!(!gh.is_tool_allowed("create_issue"));
        assert_eq!(gh.missing_secrets, ["GITHUB_TOKEN"]);
    }

    #[test]
    fn test_builtin_github_remote_mode() {
        let doc = "---\ntools:\n  github:\n    mode: remote\n---\n";
        let secrets = SecretResolver::new(|n| (n == "GITHUB_TOKEN").then(|| "tok".to_string())).unwrap();
        let servers = parse_workflow(doc, &secrets).unwrap();
        match &servers[0].transport {
            TransportKind::Http { url, headers } => {
                assert_eq!(url, GITHUB_REMOTE_URL);
                assert_eq!(headers["Authorization"], "Bearer tok");
            }
            other => panic!("unexpected transport: {other:?}"),
        }
        assert!(servers[0].missing_secrets.is_empty());
    }

    #[test]
    fn test_builtin_playwright_keeps_localhost() {
        let doc = "---\ntools:\n  playwright:\n    allowed_domains: example.com\n---\n";
        let servers = parse_workflow(doc, &no_secrets()).unwrap();
        let domains = &servers[0].env["PLAYWRIGHT_ALLOWED_DOMAINS"];
        assert!(domains.starts_with("example.com,"));
        assert!(domains.contains("127.0.0.1:*"));
    }

    #[test]
    fn test_secret_resolution() {
        let secrets = SecretResolver::new(|n| (n == "API_KEY").then(|| "k-123".to_string())).unwrap();
        let mut missing = Vec::new();
        let out = secrets.resolve("${{ secrets.API_KEY }}/${OTHER}/${OTHER}", &mut missing);
        assert_eq!(out, "k-123/${OTHER}/${OTHER}");
        assert_eq!(missing, ["OTHER"]);
    }

    #[test]
    fn test_no_frontmatter_means_no_servers() {
        assert!(parse_workflow("# just markdown", &no_secrets()).unwrap().is_empty());
        assert!(parse_workflow("---\n---\nbody", &no_secrets()).unwrap().is_empty());
    }
}
