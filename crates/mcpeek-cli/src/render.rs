//! Text and JSON rendering of inspection reports and registry lookups.

use mcpeek_core::{
    CapabilityKind, CapabilitySet, ConnectionFailure, FailureKind, InspectionReport, ReportEntry,
    TransportDescriptor,
};
use mcpeek_mcp::{InspectFilter, RegistryServer, WorkflowSummary};
use std::fmt::Write;

const DESCRIPTION_WIDTH: usize = 60;

pub fn report(report: &InspectionReport, filter: &InspectFilter, json: bool) -> anyhow::Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(report)?);
    }

    let mut out = String::new();
    if report.entries.is_empty() {
        match &filter.server {
            Some(server) => writeln!(out, "No MCP servers matching '{server}'")?,
            None => writeln!(out, "No MCP servers declared")?,
        }
        return Ok(out);
    }

    for entry in &report.entries {
        write_entry(&mut out, entry, filter)?;
        writeln!(out)?;
    }
    writeln!(
        out,
        "{} server(s): {} connected, {} failed",
        report.entries.len(),
        report.connected(),
        report.failed()
    )?;
    Ok(out)
}

fn write_entry(out: &mut String, entry: &ReportEntry, filter: &InspectFilter) -> std::fmt::Result {
    let d = &entry.descriptor;
    write!(out, "{} [{}] {}", d.name, d.kind_label(), d.target())?;
    match entry.capabilities().and_then(|c| c.server_info.as_deref()) {
        Some(info) => writeln!(out, "  ({info}, {} ms)", entry.elapsed_ms)?,
        None => writeln!(out, "  ({} ms)", entry.elapsed_ms)?,
    }
    if !d.missing_secrets.is_empty() {
        writeln!(out, "  missing secrets: {}", d.missing_secrets.join(", "))?;
    }

    if let Some(failure) = entry.failure() {
        return writeln!(out, "  {}", failure_line(failure));
    }
    let Some(caps) = entry.capabilities() else {
        return Ok(());
    };
    match &filter.tool {
        Some(tool) => write_tool_detail(out, d, caps, tool),
        None => write_capabilities(out, d, caps),
    }
}

fn failure_line(failure: &ConnectionFailure) -> String {
    let what = match failure.kind {
        FailureKind::Exhausted => "unreachable",
        FailureKind::Permanent => "connection failed",
        FailureKind::Cancelled => "cancelled",
        FailureKind::DeadlineExceeded => "timed out",
        FailureKind::Aborted => "aborted",
    };
    match failure.attempts {
        0 => format!("{what}: {}", failure.message),
        1 => format!("{what} after 1 attempt: {}", failure.message),
        n => format!("{what} after {n} attempts: {}", failure.message),
    }
}

fn write_capabilities(out: &mut String, d: &TransportDescriptor, caps: &CapabilitySet) -> std::fmt::Result {
    match caps.error(CapabilityKind::Tools) {
        Some(err) => writeln!(out, "  tools: listing failed: {err}")?,
        None => {
            writeln!(out, "  tools ({}):", caps.tools.len())?;
            let width = caps.tools.iter().map(|t| t.name.len()).max().unwrap_or(0);
            for tool in &caps.tools {
                let marker = if d.is_tool_allowed(&tool.name) { ' ' } else { '-' };
                let desc = tool.description.as_deref().map(first_line).unwrap_or_default();
                writeln!(out, "   {marker}{:<width$}  {desc}", tool.name)?;
            }
        }
    }
    match caps.error(CapabilityKind::Resources) {
        Some(err) => writeln!(out, "  resources: listing failed: {err}")?,
        None if caps.resources.is_empty() => {}
        None => {
            writeln!(out, "  resources ({}):", caps.resources.len())?;
            for r in &caps.resources {
                writeln!(out, "    {}  {}", r.uri, r.name)?;
            }
        }
    }
    match caps.error(CapabilityKind::Roots) {
        Some(err) => writeln!(out, "  roots: listing failed: {err}"),
        None if caps.roots.is_empty() => Ok(()),
        None => {
            let uris: Vec<_> = caps.roots.iter().map(|r| r.uri.as_str()).collect();
            writeln!(out, "  roots: {}", uris.join(", "))
        }
    }
}

fn write_tool_detail(
    out: &mut String,
    d: &TransportDescriptor,
    caps: &CapabilitySet,
    name: &str,
) -> std::fmt::Result {
    let Some(tool) = caps.tool(name) else {
        let names: Vec<_> = caps.tools.iter().map(|t| t.name.as_str()).collect();
        writeln!(out, "  tool '{name}' not found on '{}'", d.name)?;
        if names.is_empty() {
            return writeln!(out, "  the server lists no tools");
        }
        return writeln!(out, "  available tools: {}", names.join(", "));
    };

    writeln!(out, "  tool: {}", tool.name)?;
    let allowed = if d.is_tool_allowed(&tool.name) { "yes" } else { "no" };
    writeln!(out, "  allowed: {allowed}")?;
    if let Some(desc) = &tool.description {
        writeln!(out, "  description: {desc}")?;
    }
    let schema = serde_json::to_string_pretty(&tool.input_schema).map_err(|_| std::fmt::Error)?;
    writeln!(out, "  input schema:")?;
    for line in schema.lines() {
        writeln!(out, "    {line}")?;
    }
    Ok(())
}

fn first_line(s: &str) -> String {
    let line = s.lines().next().unwrap_or_default().trim();
    match line.char_indices().nth(DESCRIPTION_WIDTH) {
        Some((idx, _)) => format!("{}...", &line[..idx]),
        None => line.to_string(),
    }
}

pub fn workflows(dir: &std::path::Path, found: &[WorkflowSummary]) -> String {
    if found.is_empty() {
        return format!("No workflows with MCP servers in {}\n", dir.display());
    }
    let mut out = format!("Workflows with MCP servers in {}:\n", dir.display());
    for wf in found {
        out.push_str(&format!("  {}: {}\n", wf.name, wf.servers.join(", ")));
    }
    out.push_str("\nRun `mcpeek inspect <workflow>` to inspect one.\n");
    out
}

pub fn registry(servers: &[RegistryServer], json: bool) -> anyhow::Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(servers)?);
    }
    if servers.is_empty() {
        return Ok("No matching servers in the registry\n".to_string());
    }
    let mut out = String::new();
    for s in servers {
        writeln!(out, "{} {}", s.name, s.version)?;
        if !s.description.is_empty() {
            writeln!(out, "  {}", first_line(&s.description))?;
        }
        writeln!(out, "  [{}] {}", s.descriptor.kind_label(), s.descriptor.target())?;
        let env: Vec<_> = s.descriptor.env.keys().map(String::as_str).collect();
        if !env.is_empty() {
            writeln!(out, "  env: {}", env.join(", "))?;
        }
        if let Some(repo) = &s.repository {
            writeln!(out, "  repository: {repo}")?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpeek_core::{InspectionOutcome, ToolDescriptor};

    fn report_with(entries: Vec<ReportEntry>) -> InspectionReport {
        InspectionReport {
            started_at: "2026-01-01T00:00:00Z".parse().unwrap(),
            entries,
        }
    }

    fn github_entry() -> ReportEntry {
        let mut caps = CapabilitySet {
            server_info: Some("github-mcp-server 0.26.3".into()),
            ..CapabilitySet::default()
        };
        caps.tools = vec![
            ToolDescriptor {
                name: "get_issue".into(),
                description: Some("Get an issue\nwith details".into()),
                input_schema: serde_json::json!({"type": "object", "properties": {"number": {"type": "integer"}}}),
            },
            ToolDescriptor {
                name: "create_issue".into(),
                description: None,
                input_schema: serde_json::json!({"type": "object"}),
            },
        ];
        caps.record_error(CapabilityKind::Roots, "MCP error -32601: Method not found");
        ReportEntry {
            descriptor: TransportDescriptor::container("github", "ghcr.io/github/github-mcp-server", Vec::<String>::new())
                .with_allowed(["get_issue"]),
            outcome: InspectionOutcome::Capabilities(caps),
            elapsed_ms: 42,
        }
    }

    fn failed_entry() -> ReportEntry {
        ReportEntry {
            descriptor: TransportDescriptor::stdio("local", "mcp-local", Vec::<String>::new()),
            outcome: InspectionOutcome::ConnectionFailed(ConnectionFailure {
                kind: FailureKind::Exhausted,
                attempts: 3,
                message: "connection refused".into(),
            }),
            elapsed_ms: 3000,
        }
    }

    #[test]
    fn test_text_report_lists_servers_in_order() {
        let r = report_with(vec![github_entry(), failed_entry()]);
        let text = report(&r, &InspectFilter::default(), false).unwrap();

        let gh = text.find("github [container]").unwrap();
        let local = text.find("local [stdio]").unwrap();
        assert!(gh < local);
        assert!(text.contains("github-mcp-server 0.26.3"));
        assert!(text.contains("tools (2):"));
        assert!(text.contains("Get an issue"));
        assert!(!text.contains("with details"));
        assert!(text.contains("-create_issue"));
        assert!(text.contains("roots: listing failed"));
        assert!(text.contains("unreachable after 3 attempts: connection refused"));
        assert!(text.contains("2 server(s): 1 connected, 1 failed"));
    }

    #[test]
    fn test_tool_detail_and_missing_tool() {
        let r = report_with(vec![github_entry()]);
        let filter = InspectFilter {
            server: Some("github".into()),
            tool: Some("get_issue".into()),
        };
        let text = report(&r, &filter, false).unwrap();
        assert!(text.contains("tool: get_issue"));
        assert!(text.contains("allowed: yes"));
        assert!(text.contains("\"number\""));

        let filter = InspectFilter {
            server: Some("github".into()),
            tool: Some("delete_repo".into()),
        };
        let text = report(&r, &filter, false).unwrap();
        assert!(text.contains("tool 'delete_repo' not found"));
        assert!(text.contains("available tools: get_issue, create_issue"));
    }

    #[test]
    fn test_empty_report_mentions_filter() {
        let r = report_with(vec![]);
        let filter = InspectFilter {
            server: Some("nothing".into()),
            tool: None,
        };
        let text = report(&r, &filter, false).unwrap();
        assert_eq!(text, "No MCP servers matching 'nothing'\n");
    }

    #[test]
    fn test_json_report_is_tagged() {
        let r = report_with(vec![failed_entry()]);
        let json = report(&r, &InspectFilter::default(), true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let outcome = &value["entries"][0]["outcome"];
        assert_eq!(outcome["status"], "connection_failed");
        assert_eq!(outcome["kind"], "exhausted");
        assert_eq!(outcome["attempts"], 3);
    }
}
