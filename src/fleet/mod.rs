//! Fleet membership and cross-server consistency checks.

use crate::config::FleetConfig;
use crate::transport::{count_command, list_suffix_command, Transport, TransportError};
use crate::utils::MODEL_SUFFIXES;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Could not parse file count from {server}: {output:?}")]
    BadCount { server: String, output: String },

    #[error("Failed to write model list {path}: {source}")]
    WriteList {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No reachable server produced a model list")]
    NoModelList,
}

/// Parse a server list file: one `user@host` per line, `#` comments and
/// blank lines skipped, anything after a `|` ignored.
#[must_use]
pub fn parse_server_list(content: &str) -> Vec<String> {
    let mut servers = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let entry = line.split('|').next().unwrap_or(line).trim();
        if entry.contains('@') {
            servers.push(entry.to_string());
        } else {
            warn!(
                "Server list line {}: expected user@host, got {line:?}",
                line_no + 1
            );
        }
    }
    servers
}

/// Model counts for one server, one entry per recognized suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCounts {
    pub server: String,
    pub counts: BTreeMap<String, u64>,
}

/// Outcome of a fleet count verification.
#[derive(Debug, Default)]
pub struct CountReport {
    /// Servers that answered, in the order they were checked.
    pub servers: Vec<ServerCounts>,
    /// Servers that could not be checked, with the reason.
    pub errors: Vec<(String, String)>,
    /// Whether every reachable server reported identical counts.
    pub consistent: bool,
}

/// Whether every server reports the same count for every suffix.
/// An empty set is not consistent: there is nothing to agree on.
#[must_use]
pub fn counts_consistent(servers: &[ServerCounts]) -> bool {
    let Some(first) = servers.first() else {
        return false;
    };
    servers.iter().all(|s| s.counts == first.counts)
}

/// Group servers by their count for one suffix, highest count first.
/// Used to render which servers disagree and by how much.
#[must_use]
pub fn group_by_count(servers: &[ServerCounts], suffix: &str) -> Vec<(u64, Vec<String>)> {
    let mut groups: BTreeMap<u64, Vec<String>> = BTreeMap::new();
    for server in servers {
        let count = server.counts.get(suffix).copied().unwrap_or(0);
        groups.entry(count).or_default().push(server.server.clone());
    }
    groups.into_iter().rev().collect()
}

/// Count model files per suffix on every fleet server and check agreement.
///
/// Connection failures do not abort the rest of the fleet; they land in
/// `errors` and make the overall run non-successful.
pub async fn verify_counts(config: &FleetConfig) -> Result<CountReport, FleetError> {
    let servers = config.resolve_servers()?;
    let transport = config.transport();
    let models_path = &config.fleet.models_path;

    let mut report = CountReport::default();
    for server in servers {
        match count_on_server(&transport, &server, models_path).await {
            Ok(counts) => report.servers.push(ServerCounts { server, counts }),
            Err(e) => {
                warn!("Count failed on {server}: {e}");
                report.errors.push((server, e.to_string()));
            }
        }
    }
    report.consistent = counts_consistent(&report.servers);
    Ok(report)
}

async fn count_on_server(
    transport: &Transport,
    server: &str,
    models_path: &str,
) -> Result<BTreeMap<String, u64>, FleetError> {
    let mut counts = BTreeMap::new();
    for suffix in MODEL_SUFFIXES {
        let output = transport
            .ssh(server, &count_command(models_path, suffix))
            .await?;
        let count = output.trim().parse::<u64>().map_err(|_| FleetError::BadCount {
            server: server.to_string(),
            output: output.trim().to_string(),
        })?;
        counts.insert((*suffix).to_string(), count);
    }
    Ok(counts)
}

/// Fetch the sorted `.ckpt` model list from the first reachable server and
/// write it to `dest`, one name per line. Returns how many names were
/// written.
pub async fn export_model_list(config: &FleetConfig, dest: &Path) -> Result<usize, FleetError> {
    let servers = config.resolve_servers()?;
    let transport = config.transport();

    for server in &servers {
        match fetch_model_list(&transport, server, &config.fleet.models_path).await {
            Ok(models) => {
                let mut content = models.join("\n");
                content.push('\n');
                tokio::fs::write(dest, content)
                    .await
                    .map_err(|e| FleetError::WriteList {
                        path: dest.display().to_string(),
                        source: e,
                    })?;
                return Ok(models.len());
            }
            Err(e) => warn!("Could not fetch model list from {server}: {e}"),
        }
    }
    Err(FleetError::NoModelList)
}

async fn fetch_model_list(
    transport: &Transport,
    server: &str,
    models_path: &str,
) -> Result<Vec<String>, TransportError> {
    let output = transport
        .ssh(server, &list_suffix_command(models_path, ".ckpt"))
        .await?;
    let mut models: Vec<String> = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    models.sort();
    Ok(models)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(server: &str, ckpt: u64, tensordata: u64) -> ServerCounts {
        let mut map = BTreeMap::new();
        map.insert(".ckpt".to_string(), ckpt);
        map.insert(".ckpt-tensordata".to_string(), tensordata);
        ServerCounts {
            server: server.to_string(),
            counts: map,
        }
    }

    #[test]
    fn test_parse_server_list_skips_comments_and_blanks() {
        let content = "# fleet\n\nroot@gpu-01\n  root@gpu-02  \n";
        assert_eq!(
            parse_server_list(content),
            vec!["root@gpu-01", "root@gpu-02"]
        );
    }

    #[test]
    fn test_parse_server_list_strips_pipe_annotations() {
        let content = "root@gpu-01|root@nas-override\n";
        assert_eq!(parse_server_list(content), vec!["root@gpu-01"]);
    }

    #[test]
    fn test_parse_server_list_rejects_bare_hostnames() {
        let content = "gpu-01\nroot@gpu-02\n";
        assert_eq!(parse_server_list(content), vec!["root@gpu-02"]);
    }

    #[test]
    fn test_counts_consistent() {
        assert!(counts_consistent(&[
            counts("a", 10, 12),
            counts("b", 10, 12)
        ]));
        assert!(!counts_consistent(&[
            counts("a", 10, 12),
            counts("b", 10, 11)
        ]));
        assert!(!counts_consistent(&[]));
    }

    #[test]
    fn test_group_by_count_orders_highest_first() {
        let servers = [counts("a", 10, 0), counts("b", 8, 0), counts("c", 10, 0)];
        let groups = group_by_count(&servers, ".ckpt");
        assert_eq!(
            groups,
            vec![
                (10, vec!["a".to_string(), "c".to_string()]),
                (8, vec!["b".to_string()]),
            ]
        );
    }
}
