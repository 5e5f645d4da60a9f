//! Configuration for the mock server.
//!
//! Expectations are loaded at startup from a JSON or YAML file and/or an
//! inline JSON string. A source is either a bare list of expectations or a
//! document with `expectations` and `settings` keys.

use crate::expectation::Expectation;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Sample expectations file printed by `--print-config`.
pub const SAMPLE_CONFIG: &str = include_str!("../demos/expectations.yaml");

/// Main configuration for the mock server.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockServerConfig {
    /// Expectations registered at startup, in order
    #[serde(default)]
    pub expectations: Vec<Expectation>,

    /// Global settings
    #[serde(default)]
    pub settings: ServerSettings,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigDocument {
    List(Vec<Expectation>),
    Full(MockServerConfig),
}

impl From<ConfigDocument> for MockServerConfig {
    fn from(doc: ConfigDocument) -> Self {
        match doc {
            ConfigDocument::List(expectations) => Self {
                expectations,
                ..Default::default()
            },
            ConfigDocument::Full(config) => config,
        }
    }
}

impl MockServerConfig {
    /// Load configuration from a `.json`, `.yaml` or `.yml` file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading expectations file {}: {}", path.display(), e))?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        let doc: ConfigDocument = match extension.as_deref() {
            Some("yaml" | "yml") => serde_yaml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            _ => anyhow::bail!(
                "unsupported expectations file extension: {} (expected .json, .yaml or .yml)",
                path.display()
            ),
        };

        Ok(doc.into())
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(data: &str) -> anyhow::Result<Self> {
        let doc: ConfigDocument = serde_json::from_str(data)?;
        Ok(doc.into())
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(data: &str) -> anyhow::Result<Self> {
        let doc: ConfigDocument = serde_yaml::from_str(data)?;
        Ok(doc.into())
    }

    /// Append the expectations of another source after this one's.
    pub fn merge(&mut self, other: MockServerConfig) {
        self.expectations.extend(other.expectations);
    }

    /// Validate the configuration by compiling every expectation.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (i, expectation) in self.expectations.iter().enumerate() {
            expectation
                .clone()
                .compile()
                .map_err(|e| anyhow::anyhow!("Expectation {}: {}", i, e))?;
        }
        Ok(())
    }
}

/// Parse a listen address such as `:8081` or `127.0.0.1:9000`.
///
/// A missing host binds all interfaces.
pub fn parse_listen_addr(addr: &str) -> anyhow::Result<SocketAddr> {
    let addr = addr.trim();
    let full = match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => addr.to_string(),
    };
    full.parse()
        .map_err(|e| anyhow::anyhow!("invalid listen address {addr:?}: {e}"))
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    /// Log all matched requests
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log unmatched requests
    #[serde(default = "default_true")]
    pub log_unmatched: bool,

    /// Maximum history items kept (0 = unbounded)
    #[serde(default)]
    pub history_limit: usize,
}

fn default_true() -> bool {
    true
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            log_matches: true,
            log_unmatched: true,
            history_limit: 0,
        }
    }
}
