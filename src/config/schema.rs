//! Configuration schema definitions.
//!
//! This module defines the configuration structures for both daemons.
//! All types derive Serde traits for deserialization from TOML files.

use serde::{Deserialize, Serialize};

use crate::model::DnsConfig;

/// Root configuration for the subscription server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP bind address (e.g., "0.0.0.0:8080").
    pub listen: String,

    /// Path of the locally stored base document (YAML).
    pub base_document_path: String,

    /// Tokens accepted by the subscription endpoint.
    pub tokens: Vec<String>,

    /// Remote subscriptions merged into every generated document.
    pub additions: Vec<Addition>,

    /// Decoy port rotation settings.
    pub dynamic_port: DynamicPortConfig,

    /// Response metadata for the subscription endpoint.
    pub subscription: SubscriptionConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Logging settings.
    pub log: LogConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            base_document_path: String::new(),
            tokens: Vec::new(),
            additions: Vec::new(),
            dynamic_port: DynamicPortConfig::default(),
            subscription: SubscriptionConfig::default(),
            timeouts: TimeoutConfig::default(),
            log: LogConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// A remote subscription merged into a document.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Addition {
    /// Source URL returning a document.
    pub url: String,

    /// Name of the proxy group synthesized from this source.
    pub group_name: String,

    /// Type of the synthesized group (select, url-test, ...).
    #[serde(default = "default_group_type")]
    pub group_type: String,

    /// Rules inserted ahead of everything this source contributes to.
    #[serde(default)]
    pub prepend_rules: Vec<String>,
}

fn default_group_type() -> String {
    "select".to_string()
}

/// Dynamic decoy port configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DynamicPortConfig {
    /// Enable the rotation task.
    pub enabled: bool,

    /// Lowest port of the decoy range (inclusive).
    pub min: u16,

    /// Highest port of the decoy range (inclusive).
    pub max: u16,

    /// Number of simultaneously active decoy ports.
    pub active_count: usize,

    /// Local port every decoy port redirects to.
    pub target_port: u16,

    /// Rotation schedule expression.
    pub cycle: String,

    /// Name of the dedicated NAT chain.
    pub chain_name: String,
}

impl Default for DynamicPortConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min: 30000,
            max: 40000,
            active_count: 10,
            target_port: 443,
            cycle: "@every 1m".to_string(),
            chain_name: "dynamic-port-redir".to_string(),
        }
    }
}

/// Headers advertised alongside a generated document.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Suggested download file name.
    pub filename: String,

    /// Suggested client refresh interval in hours.
    pub update_interval: u32,

    /// Profile web page advertised to clients.
    pub profile_url: String,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            filename: "config.yaml".to_string(),
            update_interval: 18,
            profile_url: String::new(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout for the HTTP surface in seconds.
    pub request_secs: u64,

    /// Timeout for each addition fetch in seconds.
    pub fetch_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            fetch_secs: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Output format.
    pub format: LogFormat,

    /// Append-mode log file. Stdout when absent.
    pub path: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            path: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Root configuration for the sync client.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the subscription server.
    pub server_url: String,

    /// Token presented to the subscription server.
    pub token: String,

    /// Where the synthesized document is written.
    pub config_path: String,

    /// Minutes between syncs in daemon mode.
    pub update_interval: u64,

    /// Timeout for every remote fetch in seconds.
    pub fetch_timeout_secs: u64,

    /// Locally configured remote subscriptions.
    pub additions: Vec<Addition>,

    /// Rules placed ahead of everything else.
    pub prepend_rules: Vec<String>,

    /// Field-level overrides applied after merging.
    pub overrides: ConfigOverrides,

    /// Supervised proxy binary.
    pub process: ProcessConfig,

    /// Logging settings.
    pub log: LogConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            token: String::new(),
            config_path: "config.yaml".to_string(),
            update_interval: 15,
            fetch_timeout_secs: 30,
            additions: Vec::new(),
            prepend_rules: Vec::new(),
            overrides: ConfigOverrides::default(),
            process: ProcessConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Resolve settings that depend on other settings.
    ///
    /// The proxy binary reads `config.yaml` from its working directory, so a
    /// supervised setup always writes there.
    pub fn normalize(&mut self) {
        if self.process.enabled {
            self.config_path = std::path::Path::new(&self.process.work_dir)
                .join("config.yaml")
                .to_string_lossy()
                .into_owned();
            if self.process.args.is_empty() {
                self.process.args = vec!["-d".to_string(), self.process.work_dir.clone()];
            }
        }
    }
}

/// Overrides for scalar fields and the DNS block.
///
/// `None` leaves the merged value untouched; `Some` replaces it, even when
/// the replacement is zero or empty.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ConfigOverrides {
    pub mixed_port: Option<u16>,
    pub allow_lan: Option<bool>,
    pub bind_address: Option<String>,
    pub mode: Option<String>,
    pub log_level: Option<String>,
    pub external_controller: Option<String>,
    /// Replaces the whole DNS block.
    pub dns: Option<DnsConfig>,
}

/// Supervised proxy binary configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Launch and supervise the binary.
    pub enabled: bool,

    /// Path of the binary.
    pub bin_path: String,

    /// Working directory of the binary.
    pub work_dir: String,

    /// Append-mode file receiving the binary's output.
    pub log_path: String,

    /// Command line arguments.
    pub args: Vec<String>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bin_path: "./mihomo".to_string(),
            work_dir: "./".to_string(),
            log_path: "mihomo.log".to_string(),
            args: Vec::new(),
        }
    }
}
