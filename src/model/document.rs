//! The deployable proxy configuration document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration document consumed by the proxy binary.
///
/// Rule order is match priority: the first matching rule wins, so merges
/// always place prepended rules ahead of the rules already present.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ConfigDocument {
    pub mixed_port: u16,
    pub allow_lan: bool,
    pub bind_address: String,
    pub mode: String,
    pub log_level: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub external_controller: String,
    pub dns: DnsConfig,
    pub proxies: Vec<Proxy>,
    pub proxy_groups: Vec<ProxyGroup>,
    pub rules: Vec<String>,
    pub rule_providers: BTreeMap<String, RuleProvider>,
}

impl ConfigDocument {
    /// Parse a document from YAML text.
    pub fn from_yaml(input: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(input)
    }

    /// Render the document as YAML text.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Names of all proxies, in document order.
    pub fn proxy_names(&self) -> Vec<String> {
        self.proxies.iter().map(|p| p.name.clone()).collect()
    }

    /// Insert `rules` ahead of every rule already present.
    pub fn prepend_rules(&mut self, rules: &[String]) {
        if rules.is_empty() {
            return;
        }
        let mut merged = Vec::with_capacity(rules.len() + self.rules.len());
        merged.extend_from_slice(rules);
        merged.append(&mut self.rules);
        self.rules = merged;
    }
}

/// DNS sub-block.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DnsConfig {
    pub enable: bool,
    pub ipv6: bool,
    pub default_nameserver: Vec<String>,
    pub nameserver: Vec<String>,
    pub fallback: Vec<String>,
    pub fallback_filter: FallbackFilter,
    pub enhanced_mode: String,
    pub fake_ip_range: String,
    pub fake_ip_filter: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FallbackFilter {
    pub geoip: bool,
    pub geoip_code: String,
    pub ipcidr: Vec<String>,
}

/// A single proxy entry.
///
/// Only the name and port are interpreted; the protocol-specific fields
/// (server, cipher, password, transport options...) live in `extra` and are
/// written back exactly as they were read.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Proxy {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "is_zero_port")]
    pub port: u16,

    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

fn is_zero_port(port: &u16) -> bool {
    *port == 0
}

/// A named selection group over proxies.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyGroup {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub proxies: Vec<String>,
}

/// A remote or local rule set referenced from rules.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RuleProvider {
    #[serde(rename = "type")]
    pub kind: String,
    pub behavior: String,
    pub format: String,
    pub path: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<BTreeMap<String, Vec<String>>>,
}
