//! Synthesis of the served configuration document.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;

use crate::config::{Addition, ServerConfig};
use crate::model::{ConfigDocument, Proxy, ProxyGroup};
use crate::observability::metrics;
use crate::ports::RingPool;
use crate::subscription::fetch::{build_client, fetch_document};
use crate::subscription::SubscriptionError;

/// How long a merged dependency set stays valid.
pub const DEPENDENCY_TTL: Duration = Duration::from_secs(5 * 60);

/// Accounting string used when no source reports usage.
pub const ZERO_USAGE: &str = "upload=0; download=0; total=0; expire=0";

const FETCH_CONCURRENCY: usize = 5;

/// Everything harvested from the configured additions in one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencySet {
    pub proxies: Vec<Proxy>,
    pub proxy_groups: Vec<ProxyGroup>,
    pub prepend_rules: Vec<String>,
    pub userinfo: String,
}

impl DependencySet {
    fn placeholder() -> Self {
        Self {
            userinfo: ZERO_USAGE.to_string(),
            ..Self::default()
        }
    }

    fn absorb(&mut self, addition: &Addition, document: ConfigDocument) {
        let group = ProxyGroup {
            name: addition.group_name.clone(),
            kind: addition.group_type.clone(),
            proxies: document.proxy_names(),
        };
        self.proxies.extend(document.proxies);
        self.proxy_groups.push(group);
        self.prepend_rules.extend_from_slice(&addition.prepend_rules);
    }
}

struct BaseEntry {
    modified: SystemTime,
    document: ConfigDocument,
}

struct DependencyEntry {
    set: Arc<DependencySet>,
    expires: Instant,
}

/// Builds the document served to subscribers.
pub struct SubscriptionService {
    base_path: PathBuf,
    additions: Vec<Addition>,
    tokens: HashSet<String>,
    client: reqwest::Client,
    pool: Option<Arc<RingPool>>,
    dependency_ttl: Duration,
    base_cache: Mutex<Option<BaseEntry>>,
    dependency_cache: Mutex<Option<DependencyEntry>>,
}

impl SubscriptionService {
    pub fn new(
        config: &ServerConfig,
        pool: Option<Arc<RingPool>>,
    ) -> Result<Self, SubscriptionError> {
        let client = build_client(Duration::from_secs(config.timeouts.fetch_secs))?;
        Ok(Self {
            base_path: PathBuf::from(&config.base_document_path),
            additions: config.additions.clone(),
            tokens: config.tokens.iter().cloned().collect(),
            client,
            pool,
            dependency_ttl: DEPENDENCY_TTL,
            base_cache: Mutex::new(None),
            dependency_cache: Mutex::new(None),
        })
    }

    /// Override the dependency cache lifetime.
    pub fn with_dependency_ttl(mut self, ttl: Duration) -> Self {
        self.dependency_ttl = ttl;
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn validate_token(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }

    /// Merged contribution of every addition, served from cache while fresh.
    ///
    /// Never fails: sources that cannot be fetched or decoded are skipped.
    pub async fn get_dependencies(&self) -> Arc<DependencySet> {
        if let Some(set) = self.cached_dependencies() {
            metrics::record_dependency_cache(true);
            return set;
        }
        metrics::record_dependency_cache(false);

        if self.additions.is_empty() {
            return Arc::new(DependencySet::placeholder());
        }

        let client = &self.client;
        let pending: Vec<_> = self
            .additions
            .iter()
            .map(|addition| async move { (addition, fetch_document(client, &addition.url).await) })
            .collect();
        let mut fetches = stream::iter(pending).buffer_unordered(FETCH_CONCURRENCY);

        let mut set = DependencySet::default();
        while let Some((addition, result)) = fetches.next().await {
            match result {
                Ok(fetched) => {
                    tracing::debug!(
                        url = %addition.url,
                        group = %addition.group_name,
                        proxies = fetched.document.proxies.len(),
                        "Fetched addition"
                    );
                    metrics::record_addition_fetch("ok");
                    if let Some(info) = fetched.userinfo {
                        if info.len() > set.userinfo.len() {
                            set.userinfo = info;
                        }
                    }
                    set.absorb(addition, fetched.document);
                }
                Err(e) => {
                    tracing::error!(url = %addition.url, error = %e, "Failed to fetch addition");
                    metrics::record_addition_fetch("failed");
                }
            }
        }
        if set.userinfo.is_empty() {
            set.userinfo = ZERO_USAGE.to_string();
        }

        let set = Arc::new(set);
        *self.dependency_cache.lock() = Some(DependencyEntry {
            set: set.clone(),
            expires: Instant::now() + self.dependency_ttl,
        });
        set
    }

    fn cached_dependencies(&self) -> Option<Arc<DependencySet>> {
        let cache = self.dependency_cache.lock();
        cache
            .as_ref()
            .filter(|entry| Instant::now() < entry.expires)
            .map(|entry| entry.set.clone())
    }

    /// A private copy of the base document, re-read only when its mtime changes.
    pub async fn base_document(&self) -> Result<ConfigDocument, SubscriptionError> {
        let metadata = tokio::fs::metadata(&self.base_path)
            .await
            .map_err(|source| SubscriptionError::Stat {
                path: self.base_path.clone(),
                source,
            })?;
        let modified = metadata.modified().map_err(|source| SubscriptionError::Stat {
            path: self.base_path.clone(),
            source,
        })?;

        if let Some(document) = self.cached_base(modified) {
            return Ok(document);
        }

        let raw = tokio::fs::read_to_string(&self.base_path)
            .await
            .map_err(|source| SubscriptionError::Read {
                path: self.base_path.clone(),
                source,
            })?;
        let document =
            ConfigDocument::from_yaml(&raw).map_err(|source| SubscriptionError::Parse {
                path: self.base_path.clone(),
                source,
            })?;
        tracing::info!(path = %self.base_path.display(), "Base document loaded");

        *self.base_cache.lock() = Some(BaseEntry {
            modified,
            document: document.clone(),
        });
        Ok(document)
    }

    fn cached_base(&self, modified: SystemTime) -> Option<ConfigDocument> {
        let cache = self.base_cache.lock();
        cache
            .as_ref()
            .filter(|entry| entry.modified == modified)
            .map(|entry| entry.document.clone())
    }

    /// Compose the document for one subscriber.
    ///
    /// Returns the document and the accounting string to report with it.
    pub async fn generate_config(&self) -> Result<(ConfigDocument, String), SubscriptionError> {
        let mut document = self.base_document().await?;

        if let Some(pool) = self.pool.as_ref().filter(|pool| !pool.is_empty()) {
            for proxy in &mut document.proxies {
                if let Some(port) = pool.draw() {
                    proxy.port = port;
                }
            }
        }

        let dependencies = self.get_dependencies().await;
        document
            .proxies
            .extend(dependencies.proxies.iter().cloned());
        document
            .proxy_groups
            .extend(dependencies.proxy_groups.iter().cloned());
        document.prepend_rules(&dependencies.prepend_rules);

        Ok((document, dependencies.userinfo.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    const BASE: &str = r#"
mixed-port: 7890
proxies:
  - name: home
    type: ss
    server: 10.0.0.1
    port: 443
    cipher: aes-128-gcm
    password: secret
rules:
  - MATCH,DIRECT
"#;

    fn write_base(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("base.yaml");
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn service(base: &Path, pool: Option<Arc<RingPool>>) -> SubscriptionService {
        let config = ServerConfig {
            base_document_path: base.to_string_lossy().into_owned(),
            tokens: vec!["alpha".to_string(), "beta".to_string()],
            ..ServerConfig::default()
        };
        SubscriptionService::new(&config, pool).unwrap()
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[test]
    fn test_validate_token() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&write_base(dir.path(), BASE), None);
        assert!(svc.validate_token("alpha"));
        assert!(svc.validate_token("beta"));
        assert!(!svc.validate_token("gamma"));
        assert!(!svc.validate_token(""));
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_generate_config_future_is_send() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&write_base(dir.path(), BASE), None);
        let generate = svc.generate_config();
        assert_send(&generate);
        let dependencies = svc.get_dependencies();
        assert_send(&dependencies);
    }

    #[tokio::test]
    async fn test_no_additions_yields_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&write_base(dir.path(), BASE), None);
        let deps = svc.get_dependencies().await;
        assert!(deps.proxies.is_empty());
        assert_eq!(deps.userinfo, ZERO_USAGE);
    }

    #[tokio::test]
    async fn test_base_reread_only_on_mtime_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_base(dir.path(), BASE);
        let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        set_mtime(&path, stamp);

        let svc = service(&path, None);
        assert_eq!(svc.base_document().await.unwrap().mixed_port, 7890);

        std::fs::write(&path, BASE.replace("7890", "7891")).unwrap();
        set_mtime(&path, stamp);
        assert_eq!(svc.base_document().await.unwrap().mixed_port, 7890);

        set_mtime(&path, stamp + Duration::from_secs(60));
        assert_eq!(svc.base_document().await.unwrap().mixed_port, 7891);
    }

    #[tokio::test]
    async fn test_caller_mutation_does_not_leak_into_cache() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&write_base(dir.path(), BASE), None);

        let mut first = svc.base_document().await.unwrap();
        first.proxies[0].port = 1;
        first.rules.clear();

        let second = svc.base_document().await.unwrap();
        assert_eq!(second.proxies[0].port, 443);
        assert_eq!(second.rules, vec!["MATCH,DIRECT"]);
    }

    #[tokio::test]
    async fn test_malformed_base_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&write_base(dir.path(), "proxies: [unterminated"), None);
        assert!(matches!(
            svc.generate_config().await,
            Err(SubscriptionError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_base_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir.path().join("absent.yaml"), None);
        assert!(matches!(
            svc.base_document().await,
            Err(SubscriptionError::Stat { .. })
        ));
    }

    #[tokio::test]
    async fn test_ports_rewritten_from_pool() {
        let dir = tempfile::tempdir().unwrap();
        let base = format!(
            "{}  - name: office\n    type: ss\n    server: 10.0.0.2\n    port: 8443\n",
            BASE.replace("rules:\n  - MATCH,DIRECT\n", "")
        );
        let pool = Arc::new(RingPool::new(3, 40000, 40010));
        for port in [40001, 40002, 40003] {
            pool.enqueue(port);
        }
        let svc = service(&write_base(dir.path(), &base), Some(pool));

        let (document, userinfo) = svc.generate_config().await.unwrap();
        assert_eq!(document.proxies.len(), 2);
        for proxy in &document.proxies {
            assert!([40002, 40003].contains(&proxy.port), "port {}", proxy.port);
        }
        assert_eq!(userinfo, ZERO_USAGE);

        let cached = svc.base_document().await.unwrap();
        assert_eq!(cached.proxies[0].port, 443);
        assert_eq!(cached.proxies[1].port, 8443);
    }

    #[tokio::test]
    async fn test_empty_pool_leaves_ports() {
        let dir = tempfile::tempdir().unwrap();
        let pool = Arc::new(RingPool::new(3, 40000, 40010));
        let svc = service(&write_base(dir.path(), BASE), Some(pool));
        let (document, _) = svc.generate_config().await.unwrap();
        assert_eq!(document.proxies[0].port, 443);
    }
}
