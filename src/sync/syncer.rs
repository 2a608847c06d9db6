//! One-shot fetch, merge and persist cycle.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::{self, StreamExt};
use url::Url;

use crate::config::{Addition, ClientConfig, ConfigOverrides};
use crate::model::{ConfigDocument, ProxyGroup};
use crate::observability::metrics;
use crate::subscription::fetch::{build_client, fetch_document};
use crate::sync::{apply_overrides, SyncError};

/// Error returned by a reload hook.
pub type ReloadError = Box<dyn std::error::Error + Send + Sync>;

type ReloadHook = Arc<dyn Fn() -> BoxFuture<'static, Result<(), ReloadError>> + Send + Sync>;

const ADDITION_CONCURRENCY: usize = 3;

/// Produces the local configuration document from the upstream server.
pub struct Syncer {
    server_url: String,
    token: String,
    config_path: PathBuf,
    additions: Vec<Addition>,
    prepend_rules: Vec<String>,
    overrides: ConfigOverrides,
    client: reqwest::Client,
    reload: Option<ReloadHook>,
}

impl Syncer {
    pub fn new(config: &ClientConfig) -> Result<Self, SyncError> {
        let client = build_client(Duration::from_secs(config.fetch_timeout_secs))
            .map_err(SyncError::Client)?;
        Ok(Self {
            server_url: config.server_url.clone(),
            token: config.token.clone(),
            config_path: PathBuf::from(&config.config_path),
            additions: config.additions.clone(),
            prepend_rules: config.prepend_rules.clone(),
            overrides: config.overrides.clone(),
            client,
            reload: None,
        })
    }

    /// Install the callback invoked after every successful write.
    pub fn set_reload_hook<F, Fut>(&mut self, hook: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ReloadError>> + Send + 'static,
    {
        self.reload = Some(Arc::new(move || Box::pin(hook())));
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// `<server_url>/sub?token=<token>`.
    pub fn subscription_url(&self) -> Result<Url, SyncError> {
        let mut url = Url::parse(&self.server_url)?;
        url.set_path("/sub");
        url.query_pairs_mut()
            .clear()
            .append_pair("token", &self.token);
        Ok(url)
    }

    /// Run one full cycle.
    ///
    /// Nothing is written unless the upstream document was fetched and decoded.
    pub async fn sync(&self) -> Result<(), SyncError> {
        tracing::info!("Starting synchronization");

        let mut document = match self.fetch_upstream().await {
            Ok(document) => document,
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch upstream document");
                metrics::record_sync("upstream_failed");
                return Err(e);
            }
        };

        self.merge_additions(&mut document).await;
        document.prepend_rules(&self.prepend_rules);
        apply_overrides(&mut document, &self.overrides);

        if let Err(e) = self.save(&document).await {
            metrics::record_sync("write_failed");
            return Err(e);
        }

        if let Some(reload) = &self.reload {
            match reload().await {
                Ok(()) => tracing::info!("Reload triggered"),
                Err(e) => tracing::warn!(error = %e, "Reload failed"),
            }
        }

        metrics::record_sync("ok");
        tracing::info!(
            proxies = document.proxies.len(),
            rules = document.rules.len(),
            "Synchronization complete"
        );
        Ok(())
    }

    pub async fn fetch_upstream(&self) -> Result<ConfigDocument, SyncError> {
        let url = self.subscription_url()?;
        let fetched = fetch_document(&self.client, url.as_str())
            .await
            .map_err(SyncError::Upstream)?;
        Ok(fetched.document)
    }

    /// Append each reachable addition's proxies and group, and put its
    /// prepend rules ahead of the rules merged so far.
    pub async fn merge_additions(&self, document: &mut ConfigDocument) {
        let client = &self.client;
        let pending: Vec<_> = self
            .additions
            .iter()
            .map(|addition| async move { (addition, fetch_document(client, &addition.url).await) })
            .collect();
        let mut fetches = stream::iter(pending).buffer_unordered(ADDITION_CONCURRENCY);

        while let Some((addition, result)) = fetches.next().await {
            let fetched = match result {
                Ok(fetched) => fetched,
                Err(e) => {
                    tracing::warn!(url = %addition.url, error = %e, "Skipping addition");
                    metrics::record_addition_fetch("failed");
                    continue;
                }
            };
            metrics::record_addition_fetch("ok");

            document.proxy_groups.push(ProxyGroup {
                name: addition.group_name.clone(),
                kind: addition.group_type.clone(),
                proxies: fetched.document.proxy_names(),
            });
            document.proxies.extend(fetched.document.proxies);
            document.prepend_rules(&addition.prepend_rules);
        }
    }

    async fn save(&self, document: &ConfigDocument) -> Result<(), SyncError> {
        let write_error = |source: std::io::Error| SyncError::Write {
            path: self.config_path.clone(),
            source,
        };

        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(write_error)?;
            }
        }
        let yaml = document.to_yaml()?;
        tokio::fs::write(&self.config_path, yaml)
            .await
            .map_err(write_error)?;

        tracing::info!(path = %self.config_path.display(), "Configuration saved");
        Ok(())
    }
}
