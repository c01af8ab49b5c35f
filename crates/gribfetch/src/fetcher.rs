//! The acquisition facade.
//!
//! A [`Fetcher`] owns the HTTP client, the template registry, and a
//! process-local cache of parsed inventories keyed by request identity.
//! It exposes the core operations: `resolve`, `inventory`,
//! `local_path`, and `download`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::AppConfig;
use crate::error::{FetchError, Result};
use crate::inventory::Inventory;
use crate::models::{Evaluated, IdxDialect, Registry};
use crate::paths;
use crate::probe::Prober;
use crate::request::Request;
use crate::resolver::{self, Location, Resolved};
use crate::subset::{self, HttpRangeSource, LocalRangeSource, RangeSource};
use crate::wgrib2;

/// What to do when a request cannot be satisfied: raise the error or
/// downgrade `Unresolvable`/`NoIndex` to a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    Warn,
    Raise,
}

/// GRIB2 acquisition engine.
pub struct Fetcher {
    client: Client,
    registry: Registry,
    config: AppConfig,
    wgrib2: Option<PathBuf>,
    inventories: Mutex<HashMap<String, Arc<Inventory>>>,
}

impl Fetcher {
    /// Fetcher with built-in templates and default settings.
    pub fn new() -> Result<Self> {
        Self::with_config(AppConfig::default())
    }

    /// Fetcher configured from a loaded [`AppConfig`].
    pub fn with_config(config: AppConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(4)
            .build()?;

        let registry = match &config.template_dir {
            Some(dir) => Registry::with_extension_dir(dir),
            None => Registry::new(),
        };

        let wgrib2 = wgrib2::find_wgrib2();
        if wgrib2.is_none() {
            debug!("wgrib2 not found on PATH; local index synthesis disabled");
        }

        Ok(Fetcher {
            client,
            registry,
            config,
            wgrib2,
            inventories: Mutex::new(HashMap::new()),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// A request builder seeded with this fetcher's config defaults.
    pub fn request(&self, model: impl Into<String>) -> crate::request::RequestBuilder {
        crate::request::RequestBuilder::from_config(model, &self.config)
    }

    fn prober(&self) -> Prober {
        Prober::new(self.client.clone(), self.config.head_timeout())
    }

    /// Evaluate the model template for a request.
    pub fn evaluate(&self, req: &Request) -> Result<Evaluated> {
        self.registry.evaluate(req)
    }

    /// Single-URL existence probe.
    pub async fn probe(&self, url: &str) -> bool {
        self.prober().exists(url).await
    }

    /// Resolve the GRIB file and index across the archive sources.
    /// Errors with `Unresolvable` only when neither is found anywhere.
    #[instrument(skip_all, fields(model = %req.model, lead = req.lead))]
    pub async fn resolve(&self, req: &Request) -> Result<Resolved> {
        let eval = self.evaluate(req)?;
        let resolved = resolver::resolve(&self.prober(), &eval).await;
        if resolved.is_unresolved() {
            return Err(self.unresolvable(&eval));
        }
        info!(
            grib = ?resolved.grib_source,
            idx = ?resolved.idx_source,
            "Resolved {}",
            eval.request.ident()
        );
        Ok(resolved)
    }

    /// Expected local path of the full file. Pure: no I/O beyond an
    /// existence check for template-declared local sources.
    pub fn local_path(&self, req: &Request) -> Result<PathBuf> {
        let eval = self.evaluate(req)?;
        Ok(paths::local_file_path(&eval))
    }

    /// Local path for a subset selection. Needs the inventory to learn
    /// which message numbers the selector picks.
    pub async fn local_subset_path(&self, req: &Request, selector: Option<&str>) -> Result<PathBuf> {
        match normalize_selector(selector) {
            None => self.local_path(req),
            Some(_) => {
                let eval = self.evaluate(req)?;
                let filtered = self.inventory(req, selector).await?;
                Ok(paths::local_subset_path(&eval, &filtered.messages()))
            }
        }
    }

    /// Load (and memoize) the inventory, optionally filtered.
    #[instrument(skip_all, fields(model = %req.model, lead = req.lead))]
    pub async fn inventory(&self, req: &Request, selector: Option<&str>) -> Result<Inventory> {
        let eval = self.evaluate(req)?;

        let key = eval.request.cache_key();
        if let Some(cached) = self.inventories.lock().await.get(&key).cloned() {
            return cached.filter(normalize_selector(selector));
        }

        let resolved = resolver::resolve(&self.prober(), &eval).await;
        let inventory = Arc::new(self.load_inventory(&eval, &resolved).await?);
        self.inventories
            .lock()
            .await
            .insert(key, inventory.clone());
        inventory.filter(normalize_selector(selector))
    }

    /// Fetch, parse, and write through the index file for a resolved
    /// request.
    async fn load_inventory(&self, eval: &Evaluated, resolved: &Resolved) -> Result<Inventory> {
        let (text, dialect) = match &resolved.idx {
            Some(Location::Local(path)) => {
                debug!(path = %path.display(), "Reading local index");
                (
                    tokio::fs::read_to_string(path).await?,
                    eval.template.idx_dialect,
                )
            }
            Some(Location::Remote(url)) => {
                debug!(url = %url, "Downloading index");
                let text = self
                    .client
                    .get(url)
                    .timeout(self.config.get_timeout())
                    .send()
                    .await?
                    .error_for_status()?
                    .text()
                    .await?;
                self.write_through_index(eval, url, &text).await;
                (text, eval.template.idx_dialect)
            }
            None => {
                // Generation fallback: synthesize the inventory from a
                // local GRIB with wgrib2, when both are available.
                let local = paths::local_file_path(eval);
                match (&self.wgrib2, local.exists()) {
                    (Some(exe), true) => {
                        info!(path = %local.display(), "Generating missing index with wgrib2");
                        (wgrib2::make_inventory(exe, &local).await?, IdxDialect::Wgrib2)
                    }
                    (None, true) => {
                        warn!("Install wgrib2 to synthesize inventories for local GRIB files");
                        return Err(self.no_index(eval));
                    }
                    _ => return Err(self.no_index(eval)),
                }
            }
        };

        Inventory::parse(&text, dialect, eval.request.lead)
    }

    /// Persist a freshly fetched remote index next to the local GRIB so
    /// later runs skip the HTTP round-trip. Failures only warn.
    async fn write_through_index(&self, eval: &Evaluated, url: &str, text: &str) {
        let name = url
            .split('?')
            .next()
            .unwrap_or(url)
            .rsplit('/')
            .next()
            .unwrap_or("index");
        let local = paths::local_file_path(eval);
        let dest = paths::local_index_path(&local, name);
        let result = async {
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&dest, text).await
        }
        .await;
        match result {
            Ok(()) => debug!(path = %dest.display(), "Cached index file"),
            Err(e) => warn!(path = %dest.display(), error = %e, "Cannot cache index file"),
        }
    }

    /// Download the full file or a regex-selected subset, raising on
    /// any failure.
    pub async fn download(&self, req: &Request, selector: Option<&str>) -> Result<PathBuf> {
        match self
            .download_with_policy(req, selector, ErrorPolicy::Raise)
            .await?
        {
            Some(path) => Ok(path),
            // Raise policy only yields None for an empty selection.
            None => {
                let eval = self.evaluate(req)?;
                Err(FetchError::InvalidRequest(format!(
                    "selection matched no messages for {}",
                    eval.request.ident()
                )))
            }
        }
    }

    /// Download with an explicit error policy. Under
    /// `ErrorPolicy::Warn`, `Unresolvable` and `NoIndex` log a warning
    /// and yield `Ok(None)` instead of failing.
    #[instrument(skip_all, fields(model = %req.model, lead = req.lead))]
    pub async fn download_with_policy(
        &self,
        req: &Request,
        selector: Option<&str>,
        policy: ErrorPolicy,
    ) -> Result<Option<PathBuf>> {
        let eval = self.evaluate(req)?;
        let selector = normalize_selector(selector);

        // Full-file path: no selector means no index is needed.
        let Some(selector) = selector else {
            return self.download_full_file(&eval, policy).await;
        };

        let resolved = resolver::resolve(&self.prober(), &eval).await;
        if resolved.grib.is_none() {
            return self.handle(self.unresolvable(&eval), policy);
        }

        let filtered = match self.inventory(&eval.request, Some(selector)).await {
            Ok(filtered) => filtered,
            Err(e @ FetchError::NoIndex { .. }) => {
                // Cannot subset without an index; fall back to the
                // whole file.
                warn!("{e}; downloading the full file instead");
                return self.download_full_file(&eval, policy).await;
            }
            Err(e) => return Err(e),
        };

        if filtered.is_empty() {
            warn!(
                "Selection matched no messages for {}; nothing to download",
                eval.request.ident()
            );
            return Ok(None);
        }

        let dest = paths::local_subset_path(&eval, &filtered.messages());
        if dest.exists() && !eval.request.overwrite {
            info!(path = %dest.display(), "Already have local subset");
            return Ok(Some(dest));
        }

        let mut groups = subset::coalesce(&filtered.records);

        let source: Box<dyn RangeSource> = match resolved.grib.as_ref() {
            Some(Location::Local(path)) => Box::new(LocalRangeSource::new(path)),
            Some(Location::Remote(url)) => Box::new(HttpRangeSource::new(
                self.client.clone(),
                url,
                self.config.get_timeout(),
            )),
            None => return self.handle(self.unresolvable(&eval), policy),
        };

        // Materialize open-ended ranges when the total length is
        // knowable; some servers reject `bytes=N-`.
        if groups.iter().any(|g| g.end_byte.is_none()) {
            if let Ok(Some(total)) = source.total_len().await {
                for group in groups.iter_mut().filter(|g| g.end_byte.is_none()) {
                    group.end_byte = Some(total.saturating_sub(1));
                }
            }
        }

        subset::download_groups(source.as_ref(), &groups, &dest).await?;
        Ok(Some(dest))
    }

    async fn download_full_file(
        &self,
        eval: &Evaluated,
        policy: ErrorPolicy,
    ) -> Result<Option<PathBuf>> {
        let dest = paths::local_file_path(eval);
        if dest.exists() && !eval.request.overwrite {
            info!(path = %dest.display(), "Already have local copy");
            return Ok(Some(dest));
        }

        let resolved = resolver::resolve(&self.prober(), eval).await;
        match resolved.grib {
            Some(Location::Local(path)) => Ok(Some(path)),
            Some(Location::Remote(url)) => {
                info!(url = %url, "Downloading full file");
                subset::download_full(&self.client, &url, &dest).await?;
                Ok(Some(dest))
            }
            None => self.handle(self.unresolvable(eval), policy),
        }
    }

    fn handle(&self, error: FetchError, policy: ErrorPolicy) -> Result<Option<PathBuf>> {
        match policy {
            ErrorPolicy::Raise => Err(error),
            ErrorPolicy::Warn if error.is_downgradable() => {
                warn!("{error}");
                Ok(None)
            }
            ErrorPolicy::Warn => Err(error),
        }
    }

    fn unresolvable(&self, eval: &Evaluated) -> FetchError {
        FetchError::Unresolvable {
            model: eval.request.model.clone(),
            init_time: eval.request.init_time,
            lead: eval.request.lead,
        }
    }

    fn no_index(&self, eval: &Evaluated) -> FetchError {
        FetchError::NoIndex {
            model: eval.request.model.clone(),
            init_time: eval.request.init_time,
            lead: eval.request.lead,
        }
    }
}

/// Treat `":"` like "no selector"; it matches every line anyway.
fn normalize_selector(selector: Option<&str>) -> Option<&str> {
    selector.filter(|s| !s.is_empty() && *s != ":")
}
