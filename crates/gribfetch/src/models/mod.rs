//! Model template registry.
//!
//! Each supported model has a template: a pure constructor that turns a
//! [`Request`] into the set of candidate source URLs, the index-file
//! suffixes and dialect, and the local filename rule. Templates do no
//! I/O; the same request always produces the same output.
//!
//! Built-in templates cover the NODD-era NOAA models and the ECMWF open
//! data; user-provided YAML templates in a configured extension
//! directory supplement them (see [`custom`]).

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{FetchError, Result};
use crate::request::{self, Request};

pub mod custom;
mod gefs;
mod gfs;
mod hafs;
mod hrrr;
mod ifs;
mod nam;
mod nbm;
mod rap;
mod rrfs;

/// Index-file dialect declared by a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdxDialect {
    /// Colon-separated text from the `wgrib2 -s` utility (NCEP style).
    Wgrib2,
    /// Line-delimited JSON from ECMWF's eccodes utilities.
    Eccodes,
}

impl IdxDialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdxDialect::Wgrib2 => "wgrib2",
            IdxDialect::Eccodes => "eccodes",
        }
    }
}

/// Template output: everything the rest of the pipeline needs to know
/// about one `(model, product)` pair, fully interpolated for a request.
#[derive(Debug, Clone)]
pub struct Template {
    /// Human description of the model.
    pub description: String,
    /// Links and notes about the archives.
    pub details: Vec<(String, String)>,
    /// Product name -> human description, in declaration order. The
    /// first entry is the default product.
    pub products: Vec<(String, String)>,
    /// Source name -> full URL (or path for `local*` sources), in
    /// default probe order.
    pub sources: Vec<(String, String)>,
    /// Candidate suffixes for deriving the index URL from the GRIB URL.
    pub idx_suffixes: Vec<String>,
    /// Which parser understands the index file.
    pub idx_dialect: IdxDialect,
    /// Basename used for the on-disk copy.
    pub local_filename: String,
}

impl Template {
    /// URL (or path) for a named source.
    pub fn source(&self, name: &str) -> Option<&str> {
        self.sources
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, url)| url.as_str())
    }

    /// Sources in effective probe order: the user priority filtered
    /// against the template's names (unknown names silently dropped),
    /// or the template's own order when no priority is given.
    pub fn effective_sources(&self, priority: Option<&[String]>) -> Vec<(String, String)> {
        match priority {
            Some(priority) => priority
                .iter()
                .filter_map(|name| {
                    self.source(name).map(|url| (name.clone(), url.to_string()))
                })
                .collect(),
            None => self.sources.clone(),
        }
    }
}

/// Default index suffix when a template does not override it.
pub(crate) fn default_idx_suffixes() -> Vec<String> {
    vec![".grib2.idx".to_string()]
}

/// Basename of the first (or a given) source URL; the usual local
/// filename rule.
pub(crate) fn remote_basename(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}

/// Default the product to the template's first entry, or validate a
/// user-supplied one against the declared products.
pub(crate) fn normalize_product(
    req: &mut Request,
    products: &[(&str, &str)],
) -> Result<String> {
    match &req.product {
        Some(product) => {
            if products.iter().any(|(name, _)| name == product) {
                Ok(product.clone())
            } else {
                Err(FetchError::UnknownProduct {
                    model: req.model.clone(),
                    product: product.clone(),
                })
            }
        }
        None => {
            let first = products
                .first()
                .map(|(name, _)| name.to_string())
                .ok_or_else(|| FetchError::UnknownModel(req.model.clone()))?;
            debug!(model = %req.model, product = %first, "product not specified, using template default");
            req.product = Some(first.clone());
            Ok(first)
        }
    }
}

pub(crate) fn owned_pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect()
}

/// A model template: pure function of the request.
///
/// `build` may normalize the request in place (defaulting the product,
/// substituting an unavailable lead time) so that every downstream
/// consumer sees the values actually encoded in the URLs.
pub trait ModelTemplate: Send + Sync {
    fn model_id(&self) -> &str;
    fn build(&self, req: &mut Request) -> Result<Template>;
}

/// Look up a built-in template by (already alias-resolved) model name.
fn builtin(model: &str) -> Option<&'static dyn ModelTemplate> {
    match model {
        "hrrr" => Some(&hrrr::Hrrr),
        "hrrrak" => Some(&hrrr::HrrrAk),
        "gfs" => Some(&gfs::Gfs),
        "gefs" => Some(&gefs::Gefs),
        "ifs" => Some(&ifs::Ifs),
        "aifs" => Some(&ifs::Aifs),
        "nam" => Some(&nam::Nam),
        "rap" => Some(&rap::Rap),
        "nbm" => Some(&nbm::Nbm),
        "rrfs" => Some(&rrfs::Rrfs),
        "hafsa" => Some(&hafs::HafsA),
        "hafsb" => Some(&hafs::HafsB),
        _ => None,
    }
}

/// Resolve model aliases. `ecmwf` is deprecated but still accepted.
fn resolve_alias(model: &str) -> String {
    match model {
        "alaska" => "hrrrak".to_string(),
        "ecmwf" => {
            warn!("model='ecmwf' is deprecated; use model='ifs' instead");
            "ifs".to_string()
        }
        other => other.to_string(),
    }
}

/// A request joined with its evaluated template. The request inside is
/// normalized: alias resolved, product defaulted, lead substituted
/// where the model demands it.
#[derive(Debug, Clone)]
pub struct Evaluated {
    pub request: Request,
    pub template: Template,
}

/// The template registry: built-ins plus user extension templates.
#[derive(Debug, Default)]
pub struct Registry {
    custom: Vec<custom::CustomTemplate>,
}

impl Registry {
    /// Registry with only the built-in templates.
    pub fn new() -> Self {
        Registry { custom: Vec::new() }
    }

    /// Registry with built-ins plus YAML templates from an extension
    /// directory. Files that fail to parse are skipped with a warning.
    pub fn with_extension_dir(dir: &Path) -> Self {
        Registry {
            custom: custom::load_templates(dir),
        }
    }

    /// Model names known to this registry.
    pub fn models(&self) -> Vec<String> {
        let mut names: Vec<String> = [
            "hrrr", "hrrrak", "gfs", "gefs", "ifs", "aifs", "nam", "rap", "nbm", "rrfs",
            "hafsa", "hafsb",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        names.extend(self.custom.iter().map(|t| t.model_id().to_string()));
        names
    }

    /// Evaluate the template for a request, returning the normalized
    /// request and the template output.
    pub fn evaluate(&self, req: &Request) -> Result<Evaluated> {
        let mut norm = req.clone();
        norm.model = resolve_alias(&norm.model);

        if norm.init_time >= chrono::Utc::now() {
            return Err(FetchError::InvalidRequest(format!(
                "init_time {} is not in the past",
                norm.init_time.format("%Y-%m-%d %H:%MZ")
            )));
        }

        request::age_out_nomads(&mut norm.priority, norm.init_time);

        let template = if let Some(template) = builtin(&norm.model) {
            template.build(&mut norm)?
        } else if let Some(template) = self.custom.iter().find(|t| t.model_id() == norm.model) {
            template.build(&mut norm)?
        } else {
            return Err(FetchError::UnknownModel(norm.model.clone()));
        };

        Ok(Evaluated {
            request: norm,
            template,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn request(model: &str) -> Request {
        Request::builder(model)
            .init_time(Utc.with_ymd_and_hms(2023, 1, 1, 6, 0, 0).unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn alias_resolution() {
        let registry = Registry::new();
        let eval = registry.evaluate(&request("alaska")).unwrap();
        assert_eq!(eval.request.model, "hrrrak");

        let eval = registry.evaluate(&request("ecmwf")).unwrap();
        assert_eq!(eval.request.model, "ifs");
    }

    #[test]
    fn unknown_model_rejected() {
        let registry = Registry::new();
        let err = registry.evaluate(&request("wrf")).unwrap_err();
        assert!(matches!(err, FetchError::UnknownModel(_)));
    }

    #[test]
    fn future_init_time_rejected() {
        let registry = Registry::new();
        let req = Request::builder("hrrr")
            .init_time(Utc::now() + chrono::Duration::hours(2))
            .build()
            .unwrap();
        let err = registry.evaluate(&req).unwrap_err();
        assert!(matches!(err, FetchError::InvalidRequest(_)));
    }

    #[test]
    fn one_second_in_the_past_accepted() {
        let registry = Registry::new();
        let req = Request::builder("hrrr")
            .init_time(Utc::now() - chrono::Duration::seconds(1))
            .build()
            .unwrap();
        assert!(registry.evaluate(&req).is_ok());
    }

    #[test]
    fn product_defaults_to_first() {
        let registry = Registry::new();
        let eval = registry.evaluate(&request("hrrr")).unwrap();
        assert_eq!(eval.request.product.as_deref(), Some("sfc"));
    }

    #[test]
    fn unknown_product_rejected() {
        let registry = Registry::new();
        let mut req = request("hrrr");
        req.product = Some("bogus".to_string());
        let err = registry.evaluate(&req).unwrap_err();
        assert!(matches!(err, FetchError::UnknownProduct { .. }));
    }

    #[test]
    fn effective_sources_honor_priority_and_drop_unknown() {
        let registry = Registry::new();
        let mut req = request("hrrr");
        req.priority = Some(vec![
            "google".to_string(),
            "nowhere".to_string(),
            "aws".to_string(),
        ]);
        let eval = registry.evaluate(&req).unwrap();
        let names: Vec<String> = eval
            .template
            .effective_sources(eval.request.priority.as_deref())
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["google".to_string(), "aws".to_string()]);
    }
}
