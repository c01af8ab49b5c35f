//! User-provided model templates.
//!
//! Templates are declared in YAML files dropped into the configured
//! extension directory, one model per file:
//!
//! ```yaml
//! model: expanse
//! description: "In-house WRF runs"
//! products:
//!   - name: sfc
//!     description: "surface fields"
//! sources:
//!   - name: local
//!     url: "/archive/expanse/{date}/wrf.t{cycle:02}z.{product}.f{fxx:02}.grib2"
//!   - name: aws
//!     url: "https://my-bucket.s3.amazonaws.com/expanse.{date}/wrf.t{cycle:02}z.{product}.f{fxx:02}.grib2"
//! idx_suffixes: [".grib2.idx"]
//! idx_dialect: wgrib2
//! ```
//!
//! URL patterns support `{date}` (YYYYMMDD), `{cycle:02}`, `{fxx}`,
//! `{fxx:02}`, `{fxx:03}`, `{product}`, and `{member}` tokens.

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{
    default_idx_suffixes, normalize_product, remote_basename, IdxDialect, ModelTemplate,
    Template,
};
use crate::error::{FetchError, Result};
use crate::request::Request;

#[derive(Debug, Clone, Deserialize)]
struct ProductSpec {
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SourceSpec {
    name: String,
    url: String,
}

/// One YAML template file, deserialized.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomTemplate {
    model: String,
    #[serde(default)]
    description: String,
    products: Vec<ProductSpec>,
    sources: Vec<SourceSpec>,
    #[serde(default = "default_idx_suffixes")]
    idx_suffixes: Vec<String>,
    #[serde(default = "default_dialect")]
    idx_dialect: IdxDialect,
    /// Local basename override; defaults to the remote basename of the
    /// first source.
    #[serde(default)]
    filename: Option<String>,
}

fn default_dialect() -> IdxDialect {
    IdxDialect::Wgrib2
}

impl CustomTemplate {
    /// Load a template from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let template: CustomTemplate = serde_yaml::from_str(&content).map_err(|e| {
            FetchError::Config(format!("cannot parse template {}: {e}", path.display()))
        })?;
        if template.sources.is_empty() {
            return Err(FetchError::Config(format!(
                "template {} declares no sources",
                path.display()
            )));
        }
        if template.products.is_empty() {
            return Err(FetchError::Config(format!(
                "template {} declares no products",
                path.display()
            )));
        }
        debug!(model = %template.model, path = %path.display(), "Loaded model template");
        Ok(template)
    }

    fn interpolate(&self, pattern: &str, req: &Request, product: &str) -> String {
        let mut url = pattern
            .replace("{date}", &req.init_time.format("%Y%m%d").to_string())
            .replace("{cycle:02}", &req.init_time.format("%H").to_string())
            .replace("{fxx:03}", &format!("{:03}", req.lead))
            .replace("{fxx:02}", &format!("{:02}", req.lead))
            .replace("{fxx}", &req.lead.to_string())
            .replace("{product}", product);
        if let Some(member) = &req.member {
            url = url.replace("{member}", &member.label());
        }
        url
    }
}

impl ModelTemplate for CustomTemplate {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn build(&self, req: &mut Request) -> Result<Template> {
        let products: Vec<(&str, &str)> = self
            .products
            .iter()
            .map(|p| (p.name.as_str(), p.description.as_str()))
            .collect();
        let product = normalize_product(req, &products)?;

        if self.sources.iter().any(|s| s.url.contains("{member}")) && req.member.is_none() {
            return Err(FetchError::MissingField {
                model: req.model.clone(),
                field: "member".to_string(),
            });
        }

        let sources: Vec<(String, String)> = self
            .sources
            .iter()
            .map(|s| (s.name.clone(), self.interpolate(&s.url, req, &product)))
            .collect();

        let local_filename = match &self.filename {
            Some(pattern) => self.interpolate(pattern, req, &product),
            None => remote_basename(&sources[0].1),
        };

        Ok(Template {
            description: self.description.clone(),
            details: Vec::new(),
            products: self
                .products
                .iter()
                .map(|p| (p.name.clone(), p.description.clone()))
                .collect(),
            sources,
            idx_suffixes: self.idx_suffixes.clone(),
            idx_dialect: self.idx_dialect,
            local_filename,
        })
    }
}

/// Load every `*.yaml` template in a directory. Files that fail to
/// parse are skipped with a warning, matching how model configuration
/// directories behave elsewhere.
pub fn load_templates(dir: &Path) -> Vec<CustomTemplate> {
    let mut templates = Vec::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "Cannot read template directory");
            return templates;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let is_yaml = path
            .extension()
            .map_or(false, |ext| ext == "yaml" || ext == "yml");
        if !is_yaml {
            continue;
        }
        match CustomTemplate::load(&path) {
            Ok(template) => templates.push(template),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable model template");
            }
        }
    }

    info!(count = templates.len(), path = %dir.display(), "Loaded extension templates");
    templates
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const YAML: &str = r#"
model: expanse
description: "In-house WRF runs"
products:
  - name: sfc
    description: "surface fields"
  - name: prs
sources:
  - name: aws
    url: "https://my-bucket.s3.amazonaws.com/expanse.{date}/wrf.t{cycle:02}z.{product}.f{fxx:02}.grib2"
idx_dialect: wgrib2
"#;

    #[test]
    fn interpolates_tokens() {
        let template: CustomTemplate = serde_yaml::from_str(YAML).unwrap();
        let mut req = Request::builder("expanse")
            .init_time(Utc.with_ymd_and_hms(2023, 3, 15, 6, 0, 0).unwrap())
            .lead(9)
            .build()
            .unwrap();
        let built = template.build(&mut req).unwrap();
        assert_eq!(
            built.source("aws").unwrap(),
            "https://my-bucket.s3.amazonaws.com/expanse.20230315/wrf.t06z.sfc.f09.grib2"
        );
        assert_eq!(built.local_filename, "wrf.t06z.sfc.f09.grib2");
        assert_eq!(req.product.as_deref(), Some("sfc"));
    }

    #[test]
    fn member_token_requires_member() {
        let yaml = YAML.replace("{product}", "{member}.{product}");
        let template: CustomTemplate = serde_yaml::from_str(&yaml).unwrap();
        let mut req = Request::builder("expanse")
            .init_time(Utc.with_ymd_and_hms(2023, 3, 15, 6, 0, 0).unwrap())
            .build()
            .unwrap();
        assert!(matches!(
            template.build(&mut req).unwrap_err(),
            FetchError::MissingField { .. }
        ));
    }

    #[test]
    fn load_templates_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.yaml"), YAML).unwrap();
        std::fs::write(dir.path().join("bad.yaml"), "model: [unclosed").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not yaml").unwrap();
        let templates = load_templates(dir.path());
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].model_id(), "expanse");
    }
}
