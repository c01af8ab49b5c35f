//! Source resolution: find where the GRIB2 file and its index live.
//!
//! The GRIB and the index are resolved independently because mirrors
//! frequently carry one without the other (Google Cloud and some AWS
//! prefixes lack index files for older data); the payload can then be
//! fetched from one mirror while the inventory comes from another.

use std::path::PathBuf;

use tracing::{debug, instrument};

use crate::models::Evaluated;
use crate::paths;
use crate::probe::Prober;

/// Extensions the index suffix replaces rather than extends.
const GRIB_EXTENSIONS: [&str; 4] = ["grb", "grib", "grb2", "grib2"];

/// Where a resolved file lives.
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    Remote(String),
    Local(PathBuf),
}

impl Location {
    pub fn is_local(&self) -> bool {
        matches!(self, Location::Local(_))
    }

    pub fn as_local_path(&self) -> Option<&PathBuf> {
        match self {
            Location::Local(path) => Some(path),
            Location::Remote(_) => None,
        }
    }

    pub fn as_url(&self) -> Option<&str> {
        match self {
            Location::Remote(url) => Some(url),
            Location::Local(_) => None,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Remote(url) => f.write_str(url),
            Location::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Outcome of source resolution. Any member may be absent.
#[derive(Debug, Clone, Default)]
pub struct Resolved {
    pub grib: Option<Location>,
    pub grib_source: Option<String>,
    pub idx: Option<Location>,
    pub idx_source: Option<String>,
}

impl Resolved {
    pub fn is_unresolved(&self) -> bool {
        self.grib.is_none() && self.idx.is_none()
    }
}

/// Candidate index names derived from a GRIB URL or path. A suffix
/// replaces a recognized GRIB extension (`file.grib2` -> `file.index`
/// for `.index`) and is appended otherwise (`file.f000` ->
/// `file.f000.idx`); the append form is kept as a fallback either way.
pub(crate) fn idx_candidates(base: &str, suffixes: &[String]) -> Vec<String> {
    let mut candidates = Vec::new();
    for suffix in suffixes {
        if let Some((stem, ext)) = base.rsplit_once('.') {
            if GRIB_EXTENSIONS.contains(&ext) {
                candidates.push(format!("{stem}{suffix}"));
            }
        }
        candidates.push(format!("{base}{suffix}"));
    }
    candidates.dedup();
    candidates
}

/// Resolve the GRIB file and its index across the template's sources.
#[instrument(skip_all, fields(model = %eval.request.model))]
pub(crate) async fn resolve(prober: &Prober, eval: &Evaluated) -> Resolved {
    let mut resolved = Resolved::default();
    let local = paths::local_file_path(eval);
    let sources = eval
        .template
        .effective_sources(eval.request.priority.as_deref());

    // A cached full file short-circuits the GRIB search.
    if local.exists() && !eval.request.overwrite {
        debug!(path = %local.display(), "Using local copy");
        resolved.grib = Some(Location::Local(local.clone()));
        resolved.grib_source = Some("local".to_string());
    } else {
        'grib: for (name, url) in &sources {
            if name.starts_with("local") {
                let path = PathBuf::from(url);
                if path.exists() {
                    resolved.grib = Some(Location::Local(path));
                    resolved.grib_source = Some(name.clone());
                    break 'grib;
                }
                continue;
            }

            if name.contains("pando") {
                prober.ping_pando().await;
            }

            let probe_url = match prober.resolve_source_url(url).await {
                Ok(probe_url) => probe_url,
                Err(e) => {
                    debug!(source = %name, error = %e, "Cannot resolve source URL");
                    continue;
                }
            };
            if prober.exists(&probe_url).await {
                debug!(source = %name, url = %probe_url, "Found GRIB");
                resolved.grib = Some(Location::Remote(probe_url));
                resolved.grib_source = Some(name.clone());
                break 'grib;
            }
        }
    }

    // The index resolves independently: first next to the local copy,
    // then across the same source order.
    if !eval.request.overwrite {
        let base = local.to_string_lossy();
        for candidate in idx_candidates(&base, &eval.template.idx_suffixes) {
            let path = PathBuf::from(&candidate);
            if path.exists() {
                debug!(path = %path.display(), "Using local index");
                resolved.idx = Some(Location::Local(path));
                resolved.idx_source = Some("local".to_string());
                break;
            }
        }
    }

    if resolved.idx.is_none() {
        'idx: for (name, url) in &sources {
            if name.starts_with("local") {
                for candidate in idx_candidates(url, &eval.template.idx_suffixes) {
                    let path = PathBuf::from(&candidate);
                    if path.exists() {
                        resolved.idx = Some(Location::Local(path));
                        resolved.idx_source = Some(name.clone());
                        break 'idx;
                    }
                }
                continue;
            }

            if name.contains("pando") {
                prober.ping_pando().await;
            }

            for candidate in idx_candidates(url, &eval.template.idx_suffixes) {
                let probe_url = match prober.resolve_source_url(&candidate).await {
                    Ok(probe_url) => probe_url,
                    Err(e) => {
                        debug!(source = %name, error = %e, "Cannot resolve index URL");
                        continue;
                    }
                };
                if prober.exists(&probe_url).await {
                    debug!(source = %name, url = %probe_url, "Found index");
                    resolved.idx = Some(Location::Remote(probe_url));
                    resolved.idx_source = Some(name.clone());
                    break 'idx;
                }
            }
        }
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suffixes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn grib2_extension_is_replaced_and_appended() {
        let candidates = idx_candidates(
            "https://host/hrrr.t06z.wrfsfcf00.grib2",
            &suffixes(&[".grib2.idx"]),
        );
        assert_eq!(
            candidates,
            vec![
                "https://host/hrrr.t06z.wrfsfcf00.grib2.idx".to_string(),
                "https://host/hrrr.t06z.wrfsfcf00.grib2.grib2.idx".to_string(),
            ]
        );
    }

    #[test]
    fn unknown_extension_appends() {
        let candidates = idx_candidates(
            "https://host/gfs.t00z.pgrb2.0p25.f003",
            &suffixes(&[".idx"]),
        );
        assert_eq!(
            candidates,
            vec!["https://host/gfs.t00z.pgrb2.0p25.f003.idx".to_string()]
        );
    }

    #[test]
    fn index_suffix_replaces_grib2() {
        let candidates = idx_candidates(
            "https://host/20240301000000-0h-oper-fc.grib2",
            &suffixes(&[".index"]),
        );
        assert_eq!(
            candidates[0],
            "https://host/20240301000000-0h-oper-fc.index".to_string()
        );
    }

    #[test]
    fn multiple_suffixes_keep_order() {
        let candidates = idx_candidates("https://host/file.grb2", &suffixes(&[".inv", ".idx"]));
        assert_eq!(
            candidates,
            vec![
                "https://host/file.inv".to_string(),
                "https://host/file.grb2.inv".to_string(),
                "https://host/file.idx".to_string(),
                "https://host/file.grb2.idx".to_string(),
            ]
        );
    }
}
