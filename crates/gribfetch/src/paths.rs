//! Local cache layout and deterministic subset naming.
//!
//! Full files land at `save_dir/model/YYYYMMDD/<local_filename>`.
//! Subsets prefix the basename with `subset_<h1><h2><h3>__`, where the
//! three short BLAKE2b digests cover the initialization timestamp, the
//! lead time, and the selected message numbers. Short digests keep the
//! name bounded no matter how many messages are selected while still
//! sorting by date then lead.

use std::path::{Path, PathBuf};

use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;

use crate::models::Evaluated;

/// Hex digest of `input`, truncated to `size` bytes (1..=64).
fn short_digest(input: &str, size: usize) -> String {
    let mut hasher = Blake2bVar::new(size).expect("digest size in 1..=64");
    hasher.update(input.as_bytes());
    let mut buf = [0u8; 64];
    hasher
        .finalize_variable(&mut buf[..size])
        .expect("buffer sized to digest");
    buf[..size].iter().map(|b| format!("{b:02x}")).collect()
}

/// Directory holding every file of one model cycle.
pub fn cycle_dir(eval: &Evaluated) -> PathBuf {
    eval.request
        .save_dir
        .join(&eval.request.model)
        .join(eval.request.init_time.format("%Y%m%d").to_string())
}

/// Expected local path of the full GRIB2 file.
///
/// When the template carries a `local*` source whose path exists on
/// disk, that path supersedes the cache-layout default.
pub fn local_file_path(eval: &Evaluated) -> PathBuf {
    for (name, url) in &eval.template.sources {
        if name.starts_with("local") {
            let path = PathBuf::from(url);
            if path.exists() {
                return path;
            }
        }
    }
    cycle_dir(eval).join(&eval.template.local_filename)
}

/// Local path for a subset selecting the given message numbers.
pub fn local_subset_path(eval: &Evaluated, messages: &[u32]) -> PathBuf {
    let full = local_file_path(eval);
    let base = full
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| eval.template.local_filename.clone());
    let name = subset_file_name(eval, messages, &base);
    full.with_file_name(name)
}

/// The `subset_<h1><h2><h3>__<base>` file name.
pub fn subset_file_name(eval: &Evaluated, messages: &[u32], base: &str) -> String {
    let date = eval.request.init_time.format("%Y%m%d%H%M").to_string();
    let lead = eval.request.lead.to_string();
    let joined = messages
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("-");

    // 8, 8, and 16 bits respectively. Collisions are possible in
    // principle; the prefix only disambiguates files within one cycle
    // directory, so the short digests are accepted.
    let hash_date = short_digest(&date, 1);
    let hash_lead = short_digest(&lead, 1);
    let hash_label = short_digest(&joined, 2);

    format!("subset_{hash_date}{hash_lead}{hash_label}__{base}")
}

/// Where a fetched index file is persisted, next to the local GRIB.
pub fn local_index_path(local_grib: &Path, idx_name: &str) -> PathBuf {
    local_grib.with_file_name(idx_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Registry;
    use crate::request::Request;
    use chrono::{TimeZone, Utc};

    fn eval(lead: u32) -> Evaluated {
        let req = Request::builder("hrrr")
            .product("sfc")
            .init_time(Utc.with_ymd_and_hms(2023, 1, 1, 6, 0, 0).unwrap())
            .lead(lead)
            .save_dir("/cache")
            .build()
            .unwrap();
        Registry::new().evaluate(&req).unwrap()
    }

    #[test]
    fn full_path_layout() {
        assert_eq!(
            local_file_path(&eval(0)),
            PathBuf::from("/cache/hrrr/20230101/hrrr.t06z.wrfsfcf00.grib2")
        );
    }

    #[test]
    fn local_path_is_pure() {
        assert_eq!(local_file_path(&eval(6)), local_file_path(&eval(6)));
    }

    #[test]
    fn subset_name_shape() {
        let name = subset_file_name(&eval(0), &[3, 4, 5], "hrrr.t06z.wrfsfcf00.grib2");
        assert!(name.starts_with("subset_"));
        assert!(name.ends_with("__hrrr.t06z.wrfsfcf00.grib2"));
        // 1 + 1 + 2 digest bytes -> 8 hex characters.
        let hex = &name["subset_".len()..name.find("__").unwrap()];
        assert_eq!(hex.len(), 8);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn subset_name_is_pure_in_selected_messages() {
        let a = subset_file_name(&eval(0), &[3, 4], "f.grib2");
        let b = subset_file_name(&eval(0), &[3, 4], "f.grib2");
        assert_eq!(a, b);
    }

    #[test]
    fn same_date_shares_date_hash_across_leads() {
        let a = subset_file_name(&eval(0), &[1], "f.grib2");
        let b = subset_file_name(&eval(6), &[1], "f.grib2");
        // First digest byte covers the init timestamp only.
        assert_eq!(a[7..9], b[7..9]);
    }

    #[test]
    fn subset_path_lands_next_to_full_file() {
        let path = local_subset_path(&eval(0), &[1, 2]);
        assert_eq!(path.parent(), Some(Path::new("/cache/hrrr/20230101")));
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with("__hrrr.t06z.wrfsfcf00.grib2"));
    }
}
