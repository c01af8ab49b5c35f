//! High-Resolution Rapid Refresh templates (CONUS and Alaska).
//!
//! The HRRR file path is the model template archetype: every archive
//! mirrors the same `hrrr.YYYYMMDD/<domain>/hrrr.tHHz.wrf<product>fFF`
//! layout, so the sources differ only in their host prefix.

use super::{
    default_idx_suffixes, normalize_product, owned_pairs, remote_basename, IdxDialect,
    ModelTemplate, Template,
};
use crate::error::Result;
use crate::request::Request;

pub struct Hrrr;

impl ModelTemplate for Hrrr {
    fn model_id(&self) -> &str {
        "hrrr"
    }

    fn build(&self, req: &mut Request) -> Result<Template> {
        let products = [
            ("sfc", "2D surface level fields; 3-km resolution"),
            ("prs", "3D pressure level fields; 3-km resolution"),
            ("nat", "Native level fields; 3-km resolution"),
            ("subh", "Subhourly grids; 3-km resolution"),
        ];
        let product = normalize_product(req, &products)?;

        let date = req.init_time.format("%Y%m%d");
        let hour = req.init_time.format("%H");
        let file = format!("hrrr.t{hour}z.wrf{product}f{:02}.grib2", req.lead);
        let post_root = format!("hrrr.{date}/conus/{file}");

        let sources = vec![
            (
                "aws".to_string(),
                format!("https://noaa-hrrr-bdp-pds.s3.amazonaws.com/{post_root}"),
            ),
            (
                "nomads".to_string(),
                format!("https://nomads.ncep.noaa.gov/pub/data/nccf/com/hrrr/prod/{post_root}"),
            ),
            (
                "google".to_string(),
                format!("https://storage.googleapis.com/high-resolution-rapid-refresh/{post_root}"),
            ),
            (
                "azure".to_string(),
                format!("https://noaahrrr.blob.core.windows.net/hrrr/{post_root}"),
            ),
            (
                "pando".to_string(),
                format!("https://pando-rgw01.chpc.utah.edu/hrrr/{product}/{date}/{file}"),
            ),
            (
                "pando2".to_string(),
                format!("https://pando-rgw02.chpc.utah.edu/hrrr/{product}/{date}/{file}"),
            ),
        ];

        Ok(Template {
            description: "High-Resolution Rapid Refresh - CONUS".to_string(),
            details: owned_pairs(&[
                (
                    "NOMADS product description",
                    "https://www.nco.ncep.noaa.gov/pmb/products/hrrr/",
                ),
                (
                    "University of Utah HRRR archive",
                    "http://hrrr.chpc.utah.edu/",
                ),
            ]),
            products: owned_pairs(&products),
            local_filename: remote_basename(&sources[0].1),
            sources,
            idx_suffixes: default_idx_suffixes(),
            idx_dialect: IdxDialect::Wgrib2,
        })
    }
}

pub struct HrrrAk;

impl ModelTemplate for HrrrAk {
    fn model_id(&self) -> &str {
        "hrrrak"
    }

    fn build(&self, req: &mut Request) -> Result<Template> {
        let products = [
            ("prs", "3D pressure level fields; 3-km resolution"),
            ("sfc", "2D surface level fields; 3-km resolution"),
            ("nat", "Native level fields; 3-km resolution"),
            ("subh", "Subhourly grids; 3-km resolution"),
        ];
        let product = normalize_product(req, &products)?;

        let date = req.init_time.format("%Y%m%d");
        let hour = req.init_time.format("%H");
        let file = format!("hrrr.t{hour}z.wrf{product}f{:02}.ak.grib2", req.lead);
        let post_root = format!("hrrr.{date}/alaska/{file}");

        let sources = vec![
            (
                "nomads".to_string(),
                format!("https://nomads.ncep.noaa.gov/pub/data/nccf/com/hrrr/prod/{post_root}"),
            ),
            (
                "aws".to_string(),
                format!("https://noaa-hrrr-bdp-pds.s3.amazonaws.com/{post_root}"),
            ),
            (
                "google".to_string(),
                format!("https://storage.googleapis.com/high-resolution-rapid-refresh/{post_root}"),
            ),
            (
                "azure".to_string(),
                format!("https://noaahrrr.blob.core.windows.net/hrrr/{post_root}"),
            ),
            (
                "pando".to_string(),
                format!(
                    "https://pando-rgw01.chpc.utah.edu/hrrrak/{product}/{date}/hrrrak.t{hour}z.wrf{product}f{:02}.grib2",
                    req.lead
                ),
            ),
        ];

        Ok(Template {
            description: "High-Resolution Rapid Refresh - Alaska".to_string(),
            details: owned_pairs(&[(
                "NOMADS product description",
                "https://www.nco.ncep.noaa.gov/pmb/products/hrrr",
            )]),
            products: owned_pairs(&products),
            local_filename: remote_basename(&sources[0].1),
            sources,
            idx_suffixes: default_idx_suffixes(),
            idx_dialect: IdxDialect::Wgrib2,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn hrrr_sfc_url() {
        let mut req = Request::builder("hrrr")
            .product("sfc")
            .init_time(Utc.with_ymd_and_hms(2023, 1, 1, 6, 0, 0).unwrap())
            .build()
            .unwrap();
        let template = Hrrr.build(&mut req).unwrap();
        assert_eq!(
            template.source("aws").unwrap(),
            "https://noaa-hrrr-bdp-pds.s3.amazonaws.com/hrrr.20230101/conus/hrrr.t06z.wrfsfcf00.grib2"
        );
        assert_eq!(template.local_filename, "hrrr.t06z.wrfsfcf00.grib2");
        assert_eq!(template.idx_dialect, IdxDialect::Wgrib2);
    }

    #[test]
    fn hrrr_lead_is_zero_padded() {
        let mut req = Request::builder("hrrr")
            .product("prs")
            .init_time(Utc.with_ymd_and_hms(2022, 7, 4, 18, 0, 0).unwrap())
            .lead(6)
            .build()
            .unwrap();
        let template = Hrrr.build(&mut req).unwrap();
        assert!(template
            .source("google")
            .unwrap()
            .ends_with("hrrr.20220704/conus/hrrr.t18z.wrfprsf06.grib2"));
    }

    #[test]
    fn alaska_paths_use_ak_suffix() {
        let mut req = Request::builder("hrrrak")
            .init_time(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap())
            .build()
            .unwrap();
        let template = HrrrAk.build(&mut req).unwrap();
        assert!(template
            .source("aws")
            .unwrap()
            .ends_with("alaska/hrrr.t00z.wrfprsf00.ak.grib2"));
        assert_eq!(req.product.as_deref(), Some("prs"));
    }
}
