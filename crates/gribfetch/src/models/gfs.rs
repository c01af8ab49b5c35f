//! Global Forecast System template.
//!
//! The archive layout changed twice: NODD coverage begins 2021-01-01,
//! and GFS v16 (2021-03-23) moved files under an `atmos/` directory.
//! Cycles before 2021 come from the NCEI record instead, which uses a
//! grid-number path scheme and `.grb2.inv` index files.

use chrono::{TimeZone, Utc};

use super::{
    normalize_product, owned_pairs, remote_basename, IdxDialect, ModelTemplate, Template,
};
use crate::error::Result;
use crate::request::Request;

pub struct Gfs;

impl ModelTemplate for Gfs {
    fn model_id(&self) -> &str {
        "gfs"
    }

    fn build(&self, req: &mut Request) -> Result<Template> {
        let nodd_era = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        if req.init_time >= nodd_era {
            self.build_nodd(req)
        } else {
            self.build_ncei(req)
        }
    }
}

impl Gfs {
    fn build_nodd(&self, req: &mut Request) -> Result<Template> {
        let products = [
            ("pgrb2.0p25", "common fields, 0.25 degree resolution"),
            ("pgrb2.0p50", "common fields, 0.50 degree resolution"),
            ("pgrb2.1p00", "common fields, 1.00 degree resolution"),
            ("pgrb2b.0p25", "uncommon fields, 0.25 degree resolution"),
            ("pgrb2b.0p50", "uncommon fields, 0.50 degree resolution"),
            ("pgrb2b.1p00", "uncommon fields, 1.00 degree resolution"),
            ("pgrb2full.0p50", "combined grids of 0.50 resolution"),
            ("sfluxgrb", "surface flux fields, T1534 Semi-Lagrangian grid"),
        ];
        let product = normalize_product(req, &products)?;

        let date = req.init_time.format("%Y%m%d");
        let hour = req.init_time.format("%H");
        // The surface-flux stream has no dot before the lead segment.
        let file = format!("gfs.t{hour}z.{product}.f{:03}", req.lead)
            .replace("sfluxgrb.", "sfluxgrb");

        // GFS v16 moved output under atmos/.
        let v16 = Utc.with_ymd_and_hms(2021, 3, 23, 0, 0, 0).unwrap();
        let post_root = if req.init_time < v16 {
            format!("gfs.{date}/{hour}/{file}")
        } else {
            format!("gfs.{date}/{hour}/atmos/{file}")
        };

        let sources = vec![
            (
                "aws".to_string(),
                format!("https://noaa-gfs-bdp-pds.s3.amazonaws.com/{post_root}"),
            ),
            (
                "nomads".to_string(),
                format!("https://nomads.ncep.noaa.gov/pub/data/nccf/com/gfs/prod/{post_root}"),
            ),
            (
                "google".to_string(),
                format!("https://storage.googleapis.com/global-forecast-system/{post_root}"),
            ),
            (
                "azure".to_string(),
                format!("https://noaagfs.blob.core.windows.net/gfs/{post_root}"),
            ),
            (
                "ncar_rda".to_string(),
                format!(
                    "https://data.rda.ucar.edu/d084001/{}/gfs.0p25.{}.f{:03}.grib2",
                    req.init_time.format("%Y/%Y%m%d"),
                    req.init_time.format("%Y%m%d%H"),
                    req.lead
                ),
            ),
        ];

        Ok(Template {
            description: "NOAA Global Forecast System (GFS)".to_string(),
            details: self.details(),
            products: owned_pairs(&products),
            local_filename: remote_basename(&sources[0].1),
            sources,
            idx_suffixes: vec![".idx".to_string(), ".grb2.inv".to_string()],
            idx_dialect: IdxDialect::Wgrib2,
        })
    }

    fn build_ncei(&self, req: &mut Request) -> Result<Template> {
        let products = [
            ("0.5-degree", "0.5 degree grid"),
            ("1.0-degree", "1.0 degree grid"),
        ];
        let product = normalize_product(req, &products)?;
        let grid_num = if product == "0.5-degree" { 4 } else { 3 };

        let ymd = req.init_time.format("%Y%m/%Y%m%d");
        let stamp = req.init_time.format("%Y%m%d_%H%M");
        let file = format!("gfs_{grid_num}_{stamp}_{:03}.grb2", req.lead);

        let sources = vec![
            (
                "ncei_analysis".to_string(),
                format!(
                    "https://www.ncei.noaa.gov/data/global-forecast-system/access/grid-{grid_num:03}-{product}/analysis/{ymd}/{file}"
                ),
            ),
            (
                "ncei_forecast".to_string(),
                format!(
                    "https://www.ncei.noaa.gov/data/global-forecast-system/access/grid-{grid_num:03}-{product}/forecast/{ymd}/{file}"
                ),
            ),
            (
                "ncar_rda".to_string(),
                format!(
                    "https://data.rda.ucar.edu/d084001/{}/gfs.0p25.{}.f{:03}.grib2",
                    req.init_time.format("%Y/%Y%m%d"),
                    req.init_time.format("%Y%m%d%H"),
                    req.lead
                ),
            ),
        ];

        Ok(Template {
            description: "NOAA Global Forecast System (GFS) - NCEI record".to_string(),
            details: self.details(),
            products: owned_pairs(&products),
            local_filename: remote_basename(&sources[0].1),
            sources,
            idx_suffixes: vec![
                ".grb2.inv".to_string(),
                ".idx".to_string(),
                ".inv".to_string(),
            ],
            idx_dialect: IdxDialect::Wgrib2,
        })
    }

    fn details(&self) -> Vec<(String, String)> {
        owned_pairs(&[
            (
                "nomads product description",
                "https://www.nco.ncep.noaa.gov/pmb/products/gfs",
            ),
            ("aws document", "https://registry.opendata.aws/noaa-gfs-bdp-pds"),
            (
                "NCEI",
                "https://www.ncei.noaa.gov/products/weather-climate-models/global-forecast",
            ),
        ])
    }
}
