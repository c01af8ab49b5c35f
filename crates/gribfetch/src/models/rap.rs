//! Rapid Refresh template (NOMADS and Big Data Program archives).

use super::{
    default_idx_suffixes, normalize_product, owned_pairs, remote_basename, IdxDialect,
    ModelTemplate, Template,
};
use crate::error::Result;
use crate::request::Request;

pub struct Rap;

impl ModelTemplate for Rap {
    fn model_id(&self) -> &str {
        "rap"
    }

    fn build(&self, req: &mut Request) -> Result<Template> {
        let products = [
            ("awp130pgrb", "CONUS Pressure levels; 13-km resolution"),
            ("awp252pgrb", "CONUS Pressure levels; 20-km resolution"),
            ("awp236pgrb", "CONUS Pressure levels; 40-km resolution"),
            ("awp130bgrb", "CONUS Native levels; 13-km resolution"),
            ("awp252bgrb", "CONUS Native levels; 20-km resolution"),
            ("wrfprs", "Full domain Pressure Levels; 13-km"),
            ("wrfnat", "Full domain Native Levels; 13-km"),
            ("awip32", "North American Master Grid; 32-km resolution"),
        ];
        let product = normalize_product(req, &products)?;

        let date = req.init_time.format("%Y%m%d");
        let hour = req.init_time.format("%H");
        let post_root = format!("rap.{date}/rap.t{hour}z.{product}f{:02}.grib2", req.lead);

        let sources = vec![
            (
                "aws".to_string(),
                format!("https://noaa-rap-pds.s3.amazonaws.com/{post_root}"),
            ),
            (
                "nomads".to_string(),
                format!("https://nomads.ncep.noaa.gov/pub/data/nccf/com/rap/prod/{post_root}"),
            ),
            (
                "google".to_string(),
                format!("https://storage.googleapis.com/rapid-refresh/{post_root}"),
            ),
            (
                "azure".to_string(),
                format!("https://noaarap.blob.core.windows.net/rap/{post_root}"),
            ),
        ];

        Ok(Template {
            description: "Rapid Refresh (RAP) from NOMADS and Big Data Program".to_string(),
            details: owned_pairs(&[(
                "nomads product description",
                "https://www.nco.ncep.noaa.gov/pmb/products/rap",
            )]),
            products: owned_pairs(&products),
            local_filename: remote_basename(&sources[0].1),
            sources,
            idx_suffixes: default_idx_suffixes(),
            idx_dialect: IdxDialect::Wgrib2,
        })
    }
}
