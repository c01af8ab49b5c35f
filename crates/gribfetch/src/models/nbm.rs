//! National Blend of Models template.
//!
//! NBM publishes no analysis grids; a lead of 0 is substituted with the
//! smallest published lead.

use tracing::warn;

use super::{
    default_idx_suffixes, normalize_product, owned_pairs, remote_basename, IdxDialect,
    ModelTemplate, Template,
};
use crate::error::Result;
use crate::request::Request;

pub struct Nbm;

impl ModelTemplate for Nbm {
    fn model_id(&self) -> &str {
        "nbm"
    }

    fn build(&self, req: &mut Request) -> Result<Template> {
        let products = [
            ("co", "CONUS 13-km resolution"),
            ("ak", "Alaska 13-km resolution"),
            ("gu", "Guam 13-km resolution"),
            ("hi", "Hawaii 13-km resolution"),
            ("pr", "Puerto Rico 13-km resolution"),
        ];
        let product = normalize_product(req, &products)?;

        if req.lead == 0 {
            warn!("NBM does not publish analysis grids; substituting lead=1");
            req.lead = 1;
        }

        let date = req.init_time.format("%Y%m%d");
        let hour = req.init_time.format("%H");
        let post_root = format!(
            "blend.{date}/{hour}/core/blend.t{hour}z.core.f{:03}.{product}.grib2",
            req.lead
        );

        let sources = vec![
            (
                "nomads".to_string(),
                format!("https://nomads.ncep.noaa.gov/pub/data/nccf/com/blend/prod/{post_root}"),
            ),
            (
                "aws".to_string(),
                format!("https://noaa-nbm-grib2-pds.s3.amazonaws.com/{post_root}"),
            ),
        ];

        Ok(Template {
            description: "National Blend of Models".to_string(),
            details: owned_pairs(&[
                (
                    "NOMADS product description",
                    "https://www.nco.ncep.noaa.gov/pmb/products/blend/",
                ),
                ("AWS Registry", "https://registry.opendata.aws/noaa-nbm/"),
            ]),
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
    fn analysis_lead_substituted_with_one() {
        let mut req = Request::builder("nbm")
            .init_time(Utc.with_ymd_and_hms(2023, 1, 1, 13, 0, 0).unwrap())
            .build()
            .unwrap();
        let template = Nbm.build(&mut req).unwrap();
        assert_eq!(req.lead, 1);
        assert!(template
            .source("aws")
            .unwrap()
            .ends_with("blend.20230101/13/core/blend.t13z.core.f001.co.grib2"));
    }

    #[test]
    fn nonzero_lead_kept() {
        let mut req = Request::builder("nbm")
            .product("ak")
            .init_time(Utc.with_ymd_and_hms(2023, 1, 1, 13, 0, 0).unwrap())
            .lead(36)
            .build()
            .unwrap();
        Nbm.build(&mut req).unwrap();
        assert_eq!(req.lead, 36);
    }
}
