//! North America Mesoscale template.

use super::{
    default_idx_suffixes, normalize_product, owned_pairs, remote_basename, IdxDialect,
    ModelTemplate, Template,
};
use crate::error::Result;
use crate::request::Request;

pub struct Nam;

impl ModelTemplate for Nam {
    fn model_id(&self) -> &str {
        "nam"
    }

    fn build(&self, req: &mut Request) -> Result<Template> {
        let products = [
            ("conusnest.hiresf", "CONUS 5 km"),
            ("firewxnest.hiresf", "Fire Weather 1.33 km CONUS/1.5 km Alaska"),
            ("alaskanest.hiresf", "Alaska 6 km"),
            ("hawaiinest.hiresf", "Hawaii 6 km"),
            ("priconest.hiresf", "Puerto Rico 3 km"),
            ("afwaca", "Central America/Caribbean"),
        ];
        let product = normalize_product(req, &products)?;

        let date = req.init_time.format("%Y%m%d");
        let hour = req.init_time.format("%H");
        let post_root = format!(
            "nam.{date}/nam.t{hour}z.{product}{:02}.tm00.grib2",
            req.lead
        );

        let sources = vec![
            (
                "aws".to_string(),
                format!("https://noaa-nam-pds.s3.amazonaws.com/{post_root}"),
            ),
            (
                "nomads".to_string(),
                format!("https://nomads.ncep.noaa.gov/pub/data/nccf/com/nam/prod/{post_root}"),
            ),
        ];

        Ok(Template {
            description: "North America Mesoscale - CONUS".to_string(),
            details: owned_pairs(&[(
                "NOMADS product description",
                "https://www.nco.ncep.noaa.gov/pmb/products/nam/",
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
    fn nest_product_in_filename() {
        let mut req = Request::builder("nam")
            .init_time(Utc.with_ymd_and_hms(2023, 1, 1, 12, 0, 0).unwrap())
            .lead(3)
            .build()
            .unwrap();
        let template = Nam.build(&mut req).unwrap();
        assert_eq!(
            template.source("aws").unwrap(),
            "https://noaa-nam-pds.s3.amazonaws.com/nam.20230101/nam.t12z.conusnest.hiresf03.tm00.grib2"
        );
    }
}
