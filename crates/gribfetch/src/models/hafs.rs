//! Hurricane Analysis and Forecast System templates. Requires a
//! `storm_id` extra (e.g. `11e`).

use super::{
    normalize_product, owned_pairs, remote_basename, IdxDialect, ModelTemplate, Template,
};
use crate::error::Result;
use crate::request::Request;

fn build_hafs(model: &'static str, description: &str, req: &mut Request) -> Result<Template> {
    let products = [
        ("parent.atm", "parent domain, atmospheric fields"),
        ("parent.sat", "parent domain, satellite-derived fields"),
        ("parent.swath", "parent domain, swath fields"),
        ("storm.atm", "storm-following nest, atmospheric fields"),
        ("ww3", "wave model output"),
    ];
    let product = normalize_product(req, &products)?;
    let storm_id = req.require_extra("storm_id")?.to_lowercase();

    let date = req.init_time.format("%Y%m%d");
    let hour = req.init_time.format("%H");
    let stamp = req.init_time.format("%Y%m%d%H");
    let sources = vec![(
        "nomads".to_string(),
        format!(
            "https://nomads.ncep.noaa.gov/pub/data/nccf/com/hafs/prod/{model}.{date}/{hour}/{storm_id}.{stamp}.{model}.{product}.f{:02}.grb2",
            req.lead
        ),
    )];

    Ok(Template {
        description: description.to_string(),
        details: owned_pairs(&[(
            "Homepage",
            "https://wpo.noaa.gov/the-hurricane-analysis-and-forecast-system-hafs/",
        )]),
        products: owned_pairs(&products),
        local_filename: remote_basename(&sources[0].1),
        sources,
        idx_suffixes: vec![".idx".to_string(), ".grb2.idx".to_string()],
        idx_dialect: IdxDialect::Wgrib2,
    })
}

pub struct HafsA;

impl ModelTemplate for HafsA {
    fn model_id(&self) -> &str {
        "hafsa"
    }

    fn build(&self, req: &mut Request) -> Result<Template> {
        build_hafs(
            "hfsa",
            "Hurricane Analysis and Forecast System (HAFS-A)",
            req,
        )
    }
}

pub struct HafsB;

impl ModelTemplate for HafsB {
    fn model_id(&self) -> &str {
        "hafsb"
    }

    fn build(&self, req: &mut Request) -> Result<Template> {
        build_hafs(
            "hfsb",
            "Hurricane Analysis and Forecast System (HAFS-B)",
            req,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use chrono::{TimeZone, Utc};

    #[test]
    fn storm_id_required() {
        let mut req = Request::builder("hafsa")
            .init_time(Utc.with_ymd_and_hms(2023, 9, 1, 0, 0, 0).unwrap())
            .build()
            .unwrap();
        assert!(matches!(
            HafsA.build(&mut req).unwrap_err(),
            FetchError::MissingField { ref field, .. } if field == "storm_id"
        ));
    }

    #[test]
    fn storm_url_layout() {
        let mut req = Request::builder("hafsa")
            .product("storm.atm")
            .init_time(Utc.with_ymd_and_hms(2023, 9, 1, 6, 0, 0).unwrap())
            .lead(12)
            .extra("storm_id", "11E")
            .build()
            .unwrap();
        let template = HafsA.build(&mut req).unwrap();
        assert_eq!(
            template.source("nomads").unwrap(),
            "https://nomads.ncep.noaa.gov/pub/data/nccf/com/hafs/prod/hfsa.20230901/06/11e.2023090106.hfsa.storm.atm.f12.grb2"
        );
    }
}
