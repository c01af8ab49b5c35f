//! ECMWF Open Data templates (IFS and AIFS).
//!
//! Index files here are eccodes-style line-delimited JSON with an
//! `.index` suffix. The open-data layout changed on 2024-02-28 06Z when
//! the resolution moved from 0.4 to 0.25 degrees and an `ifs/` segment
//! was added to the path.

use chrono::{TimeZone, Utc};

use super::{
    normalize_product, owned_pairs, remote_basename, IdxDialect, ModelTemplate, Template,
};
use crate::error::Result;
use crate::request::Request;

pub struct Ifs;

impl ModelTemplate for Ifs {
    fn model_id(&self) -> &str {
        "ifs"
    }

    fn build(&self, req: &mut Request) -> Result<Template> {
        let products = [
            ("oper", "operational high-resolution forecast, atmospheric fields"),
            ("enfo", "ensemble forecast, atmospheric fields"),
            ("wave", "wave forecasts"),
            ("waef", "ensemble forecast, ocean wave fields"),
            ("scda", "short cut-off high-resolution forecast, atmospheric fields"),
            ("scwv", "short cut-off high-resolution forecast, ocean wave fields"),
        ];
        let product = normalize_product(req, &products)?;

        // 0.4-degree grids predate the 2024-02 upgrade unless the user
        // pins a resolution explicitly.
        let resolution = match req.extras.get("resolution") {
            Some(r) => r.clone(),
            None => {
                if req.init_time < Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap() {
                    "0p4-beta".to_string()
                } else {
                    "0p25".to_string()
                }
            }
        };

        let suffix = if matches!(product.as_str(), "enfo" | "waef") {
            "ef"
        } else {
            "fc"
        };

        let file = format!(
            "{}-{}h-{product}-{suffix}.grib2",
            req.init_time.format("%Y%m%d%H%M%S"),
            req.lead
        );
        let cutover = Utc.with_ymd_and_hms(2024, 2, 28, 6, 0, 0).unwrap();
        let post_root = if req.init_time < cutover {
            format!(
                "{}/{resolution}/{product}/{file}",
                req.init_time.format("%Y%m%d/%Hz")
            )
        } else {
            format!(
                "{}/ifs/{resolution}/{product}/{file}",
                req.init_time.format("%Y%m%d/%Hz")
            )
        };

        let sources = vec![
            (
                "azure".to_string(),
                format!("https://ai4edataeuwest.blob.core.windows.net/ecmwf/{post_root}"),
            ),
            (
                "aws".to_string(),
                format!("https://ecmwf-forecasts.s3.eu-central-1.amazonaws.com/{post_root}"),
            ),
            (
                "ecmwf".to_string(),
                format!("https://data.ecmwf.int/forecasts/{post_root}"),
            ),
        ];

        Ok(Template {
            description: "ECMWF Open Data - Integrated Forecast System".to_string(),
            details: owned_pairs(&[(
                "ECMWF",
                "https://confluence.ecmwf.int/display/DAC/ECMWF+open+data",
            )]),
            products: owned_pairs(&products),
            local_filename: remote_basename(&sources[0].1),
            sources,
            idx_suffixes: vec![".index".to_string()],
            idx_dialect: IdxDialect::Eccodes,
        })
    }
}

pub struct Aifs;

impl ModelTemplate for Aifs {
    fn model_id(&self) -> &str {
        "aifs"
    }

    fn build(&self, req: &mut Request) -> Result<Template> {
        let products = [(
            "oper",
            "operational high-resolution forecast, atmospheric fields",
        )];
        let product = normalize_product(req, &products)?;

        let file = format!(
            "{}-{}h-{product}-fc.grib2",
            req.init_time.format("%Y%m%d%H%M%S"),
            req.lead
        );

        // The AI forecast became operational 2025-02-25 06Z, renaming
        // the path segment from aifs to aifs-single.
        let operational = Utc.with_ymd_and_hms(2025, 2, 25, 6, 0, 0).unwrap();
        let segment = if req.init_time >= operational {
            "aifs-single"
        } else {
            "aifs"
        };
        let post_root = format!(
            "{}/{segment}/0p25/{product}/{file}",
            req.init_time.format("%Y%m%d/%Hz")
        );

        let sources = vec![
            (
                "aws".to_string(),
                format!("https://ecmwf-forecasts.s3.eu-central-1.amazonaws.com/{post_root}"),
            ),
            (
                "ecmwf".to_string(),
                format!("https://data.ecmwf.int/forecasts/{post_root}"),
            ),
            (
                "azure".to_string(),
                format!("https://ai4edataeuwest.blob.core.windows.net/ecmwf/{post_root}"),
            ),
        ];

        Ok(Template {
            description: "ECMWF Open Data - AI Integrated Forecast System".to_string(),
            details: owned_pairs(&[(
                "ECMWF",
                "https://confluence.ecmwf.int/display/DAC/ECMWF+open+data",
            )]),
            products: owned_pairs(&products),
            local_filename: remote_basename(&sources[0].1),
            sources,
            idx_suffixes: vec![".index".to_string()],
            idx_dialect: IdxDialect::Eccodes,
        })
    }
}
