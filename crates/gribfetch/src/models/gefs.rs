//! Global Ensemble Forecast System template. Requires a `member`.

use super::{
    normalize_product, owned_pairs, remote_basename, IdxDialect, ModelTemplate, Template,
};
use crate::error::{FetchError, Result};
use crate::request::Request;

pub struct Gefs;

impl ModelTemplate for Gefs {
    fn model_id(&self) -> &str {
        "gefs"
    }

    fn build(&self, req: &mut Request) -> Result<Template> {
        let products = [
            ("pgrb2sp25", "common fields, 0.25 degree resolution"),
            ("pgrb2ap5", "less common fields, 0.5 degree resolution"),
            ("pgrb2bp5", "least common fields, 0.5 degree resolution"),
        ];
        let product = normalize_product(req, &products)?;

        let member = req.member.ok_or_else(|| FetchError::MissingField {
            model: req.model.clone(),
            field: "member".to_string(),
        })?;

        let date = req.init_time.format("%Y%m%d");
        let hour = req.init_time.format("%H");
        let member = member.label();

        // The file stem encodes the grid differently than the directory.
        let stem = match product.as_str() {
            "pgrb2ap5" => "pgrb2a.0p50",
            "pgrb2bp5" => "pgrb2b.0p50",
            _ => "pgrb2s.0p25",
        };
        let post_root = format!(
            "gefs.{date}/{hour}/atmos/{product}/ge{member}.t{hour}z.{stem}.f{:03}",
            req.lead
        );

        let sources = vec![(
            "aws".to_string(),
            format!("https://noaa-gefs-pds.s3.amazonaws.com/{post_root}"),
        )];

        Ok(Template {
            description: "Global Ensemble Forecast System (GEFS)".to_string(),
            details: owned_pairs(&[(
                "aws",
                "https://registry.opendata.aws/noaa-gefs-pds/",
            )]),
            products: owned_pairs(&products),
            // Member must stay in the local name to keep files unique.
            local_filename: remote_basename(&sources[0].1),
            sources,
            idx_suffixes: vec![".idx".to_string()],
            idx_dialect: IdxDialect::Wgrib2,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Member;
    use chrono::{TimeZone, Utc};

    #[test]
    fn member_is_required() {
        let mut req = Request::builder("gefs")
            .init_time(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap())
            .build()
            .unwrap();
        let err = Gefs.build(&mut req).unwrap_err();
        assert!(matches!(
            err,
            FetchError::MissingField { ref field, .. } if field == "member"
        ));
    }

    #[test]
    fn perturbation_member_url() {
        let mut req = Request::builder("gefs")
            .init_time(Utc.with_ymd_and_hms(2023, 1, 1, 6, 0, 0).unwrap())
            .lead(12)
            .member(Member::Perturbation(7))
            .build()
            .unwrap();
        let template = Gefs.build(&mut req).unwrap();
        assert_eq!(
            template.source("aws").unwrap(),
            "https://noaa-gefs-pds.s3.amazonaws.com/gefs.20230101/06/atmos/pgrb2sp25/gep07.t06z.pgrb2s.0p25.f012"
        );
    }

    #[test]
    fn control_member_and_half_degree_grid() {
        let mut req = Request::builder("gefs")
            .product("pgrb2ap5")
            .init_time(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap())
            .member(Member::Control)
            .build()
            .unwrap();
        let template = Gefs.build(&mut req).unwrap();
        assert!(template
            .source("aws")
            .unwrap()
            .ends_with("pgrb2ap5/gec00.t00z.pgrb2a.0p50.f000"));
    }
}
