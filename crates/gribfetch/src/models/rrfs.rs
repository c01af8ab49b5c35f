//! Rapid Refresh Forecast System ensemble template. Requires a
//! numbered `member`.

use super::{
    normalize_product, owned_pairs, remote_basename, IdxDialect, ModelTemplate, Template,
};
use crate::error::{FetchError, Result};
use crate::request::{Member, Request};

pub struct Rrfs;

impl ModelTemplate for Rrfs {
    fn model_id(&self) -> &str {
        "rrfs"
    }

    fn build(&self, req: &mut Request) -> Result<Template> {
        let products = [("conus", "CONUS 3-km resolution")];
        normalize_product(req, &products)?;

        let member = match req.member {
            Some(Member::Perturbation(n)) => n,
            Some(_) => {
                return Err(FetchError::InvalidRequest(
                    "RRFS member must be a member number".to_string(),
                ))
            }
            None => {
                return Err(FetchError::MissingField {
                    model: req.model.clone(),
                    field: "member".to_string(),
                })
            }
        };

        let date = req.init_time.format("%Y%m%d");
        let hour = req.init_time.format("%H");
        let sources = vec![(
            "aws".to_string(),
            format!(
                "https://noaa-rrfs-pds.s3.amazonaws.com/rrfs.{date}/{hour}/mem{member:02}/rrfs.t{hour}z.conusf{:03}.grib2",
                req.lead
            ),
        )];

        Ok(Template {
            description: "Rapid Refresh Forecast System (RRFS) Ensemble".to_string(),
            details: owned_pairs(&[(
                "aws",
                "https://registry.opendata.aws/noaa-rrfs/",
            )]),
            products: owned_pairs(&products),
            // Basename alone is ambiguous across members.
            local_filename: format!("mem{member:02}_{}", remote_basename(&sources[0].1)),
            sources,
            idx_suffixes: vec![".idx".to_string(), ".grib2.idx".to_string()],
            idx_dialect: IdxDialect::Wgrib2,
        })
    }
}
