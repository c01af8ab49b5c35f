//! Request description for a single GRIB2 acquisition.
//!
//! A [`Request`] pins down one model output file: which model, which
//! product stream, which initialization cycle, and which forecast lead
//! time. Everything else (mirror URLs, index dialect, local filename)
//! is derived from it by the model template registry.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};

use crate::config::AppConfig;
use crate::error::{FetchError, Result};

/// Ensemble member selector for models that publish per-member files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Member {
    /// Control run (`c00`).
    Control,
    /// Ensemble mean (`avg`).
    Mean,
    /// Ensemble spread (`spr`).
    Spread,
    /// Perturbation member (`p01`..`p30`).
    Perturbation(u32),
}

impl Member {
    /// Parse a member spec as written on a command line or in config:
    /// `c`/`c00`, `avg`/`mean`, `spr`/`spread`, or a member number.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "c" | "c00" | "control" => Ok(Member::Control),
            "avg" | "mean" => Ok(Member::Mean),
            "spr" | "spread" => Ok(Member::Spread),
            other => {
                let n: u32 = other
                    .trim_start_matches('p')
                    .parse()
                    .map_err(|_| FetchError::InvalidRequest(format!("bad member: {s:?}")))?;
                if n == 0 {
                    return Err(FetchError::InvalidRequest(
                        "member number must be positive (use 'c00' for control)".to_string(),
                    ));
                }
                Ok(Member::Perturbation(n))
            }
        }
    }

    /// The label used in remote file names (`c00`, `avg`, `spr`, `p07`).
    pub fn label(&self) -> String {
        match self {
            Member::Control => "c00".to_string(),
            Member::Mean => "avg".to_string(),
            Member::Spread => "spr".to_string(),
            Member::Perturbation(n) => format!("p{n:02}"),
        }
    }
}

impl std::fmt::Display for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

/// Parse a forecast lead time given either as whole hours (`"6"`) or as
/// a duration string (`"6h"`, `"90m"`), rounded to the nearest hour.
pub fn parse_lead(s: &str) -> Result<u32> {
    let s = s.trim();
    if let Ok(hours) = s.parse::<u32>() {
        return Ok(hours);
    }
    let (split, unit) = match s.char_indices().last() {
        Some((i, c)) => (i, c.to_ascii_lowercase()),
        None => {
            return Err(FetchError::InvalidRequest("lead time is empty".to_string()));
        }
    };
    let value: f64 = s[..split]
        .trim()
        .parse()
        .map_err(|_| FetchError::InvalidRequest(format!("bad lead time: {s:?}")))?;
    let minutes = match unit {
        'h' => value * 60.0,
        'm' => value,
        'd' => value * 24.0 * 60.0,
        _ => {
            return Err(FetchError::InvalidRequest(format!(
                "bad lead time unit in {s:?} (use h, m, or d)"
            )))
        }
    };
    if minutes < 0.0 {
        return Err(FetchError::InvalidRequest(
            "lead time cannot be negative".to_string(),
        ));
    }
    Ok((minutes / 60.0).round() as u32)
}

/// One fully-specified acquisition request.
///
/// `init_time` and `lead` are the canonical pair; the valid time is
/// always derived as `init_time + lead`.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Model identifier, lowercase (`hrrr`, `gfs`, `ifs`, ...).
    pub model: String,
    /// Product stream. `None` defaults to the first product declared by
    /// the model template during evaluation.
    pub product: Option<String>,
    /// Model initialization (cycle) time, UTC.
    pub init_time: DateTime<Utc>,
    /// Forecast lead time in whole hours.
    pub lead: u32,
    /// Source priority order. `None` uses the template's own order.
    pub priority: Option<Vec<String>>,
    /// Root of the local cache.
    pub save_dir: PathBuf,
    /// Skip the local cache when resolving sources.
    pub overwrite: bool,
    /// Ensemble member, where the template requires one.
    pub member: Option<Member>,
    /// Free-form template-specific fields (`storm_id`, `nest`,
    /// `resolution`, ...). The template consumes whichever it needs.
    pub extras: BTreeMap<String, String>,
}

impl Request {
    pub fn builder(model: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(model)
    }

    /// The forecast valid time (`init_time + lead`).
    pub fn valid_time(&self) -> DateTime<Utc> {
        self.init_time + Duration::hours(self.lead as i64)
    }

    /// A one-line identity string used in log and error messages.
    pub fn ident(&self) -> String {
        format!(
            "model={} init={} F{:02}",
            self.model,
            self.init_time.format("%Y-%m-%d %H:%MZ"),
            self.lead
        )
    }

    /// Stable identity key used to memoize parsed inventories.
    pub(crate) fn cache_key(&self) -> String {
        let mut key = format!(
            "{}|{}|{}|{}",
            self.model,
            self.product.as_deref().unwrap_or(""),
            self.init_time.format("%Y%m%d%H%M"),
            self.lead,
        );
        if let Some(member) = &self.member {
            key.push('|');
            key.push_str(&member.label());
        }
        for (k, v) in &self.extras {
            key.push('|');
            key.push_str(k);
            key.push('=');
            key.push_str(v);
        }
        key
    }

    /// Look up a free-form field, erroring with `MissingField` if the
    /// template needs it and the request does not carry it.
    pub fn require_extra(&self, field: &str) -> Result<&str> {
        self.extras
            .get(field)
            .map(String::as_str)
            .ok_or_else(|| FetchError::MissingField {
                model: self.model.clone(),
                field: field.to_string(),
            })
    }
}

/// Builder for [`Request`]. Exactly one of `init_time` / `valid_time`
/// must be given; the other is derived from the lead time.
#[derive(Debug, Clone, Default)]
pub struct RequestBuilder {
    model: String,
    product: Option<String>,
    init_time: Option<DateTime<Utc>>,
    valid_time: Option<DateTime<Utc>>,
    lead: u32,
    priority: Option<Vec<String>>,
    save_dir: Option<PathBuf>,
    overwrite: bool,
    member: Option<Member>,
    extras: BTreeMap<String, String>,
}

impl RequestBuilder {
    pub fn new(model: impl Into<String>) -> Self {
        RequestBuilder {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Seed builder defaults (product, priority, save_dir, overwrite)
    /// from the user configuration file.
    pub fn from_config(model: impl Into<String>, config: &AppConfig) -> Self {
        RequestBuilder {
            model: model.into(),
            product: config.product.clone(),
            lead: config.fxx,
            priority: config.priority.clone(),
            save_dir: Some(config.save_dir.clone()),
            overwrite: config.overwrite,
            ..Default::default()
        }
    }

    pub fn product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }

    pub fn init_time(mut self, t: DateTime<Utc>) -> Self {
        self.init_time = Some(t);
        self
    }

    pub fn valid_time(mut self, t: DateTime<Utc>) -> Self {
        self.valid_time = Some(t);
        self
    }

    pub fn lead(mut self, hours: u32) -> Self {
        self.lead = hours;
        self
    }

    pub fn priority<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.priority = Some(sources.into_iter().map(Into::into).collect());
        self
    }

    pub fn save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = Some(dir.into());
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn member(mut self, member: Member) -> Self {
        self.member = Some(member);
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<Request> {
        let model = self.model.trim().to_lowercase();
        if model.is_empty() {
            return Err(FetchError::InvalidRequest("model is required".to_string()));
        }

        let init_time = match (self.init_time, self.valid_time) {
            (Some(init), None) => init,
            (None, Some(valid)) => valid - Duration::hours(self.lead as i64),
            (Some(_), Some(_)) => {
                return Err(FetchError::InvalidRequest(
                    "give either init_time or valid_time, not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(FetchError::InvalidRequest(
                    "either init_time or valid_time is required".to_string(),
                ))
            }
        };

        let priority = self
            .priority
            .map(|p| p.iter().map(|s| s.trim().to_lowercase()).collect());

        let save_dir = self
            .save_dir
            .unwrap_or_else(crate::config::default_save_dir);

        Ok(Request {
            model,
            product: self.product,
            init_time,
            lead: self.lead,
            priority,
            save_dir,
            overwrite: self.overwrite,
            member: self.member,
            extras: self.extras,
        })
    }
}

/// Drop `nomads` from a priority list when the cycle is older than the
/// NOMADS retention window (14 days); the mirror does not keep old runs.
pub(crate) fn age_out_nomads(priority: &mut Option<Vec<String>>, init_time: DateTime<Utc>) {
    if let Some(priority) = priority {
        let expired = Utc::now() - Duration::days(14);
        if init_time < expired {
            priority.retain(|s| s != "nomads");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn lead_accepts_hours_and_duration_strings() {
        assert_eq!(parse_lead("6").unwrap(), 6);
        assert_eq!(parse_lead("6h").unwrap(), 6);
        assert_eq!(parse_lead("0").unwrap(), 0);
        assert_eq!(parse_lead("90m").unwrap(), 2);
        assert_eq!(parse_lead("1d").unwrap(), 24);
        assert!(parse_lead("six").is_err());
        assert!(parse_lead("-3h").is_err());
    }

    #[test]
    fn valid_time_derives_init() {
        let valid = Utc.with_ymd_and_hms(2023, 1, 1, 12, 0, 0).unwrap();
        let req = Request::builder("HRRR")
            .valid_time(valid)
            .lead(6)
            .build()
            .unwrap();
        assert_eq!(req.model, "hrrr");
        assert_eq!(
            req.init_time,
            Utc.with_ymd_and_hms(2023, 1, 1, 6, 0, 0).unwrap()
        );
        assert_eq!(req.valid_time(), valid);
    }

    #[test]
    fn requires_exactly_one_time() {
        assert!(Request::builder("hrrr").build().is_err());
        let t = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        assert!(Request::builder("hrrr")
            .init_time(t)
            .valid_time(t)
            .build()
            .is_err());
    }

    #[test]
    fn nomads_ages_out_after_fourteen_days() {
        let mut priority = Some(vec!["aws".to_string(), "nomads".to_string()]);
        age_out_nomads(&mut priority, Utc::now() - Duration::days(20));
        assert_eq!(priority.unwrap(), vec!["aws".to_string()]);

        let mut priority = Some(vec!["aws".to_string(), "nomads".to_string()]);
        age_out_nomads(&mut priority, Utc::now() - Duration::days(2));
        assert_eq!(
            priority.unwrap(),
            vec!["aws".to_string(), "nomads".to_string()]
        );
    }

    #[test]
    fn member_labels() {
        assert_eq!(Member::parse("c00").unwrap(), Member::Control);
        assert_eq!(Member::parse("mean").unwrap(), Member::Mean);
        assert_eq!(Member::parse("5").unwrap(), Member::Perturbation(5));
        assert_eq!(Member::parse("p12").unwrap().label(), "p12");
        assert!(Member::parse("0").is_err());
    }

    #[test]
    fn cache_key_distinguishes_members_and_extras() {
        let t = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let base = Request::builder("gefs")
            .product("pgrb2sp25")
            .init_time(t)
            .build()
            .unwrap();
        let mut with_member = base.clone();
        with_member.member = Some(Member::Perturbation(3));
        assert_ne!(base.cache_key(), with_member.cache_key());
    }
}
