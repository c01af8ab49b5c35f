//! Index-file parsing and filtering.
//!
//! Two index dialects exist in the wild. NCEP-style indexes are the
//! colon-separated text emitted by `wgrib2 -s`:
//!
//! ```text
//! 1:0:d=2023010106:REFC:entire atmosphere:anl:
//! 2:375155:d=2023010106:RETOP:cloud top:anl:
//! ```
//!
//! ECMWF open data ships eccodes-style indexes instead, one JSON object
//! per line with `_offset`/`_length` byte ranges. Both normalize into
//! the same [`Inventory`] table so a single regex language works across
//! models.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use tracing::warn;

use crate::error::{FetchError, Result};
use crate::help::search_help;
use crate::models::IdxDialect;

/// Dialect-specific descriptive columns of one GRIB message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageAttrs {
    Wgrib2 {
        variable: String,
        level: String,
        forecast_time: String,
        /// Trailing fields beyond position 6, preserved verbatim.
        extra: Vec<String>,
    },
    Eccodes {
        param: String,
        levelist: String,
        levtype: String,
        number: String,
        domain: String,
        expver: String,
        mars_class: String,
        mars_type: String,
        stream: String,
    },
}

/// One GRIB message as listed by the index file.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryRecord {
    /// 1-based GRIB message index within the file. Sub-messages (rare,
    /// seen in some RAP products) share the number of their parent.
    pub message: u32,
    /// Byte offset where the message begins.
    pub start_byte: u64,
    /// End of the message's byte range; `None` for the final record
    /// (open-ended, "to end of file").
    pub end_byte: Option<u64>,
    /// Cycle (initialization) time decoded from the index.
    pub reference_time: DateTime<Utc>,
    /// `reference_time + lead`.
    pub valid_time: DateTime<Utc>,
    /// Dialect-specific descriptive columns.
    pub attrs: MessageAttrs,
    /// The string the user's selector regex is matched against.
    pub search_key: String,
}

impl InventoryRecord {
    /// The `Range` header value for this record alone.
    pub fn byte_range(&self) -> String {
        match self.end_byte {
            Some(end) => format!("{}-{end}", self.start_byte),
            None => format!("{}-", self.start_byte),
        }
    }
}

/// A parsed, normalized index file.
#[derive(Debug, Clone)]
pub struct Inventory {
    pub dialect: IdxDialect,
    pub records: Vec<InventoryRecord>,
}

impl Inventory {
    /// Parse index text in the given dialect. `lead` is the request
    /// lead time in hours, used to derive wgrib2 valid times (eccodes
    /// indexes carry their own step).
    pub fn parse(text: &str, dialect: IdxDialect, lead: u32) -> Result<Self> {
        let records = match dialect {
            IdxDialect::Wgrib2 => parse_wgrib2(text, lead)?,
            IdxDialect::Eccodes => parse_eccodes(text)?,
        };
        Ok(Inventory { dialect, records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Message numbers of every record, in table order.
    pub fn messages(&self) -> Vec<u32> {
        self.records.iter().map(|r| r.message).collect()
    }

    /// Keep the records whose `search_key` matches the selector. A
    /// `None` or `":"` selector passes everything through. A selector
    /// that matches nothing is not an error: a help block is emitted on
    /// the diagnostic channel and an empty table returned.
    pub fn filter(&self, selector: Option<&str>) -> Result<Inventory> {
        let pattern = match selector {
            None | Some(":") => return Ok(self.clone()),
            Some(pattern) => pattern,
        };

        let re = Regex::new(pattern)?;
        let records: Vec<InventoryRecord> = self
            .records
            .iter()
            .filter(|r| re.is_match(&r.search_key))
            .cloned()
            .collect();

        if records.is_empty() {
            warn!(
                search = %pattern,
                "No GRIB messages matched the search; there might be something wrong with it\n{}",
                search_help(self.dialect)
            );
        }

        Ok(Inventory {
            dialect: self.dialect,
            records,
        })
    }
}

fn bad_dialect(dialect: &'static str, line: usize, message: impl Into<String>) -> FetchError {
    FetchError::BadDialect {
        dialect,
        line,
        message: message.into(),
    }
}

/// Parse the `d=YYYYMMDDHH[MM]` reference-time field.
fn parse_reference_time(digits: &str, line: usize) -> Result<DateTime<Utc>> {
    let padded = match digits.len() {
        10 => format!("{digits}00"),
        12 => digits.to_string(),
        _ => {
            return Err(bad_dialect(
                "wgrib2",
                line,
                format!("bad reference time {digits:?}"),
            ))
        }
    };
    let naive = NaiveDateTime::parse_from_str(&padded, "%Y%m%d%H%M")
        .map_err(|e| bad_dialect("wgrib2", line, format!("bad reference time: {e}")))?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Build the searchable key: the descriptive columns joined by `:`,
/// prefixed with `:`, with empty segments collapsed.
fn build_search_key<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    let mut key = String::new();
    for segment in segments {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        key.push(':');
        key.push_str(segment);
    }
    key
}

fn parse_wgrib2(text: &str, lead: u32) -> Result<Vec<InventoryRecord>> {
    let mut records: Vec<InventoryRecord> = Vec::new();
    let mut seen_tokens: std::collections::HashSet<String> = std::collections::HashSet::new();

    for (i, raw_line) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = raw_line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() < 3 {
            return Err(bad_dialect(
                "wgrib2",
                line_no,
                format!("expected at least 3 colon-separated fields, got {}", fields.len()),
            ));
        }

        // wgrib2 numbers sub-messages as e.g. "5.1"; keep the parent
        // message number but reject exact duplicates (corrupt index).
        let msg_token = fields[0].trim();
        if !seen_tokens.insert(msg_token.to_string()) {
            return Err(bad_dialect(
                "wgrib2",
                line_no,
                format!("duplicate message number {msg_token:?}"),
            ));
        }
        let message: u32 = msg_token
            .split('.')
            .next()
            .unwrap_or(msg_token)
            .parse()
            .map_err(|_| {
                bad_dialect("wgrib2", line_no, format!("bad message number {msg_token:?}"))
            })?;

        let start_byte: u64 = fields[1].trim().parse().map_err(|_| {
            bad_dialect("wgrib2", line_no, format!("bad start byte {:?}", fields[1]))
        })?;

        let date_field = fields[2].trim();
        let digits = date_field.strip_prefix("d=").ok_or_else(|| {
            bad_dialect("wgrib2", line_no, format!("expected d= field, got {date_field:?}"))
        })?;
        let reference_time = parse_reference_time(digits, line_no)?;

        let variable = fields.get(3).map(|s| s.trim()).unwrap_or("").to_string();
        let level = fields.get(4).map(|s| s.trim()).unwrap_or("").to_string();
        let forecast_time = fields.get(5).map(|s| s.trim()).unwrap_or("").to_string();
        let extra: Vec<String> = fields
            .iter()
            .skip(6)
            .map(|s| s.trim().to_string())
            .collect();

        let search_key = build_search_key(
            std::iter::once(variable.as_str())
                .chain(std::iter::once(level.as_str()))
                .chain(std::iter::once(forecast_time.as_str()))
                .chain(extra.iter().map(String::as_str)),
        );

        records.push(InventoryRecord {
            message,
            start_byte,
            end_byte: None,
            reference_time,
            valid_time: reference_time + Duration::hours(lead as i64),
            attrs: MessageAttrs::Wgrib2 {
                variable,
                level,
                forecast_time,
                extra,
            },
            search_key,
        });
    }

    // Close each range against the next record's offset; the final
    // record stays open-ended.
    for i in 0..records.len() {
        if i + 1 < records.len() {
            records[i].end_byte = Some(records[i + 1].start_byte.saturating_sub(1));
        }
    }

    Ok(records)
}

fn json_str(value: &serde_json::Value, key: &str) -> String {
    match value.get(key) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn json_u64(value: &serde_json::Value, key: &str, line: usize) -> Result<u64> {
    match value.get(key) {
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| bad_dialect("eccodes", line, format!("bad {key} value"))),
        Some(serde_json::Value::String(s)) => s
            .parse()
            .map_err(|_| bad_dialect("eccodes", line, format!("bad {key} value {s:?}"))),
        _ => Err(bad_dialect("eccodes", line, format!("missing {key} key"))),
    }
}

fn parse_eccodes(text: &str) -> Result<Vec<InventoryRecord>> {
    let mut records = Vec::new();

    for (i, raw_line) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = raw_line.trim_end_matches('\r').trim();
        if line.is_empty() {
            continue;
        }

        let value: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| bad_dialect("eccodes", line_no, format!("bad JSON: {e}")))?;

        let start_byte = json_u64(&value, "_offset", line_no)?;
        let length = json_u64(&value, "_length", line_no)?;

        let date = json_str(&value, "date");
        let time = json_str(&value, "time");
        let stamp = format!("{date}{:0>4}", time);
        let naive = NaiveDateTime::parse_from_str(&stamp, "%Y%m%d%H%M").map_err(|e| {
            bad_dialect("eccodes", line_no, format!("bad date/time {stamp:?}: {e}"))
        })?;
        let reference_time = Utc.from_utc_datetime(&naive);

        let step: i64 = {
            let raw = json_str(&value, "step");
            raw.parse().map_err(|_| {
                bad_dialect("eccodes", line_no, format!("bad step value {raw:?}"))
            })?
        };

        let param = json_str(&value, "param");
        let levelist = json_str(&value, "levelist");
        let levtype = json_str(&value, "levtype");
        let number = json_str(&value, "number");
        let domain = json_str(&value, "domain");
        let expver = json_str(&value, "expver");
        let mars_class = json_str(&value, "class");
        let mars_type = json_str(&value, "type");
        let stream = json_str(&value, "stream");

        let search_key = build_search_key([
            param.as_str(),
            levelist.as_str(),
            levtype.as_str(),
            number.as_str(),
            domain.as_str(),
            expver.as_str(),
            mars_class.as_str(),
            mars_type.as_str(),
            stream.as_str(),
        ]);

        records.push(InventoryRecord {
            message: (records.len() + 1) as u32,
            start_byte,
            end_byte: Some(start_byte + length),
            reference_time,
            valid_time: reference_time + Duration::hours(step),
            attrs: MessageAttrs::Eccodes {
                param,
                levelist,
                levtype,
                number,
                domain,
                expver,
                mars_class,
                mars_type,
                stream,
            },
            search_key,
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WGRIB2_IDX: &str = "\
1:0:d=2023010106:REFC:entire atmosphere:anl:
2:375155:d=2023010106:RETOP:cloud top:anl:
3:563942:d=2023010106:TMP:2 m above ground:anl:
4:780377:d=2023010106:UGRD:10 m above ground:anl:
5:1067899:d=2023010106:VGRD:10 m above ground:anl:
";

    #[test]
    fn wgrib2_invariants() {
        let inv = Inventory::parse(WGRIB2_IDX, IdxDialect::Wgrib2, 0).unwrap();
        assert_eq!(inv.len(), 5);
        assert_eq!(inv.messages(), vec![1, 2, 3, 4, 5]);

        for pair in inv.records.windows(2) {
            assert!(pair[0].start_byte < pair[1].start_byte);
            assert_eq!(pair[0].end_byte, Some(pair[1].start_byte - 1));
            assert_eq!(pair[0].reference_time, pair[1].reference_time);
        }
        assert_eq!(inv.records.last().unwrap().end_byte, None);

        let tmp = &inv.records[2];
        assert_eq!(tmp.search_key, ":TMP:2 m above ground:anl");
        assert_eq!(
            tmp.reference_time,
            Utc.with_ymd_and_hms(2023, 1, 1, 6, 0, 0).unwrap()
        );
    }

    #[test]
    fn wgrib2_lead_sets_valid_time() {
        let text = "1:0:d=2023010106:TMP:surface:6 hour fcst:\n";
        let inv = Inventory::parse(text, IdxDialect::Wgrib2, 6).unwrap();
        assert_eq!(
            inv.records[0].valid_time,
            Utc.with_ymd_and_hms(2023, 1, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn crlf_and_missing_trailing_newline_parse_identically() {
        let lf = WGRIB2_IDX;
        let crlf = WGRIB2_IDX.replace('\n', "\r\n");
        let no_trailing = WGRIB2_IDX.trim_end();

        let a = Inventory::parse(lf, IdxDialect::Wgrib2, 0).unwrap();
        let b = Inventory::parse(&crlf, IdxDialect::Wgrib2, 0).unwrap();
        let c = Inventory::parse(no_trailing, IdxDialect::Wgrib2, 0).unwrap();
        assert_eq!(a.records, b.records);
        assert_eq!(a.records, c.records);
    }

    #[test]
    fn twelve_digit_reference_time() {
        let text = "1:0:d=202301010630:TMP:surface:anl:\n";
        let inv = Inventory::parse(text, IdxDialect::Wgrib2, 0).unwrap();
        assert_eq!(
            inv.records[0].reference_time,
            Utc.with_ymd_and_hms(2023, 1, 1, 6, 30, 0).unwrap()
        );
    }

    #[test]
    fn duplicate_message_numbers_rejected() {
        let text = "\
1:0:d=2023010106:TMP:surface:anl:
1:100:d=2023010106:DPT:surface:anl:
";
        let err = Inventory::parse(text, IdxDialect::Wgrib2, 0).unwrap_err();
        assert!(matches!(err, FetchError::BadDialect { .. }));
    }

    #[test]
    fn sub_messages_keep_parent_number() {
        let text = "\
1:0:d=2023010106:TMP:surface:anl:
2:100:d=2023010106:UGRD:10 m above ground:anl:
2.1:100:d=2023010106:VGRD:10 m above ground:anl:
3:300:d=2023010106:GUST:surface:anl:
";
        let inv = Inventory::parse(text, IdxDialect::Wgrib2, 0).unwrap();
        assert_eq!(inv.messages(), vec![1, 2, 2, 3]);
        // The sub-message shares its parent's offset, so the parent's
        // computed range is inverted; grouping skips it later.
        assert_eq!(inv.records[1].end_byte, Some(99));
    }

    #[test]
    fn garbage_is_bad_dialect() {
        assert!(matches!(
            Inventory::parse("not an index", IdxDialect::Wgrib2, 0).unwrap_err(),
            FetchError::BadDialect { .. }
        ));
        assert!(matches!(
            Inventory::parse("{not json", IdxDialect::Eccodes, 0).unwrap_err(),
            FetchError::BadDialect { .. }
        ));
    }

    #[test]
    fn filter_selects_matching_rows() {
        let inv = Inventory::parse(WGRIB2_IDX, IdxDialect::Wgrib2, 0).unwrap();

        let tmp = inv.filter(Some(":TMP:2 m above ground:")).unwrap();
        assert_eq!(tmp.len(), 1);
        assert_eq!(tmp.records[0].message, 3);

        let wind = inv.filter(Some(":(?:U|V)GRD:10 m")).unwrap();
        assert_eq!(wind.messages(), vec![4, 5]);

        let all = inv.filter(None).unwrap();
        assert_eq!(all.len(), inv.len());
        let all = inv.filter(Some(":")).unwrap();
        assert_eq!(all.len(), inv.len());

        let none = inv.filter(Some(":NOPE:")).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn bad_selector_regex_is_an_error() {
        let inv = Inventory::parse(WGRIB2_IDX, IdxDialect::Wgrib2, 0).unwrap();
        assert!(matches!(
            inv.filter(Some("(unclosed")).unwrap_err(),
            FetchError::BadSelector(_)
        ));
    }

    const ECCODES_IDX: &str = r#"{"domain": "g", "date": "20240301", "time": "0000", "expver": "0001", "class": "od", "type": "fc", "stream": "oper", "step": "0", "levtype": "sfc", "param": "10u", "_offset": 0, "_length": 609046}
{"domain": "g", "date": "20240301", "time": "0000", "expver": "0001", "class": "od", "type": "fc", "stream": "oper", "step": "0", "levtype": "sfc", "param": "10v", "_offset": 609046, "_length": 609046}
{"domain": "g", "date": "20240301", "time": "0000", "expver": "0001", "class": "od", "type": "fc", "stream": "oper", "step": "0", "levtype": "pl", "levelist": "500", "param": "gh", "_offset": 1218092, "_length": 609046}
"#;

    #[test]
    fn eccodes_rows_and_ranges() {
        let inv = Inventory::parse(ECCODES_IDX, IdxDialect::Eccodes, 0).unwrap();
        assert_eq!(inv.len(), 3);
        assert_eq!(inv.messages(), vec![1, 2, 3]);

        let first = &inv.records[0];
        assert_eq!(first.start_byte, 0);
        assert_eq!(first.end_byte, Some(609046));
        assert_eq!(
            first.reference_time,
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(first.valid_time, first.reference_time);
        assert!(first.search_key.contains(":10u:"));
        assert!(inv.records[1].search_key.contains(":10v:"));
    }

    #[test]
    fn eccodes_search_key_includes_level() {
        let inv = Inventory::parse(ECCODES_IDX, IdxDialect::Eccodes, 0).unwrap();
        let gh = inv.filter(Some(":gh:500:")).unwrap();
        assert_eq!(gh.len(), 1);
        assert_eq!(gh.records[0].message, 3);
    }

    #[test]
    fn eccodes_step_offsets_valid_time() {
        let line = r#"{"domain": "g", "date": "20240301", "time": "1200", "step": "24", "levtype": "sfc", "param": "2t", "_offset": 0, "_length": 100}"#;
        let inv = Inventory::parse(line, IdxDialect::Eccodes, 0).unwrap();
        assert_eq!(
            inv.records[0].valid_time,
            Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn filter_matches_ifs_wind_selector() {
        let inv = Inventory::parse(ECCODES_IDX, IdxDialect::Eccodes, 0).unwrap();
        let wind = inv.filter(Some(":10(?:u|v):")).unwrap();
        assert_eq!(wind.len(), 2);
    }
}
