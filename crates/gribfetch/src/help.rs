//! Search-selector help text shown when a filter matches nothing.

use crate::models::IdxDialect;

/// Example selectors for the given index dialect.
pub fn search_help(dialect: IdxDialect) -> &'static str {
    match dialect {
        IdxDialect::Wgrib2 => WGRIB2_HELP,
        IdxDialect::Eccodes => ECCODES_HELP,
    }
}

const WGRIB2_HELP: &str = r#"The search is a regular expression matched against the index line.
Examples for wgrib2-style indexes:

    ":TMP:2 m"                           Temperature at 2 m
    ":TMP:"                              Temperature at all levels
    ":UGRD:\d+ mb"                       U wind at all pressure levels
    ":500 mb:"                           All variables on the 500 mb level
    ":APCP:"                             All accumulated precipitation fields
    ":UGRD:10 m"                         U wind component at 10 meters
    ":(?:U|V)GRD:(?:10|80) m"            U and V wind at 10 and 80 m
    ":(?:U|V)GRD:\d+ hybrid"             U and V wind at all hybrid levels
    ":(?:TMP|DPT):"                      Temperature and dew point at all levels
    ":REFC:"                             Composite reflectivity
    ":surface:"                          All variables at the surface

Regex cheatsheet: https://www.petefreitag.com/cheatsheets/regex/"#;

const ECCODES_HELP: &str = r#"The search is a regular expression matched against the index line.
Examples for eccodes-style indexes (see the ECMWF parameter database,
https://apps.ecmwf.int/codes/grib/param-db):

    ":2t:"                               2-m temperature
    ":10u:"                              10-m u wind
    ":10v:"                              10-m v wind
    ":10(?:u|v):"                        10-m u and v wind
    ":gh:"                               Geopotential height, all levels
    ":gh:500:"                           Geopotential height at 500 hPa
    ":msl:"                              Mean sea level pressure
    ":tp:"                               Total precipitation
    ":(?:t|u|v|r):"                      Temp, u/v wind, RH, all levels
    ":500:"                              All variables at 500 hPa

Regex cheatsheet: https://www.petefreitag.com/cheatsheets/regex/"#;
