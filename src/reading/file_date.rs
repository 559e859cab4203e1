//! Dates encoded in raster file names.
//!
//! Archive rasters carry their date as the trailing, dot separated,
//! fixed-width fields of the file stem:
//!
//! | cadence | fields       | example                              |
//! |---------|--------------|--------------------------------------|
//! | daily   | `YYYY.MM.DD` | `chirps-v2.0.2010.01.01.tif.gz`      |
//! | monthly | `YYYY.MM`    | `chirps-v2.0.2010.01.tif.gz`         |
//!
//! The suffixes `.gz`, `.tif` and `.masked` are stripped before the fields are
//! read, so the same parser serves downloads, raw rasters and clipped rasters.

use std::fmt;

use chrono::NaiveDate;

use crate::error::RainError;

const KNOWN_SUFFIXES: [&str; 3] = [".gz", ".tif", ".masked"];
const RASTER_EXTENSION: &str = ".tif";
const MASKED_SUFFIX: &str = ".masked.tif";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Date of a single raster. `day` is `None` for monthly products.
pub struct FileDate {
    pub year: i32,
    pub month: u32,
    pub day: Option<u32>,
}

impl FileDate {
    pub fn from_file(file_name: &str) -> Result<Self, RainError> {
        let stem = strip_known_suffixes(file_name);
        let parts: Vec<&str> = stem.split('.').collect();

        if let [.., year, month, day] = parts.as_slice() {
            if is_field(year, 4) && is_field(month, 2) && is_field(day, 2) {
                return Self::daily(file_name, year, month, day);
            }
        }
        if let [.., year, month] = parts.as_slice() {
            if is_field(year, 4) && is_field(month, 2) {
                return Self::monthly(file_name, year, month);
            }
        }

        Err(RainError::malformed(
            file_name,
            "expected trailing YYYY.MM.DD or YYYY.MM date fields",
        ))
    }

    fn daily(file_name: &str, year: &str, month: &str, day: &str) -> Result<Self, RainError> {
        let (year, month, day) = (parse(year)?, parse(month)? as u32, parse(day)? as u32);
        NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| RainError::malformed(file_name, "not a calendar date"))?;

        Ok(FileDate {
            year,
            month,
            day: Some(day),
        })
    }

    fn monthly(file_name: &str, year: &str, month: &str) -> Result<Self, RainError> {
        let (year, month) = (parse(year)?, parse(month)? as u32);
        if !(1..=12).contains(&month) {
            return Err(RainError::malformed(file_name, "month out of range"));
        }

        Ok(FileDate {
            year,
            month,
            day: None,
        })
    }
}

impl fmt::Display for FileDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.day {
            Some(day) => write!(f, "{:04}.{:02}.{:02}", self.year, self.month, day),
            None => write!(f, "{:04}.{:02}", self.year, self.month),
        }
    }
}

/// True for file names with the raster extension.
pub fn is_raster(file_name: &str) -> bool {
    file_name.ends_with(RASTER_EXTENSION)
}

/// Name of the clipped raster produced from `file_name`.
pub fn masked_name(file_name: &str) -> String {
    let stem = file_name
        .strip_suffix(RASTER_EXTENSION)
        .unwrap_or(file_name);
    format!("{}{}", stem, MASKED_SUFFIX)
}

fn strip_known_suffixes(file_name: &str) -> &str {
    let mut stem = file_name;
    while let Some(stripped) = KNOWN_SUFFIXES
        .iter()
        .find_map(|suffix| stem.strip_suffix(suffix))
    {
        stem = stripped;
    }
    stem
}

fn is_field(s: &str, width: usize) -> bool {
    s.len() == width && s.bytes().all(|b| b.is_ascii_digit())
}

// Fields are checked by `is_field` first, so this only fails on overflow.
fn parse(s: &str) -> Result<i32, RainError> {
    s.parse()
        .map_err(|_| RainError::malformed(s, "field is not a number"))
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn should_parse_daily_names() {
        let raw = FileDate::from_file("chirps-v2.0.2010.01.31.tif").unwrap();
        let gz = FileDate::from_file("chirps-v2.0.2010.01.31.tif.gz").unwrap();
        let masked = FileDate::from_file("chirps-v2.0.2010.01.31.masked.tif").unwrap();

        let expected = FileDate {
            year: 2010,
            month: 1,
            day: Some(31),
        };
        assert_eq!(raw, expected);
        assert_eq!(gz, expected);
        assert_eq!(masked, expected);
        assert_eq!(raw.to_string(), "2010.01.31");
    }

    #[test]
    fn should_parse_monthly_names() {
        let date = FileDate::from_file("chirps-v2.0.1999.12.tif.gz").unwrap();

        assert_eq!(date.year, 1999);
        assert_eq!(date.month, 12);
        assert_eq!(date.day, None);
        assert_eq!(date.to_string(), "1999.12");
    }

    #[test]
    fn should_reject_malformed_names() {
        for name in ["aoi.geojson", "chirps.tif", "chirps-v2.0.2010.13.tif", "x.2010.02.30.tif"] {
            let err = FileDate::from_file(name).unwrap_err();
            assert!(
                matches!(err, RainError::MalformedFileName { .. }),
                "{name} gave {err}"
            );
        }
    }

    #[test]
    fn should_name_masked_outputs() {
        assert_eq!(
            masked_name("chirps-v2.0.2010.01.01.tif"),
            "chirps-v2.0.2010.01.01.masked.tif"
        );
        assert!(is_raster("chirps-v2.0.2010.01.01.masked.tif"));
        assert!(!is_raster("chirps-v2.0.2010.01.01.tif.gz"));
    }
}
