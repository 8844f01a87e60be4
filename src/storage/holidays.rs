//! Holiday file
//!
//! Public holidays are kept in `.cascade/holidays.toml`:
//!
//! ```toml
//! [[holiday]]
//! date = "2025-01-27"
//! name = "Australia Day"
//! regions = []            # empty: every region
//!
//! [[holiday]]
//! date = "2025-08-13"
//! name = "Ekka"
//! regions = ["QLD"]
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::domain::{CalendarError, HolidayProvider, Region};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holiday {
    pub date: NaiveDate,
    pub name: String,
    #[serde(default)]
    pub regions: Vec<String>,
}

impl Holiday {
    /// Returns true if the holiday is observed in `region`
    pub fn applies_to(&self, region: &Region) -> bool {
        self.regions.is_empty()
            || self
                .regions
                .iter()
                .any(|r| r.eq_ignore_ascii_case(region.code()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayFile {
    #[serde(default, rename = "holiday")]
    pub holidays: Vec<Holiday>,
}

impl HolidayFile {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse holiday file")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read holiday file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Dates observed in `region` within the given years
    pub fn dates_for(&self, region: &Region, years: &RangeInclusive<i32>) -> BTreeSet<NaiveDate> {
        self.holidays
            .iter()
            .filter(|h| years.contains(&h.date.year()) && h.applies_to(region))
            .map(|h| h.date)
            .collect()
    }
}

/// Reads holidays from a file on each request
#[derive(Debug, Clone)]
pub struct HolidaySource {
    path: PathBuf,
}

impl HolidaySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HolidayProvider for HolidaySource {
    fn holidays(
        &self,
        region: &Region,
        years: RangeInclusive<i32>,
    ) -> Result<BTreeSet<NaiveDate>, CalendarError> {
        if !self.path.exists() {
            return Err(CalendarError::Unavailable(format!(
                "{} not found",
                self.path.display()
            )));
        }

        let file = HolidayFile::load(&self.path)
            .map_err(|e| CalendarError::Unavailable(format!("{:#}", e)))?;
        Ok(file.dates_for(region, &years))
    }
}
