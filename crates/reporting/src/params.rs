//! Statistics query parameters. Malformed dates never fail the request:
//! the bound is dropped and a warning is returned alongside the report.

use adserve_core::types::DateRange;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::warn;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Raw query string values as received.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsParams {
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub selected_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsQuery {
    pub range: DateRange,
    /// When set, the timeline is bucketed by hour for this day.
    pub selected_date: Option<NaiveDate>,
    pub warnings: Vec<String>,
}

impl StatsQuery {
    pub fn parse(params: &StatsParams) -> Self {
        let mut warnings = Vec::new();
        let start = parse_date_param("start_date", params.start_date.as_deref(), &mut warnings);
        let end = parse_date_param("end_date", params.end_date.as_deref(), &mut warnings);
        let selected_date = parse_date_param(
            "selected_date",
            params.selected_date.as_deref(),
            &mut warnings,
        );
        Self {
            range: DateRange::new(start, end),
            selected_date,
            warnings,
        }
    }
}

fn parse_date_param(
    name: &str,
    raw: Option<&str>,
    warnings: &mut Vec<String>,
) -> Option<NaiveDate> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    match NaiveDate::parse_from_str(raw, DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(e) => {
            warn!(param = name, value = raw, error = %e, "Ignoring malformed date parameter");
            warnings.push(format!("Invalid date format for '{name}'. Use YYYY-MM-DD."));
            None
        }
    }
}
