#![warn(clippy::unwrap_used)]

//! Read-side statistics over clicks, impressions and conversions.

pub mod params;
pub mod statistics;

pub use params::{StatsParams, StatsQuery};
pub use statistics::{click_through_rate, StatisticsAggregator, StatisticsReport};
