//! Click, impression and conversion rollups for the statistics endpoint.

use crate::params::StatsQuery;
use adserve_core::types::{AdId, Click, Conversion, DateRange};
use adserve_core::AdServeResult;
use adserve_store::AdRepository;
use chrono::{NaiveDate, Timelike};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct StatisticsReport {
    pub total_clicks: u64,
    pub unique_clicks: u64,
    pub ads: Vec<AdStats>,
    pub timeline: Timeline,
    pub impressions: Vec<DailyImpressions>,
    pub conversions: ConversionSeries,
    pub start_date: String,
    pub end_date: String,
    pub selected_date: String,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AdStats {
    pub ad_id: AdId,
    pub name: String,
    /// Clicks inside the requested range.
    pub clicks: u64,
    pub unique_clicks: u64,
    /// Lifetime impression counter.
    pub impressions: u64,
    /// Lifetime CTR in percent, two decimals.
    pub ctr: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimelinePoint {
    pub time: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Timeline {
    pub is_hourly: bool,
    pub title: String,
    pub x_axis_label: String,
    pub points: Vec<TimelinePoint>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailyImpressions {
    pub date: NaiveDate,
    pub impressions: u64,
}

/// One count series per conversion type, aligned on a shared date axis.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ConversionSeries {
    pub dates: Vec<NaiveDate>,
    pub series: BTreeMap<String, Vec<u64>>,
}

/// `clicks / impressions * 100`, rounded to two decimals; 0 without
/// impressions.
pub fn click_through_rate(clicks: u64, impressions: u64) -> f64 {
    if impressions == 0 {
        return 0.0;
    }
    let pct = clicks as f64 / impressions as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

pub struct StatisticsAggregator {
    repo: Arc<dyn AdRepository>,
}

impl StatisticsAggregator {
    pub fn new(repo: Arc<dyn AdRepository>) -> Self {
        Self { repo }
    }

    pub fn report(&self, query: &StatsQuery) -> AdServeResult<StatisticsReport> {
        let clicks = self.repo.clicks_in_range(&query.range)?;
        let (total_clicks, unique_clicks) = global_click_stats(&clicks);
        let ads = self.ad_stats(&clicks)?;
        let timeline = click_timeline(&clicks, query.selected_date);
        let impressions = self.historical_impressions(&query.range)?;
        let conversions = conversion_series(&self.repo.conversions_in_range(&query.range)?);

        debug!(
            total_clicks,
            unique_clicks,
            ads = ads.len(),
            hourly = timeline.is_hourly,
            "Statistics computed"
        );

        Ok(StatisticsReport {
            total_clicks,
            unique_clicks,
            ads,
            timeline,
            impressions,
            conversions,
            start_date: iso_or_empty(query.range.start),
            end_date: iso_or_empty(query.range.end),
            selected_date: iso_or_empty(query.selected_date),
            warnings: query.warnings.clone(),
        })
    }

    /// Per-ad rows, busiest first. Ads with neither clicks in range nor
    /// impressions are left out.
    fn ad_stats(&self, clicks: &[Click]) -> AdServeResult<Vec<AdStats>> {
        let mut per_ad: HashMap<AdId, (u64, HashSet<&str>)> = HashMap::new();
        for click in clicks {
            let entry = per_ad.entry(click.ad_id).or_default();
            entry.0 += 1;
            entry.1.insert(click.session_id.as_str());
        }

        let mut rows: Vec<AdStats> = self
            .repo
            .list_ads()?
            .into_iter()
            .filter_map(|ad| {
                let (range_clicks, sessions) = per_ad
                    .get(&ad.id)
                    .map(|(n, s)| (*n, s.len() as u64))
                    .unwrap_or((0, 0));
                if range_clicks == 0 && ad.total_impressions == 0 {
                    return None;
                }
                Some(AdStats {
                    ad_id: ad.id,
                    name: ad.name,
                    clicks: range_clicks,
                    unique_clicks: sessions,
                    impressions: ad.total_impressions,
                    ctr: click_through_rate(ad.total_clicks, ad.total_impressions),
                })
            })
            .collect();
        rows.sort_by(|a, b| b.clicks.cmp(&a.clicks).then(a.ad_id.cmp(&b.ad_id)));
        Ok(rows)
    }

    /// Impression counters summed by the day each ad was last updated.
    /// There is no per-impression log, so this is an approximation.
    fn historical_impressions(&self, range: &DateRange) -> AdServeResult<Vec<DailyImpressions>> {
        let mut by_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
        for ad in self.repo.list_ads()? {
            if ad.total_impressions > 0 && range.contains(ad.updated_at) {
                *by_day.entry(ad.updated_at.date_naive()).or_default() += ad.total_impressions;
            }
        }
        Ok(by_day
            .into_iter()
            .map(|(date, impressions)| DailyImpressions { date, impressions })
            .collect())
    }
}

fn global_click_stats(clicks: &[Click]) -> (u64, u64) {
    let sessions: HashSet<&str> = clicks.iter().map(|c| c.session_id.as_str()).collect();
    (clicks.len() as u64, sessions.len() as u64)
}

/// Hourly buckets for `selected_date`, otherwise daily buckets across
/// every click given. Only non-empty buckets are emitted.
fn click_timeline(clicks: &[Click], selected_date: Option<NaiveDate>) -> Timeline {
    match selected_date {
        Some(day) => {
            let mut by_hour: BTreeMap<u32, u64> = BTreeMap::new();
            for click in clicks.iter().filter(|c| c.timestamp.date_naive() == day) {
                *by_hour.entry(click.timestamp.hour()).or_default() += 1;
            }
            Timeline {
                is_hourly: true,
                title: format!("Clicks per hour for {}", day.format("%Y-%m-%d")),
                x_axis_label: "Hour of day".into(),
                points: by_hour
                    .into_iter()
                    .map(|(hour, count)| TimelinePoint {
                        time: format!("{hour:02}:00"),
                        count,
                    })
                    .collect(),
            }
        }
        None => {
            let mut by_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
            for click in clicks {
                *by_day.entry(click.timestamp.date_naive()).or_default() += 1;
            }
            Timeline {
                is_hourly: false,
                title: "Clicks per day".into(),
                x_axis_label: "Date".into(),
                points: by_day
                    .into_iter()
                    .map(|(date, count)| TimelinePoint {
                        time: date.format("%Y-%m-%d").to_string(),
                        count,
                    })
                    .collect(),
            }
        }
    }
}

fn conversion_series(conversions: &[Conversion]) -> ConversionSeries {
    let mut counts: BTreeMap<(NaiveDate, &str), u64> = BTreeMap::new();
    let mut dates: BTreeSet<NaiveDate> = BTreeSet::new();
    let mut types: BTreeSet<&str> = BTreeSet::new();
    for conv in conversions {
        let day = conv.timestamp.date_naive();
        let kind = conv.conversion_type.as_str();
        dates.insert(day);
        types.insert(kind);
        *counts.entry((day, kind)).or_default() += 1;
    }

    let dates: Vec<NaiveDate> = dates.into_iter().collect();
    let series = types
        .into_iter()
        .map(|kind| {
            let values = dates
                .iter()
                .map(|day| counts.get(&(*day, kind)).copied().unwrap_or(0))
                .collect();
            (kind.to_string(), values)
        })
        .collect();
    ConversionSeries { dates, series }
}

fn iso_or_empty(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}
