//! Targeting predicate evaluator.
//!
//! An ad is eligible for a viewer only if every rule in [`AUDIENCE_RULES`]
//! holds. Rules are hard gates evaluated in order; there is no scoring.
//! A rule whose viewer attribute or ad constraint is absent passes.

use crate::types::{Ad, Campaign, Gender, ViewerContext};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use serde::Serialize;

/// The calendar view of "now" the rules are evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServingInstant {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub weekday: Weekday,
}

impl From<DateTime<Utc>> for ServingInstant {
    fn from(now: DateTime<Utc>) -> Self {
        let naive = now.naive_utc();
        Self {
            date: naive.date(),
            time: naive.time(),
            weekday: naive.weekday(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetingRule {
    CampaignRunning,
    AdActive,
    TimeOfDay,
    DayOfWeek,
    Age,
    Gender,
    Location,
    Keywords,
    AbTestGroup,
}

/// Full rule set for single-ad selection.
pub const AUDIENCE_RULES: [TargetingRule; 9] = [
    TargetingRule::CampaignRunning,
    TargetingRule::AdActive,
    TargetingRule::TimeOfDay,
    TargetingRule::DayOfWeek,
    TargetingRule::Age,
    TargetingRule::Gender,
    TargetingRule::Location,
    TargetingRule::Keywords,
    TargetingRule::AbTestGroup,
];

/// Carousel display only checks that the ad may run right now; audience
/// targeting is not applied.
pub const SCHEDULING_RULES: [TargetingRule; 4] = [
    TargetingRule::CampaignRunning,
    TargetingRule::AdActive,
    TargetingRule::TimeOfDay,
    TargetingRule::DayOfWeek,
];

impl TargetingRule {
    pub fn check(
        self,
        ad: &Ad,
        campaign: &Campaign,
        viewer: &ViewerContext,
        at: &ServingInstant,
    ) -> bool {
        match self {
            TargetingRule::CampaignRunning => campaign.is_running_on(at.date),
            TargetingRule::AdActive => ad.is_active,
            TargetingRule::TimeOfDay => time_of_day_matches(ad, at.time),
            TargetingRule::DayOfWeek => day_of_week_matches(ad, at.weekday),
            TargetingRule::Age => viewer.age.map_or(true, |age| age_matches(ad, age)),
            TargetingRule::Gender => viewer.gender.map_or(true, |g| gender_matches(ad, g)),
            TargetingRule::Location => viewer
                .location
                .as_deref()
                .map_or(true, |loc| location_matches(ad, loc)),
            TargetingRule::Keywords => keywords_match(ad, &viewer.keywords),
            TargetingRule::AbTestGroup => viewer
                .ab_test_group
                .as_deref()
                .map_or(true, |group| ad.ab_test_group.as_deref() == Some(group)),
        }
    }
}

/// First rule in `rules` the ad fails, if any.
pub fn first_failing_rule(
    rules: &[TargetingRule],
    ad: &Ad,
    campaign: &Campaign,
    viewer: &ViewerContext,
    at: &ServingInstant,
) -> Option<TargetingRule> {
    rules
        .iter()
        .copied()
        .find(|rule| !rule.check(ad, campaign, viewer, at))
}

/// Single-ad eligibility: every audience and scheduling rule holds.
pub fn is_eligible(
    ad: &Ad,
    campaign: &Campaign,
    viewer: &ViewerContext,
    at: &ServingInstant,
) -> bool {
    let failing = first_failing_rule(&AUDIENCE_RULES, ad, campaign, viewer, at);
    failing.is_none()
}

/// Carousel eligibility: campaign running, ad active, schedule open.
pub fn is_schedulable(ad: &Ad, campaign: &Campaign, at: &ServingInstant) -> bool {
    let anyone = ViewerContext::default();
    let failing = first_failing_rule(&SCHEDULING_RULES, ad, campaign, &anyone, at);
    failing.is_none()
}

/// Strict fallback: the ad may run today and declares no restriction of
/// any kind.
pub fn is_fallback_candidate(ad: &Ad, campaign: &Campaign, today: NaiveDate) -> bool {
    ad.is_active && campaign.is_running_on(today) && ad.is_universal()
}

fn time_of_day_matches(ad: &Ad, now: NaiveTime) -> bool {
    let schedule = &ad.schedule;
    let after_start = schedule.display_start_time.map_or(true, |start| now >= start);
    let before_end = schedule.display_end_time.map_or(true, |end| now <= end);
    after_start && before_end
}

fn day_of_week_matches(ad: &Ad, today: Weekday) -> bool {
    let days = &ad.schedule.display_days_of_week;
    days.is_empty() || days.contains(today)
}

fn age_matches(ad: &Ad, age: u32) -> bool {
    let t = &ad.targeting;
    let above_min = t.target_age_min.map_or(true, |min| age >= min);
    let below_max = t.target_age_max.map_or(true, |max| age <= max);
    above_min && below_max
}

fn gender_matches(ad: &Ad, gender: Gender) -> bool {
    ad.targeting.target_gender == Gender::Any || ad.targeting.target_gender == gender
}

fn location_matches(ad: &Ad, viewer_location: &str) -> bool {
    let target = &ad.targeting.target_location;
    let needle = viewer_location.to_lowercase();
    target.is_empty() || target.to_lowercase().contains(&needle)
}

fn keywords_match(ad: &Ad, viewer_keywords: &[String]) -> bool {
    let assigned = &ad.targeting.target_keywords;
    viewer_keywords.is_empty()
        || assigned.is_empty()
        || viewer_keywords.iter().any(|k| assigned.contains(k))
}
