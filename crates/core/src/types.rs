use crate::error::{AdServeError, AdServeResult};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type CampaignId = u64;
pub type AdId = u64;
pub type KeywordId = u64;
pub type ClickId = u64;
pub type CarouselId = u64;
pub type ConversionId = u64;

// ─── Campaign ───────────────────────────────────────────────────────────

/// Time-boxed container owning ads and carousels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub budget: f64,
    #[serde(default)]
    pub target_audience: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Active and `start_date <= today <= end_date`.
    pub fn is_running_on(&self, today: NaiveDate) -> bool {
        self.is_active && self.start_date <= today && today <= self.end_date
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCampaign {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub budget: f64,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl NewCampaign {
    pub fn validate(&self) -> AdServeResult<()> {
        if self.name.trim().is_empty() {
            return Err(AdServeError::validation("campaign name must not be empty"));
        }
        if self.end_date < self.start_date {
            return Err(AdServeError::validation(format!(
                "campaign end_date {} is before start_date {}",
                self.end_date, self.start_date
            )));
        }
        if !self.budget.is_finite() || self.budget < 0.0 {
            return Err(AdServeError::validation("campaign budget must be non-negative"));
        }
        Ok(())
    }
}

// ─── Keyword ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Keyword {
    pub id: KeywordId,
    pub name: String,
}

// ─── Targeting & scheduling attributes ──────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    #[serde(alias = "M")]
    Male,
    #[serde(alias = "F")]
    Female,
    #[default]
    #[serde(alias = "A")]
    Any,
}

impl FromStr for Gender {
    type Err = AdServeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "M" | "MALE" => Ok(Gender::Male),
            "F" | "FEMALE" => Ok(Gender::Female),
            "A" | "ANY" => Ok(Gender::Any),
            other => Err(AdServeError::validation(format!("unknown gender '{other}'"))),
        }
    }
}

/// Audience gates an ad declares. Every field at its default value means
/// "matches everyone".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Targeting {
    #[serde(default)]
    pub target_age_min: Option<u32>,
    #[serde(default)]
    pub target_age_max: Option<u32>,
    #[serde(default)]
    pub target_gender: Gender,
    /// Free text, matched by case-insensitive substring.
    #[serde(default)]
    pub target_location: String,
    /// Keyword names. Empty means untargeted.
    #[serde(default)]
    pub target_keywords: BTreeSet<String>,
}

impl Targeting {
    pub fn is_neutral(&self) -> bool {
        self.target_age_min.is_none()
            && self.target_age_max.is_none()
            && self.target_gender == Gender::Any
            && self.target_location.is_empty()
            && self.target_keywords.is_empty()
    }
}

/// Set of weekdays an ad may be shown on, written as `"MON,WED,FRI"`.
/// Empty means every day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DaysOfWeek(Vec<Weekday>);

impl DaysOfWeek {
    pub fn only(days: impl IntoIterator<Item = Weekday>) -> Self {
        let mut set = Self::default();
        for day in days {
            if !set.0.contains(&day) {
                set.0.push(day);
            }
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0.contains(&day)
    }
}

/// Three-letter uppercase code, e.g. `MON`.
pub fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MON",
        Weekday::Tue => "TUE",
        Weekday::Wed => "WED",
        Weekday::Thu => "THU",
        Weekday::Fri => "FRI",
        Weekday::Sat => "SAT",
        Weekday::Sun => "SUN",
    }
}

impl FromStr for DaysOfWeek {
    type Err = AdServeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut days = Vec::new();
        for token in s.split(|c: char| c == ',' || c.is_whitespace()) {
            if token.is_empty() {
                continue;
            }
            let day = token
                .parse::<Weekday>()
                .map_err(|_| AdServeError::validation(format!("unknown weekday code '{token}'")))?;
            days.push(day);
        }
        Ok(Self::only(days))
    }
}

impl TryFrom<String> for DaysOfWeek {
    type Error = AdServeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DaysOfWeek> for String {
    fn from(days: DaysOfWeek) -> Self {
        days.to_string()
    }
}

impl fmt::Display for DaysOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<&str> = self.0.iter().map(|d| weekday_code(*d)).collect();
        f.write_str(&codes.join(","))
    }
}

/// Time-of-day and day-of-week gates, independent of audience targeting.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Schedule {
    #[serde(default)]
    pub display_start_time: Option<NaiveTime>,
    #[serde(default)]
    pub display_end_time: Option<NaiveTime>,
    #[serde(default)]
    pub display_days_of_week: DaysOfWeek,
}

impl Schedule {
    pub fn is_unrestricted(&self) -> bool {
        self.display_start_time.is_none()
            && self.display_end_time.is_none()
            && self.display_days_of_week.is_empty()
    }
}

// ─── Ad ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ad {
    pub id: AdId,
    pub campaign_id: CampaignId,
    pub name: String,
    /// Storage path of the banner image.
    pub image: String,
    pub target_url: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_clicks: u64,
    pub total_impressions: u64,
    #[serde(flatten)]
    pub targeting: Targeting,
    #[serde(flatten)]
    pub schedule: Schedule,
    #[serde(default)]
    pub ab_test_group: Option<String>,
}

impl Ad {
    /// No audience, schedule or A/B restriction at all. Only such ads are
    /// served through the fallback path.
    pub fn is_universal(&self) -> bool {
        self.targeting.is_neutral()
            && self.schedule.is_unrestricted()
            && self.ab_test_group.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAd {
    pub campaign_id: CampaignId,
    pub name: String,
    #[serde(default)]
    pub image: String,
    pub target_url: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(flatten)]
    pub targeting: Targeting,
    #[serde(flatten)]
    pub schedule: Schedule,
    #[serde(default)]
    pub ab_test_group: Option<String>,
}

impl NewAd {
    pub fn validate(&self) -> AdServeResult<()> {
        if self.name.trim().is_empty() {
            return Err(AdServeError::validation("ad name must not be empty"));
        }
        let parsed = url::Url::parse(&self.target_url).map_err(|e| {
            AdServeError::validation(format!("invalid target_url '{}': {e}", self.target_url))
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(AdServeError::validation("target_url must be an http(s) URL"));
        }
        let t = &self.targeting;
        if let (Some(min), Some(max)) = (t.target_age_min, t.target_age_max) {
            if min > max {
                return Err(AdServeError::validation(format!(
                    "target_age_min {min} is greater than target_age_max {max}"
                )));
            }
        }
        if t.target_keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(AdServeError::validation("keyword names must not be empty"));
        }
        Ok(())
    }

    /// Blank strings stand for "no A/B group".
    pub fn normalized_ab_group(&self) -> Option<String> {
        self.ab_test_group
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
    }
}

/// Storage path for an uploaded banner: a fresh UUID keeps the original
/// extension, e.g. `images/banners/3f2a...9c.png`.
pub fn image_storage_path(original_filename: &str) -> String {
    let ext = std::path::Path::new(original_filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    format!("images/banners/{}{ext}", Uuid::new_v4().simple())
}

// ─── Click ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Click {
    pub id: ClickId,
    pub ad_id: AdId,
    pub timestamp: DateTime<Utc>,
    pub user_ip: Option<String>,
    pub user_agent: Option<String>,
    /// Session fingerprint (hex digest or random token).
    pub session_id: String,
}

#[derive(Debug, Clone)]
pub struct NewClick {
    pub ad_id: AdId,
    pub timestamp: DateTime<Utc>,
    pub user_ip: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: String,
}

// ─── Carousel ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Carousel {
    pub id: CarouselId,
    pub campaign_id: CampaignId,
    pub name: String,
    pub ad_ids: Vec<AdId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCarousel {
    pub campaign_id: CampaignId,
    pub name: String,
    #[serde(default)]
    pub ad_ids: Vec<AdId>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

// ─── Conversion ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversion {
    pub id: ConversionId,
    pub conversion_type: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConversion {
    pub conversion_type: String,
    /// Defaults to the store's clock when absent.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

// ─── Date range ─────────────────────────────────────────────────────────

/// Inclusive calendar-day range; either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }

    /// A timestamp anywhere on the end date, up to 23:59:59.999, is inside.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.contains_date(instant.date_naive())
    }
}

// ─── Viewer context ─────────────────────────────────────────────────────

/// What is known about the visitor an ad is being chosen for. Every field
/// is optional; an absent field never excludes an ad.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ViewerContext {
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub ab_test_group: Option<String>,
}

impl ViewerContext {
    pub fn with_age(mut self, age: u32) -> Self {
        self.age = Some(age);
        self
    }

    pub fn with_gender(mut self, gender: Gender) -> Self {
        self.gender = Some(gender);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.push(keyword.into());
        self
    }

    pub fn with_ab_group(mut self, group: impl Into<String>) -> Self {
        self.ab_test_group = Some(group.into());
        self
    }
}

fn default_true() -> bool {
    true
}
