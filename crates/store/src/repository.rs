//! Storage contract consumed by the serving engine and the statistics
//! aggregator.

use adserve_core::types::{
    Ad, AdId, Campaign, CampaignId, Carousel, CarouselId, Click, Conversion, DateRange, NewClick,
};
use adserve_core::{AdServeResult, ViewerContext};
use chrono::{DateTime, Utc};

/// Persistent store for ads, campaigns, carousels and their events.
///
/// Counter updates (`increment_*`, `record_click`) must be atomic relative
/// updates: concurrent callers never lose an increment.
pub trait AdRepository: Send + Sync {
    /// Ads passing every targeting and scheduling rule for `viewer` at `now`.
    fn find_eligible_ads(
        &self,
        viewer: &ViewerContext,
        now: DateTime<Utc>,
    ) -> AdServeResult<Vec<Ad>>;

    /// Universal ads (no restriction of any kind) whose campaign runs at `now`.
    fn find_fallback_ads(&self, now: DateTime<Utc>) -> AdServeResult<Vec<Ad>>;

    /// An active carousel and all of its member ads, in membership order.
    /// Missing or inactive carousels are `NotFound`.
    fn find_carousel_ads(&self, carousel_id: CarouselId) -> AdServeResult<(Carousel, Vec<Ad>)>;

    fn get_ad(&self, ad_id: AdId) -> AdServeResult<Ad>;

    fn get_campaign(&self, campaign_id: CampaignId) -> AdServeResult<Campaign>;

    /// Returns the new impression count.
    fn increment_impressions(&self, ad_id: AdId) -> AdServeResult<u64>;

    /// Returns the new click count.
    fn increment_clicks(&self, ad_id: AdId) -> AdServeResult<u64>;

    /// Most recent click on `ad_id` with this fingerprint at or after `since`.
    fn find_recent_click(
        &self,
        ad_id: AdId,
        fingerprint: &str,
        since: DateTime<Utc>,
    ) -> AdServeResult<Option<Click>>;

    fn create_click(&self, click: NewClick) -> AdServeResult<Click>;

    /// Insert the click and bump the ad's click counter as one unit: on
    /// error neither the click row nor the counter change is visible.
    /// Implementations must not build this from `create_click` followed by
    /// `increment_clicks`.
    fn record_click(&self, click: NewClick) -> AdServeResult<Click>;

    /// Clicks whose timestamp falls on a day inside `range`.
    fn clicks_in_range(&self, range: &DateRange) -> AdServeResult<Vec<Click>>;

    fn list_ads(&self) -> AdServeResult<Vec<Ad>>;

    /// Conversions whose timestamp falls on a day inside `range`.
    fn conversions_in_range(&self, range: &DateRange) -> AdServeResult<Vec<Conversion>>;
}
