//! In-memory store backed by DashMap.
//!
//! Counter updates happen under the ad's shard write lock, so increments
//! from concurrent requests are never lost.

use crate::repository::AdRepository;
use adserve_core::targeting::{self, ServingInstant};
use adserve_core::types::*;
use adserve_core::{AdServeError, AdServeResult, Clock, ViewerContext};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Default)]
struct Sequences {
    campaign: AtomicU64,
    keyword: AtomicU64,
    ad: AtomicU64,
    click: AtomicU64,
    carousel: AtomicU64,
    conversion: AtomicU64,
}

fn next_id(seq: &AtomicU64) -> u64 {
    seq.fetch_add(1, Ordering::Relaxed) + 1
}

/// Thread-safe in-memory store for campaigns, ads, carousels, clicks and
/// conversions.
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    ids: Sequences,
    campaigns: DashMap<CampaignId, Campaign>,
    keywords: DashMap<String, Keyword>,
    ads: DashMap<AdId, Ad>,
    clicks: DashMap<AdId, Vec<Click>>,
    carousels: DashMap<CarouselId, Carousel>,
    carousel_names: DashMap<String, CarouselId>,
    conversions: DashMap<ConversionId, Conversion>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        info!("Ad store initialized (in-memory)");
        Self {
            clock,
            ids: Sequences::default(),
            campaigns: DashMap::new(),
            keywords: DashMap::new(),
            ads: DashMap::new(),
            clicks: DashMap::new(),
            carousels: DashMap::new(),
            carousel_names: DashMap::new(),
            conversions: DashMap::new(),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ─── Campaigns ─────────────────────────────────────────────────────────

    pub fn create_campaign(&self, req: NewCampaign) -> AdServeResult<Campaign> {
        req.validate()?;
        let now = self.clock.now();
        let campaign = Campaign {
            id: next_id(&self.ids.campaign),
            name: req.name,
            start_date: req.start_date,
            end_date: req.end_date,
            budget: req.budget,
            target_audience: req.target_audience,
            is_active: req.is_active,
            created_at: now,
            updated_at: now,
        };
        self.campaigns.insert(campaign.id, campaign.clone());
        info!(campaign_id = campaign.id, name = %campaign.name, "Campaign created");
        Ok(campaign)
    }

    /// Replace a campaign's editable fields. Validation failures leave the
    /// stored record untouched.
    pub fn update_campaign(&self, id: CampaignId, req: NewCampaign) -> AdServeResult<Campaign> {
        req.validate()?;
        let mut entry = self
            .campaigns
            .get_mut(&id)
            .ok_or_else(|| AdServeError::not_found("campaign", id))?;
        let c = entry.value_mut();
        c.name = req.name;
        c.start_date = req.start_date;
        c.end_date = req.end_date;
        c.budget = req.budget;
        c.target_audience = req.target_audience;
        c.is_active = req.is_active;
        c.updated_at = self.clock.now();
        Ok(c.clone())
    }

    pub fn list_campaigns(&self) -> Vec<Campaign> {
        let mut campaigns: Vec<Campaign> =
            self.campaigns.iter().map(|r| r.value().clone()).collect();
        campaigns.sort_by(|a, b| b.start_date.cmp(&a.start_date).then(b.id.cmp(&a.id)));
        campaigns
    }

    /// Delete a campaign together with its ads, their clicks, and its
    /// carousels. Deleted ads are also dropped from other carousels.
    pub fn delete_campaign(&self, id: CampaignId) -> AdServeResult<()> {
        if self.campaigns.remove(&id).is_none() {
            return Err(AdServeError::not_found("campaign", id));
        }

        let ad_ids: Vec<AdId> = self
            .ads
            .iter()
            .filter(|r| r.value().campaign_id == id)
            .map(|r| *r.key())
            .collect();
        for ad_id in &ad_ids {
            self.ads.remove(ad_id);
            self.clicks.remove(ad_id);
        }

        let carousel_ids: Vec<CarouselId> = self
            .carousels
            .iter()
            .filter(|r| r.value().campaign_id == id)
            .map(|r| *r.key())
            .collect();
        for carousel_id in &carousel_ids {
            if let Some((_, carousel)) = self.carousels.remove(carousel_id) {
                self.carousel_names.remove(&carousel.name);
            }
        }
        for mut carousel in self.carousels.iter_mut() {
            carousel.ad_ids.retain(|ad_id| !ad_ids.contains(ad_id));
        }

        info!(
            campaign_id = id,
            ads = ad_ids.len(),
            carousels = carousel_ids.len(),
            "Campaign deleted"
        );
        Ok(())
    }

    // ─── Keywords ──────────────────────────────────────────────────────────

    /// Return the keyword with this name, creating it on first use.
    pub fn ensure_keyword(&self, name: &str) -> Keyword {
        self.keywords
            .entry(name.to_string())
            .or_insert_with(|| Keyword {
                id: next_id(&self.ids.keyword),
                name: name.to_string(),
            })
            .clone()
    }

    pub fn list_keywords(&self) -> Vec<Keyword> {
        let mut keywords: Vec<Keyword> = self.keywords.iter().map(|r| r.value().clone()).collect();
        keywords.sort_by(|a, b| a.name.cmp(&b.name));
        keywords
    }

    // ─── Ads ───────────────────────────────────────────────────────────────

    pub fn create_ad(&self, req: NewAd) -> AdServeResult<Ad> {
        req.validate()?;
        if !self.campaigns.contains_key(&req.campaign_id) {
            return Err(AdServeError::not_found("campaign", req.campaign_id));
        }
        for name in &req.targeting.target_keywords {
            self.ensure_keyword(name);
        }

        let now = self.clock.now();
        let ab_test_group = req.normalized_ab_group();
        let ad = Ad {
            id: next_id(&self.ids.ad),
            campaign_id: req.campaign_id,
            name: req.name,
            image: req.image,
            target_url: req.target_url,
            is_active: req.is_active,
            created_at: now,
            updated_at: now,
            total_clicks: 0,
            total_impressions: 0,
            targeting: req.targeting,
            schedule: req.schedule,
            ab_test_group,
        };
        self.ads.insert(ad.id, ad.clone());
        info!(ad_id = ad.id, campaign_id = ad.campaign_id, name = %ad.name, "Ad created");
        Ok(ad)
    }

    pub fn set_ad_active(&self, id: AdId, active: bool) -> AdServeResult<Ad> {
        let mut entry = self
            .ads
            .get_mut(&id)
            .ok_or_else(|| AdServeError::not_found("ad", id))?;
        entry.is_active = active;
        entry.updated_at = self.clock.now();
        Ok(entry.clone())
    }

    // ─── Carousels ─────────────────────────────────────────────────────────

    pub fn create_carousel(&self, req: NewCarousel) -> AdServeResult<Carousel> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(AdServeError::validation("carousel name must not be empty"));
        }
        if !self.campaigns.contains_key(&req.campaign_id) {
            return Err(AdServeError::not_found("campaign", req.campaign_id));
        }
        if let Some(missing) = req.ad_ids.iter().find(|id| !self.ads.contains_key(id)) {
            return Err(AdServeError::not_found("ad", *missing));
        }

        let id = match self.carousel_names.entry(name.clone()) {
            Entry::Occupied(_) => {
                return Err(AdServeError::validation(format!(
                    "carousel name '{name}' is already taken"
                )))
            }
            Entry::Vacant(slot) => {
                let id = next_id(&self.ids.carousel);
                slot.insert(id);
                id
            }
        };

        let mut ad_ids = Vec::with_capacity(req.ad_ids.len());
        for ad_id in req.ad_ids {
            if !ad_ids.contains(&ad_id) {
                ad_ids.push(ad_id);
            }
        }

        let now = self.clock.now();
        let carousel = Carousel {
            id,
            campaign_id: req.campaign_id,
            name,
            ad_ids,
            is_active: req.is_active,
            created_at: now,
            updated_at: now,
        };
        self.carousels.insert(id, carousel.clone());
        info!(
            carousel_id = id,
            name = %carousel.name,
            ads = carousel.ad_ids.len(),
            "Carousel created"
        );
        Ok(carousel)
    }

    pub fn get_carousel(&self, id: CarouselId) -> AdServeResult<Carousel> {
        self.carousels
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or_else(|| AdServeError::not_found("carousel", id))
    }

    pub fn list_active_carousels(&self) -> Vec<Carousel> {
        let mut carousels: Vec<Carousel> = self
            .carousels
            .iter()
            .filter(|r| r.value().is_active)
            .map(|r| r.value().clone())
            .collect();
        carousels.sort_by(|a, b| a.name.cmp(&b.name));
        carousels
    }

    // ─── Conversions ───────────────────────────────────────────────────────

    pub fn create_conversion(&self, req: NewConversion) -> AdServeResult<Conversion> {
        let conversion_type = req.conversion_type.trim().to_string();
        if conversion_type.is_empty() {
            return Err(AdServeError::validation("conversion_type must not be empty"));
        }
        let conversion = Conversion {
            id: next_id(&self.ids.conversion),
            conversion_type,
            timestamp: req.timestamp.unwrap_or_else(|| self.clock.now()),
        };
        self.conversions.insert(conversion.id, conversion.clone());
        debug!(
            conversion_id = conversion.id,
            kind = %conversion.conversion_type,
            "Conversion recorded"
        );
        Ok(conversion)
    }

    // ─── Internals ─────────────────────────────────────────────────────────

    /// Ads whose campaign is running on `now`'s date, paired with that
    /// campaign. Finer rules are applied by the caller.
    fn running_candidates(&self, now: DateTime<Utc>) -> Vec<(Ad, Campaign)> {
        let today = now.date_naive();
        self.ads
            .iter()
            .filter(|r| r.value().is_active)
            .filter_map(|r| {
                let ad = r.value();
                let campaign = self.campaigns.get(&ad.campaign_id)?;
                campaign
                    .is_running_on(today)
                    .then(|| (ad.clone(), campaign.clone()))
            })
            .collect()
    }

    fn bump_counter(&self, ad_id: AdId, field: fn(&mut Ad) -> &mut u64) -> AdServeResult<u64> {
        let mut entry = self
            .ads
            .get_mut(&ad_id)
            .ok_or_else(|| AdServeError::not_found("ad", ad_id))?;
        let ad = entry.value_mut();
        let counter = field(ad);
        *counter += 1;
        let value = *counter;
        ad.updated_at = self.clock.now();
        Ok(value)
    }
}

impl AdRepository for MemoryStore {
    fn find_eligible_ads(
        &self,
        viewer: &ViewerContext,
        now: DateTime<Utc>,
    ) -> AdServeResult<Vec<Ad>> {
        let at = ServingInstant::from(now);
        let mut eligible: Vec<Ad> = self
            .running_candidates(now)
            .into_iter()
            .filter(|(ad, campaign)| targeting::is_eligible(ad, campaign, viewer, &at))
            .map(|(ad, _)| ad)
            .collect();
        eligible.sort_by_key(|ad| ad.id);
        Ok(eligible)
    }

    fn find_fallback_ads(&self, now: DateTime<Utc>) -> AdServeResult<Vec<Ad>> {
        let today = now.date_naive();
        let mut fallback: Vec<Ad> = self
            .running_candidates(now)
            .into_iter()
            .filter(|(ad, campaign)| targeting::is_fallback_candidate(ad, campaign, today))
            .map(|(ad, _)| ad)
            .collect();
        fallback.sort_by_key(|ad| ad.id);
        Ok(fallback)
    }

    fn find_carousel_ads(&self, carousel_id: CarouselId) -> AdServeResult<(Carousel, Vec<Ad>)> {
        let carousel = self.get_carousel(carousel_id)?;
        if !carousel.is_active {
            return Err(AdServeError::not_found("carousel", carousel_id));
        }
        let ads = carousel
            .ad_ids
            .iter()
            .filter_map(|id| self.ads.get(id).map(|r| r.value().clone()))
            .collect();
        Ok((carousel, ads))
    }

    fn get_ad(&self, ad_id: AdId) -> AdServeResult<Ad> {
        self.ads
            .get(&ad_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| AdServeError::not_found("ad", ad_id))
    }

    fn get_campaign(&self, campaign_id: CampaignId) -> AdServeResult<Campaign> {
        self.campaigns
            .get(&campaign_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| AdServeError::not_found("campaign", campaign_id))
    }

    fn increment_impressions(&self, ad_id: AdId) -> AdServeResult<u64> {
        self.bump_counter(ad_id, |ad| &mut ad.total_impressions)
    }

    fn increment_clicks(&self, ad_id: AdId) -> AdServeResult<u64> {
        self.bump_counter(ad_id, |ad| &mut ad.total_clicks)
    }

    fn find_recent_click(
        &self,
        ad_id: AdId,
        fingerprint: &str,
        since: DateTime<Utc>,
    ) -> AdServeResult<Option<Click>> {
        Ok(self.clicks.get(&ad_id).and_then(|clicks| {
            clicks
                .iter()
                .filter(|c| c.session_id == fingerprint && c.timestamp >= since)
                .max_by_key(|c| c.timestamp)
                .cloned()
        }))
    }

    fn create_click(&self, click: NewClick) -> AdServeResult<Click> {
        if !self.ads.contains_key(&click.ad_id) {
            return Err(AdServeError::not_found("ad", click.ad_id));
        }
        let created = Click {
            id: next_id(&self.ids.click),
            ad_id: click.ad_id,
            timestamp: click.timestamp,
            user_ip: click.user_ip,
            user_agent: click.user_agent,
            session_id: click.session_id,
        };
        self.clicks
            .entry(created.ad_id)
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    fn record_click(&self, click: NewClick) -> AdServeResult<Click> {
        // Lock order: ads, then clicks.
        let mut ad = self
            .ads
            .get_mut(&click.ad_id)
            .ok_or_else(|| AdServeError::not_found("ad", click.ad_id))?;
        let created = Click {
            id: next_id(&self.ids.click),
            ad_id: click.ad_id,
            timestamp: click.timestamp,
            user_ip: click.user_ip,
            user_agent: click.user_agent,
            session_id: click.session_id,
        };
        self.clicks
            .entry(created.ad_id)
            .or_default()
            .push(created.clone());
        ad.total_clicks += 1;
        ad.updated_at = self.clock.now();
        Ok(created)
    }

    fn clicks_in_range(&self, range: &DateRange) -> AdServeResult<Vec<Click>> {
        let mut clicks: Vec<Click> = self
            .clicks
            .iter()
            .flat_map(|r| {
                r.value()
                    .iter()
                    .filter(|c| range.contains(c.timestamp))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        clicks.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(clicks)
    }

    fn list_ads(&self) -> AdServeResult<Vec<Ad>> {
        let mut ads: Vec<Ad> = self.ads.iter().map(|r| r.value().clone()).collect();
        ads.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(ads)
    }

    fn conversions_in_range(&self, range: &DateRange) -> AdServeResult<Vec<Conversion>> {
        let mut conversions: Vec<Conversion> = self
            .conversions
            .iter()
            .filter(|r| range.contains(r.value().timestamp))
            .map(|r| r.value().clone())
            .collect();
        conversions.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(conversions)
    }
}
