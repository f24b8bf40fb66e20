//! Ad selection: eligible set, strict fallback, uniform random pick.

use adserve_core::config::ServingConfig;
use adserve_core::targeting::{self, ServingInstant};
use adserve_core::types::{Ad, Campaign, CampaignId, Carousel, CarouselId};
use adserve_core::{AdServeResult, Clock, ViewerContext};
use adserve_store::AdRepository;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of a single-ad selection. `ad == None` is a normal result
/// ("no ad available"), not a failure.
#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    pub ad: Option<Ad>,
    /// True when the ad came from the universal fallback set.
    pub fallback: bool,
}

impl Selection {
    pub fn empty() -> Self {
        Self {
            ad: None,
            fallback: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ad.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CarouselSelection {
    pub carousel: Carousel,
    /// Member ads that may run now, in random order.
    pub ads: Vec<Ad>,
}

pub struct AdSelector {
    repo: Arc<dyn AdRepository>,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
}

impl AdSelector {
    pub fn new(repo: Arc<dyn AdRepository>, clock: Arc<dyn Clock>) -> Self {
        Self::with_rng(repo, clock, StdRng::from_entropy())
    }

    /// Reproducible selection sequence for tests and replays.
    pub fn with_seed(repo: Arc<dyn AdRepository>, clock: Arc<dyn Clock>, seed: u64) -> Self {
        Self::with_rng(repo, clock, StdRng::seed_from_u64(seed))
    }

    pub fn from_config(
        repo: Arc<dyn AdRepository>,
        clock: Arc<dyn Clock>,
        config: &ServingConfig,
    ) -> Self {
        match config.rng_seed {
            Some(seed) => Self::with_seed(repo, clock, seed),
            None => Self::new(repo, clock),
        }
    }

    fn with_rng(repo: Arc<dyn AdRepository>, clock: Arc<dyn Clock>, rng: StdRng) -> Self {
        Self {
            repo,
            clock,
            rng: Mutex::new(rng),
        }
    }

    /// Pick one ad for `viewer` and count an impression for it.
    pub fn select(&self, viewer: &ViewerContext) -> AdServeResult<Selection> {
        let now = self.clock.now();

        let eligible = self.repo.find_eligible_ads(viewer, now)?;
        debug!(candidates = eligible.len(), "Eligible ads resolved");
        if let Some(ad) = self.pick(eligible) {
            return self.serve(ad, false);
        }

        let fallback = self.repo.find_fallback_ads(now)?;
        if let Some(ad) = self.pick(fallback) {
            metrics::counter!("selection.fallback").increment(1);
            debug!(ad_id = ad.id, "No targeted ad matched, serving fallback");
            return self.serve(ad, true);
        }

        metrics::counter!("selection.empty").increment(1);
        info!(?viewer, "No ad available");
        Ok(Selection::empty())
    }

    /// Active, currently scheduled member ads of a carousel, shuffled.
    /// Audience targeting is not applied here.
    pub fn select_for_carousel(
        &self,
        carousel_id: CarouselId,
    ) -> AdServeResult<CarouselSelection> {
        let at = ServingInstant::from(self.clock.now());
        let (carousel, members) = self.repo.find_carousel_ads(carousel_id)?;

        let mut campaigns: HashMap<CampaignId, Option<Campaign>> = HashMap::new();
        let mut ads = Vec::with_capacity(members.len());
        for ad in members {
            let campaign = match campaigns.get(&ad.campaign_id) {
                Some(cached) => cached.clone(),
                None => {
                    // A member whose campaign is gone is skipped; any other
                    // failure aborts the request.
                    let fetched = match self.repo.get_campaign(ad.campaign_id) {
                        Ok(campaign) => Some(campaign),
                        Err(e) if e.is_not_found() => None,
                        Err(e) => return Err(e),
                    };
                    campaigns.insert(ad.campaign_id, fetched.clone());
                    fetched
                }
            };
            if let Some(campaign) = campaign {
                if targeting::is_schedulable(&ad, &campaign, &at) {
                    ads.push(ad);
                }
            }
        }

        ads.shuffle(&mut *self.rng.lock());
        metrics::counter!("selection.carousel").increment(1);
        debug!(carousel_id, shown = ads.len(), "Carousel resolved");
        Ok(CarouselSelection { carousel, ads })
    }

    fn pick(&self, mut candidates: Vec<Ad>) -> Option<Ad> {
        if candidates.is_empty() {
            return None;
        }
        let idx = {
            let mut rng = self.rng.lock();
            rand::Rng::gen_range(&mut *rng, 0..candidates.len())
        };
        Some(candidates.swap_remove(idx))
    }

    fn serve(&self, mut ad: Ad, fallback: bool) -> AdServeResult<Selection> {
        ad.total_impressions = self.repo.increment_impressions(ad.id)?;
        metrics::counter!("selection.served").increment(1);
        debug!(
            ad_id = ad.id,
            impressions = ad.total_impressions,
            fallback,
            "Ad served"
        );
        Ok(Selection {
            ad: Some(ad),
            fallback,
        })
    }
}
