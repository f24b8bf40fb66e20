//! Demo data for local development.

use crate::memory::MemoryStore;
use adserve_core::types::{Gender, NewAd, NewCampaign, NewCarousel, Schedule, Targeting};
use adserve_core::AdServeResult;
use chrono::Duration;
use tracing::info;

/// One running campaign with a targeted ad, a universal fallback ad, a
/// keyword-targeted ad, and a carousel holding all three.
pub fn seed_demo_data(store: &MemoryStore) -> AdServeResult<()> {
    let today = store.clock().now().date_naive();
    let campaign = store.create_campaign(NewCampaign {
        name: "Demo Spring Launch".into(),
        start_date: today - Duration::days(30),
        end_date: today + Duration::days(365),
        budget: 10_000.0,
        target_audience: "Young adults interested in outdoor sports".into(),
        is_active: true,
    })?;

    let targeted = store.create_ad(NewAd {
        campaign_id: campaign.id,
        name: "Trail Runners 18-35".into(),
        image: "images/banners/demo-trail.png".into(),
        target_url: "https://example.com/trail".into(),
        is_active: true,
        targeting: Targeting {
            target_age_min: Some(18),
            target_age_max: Some(35),
            target_gender: Gender::Any,
            target_location: "Spain, Mexico, Colombia".into(),
            target_keywords: Default::default(),
        },
        schedule: Schedule::default(),
        ab_test_group: None,
    })?;

    let keyword = store.create_ad(NewAd {
        campaign_id: campaign.id,
        name: "Climbing Gear".into(),
        image: "images/banners/demo-climb.png".into(),
        target_url: "https://example.com/climb".into(),
        is_active: true,
        targeting: Targeting {
            target_keywords: ["climbing".to_string(), "outdoor".to_string()].into(),
            ..Targeting::default()
        },
        schedule: Schedule::default(),
        ab_test_group: Some("Variant A".into()),
    })?;

    let universal = store.create_ad(NewAd {
        campaign_id: campaign.id,
        name: "Spring Sale (all audiences)".into(),
        image: "images/banners/demo-sale.png".into(),
        target_url: "https://example.com/sale".into(),
        is_active: true,
        targeting: Targeting::default(),
        schedule: Schedule::default(),
        ab_test_group: None,
    })?;

    store.create_carousel(NewCarousel {
        campaign_id: campaign.id,
        name: "Homepage Spring".into(),
        ad_ids: vec![targeted.id, keyword.id, universal.id],
        is_active: true,
    })?;

    info!(campaign_id = campaign.id, ads = 3, "Demo data seeded");
    Ok(())
}
