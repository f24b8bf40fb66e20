//! Management endpoints: campaigns, ads, carousels, conversions.

use crate::rest::{ApiResult, AppState};
use adserve_core::types::{
    image_storage_path, Ad, AdId, Campaign, CampaignId, Carousel, Conversion, Keyword, NewAd,
    NewCampaign, NewCarousel, NewConversion,
};
use adserve_store::AdRepository;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

const BANNER_DIR: &str = "images/banners/";

/// POST /v1/campaigns: Create a campaign.
pub async fn create_campaign(
    State(state): State<AppState>,
    Json(request): Json<NewCampaign>,
) -> ApiResult<(StatusCode, Json<Campaign>)> {
    let campaign = state.store.create_campaign(request)?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

/// GET /v1/campaigns: All campaigns, latest start date first.
pub async fn list_campaigns(State(state): State<AppState>) -> Json<Vec<Campaign>> {
    Json(state.store.list_campaigns())
}

/// PUT /v1/campaigns/:id: Replace a campaign's editable fields.
pub async fn update_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<CampaignId>,
    Json(request): Json<NewCampaign>,
) -> ApiResult<Json<Campaign>> {
    Ok(Json(state.store.update_campaign(campaign_id, request)?))
}

/// DELETE /v1/campaigns/:id: Delete a campaign with its ads and carousels.
pub async fn delete_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<CampaignId>,
) -> ApiResult<StatusCode> {
    state.store.delete_campaign(campaign_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/ads: All ads, newest first.
pub async fn list_ads(State(state): State<AppState>) -> ApiResult<Json<Vec<Ad>>> {
    Ok(Json(state.store.list_ads()?))
}

/// POST /v1/ads: Create an ad. An uploaded image filename is moved under
/// the banner directory with a fresh name.
pub async fn create_ad(
    State(state): State<AppState>,
    Json(mut request): Json<NewAd>,
) -> ApiResult<(StatusCode, Json<Ad>)> {
    if !request.image.is_empty() && !request.image.starts_with(BANNER_DIR) {
        request.image = image_storage_path(&request.image);
    }
    let ad = state.store.create_ad(request)?;
    Ok((StatusCode::CREATED, Json(ad)))
}

#[derive(Debug, Deserialize)]
pub struct AdStatus {
    pub is_active: bool,
}

/// PATCH /v1/ads/:id: Pause or resume an ad.
pub async fn set_ad_status(
    State(state): State<AppState>,
    Path(ad_id): Path<AdId>,
    Json(status): Json<AdStatus>,
) -> ApiResult<Json<Ad>> {
    Ok(Json(state.store.set_ad_active(ad_id, status.is_active)?))
}

/// GET /v1/keywords: Known targeting keywords by name.
pub async fn list_keywords(State(state): State<AppState>) -> Json<Vec<Keyword>> {
    Json(state.store.list_keywords())
}

/// GET /v1/carousels: Active carousels by name.
pub async fn list_carousels(State(state): State<AppState>) -> Json<Vec<Carousel>> {
    Json(state.store.list_active_carousels())
}

/// POST /v1/carousels: Create a carousel.
pub async fn create_carousel(
    State(state): State<AppState>,
    Json(request): Json<NewCarousel>,
) -> ApiResult<(StatusCode, Json<Carousel>)> {
    let carousel = state.store.create_carousel(request)?;
    Ok((StatusCode::CREATED, Json(carousel)))
}

/// POST /v1/conversions: Record a conversion event.
pub async fn create_conversion(
    State(state): State<AppState>,
    Json(request): Json<NewConversion>,
) -> ApiResult<(StatusCode, Json<Conversion>)> {
    metrics::counter!("conversions.recorded").increment(1);
    let conversion = state.store.create_conversion(request)?;
    Ok((StatusCode::CREATED, Json(conversion)))
}
