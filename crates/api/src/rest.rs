//! REST handlers for ad display, carousel display, click redirects,
//! statistics, and health checks.

use adserve_core::types::{AdId, CarouselId, Gender};
use adserve_core::{AdServeError, AdServeResult, AppConfig, ViewerContext};
use adserve_engine::{AdSelector, CarouselSelection, ClickRecorder, Selection};
use adserve_reporting::{StatisticsAggregator, StatisticsReport, StatsParams, StatsQuery};
use adserve_store::MemoryStore;
use axum::extract::{ConnectInfo, Path, Query, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub selector: Arc<AdSelector>,
    pub recorder: Arc<ClickRecorder>,
    pub aggregator: Arc<StatisticsAggregator>,
    pub store: Arc<MemoryStore>,
    pub node_id: String,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the serving services on top of `store`, using the store's clock.
    pub fn new(store: Arc<MemoryStore>, config: &AppConfig) -> Self {
        let clock = store.clock().clone();
        let selector = AdSelector::from_config(store.clone(), clock.clone(), &config.serving);
        let recorder = ClickRecorder::new(store.clone(), clock, config.click_dedup_window());
        let aggregator = StatisticsAggregator::new(store.clone());
        Self {
            selector: Arc::new(selector),
            recorder: Arc::new(recorder),
            aggregator: Arc::new(aggregator),
            store,
            node_id: config.node_id.clone(),
            start_time: Instant::now(),
        }
    }
}

// ─── Errors ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Domain error carried out of a handler.
#[derive(Debug)]
pub struct ApiError(pub AdServeError);

impl From<AdServeError> for ApiError {
    fn from(e: AdServeError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            AdServeError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AdServeError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        let message = if status.is_server_error() {
            error!(error = %self.0, "Request failed");
            metrics::counter!("api.errors").increment(1);
            "Internal processing error".to_string()
        } else {
            metrics::counter!("api.client_errors").increment(1);
            self.0.to_string()
        };
        (
            status,
            Json(ErrorResponse {
                error: code.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// ─── Request parsing ────────────────────────────────────────────────────

/// Build a viewer from the raw query string. `keywords` may repeat; blank
/// values are treated as absent.
pub fn parse_viewer(raw: Option<&str>) -> AdServeResult<ViewerContext> {
    let mut viewer = ViewerContext::default();
    let Some(raw) = raw else {
        return Ok(viewer);
    };
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.as_ref() {
            "age" => {
                let age = value.parse::<u32>().map_err(|_| {
                    let msg = format!("age must be a non-negative integer, got '{value}'");
                    AdServeError::validation(msg)
                })?;
                viewer.age = Some(age);
            }
            "gender" => viewer.gender = Some(value.parse::<Gender>()?),
            "location" => viewer.location = Some(value.to_string()),
            "keywords" | "keywords[]" => viewer.keywords.push(value.to_string()),
            "ab_test_group" => viewer.ab_test_group = Some(value.to_string()),
            _ => {}
        }
    }
    Ok(viewer)
}

/// First `X-Forwarded-For` hop, else the peer address.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

// ─── Serving ────────────────────────────────────────────────────────────

/// GET /v1/ads/serve: Pick one ad for the visitor described by the query.
pub async fn serve_ad(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> ApiResult<Response> {
    let viewer = parse_viewer(query.as_deref())?;
    let selection: Selection = state.selector.select(&viewer)?;
    if selection.is_empty() {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "no_ad_available".to_string(),
                message: "No ad available".to_string(),
            }),
        )
            .into_response());
    }
    Ok(Json(selection).into_response())
}

/// GET /v1/carousels/:id: Currently runnable ads of an active carousel.
pub async fn show_carousel(
    State(state): State<AppState>,
    Path(carousel_id): Path<CarouselId>,
) -> ApiResult<Json<CarouselSelection>> {
    Ok(Json(state.selector.select_for_carousel(carousel_id)?))
}

/// GET /v1/ads/:id/redirect: Count the click and send the visitor on.
pub async fn redirect_click(
    State(state): State<AppState>,
    Path(ad_id): Path<AdId>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let ip = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let outcome = state
        .recorder
        .record_click(ad_id, ip.as_deref(), user_agent.as_deref())?;
    if !outcome.recorded {
        info!(ad_id, "Redirecting without counting click");
    }
    Ok((StatusCode::FOUND, [(header::LOCATION, outcome.redirect_url)]).into_response())
}

// ─── Statistics ─────────────────────────────────────────────────────────

/// GET /v1/statistics: Click, impression, and conversion rollups.
pub async fn statistics(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> ApiResult<Json<StatisticsReport>> {
    let query = StatsQuery::parse(&params);
    if !query.warnings.is_empty() {
        warn!(warnings = ?query.warnings, "Statistics requested with malformed dates");
    }
    Ok(Json(state.aggregator.report(&query)?))
}

// ─── Health ─────────────────────────────────────────────────────────────

/// GET /health: Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready: Readiness check. The in-memory store is usable as soon as
/// the state exists.
pub async fn readiness() -> StatusCode {
    StatusCode::OK
}

/// GET /live: Liveness check.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn viewer_from_query_with_repeated_keywords() {
        let raw = "age=30&gender=F&location=Madrid&keywords=tech&keywords=ai&ab_test_group=B";
        let viewer = parse_viewer(Some(raw)).unwrap();
        assert_eq!(viewer.age, Some(30));
        assert_eq!(viewer.gender, Some(Gender::Female));
        assert_eq!(viewer.location.as_deref(), Some("Madrid"));
        assert_eq!(viewer.keywords, vec!["tech".to_string(), "ai".to_string()]);
        assert_eq!(viewer.ab_test_group.as_deref(), Some("B"));
    }

    #[test]
    fn blank_and_missing_values_are_absent() {
        assert_eq!(parse_viewer(None).unwrap(), ViewerContext::default());
        assert_eq!(
            parse_viewer(Some("age=&location=%20")).unwrap(),
            ViewerContext::default()
        );
    }

    #[test]
    fn malformed_age_is_a_validation_error() {
        let err = parse_viewer(Some("age=thirty")).unwrap_err();
        assert!(matches!(err, AdServeError::Validation(_)));
        assert!(parse_viewer(Some("age=-4")).is_err());
    }

    #[test]
    fn client_ip_prefers_forwarded_header() {
        let peer: SocketAddr = "10.1.1.1:5000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("10.1.1.1"));
        assert_eq!(client_ip(&headers, None), None);

        let forwarded = HeaderValue::from_static("203.0.113.9, 10.0.0.2");
        headers.insert("x-forwarded-for", forwarded);
        let ip = client_ip(&headers, Some(peer));
        assert_eq!(ip.as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn error_status_mapping() {
        let resp = ApiError(AdServeError::validation("bad")).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let resp = ApiError(AdServeError::not_found("ad", 1)).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = ApiError(AdServeError::Storage("down".into())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
