//! End-to-end HTTP flows against the router, driven with `oneshot`.

use adserve_api::{router, AppState};
use adserve_core::{AppConfig, ManualClock};
use adserve_store::MemoryStore;
use axum::body::Body;
use axum::http::{header, request, HeaderMap, Request, StatusCode};
use axum::Router;
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct TestApp {
    app: Router,
    clock: Arc<ManualClock>,
}

impl TestApp {
    fn new() -> Self {
        // Wednesday
        let start = Utc.with_ymd_and_hms(2024, 6, 12, 10, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let mut config = AppConfig::default();
        config.serving.rng_seed = Some(11);
        let app = router(AppState::new(store, &config));
        Self { app, clock }
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, HeaderMap, Value) {
        let req = Request::get(uri).body(Body::empty()).unwrap();
        self.send(req).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send_json(Request::post(uri), body).await
    }

    async fn send_json(&self, builder: request::Builder, body: Value) -> (StatusCode, Value) {
        let req = builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, _, body) = self.send(req).await;
        (status, body)
    }

    async fn click(&self, ad_id: u64, ip: &str) -> (StatusCode, HeaderMap) {
        let req = Request::get(format!("/v1/ads/{ad_id}/redirect"))
            .header("x-forwarded-for", ip)
            .header(header::USER_AGENT, "integration-test/1.0")
            .body(Body::empty())
            .unwrap();
        let (status, headers, _) = self.send(req).await;
        (status, headers)
    }

    async fn seed(&self) -> (u64, u64, u64) {
        let (status, campaign) = self
            .post(
                "/v1/campaigns",
                json!({
                    "name": "Summer",
                    "start_date": "2024-06-01",
                    "end_date": "2024-06-30",
                    "budget": 500.0
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let campaign_id = campaign["id"].as_u64().unwrap();

        let (status, targeted) = self
            .post(
                "/v1/ads",
                json!({
                    "campaign_id": campaign_id,
                    "name": "Young adults",
                    "target_url": "https://example.com/young",
                    "target_age_min": 18,
                    "target_age_max": 35
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, universal) = self
            .post(
                "/v1/ads",
                json!({
                    "campaign_id": campaign_id,
                    "name": "Everyone",
                    "image": "summer.png",
                    "target_url": "https://example.com/all"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let image = universal["image"].as_str().unwrap();
        assert!(image.starts_with("images/banners/"));
        assert!(image.ends_with(".png"));

        (
            campaign_id,
            targeted["id"].as_u64().unwrap(),
            universal["id"].as_u64().unwrap(),
        )
    }
}

#[tokio::test]
async fn empty_inventory_is_no_ad_available() {
    let t = TestApp::new();
    let (status, _, body) = t.get("/v1/ads/serve").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "no_ad_available");
    assert_eq!(body["message"], "No ad available");
}

#[tokio::test]
async fn serve_respects_age_targeting() {
    let t = TestApp::new();
    let (_, targeted, universal) = t.seed().await;

    for _ in 0..20 {
        let (status, _, body) = t.get("/v1/ads/serve?age=50").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ad"]["id"].as_u64(), Some(universal));
        assert_eq!(body["fallback"], false);
    }

    let mut seen_targeted = false;
    for _ in 0..50 {
        let (_, _, body) = t.get("/v1/ads/serve?age=25&keywords=a&keywords=b").await;
        seen_targeted |= body["ad"]["id"].as_u64() == Some(targeted);
    }
    assert!(seen_targeted);
}

#[tokio::test]
async fn malformed_viewer_is_bad_request() {
    let t = TestApp::new();
    t.seed().await;
    let (status, _, body) = t.get("/v1/ads/serve?age=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, _, _) = t.get("/v1/ads/serve?gender=X").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn redirect_counts_once_per_window() {
    let t = TestApp::new();
    let (_, targeted, _) = t.seed().await;

    let (status, headers) = t.click(targeted, "198.51.100.7").await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(headers[header::LOCATION], "https://example.com/young");

    t.clock.advance(Duration::seconds(2));
    let (status, headers) = t.click(targeted, "198.51.100.7").await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(headers[header::LOCATION], "https://example.com/young");

    let (_, _, stats) = t.get("/v1/statistics").await;
    assert_eq!(stats["total_clicks"], 1);

    t.clock.advance(Duration::seconds(10));
    t.click(targeted, "198.51.100.7").await;
    t.click(targeted, "192.0.2.44").await;

    let (_, _, stats) = t.get("/v1/statistics?selected_date=2024-06-12").await;
    assert_eq!(stats["total_clicks"], 3);
    assert_eq!(stats["unique_clicks"], 2);
    assert_eq!(stats["timeline"]["is_hourly"], true);
    assert_eq!(stats["timeline"]["points"][0]["time"], "10:00");
    assert_eq!(stats["ads"][0]["ad_id"].as_u64(), Some(targeted));
}

#[tokio::test]
async fn redirect_for_unknown_ad_is_not_found() {
    let t = TestApp::new();
    let (status, _) = t.click(999, "198.51.100.7").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn statistics_report_bad_dates_as_warnings() {
    let t = TestApp::new();
    let (status, _, body) = t
        .get("/v1/statistics?start_date=12-06-2024&end_date=2024-06-30")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["start_date"], "");
    assert_eq!(body["end_date"], "2024-06-30");
    assert_eq!(body["warnings"].as_array().unwrap().len(), 1);
    assert_eq!(body["timeline"]["title"], "Clicks per day");
}

#[tokio::test]
async fn carousel_lifecycle() {
    let t = TestApp::new();
    let (campaign_id, targeted, universal) = t.seed().await;

    let (status, carousel) = t
        .post(
            "/v1/carousels",
            json!({
                "campaign_id": campaign_id,
                "name": "Front page",
                "ad_ids": [targeted, universal]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let carousel_id = carousel["id"].as_u64().unwrap();

    let (status, _) = t
        .post(
            "/v1/carousels",
            json!({ "campaign_id": campaign_id, "name": "Front page" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) = t.get(&format!("/v1/carousels/{carousel_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ads"].as_array().unwrap().len(), 2);

    let (_, _, listed) = t.get("/v1/carousels").await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, _, _) = t.get("/v1/carousels/4242").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_a_campaign_removes_its_ads() {
    let t = TestApp::new();
    let (campaign_id, _, _) = t.seed().await;

    let (_, _, ads) = t.get("/v1/ads").await;
    assert_eq!(ads.as_array().unwrap().len(), 2);

    let req = Request::delete(format!("/v1/campaigns/{campaign_id}"))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = t.send(req).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, _, ads) = t.get("/v1/ads").await;
    assert!(ads.as_array().unwrap().is_empty());

    let (status, _, _) = t.get("/v1/ads/serve").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_ad_is_rejected() {
    let t = TestApp::new();
    let (campaign_id, _, _) = t.seed().await;
    let (status, body) = t
        .post(
            "/v1/ads",
            json!({
                "campaign_id": campaign_id,
                "name": "Broken",
                "target_url": "not a url"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, _) = t
        .post(
            "/v1/ads",
            json!({ "campaign_id": 777, "name": "Orphan", "target_url": "https://example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn conversions_show_up_in_statistics() {
    let t = TestApp::new();
    let (status, _) = t
        .post("/v1/conversions", json!({ "conversion_type": "signup" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, _, stats) = t.get("/v1/statistics").await;
    assert_eq!(stats["conversions"]["dates"][0], "2024-06-12");
    assert_eq!(stats["conversions"]["series"]["signup"][0], 1);
}

#[tokio::test]
async fn health_endpoints_respond() {
    let t = TestApp::new();
    let (status, _, body) = t.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["node_id"], "node-01");
    assert_eq!(t.get("/ready").await.0, StatusCode::OK);
    assert_eq!(t.get("/live").await.0, StatusCode::OK);
}

#[tokio::test]
async fn campaigns_can_be_listed_and_edited() {
    let t = TestApp::new();
    let (campaign_id, _, _) = t.seed().await;

    let (status, _, listed) = t.get("/v1/campaigns").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["name"], "Summer");

    t.clock.advance(Duration::hours(1));
    let uri = format!("/v1/campaigns/{campaign_id}");
    let edit = json!({
        "name": "Late summer",
        "start_date": "2024-06-01",
        "end_date": "2024-08-31",
        "budget": 750.0
    });
    let (status, updated) = t.send_json(Request::put(&uri), edit).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Late summer");
    assert_eq!(updated["end_date"], "2024-08-31");
    assert_ne!(updated["updated_at"], updated["created_at"]);

    let backwards = json!({
        "name": "Backwards",
        "start_date": "2024-08-31",
        "end_date": "2024-06-01",
        "budget": 750.0
    });
    let (status, body) = t.send_json(Request::put(&uri), backwards).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (_, _, listed) = t.get("/v1/campaigns").await;
    assert_eq!(listed[0]["name"], "Late summer");

    let ghost = json!({
        "name": "Ghost",
        "start_date": "2024-06-01",
        "end_date": "2024-06-30",
        "budget": 1.0
    });
    let (status, _) = t
        .send_json(Request::put("/v1/campaigns/4242"), ghost)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn paused_ad_is_not_served() {
    let t = TestApp::new();
    let (_, targeted, universal) = t.seed().await;

    let uri = format!("/v1/ads/{universal}");
    let (status, ad) = t
        .send_json(Request::patch(&uri), json!({ "is_active": false }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ad["is_active"], false);

    for _ in 0..10 {
        let (status, _, body) = t.get("/v1/ads/serve?age=25").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ad"]["id"].as_u64(), Some(targeted));
    }

    let (status, _) = t
        .send_json(Request::patch("/v1/ads/4242"), json!({ "is_active": true }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ad_keywords_are_listed() {
    let t = TestApp::new();
    let (campaign_id, _, _) = t.seed().await;
    let (status, _) = t
        .post(
            "/v1/ads",
            json!({
                "campaign_id": campaign_id,
                "name": "Gear",
                "target_url": "https://example.com/gear",
                "target_keywords": ["outdoor", "camping"]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, keywords) = t.get("/v1/keywords").await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = keywords
        .as_array()
        .unwrap()
        .iter()
        .map(|k| k["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["camping", "outdoor"]);
}
