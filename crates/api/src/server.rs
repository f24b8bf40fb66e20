//! API server: HTTP routes plus the Prometheus exporter.

use crate::admin_rest;
use crate::rest::{self, AppState};
use adserve_core::AppConfig;
use axum::routing::{get, patch, post, put};
use axum::Router;
use std::net::SocketAddr;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Full HTTP surface with middleware applied.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Serving
        .route("/v1/ads/serve", get(rest::serve_ad))
        .route("/v1/ads/:id/redirect", get(rest::redirect_click))
        .route("/v1/carousels/:id", get(rest::show_carousel))
        .route("/v1/statistics", get(rest::statistics))
        // Management
        .route(
            "/v1/ads",
            get(admin_rest::list_ads).post(admin_rest::create_ad),
        )
        .route("/v1/ads/:id", patch(admin_rest::set_ad_status))
        .route(
            "/v1/carousels",
            get(admin_rest::list_carousels).post(admin_rest::create_carousel),
        )
        .route(
            "/v1/campaigns",
            get(admin_rest::list_campaigns).post(admin_rest::create_campaign),
        )
        .route(
            "/v1/campaigns/:id",
            put(admin_rest::update_campaign).delete(admin_rest::delete_campaign),
        )
        .route("/v1/keywords", get(admin_rest::list_keywords))
        .route("/v1/conversions", post(admin_rest::create_conversion))
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct ApiServer {
    config: AppConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: AppConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = router(self.state.clone());
        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;

        Ok(())
    }

    /// Start the metrics exporter on its own port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
