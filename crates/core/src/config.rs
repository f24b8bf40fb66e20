use crate::error::{AdServeError, AdServeResult};
use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `ADSERVE__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub serving: ServingConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServingConfig {
    /// Clicks from the same session on the same ad inside this window are
    /// not counted again.
    #[serde(default = "default_click_dedup_window_secs")]
    pub click_dedup_window_secs: u64,
    /// Fixed seed for the selection RNG. Unset means seeded from entropy.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub seed_demo_data: bool,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_click_dedup_window_secs() -> u64 {
    5
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            click_dedup_window_secs: default_click_dedup_window_secs(),
            rng_seed: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            serving: ServingConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `ADSERVE__*` environment variables.
    pub fn load() -> AdServeResult<Self> {
        Self::from_environment(None)
    }

    /// `vars` stands in for the process environment when given.
    fn from_environment(vars: Option<config::Map<String, String>>) -> AdServeResult<Self> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("ADSERVE")
                .separator("__")
                .try_parsing(true)
                .source(vars),
        );

        builder
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|e| AdServeError::Config(e.to_string()))
    }

    pub fn click_dedup_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.serving.click_dedup_window_secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.api.http_port, 8080);
        assert_eq!(config.metrics.port, 9091);
        assert_eq!(config.serving.click_dedup_window_secs, 5);
        assert!(config.serving.rng_seed.is_none());
        assert!(!config.store.seed_demo_data);
        assert_eq!(config.click_dedup_window(), chrono::Duration::seconds(5));
    }

    #[test]
    fn partial_sections_fall_back_to_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"api": {"http_port": 9000}, "serving": {"rng_seed": 7}}"#)
                .unwrap();
        assert_eq!(config.api.http_port, 9000);
        assert_eq!(config.api.host, "0.0.0.0");
        assert_eq!(config.serving.rng_seed, Some(7));
        assert_eq!(config.serving.click_dedup_window_secs, 5);
        assert_eq!(config.node_id, "node-01");
    }

    fn vars(pairs: &[(&str, &str)]) -> Option<config::Map<String, String>> {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Some(map)
    }

    #[test]
    fn environment_overrides_defaults() {
        let env = vars(&[
            ("ADSERVE__NODE_ID", "edge-7"),
            ("ADSERVE__API__HTTP_PORT", "9000"),
            ("ADSERVE__SERVING__RNG_SEED", "3"),
        ]);
        let config = AppConfig::from_environment(env).unwrap();
        assert_eq!(config.node_id, "edge-7");
        assert_eq!(config.api.http_port, 9000);
        assert_eq!(config.serving.rng_seed, Some(3));
        assert_eq!(config.metrics.port, 9091);
    }

    #[test]
    fn unparsable_environment_is_a_config_error() {
        let bad_port = vars(&[("ADSERVE__API__HTTP_PORT", "not-a-port")]);
        let err = AppConfig::from_environment(bad_port).unwrap_err();
        assert!(matches!(err, AdServeError::Config(_)));
    }
}
