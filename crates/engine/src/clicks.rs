//! Click recording with per-session duplicate suppression.
//!
//! A visitor is identified by a SHA-256 fingerprint of `"{ip}-{user_agent}"`.
//! Repeat clicks on the same ad from the same fingerprint inside the
//! de-duplication window are not counted. Visitors missing either value get
//! a random fingerprint, so their clicks are never suppressed.
//!
//! The recent-click check and the insert are separate store calls; two
//! simultaneous clicks from one session can both be counted.

use adserve_core::types::{AdId, NewClick};
use adserve_core::{AdServeResult, Clock};
use adserve_store::AdRepository;
use chrono::Duration;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct ClickOutcome {
    /// False when the click was suppressed as a duplicate or could not be
    /// stored.
    pub recorded: bool,
    pub redirect_url: String,
    pub session_id: String,
}

/// Compute SHA-256 hex digest.
fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Session fingerprint for click de-duplication and unique-click counts.
/// Values are hashed as received; only an empty string counts as missing.
pub fn session_fingerprint(ip: Option<&str>, user_agent: Option<&str>) -> String {
    let ip = ip.filter(|s| !s.is_empty());
    let user_agent = user_agent.filter(|s| !s.is_empty());
    match (ip, user_agent) {
        (Some(ip), Some(ua)) => sha256_hex(&format!("{ip}-{ua}")),
        _ => sha256_hex(&Uuid::new_v4().to_string()),
    }
}

pub struct ClickRecorder {
    repo: Arc<dyn AdRepository>,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl ClickRecorder {
    pub fn new(repo: Arc<dyn AdRepository>, clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            repo,
            clock,
            window,
        }
    }

    /// Record a click on `ad_id` and return where to send the visitor.
    /// Only an unknown ad is an error; storage failures after the ad is
    /// resolved still yield the redirect.
    pub fn record_click(
        &self,
        ad_id: AdId,
        client_ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> AdServeResult<ClickOutcome> {
        let ad = self.repo.get_ad(ad_id)?;
        let session_id = session_fingerprint(client_ip, user_agent);
        let now = self.clock.now();

        let since = now - self.window;
        let recorded = match self.repo.find_recent_click(ad_id, &session_id, since) {
            Ok(Some(previous)) => {
                metrics::counter!("clicks.suppressed").increment(1);
                info!(
                    ad_id,
                    session_id = %session_id,
                    previous_click = previous.id,
                    "Duplicate click suppressed"
                );
                false
            }
            Ok(None) => {
                let click = NewClick {
                    ad_id,
                    timestamp: now,
                    user_ip: client_ip.map(str::to_string),
                    user_agent: user_agent.map(str::to_string),
                    session_id: session_id.clone(),
                };
                match self.repo.record_click(click) {
                    Ok(created) => {
                        metrics::counter!("clicks.recorded").increment(1);
                        debug!(ad_id, click_id = created.id, "Click recorded");
                        true
                    }
                    Err(e) => {
                        metrics::counter!("clicks.errors").increment(1);
                        error!(ad_id, error = %e, "Failed to record click");
                        false
                    }
                }
            }
            Err(e) => {
                metrics::counter!("clicks.errors").increment(1);
                error!(ad_id, error = %e, "Recent click lookup failed");
                false
            }
        };

        Ok(ClickOutcome {
            recorded,
            redirect_url: ad.target_url,
            session_id,
        })
    }
}
