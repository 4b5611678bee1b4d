use super::auth::RelaySigner;
use super::{EventRelay, SettingsSource};
use crate::engine::phase::PhaseDurations;
use crate::feed::games::parse_active_games;
use crate::feed::types::{ActiveGame, NormalizedEvent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Client for the admin API: limits, active games, and the event relay.
pub struct AdminRest {
    client: Client,
    signer: Option<Arc<RelaySigner>>,
    base_url: String,
}

#[derive(Deserialize)]
struct LimitsDocument {
    #[serde(rename = "type")]
    doc_type: Option<String>,
    limits: Option<Limits>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Limits {
    #[serde(default)]
    betting_time: u32,
    #[serde(default)]
    play_time: u32,
    #[serde(default)]
    waiting_time: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayMessage<'a> {
    #[serde(rename = "type")]
    msg_type: &'static str,
    event: &'a NormalizedEvent,
    emitted_at: String,
}

/// Parse a limits document. Missing fields come back as zero so the caller
/// can keep its previous value for them.
pub fn parse_limits(json: &str) -> Result<Option<PhaseDurations>> {
    let doc: LimitsDocument = serde_json::from_str(json).context("failed to parse limits document")?;
    if doc.doc_type.as_deref().is_some_and(|t| t != "limits") {
        return Ok(None);
    }
    Ok(doc.limits.map(|l| PhaseDurations {
        betting_secs: l.betting_time,
        game_secs: l.play_time,
        interval_secs: l.waiting_time,
    }))
}

impl AdminRest {
    pub fn new(base_url: &str, signer: Option<Arc<RelaySigner>>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            signer,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn signed(&self, mut req: RequestBuilder, method: &str, path: &str, body: &str) -> RequestBuilder {
        if let Some(signer) = &self.signer {
            for (k, v) in signer.headers(method, path, body) {
                req = req.header(k, v);
            }
        }
        req
    }

    /// `Ok(None)` when the admin API has no limits configured (404).
    pub async fn get_limits(&self) -> Result<Option<PhaseDurations>> {
        let path = "/limits";
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .signed(self.client.get(&url), "GET", path, "")
            .send()
            .await
            .context("GET limits failed")?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("GET limits failed ({}): {}", status, body);
        }
        let body = resp.text().await.context("failed to read limits response")?;
        parse_limits(&body)
    }

    pub async fn get_active_games(&self) -> Result<Vec<ActiveGame>> {
        let path = "/active-games";
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .signed(self.client.get(&url), "GET", path, "")
            .send()
            .await
            .context("GET active games failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("GET active games failed ({}): {}", status, body);
        }
        let body = resp.text().await.context("failed to read active games response")?;
        parse_active_games(&body)
    }

    pub async fn post_event(&self, event: &NormalizedEvent) -> Result<()> {
        let path = "/events";
        let url = format!("{}{}", self.base_url, path);
        let message = RelayMessage {
            msg_type: "game-event",
            event,
            emitted_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        };
        let body = serde_json::to_string(&message).context("failed to encode relay message")?;

        let req = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.clone());
        let resp = self
            .signed(req, "POST", path, &body)
            .send()
            .await
            .context("POST event failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("POST event failed ({}): {}", status, body);
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsSource for AdminRest {
    async fn phase_durations(&self) -> Result<Option<PhaseDurations>> {
        self.get_limits().await
    }
}

#[async_trait]
impl EventRelay for AdminRest {
    async fn publish_event(&self, event: &NormalizedEvent) -> Result<()> {
        self.post_event(event).await
    }
}
