use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Client for the externally hosted sentiment analysis endpoint. The
/// endpoint is opaque: JSON request in, JSON scores out, one attempt per
/// call with a request timeout and no retries.
pub struct SentimentClient {
    client: Client,
    base_url: String,
}

/// Typed response from the analysis endpoint
#[derive(Debug, Deserialize)]
struct SentimentResponse {
    scores: Vec<f64>,
}

impl SentimentClient {
    /// Build a client from `ANALYSIS_URL`, or None when backfill is not
    /// configured for this deployment.
    pub fn from_env_optional() -> Option<Self> {
        let base_url = std::env::var("ANALYSIS_URL").ok()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .ok()?;

        Some(Self { client, base_url })
    }

    /// Score a batch of message texts. Returns one score per input text,
    /// each clamped into [-1, 1].
    pub async fn score(&self, texts: &[String]) -> Result<Vec<f64>> {
        let response = self
            .client
            .post(format!("{}/v1/sentiment", self.base_url))
            .json(&json!({ "texts": texts }))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!("analysis endpoint error: {}", error_text));
        }

        let payload: SentimentResponse = response.json().await?;
        if payload.scores.len() != texts.len() {
            return Err(anyhow!(
                "analysis endpoint returned {} scores for {} texts",
                payload.scores.len(),
                texts.len()
            ));
        }

        debug!("Scored {} texts", texts.len());
        Ok(payload.scores.into_iter().map(clamp_score).collect())
    }
}

/// Scores outside [-1, 1] are clamped rather than rejected
fn clamp_score(score: f64) -> f64 {
    score.clamp(-1.0, 1.0)
}
