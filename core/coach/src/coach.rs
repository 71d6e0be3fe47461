use anyhow::{anyhow, Result};
use chrono::Utc;
use serde_json::json;
use std::time::Duration;
use tandem_schemas::{
    AgentInsight, AgentRequest, ChunkRole, CoachReply, CoachRequest, ReplyDetail, UserId,
};
use tracing::{debug, info, warn};

use crate::reply::ReplyRenderer;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Turns a coach question into a reply by consulting the external analysis
/// agent and rendering its insight.
pub struct Coach {
    renderer: ReplyRenderer,
    client: reqwest::Client,
    agent_url: String,
    ingestion_url: String,
}

impl Coach {
    pub fn new() -> Self {
        let agent_url =
            std::env::var("AGENT_URL").unwrap_or_else(|_| "http://127.0.0.1:8787".to_string());
        let ingestion_url = std::env::var("INGESTION_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:24810".to_string());

        Self::with_urls(agent_url, ingestion_url)
    }

    pub fn with_urls(agent_url: String, ingestion_url: String) -> Self {
        Self {
            renderer: ReplyRenderer::new(),
            client: reqwest::Client::new(),
            agent_url,
            ingestion_url,
        }
    }

    /// Produce a coach reply. Agent failures fall back to the documented
    /// default insight; they never fail the request and are never retried.
    pub async fn advise(&self, request: &CoachRequest) -> Result<CoachReply> {
        info!("Coach request for user {}", request.user_id);

        let timeframe_days = request.timeframe_days.unwrap_or(30).clamp(1, 365);
        let detail = request.detail.unwrap_or(ReplyDetail::Standard);

        let insight = match self.fetch_insight(&request.user_id, timeframe_days).await {
            Ok(insight) => insight,
            Err(e) => {
                warn!("Agent call failed: {:#}, using fallback insight", e);
                AgentInsight::default()
            }
        };

        let reply = self.renderer.render(&detail, &insight);

        // Persist both sides of the exchange; losing a chunk is not worth
        // failing the reply over.
        self.log_chunk(&request.user_id, ChunkRole::User, &request.question)
            .await;
        self.log_chunk(&request.user_id, ChunkRole::Coach, &reply)
            .await;

        Ok(CoachReply {
            reply,
            health_score: insight.health_score_or_default(),
            confidence: insight.confidence_or_default(),
            generated_at: Utc::now().to_rfc3339(),
        })
    }

    async fn fetch_insight(&self, user_id: &UserId, timeframe_days: u32) -> Result<AgentInsight> {
        let request = AgentRequest {
            user_id: user_id.clone(),
            analysis_type: "relationship_health".to_string(),
            timeframe_days,
            focus: None,
        };

        let response = self
            .client
            .post(format!("{}/v1/insights", self.agent_url))
            .json(&request)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("agent returned {}", response.status()));
        }

        let insight: AgentInsight = response.json().await?;
        debug!(
            "Agent insight: score={:?}, confidence={:?}",
            insight.health_score, insight.confidence
        );
        Ok(insight)
    }

    async fn log_chunk(&self, user_id: &UserId, role: ChunkRole, content: &str) {
        let result = self
            .client
            .post(format!("{}/chunks", self.ingestion_url))
            .header("x-tandem-user", &user_id.0)
            .json(&json!({ "role": role.as_str(), "content": content }))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => warn!("Chunk logging returned {}", response.status()),
            Err(e) => warn!("Chunk logging failed: {:#}", e),
        }
    }
}

impl Default for Coach {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_schemas::DEFAULT_AGENT_HEALTH_SCORE;

    #[tokio::test]
    async fn unreachable_agent_falls_back_to_defaults() {
        // Nothing listens on the discard port; both calls fail fast and the
        // reply still comes back with the documented fallbacks.
        let coach = Coach::with_urls(
            "http://127.0.0.1:9".to_string(),
            "http://127.0.0.1:9".to_string(),
        );

        let reply = coach
            .advise(&CoachRequest {
                user_id: UserId("usr_test".to_string()),
                question: "how are we doing?".to_string(),
                timeframe_days: None,
                detail: Some(ReplyDetail::Brief),
            })
            .await
            .unwrap();

        assert_eq!(reply.health_score, DEFAULT_AGENT_HEALTH_SCORE);
        assert_eq!(reply.confidence, 0.0);
        assert!(reply.reply.contains("7.5/10"));
    }
}
