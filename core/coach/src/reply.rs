use tandem_schemas::{AgentInsight, ReplyDetail};

/// Renders chat replies from agent insights at the requested detail level
pub struct ReplyRenderer;

impl ReplyRenderer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, detail: &ReplyDetail, insight: &AgentInsight) -> String {
        match detail {
            ReplyDetail::Brief => self.render_brief(insight),
            ReplyDetail::Standard => self.render_standard(insight),
            ReplyDetail::Detailed => self.render_detailed(insight),
        }
    }

    fn render_brief(&self, insight: &AgentInsight) -> String {
        format!(
            "{} (health {:.1}/10)",
            insight.summary_or_default(),
            insight.health_score_or_default()
        )
    }

    fn render_standard(&self, insight: &AgentInsight) -> String {
        let mut lines = vec![
            insight.summary_or_default().to_string(),
            format!("Health score: {:.1}/10", insight.health_score_or_default()),
        ];

        if let Some(first) = insight.recommendations_or_empty().first() {
            lines.push(format!("Try this: {}", first));
        }

        lines.join("\n")
    }

    fn render_detailed(&self, insight: &AgentInsight) -> String {
        let mut lines = vec![
            insight.summary_or_default().to_string(),
            format!("Health score: {:.1}/10", insight.health_score_or_default()),
        ];

        let recommendations = insight.recommendations_or_empty();
        if !recommendations.is_empty() {
            lines.push("Suggestions:".to_string());
            for recommendation in recommendations {
                lines.push(format!("• {}", recommendation));
            }
        }

        let confidence = insight.confidence_or_default();
        if confidence > 0.0 {
            lines.push(format!("Confidence: {:.0}%", confidence * 100.0));
        } else {
            lines.push("Confidence: unknown".to_string());
        }

        lines.join("\n")
    }
}

impl Default for ReplyRenderer {
    fn default() -> Self {
        Self::new()
    }
}
