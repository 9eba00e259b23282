use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::Config;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatePayload {
    pub transcript: String,
    pub diagram_base64: String,
    pub previous_state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewEvaluation {
    pub transcript: String,
    pub diagram_score: f64,
    pub verbal_score: f64,
    pub overall_score: f64,
    #[serde(default)]
    pub design_aspects: Vec<DesignAspect>,
    pub minimax_emotion: VoiceEmotion,
    pub verbal_feedback: String,
    #[serde(default)]
    pub follow_up_question: Option<String>,
    pub should_interrupt: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignAspect {
    pub component: String,
    pub score: f64,
    pub feedback: String,
    #[serde(default)]
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceEmotion {
    Skeptical,
    Encouraging,
    Concerned,
    Approving,
    Curious,
    #[default]
    Neutral,
}

#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    emotion: VoiceEmotion,
}

/// HTTP client for the evaluation/TTS backend. Failures carry the
/// response body text so the caller has something displayable.
#[derive(Debug, Clone)]
pub struct EvaluationClient {
    base_url: String,
    client: Client,
}

impl EvaluationClient {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self { base_url, client }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.backend.api_url.trim_end_matches('/').to_string())
    }

    /// Check if the backend is reachable.
    pub async fn health(&self) -> bool {
        self.client
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .map(|response| response.status().is_success())
            .unwrap_or(false)
    }

    /// Submit one transcript/diagram round for evaluation.
    pub async fn evaluate(&self, payload: &EvaluatePayload) -> Result<InterviewEvaluation> {
        tracing::debug!(
            "POST /evaluate transcript_len={} diagram_len={}",
            payload.transcript.len(),
            payload.diagram_base64.len()
        );

        let response = self
            .client
            .post(format!("{}/evaluate", self.base_url))
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("Evaluation failed with status {}: {}", status, error_text);
            return Err(anyhow!("Evaluation failed: {} - {}", status, error_text));
        }

        let evaluation: InterviewEvaluation = response.json().await?;
        Ok(evaluation)
    }

    /// Fetch spoken feedback as s16le 24 kHz mono PCM, consumed in full.
    pub async fn tts_stream(&self, text: &str, emotion: VoiceEmotion) -> Result<Vec<u8>> {
        tracing::debug!("POST /tts/stream text_len={}", text.len());

        let response = self
            .client
            .post(format!("{}/tts/stream", self.base_url))
            .json(&TtsRequest { text, emotion })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("TTS request failed with status {}: {}", status, error_text);
            return Err(anyhow!("TTS request failed: {} - {}", status, error_text));
        }

        Ok(response.bytes().await?.to_vec())
    }
}
