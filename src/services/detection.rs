//! Client for the external OMR detection service.
//!
//! Bubble detection is a separate deployment with its own computer-vision
//! pipeline; this service only submits a scanned sheet image and receives the
//! ordered answer tokens back. Payloads are parsed defensively since the
//! detector has shipped several response shapes over time.

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::core::config::Settings;

#[derive(Debug, Clone)]
pub(crate) struct DetectionOutcome {
    /// One token per question, aligned with question order; empty string
    /// where the detector found no mark.
    pub(crate) responses: Vec<String>,
    pub(crate) confidences: Option<Vec<f64>>,
    pub(crate) model: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct DetectionService {
    client: Client,
    api_key: String,
    base_url: String,
    max_submit_retries: u32,
}

impl DetectionService {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.detection().timeout_seconds);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .timeout(timeout)
            .build()
            .context("Failed to build detection HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.detection().api_key.clone(),
            base_url: settings.detection().base_url.trim_end_matches('/').to_string(),
            max_submit_retries: settings.detection().max_submit_retries,
        })
    }

    pub(crate) async fn detect_sheet(
        &self,
        filename: &str,
        mime_type: &str,
        bytes: Vec<u8>,
        question_count: usize,
    ) -> Result<DetectionOutcome> {
        let endpoint = format!("{}/detect", self.base_url);

        let mut last_error = None;

        for attempt in 0..=self.max_submit_retries {
            let part = Part::bytes(bytes.clone())
                .file_name(filename.to_string())
                .mime_str(mime_type)
                .context("Invalid sheet MIME type")?;
            let form = Form::new()
                .part("file", part)
                .text("question_count", question_count.to_string());

            let response = self
                .client
                .post(&endpoint)
                .header("X-Api-Key", &self.api_key)
                .multipart(form)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    let raw_body =
                        resp.text().await.context("Failed to read detection response")?;

                    let parsed = serde_json::from_str::<Value>(&raw_body).map_err(|err| {
                        anyhow::anyhow!(
                            "Detection service returned non-JSON body (status {}): {}: {}",
                            status,
                            err,
                            raw_body
                        )
                    })?;

                    if !status.is_success() {
                        last_error = Some(anyhow::anyhow!(
                            "Detection submit failed (status {}): {}",
                            status,
                            extract_error_message(&parsed)
                        ));
                    } else if parsed
                        .get("success")
                        .and_then(Value::as_bool)
                        .is_some_and(|value| !value)
                    {
                        return Err(anyhow::anyhow!(
                            "Detection service reported failure: {}",
                            extract_error_message(&parsed)
                        ));
                    } else if let Some(outcome) = extract_outcome(&parsed) {
                        return Ok(outcome);
                    } else {
                        last_error = Some(anyhow::anyhow!(
                            "Detection response missing detected responses"
                        ));
                    }
                }
                Err(err) => {
                    last_error =
                        Some(anyhow::anyhow!(err).context("Failed to call detection service"));
                }
            }

            if attempt < self.max_submit_retries {
                let backoff = Duration::from_secs(2_u64.pow(attempt));
                tokio::time::sleep(backoff).await;
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Unknown detection submit error")))
    }
}

fn extract_outcome(payload: &Value) -> Option<DetectionOutcome> {
    let container = payload.get("result").unwrap_or(payload);

    let responses = container
        .get("detectedResponses")
        .or_else(|| container.get("responses"))
        .and_then(Value::as_array)?
        .iter()
        .map(|item| item.as_str().unwrap_or("").trim().to_string())
        .collect();

    let confidences = container.get("confidences").and_then(Value::as_array).map(|values| {
        values.iter().map(|item| item.as_f64().unwrap_or(0.0)).collect::<Vec<_>>()
    });

    let model =
        container.get("model").and_then(Value::as_str).map(|value| value.to_string()).or_else(
            || payload.get("model").and_then(Value::as_str).map(|value| value.to_string()),
        );

    Some(DetectionOutcome { responses, confidences, model })
}

fn extract_error_message(payload: &Value) -> String {
    if let Some(detail) = payload.get("detail") {
        if let Some(text) = detail.as_str() {
            return text.to_string();
        }
        if let Some(items) = detail.as_array() {
            let joined = items
                .iter()
                .filter_map(|item| {
                    item.get("msg")
                        .and_then(Value::as_str)
                        .or_else(|| item.get("message").and_then(Value::as_str))
                })
                .collect::<Vec<_>>()
                .join("; ");
            if !joined.is_empty() {
                return joined;
            }
        }
    }

    payload
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| payload.get("error").and_then(Value::as_str))
        .unwrap_or("unknown_error")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_outcome_reads_flat_payload() {
        let payload = json!({
            "success": true,
            "detectedResponses": ["a", "B ", "", "d"],
            "confidences": [0.98, 0.91, 0.2, 0.88],
            "model": "bubble-net-v2"
        });

        let outcome = extract_outcome(&payload).expect("outcome");
        assert_eq!(outcome.responses, vec!["a", "B", "", "d"]);
        assert_eq!(outcome.confidences.as_deref(), Some(&[0.98, 0.91, 0.2, 0.88][..]));
        assert_eq!(outcome.model.as_deref(), Some("bubble-net-v2"));
    }

    #[test]
    fn extract_outcome_reads_nested_result() {
        let payload = json!({
            "success": true,
            "result": {"responses": ["a", "b"]}
        });

        let outcome = extract_outcome(&payload).expect("outcome");
        assert_eq!(outcome.responses, vec!["a", "b"]);
        assert!(outcome.confidences.is_none());
    }

    #[test]
    fn extract_outcome_requires_responses() {
        let payload = json!({"success": true, "model": "bubble-net-v2"});
        assert!(extract_outcome(&payload).is_none());
    }

    #[test]
    fn extract_error_message_prefers_detail() {
        let payload = json!({"detail": "sheet image unreadable"});
        assert_eq!(extract_error_message(&payload), "sheet image unreadable");

        let payload = json!({"detail": [{"msg": "bad file"}, {"message": "too small"}]});
        assert_eq!(extract_error_message(&payload), "bad file; too small");

        let payload = json!({"error": "boom"});
        assert_eq!(extract_error_message(&payload), "boom");

        let payload = json!({});
        assert_eq!(extract_error_message(&payload), "unknown_error");
    }
}
