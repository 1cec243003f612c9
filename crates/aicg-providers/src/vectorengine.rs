//! VectorEngine-style video generation adapter.
//!
//! Two-phase API: `POST /video/create` returns a task id; the clip is
//! ready minutes later and is picked up via `GET /videos/{id}`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::traits::VideoModel;
use crate::types::{VideoPollOutcome, VideoSubmitRequest};

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);
const POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// VectorEngine provider client.
pub struct VectorEngine {
    base_url: String,
    api_key: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct CreateVideoRequest<'a> {
    prompt: &'a str,
    model: &'a str,
    images: Vec<String>,
    aspect_ratio: &'static str,
    duration: u32,
}

#[derive(Debug, Deserialize)]
struct CreateVideoResponse {
    id: Option<String>,
    task_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskStatusResponse {
    status: Option<String>,
    video_url: Option<String>,
    error: Option<serde_json::Value>,
    #[serde(default)]
    detail: Option<TaskDetail>,
}

#[derive(Debug, Deserialize)]
struct TaskDetail {
    video_url: Option<String>,
}

impl VectorEngine {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl VideoModel for VectorEngine {
    async fn submit(&self, req: VideoSubmitRequest) -> ProviderResult<String> {
        let images: Vec<String> = [req.first_frame.clone(), req.last_frame.clone()]
            .into_iter()
            .flatten()
            .collect();

        let body = CreateVideoRequest {
            prompt: &req.prompt,
            model: &req.model,
            images,
            aspect_ratio: "16:9",
            duration: req.duration_s,
        };

        debug!(model = %req.model, "Submitting video generation task");
        let response = self
            .client
            .post(format!("{}/video/create", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(SUBMIT_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(SUBMIT_TIMEOUT.as_secs())
                } else {
                    ProviderError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }

        let parsed: CreateVideoResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        parsed
            .id
            .or(parsed.task_id)
            .ok_or_else(|| ProviderError::Malformed("submit response carried no task id".into()))
    }

    async fn poll(&self, external_task_id: &str) -> ProviderResult<VideoPollOutcome> {
        let response = self
            .client
            .get(format!("{}/videos/{}", self.base_url, external_task_id))
            .bearer_auth(&self.api_key)
            .timeout(POLL_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(POLL_TIMEOUT.as_secs())
                } else {
                    ProviderError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }

        let parsed: TaskStatusResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        match parsed.status.as_deref() {
            Some("completed") => {
                // Finished clips report the URL at the top level; some
                // deployments tuck it into `detail`.
                let video_url = parsed
                    .video_url
                    .or(parsed.detail.and_then(|d| d.video_url));
                match video_url {
                    Some(video_url) => Ok(VideoPollOutcome::Completed { video_url }),
                    None => Ok(VideoPollOutcome::Failed {
                        error: "generation completed but no video URL returned".into(),
                    }),
                }
            }
            Some("failed") => {
                let error = parsed
                    .error
                    .map(|e| match e {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .unwrap_or_else(|| "video generation failed".into());
                Ok(VideoPollOutcome::Failed { error })
            }
            Some("pending") | Some("processing") | Some("video_generating") => {
                Ok(VideoPollOutcome::Pending)
            }
            other => {
                debug!(status = ?other, "Unrecognized task status, treating as pending");
                Ok(VideoPollOutcome::Pending)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_body_carries_both_frames_in_order() {
        let req = VideoSubmitRequest::new("a calm pan", "veo-fast")
            .with_frames(Some("data:first".into()), Some("data:last".into()));
        let images: Vec<String> = [req.first_frame.clone(), req.last_frame.clone()]
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(images, vec!["data:first".to_string(), "data:last".to_string()]);
        assert_eq!(req.duration_s, 8);
    }

    #[test]
    fn status_payload_parses_both_url_locations() {
        let top: TaskStatusResponse =
            serde_json::from_str(r#"{"status":"completed","video_url":"https://v/1.mp4"}"#).unwrap();
        assert_eq!(top.video_url.as_deref(), Some("https://v/1.mp4"));

        let nested: TaskStatusResponse = serde_json::from_str(
            r#"{"status":"completed","detail":{"video_url":"https://v/2.mp4"}}"#,
        )
        .unwrap();
        assert_eq!(
            nested.detail.and_then(|d| d.video_url).as_deref(),
            Some("https://v/2.mp4")
        );
    }
}
