//! The `RenderClient` trait and its `reqwest`-backed implementation
//! (`spec.md` §4.1). A thin, stateless adapter — no field beyond a
//! base URL, an HTTP client, and a polling cadence.

use async_trait::async_trait;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::RenderClientError;
use crate::workflow::{EngineHistory, EngineRunStatus, OutputRef, PromptId, WorkflowDocument};

#[async_trait]
pub trait RenderClient: Send + Sync {
    async fn submit(&self, workflow: &WorkflowDocument) -> Result<PromptId, RenderClientError>;

    async fn await_completion(
        &self,
        prompt_id: &PromptId,
        cancel: CancelToken,
        deadline: tokio::time::Instant,
    ) -> Result<EngineHistory, RenderClientError>;

    async fn fetch_artifact(&self, reference: &OutputRef) -> Result<Vec<u8>, RenderClientError>;
}

#[derive(Debug, Clone)]
pub struct HttpRenderClient {
    http: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
}

impl HttpRenderClient {
    pub fn new(base_url: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            poll_interval,
        }
    }

    fn history_url(&self, prompt_id: &PromptId) -> String {
        format!("{}/history/{}", self.base_url, prompt_id)
    }
}

#[derive(serde::Deserialize)]
struct SubmitResponse {
    prompt_id: String,
}

#[derive(serde::Deserialize)]
struct HistoryResponse {
    status: EngineRunStatus,
    #[serde(default)]
    outputs: Vec<OutputRef>,
    #[serde(default)]
    error_message: Option<String>,
}

#[async_trait]
impl RenderClient for HttpRenderClient {
    async fn submit(&self, workflow: &WorkflowDocument) -> Result<PromptId, RenderClientError> {
        let url = format!("{}/prompt", self.base_url);
        let response = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(10))
            .json(&workflow.0)
            .send()
            .await
            .map_err(|e| RenderClientError::EngineUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RenderClientError::EngineRejected(format!(
                "engine returned {}",
                response.status()
            )));
        }

        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| RenderClientError::EngineRejected(e.to_string()))?;
        Ok(PromptId(body.prompt_id))
    }

    async fn await_completion(
        &self,
        prompt_id: &PromptId,
        cancel: CancelToken,
        deadline: tokio::time::Instant,
    ) -> Result<EngineHistory, RenderClientError> {
        let mut transport_errors = 0u32;
        const MAX_TRANSPORT_ERRORS: u32 = 3;

        loop {
            if cancel.is_cancelled() {
                return Err(RenderClientError::Cancelled);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(RenderClientError::Timeout);
            }

            let poll = self
                .http
                .get(self.history_url(prompt_id))
                .timeout(Duration::from_secs(10))
                .send()
                .await;

            match poll {
                Ok(response) if response.status().is_success() => {
                    transport_errors = 0;
                    let body: HistoryResponse = response
                        .json()
                        .await
                        .map_err(|e| RenderClientError::EngineRejected(e.to_string()))?;
                    match body.status {
                        EngineRunStatus::Finished => {
                            return Ok(EngineHistory {
                                prompt_id: prompt_id.clone(),
                                status: EngineRunStatus::Finished,
                                outputs: body.outputs,
                                error_message: None,
                            });
                        }
                        EngineRunStatus::Error => {
                            return Err(RenderClientError::EngineRejected(
                                body.error_message.unwrap_or_else(|| "engine run failed".to_string()),
                            ));
                        }
                        EngineRunStatus::Running => {}
                    }
                }
                Ok(response) => {
                    return Err(RenderClientError::EngineRejected(format!(
                        "engine returned {}",
                        response.status()
                    )));
                }
                Err(e) => {
                    transport_errors += 1;
                    if transport_errors >= MAX_TRANSPORT_ERRORS {
                        return Err(RenderClientError::EngineUnavailable(e.to_string()));
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(RenderClientError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn fetch_artifact(&self, reference: &OutputRef) -> Result<Vec<u8>, RenderClientError> {
        let url = format!(
            "{}/view?filename={}&subfolder={}&type={}",
            self.base_url, reference.filename, reference.subfolder, reference.file_type
        );
        let response = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(60))
            .send()
            .await
            .map_err(|e| RenderClientError::EngineUnavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RenderClientError::ArtifactMissing(reference.filename.clone()));
        }
        if !response.status().is_success() {
            return Err(RenderClientError::EngineRejected(format!(
                "engine returned {}",
                response.status()
            )));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| RenderClientError::EngineUnavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn workflow() -> WorkflowDocument {
        WorkflowDocument::new(serde_json::json!({"nodes": []}))
    }

    #[tokio::test]
    async fn submit_returns_prompt_id_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "prompt_id": "abc123"
            })))
            .mount(&server)
            .await;

        let client = HttpRenderClient::new(server.uri(), Duration::from_millis(10));
        let id = client.submit(&workflow()).await.unwrap();
        assert_eq!(id.0, "abc123");
    }

    #[tokio::test]
    async fn submit_maps_non_success_status_to_engine_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let client = HttpRenderClient::new(server.uri(), Duration::from_millis(10));
        let err = client.submit(&workflow()).await.unwrap_err();
        assert!(matches!(err, RenderClientError::EngineRejected(_)));
    }

    #[tokio::test]
    async fn submit_against_unreachable_host_is_engine_unavailable() {
        let client = HttpRenderClient::new("http://127.0.0.1:1", Duration::from_millis(10));
        let err = client.submit(&workflow()).await.unwrap_err();
        assert!(matches!(err, RenderClientError::EngineUnavailable(_)));
    }

    #[tokio::test]
    async fn await_completion_returns_history_once_finished() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/history/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "finished",
                "outputs": [{"filename": "out.png", "subfolder": "", "file_type": "output"}]
            })))
            .mount(&server)
            .await;

        let client = HttpRenderClient::new(server.uri(), Duration::from_millis(5));
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        let history = client
            .await_completion(&PromptId("p1".to_string()), CancelToken::new(), deadline)
            .await
            .unwrap();
        assert_eq!(history.outputs.len(), 1);
    }

    #[tokio::test]
    async fn await_completion_honors_cancellation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/history/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "running",
                "outputs": []
            })))
            .mount(&server)
            .await;

        let client = HttpRenderClient::new(server.uri(), Duration::from_millis(20));
        let cancel = CancelToken::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel_clone.cancel();
        });
        let err = client
            .await_completion(&PromptId("p1".to_string()), cancel, deadline)
            .await
            .unwrap_err();
        assert!(matches!(err, RenderClientError::Cancelled));
    }

    #[tokio::test]
    async fn await_completion_times_out_when_deadline_already_passed() {
        let server = MockServer::start().await;
        let client = HttpRenderClient::new(server.uri(), Duration::from_millis(10));
        let deadline = tokio::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let err = client
            .await_completion(&PromptId("p1".to_string()), CancelToken::new(), deadline)
            .await
            .unwrap_err();
        assert!(matches!(err, RenderClientError::Timeout));
    }

    #[tokio::test]
    async fn fetch_artifact_maps_404_to_artifact_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/view"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpRenderClient::new(server.uri(), Duration::from_millis(10));
        let reference = OutputRef {
            filename: "out.png".to_string(),
            subfolder: String::new(),
            file_type: "output".to_string(),
        };
        let err = client.fetch_artifact(&reference).await.unwrap_err();
        assert!(matches!(err, RenderClientError::ArtifactMissing(_)));
    }

    #[tokio::test]
    async fn fetch_artifact_returns_bytes_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/view"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"pngbytes".to_vec()))
            .mount(&server)
            .await;

        let client = HttpRenderClient::new(server.uri(), Duration::from_millis(10));
        let reference = OutputRef {
            filename: "out.png".to_string(),
            subfolder: String::new(),
            file_type: "output".to_string(),
        };
        let bytes = client.fetch_artifact(&reference).await.unwrap();
        assert_eq!(bytes, b"pngbytes");
    }
}
