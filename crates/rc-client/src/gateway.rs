use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use rc_core::{BatchSubmission, JobSpec, JobState, JobStatus, TemplateRead};

use crate::error::GatewayError;
use crate::identity::CredentialProvider;

/// Stateless wrapper over the remote pipeline endpoints. No retries, no
/// state beyond the HTTP client itself.
#[async_trait]
pub trait PipelineGateway: Send + Sync {
    /// Enqueues a batch of jobs under one trace id. At most one call per
    /// user-initiated submission; the session guarantees this.
    async fn enqueue(
        &self,
        trace_id: &str,
        jobs: &[JobSpec],
    ) -> Result<BatchSubmission, GatewayError>;

    /// Queries current status of the given jobs. `job_ids` must be
    /// non-empty. The response may cover only a subset of the requested
    /// ids; a missing id means the backend has not recorded it yet.
    async fn query_status(&self, job_ids: &[String]) -> Result<Vec<JobStatus>, GatewayError>;

    /// Fetches the available recast templates.
    async fn list_templates(&self) -> Result<Vec<TemplateRead>, GatewayError>;
}

#[derive(Debug, Serialize)]
struct QueueRequest<'a> {
    trace_id: &'a str,
    jobs: &'a [JobSpec],
}

#[derive(Debug, Deserialize)]
struct QueueResponse {
    trace_id: String,
    job_ids: Vec<String>,
    accepted_count: usize,
}

#[derive(Debug, Serialize)]
struct StatusRequest<'a> {
    job_ids: &'a [String],
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    jobs: Vec<StatusItem>,
}

#[derive(Debug, Deserialize)]
struct StatusItem {
    id: String,
    status: JobState,
    #[serde(default)]
    result_url: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl From<StatusItem> for JobStatus {
    fn from(item: StatusItem) -> Self {
        JobStatus {
            job_id: item.id,
            state: item.status,
            result_locator: item.result_url,
            error_detail: item.message,
        }
    }
}

/// Per-request cap so a black-holed connection surfaces as a transport
/// error instead of hanging a poll.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, credentials: Arc<dyn CredentialProvider>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            base_url,
            credentials,
        }
    }

    async fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.credentials.bearer_token().await {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl PipelineGateway for HttpGateway {
    async fn enqueue(
        &self,
        trace_id: &str,
        jobs: &[JobSpec],
    ) -> Result<BatchSubmission, GatewayError> {
        let url = format!("{}/pipelines/queue", self.base_url);
        let request = self
            .authorized(self.client.post(url))
            .await
            .json(&QueueRequest { trace_id, jobs });

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(GatewayError::from_response(response).await);
        }

        let body: QueueResponse = response.json().await?;
        Ok(BatchSubmission {
            trace_id: body.trace_id,
            job_ids: body.job_ids,
            accepted_count: body.accepted_count,
        })
    }

    async fn query_status(&self, job_ids: &[String]) -> Result<Vec<JobStatus>, GatewayError> {
        if job_ids.is_empty() {
            return Err(GatewayError::Protocol {
                status: 0,
                message: "status query requires at least one job id".to_string(),
            });
        }
        let url = format!("{}/pipelines/status", self.base_url);
        let request = self
            .authorized(self.client.post(url))
            .await
            .json(&StatusRequest { job_ids });

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(GatewayError::from_response(response).await);
        }

        let body: StatusResponse = response.json().await?;
        Ok(body.jobs.into_iter().map(JobStatus::from).collect())
    }

    async fn list_templates(&self) -> Result<Vec<TemplateRead>, GatewayError> {
        let url = format!("{}/recast/templates", self.base_url);
        let response = self.authorized(self.client.get(url)).await.send().await?;
        if !response.status().is_success() {
            return Err(GatewayError::from_response(response).await);
        }

        Ok(response.json().await?)
    }
}
