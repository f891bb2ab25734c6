//! Service API client (application backend → mailq server).
//!
//! Every request carries the API key as `Authorization: Bearer {key}`.

use reqwest::Client;
use serde::de::DeserializeOwned;
use url::Url;
use uuid::Uuid;

use super::ClientError;
use crate::objects::{
    AnalyticsSummary, JobResponse, QueueStats, SendEmailRequest, SendEmailResponse, TimeRange,
    TrackEventRequest,
};

/// Typed HTTP client for the mailq **service API**.
#[derive(Debug, Clone)]
pub struct MailClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl MailClient {
    /// Create a new `MailClient`.
    ///
    /// * `base_url` – root URL of the mailq server (e.g. `https://mail.example.com`).
    /// * `api_key` – a principal's API key (`mq_{prefix}_{secret}`).
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            api_key: api_key.into(),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one (e.g. to
    /// configure timeouts or a proxy).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `POST /api/v1/emails` – queue an email.
    pub async fn send_email(
        &self,
        request: &SendEmailRequest,
    ) -> Result<SendEmailResponse, ClientError> {
        let url = self.base_url.join("/api/v1/emails")?;
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/emails/{id}` – poll a job's delivery status.
    pub async fn get_email(&self, id: Uuid) -> Result<JobResponse, ClientError> {
        let url = self.base_url.join(&format!("/api/v1/emails/{id}"))?;
        let resp = self.http.get(url).bearer_auth(&self.api_key).send().await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/emails/stats` – job counts per status.
    pub async fn queue_stats(&self) -> Result<QueueStats, ClientError> {
        let url = self.base_url.join("/api/v1/emails/stats")?;
        let resp = self.http.get(url).bearer_auth(&self.api_key).send().await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/analytics?range=...` – aggregated delivery analytics.
    pub async fn analytics(&self, range: TimeRange) -> Result<AnalyticsSummary, ClientError> {
        let mut url = self.base_url.join("/api/v1/analytics")?;
        url.query_pairs_mut().append_pair("range", range.as_str());
        let resp = self.http.get(url).bearer_auth(&self.api_key).send().await?;
        parse_response(resp).await
    }

    /// `POST /api/v1/events` – report an engagement event for a sent job.
    pub async fn track_event(&self, request: &TrackEventRequest) -> Result<(), ClientError> {
        let url = self.base_url.join("/api/v1/events")?;
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, body });
        }
        Ok(())
    }
}

async fn parse_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Api { status, body });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::Json)
}
