use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::server::ErrorResponse;
use fitlog_core::models::{Exercise, Meal, StructuredLog};
use fitlog_core::remote::{
    DailyRow, LogRow, LogTable, RemoteLog, RemoteStore, SaveOutcome, StoreError,
};

/// [`RemoteStore`] over the `fitlog serve` REST API.
pub struct HttpRemote {
    client: reqwest::Client,
    base: Url,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct SaveLogBody<'a> {
    exercises: &'a [Exercise],
    meals: &'a [Meal],
}

#[derive(Deserialize)]
struct ClearBody {
    deleted: bool,
}

impl HttpRemote {
    pub fn new(server: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let base = Url::parse(server).with_context(|| format!("Invalid server URL '{server}'"))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            bail!("Invalid server URL '{server}'. Use http:// or https://");
        }
        let client = reqwest::Client::builder()
            .user_agent(format!("fitlog/{} (fitness log)", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base,
            api_key,
        })
    }

    fn url(&self, user_id: &str, tail: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::Network(format!("invalid server URL {}", self.base)))?
            .pop_if_empty()
            .extend(["api", "users", user_id])
            .extend(tail);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let req = self.client.request(method, url);
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, StoreError> {
        let resp = req
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        let status = resp.status();
        debug!(url = %resp.url(), %status, "remote response");
        if status == StatusCode::UNAUTHORIZED {
            return Err(StoreError::Unauthorized);
        }
        if !status.is_success() {
            let message = match resp.json::<ErrorResponse>().await {
                Ok(body) => body.error,
                Err(_) => status.canonical_reason().unwrap_or_default().to_string(),
            };
            return Err(StoreError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp)
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, StoreError> {
        self.send(req)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

impl RemoteStore for HttpRemote {
    async fn fetch(&self, user_id: &str, date: &str) -> Result<RemoteLog, StoreError> {
        let url = self.url(user_id, &["logs", date])?;
        self.send_json(self.request(Method::GET, url)).await
    }

    async fn save(
        &self,
        user_id: &str,
        date: &str,
        exercises: &[Exercise],
        meals: &[Meal],
    ) -> Result<SaveOutcome, StoreError> {
        let url = self.url(user_id, &["logs", date])?;
        let req = self
            .request(Method::PUT, url)
            .json(&SaveLogBody { exercises, meals });
        self.send_json(req).await
    }

    async fn clear(&self, user_id: &str, date: &str, table: LogTable) -> Result<bool, StoreError> {
        let url = self.url(user_id, &["logs", date, table.as_str()])?;
        let body: ClearBody = self.send_json(self.request(Method::DELETE, url)).await?;
        Ok(body.deleted)
    }

    async fn fetch_all(&self, user_id: &str) -> Result<Vec<LogRow>, StoreError> {
        let url = self.url(user_id, &["logs"])?;
        self.send_json(self.request(Method::GET, url)).await
    }

    async fn fetch_daily(
        &self,
        user_id: &str,
        date: &str,
    ) -> Result<Option<StructuredLog>, StoreError> {
        let url = self.url(user_id, &["daily", date])?;
        self.send_json(self.request(Method::GET, url)).await
    }

    async fn save_daily(
        &self,
        user_id: &str,
        date: &str,
        log: &StructuredLog,
    ) -> Result<(), StoreError> {
        let url = self.url(user_id, &["daily", date])?;
        self.send(self.request(Method::PUT, url).json(log)).await?;
        Ok(())
    }

    async fn fetch_all_daily(&self, user_id: &str) -> Result<Vec<DailyRow>, StoreError> {
        let url = self.url(user_id, &["daily"])?;
        self.send_json(self.request(Method::GET, url)).await
    }
}
