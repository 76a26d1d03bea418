//! HTTP seam for source adapters.
//!
//! Adapters only ever need "GET this URL and give me JSON", so that is the
//! whole trait. Production uses [`ReqwestFetcher`]; tests plug in fakes.

use crate::error::FetchError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// GET `url` and decode the body as JSON.
    async fn get_json(&self, url: &Url) -> Result<Value, FetchError>;
}

#[async_trait]
impl<T> HttpFetch for Arc<T>
where
    T: HttpFetch + ?Sized,
{
    async fn get_json(&self, url: &Url) -> Result<Value, FetchError> {
        (**self).get_json(url).await
    }
}

/// [`HttpFetch`] over a shared `reqwest::Client` with a per-request timeout.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    fn classify(&self, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout(self.timeout.as_secs())
        } else {
            FetchError::from(error)
        }
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn get_json(&self, url: &Url) -> Result<Value, FetchError> {
        debug!(%url, "GET");

        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        serde_json::from_slice(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}
