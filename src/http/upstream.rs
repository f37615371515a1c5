//! Outbound HTTP calls to the upstream dependency.
//!
//! Every request carries the caller's correlation header. Paths are resolved
//! against the configured base URL.

use std::time::Duration;

use axum::http::HeaderMap;
use url::Url;

use crate::config::UpstreamConfig;
use crate::correlation::CorrelationContext;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("invalid upstream url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("failed to build http client: {0}")]
    Build(reqwest::Error),
    #[error("upstream transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// HTTP client bound to one upstream base URL.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpUpstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(UpstreamError::Build)?;

        Ok(Self {
            client,
            base_url: Url::parse(&config.base_url)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve `path` against the base URL. A leading `/` is ignored so the
    /// base URL's own path is kept.
    pub fn url_for(&self, path: &str) -> Result<Url, UpstreamError> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        Ok(base.join(path.trim_start_matches('/'))?)
    }

    /// Issue a GET carrying the correlation header.
    pub async fn get(
        &self,
        path: &str,
        ctx: CorrelationContext,
    ) -> Result<reqwest::Response, UpstreamError> {
        let url = self.url_for(path)?;
        let mut headers = HeaderMap::new();
        ctx.apply(&mut headers);

        tracing::debug!(correlation_id = %ctx.id(), url = %url, "Calling upstream");

        Ok(self.client.get(url).headers(headers).send().await?)
    }
}
