//! Shared HTTP client carrying the pipeline's retry policy.
//!
//! One `HttpFetcher` is constructed per process and passed by reference into
//! the crawler and worker. Transport errors and 5xx responses are retried a
//! fixed number of times with linear backoff; everything above this layer
//! sees only the final outcome.

use std::time::Duration;

use reqwest::Client;
use tracing::warn;
use url::Url;

use crate::config::HttpSettings;
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    retries: u32,
    backoff_step: Duration,
}

impl HttpFetcher {
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&settings.user_agent)
            .use_rustls_tls()
            .timeout(settings.timeout)
            .build()
            .map_err(|err| PipelineError::Http {
                message: format!("build client: {err}"),
            })?;
        Ok(Self {
            client,
            retries: settings.retries,
            backoff_step: settings.backoff_step,
        })
    }

    /// GET `url` and return the response body as text.
    ///
    /// Retries transport failures and 5xx statuses up to the configured
    /// count, sleeping `attempt * backoff_step` between tries. Non-5xx error
    /// statuses fail immediately.
    pub async fn fetch_text(&self, url: &Url) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.client.get(url.clone()).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_server_error() && attempt <= self.retries {
                        warn!(%url, %status, attempt, "server error, backing off");
                        tokio::time::sleep(self.backoff_step * attempt).await;
                        continue;
                    }
                    let response =
                        response
                            .error_for_status()
                            .map_err(|err| PipelineError::Http {
                                message: format!("GET {url}: {err}"),
                            })?;
                    return response.text().await.map_err(|err| PipelineError::Http {
                        message: format!("read body of {url}: {err}"),
                    });
                }
                Err(err) if attempt <= self.retries => {
                    warn!(%url, attempt, error = %err, "transport error, backing off");
                    tokio::time::sleep(self.backoff_step * attempt).await;
                }
                Err(err) => {
                    return Err(PipelineError::Http {
                        message: format!("GET {url}: {err}"),
                    });
                }
            }
        }
    }
}
