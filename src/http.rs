use crate::error::{Error, Result};
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Longest server-requested back-off we are willing to honor.
const MAX_RETRY_AFTER_SECS: u64 = 60;

/// JSON-over-HTTP transport for model providers, with bounded retries.
///
/// Connection failures, timeouts, 502/503/504 and 429 are retried with
/// exponential back-off (429 honors `Retry-After` when it is short enough).
/// Every other non-success status is returned as [`Error::Api`].
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    max_retries: u32,
    base_delay_ms: u64,
}

enum Attempt {
    Done(Result<String>),
    Retry { error: Error, wait_ms: Option<u64> },
}

impl HttpClient {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(180))
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::http(e.to_string()))?;

        Ok(Self {
            client,
            max_retries: 3,
            base_delay_ms: 1000,
        })
    }

    /// POST a serialized JSON body, authenticating with `bearer` when present.
    pub async fn post_json(&self, url: &str, body: &str, bearer: Option<&str>) -> Result<String> {
        self.send_with_retry(|| {
            let req = self
                .client
                .post(url)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.to_string());
            match bearer {
                Some(token) if !token.is_empty() => req.bearer_auth(token),
                _ => req,
            }
        })
        .await
    }

    async fn send_with_retry<F>(&self, build: F) -> Result<String>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut delay = self.base_delay_ms;
        let mut attempt = 0;

        loop {
            let outcome = match build().send().await {
                Ok(resp) => classify(resp).await,
                Err(e) if e.is_timeout() || e.is_connect() => Attempt::Retry {
                    error: Error::http(e.to_string()),
                    wait_ms: None,
                },
                Err(e) => Attempt::Done(Err(Error::http(e.to_string()))),
            };

            match outcome {
                Attempt::Done(result) => return result,
                Attempt::Retry { error, .. } if attempt >= self.max_retries => return Err(error),
                Attempt::Retry { error, wait_ms } => {
                    let wait = wait_ms.unwrap_or(delay);
                    warn!(attempt, wait_ms = wait, error = %error, "transient failure, will retry");
                    sleep(Duration::from_millis(wait)).await;
                    delay = (delay * 2).min(30_000);
                    attempt += 1;
                }
            }
        }
    }
}

async fn classify(resp: Response) -> Attempt {
    let status = resp.status();
    let platform = extract_domain(resp.url().as_str());
    debug!(%status, %platform, "provider response");

    if status.is_success() {
        return Attempt::Done(resp.text().await.map_err(|e| Error::http(e.to_string())));
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after_secs = resp
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            Attempt::Retry {
                wait_ms: retry_after_secs
                    .filter(|s| *s <= MAX_RETRY_AFTER_SECS)
                    .map(|s| s * 1000),
                error: Error::RateLimit {
                    platform,
                    retry_after_secs,
                },
            }
        }
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            let body = resp.text().await.unwrap_or_default();
            Attempt::Retry {
                error: Error::api_with_status(platform, body, status.as_u16()),
                wait_ms: None,
            }
        }
        _ => {
            let body = resp.text().await.unwrap_or_default();
            Attempt::Done(Err(Error::api_with_status(platform, body, status.as_u16())))
        }
    }
}

fn extract_domain(url: &str) -> String {
    url.split("//")
        .nth(1)
        .and_then(|s| s.split('/').next())
        .unwrap_or("unknown")
        .to_string()
}
