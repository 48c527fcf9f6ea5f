//! Core HTTP operations with rate limiting and throttling-aware retries
//!
//! Every upstream call goes through [`HttpHandler::execute`]. The handler
//! re-issues the identical request while the service answers 429 (honouring
//! `Retry-After`), 503 or 504, and hands any other response back to the
//! caller untouched. Network faults are retried a few times with
//! exponential backoff before surfacing.
//!
//! The loop itself lives in [`RetryPolicy::run`] and is generic over the
//! response type so it can be driven by scripted responses in tests.

use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;

use chrono::{DateTime, Utc};
use governor::{clock::DefaultClock, state::InMemoryState, Jitter, Quota, RateLimiter};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::constants::limits;
use crate::errors::{HttpError, HttpResult};

/// Response surface the retry loop needs to make a decision
pub trait RetryableResponse {
    /// HTTP status of the response
    fn status(&self) -> StatusCode;
    /// Header map of the response
    fn headers(&self) -> &HeaderMap;
}

impl RetryableResponse for reqwest::Response {
    fn status(&self) -> StatusCode {
        reqwest::Response::status(self)
    }

    fn headers(&self) -> &HeaderMap {
        reqwest::Response::headers(self)
    }
}

/// Retry policy for throttled or unavailable upstream responses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Cap on attempts for a single request (None = unbounded)
    pub max_attempts: Option<u32>,
    /// Cap on total wall time spent retrying a single request (None = unbounded)
    pub deadline: Option<Duration>,
    /// Wait used for 429 responses without a usable Retry-After header
    pub default_retry_after: Duration,
    /// Fixed wait after 503/504
    pub unavailable_delay: Duration,
    /// Attempts granted to network faults before surfacing them
    pub network_retries: u32,
    /// Base delay for exponential backoff on network faults
    pub network_base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(limits::DEFAULT_MAX_ATTEMPTS),
            deadline: Some(Duration::from_secs(limits::DEFAULT_DEADLINE_SECS)),
            default_retry_after: Duration::from_secs(limits::DEFAULT_RETRY_AFTER_SECS),
            unavailable_delay: Duration::from_secs(limits::UNAVAILABLE_DELAY_SECS),
            network_retries: limits::NETWORK_RETRIES,
            network_base_delay: Duration::from_millis(limits::RETRY_BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Policy with no attempt cap and no deadline, matching the upstream
    /// operators' expectation that clients wait out throttling indefinitely
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            deadline: None,
            ..Default::default()
        }
    }

    /// How long to wait before repeating a request that got `status`,
    /// or `None` when the response should be returned to the caller
    pub fn delay_for(&self, status: StatusCode, headers: &HeaderMap) -> Option<Duration> {
        match status {
            StatusCode::TOO_MANY_REQUESTS => Some(
                headers
                    .get(RETRY_AFTER)
                    .and_then(|value| value.to_str().ok())
                    .and_then(parse_retry_after)
                    .map(|wait| wait.min(Duration::from_secs(limits::MAX_RETRY_AFTER_SECS)))
                    .unwrap_or(self.default_retry_after),
            ),
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
                Some(self.unavailable_delay)
            }
            _ => None,
        }
    }

    /// Exponential backoff for the `failures`-th network fault, capped
    fn network_backoff(&self, failures: u32) -> Duration {
        let cap = Duration::from_secs(limits::MAX_NETWORK_BACKOFF_SECS);
        2_u32
            .checked_pow(failures)
            .and_then(|factor| self.network_base_delay.checked_mul(factor))
            .map_or(cap, |delay| delay.min(cap))
    }

    /// Drive `attempt` until it yields a non-transient response
    ///
    /// `attempt` is called once per try and must issue the identical request
    /// each time. Sleeps and in-flight requests are abandoned as soon as
    /// `cancel` fires.
    ///
    /// # Errors
    ///
    /// - `HttpError::RetriesExhausted` when the attempt cap or deadline is hit
    ///   while the service is still throttling
    /// - `HttpError::Network` when a network fault outlives `network_retries`
    /// - `HttpError::Cancelled` when the token is cancelled
    pub async fn run<F, Fut, R>(&self, cancel: &CancellationToken, mut attempt: F) -> HttpResult<R>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, reqwest::Error>>,
        R: RetryableResponse,
    {
        let started = Instant::now();
        let mut attempts: u32 = 0;
        let mut network_failures: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(HttpError::Cancelled);
            }
            attempts += 1;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(HttpError::Cancelled),
                outcome = attempt() => outcome,
            };

            let delay = match outcome {
                Ok(response) => {
                    let status = response.status();
                    let Some(delay) = self.delay_for(status, response.headers()) else {
                        return Ok(response);
                    };

                    if self.max_attempts.is_some_and(|max| attempts >= max) {
                        tracing::error!(
                            "Giving up after {} attempts, upstream still answering {}",
                            attempts,
                            status
                        );
                        return Err(HttpError::RetriesExhausted { status, attempts });
                    }
                    if self.deadline.is_some_and(|deadline| {
                        started
                            .elapsed()
                            .checked_add(delay)
                            .map_or(true, |resume| resume > deadline)
                    }) {
                        tracing::error!(
                            "Retry deadline reached after {} attempts, upstream still answering {}",
                            attempts,
                            status
                        );
                        return Err(HttpError::RetriesExhausted { status, attempts });
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        tracing::warn!(
                            "Rate limited. Waiting {} seconds before retrying",
                            delay.as_secs()
                        );
                    } else {
                        tracing::warn!(
                            "Service unavailable (status {}). Waiting {} seconds before retrying",
                            status.as_u16(),
                            delay.as_secs()
                        );
                    }
                    delay
                }
                Err(e) if network_failures < self.network_retries => {
                    network_failures += 1;
                    let delay = self.network_backoff(network_failures);
                    tracing::warn!(
                        "Request failed (attempt {}/{}): {}. Retrying in {}ms",
                        network_failures,
                        self.network_retries,
                        e,
                        delay.as_millis()
                    );
                    delay
                }
                Err(e) => {
                    tracing::error!(
                        "Request failed after {} network retries: {}",
                        self.network_retries,
                        e
                    );
                    return Err(HttpError::Network(e));
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(HttpError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Parse a Retry-After value given either as delta-seconds or an HTTP date
fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let when = DateTime::parse_from_rfc2822(value).ok()?;
    let wait = when.with_timezone(&Utc) - Utc::now();
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}

/// A fully described upstream request, rebuilt verbatim on every attempt
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
}

impl ApiRequest {
    /// GET request without extra headers
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            query: Vec::new(),
        }
    }

    /// Add a header
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Add a query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }
}

/// HTTP operations handler with resilience patterns
#[derive(Debug)]
pub struct HttpHandler {
    client: Client,
    rate_limiter: RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>,
    retry_policy: RetryPolicy,
}

impl HttpHandler {
    /// Creates a new HttpHandler with the given client, rate limit and retry policy
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidRateLimit` if `rate_limit_rps` is zero
    pub fn new(client: Client, rate_limit_rps: u32, retry_policy: RetryPolicy) -> HttpResult<Self> {
        let rate_limiter = Self::build_rate_limiter(rate_limit_rps)?;
        Ok(Self {
            client,
            rate_limiter,
            retry_policy,
        })
    }

    /// Builds the rate limiter with the specified rate limit
    fn build_rate_limiter(
        rate_limit_rps: u32,
    ) -> HttpResult<RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>> {
        let quota = Quota::per_second(
            NonZeroU32::new(rate_limit_rps).ok_or(HttpError::InvalidRateLimit)?,
        );
        Ok(RateLimiter::direct(quota))
    }

    /// Issue `request` and block until a non-transient response arrives
    ///
    /// The returned response may carry any status other than 429/503/504;
    /// interpreting it is the caller's job.
    pub async fn execute(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> HttpResult<reqwest::Response> {
        self.retry_policy
            .run(cancel, || async {
                // Apply rate limiting with jitter to avoid bursts after a long wait
                self.rate_limiter
                    .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
                    .await;

                tracing::debug!("{} {}", request.method, request.url);
                self.client
                    .request(request.method.clone(), request.url.clone())
                    .headers(request.headers.clone())
                    .query(&request.query)
                    .send()
                    .await
            })
            .await
    }

    /// Retry policy in force
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }
}
