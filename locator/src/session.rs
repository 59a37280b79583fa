use crate::errors::{Error, Result};
use crate::metrics::{REQUESTS_TOTAL, REQUEST_FAILURES_TOTAL, REQUEST_LATENCY_SECONDS};
use crate::model::{Credentials, LocateResponse, SessionContext, SessionResponse};
use crate::transport::{LocateRequest, Transport};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const INITIAL_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 2000;

/// How many times a retryable request failure is repeated before it is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32) -> Self {
        Self {
            retries,
            ..Self::default()
        }
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
        }
    }
}

/// Protocol adapter for one account's relationship with the location service.
///
/// Holds no session state and no timers: the caller keeps the
/// [`SessionContext`] returned by each call and passes it to the next refresh.
pub struct LocationSession {
    account: String,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
}

impl LocationSession {
    pub fn new(account: impl Into<String>, transport: Arc<dyn Transport>, retry: RetryPolicy) -> Self {
        Self {
            account: account.into(),
            transport,
            retry,
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Initial login with the account password.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<SessionResponse> {
        let request = LocateRequest::init_client(&credentials.username, &credentials.password)?;
        let response = self.execute(&request).await?;

        info!(
            account = %self.account,
            devices = response.devices.len(),
            "Authenticated"
        );
        Ok(response)
    }

    /// Follow-up request addressed by the prior session id and token.
    pub async fn refresh(&self, context: &SessionContext) -> Result<SessionResponse> {
        let request = LocateRequest::refresh_client(context);
        let response = self.execute(&request).await?;

        debug!(
            account = %self.account,
            devices = response.devices.len(),
            "Refreshed"
        );
        Ok(response)
    }

    async fn execute(&self, request: &LocateRequest) -> Result<SessionResponse> {
        let mut attempt = 0;
        let mut backoff = self.retry.initial_backoff;

        loop {
            attempt += 1;

            match self.execute_once(request).await {
                Ok(response) => {
                    if attempt > 1 {
                        info!(account = %self.account, "Request succeeded on attempt {}", attempt);
                    }
                    return Ok(response);
                }
                Err(e) => {
                    if attempt > self.retry.retries || !e.is_retryable() {
                        return Err(e);
                    }

                    warn!(
                        account = %self.account,
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        request.action.as_str(),
                        attempt,
                        self.retry.retries.saturating_add(1),
                        e,
                        backoff
                    );

                    tokio::time::sleep(backoff).await;
                    backoff = self.retry.next_backoff(backoff);
                }
            }
        }
    }

    async fn execute_once(&self, request: &LocateRequest) -> Result<SessionResponse> {
        let action = request.action.as_str();
        REQUESTS_TOTAL.with_label_values(&[action]).inc();

        let start = Instant::now();
        let result = self.transport.send(request).await.and_then(|raw| {
            match raw.status {
                401 | 403 => return Err(Error::AccessDenied(raw.status)),
                200..=299 => {}
                status => return Err(Error::Status(status)),
            }

            let response: LocateResponse = serde_json::from_slice(&raw.body)?;
            SessionResponse::try_from(response)
        });
        REQUEST_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());

        if result.is_err() {
            REQUEST_FAILURES_TOTAL.with_label_values(&[action]).inc();
        }
        result
    }
}
