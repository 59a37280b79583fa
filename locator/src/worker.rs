use crate::config::{ErrorPolicy, PollSettings};
use crate::errors::Error;
use crate::model::{Credentials, DeviceSnapshot, SessionContext};
use crate::mqtt::Publisher;
use crate::session::LocationSession;
use crate::telemetry::track;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Fixed refresh period plus a bounded random jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub interval: Duration,
    pub jitter: Duration,
}

impl Schedule {
    pub fn new(interval: Duration, jitter: Duration) -> Self {
        Self { interval, jitter }
    }

    pub fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.interval;
        }

        let extra = rand::thread_rng().gen_range(0..=jitter_ms);
        self.interval.saturating_add(Duration::from_millis(extra))
    }
}

impl From<&PollSettings> for Schedule {
    fn from(poll: &PollSettings) -> Self {
        Self::new(
            Duration::from_secs(poll.interval_secs),
            Duration::from_secs(poll.jitter_secs),
        )
    }
}

#[derive(Debug)]
enum WorkerState {
    Unauthenticated,
    /// Holds the pair for the next refresh
    Authenticated(SessionContext),
    Failed,
}

/// Drives one account from login through an unbounded series of refreshes
pub struct AccountWorker {
    credentials: Credentials,
    session: LocationSession,
    publisher: Arc<dyn Publisher>,
    prefix: String,
    schedule: Schedule,
    policy: ErrorPolicy,
    errors: mpsc::Sender<Error>,
}

impl AccountWorker {
    pub fn new(
        credentials: Credentials,
        session: LocationSession,
        publisher: Arc<dyn Publisher>,
        prefix: String,
        schedule: Schedule,
        policy: ErrorPolicy,
        errors: mpsc::Sender<Error>,
    ) -> Self {
        Self {
            credentials,
            session,
            publisher,
            prefix,
            schedule,
            policy,
            errors,
        }
    }

    pub fn account(&self) -> &str {
        &self.credentials.username
    }

    /// Runs until the worker fails. Errors go to the shared sink, never to the caller.
    pub async fn run(self) {
        info!(account = %self.account(), "Worker started");

        let mut state = WorkerState::Unauthenticated;
        loop {
            state = match state {
                WorkerState::Unauthenticated => self.authenticate().await,
                WorkerState::Authenticated(context) => {
                    tokio::time::sleep(self.schedule.next_delay()).await;
                    self.refresh(context).await
                }
                WorkerState::Failed => break,
            };
        }

        warn!(account = %self.account(), "Worker stopped");
    }

    async fn authenticate(&self) -> WorkerState {
        match self.session.authenticate(&self.credentials).await {
            Ok(response) => {
                self.emit(&response.devices).await;
                WorkerState::Authenticated(response.context)
            }
            Err(e) => {
                self.report(e).await;
                WorkerState::Failed
            }
        }
    }

    async fn refresh(&self, context: SessionContext) -> WorkerState {
        match self.session.refresh(&context).await {
            Ok(response) => {
                self.emit(&response.devices).await;
                WorkerState::Authenticated(response.context)
            }
            Err(e) => {
                self.report(e).await;
                match self.policy {
                    ErrorPolicy::FailFast => WorkerState::Failed,
                    ErrorPolicy::Continue => WorkerState::Authenticated(context),
                }
            }
        }
    }

    async fn emit(&self, devices: &[DeviceSnapshot]) {
        track(self.publisher.as_ref(), &self.prefix, self.account(), devices).await;
    }

    async fn report(&self, e: Error) {
        error!(account = %self.account(), error = %e, "Location request failed");
        // The receiver only disappears while the process is shutting down
        let _ = self.errors.send(Error::for_account(self.account(), e)).await;
    }
}
