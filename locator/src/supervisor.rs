use crate::config::{ErrorPolicy, Settings};
use crate::errors::{Error, Result};
use crate::model::Credentials;
use crate::mqtt::Publisher;
use crate::session::{LocationSession, RetryPolicy};
use crate::transport::Transport;
use crate::worker::{AccountWorker, Schedule};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Polling parameters shared by every account worker
#[derive(Debug, Clone)]
pub struct PollOptions {
    pub prefix: String,
    pub schedule: Schedule,
    pub retry: RetryPolicy,
    pub policy: ErrorPolicy,
}

impl From<&Settings> for PollOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            prefix: settings.mqtt.prefix.clone(),
            schedule: Schedule::from(&settings.poll),
            retry: RetryPolicy::new(settings.poll.retries),
            policy: settings.poll.on_error,
        }
    }
}

/// Owns the account workers and decides when the process stops
pub struct Supervisor {
    transport: Arc<dyn Transport>,
    publisher: Arc<dyn Publisher>,
    options: PollOptions,
}

impl Supervisor {
    pub fn new(transport: Arc<dyn Transport>, publisher: Arc<dyn Publisher>, options: PollOptions) -> Self {
        Self {
            transport,
            publisher,
            options,
        }
    }

    /// Starts one worker per account and blocks until `shutdown` resolves or a
    /// worker error ends the run.
    ///
    /// A shutdown closes the publisher and returns `Ok`. With
    /// [`ErrorPolicy::FailFast`] the first reported error is returned as is;
    /// remaining workers are aborted when the returned future completes.
    pub async fn run<F>(self, accounts: Vec<Credentials>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (errors_tx, mut errors_rx) = mpsc::channel(accounts.len().max(1));
        let mut workers = JoinSet::new();

        for credentials in accounts {
            let session = LocationSession::new(
                credentials.username.clone(),
                Arc::clone(&self.transport),
                self.options.retry,
            );
            let worker = AccountWorker::new(
                credentials,
                session,
                Arc::clone(&self.publisher),
                self.options.prefix.clone(),
                self.options.schedule,
                self.options.policy,
                errors_tx.clone(),
            );
            workers.spawn(worker.run());
        }
        drop(errors_tx);

        info!("Started {} account workers", workers.len());

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Got shutdown event, exiting gracefully");
                    workers.abort_all();
                    self.publisher.close().await;
                    return Ok(());
                }
                report = errors_rx.recv() => match report {
                    Some(e) => match self.options.policy {
                        ErrorPolicy::FailFast => {
                            error!("Stopping after account failure: {}", e);
                            return Err(e);
                        }
                        ErrorPolicy::Continue => {
                            warn!("Account failure, other accounts keep running: {}", e);
                        }
                    },
                    None => {
                        error!("No account workers left");
                        return Err(Error::WorkersExited);
                    }
                },
            }
        }
    }
}
