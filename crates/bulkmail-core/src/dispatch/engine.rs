//! Dispatch Engine - Sends a recipient sequence through one relay session
//!
//! The engine walks the recipients in order, one at a time. After every
//! attempt the rate limiter decides whether the session is closed, the run
//! paused and a fresh session opened. A session that drops mid-send is
//! replaced immediately without pausing. Failing to (re)open a session is
//! fatal; the outcomes gathered so far travel with the error.

use super::message::{BuildError, MessageBuilder};
use super::pause::{Pause, TokioPause};
use super::rate_limiter::RateLimiter;
use super::relay::{ConnectionError, RelayConnector, RelaySession, SendError};
use bulkmail_common::types::{
    DispatchOutcome, DispatchSummary, RateLimitPolicy, Recipient, RelayCredentials,
};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcomes and counters of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// One entry per attempted recipient, in input order
    pub outcomes: Vec<DispatchOutcome>,
    pub pauses: usize,
    pub reconnects: usize,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl DispatchReport {
    fn new() -> Self {
        Self {
            outcomes: Vec::new(),
            pauses: 0,
            reconnects: 0,
            cancelled: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn summary(&self) -> DispatchSummary {
        DispatchSummary {
            pauses: self.pauses,
            reconnects: self.reconnects,
            cancelled: self.cancelled,
            ..DispatchSummary::from_outcomes(&self.outcomes)
        }
    }
}

/// Fatal run errors
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("cannot send as '{address}': {source}")]
    InvalidSender {
        address: String,
        #[source]
        source: BuildError,
    },

    #[error("relay unavailable after {attempted} of {total} recipients: {source}")]
    Connection {
        #[source]
        source: ConnectionError,
        attempted: usize,
        total: usize,
        partial: DispatchReport,
    },
}

impl DispatchError {
    /// Outcomes produced before the run aborted
    pub fn partial(&self) -> Option<&DispatchReport> {
        match self {
            DispatchError::InvalidSender { .. } => None,
            DispatchError::Connection { partial, .. } => Some(partial),
        }
    }
}

impl From<DispatchError> for bulkmail_common::Error {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::InvalidSender { .. } => bulkmail_common::Error::Config(err.to_string()),
            DispatchError::Connection { .. } => bulkmail_common::Error::Connection(err.to_string()),
        }
    }
}

/// Mutable state of one run, owned by the run alone
struct DispatchState<S> {
    connection: S,
    limiter: RateLimiter,
    total_processed: usize,
}

/// What happened to the run at a pause point
enum Resume {
    Continue,
    Cancelled,
}

/// Single-stream, rate-limited dispatcher
pub struct DispatchEngine<C, P = TokioPause> {
    connector: C,
    pause: P,
    credentials: RelayCredentials,
    policy: RateLimitPolicy,
    cancel: CancellationToken,
}

impl<C: RelayConnector> DispatchEngine<C, TokioPause> {
    /// Create a new engine that pauses on the tokio timer
    pub fn new(connector: C, credentials: RelayCredentials, policy: RateLimitPolicy) -> Self {
        Self {
            connector,
            pause: TokioPause,
            credentials,
            policy,
            cancel: CancellationToken::new(),
        }
    }
}

impl<C: RelayConnector, P: Pause> DispatchEngine<C, P> {
    /// Replace the pause implementation
    pub fn with_pause<Q: Pause>(self, pause: Q) -> DispatchEngine<C, Q> {
        DispatchEngine {
            connector: self.connector,
            pause,
            credentials: self.credentials,
            policy: self.policy,
            cancel: self.cancel,
        }
    }

    /// Stop the run when this token is cancelled
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Dispatch every recipient in order
    pub async fn run(&self, recipients: &[Recipient]) -> Result<DispatchReport, DispatchError> {
        let sender = self.credentials.sender();
        let builder = MessageBuilder::new(sender).map_err(|source| DispatchError::InvalidSender {
            address: sender.to_string(),
            source,
        })?;

        let total = recipients.len();
        let mut report = DispatchReport::new();

        info!(
            "Dispatch started: {} recipients via {}:{} (threshold {}, pause {:?}, counting {})",
            total,
            self.credentials.host,
            self.credentials.port,
            self.policy.threshold(),
            self.policy.pause(),
            self.policy.mode()
        );

        if self.cancel.is_cancelled() {
            warn!("Dispatch cancelled before the relay was contacted");
            report.cancelled = true;
            return Ok(report.finish());
        }

        let connection = match self.connector.open(&self.credentials).await {
            Ok(connection) => connection,
            Err(source) => {
                error!("Failed to open relay session: {}", source);
                return Err(DispatchError::Connection {
                    source,
                    attempted: 0,
                    total,
                    partial: report.finish(),
                });
            }
        };

        let mut state = DispatchState {
            connection,
            limiter: RateLimiter::new(self.policy),
            total_processed: 0,
        };

        for (index, recipient) in recipients.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(
                    "Dispatch cancelled after {} of {} recipients",
                    state.total_processed, total
                );
                report.cancelled = true;
                break;
            }

            let (outcome, disconnected) = self.attempt(&mut state.connection, &builder, recipient).await;
            state.limiter.record_attempt(outcome.result);
            state.total_processed += 1;
            report.outcomes.push(outcome);

            let last = index + 1 == total;
            let step = if state.limiter.should_pause() {
                report.pauses += 1;
                self.pause_and_reconnect(&mut state, !last).await
            } else if last {
                break;
            } else if disconnected {
                report.reconnects += 1;
                self.reconnect(&mut state).await.map(|_| Resume::Continue)
            } else {
                Ok(Resume::Continue)
            };

            match step {
                Ok(Resume::Continue) => {}
                Ok(Resume::Cancelled) if last => {}
                Ok(Resume::Cancelled) => {
                    warn!(
                        "Dispatch cancelled during pause after {} of {} recipients",
                        state.total_processed, total
                    );
                    report.cancelled = true;
                    break;
                }
                Err(source) => {
                    error!(
                        "Relay reconnect failed after {} of {} recipients: {}",
                        state.total_processed, total, source
                    );
                    return Err(DispatchError::Connection {
                        source,
                        attempted: state.total_processed,
                        total,
                        partial: report.finish(),
                    });
                }
            }
        }

        state.connection.close().await;

        let report = report.finish();
        info!("Dispatch finished: {}", report.summary());
        Ok(report)
    }

    /// Send one recipient; the flag reports a dropped session
    async fn attempt(
        &self,
        connection: &mut C::Session,
        builder: &MessageBuilder,
        recipient: &Recipient,
    ) -> (DispatchOutcome, bool) {
        let envelope = match builder.build(recipient) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Failed to build message for {}: {}", recipient.address, e);
                return (DispatchOutcome::failure(recipient.clone(), e.to_string()), false);
            }
        };

        match connection.send(&envelope).await {
            Ok(()) => {
                info!("Message sent to {}", recipient.address);
                (DispatchOutcome::success(recipient.clone()), false)
            }
            Err(SendError::Rejected(reason)) => {
                warn!("Relay rejected message to {}: {}", recipient.address, reason);
                (DispatchOutcome::failure(recipient.clone(), reason), false)
            }
            Err(err @ SendError::Disconnected(_)) => {
                warn!("Lost relay session while sending to {}: {}", recipient.address, err);
                (DispatchOutcome::failure(recipient.clone(), err.to_string()), true)
            }
        }
    }

    /// Close, wait out the pause, then open a fresh session
    ///
    /// After the final batch the pause still runs so a following run starts
    /// with a rested relay, but no session is reopened.
    async fn pause_and_reconnect(
        &self,
        state: &mut DispatchState<C::Session>,
        reopen: bool,
    ) -> Result<Resume, ConnectionError> {
        let duration = state.limiter.pause_duration();

        state.connection.close().await;
        if self.cancel.is_cancelled() {
            return Ok(Resume::Cancelled);
        }

        info!(
            "Rate limit of {} reached after {} messages; pausing for {:?}",
            self.policy.threshold(),
            state.total_processed,
            duration
        );

        tokio::select! {
            _ = self.pause.pause(duration) => {}
            _ = self.cancel.cancelled() => {}
        }

        if !reopen {
            return Ok(Resume::Continue);
        }
        if self.cancel.is_cancelled() {
            return Ok(Resume::Cancelled);
        }

        self.reconnect(state).await?;
        state.limiter.reset();
        Ok(Resume::Continue)
    }

    /// Replace the session, closing the old one first
    async fn reconnect(&self, state: &mut DispatchState<C::Session>) -> Result<(), ConnectionError> {
        state.connection.close().await;

        info!(
            "Reopening relay session after {} messages",
            state.total_processed
        );
        state.connection = self.connector.open(&self.credentials).await?;
        debug!("Relay session re-established");
        Ok(())
    }
}
