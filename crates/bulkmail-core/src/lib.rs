//! Bulkmail Core - Rate-limited bulk dispatch through a single relay
//!
//! This crate owns the relay session lifecycle, the pause policy and the
//! per-recipient outcome bookkeeping of a dispatch run.

pub mod dispatch;

pub use dispatch::{
    BuildError, ConnectionError, DispatchEngine, DispatchError, DispatchReport, Envelope,
    MessageBuilder, Pause, RateLimiter, RelayConnector, RelaySession, SendError, SmtpConnector,
    SmtpSession, TokioPause,
};
