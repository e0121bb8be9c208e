//! Dispatch Module - Relay sessions, throttling and the dispatch loop

mod engine;
mod message;
mod pause;
mod rate_limiter;
mod relay;
mod smtp;

pub use engine::{DispatchEngine, DispatchError, DispatchReport};
pub use message::{BuildError, Envelope, MessageBuilder};
pub use pause::{Pause, TokioPause};
pub use rate_limiter::RateLimiter;
pub use relay::{ConnectionError, RelayConnector, RelaySession, SendError};
pub use smtp::{SmtpConnector, SmtpSession};
