//! Common types for bulkmail

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Status text written for a delivered row
pub const STATUS_SUCCESS: &str = "Success";

/// Prefix of the status text written for a failed row
pub const STATUS_ERROR_PREFIX: &str = "Error: ";

/// Resolved relay credentials for one run
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayCredentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub secret: String,
    /// Upgrade the plain connection with STARTTLS before authenticating
    pub use_explicit_tls: bool,
    /// Envelope sender; the relay username is used when absent
    pub from_address: Option<String>,
}

impl RelayCredentials {
    /// Address placed in the From header of every envelope
    pub fn sender(&self) -> &str {
        self.from_address.as_deref().unwrap_or(&self.username)
    }
}

impl fmt::Debug for RelayCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("use_explicit_tls", &self.use_explicit_tls)
            .field("from_address", &self.from_address)
            .finish()
    }
}

/// One row of the recipient source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub address: String,
    pub subject: String,
    pub body: String,
}

impl Recipient {
    pub fn new(
        address: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Which attempts advance the rate-limit counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountingMode {
    /// Every attempt counts, delivered or not
    AllAttempts,
    /// Only delivered messages count
    SuccessesOnly,
}

impl fmt::Display for CountingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountingMode::AllAttempts => write!(f, "all_attempts"),
            CountingMode::SuccessesOnly => write!(f, "successes_only"),
        }
    }
}

/// Throttling policy for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    threshold: u32,
    pause: Duration,
    mode: CountingMode,
}

impl RateLimitPolicy {
    /// Create a policy; the threshold must be at least 1
    pub fn new(threshold: u32, pause: Duration, mode: CountingMode) -> crate::Result<Self> {
        if threshold == 0 {
            return Err(crate::Error::Config(
                "Rate limit threshold must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            threshold,
            pause,
            mode,
        })
    }

    /// Fixed batches of 5 attempts with a one minute pause
    pub fn batch() -> Self {
        Self {
            threshold: 5,
            pause: Duration::from_secs(60),
            mode: CountingMode::AllAttempts,
        }
    }

    /// Caller-chosen limit of delivered messages per period
    pub fn hourly(limit: u32, pause_minutes: u64) -> crate::Result<Self> {
        Self::new(
            limit,
            Self::minutes(pause_minutes)?,
            CountingMode::SuccessesOnly,
        )
    }

    /// Pause length from whole minutes
    pub fn minutes(minutes: u64) -> crate::Result<Duration> {
        minutes
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| crate::Error::Config(format!("Pause of {} minutes is too long", minutes)))
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn pause(&self) -> Duration {
        self.pause
    }

    pub fn mode(&self) -> CountingMode {
        self.mode
    }
}

/// Result of one delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchResult {
    Success,
    Failure,
}

/// Per-recipient record produced by a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub recipient: Recipient,
    pub result: DispatchResult,
    /// Relay or build error text, set on failure
    pub detail: Option<String>,
}

impl DispatchOutcome {
    pub fn success(recipient: Recipient) -> Self {
        Self {
            recipient,
            result: DispatchResult::Success,
            detail: None,
        }
    }

    pub fn failure(recipient: Recipient, detail: impl Into<String>) -> Self {
        Self {
            recipient,
            result: DispatchResult::Failure,
            detail: Some(detail.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == DispatchResult::Success
    }

    /// Text persisted into the Status column
    pub fn status_text(&self) -> String {
        match self.result {
            DispatchResult::Success => STATUS_SUCCESS.to_string(),
            DispatchResult::Failure => format!(
                "{}{}",
                STATUS_ERROR_PREFIX,
                self.detail.as_deref().unwrap_or_default()
            ),
        }
    }
}

/// Aggregate counters of a finished (or aborted) run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub pauses: usize,
    pub reconnects: usize,
    pub cancelled: bool,
}

impl DispatchSummary {
    /// Count outcomes; pause and reconnect counters are filled by the caller
    pub fn from_outcomes(outcomes: &[DispatchOutcome]) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        Self {
            attempted: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            ..Self::default()
        }
    }
}

impl fmt::Display for DispatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} attempted, {} succeeded, {} failed, {} pauses, {} reconnects",
            self.attempted, self.succeeded, self.failed, self.pauses, self.reconnects
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn recipient() -> Recipient {
        Recipient::new("ana@example.com", "Hello", "<p>Hi</p>")
    }

    #[test]
    fn test_status_text_mapping() {
        assert_eq!(DispatchOutcome::success(recipient()).status_text(), "Success");

        let failed = DispatchOutcome::failure(recipient(), "550 mailbox unavailable");
        assert_eq!(failed.status_text(), "Error: 550 mailbox unavailable");
        assert!(!failed.is_success());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let result = RateLimitPolicy::new(0, Duration::from_secs(1), CountingMode::AllAttempts);
        assert!(matches!(result, Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_presets() {
        let batch = RateLimitPolicy::batch();
        assert_eq!(batch.threshold(), 5);
        assert_eq!(batch.pause(), Duration::from_secs(60));
        assert_eq!(batch.mode(), CountingMode::AllAttempts);

        let hourly = RateLimitPolicy::hourly(50, 60).unwrap();
        assert_eq!(hourly.threshold(), 50);
        assert_eq!(hourly.pause(), Duration::from_secs(3600));
        assert_eq!(hourly.mode(), CountingMode::SuccessesOnly);
    }

    #[test]
    fn test_pause_minutes_overflow_is_config_error() {
        assert_eq!(RateLimitPolicy::minutes(2).unwrap(), Duration::from_secs(120));
        assert!(matches!(
            RateLimitPolicy::hourly(50, u64::MAX),
            Err(crate::Error::Config(_))
        ));
    }

    #[test]
    fn test_credentials_debug_hides_secret() {
        let creds = RelayCredentials {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "sender@example.com".to_string(),
            secret: "hunter2".to_string(),
            use_explicit_tls: true,
            from_address: None,
        };

        let debug = format!("{:?}", creds);
        assert!(!debug.contains("hunter2"));
        assert_eq!(creds.sender(), "sender@example.com");
    }

    #[test]
    fn test_summary_from_outcomes() {
        let outcomes = vec![
            DispatchOutcome::success(recipient()),
            DispatchOutcome::failure(recipient(), "rejected"),
            DispatchOutcome::success(recipient()),
        ];

        let summary = DispatchSummary::from_outcomes(&outcomes);
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
    }
}
