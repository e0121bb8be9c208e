//! SMTP relay sessions backed by lettre

use super::message::Envelope;
use super::relay::{ConnectionError, RelayConnector, RelaySession, SendError};
use async_trait::async_trait;
use bulkmail_common::types::RelayCredentials;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{AsyncSmtpConnection, TlsParameters};
use lettre::transport::smtp::commands::{Data, Mail, Rcpt, Rset};
use lettre::transport::smtp::response::Response;
use lettre::transport::smtp::extension::ClientId;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens authenticated sessions against an SMTP relay
#[derive(Debug, Clone)]
pub struct SmtpConnector {
    hello_name: ClientId,
    timeout: Duration,
}

impl Default for SmtpConnector {
    fn default() -> Self {
        Self {
            hello_name: ClientId::Domain("localhost".to_string()),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SmtpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name announced in EHLO
    pub fn with_hello_name(mut self, name: impl Into<String>) -> Self {
        self.hello_name = ClientId::Domain(name.into());
        self
    }

    /// Set the per-command network timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl RelayConnector for SmtpConnector {
    type Session = SmtpSession;

    async fn open(&self, credentials: &RelayCredentials) -> Result<SmtpSession, ConnectionError> {
        debug!(
            "Connecting to relay {}:{} (starttls: {})",
            credentials.host, credentials.port, credentials.use_explicit_tls
        );

        let mut conn = AsyncSmtpConnection::connect_tokio1(
            (credentials.host.as_str(), credentials.port),
            Some(self.timeout),
            &self.hello_name,
            None,
            None,
        )
        .await
        .map_err(|e| ConnectionError::Transport {
            host: credentials.host.clone(),
            port: credentials.port,
            source: Box::new(e),
        })?;

        if credentials.use_explicit_tls {
            if let Err(e) = upgrade(&mut conn, &credentials.host, &self.hello_name).await {
                conn.abort().await;
                return Err(e);
            }
        }

        let login = Credentials::new(credentials.username.clone(), credentials.secret.clone());
        if let Err(e) = conn
            .auth(&[Mechanism::Plain, Mechanism::Login], &login)
            .await
        {
            conn.abort().await;
            return Err(ConnectionError::Authentication {
                username: credentials.username.clone(),
                source: Box::new(e),
            });
        }

        debug!("Authenticated with relay {} as {}", credentials.host, credentials.username);

        Ok(SmtpSession {
            host: credentials.host.clone(),
            conn: Some(conn),
        })
    }
}

async fn upgrade(
    conn: &mut AsyncSmtpConnection,
    host: &str,
    hello_name: &ClientId,
) -> Result<(), ConnectionError> {
    let security = |source: super::relay::BoxError| ConnectionError::Security {
        host: host.to_string(),
        source,
    };

    if !conn.can_starttls() {
        return Err(security("relay does not advertise STARTTLS".into()));
    }

    let params = TlsParameters::new(host.to_string()).map_err(|e| security(Box::new(e)))?;
    conn.starttls(params, hello_name)
        .await
        .map_err(|e| security(Box::new(e)))?;

    debug!("STARTTLS established with {}", host);
    Ok(())
}

/// A live SMTP session; closed sessions refuse to send
pub struct SmtpSession {
    host: String,
    conn: Option<AsyncSmtpConnection>,
}

/// Run one MAIL / RCPT / DATA transaction
async fn transact(
    conn: &mut AsyncSmtpConnection,
    envelope: &Envelope,
) -> Result<Response, lettre::transport::smtp::Error> {
    let smtp = envelope.smtp_envelope();

    conn.command(Mail::new(smtp.from().cloned(), vec![])).await?;
    for to in smtp.to() {
        conn.command(Rcpt::new(to.clone(), vec![])).await?;
    }
    conn.command(Data).await?;
    conn.message(&envelope.formatted()).await
}

#[async_trait]
impl RelaySession for SmtpSession {
    async fn send(&mut self, envelope: &Envelope) -> Result<(), SendError> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| SendError::Disconnected("session already closed".to_string()))?;

        match transact(conn, envelope).await {
            Ok(response) => {
                debug!("Relay accepted {}: {}", envelope.message_id(), response.code());
                Ok(())
            }
            // A coded 4xx/5xx reply means the relay is still talking to us
            Err(e) if e.is_transient() || e.is_permanent() => {
                if let Err(rset) = conn.command(Rset).await {
                    return Err(SendError::Disconnected(format!(
                        "{} (reset failed: {})",
                        e, rset
                    )));
                }
                Err(SendError::Rejected(e.to_string()))
            }
            Err(e) => Err(SendError::Disconnected(e.to_string())),
        }
    }

    async fn close(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };

        if let Err(e) = conn.quit().await {
            warn!("Failed to close relay session with {}: {}", self.host, e);
            conn.abort().await;
        } else {
            debug!("Closed relay session with {}", self.host);
        }
    }
}
