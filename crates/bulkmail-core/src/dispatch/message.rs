//! Message Builder - Turns a recipient row into a sendable envelope

use bulkmail_common::types::Recipient;
use chrono::Utc;
use lettre::address::AddressError;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::Message;
use thiserror::Error;
use uuid::Uuid;

/// Reasons an envelope cannot be formed
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("invalid sender address '{address}': {source}")]
    Sender {
        address: String,
        #[source]
        source: AddressError,
    },

    #[error("invalid recipient address '{address}': {source}")]
    Recipient {
        address: String,
        #[source]
        source: AddressError,
    },

    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),
}

/// A fully formed message ready for the relay
#[derive(Debug, Clone)]
pub struct Envelope {
    recipient: String,
    message_id: String,
    message: Message,
}

impl Envelope {
    /// Address the message is delivered to
    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// SMTP envelope (MAIL FROM / RCPT TO)
    pub fn smtp_envelope(&self) -> &lettre::address::Envelope {
        self.message.envelope()
    }

    /// RFC 5322 wire form of the message
    pub fn formatted(&self) -> Vec<u8> {
        self.message.formatted()
    }
}

/// Builds one HTML message per recipient from a fixed sender
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    from: Mailbox,
}

impl MessageBuilder {
    /// Create a builder for the given sender address
    pub fn new(from_address: &str) -> Result<Self, BuildError> {
        let from = from_address
            .parse::<Mailbox>()
            .map_err(|source| BuildError::Sender {
                address: from_address.to_string(),
                source,
            })?;

        Ok(Self { from })
    }

    pub fn sender(&self) -> &Mailbox {
        &self.from
    }

    /// Build the envelope for one recipient
    ///
    /// The body is carried as-is in a single `text/html` part inside a
    /// `multipart/mixed` container.
    pub fn build(&self, recipient: &Recipient) -> Result<Envelope, BuildError> {
        let to = recipient
            .address
            .parse::<Mailbox>()
            .map_err(|source| BuildError::Recipient {
                address: recipient.address.clone(),
                source,
            })?;

        let message_id = format!(
            "<{}.{}@{}>",
            Uuid::new_v4(),
            Utc::now().timestamp(),
            self.from.email.domain()
        );

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(recipient.subject.as_str())
            .message_id(Some(message_id.clone()))
            .date_now()
            .multipart(MultiPart::mixed().singlepart(SinglePart::html(recipient.body.clone())))?;

        Ok(Envelope {
            recipient: recipient.address.clone(),
            message_id,
            message,
        })
    }
}
