//! Mail transport boundary
//!
//! The dispatch loop hands fully rendered single-recipient messages to a
//! [`MailTransport`]. The production implementation relays over SMTP; the
//! in-memory implementation never touches the network and backs the tests.

pub mod memory;
pub mod smtp;

pub use memory::MemoryTransport;
pub use smtp::SmtpMailTransport;

use async_trait::async_trait;
use mailburst_storage::Attachment;
use thiserror::Error;

/// Transport errors
///
/// A transport failure is recorded on the recipient record and never
/// escalated past the dispatch loop.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Send failed: {0}")]
    Send(String),
}

/// A fully rendered message addressed to exactly one recipient
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub from_address: String,
    pub from_name: String,
    pub to_address: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
    /// Message identifier placed on the wire, `<uuid@sender-domain>`
    pub message_id: String,
    /// `List-Unsubscribe` header value keyed by the tracking identifier
    pub list_unsubscribe: String,
    pub attachments: Vec<Attachment>,
}

/// Receipt for a message the transport accepted
#[derive(Debug, Clone)]
pub struct TransportReceipt {
    /// Message identifier under which the message was handed off
    pub message_id: String,
}

/// Boundary to the outbound mail infrastructure
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Hand off one message; either confirms the handoff or reports failure
    async fn send(&self, message: &OutboundMessage) -> Result<TransportReceipt, TransportError>;
}
