//! Mailburst Core - Campaign dispatch engine and engagement tracking
//!
//! This crate provides the dispatch loop that turns a campaign definition
//! plus a recipient list into a sequence of individually rendered,
//! individually delivered messages, and the engagement tracker that folds
//! open/click events back into recipient and campaign state.

pub mod campaign;
pub mod transport;

pub use campaign::{
    AttachmentUpload, CampaignDispatcher, CampaignSubmission, DispatchTicket, Pacer, Personalizer,
    TrackingService, TrackingSnapshot,
};
pub use transport::{
    MailTransport, MemoryTransport, OutboundMessage, SmtpMailTransport, TransportError,
    TransportReceipt,
};
