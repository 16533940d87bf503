//! SMTP transport backed by lettre

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::{ContentType, Header, HeaderName, HeaderValue};
use lettre::message::{Attachment as MessageAttachment, Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use mailburst_common::config::SmtpConfig;
use tracing::{debug, warn};

use super::{MailTransport, OutboundMessage, TransportError, TransportReceipt};

/// `List-Unsubscribe` header
#[derive(Debug, Clone)]
struct ListUnsubscribe(String);

impl Header for ListUnsubscribe {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("List-Unsubscribe")
    }

    fn parse(s: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self(s.to_string()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}

/// `Precedence` header, set to `bulk` on every campaign message
#[derive(Debug, Clone)]
struct Precedence(String);

impl Header for Precedence {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("Precedence")
    }

    fn parse(s: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self(s.to_string()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}

/// Production transport relaying through an SMTP server
pub struct SmtpMailTransport {
    config: SmtpConfig,
}

impl SmtpMailTransport {
    /// Create a new SMTP transport from configuration
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn build_message(message: &OutboundMessage) -> Result<Message, TransportError> {
        let from: Mailbox = format!("{} <{}>", message.from_name, message.from_address)
            .parse()
            .map_err(|e| TransportError::Build(format!("Invalid from address: {}", e)))?;

        let to: Mailbox = match &message.to_name {
            Some(name) => format!("{} <{}>", name, message.to_address).parse(),
            None => message.to_address.parse(),
        }
        .map_err(|e| TransportError::Build(format!("Invalid to address: {}", e)))?;

        let builder = Message::builder()
            .from(from)
            .to(to)
            .subject(&message.subject)
            .message_id(Some(message.message_id.clone()))
            .header(ListUnsubscribe(message.list_unsubscribe.clone()))
            .header(Precedence("bulk".to_string()));

        let alternative = MultiPart::alternative_plain_html(
            message.text_body.clone(),
            message.html_body.clone(),
        );

        let built = if message.attachments.is_empty() {
            builder.multipart(alternative)
        } else {
            let mut mixed = MultiPart::mixed().multipart(alternative);
            for attachment in &message.attachments {
                let content_type = match ContentType::parse(&attachment.content_type) {
                    Ok(ct) => ct,
                    Err(e) => {
                        warn!(
                            file_name = %attachment.file_name,
                            "Failed to add attachment: {}", e
                        );
                        continue;
                    }
                };
                mixed = mixed.singlepart(
                    MessageAttachment::new(attachment.file_name.clone())
                        .body(attachment.data.clone(), content_type),
                );
            }
            builder.multipart(mixed)
        };

        built.map_err(|e| TransportError::Build(format!("Failed to build email: {}", e)))
    }

    fn build_mailer(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, TransportError> {
        let builder = if self.config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.host)
        } else if self.config.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
        } else {
            Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
                &self.config.host,
            ))
        };

        let mut builder = builder
            .map_err(|e| TransportError::Send(format!("Failed to create SMTP transport: {}", e)))?
            .port(self.config.port);

        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(builder.timeout(Some(Duration::from_secs(30))).build())
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<TransportReceipt, TransportError> {
        let email = Self::build_message(message)?;
        let mailer = self.build_mailer()?;

        match mailer.send(email).await {
            Ok(response) => {
                debug!(to = %message.to_address, "Email accepted: {:?}", response);
                Ok(TransportReceipt {
                    message_id: message.message_id.clone(),
                })
            }
            Err(e) => Err(TransportError::Send(e.to_string())),
        }
    }
}
