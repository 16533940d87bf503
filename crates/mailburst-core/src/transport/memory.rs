//! In-memory transport double
//!
//! Never touches the network: accepted messages are recorded so tests can
//! inspect exactly what the dispatch loop would have sent. Failures can be
//! injected per recipient address, and a hook can observe each accepted
//! send as it happens.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{MailTransport, OutboundMessage, TransportError, TransportReceipt};

type SendHook = Box<dyn Fn(&OutboundMessage, usize) + Send + Sync>;

/// Transport that records messages instead of sending them
#[derive(Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<OutboundMessage>>,
    failing_addresses: Mutex<HashSet<String>>,
    hook: Mutex<Option<SendHook>>,
}

impl MemoryTransport {
    /// Create a new in-memory transport
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every send to `address` fail
    pub fn fail_address(&self, address: &str) {
        self.failing_addresses
            .lock()
            .expect("transport lock poisoned")
            .insert(address.to_string());
    }

    /// Observe each accepted send together with the running send count
    pub fn set_hook(&self, hook: impl Fn(&OutboundMessage, usize) + Send + Sync + 'static) {
        *self.hook.lock().expect("transport lock poisoned") = Some(Box::new(hook));
    }

    /// Messages accepted so far
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().expect("transport lock poisoned").clone()
    }

    /// Number of messages accepted so far
    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("transport lock poisoned").len()
    }
}

#[async_trait]
impl MailTransport for MemoryTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<TransportReceipt, TransportError> {
        if self
            .failing_addresses
            .lock()
            .expect("transport lock poisoned")
            .contains(&message.to_address)
        {
            return Err(TransportError::Send(format!(
                "Simulated failure for {}",
                message.to_address
            )));
        }

        let count = {
            let mut sent = self.sent.lock().expect("transport lock poisoned");
            sent.push(message.clone());
            sent.len()
        };

        if let Some(hook) = self.hook.lock().expect("transport lock poisoned").as_ref() {
            hook(message, count);
        }

        Ok(TransportReceipt {
            message_id: message.message_id.clone(),
        })
    }
}
