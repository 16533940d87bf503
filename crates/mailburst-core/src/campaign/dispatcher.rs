//! Campaign dispatcher
//!
//! Turns a campaign definition plus a recipient list into a sequence of
//! individually rendered, individually delivered messages. Each message
//! carries exactly one recipient address; pacing delays and batch breaks
//! space the sends out; one recipient's failure never aborts the campaign.
//!
//! The loop runs on its own task per campaign and observes cancellation
//! only between recipients: on trip the campaign is paused and every record
//! keeps whatever state its last completed step left it in.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use mailburst_common::config::{PacingSettings, SenderConfig};
use mailburst_common::types::{CampaignId, EmailAddress};
use mailburst_common::{Error, Result};
use mailburst_storage::{
    Attachment, CampaignRepository, CampaignStatus, CreateCampaign, MemoryStore, RecipientEntry,
    RecipientRepository, UserRepository,
};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::pacing::Pacer;
use super::personalize::Personalizer;
use crate::transport::{MailTransport, OutboundMessage};

/// Attachment upload carried by a campaign submission, payload base64-encoded
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub content_type: String,
    /// Base64-encoded file content
    pub data: String,
}

/// A campaign submission
#[derive(Debug, Clone, Deserialize)]
pub struct CampaignSubmission {
    /// Email address of the owning user
    pub user_email: String,
    pub name: String,
    pub subject: String,
    /// HTML body template
    pub html_body: String,
    /// Plain-text fallback template
    pub text_body: Option<String>,
    pub recipients: Vec<RecipientEntry>,
    #[serde(default)]
    pub attachments: Vec<AttachmentUpload>,
}

/// What the submitter gets back, before dispatch completes
#[derive(Debug, Clone)]
pub struct DispatchTicket {
    pub campaign_id: CampaignId,
    pub status: CampaignStatus,
    pub total_recipients: usize,
}

struct DispatchEntry {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// Everything the dispatch loop needs, detached from the dispatcher itself
#[derive(Clone)]
struct LoopContext {
    campaigns: CampaignRepository,
    recipients: RecipientRepository,
    transport: Arc<dyn MailTransport>,
    sender: SenderConfig,
    pacer: Pacer,
    personalizer: Personalizer,
}

/// Campaign dispatcher
pub struct CampaignDispatcher {
    users: UserRepository,
    campaigns: CampaignRepository,
    recipients: RecipientRepository,
    transport: Arc<dyn MailTransport>,
    sender: SenderConfig,
    pacer: Pacer,
    personalizer: Personalizer,
    /// One dispatch loop per campaign, ever
    active: Mutex<HashMap<CampaignId, DispatchEntry>>,
}

impl CampaignDispatcher {
    /// Create a new dispatcher over the record store
    pub fn new(
        store: Arc<MemoryStore>,
        transport: Arc<dyn MailTransport>,
        sender: SenderConfig,
        pacing: PacingSettings,
        base_url: &str,
    ) -> Self {
        Self {
            users: UserRepository::new(store.clone()),
            campaigns: CampaignRepository::new(store.clone()),
            recipients: RecipientRepository::new(store),
            transport,
            sender,
            pacer: Pacer::new(&pacing),
            personalizer: Personalizer::new(base_url),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Create a campaign with one queued record per recipient, hand it to
    /// the asynchronous dispatch loop, and return immediately.
    ///
    /// Precondition failures (unknown user, empty recipient list, blank
    /// fields) surface here, before anything is persisted. Per-attachment
    /// decode failures are logged and the attachment skipped.
    pub async fn create_and_dispatch(&self, submission: CampaignSubmission) -> Result<DispatchTicket> {
        let user = self
            .users
            .get_by_email(&submission.user_email)
            .await?
            .ok_or_else(|| Error::NotFound(format!("User not found: {}", submission.user_email)))?;

        if submission.recipients.is_empty() {
            return Err(Error::Validation("At least one recipient is required".to_string()));
        }
        if submission.name.trim().is_empty() {
            return Err(Error::Validation("Campaign name is required".to_string()));
        }
        if submission.subject.trim().is_empty() {
            return Err(Error::Validation("Subject is required".to_string()));
        }
        if submission.html_body.trim().is_empty() {
            return Err(Error::Validation("Body is required".to_string()));
        }

        let mut attachments = Vec::with_capacity(submission.attachments.len());
        for upload in submission.attachments {
            match BASE64.decode(upload.data.as_bytes()) {
                Ok(data) => attachments.push(Attachment {
                    file_name: upload.file_name,
                    content_type: upload.content_type,
                    data,
                }),
                Err(e) => {
                    error!(file_name = %upload.file_name, "Failed to read attachment: {}", e);
                }
            }
        }

        let campaign = self
            .campaigns
            .create(CreateCampaign {
                user_id: user.id,
                name: submission.name,
                subject: submission.subject,
                html_body: submission.html_body,
                text_body: submission.text_body,
                scheduled_at: None,
                recipients: submission.recipients,
                attachments,
            })
            .await?;

        let ticket = DispatchTicket {
            campaign_id: campaign.id,
            status: campaign.status,
            total_recipients: campaign.total_recipients,
        };

        let context = LoopContext {
            campaigns: self.campaigns.clone(),
            recipients: self.recipients.clone(),
            transport: self.transport.clone(),
            sender: self.sender.clone(),
            pacer: self.pacer.clone(),
            personalizer: self.personalizer.clone(),
        };

        let mut active = self.active.lock().expect("dispatch registry lock poisoned");
        if active.contains_key(&campaign.id) {
            warn!(campaign_id = %campaign.id, "Dispatch loop already running, not spawning another");
            return Ok(ticket);
        }

        let token = CancellationToken::new();
        let task = tokio::spawn(run_dispatch_loop(context, campaign.id, token.clone()));
        active.insert(
            campaign.id,
            DispatchEntry {
                token,
                task: Some(task),
            },
        );

        Ok(ticket)
    }

    /// Cancel the campaign's dispatch loop. The loop observes the signal
    /// between recipients and leaves every record in its last-known state.
    ///
    /// Returns `false` when no loop was ever started for the campaign.
    pub fn pause(&self, campaign_id: CampaignId) -> bool {
        let active = self.active.lock().expect("dispatch registry lock poisoned");
        match active.get(&campaign_id) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Wait for the campaign's dispatch loop to finish, if one is running
    pub async fn join(&self, campaign_id: CampaignId) {
        let task = {
            let mut active = self.active.lock().expect("dispatch registry lock poisoned");
            active.get_mut(&campaign_id).and_then(|entry| entry.task.take())
        };
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(%campaign_id, "Dispatch task panicked: {}", e);
            }
        }
    }

    /// Cancel every running dispatch loop and wait for each to stop
    pub async fn shutdown(&self) {
        let tasks: Vec<(CampaignId, JoinHandle<()>)> = {
            let mut active = self.active.lock().expect("dispatch registry lock poisoned");
            active
                .iter_mut()
                .filter_map(|(id, entry)| {
                    entry.token.cancel();
                    entry.task.take().map(|task| (*id, task))
                })
                .collect()
        };

        for (campaign_id, task) in tasks {
            if let Err(e) = task.await {
                error!(%campaign_id, "Dispatch task panicked: {}", e);
            }
        }
    }
}

async fn run_dispatch_loop(context: LoopContext, campaign_id: CampaignId, token: CancellationToken) {
    if let Err(e) = dispatch_campaign(&context, campaign_id, &token).await {
        error!(%campaign_id, "Dispatch loop aborted: {}", e);
    }
}

async fn dispatch_campaign(
    context: &LoopContext,
    campaign_id: CampaignId,
    token: &CancellationToken,
) -> Result<()> {
    let campaign = context
        .campaigns
        .update_status(campaign_id, CampaignStatus::Sending)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Campaign {}", campaign_id)))?;

    info!(
        %campaign_id,
        name = %campaign.name,
        recipients = campaign.total_recipients,
        "Starting campaign"
    );

    let sender_domain = EmailAddress::parse(&context.sender.address)
        .map(|address| address.domain)
        .unwrap_or_else(|| "localhost".to_string());

    let record_ids = context.recipients.ids_by_campaign(campaign_id).await?;
    let mut batch_counter = 0usize;
    let mut paused = false;

    for record_id in record_ids {
        // Random delay before every send, including the first. Cancellation
        // is only observed here and at the batch break, never mid-send;
        // biased polling makes an already-cancelled token win over an
        // already-elapsed delay.
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                paused = true;
                break;
            }
            _ = tokio::time::sleep(context.pacer.inter_message_delay()) => {}
        }

        let tracking_id = context.recipients.assign_tracking_id(record_id).await?;
        context.recipients.mark_sending(record_id).await?;
        let record = context
            .recipients
            .get(record_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Recipient record {}", record_id)))?;

        let name = record.name.as_deref();
        let personalized = context.personalizer.render(&campaign.html_body, name);
        let html_body = context
            .personalizer
            .inject_tracking_pixel(&personalized, &tracking_id);
        let text_body = match &campaign.text_body {
            Some(text) => context.personalizer.render(text, name),
            None => Personalizer::html_to_plain_text(&personalized),
        };

        let message = OutboundMessage {
            from_address: context.sender.address.clone(),
            from_name: context.sender.name.clone(),
            to_address: record.email.clone(),
            to_name: record.name.clone(),
            subject: campaign.subject.clone(),
            html_body,
            text_body,
            message_id: format!("<{}@{}>", Uuid::new_v4(), sender_domain),
            list_unsubscribe: context.personalizer.list_unsubscribe(&tracking_id),
            attachments: campaign.attachments.clone(),
        };

        match context.transport.send(&message).await {
            Ok(receipt) => {
                context
                    .recipients
                    .mark_sent(record_id, &receipt.message_id)
                    .await?;
                debug!(to = %record.email, "Email sent successfully");
            }
            Err(e) => {
                warn!(to = %record.email, "Failed to send email: {}", e);
                context
                    .recipients
                    .mark_failed(record_id, &e.to_string())
                    .await?;
            }
        }

        context.campaigns.refresh_counters(campaign_id).await?;

        batch_counter += 1;
        if batch_counter >= context.pacer.batch_size() {
            info!(%campaign_id, "Batch complete. Taking extended break");
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    paused = true;
                    break;
                }
                _ = tokio::time::sleep(context.pacer.batch_delay()) => {}
            }
            batch_counter = 0;
        }
    }

    if paused {
        context
            .campaigns
            .update_status(campaign_id, CampaignStatus::Paused)
            .await?;
        info!(%campaign_id, "Campaign interrupted, remaining recipients left queued");
        return Ok(());
    }

    let stats = context
        .campaigns
        .refresh_counters(campaign_id)
        .await?
        .unwrap_or_else(|| mailburst_storage::CampaignStats {
            total_recipients: 0,
            sent: 0,
            failed: 0,
            delivered: 0,
            opened: 0,
            clicked: 0,
        });
    context
        .campaigns
        .update_status(campaign_id, CampaignStatus::Completed)
        .await?;

    info!(
        %campaign_id,
        sent = stats.sent,
        total = stats.total_recipients,
        "Campaign completed"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use mailburst_storage::{CreateUser, DeliveryStatus};
    use std::collections::HashSet;

    fn pacing(min_ms: u64, max_ms: u64, batch_size: usize, batch_delay_ms: u64) -> PacingSettings {
        PacingSettings {
            min_delay_ms: min_ms,
            max_delay_ms: max_ms,
            batch_size,
            batch_delay_ms,
        }
    }

    fn sender() -> SenderConfig {
        SenderConfig {
            address: "news@example.com".to_string(),
            name: "Example News".to_string(),
        }
    }

    async fn seed_user(store: &Arc<MemoryStore>) -> String {
        UserRepository::new(store.clone())
            .create(CreateUser {
                email: "owner@example.com".to_string(),
                name: Some("Owner".to_string()),
            })
            .await
            .unwrap();
        "owner@example.com".to_string()
    }

    fn submission(user_email: &str, recipients: &[(&str, Option<&str>)]) -> CampaignSubmission {
        CampaignSubmission {
            user_email: user_email.to_string(),
            name: "Launch".to_string(),
            subject: "Hello".to_string(),
            html_body: "<html><body>Hi {{firstName}}</body></html>".to_string(),
            text_body: None,
            recipients: recipients
                .iter()
                .map(|(email, name)| RecipientEntry {
                    email: (*email).to_string(),
                    name: name.map(str::to_string),
                })
                .collect(),
            attachments: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_end_to_end_three_recipients() {
        let store = MemoryStore::new();
        let user_email = seed_user(&store).await;
        let transport = MemoryTransport::new();
        let dispatcher = CampaignDispatcher::new(
            store.clone(),
            transport.clone(),
            sender(),
            pacing(0, 0, 2, 0),
            "https://mail.example.com",
        );

        let ticket = dispatcher
            .create_and_dispatch(submission(
                &user_email,
                &[
                    ("a@x.com", Some("Ada Lovelace")),
                    ("b@x.com", None),
                    ("c@x.com", Some("Charles")),
                ],
            ))
            .await
            .unwrap();
        assert_eq!(ticket.status, CampaignStatus::Scheduled);
        assert_eq!(ticket.total_recipients, 3);

        dispatcher.join(ticket.campaign_id).await;

        let campaign = CampaignRepository::new(store.clone())
            .get(ticket.campaign_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(campaign.status, CampaignStatus::Completed);
        assert_eq!(campaign.sent_count, 3);
        assert_eq!(campaign.failed_count, 0);
        assert!(campaign.completed_at.unwrap() >= campaign.started_at.unwrap());

        let records = RecipientRepository::new(store.clone())
            .list_by_campaign(ticket.campaign_id, None)
            .await
            .unwrap();
        assert_eq!(records.len(), 3);
        for record in &records {
            assert_eq!(record.status, DeliveryStatus::Sent);
            assert!(record.sent_at.is_some());
            assert!(record.message_id.is_some());
        }

        // Three separate messages, one recipient each, in insertion order.
        let messages = transport.sent();
        assert_eq!(messages.len(), 3);
        let addresses: Vec<_> = messages.iter().map(|m| m.to_address.as_str()).collect();
        assert_eq!(addresses, vec!["a@x.com", "b@x.com", "c@x.com"]);

        // Personalization and instrumentation made it onto the wire.
        assert!(messages[0].html_body.contains("Hi Ada"));
        assert!(messages[1].html_body.contains("Hi {{firstName}}"));
        let tracking_id = records[0].tracking_id.as_deref().unwrap();
        assert!(messages[0].html_body.contains(tracking_id));
        assert!(messages[0].list_unsubscribe.contains(tracking_id));
    }

    #[tokio::test]
    async fn test_per_recipient_failure_is_isolated() {
        let store = MemoryStore::new();
        let user_email = seed_user(&store).await;
        let transport = MemoryTransport::new();
        transport.fail_address("b@x.com");
        let dispatcher = CampaignDispatcher::new(
            store.clone(),
            transport.clone(),
            sender(),
            pacing(0, 0, 10, 0),
            "https://mail.example.com",
        );

        let ticket = dispatcher
            .create_and_dispatch(submission(
                &user_email,
                &[("a@x.com", None), ("b@x.com", None), ("c@x.com", None)],
            ))
            .await
            .unwrap();
        dispatcher.join(ticket.campaign_id).await;

        let campaign = CampaignRepository::new(store.clone())
            .get(ticket.campaign_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(campaign.status, CampaignStatus::Completed);
        assert_eq!(campaign.sent_count, 2);
        assert_eq!(campaign.failed_count, 1);
        assert!(campaign.sent_count + campaign.failed_count <= campaign.total_recipients);

        let records = RecipientRepository::new(store.clone())
            .list_by_campaign(ticket.campaign_id, None)
            .await
            .unwrap();
        let failed = records.iter().find(|r| r.email == "b@x.com").unwrap();
        assert_eq!(failed.status, DeliveryStatus::Failed);
        assert_eq!(failed.retry_count, 1);
        assert!(failed.error_message.as_deref().unwrap().contains("b@x.com"));
        assert!(records
            .iter()
            .filter(|r| r.email != "b@x.com")
            .all(|r| r.status == DeliveryStatus::Sent));
    }

    #[tokio::test]
    async fn test_cancellation_pauses_and_preserves_state() {
        let store = MemoryStore::new();
        let user_email = seed_user(&store).await;
        let transport = MemoryTransport::new();
        let dispatcher = Arc::new(CampaignDispatcher::new(
            store.clone(),
            transport.clone(),
            sender(),
            pacing(0, 0, 100, 0),
            "https://mail.example.com",
        ));

        let recipients: Vec<(String, Option<&str>)> =
            (0..10).map(|i| (format!("r{}@x.com", i), None)).collect();
        let recipient_refs: Vec<(&str, Option<&str>)> = recipients
            .iter()
            .map(|(email, name)| (email.as_str(), *name))
            .collect();

        let ticket = dispatcher
            .create_and_dispatch(submission(&user_email, &recipient_refs))
            .await
            .unwrap();

        // Cancel from within the transport after the third accepted send;
        // the loop notices between recipients.
        {
            let dispatcher = dispatcher.clone();
            let campaign_id = ticket.campaign_id;
            transport.set_hook(move |_, count| {
                if count == 3 {
                    dispatcher.pause(campaign_id);
                }
            });
        }

        dispatcher.join(ticket.campaign_id).await;

        let campaign = CampaignRepository::new(store.clone())
            .get(ticket.campaign_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(campaign.status, CampaignStatus::Paused);
        assert_eq!(campaign.sent_count, 3);
        assert!(campaign.completed_at.is_none());

        let records = RecipientRepository::new(store.clone())
            .list_by_campaign(ticket.campaign_id, None)
            .await
            .unwrap();
        assert_eq!(
            records
                .iter()
                .filter(|r| r.status == DeliveryStatus::Sent)
                .count(),
            3
        );
        assert_eq!(
            records
                .iter()
                .filter(|r| r.status == DeliveryStatus::Queued)
                .count(),
            7
        );
        assert!(records.iter().all(|r| r.status != DeliveryStatus::Failed));
    }

    #[tokio::test]
    async fn test_tracking_ids_unique_across_campaigns() {
        let store = MemoryStore::new();
        let user_email = seed_user(&store).await;
        let transport = MemoryTransport::new();
        let dispatcher = CampaignDispatcher::new(
            store.clone(),
            transport.clone(),
            sender(),
            pacing(0, 0, 10, 0),
            "https://mail.example.com",
        );

        let mut tracking_ids = HashSet::new();
        let mut expected = 0usize;
        for _ in 0..3 {
            let ticket = dispatcher
                .create_and_dispatch(submission(
                    &user_email,
                    &[("a@x.com", None), ("b@x.com", None)],
                ))
                .await
                .unwrap();
            dispatcher.join(ticket.campaign_id).await;

            let records = RecipientRepository::new(store.clone())
                .list_by_campaign(ticket.campaign_id, None)
                .await
                .unwrap();
            for record in records {
                tracking_ids.insert(record.tracking_id.unwrap());
                expected += 1;
            }
        }
        assert_eq!(tracking_ids.len(), expected);
    }

    #[tokio::test]
    async fn test_unknown_user_fails_fast() {
        let store = MemoryStore::new();
        let dispatcher = CampaignDispatcher::new(
            store.clone(),
            MemoryTransport::new(),
            sender(),
            pacing(0, 0, 10, 0),
            "https://mail.example.com",
        );

        let result = dispatcher
            .create_and_dispatch(submission("ghost@example.com", &[("a@x.com", None)]))
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_empty_recipients_rejected() {
        let store = MemoryStore::new();
        let user_email = seed_user(&store).await;
        let dispatcher = CampaignDispatcher::new(
            store.clone(),
            MemoryTransport::new(),
            sender(),
            pacing(0, 0, 10, 0),
            "https://mail.example.com",
        );

        let result = dispatcher
            .create_and_dispatch(submission(&user_email, &[]))
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_bad_attachment_is_skipped_not_fatal() {
        let store = MemoryStore::new();
        let user_email = seed_user(&store).await;
        let transport = MemoryTransport::new();
        let dispatcher = CampaignDispatcher::new(
            store.clone(),
            transport.clone(),
            sender(),
            pacing(0, 0, 10, 0),
            "https://mail.example.com",
        );

        let mut submission = submission(&user_email, &[("a@x.com", None)]);
        submission.attachments = vec![
            AttachmentUpload {
                file_name: "ok.txt".to_string(),
                content_type: "text/plain".to_string(),
                data: BASE64.encode(b"hello"),
            },
            AttachmentUpload {
                file_name: "broken.bin".to_string(),
                content_type: "application/octet-stream".to_string(),
                data: "not base64 !!!".to_string(),
            },
        ];

        let ticket = dispatcher.create_and_dispatch(submission).await.unwrap();
        dispatcher.join(ticket.campaign_id).await;

        let campaign = CampaignRepository::new(store.clone())
            .get(ticket.campaign_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(campaign.status, CampaignStatus::Completed);
        assert_eq!(campaign.attachments.len(), 1);
        assert_eq!(campaign.attachments[0].file_name, "ok.txt");
        assert_eq!(transport.sent()[0].attachments.len(), 1);
    }
}
