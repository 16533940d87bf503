//! Campaign repository

use std::sync::Arc;

use chrono::Utc;
use mailburst_common::types::{CampaignId, UserId};
use mailburst_common::Result;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    Campaign, CampaignStats, CampaignStatus, CreateCampaign, DeliveryStatus, RecipientRecord,
};
use crate::store::MemoryStore;

/// Campaign repository
#[derive(Clone)]
pub struct CampaignRepository {
    store: Arc<MemoryStore>,
}

impl CampaignRepository {
    /// Create a new campaign repository
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// Create a campaign together with one queued recipient record per
    /// recipient. The campaign, its records, and its attachments become
    /// visible as one unit.
    pub async fn create(&self, input: CreateCampaign) -> Result<Campaign> {
        let now = Utc::now();
        let campaign_id = Uuid::new_v4();

        let campaign = Campaign {
            id: campaign_id,
            user_id: input.user_id,
            name: input.name,
            subject: input.subject,
            html_body: input.html_body,
            text_body: input.text_body,
            status: CampaignStatus::Scheduled,
            total_recipients: input.recipients.len(),
            sent_count: 0,
            failed_count: 0,
            delivered_count: 0,
            opened_count: 0,
            clicked_count: 0,
            attachments: input.attachments,
            created_at: now,
            scheduled_at: input.scheduled_at,
            started_at: None,
            completed_at: None,
        };

        let mut record_ids = Vec::with_capacity(input.recipients.len());
        let mut records = Vec::with_capacity(input.recipients.len());
        for entry in input.recipients {
            let record = RecipientRecord {
                id: Uuid::new_v4(),
                campaign_id,
                email: entry.email,
                name: entry.name,
                tracking_id: None,
                message_id: None,
                status: DeliveryStatus::Queued,
                opened: false,
                open_count: 0,
                first_opened_at: None,
                last_opened_at: None,
                clicked: false,
                click_count: 0,
                first_clicked_at: None,
                sent_at: None,
                delivered_at: None,
                error_message: None,
                retry_count: 0,
                user_agent: None,
                ip_address: None,
                created_at: now,
            };
            record_ids.push(record.id);
            records.push(record);
        }

        // Hold every map lock while inserting so the campaign and its
        // records appear together or not at all.
        let mut campaigns = self.store.campaigns.write().await;
        let mut recipients = self.store.recipients.write().await;
        let mut campaign_recipients = self.store.campaign_recipients.write().await;

        campaigns.insert(campaign_id, Arc::new(RwLock::new(campaign.clone())));
        for record in records {
            recipients.insert(record.id, Arc::new(RwLock::new(record)));
        }
        campaign_recipients.insert(campaign_id, record_ids);

        Ok(campaign)
    }

    /// Get a campaign by ID
    pub async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        match self.store.campaign(id).await {
            Some(record) => Ok(Some(record.read().await.clone())),
            None => Ok(None),
        }
    }

    /// List campaigns owned by a user, most recent first
    pub async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Campaign>> {
        let handles: Vec<_> = self.store.campaigns.read().await.values().cloned().collect();

        let mut campaigns = Vec::new();
        for handle in handles {
            let campaign = handle.read().await;
            if campaign.user_id == user_id {
                campaigns.push(campaign.clone());
            }
        }
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(campaigns)
    }

    /// Update campaign status, stamping `started_at` on entry into
    /// `Sending` and `completed_at` on completion or failure
    pub async fn update_status(
        &self,
        id: CampaignId,
        status: CampaignStatus,
    ) -> Result<Option<Campaign>> {
        let handle = match self.store.campaign(id).await {
            Some(handle) => handle,
            None => return Ok(None),
        };

        let mut campaign = handle.write().await;
        campaign.status = status;

        let now = Utc::now();
        if status == CampaignStatus::Sending && campaign.started_at.is_none() {
            campaign.started_at = Some(now);
        }
        if matches!(status, CampaignStatus::Completed | CampaignStatus::Failed)
            && campaign.completed_at.is_none()
        {
            campaign.completed_at = Some(now);
        }

        Ok(Some(campaign.clone()))
    }

    /// Recompute the campaign's aggregate counters as a fold over its
    /// recipient records and write them back. Folding instead of
    /// incrementing keeps the counters correct when engagement events race
    /// the dispatch loop.
    pub async fn refresh_counters(&self, id: CampaignId) -> Result<Option<CampaignStats>> {
        let handle = match self.store.campaign(id).await {
            Some(handle) => handle,
            None => return Ok(None),
        };

        let mut stats = CampaignStats {
            total_recipients: 0,
            sent: 0,
            failed: 0,
            delivered: 0,
            opened: 0,
            clicked: 0,
        };

        for record_handle in self.store.campaign_records(id).await {
            let record = record_handle.read().await;
            stats.total_recipients += 1;
            if record.status.counts_as_sent() {
                stats.sent += 1;
            }
            if record.status == DeliveryStatus::Failed {
                stats.failed += 1;
            }
            if record.status == DeliveryStatus::Delivered {
                stats.delivered += 1;
            }
            if record.opened {
                stats.opened += 1;
            }
            if record.clicked {
                stats.clicked += 1;
            }
        }

        let mut campaign = handle.write().await;
        campaign.sent_count = stats.sent;
        campaign.failed_count = stats.failed;
        campaign.delivered_count = stats.delivered;
        campaign.opened_count = stats.opened;
        campaign.clicked_count = stats.clicked;

        Ok(Some(stats))
    }
}
