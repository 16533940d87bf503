//! Recipient record repository
//!
//! Every mutation here happens under the individual record's write lock, so
//! the dispatch loop and concurrent engagement events can update different
//! records without contending on anything campaign-wide.

use std::sync::Arc;

use chrono::Utc;
use mailburst_common::types::{CampaignId, RecipientId};
use mailburst_common::{Error, Result};
use uuid::Uuid;

use crate::models::{DeliveryStatus, RecipientRecord};
use crate::store::MemoryStore;

/// Recipient record repository
#[derive(Clone)]
pub struct RecipientRepository {
    store: Arc<MemoryStore>,
}

impl RecipientRepository {
    /// Create a new recipient repository
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// Get a recipient record by ID
    pub async fn get(&self, id: RecipientId) -> Result<Option<RecipientRecord>> {
        match self.store.recipient(id).await {
            Some(handle) => Ok(Some(handle.read().await.clone())),
            None => Ok(None),
        }
    }

    /// Resolve a tracking identifier to its recipient record
    pub async fn get_by_tracking_id(&self, tracking_id: &str) -> Result<Option<RecipientRecord>> {
        match self.store.recipient_by_tracking_id(tracking_id).await {
            Some(handle) => Ok(Some(handle.read().await.clone())),
            None => Ok(None),
        }
    }

    /// List a campaign's records in insertion order, optionally filtered by
    /// delivery status
    pub async fn list_by_campaign(
        &self,
        campaign_id: CampaignId,
        status: Option<DeliveryStatus>,
    ) -> Result<Vec<RecipientRecord>> {
        let mut records = Vec::new();
        for handle in self.store.campaign_records(campaign_id).await {
            let record = handle.read().await;
            if status.is_none() || status == Some(record.status) {
                records.push(record.clone());
            }
        }
        Ok(records)
    }

    /// Recipient ids of a campaign in insertion order
    pub async fn ids_by_campaign(&self, campaign_id: CampaignId) -> Result<Vec<RecipientId>> {
        Ok(self
            .store
            .campaign_recipients
            .read()
            .await
            .get(&campaign_id)
            .cloned()
            .unwrap_or_default())
    }

    /// Mint a fresh globally-unique tracking identifier for the record and
    /// register it in the tracking index. Called at send time, not at
    /// campaign creation.
    pub async fn assign_tracking_id(&self, id: RecipientId) -> Result<String> {
        let handle = self
            .store
            .recipient(id)
            .await
            .ok_or_else(|| Error::NotFound(format!("Recipient record {}", id)))?;

        let tracking_id = Uuid::new_v4().to_string();

        {
            let mut record = handle.write().await;
            record.tracking_id = Some(tracking_id.clone());
        }
        self.store
            .tracking_index
            .write()
            .await
            .insert(tracking_id.clone(), id);

        Ok(tracking_id)
    }

    /// Transition the record to `Sending` and stamp `sent_at`
    pub async fn mark_sending(&self, id: RecipientId) -> Result<()> {
        let handle = self
            .store
            .recipient(id)
            .await
            .ok_or_else(|| Error::NotFound(format!("Recipient record {}", id)))?;

        let mut record = handle.write().await;
        record.status = DeliveryStatus::Sending;
        record.sent_at = Some(Utc::now());
        Ok(())
    }

    /// Record a successful handoff to the transport
    pub async fn mark_sent(&self, id: RecipientId, message_id: &str) -> Result<()> {
        let handle = self
            .store
            .recipient(id)
            .await
            .ok_or_else(|| Error::NotFound(format!("Recipient record {}", id)))?;

        let mut record = handle.write().await;
        record.status = DeliveryStatus::Sent;
        record.message_id = Some(message_id.to_string());
        record.error_message = None;
        Ok(())
    }

    /// Record a failed send attempt
    pub async fn mark_failed(&self, id: RecipientId, error: &str) -> Result<()> {
        let handle = self
            .store
            .recipient(id)
            .await
            .ok_or_else(|| Error::NotFound(format!("Recipient record {}", id)))?;

        let mut record = handle.write().await;
        record.status = DeliveryStatus::Failed;
        record.error_message = Some(error.to_string());
        record.retry_count += 1;
        Ok(())
    }

    /// Apply an open event to the record behind a tracking identifier.
    ///
    /// `first_opened_at` is stamped only once; `open_count` and
    /// `last_opened_at` advance on every call; the observed client info is
    /// last-write-wins. Returns the owning campaign id, or `None` for an
    /// unknown identifier (which mutates nothing).
    pub async fn record_open(
        &self,
        tracking_id: &str,
        user_agent: Option<&str>,
        ip_address: Option<&str>,
    ) -> Result<Option<CampaignId>> {
        let handle = match self.store.recipient_by_tracking_id(tracking_id).await {
            Some(handle) => handle,
            None => return Ok(None),
        };

        let mut record = handle.write().await;
        let now = Utc::now();

        if !record.opened {
            record.opened = true;
            record.first_opened_at = Some(now);
            record.status = DeliveryStatus::Opened;
        }

        record.open_count += 1;
        record.last_opened_at = Some(now);
        record.user_agent = user_agent.map(str::to_string);
        record.ip_address = ip_address.map(str::to_string);

        Ok(Some(record.campaign_id))
    }

    /// Apply a click event to the record behind a tracking identifier.
    ///
    /// Returns the owning campaign id, or `None` for an unknown identifier.
    pub async fn record_click(&self, tracking_id: &str) -> Result<Option<CampaignId>> {
        let handle = match self.store.recipient_by_tracking_id(tracking_id).await {
            Some(handle) => handle,
            None => return Ok(None),
        };

        let mut record = handle.write().await;

        if !record.clicked {
            record.clicked = true;
            record.first_clicked_at = Some(Utc::now());
            record.status = DeliveryStatus::Clicked;
        }
        record.click_count += 1;

        Ok(Some(record.campaign_id))
    }
}
