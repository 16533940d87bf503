//! In-process record store
//!
//! Campaigns and recipient records are held behind individual locks so that
//! the dispatch loop and the engagement tracker can mutate different records
//! concurrently. The outer maps are only locked long enough to resolve a
//! record handle; mutation then happens under the record's own lock.

use std::collections::HashMap;
use std::sync::Arc;

use mailburst_common::types::{CampaignId, RecipientId, UserId};
use tokio::sync::RwLock;

use crate::models::{Campaign, RecipientRecord, User};

/// Shared handle to a single mutable record
pub(crate) type Record<T> = Arc<RwLock<T>>;

/// The in-process record store
#[derive(Default)]
pub struct MemoryStore {
    pub(crate) users: RwLock<HashMap<UserId, User>>,
    pub(crate) users_by_email: RwLock<HashMap<String, UserId>>,
    pub(crate) campaigns: RwLock<HashMap<CampaignId, Record<Campaign>>>,
    pub(crate) recipients: RwLock<HashMap<RecipientId, Record<RecipientRecord>>>,
    /// Recipient ids per campaign, in insertion order
    pub(crate) campaign_recipients: RwLock<HashMap<CampaignId, Vec<RecipientId>>>,
    /// Tracking identifier to recipient id, across all campaigns
    pub(crate) tracking_index: RwLock<HashMap<String, RecipientId>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) async fn campaign(&self, id: CampaignId) -> Option<Record<Campaign>> {
        self.campaigns.read().await.get(&id).cloned()
    }

    pub(crate) async fn recipient(&self, id: RecipientId) -> Option<Record<RecipientRecord>> {
        self.recipients.read().await.get(&id).cloned()
    }

    pub(crate) async fn recipient_by_tracking_id(
        &self,
        tracking_id: &str,
    ) -> Option<Record<RecipientRecord>> {
        let id = *self.tracking_index.read().await.get(tracking_id)?;
        self.recipient(id).await
    }

    /// Recipient record handles for a campaign, in insertion order
    pub(crate) async fn campaign_records(
        &self,
        campaign_id: CampaignId,
    ) -> Vec<Record<RecipientRecord>> {
        let ids = match self.campaign_recipients.read().await.get(&campaign_id) {
            Some(ids) => ids.clone(),
            None => return Vec::new(),
        };

        let recipients = self.recipients.read().await;
        ids.iter()
            .filter_map(|id| recipients.get(id).cloned())
            .collect()
    }
}
