//! Engagement tracking
//!
//! Consumes open and click events keyed by tracking identifier and folds
//! them back into recipient and campaign state. Unknown identifiers are a
//! silent no-op: the tracking endpoints are hit by anonymous, untrusted
//! clients and must never leak whether an identifier resolves.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mailburst_common::Result;
use mailburst_storage::{
    CampaignRepository, DeliveryStatus, MemoryStore, RecipientRepository,
};
use serde::Serialize;
use tracing::{debug, info};

/// Read-only projection of a recipient record for external reporting
#[derive(Debug, Clone, Serialize)]
pub struct TrackingSnapshot {
    pub recipient_email: String,
    pub recipient_name: Option<String>,
    pub status: DeliveryStatus,
    pub sent: bool,
    pub opened: bool,
    pub open_count: usize,
    pub clicked: bool,
    pub click_count: usize,
    pub sent_at: Option<DateTime<Utc>>,
    pub first_opened_at: Option<DateTime<Utc>>,
    pub last_opened_at: Option<DateTime<Utc>>,
    pub first_clicked_at: Option<DateTime<Utc>>,
    pub user_agent: Option<String>,
}

/// Engagement tracker
#[derive(Clone)]
pub struct TrackingService {
    campaigns: CampaignRepository,
    recipients: RecipientRepository,
}

impl TrackingService {
    /// Create a new tracking service over the record store
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            campaigns: CampaignRepository::new(store.clone()),
            recipients: RecipientRepository::new(store),
        }
    }

    /// Record an open event observed via the tracking pixel
    pub async fn record_open(
        &self,
        tracking_id: &str,
        user_agent: Option<&str>,
        ip_address: Option<&str>,
    ) -> Result<()> {
        match self
            .recipients
            .record_open(tracking_id, user_agent, ip_address)
            .await?
        {
            Some(campaign_id) => {
                info!(%tracking_id, "Email open recorded");
                self.campaigns.refresh_counters(campaign_id).await?;
            }
            None => {
                debug!(%tracking_id, "Open event for unknown tracking id ignored");
            }
        }
        Ok(())
    }

    /// Record a click event observed via the redirect endpoint.
    ///
    /// The destination URL is logged for auditing but not persisted on the
    /// record.
    pub async fn record_click(&self, tracking_id: &str, destination_url: &str) -> Result<()> {
        match self.recipients.record_click(tracking_id).await? {
            Some(campaign_id) => {
                info!(%tracking_id, url = %destination_url, "Link click recorded");
                self.campaigns.refresh_counters(campaign_id).await?;
            }
            None => {
                debug!(%tracking_id, "Click event for unknown tracking id ignored");
            }
        }
        Ok(())
    }

    /// Engagement snapshot for a tracking identifier
    pub async fn details(&self, tracking_id: &str) -> Result<Option<TrackingSnapshot>> {
        let record = match self.recipients.get_by_tracking_id(tracking_id).await? {
            Some(record) => record,
            None => return Ok(None),
        };

        Ok(Some(TrackingSnapshot {
            recipient_email: record.email,
            recipient_name: record.name,
            status: record.status,
            sent: record.sent_at.is_some(),
            opened: record.opened,
            open_count: record.open_count,
            clicked: record.clicked,
            click_count: record.click_count,
            sent_at: record.sent_at,
            first_opened_at: record.first_opened_at,
            last_opened_at: record.last_opened_at,
            first_clicked_at: record.first_clicked_at,
            user_agent: record.user_agent,
        }))
    }
}
