//! Record models

use chrono::{DateTime, Utc};
use mailburst_common::types::{CampaignId, RecipientId, UserId};
use serde::{Deserialize, Serialize};

/// User model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Create user input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub name: Option<String>,
}

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Completed,
    Failed,
    Paused,
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Draft => write!(f, "draft"),
            CampaignStatus::Scheduled => write!(f, "scheduled"),
            CampaignStatus::Sending => write!(f, "sending"),
            CampaignStatus::Completed => write!(f, "completed"),
            CampaignStatus::Failed => write!(f, "failed"),
            CampaignStatus::Paused => write!(f, "paused"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "scheduled" => Ok(CampaignStatus::Scheduled),
            "sending" => Ok(CampaignStatus::Sending),
            "completed" => Ok(CampaignStatus::Completed),
            "failed" => Ok(CampaignStatus::Failed),
            "paused" => Ok(CampaignStatus::Paused),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// Attachment payload carried by a campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Campaign model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub user_id: UserId,
    pub name: String,
    pub subject: String,
    pub html_body: String,
    /// Fallback for non-HTML clients
    pub text_body: Option<String>,
    pub status: CampaignStatus,
    /// Fixed at creation, never mutated afterwards
    pub total_recipients: usize,
    pub sent_count: usize,
    pub failed_count: usize,
    pub delivered_count: usize,
    pub opened_count: usize,
    pub clicked_count: usize,
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// Calculate progress percentage
    pub fn progress_percentage(&self) -> f64 {
        if self.total_recipients == 0 {
            0.0
        } else {
            (self.sent_count as f64 / self.total_recipients as f64) * 100.0
        }
    }

    /// Calculate open rate as a percentage of all recipients
    pub fn open_rate(&self) -> f64 {
        if self.total_recipients == 0 {
            0.0
        } else {
            (self.opened_count as f64 / self.total_recipients as f64) * 100.0
        }
    }
}

/// Delivery status of a single recipient record
///
/// The field tracks the latest known stage: `Opened` and `Clicked` are
/// engagement stages layered on top of a successful send, so a record in
/// either state still counts as sent (see [`DeliveryStatus::counts_as_sent`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Queued,
    Sending,
    Sent,
    /// Confirmed delivered by the provider, when such feedback exists
    Delivered,
    Failed,
    Opened,
    Clicked,
}

impl DeliveryStatus {
    /// Whether this status implies the message was successfully handed off
    pub fn counts_as_sent(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Sent
                | DeliveryStatus::Delivered
                | DeliveryStatus::Opened
                | DeliveryStatus::Clicked
        )
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Queued => write!(f, "queued"),
            DeliveryStatus::Sending => write!(f, "sending"),
            DeliveryStatus::Sent => write!(f, "sent"),
            DeliveryStatus::Delivered => write!(f, "delivered"),
            DeliveryStatus::Failed => write!(f, "failed"),
            DeliveryStatus::Opened => write!(f, "opened"),
            DeliveryStatus::Clicked => write!(f, "clicked"),
        }
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(DeliveryStatus::Queued),
            "sending" => Ok(DeliveryStatus::Sending),
            "sent" => Ok(DeliveryStatus::Sent),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "failed" => Ok(DeliveryStatus::Failed),
            "opened" => Ok(DeliveryStatus::Opened),
            "clicked" => Ok(DeliveryStatus::Clicked),
            _ => Err(format!("Invalid delivery status: {}", s)),
        }
    }
}

/// Per-recipient delivery and engagement record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientRecord {
    pub id: RecipientId,
    pub campaign_id: CampaignId,
    pub email: String,
    pub name: Option<String>,
    /// Globally unique, immutable once assigned; minted at send time
    pub tracking_id: Option<String>,
    /// Message identifier assigned when the transport accepts the message
    pub message_id: Option<String>,
    pub status: DeliveryStatus,
    pub opened: bool,
    pub open_count: usize,
    pub first_opened_at: Option<DateTime<Utc>>,
    pub last_opened_at: Option<DateTime<Utc>>,
    pub clicked: bool,
    pub click_count: usize,
    pub first_clicked_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub retry_count: usize,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One recipient of a campaign submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientEntry {
    pub email: String,
    pub name: Option<String>,
}

/// Create campaign input
#[derive(Debug, Clone)]
pub struct CreateCampaign {
    pub user_id: UserId,
    pub name: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub recipients: Vec<RecipientEntry>,
    pub attachments: Vec<Attachment>,
}

/// Aggregate statistics folded from a campaign's recipient records
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CampaignStats {
    pub total_recipients: usize,
    pub sent: usize,
    pub failed: usize,
    pub delivered: usize,
    pub opened: usize,
    pub clicked: usize,
}
