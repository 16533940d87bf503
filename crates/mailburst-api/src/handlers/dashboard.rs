//! Dashboard and reporting handlers

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use mailburst_common::types::CampaignId;
use mailburst_storage::{
    Campaign, CampaignRepository, DeliveryStatus, RecipientRepository, User, UserRepository,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::handlers::ErrorResponse;
use crate::AppState;

/// Query parameters identifying the acting user
#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    /// Email address of the acting user
    pub user: String,
    /// Optional delivery-status filter for recipient listings
    pub status: Option<String>,
}

/// Campaign summary row for the dashboard listing
#[derive(Debug, Serialize)]
pub struct CampaignSummary {
    pub id: Uuid,
    pub name: String,
    pub subject: String,
    pub status: String,
    pub total_recipients: usize,
    pub sent_count: usize,
    pub delivered_count: usize,
    pub opened_count: usize,
    pub failed_count: usize,
    pub open_rate: f64,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Campaign> for CampaignSummary {
    fn from(c: Campaign) -> Self {
        let open_rate = c.open_rate();
        Self {
            id: c.id,
            name: c.name,
            subject: c.subject,
            status: c.status.to_string(),
            total_recipients: c.total_recipients,
            sent_count: c.sent_count,
            delivered_count: c.delivered_count,
            opened_count: c.opened_count,
            failed_count: c.failed_count,
            open_rate,
            scheduled_at: c.scheduled_at,
            completed_at: c.completed_at,
        }
    }
}

/// Aggregate statistics block of a campaign report
#[derive(Debug, Serialize)]
pub struct ReportStats {
    pub total: usize,
    pub sent: usize,
    pub delivered: usize,
    pub opened: usize,
    pub clicked: usize,
    pub failed: usize,
    pub open_rate: f64,
    pub click_rate: f64,
}

/// Full campaign report
#[derive(Debug, Serialize)]
pub struct CampaignReport {
    pub campaign_id: Uuid,
    pub campaign_name: String,
    pub stats: ReportStats,
    pub recipients: Vec<String>,
}

/// Recipient detail row
#[derive(Debug, Serialize)]
pub struct RecipientStatusRow {
    pub email: String,
    pub name: Option<String>,
    pub status: String,
    pub opened: bool,
    pub open_count: usize,
    pub sent_at: Option<DateTime<Utc>>,
    pub first_opened_at: Option<DateTime<Utc>>,
    pub last_opened_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

async fn resolve_user(state: &AppState, email: &str) -> Result<User, HandlerError> {
    let users = UserRepository::new(state.store.clone());
    match users.get_by_email(email).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "not_found".to_string(),
                message: format!("User not found: {}", email),
            }),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "internal_error".to_string(),
                message: e.to_string(),
            }),
        )),
    }
}

async fn resolve_owned_campaign(
    state: &AppState,
    campaign_id: CampaignId,
    user: &User,
) -> Result<Campaign, HandlerError> {
    let campaigns = CampaignRepository::new(state.store.clone());
    let campaign = match campaigns.get(campaign_id).await {
        Ok(Some(campaign)) => campaign,
        Ok(None) => {
            return Err((
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: "not_found".to_string(),
                    message: format!("Campaign not found: {}", campaign_id),
                }),
            ))
        }
        Err(e) => {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "internal_error".to_string(),
                    message: e.to_string(),
                }),
            ))
        }
    };

    if campaign.user_id != user.id {
        warn!(user = %user.email, %campaign_id, "Unauthorized campaign access attempt");
        return Err((
            StatusCode::FORBIDDEN,
            Json(ErrorResponse {
                error: "forbidden".to_string(),
                message: "Campaign belongs to another user".to_string(),
            }),
        ));
    }

    Ok(campaign)
}

/// List all campaigns of a user with derived metrics
///
/// GET /api/v1/dashboard/campaigns?user=...
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<Vec<CampaignSummary>>, HandlerError> {
    info!(user = %query.user, "Fetching campaigns");
    let user = resolve_user(&state, &query.user).await?;

    let campaigns = CampaignRepository::new(state.store.clone())
        .list_by_user(user.id)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "internal_error".to_string(),
                    message: e.to_string(),
                }),
            )
        })?;

    Ok(Json(campaigns.into_iter().map(CampaignSummary::from).collect()))
}

/// Detailed campaign report
///
/// GET /api/v1/dashboard/campaigns/:campaign_id/report?user=...
pub async fn campaign_report(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<CampaignId>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<CampaignReport>, HandlerError> {
    let user = resolve_user(&state, &query.user).await?;
    let campaign = resolve_owned_campaign(&state, campaign_id, &user).await?;

    let records = RecipientRepository::new(state.store.clone())
        .list_by_campaign(campaign_id, None)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "internal_error".to_string(),
                    message: e.to_string(),
                }),
            )
        })?;

    let total = campaign.total_recipients;
    let rate = |count: usize| {
        if total == 0 {
            0.0
        } else {
            (count as f64 * 100.0) / total as f64
        }
    };

    let report = CampaignReport {
        campaign_id: campaign.id,
        campaign_name: campaign.name.clone(),
        stats: ReportStats {
            total,
            sent: campaign.sent_count,
            delivered: campaign.delivered_count,
            opened: campaign.opened_count,
            clicked: campaign.clicked_count,
            failed: campaign.failed_count,
            open_rate: rate(campaign.opened_count),
            click_rate: rate(campaign.clicked_count),
        },
        recipients: records.into_iter().map(|r| r.email).collect(),
    };

    Ok(Json(report))
}

/// Recipient-level details with optional status filtering
///
/// GET /api/v1/dashboard/campaigns/:campaign_id/recipients?user=...&status=...
pub async fn campaign_recipients(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<CampaignId>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<Vec<RecipientStatusRow>>, HandlerError> {
    let user = resolve_user(&state, &query.user).await?;
    resolve_owned_campaign(&state, campaign_id, &user).await?;

    // An unrecognized status filter falls back to the unfiltered listing.
    let status = query.status.as_deref().and_then(|s| {
        let parsed = s.to_lowercase().parse::<DeliveryStatus>().ok();
        if parsed.is_none() {
            warn!(filter = %s, "Invalid status filter ignored");
        }
        parsed
    });

    let records = RecipientRepository::new(state.store.clone())
        .list_by_campaign(campaign_id, status)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "internal_error".to_string(),
                    message: e.to_string(),
                }),
            )
        })?;

    let rows = records
        .into_iter()
        .map(|r| RecipientStatusRow {
            email: r.email,
            name: r.name,
            status: r.status.to_string(),
            opened: r.opened,
            open_count: r.open_count,
            sent_at: r.sent_at,
            first_opened_at: r.first_opened_at,
            last_opened_at: r.last_opened_at,
            error_message: r.error_message,
        })
        .collect();

    Ok(Json(rows))
}
