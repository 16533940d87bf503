//! Campaign submission and control handlers

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use mailburst_common::types::CampaignId;
use mailburst_core::CampaignSubmission;
use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::handlers::{error_response, ErrorResponse};
use crate::AppState;

/// Campaign submission response, returned before dispatch completes
#[derive(Debug, Serialize)]
pub struct CampaignStatusResponse {
    pub campaign_id: Uuid,
    pub status: String,
    pub total_recipients: usize,
}

/// Submit a campaign for dispatch
///
/// POST /api/v1/email/send-campaign
pub async fn send_campaign(
    State(state): State<Arc<AppState>>,
    Json(submission): Json<CampaignSubmission>,
) -> Result<(StatusCode, Json<CampaignStatusResponse>), (StatusCode, Json<ErrorResponse>)> {
    info!(user = %submission.user_email, "Campaign request");

    let ticket = state
        .dispatcher
        .create_and_dispatch(submission)
        .await
        .map_err(|e| error_response(&e))?;

    info!(
        campaign_id = %ticket.campaign_id,
        recipients = ticket.total_recipients,
        "Campaign created"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(CampaignStatusResponse {
            campaign_id: ticket.campaign_id,
            status: ticket.status.to_string(),
            total_recipients: ticket.total_recipients,
        }),
    ))
}

/// Cancel a campaign's running dispatch loop
///
/// POST /api/v1/campaigns/:campaign_id/pause
pub async fn pause_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<CampaignId>,
) -> Result<(StatusCode, Json<serde_json::Value>), (StatusCode, Json<ErrorResponse>)> {
    if !state.dispatcher.pause(campaign_id) {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "not_found".to_string(),
                message: format!("No dispatch loop for campaign {}", campaign_id),
            }),
        ));
    }

    info!(%campaign_id, "Campaign pause requested");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "campaign_id": campaign_id, "pausing": true })),
    ))
}
