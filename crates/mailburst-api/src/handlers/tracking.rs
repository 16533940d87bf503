//! Engagement tracking handlers
//!
//! The pixel endpoint is fetched by mail clients on behalf of anonymous,
//! untrusted recipients: it always serves the image, whatever happens
//! internally, so a broken or expired identifier never renders as a broken
//! email.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use mailburst_core::TrackingSnapshot;
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::handlers::ErrorResponse;
use crate::AppState;

/// Transparent 1x1 PNG served by the pixel endpoint
static TRACKING_PIXEL: [u8; 67] = [
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

fn pixel_response() -> Response {
    (
        [
            (
                header::CACHE_CONTROL,
                "no-cache, no-store, must-revalidate",
            ),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
            (header::CONTENT_TYPE, "image/png"),
        ],
        TRACKING_PIXEL.as_slice(),
    )
        .into_response()
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers.get("x-forwarded-for")?.to_str().ok()?;
    forwarded.split(',').next().map(|ip| ip.trim().to_string())
}

/// Track an email open via the invisible pixel
///
/// GET /api/v1/email/track/:tracking_id/pixel.png
pub async fn track_pixel(
    State(state): State<Arc<AppState>>,
    Path(tracking_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let tracking_id = tracking_id.trim_end_matches(".png");
    debug!(%tracking_id, "Tracking pixel view");

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok());
    let ip_address = client_ip(&headers);

    if let Err(e) = state
        .tracking
        .record_open(tracking_id, user_agent, ip_address.as_deref())
        .await
    {
        // Still return the pixel to avoid breaking the email.
        error!(%tracking_id, "Error tracking email open: {}", e);
    }

    pixel_response()
}

/// Query parameters for the click-redirect endpoint
#[derive(Debug, Deserialize)]
pub struct ClickQuery {
    pub url: Option<String>,
}

/// Track a link click, then redirect to the destination URL
///
/// GET /api/v1/email/track/click/:tracking_id?url=...
pub async fn track_click(
    State(state): State<Arc<AppState>>,
    Path(tracking_id): Path<String>,
    Query(query): Query<ClickQuery>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let url = match query.url.as_deref() {
        Some(url) if !url.trim().is_empty() => url.to_string(),
        _ => {
            warn!(%tracking_id, "Click tracking request with empty URL");
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "validation_error".to_string(),
                    message: "Destination URL is required".to_string(),
                }),
            ));
        }
    };

    if let Err(e) = state.tracking.record_click(&tracking_id, &url).await {
        error!(%tracking_id, "Error tracking click: {}", e);
    }

    Ok((StatusCode::FOUND, [(header::LOCATION, url)]).into_response())
}

/// Detailed tracking information for one recipient record
///
/// GET /api/v1/email/track/details/:tracking_id
pub async fn tracking_details(
    State(state): State<Arc<AppState>>,
    Path(tracking_id): Path<String>,
) -> Result<Json<TrackingSnapshot>, (StatusCode, Json<ErrorResponse>)> {
    match state.tracking.details(&tracking_id).await {
        Ok(Some(snapshot)) => Ok(Json(snapshot)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "not_found".to_string(),
                message: format!("No tracking data for {}", tracking_id),
            }),
        )),
        Err(e) => {
            error!(%tracking_id, "Error fetching tracking details: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "internal_error".to_string(),
                    message: "Failed to fetch tracking details".to_string(),
                }),
            ))
        }
    }
}
