//! API routes

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers::{campaigns, dashboard, health, tracking, users};
use crate::AppState;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Email routes: submission plus the public tracking endpoints
    let email_routes = Router::new()
        .route("/send-campaign", post(campaigns::send_campaign))
        .route("/track/:tracking_id/pixel.png", get(tracking::track_pixel))
        .route("/track/click/:tracking_id", get(tracking::track_click))
        .route("/track/details/:tracking_id", get(tracking::tracking_details));

    // Dashboard routes
    let dashboard_routes = Router::new()
        .route("/campaigns", get(dashboard::list_campaigns))
        .route(
            "/campaigns/:campaign_id/report",
            get(dashboard::campaign_report),
        )
        .route(
            "/campaigns/:campaign_id/recipients",
            get(dashboard::campaign_recipients),
        );

    // Campaign control routes
    let campaign_routes = Router::new().route("/:campaign_id/pause", post(campaigns::pause_campaign));

    // User routes
    let user_routes = Router::new().route("/", post(users::create_user));

    let api_v1 = Router::new()
        .nest("/email", email_routes)
        .nest("/dashboard", dashboard_routes)
        .nest("/campaigns", campaign_routes)
        .nest("/users", user_routes)
        .with_state(state);

    Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use mailburst_common::config::{PacingSettings, SenderConfig};
    use mailburst_core::{CampaignDispatcher, MemoryTransport, TrackingService};
    use mailburst_storage::{CreateUser, MemoryStore, RecipientRepository, UserRepository};
    use serde_json::{json, Value};
    use uuid::Uuid;

    fn zero_pacing() -> PacingSettings {
        PacingSettings {
            min_delay_ms: 0,
            max_delay_ms: 0,
            batch_size: 10,
            batch_delay_ms: 0,
        }
    }

    async fn test_state() -> Arc<AppState> {
        let store = MemoryStore::new();
        let transport = MemoryTransport::new();
        let dispatcher = Arc::new(CampaignDispatcher::new(
            store.clone(),
            transport,
            SenderConfig {
                address: "news@example.com".to_string(),
                name: "Example News".to_string(),
            },
            zero_pacing(),
            "https://mail.example.com",
        ));
        let tracking = Arc::new(TrackingService::new(store.clone()));

        UserRepository::new(store.clone())
            .create(CreateUser {
                email: "owner@example.com".to_string(),
                name: Some("Owner".to_string()),
            })
            .await
            .unwrap();

        Arc::new(AppState {
            store,
            dispatcher,
            tracking,
        })
    }

    fn submission_body(recipients: Value) -> Value {
        json!({
            "user_email": "owner@example.com",
            "name": "Launch",
            "subject": "Hello",
            "html_body": "<html><body>Hi {{name}}</body></html>",
            "recipients": recipients,
        })
    }

    /// Submit a campaign, wait for dispatch, return (campaign_id, tracking_id
    /// of the first recipient).
    async fn dispatched_campaign(state: &Arc<AppState>, server: &TestServer) -> (Uuid, String) {
        let res = server
            .post("/api/v1/email/send-campaign")
            .json(&submission_body(json!([
                {"email": "reader@example.org", "name": "Reader"}
            ])))
            .await;
        assert_eq!(res.status_code(), StatusCode::ACCEPTED);

        let body: Value = res.json();
        let campaign_id: Uuid = body["campaign_id"].as_str().unwrap().parse().unwrap();
        state.dispatcher.join(campaign_id).await;

        let records = RecipientRepository::new(state.store.clone())
            .list_by_campaign(campaign_id, None)
            .await
            .unwrap();
        let tracking_id = records[0].tracking_id.clone().unwrap();
        (campaign_id, tracking_id)
    }

    #[tokio::test]
    async fn test_health() {
        let server = TestServer::new(create_router(test_state().await)).unwrap();
        let res = server.get("/health").await;
        assert_eq!(res.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_submission_returns_accepted_before_dispatch() {
        let state = test_state().await;
        let server = TestServer::new(create_router(state.clone())).unwrap();

        let res = server
            .post("/api/v1/email/send-campaign")
            .json(&submission_body(json!([
                {"email": "a@x.com"}, {"email": "b@x.com"}, {"email": "c@x.com"}
            ])))
            .await;

        assert_eq!(res.status_code(), StatusCode::ACCEPTED);
        let body: Value = res.json();
        assert_eq!(body["status"], "scheduled");
        assert_eq!(body["total_recipients"], 3);

        let campaign_id: Uuid = body["campaign_id"].as_str().unwrap().parse().unwrap();
        state.dispatcher.join(campaign_id).await;
    }

    #[tokio::test]
    async fn test_submission_validation_failures() {
        let state = test_state().await;
        let server = TestServer::new(create_router(state)).unwrap();

        let res = server
            .post("/api/v1/email/send-campaign")
            .json(&submission_body(json!([])))
            .await;
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);

        let mut unknown_user = submission_body(json!([{"email": "a@x.com"}]));
        unknown_user["user_email"] = json!("ghost@example.com");
        let res = server
            .post("/api/v1/email/send-campaign")
            .json(&unknown_user)
            .await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_pixel_always_returns_image() {
        let server = TestServer::new(create_router(test_state().await)).unwrap();

        let res = server
            .get("/api/v1/email/track/this-resolves-to-nothing/pixel.png")
            .await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(
            res.headers().get("content-type").unwrap().to_str().unwrap(),
            "image/png"
        );
        assert!(res
            .headers()
            .get("cache-control")
            .unwrap()
            .to_str()
            .unwrap()
            .contains("no-store"));
        let body = res.as_bytes();
        assert_eq!(body.len(), 67);
        assert_eq!(&body[..4], &[0x89u8, 0x50, 0x4E, 0x47][..]);
    }

    #[tokio::test]
    async fn test_open_and_click_round_trip() {
        let state = test_state().await;
        let server = TestServer::new(create_router(state.clone())).unwrap();
        let (_, tracking_id) = dispatched_campaign(&state, &server).await;

        let res = server
            .get(&format!("/api/v1/email/track/{}/pixel.png", tracking_id))
            .await;
        assert_eq!(res.status_code(), StatusCode::OK);

        let res = server
            .get(&format!("/api/v1/email/track/click/{}", tracking_id))
            .add_query_param("url", "https://example.com/offer")
            .await;
        assert_eq!(res.status_code(), StatusCode::FOUND);
        assert_eq!(
            res.headers().get("location").unwrap().to_str().unwrap(),
            "https://example.com/offer"
        );

        let res = server
            .get(&format!("/api/v1/email/track/details/{}", tracking_id))
            .await;
        assert_eq!(res.status_code(), StatusCode::OK);
        let details: Value = res.json();
        assert_eq!(details["opened"], true);
        assert_eq!(details["open_count"], 1);
        assert_eq!(details["clicked"], true);
        assert_eq!(details["click_count"], 1);
    }

    #[tokio::test]
    async fn test_click_without_url_is_rejected() {
        let server = TestServer::new(create_router(test_state().await)).unwrap();
        let res = server.get("/api/v1/email/track/click/whatever").await;
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_details_unknown_id_is_not_found() {
        let server = TestServer::new(create_router(test_state().await)).unwrap();
        let res = server.get("/api/v1/email/track/details/unknown").await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dashboard_listing_report_and_recipient_filter() {
        let state = test_state().await;
        let server = TestServer::new(create_router(state.clone())).unwrap();
        let (campaign_id, tracking_id) = dispatched_campaign(&state, &server).await;

        server
            .get(&format!("/api/v1/email/track/{}/pixel.png", tracking_id))
            .await;

        let res = server
            .get("/api/v1/dashboard/campaigns")
            .add_query_param("user", "owner@example.com")
            .await;
        assert_eq!(res.status_code(), StatusCode::OK);
        let listing: Value = res.json();
        assert_eq!(listing.as_array().unwrap().len(), 1);
        assert_eq!(listing[0]["status"], "completed");
        assert_eq!(listing[0]["opened_count"], 1);
        assert_eq!(listing[0]["open_rate"], 100.0);

        let res = server
            .get(&format!("/api/v1/dashboard/campaigns/{}/report", campaign_id))
            .add_query_param("user", "owner@example.com")
            .await;
        assert_eq!(res.status_code(), StatusCode::OK);
        let report: Value = res.json();
        assert_eq!(report["stats"]["sent"], 1);
        assert_eq!(report["stats"]["opened"], 1);
        assert_eq!(report["recipients"][0], "reader@example.org");

        let res = server
            .get(&format!(
                "/api/v1/dashboard/campaigns/{}/recipients",
                campaign_id
            ))
            .add_query_param("user", "owner@example.com")
            .add_query_param("status", "opened")
            .await;
        assert_eq!(res.status_code(), StatusCode::OK);
        let rows: Value = res.json();
        assert_eq!(rows.as_array().unwrap().len(), 1);
        assert_eq!(rows[0]["status"], "opened");

        // Filtering by a status no record has yields an empty list.
        let res = server
            .get(&format!(
                "/api/v1/dashboard/campaigns/{}/recipients",
                campaign_id
            ))
            .add_query_param("user", "owner@example.com")
            .add_query_param("status", "failed")
            .await;
        let rows: Value = res.json();
        assert!(rows.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_report_of_foreign_campaign_is_forbidden() {
        let state = test_state().await;
        let server = TestServer::new(create_router(state.clone())).unwrap();
        let (campaign_id, _) = dispatched_campaign(&state, &server).await;

        UserRepository::new(state.store.clone())
            .create(CreateUser {
                email: "other@example.com".to_string(),
                name: None,
            })
            .await
            .unwrap();

        let res = server
            .get(&format!("/api/v1/dashboard/campaigns/{}/report", campaign_id))
            .add_query_param("user", "other@example.com")
            .await;
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_create_user_and_duplicate() {
        let server = TestServer::new(create_router(test_state().await)).unwrap();

        let res = server
            .post("/api/v1/users")
            .json(&json!({"email": "fresh@example.com", "name": "Fresh"}))
            .await;
        assert_eq!(res.status_code(), StatusCode::CREATED);

        let res = server
            .post("/api/v1/users")
            .json(&json!({"email": "fresh@example.com"}))
            .await;
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);

        let res = server
            .post("/api/v1/users")
            .json(&json!({"email": "not-an-address"}))
            .await;
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    }
}
