//! Mailburst API - REST API server
//!
//! This crate provides the REST surface for Mailburst: campaign
//! submission, the tracking pixel and click-redirect endpoints, tracking
//! details, and the dashboard queries.

pub mod handlers;
pub mod routes;

use std::sync::Arc;

use mailburst_core::{CampaignDispatcher, TrackingService};
use mailburst_storage::MemoryStore;

pub use routes::create_router;

/// Shared state behind every handler
pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub dispatcher: Arc<CampaignDispatcher>,
    pub tracking: Arc<TrackingService>,
}
