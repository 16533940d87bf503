//! Pacing controller for the dispatch loop
//!
//! Sending many structurally identical messages back-to-back from one path
//! is the primary heuristic providers use to flag bulk sources. Randomized
//! micro-delays between sends plus a longer pause after every batch keep
//! the outbound flow looking organic. Advisory only: concurrent campaigns
//! do not share a budget.

use std::time::Duration;

use mailburst_common::config::PacingSettings;
use rand::Rng;

/// Decides how long to wait before each send and after each batch
#[derive(Debug, Clone)]
pub struct Pacer {
    min_delay_ms: u64,
    max_delay_ms: u64,
    batch_size: usize,
    batch_delay_ms: u64,
}

impl Pacer {
    /// Create a pacer from configuration
    pub fn new(settings: &PacingSettings) -> Self {
        Self {
            min_delay_ms: settings.min_delay_ms,
            max_delay_ms: settings.max_delay_ms.max(settings.min_delay_ms),
            batch_size: settings.batch_size.max(1),
            batch_delay_ms: settings.batch_delay_ms,
        }
    }

    /// Delay applied before each individual send, drawn uniformly from the
    /// configured range
    pub fn inter_message_delay(&self) -> Duration {
        let delay = rand::thread_rng().gen_range(self.min_delay_ms..=self.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// Number of sends after which the extended break is taken
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Extended break applied after each batch
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}
