//! Rebuild cached profiles of recently active learners (every 4 hours),
//! so the first recommendation request after a quiet period is served from cache.

use chrono::Utc;

use crate::practice::PracticeEngine;

pub async fn run(engine: &PracticeEngine) {
    let started = std::time::Instant::now();
    match engine.warm_profiles(Utc::now()).await {
        Ok(report) => tracing::info!(
            scanned = report.scanned,
            warmed = report.warmed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Profile warmup finished"
        ),
        Err(e) => tracing::warn!(error = %e, "Profile warmup failed"),
    }
}
