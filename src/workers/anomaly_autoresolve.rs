//! Auto-resolution sweep for low-severity anomalies still in detected
//! state. High and critical findings stay open for human review.

use crate::engine::StudyTimeEngine;

pub async fn run(engine: &StudyTimeEngine) {
    match engine.auto_resolve_pending(chrono::Utc::now()).await {
        Ok(0) => {}
        Ok(resolved) => {
            tracing::info!(resolved, "Auto-resolved low severity anomalies");
        }
        Err(e) => {
            tracing::error!(error = %e, "Anomaly auto-resolution failed");
        }
    }
}
