//! Classification sweep: picks up ended, not-yet-classified sessions and
//! runs the engine over each one.

use crate::engine::error::EngineError;
use crate::engine::{ProcessOptions, StudyTimeEngine};
use crate::store::operations::sessions::SessionStatus;
use crate::store::Store;

pub async fn run(store: &Store, engine: &StudyTimeEngine) {
    let pending = match store.list_sessions_with_status(SessionStatus::Ended) {
        Ok(sessions) => sessions,
        Err(e) => {
            tracing::error!(error = %e, "Failed to list pending sessions");
            return;
        }
    };

    if pending.is_empty() {
        return;
    }

    let now = chrono::Utc::now();
    let mut classified = 0u64;
    let mut skipped = 0u64;
    let mut anomalies = 0u64;

    for session in &pending {
        match engine
            .process_session(&session.id, ProcessOptions::default(), now)
            .await
        {
            Ok(outcome) => {
                classified += 1;
                anomalies += outcome.anomalies.len() as u64;
            }
            // 单元级错误不在 worker 内重试：跳过并留给下一轮/人工处理
            Err(EngineError::MalformedEvent { session_id, detail }) => {
                skipped += 1;
                tracing::warn!(session_id, detail, "Skipping session with malformed events");
            }
            Err(e) => {
                skipped += 1;
                tracing::error!(session_id = %session.id, error = %e, "Session classification failed");
            }
        }
    }

    tracing::info!(
        pending = pending.len(),
        classified,
        skipped,
        anomalies,
        "Classification sweep complete"
    );
}
