//! Long-term archive refresh: folds classified sessions into the
//! per-(user, course) summary rows.

use std::collections::BTreeSet;

use crate::engine::StudyTimeEngine;
use crate::store::operations::sessions::SessionStatus;
use crate::store::Store;

pub async fn run(store: &Store, engine: &StudyTimeEngine) {
    let classified = match store.list_sessions_with_status(SessionStatus::Classified) {
        Ok(sessions) => sessions,
        Err(e) => {
            tracing::error!(error = %e, "Failed to list classified sessions");
            return;
        }
    };

    let pairs: BTreeSet<(String, String)> = classified
        .iter()
        .map(|s| (s.user_id.clone(), s.course_id.clone()))
        .collect();

    let now = chrono::Utc::now();
    let mut refreshed = 0u64;

    for (user_id, course_id) in &pairs {
        match engine.summarize_course(user_id, course_id, now).await {
            Ok(_) => refreshed += 1,
            Err(e) => {
                tracing::error!(user_id, course_id, error = %e, "Archive summarization failed");
            }
        }
    }

    tracing::info!(
        pairs = pairs.len(),
        refreshed,
        "Archive summarization complete"
    );
}
