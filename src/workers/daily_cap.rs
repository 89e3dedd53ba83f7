//! Daily cap enforcement (00:20, for the previous calendar day). Runs
//! strictly after the day's classification sweeps have committed so the
//! ceiling is never applied against a partial total.

use crate::engine::StudyTimeEngine;
use crate::store::Store;

pub async fn run(store: &Store, engine: &StudyTimeEngine) {
    let now = chrono::Utc::now();
    let target_date = match now.date_naive().pred_opt() {
        Some(date) => date,
        None => return,
    };

    let users = match store.list_users_with_records_on(target_date) {
        Ok(users) => users,
        Err(e) => {
            tracing::error!(error = %e, "Failed to list users for daily cap");
            return;
        }
    };

    let mut trimmed_total = 0.0_f64;
    let mut affected_users = 0u64;

    for user_id in &users {
        match engine.enforce_daily_cap(user_id, target_date, now).await {
            Ok(outcome) => {
                if outcome.trimmed_secs > 0.0 {
                    affected_users += 1;
                    trimmed_total += outcome.trimmed_secs;
                }
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "Daily cap enforcement failed");
            }
        }
    }

    tracing::info!(
        date = %target_date,
        users = users.len(),
        affected_users,
        trimmed_secs = trimmed_total,
        "Daily cap run complete"
    );
}
