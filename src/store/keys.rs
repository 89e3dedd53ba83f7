use chrono::NaiveDate;

use crate::store::StoreError;

/// 键内组件不得包含分隔符，否则前缀扫描会串键
fn component<'a>(value: &'a str, what: &str) -> Result<&'a str, StoreError> {
    if value.is_empty() || value.contains(':') {
        return Err(StoreError::Validation(format!(
            "invalid {what} for key: {value:?}"
        )));
    }
    Ok(value)
}

pub fn session_key(session_id: &str) -> Result<String, StoreError> {
    Ok(component(session_id, "session_id")?.to_string())
}

pub fn session_user_index(user_id: &str, session_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:{}", component(user_id, "user_id")?, session_id))
}

pub fn session_user_prefix(user_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:", component(user_id, "user_id")?))
}

/// `{session_id}:{ts_ms:013}:{event_id}` —— 前缀扫描即按时间升序
pub fn event_key(session_id: &str, ts_ms: i64, event_id: &str) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{:013}:{}",
        component(session_id, "session_id")?,
        ts_ms,
        component(event_id, "event_id")?
    ))
}

pub fn event_session_prefix(session_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:", component(session_id, "session_id")?))
}

pub fn record_key(
    user_id: &str,
    study_date: NaiveDate,
    session_id: &str,
) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{}:{}",
        component(user_id, "user_id")?,
        study_date.format("%Y-%m-%d"),
        component(session_id, "session_id")?
    ))
}

pub fn record_day_prefix(user_id: &str, study_date: NaiveDate) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{}:",
        component(user_id, "user_id")?,
        study_date.format("%Y-%m-%d")
    ))
}

pub fn record_user_prefix(user_id: &str) -> Result<String, StoreError> {
    Ok(format!("{}:", component(user_id, "user_id")?))
}

/// Anomaly ids ("an:{session}:{type}") double as store keys, so a
/// session prefix scan finds every anomaly of that session.
pub fn anomaly_session_prefix(session_id: &str) -> Result<String, StoreError> {
    Ok(format!("an:{}:", component(session_id, "session_id")?))
}

pub fn progress_key(user_id: &str, lesson_id: &str) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{}",
        component(user_id, "user_id")?,
        component(lesson_id, "lesson_id")?
    ))
}

pub fn archive_key(user_id: &str, course_id: &str) -> Result<String, StoreError> {
    Ok(format!(
        "{}:{}",
        component(user_id, "user_id")?,
        component(course_id, "course_id")?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_keys_sort_by_timestamp() {
        let early = event_key("s1", 1_000, "a").unwrap();
        let late = event_key("s1", 20_000, "b").unwrap();
        assert!(early < late);
    }

    #[test]
    fn components_with_separators_are_rejected() {
        assert!(session_key("s:1").is_err());
        assert!(progress_key("u1", "l:1").is_err());
        assert!(event_key("s1", 0, "").is_err());
    }
}
