use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnSession {
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub lesson_id: String,
    pub device_fingerprint: String,
    pub ip: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
    Classified,
}

impl Store {
    pub fn create_session(&self, session: &LearnSession) -> Result<(), StoreError> {
        let key = keys::session_key(&session.id)?;
        let index_key = keys::session_user_index(&session.user_id, &session.id)?;
        let session_bytes = Self::serialize(session)?;

        self.learn_sessions
            .insert(key.as_bytes(), session_bytes.as_slice())?;
        self.sessions_by_user
            .insert(index_key.as_bytes(), &[] as &[u8])?;
        Ok(())
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<LearnSession>, StoreError> {
        let key = keys::session_key(session_id)?;
        match self.learn_sessions.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn update_session(&self, session: &LearnSession) -> Result<(), StoreError> {
        let key = keys::session_key(&session.id)?;
        self.learn_sessions
            .insert(key.as_bytes(), Self::serialize(session)?)?;
        Ok(())
    }

    pub fn end_session(
        &self,
        session_id: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<LearnSession, StoreError> {
        let mut session =
            self.get_session(session_id)?
                .ok_or_else(|| StoreError::NotFound {
                    entity: "learn_session".to_string(),
                    key: session_id.to_string(),
                })?;
        session.ended_at = Some(ended_at);
        session.status = SessionStatus::Ended;
        session.updated_at = ended_at;
        self.update_session(&session)?;
        Ok(session)
    }

    /// 分类扫描用：全表过滤，数据量由归档 worker 控制
    pub fn list_sessions_with_status(
        &self,
        status: SessionStatus,
    ) -> Result<Vec<LearnSession>, StoreError> {
        let mut sessions = Vec::new();
        for item in self.learn_sessions.iter() {
            let (_, raw) = item?;
            let session: LearnSession = Self::deserialize(&raw)?;
            if session.status == status {
                sessions.push(session);
            }
        }
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(sessions)
    }

    /// All of a user's sessions whose window overlaps [start, end).
    /// Open sessions are treated as running until `end`.
    pub fn get_user_sessions_overlapping(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LearnSession>, StoreError> {
        let prefix = keys::session_user_prefix(user_id)?;
        let mut sessions = Vec::new();
        for item in self.sessions_by_user.scan_prefix(prefix.as_bytes()) {
            let (k, _) = item?;
            let key_str = String::from_utf8(k.to_vec()).unwrap_or_default();
            let Some(session_id) = key_str.rsplit(':').next() else {
                continue;
            };
            let Some(session) = self.get_session(session_id)? else {
                continue;
            };
            let session_end = session.ended_at.unwrap_or(end);
            if session.started_at < end && session_end > start {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }
}
