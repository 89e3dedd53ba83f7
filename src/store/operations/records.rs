use chrono::NaiveDate;
use sled::Transactional;

use crate::engine::types::EffectiveStudyRecord;
use crate::store::keys;
use crate::store::operations::sessions::{LearnSession, SessionStatus};
use crate::store::{Store, StoreError};

impl Store {
    pub fn upsert_record(&self, record: &EffectiveStudyRecord) -> Result<(), StoreError> {
        let key = keys::record_key(&record.user_id, record.study_date, &record.session_id)?;
        self.study_records
            .insert(key.as_bytes(), Self::serialize(record)?)?;
        Ok(())
    }

    pub fn get_record(
        &self,
        user_id: &str,
        study_date: NaiveDate,
        session_id: &str,
    ) -> Result<Option<EffectiveStudyRecord>, StoreError> {
        let key = keys::record_key(user_id, study_date, session_id)?;
        match self.study_records.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn get_daily_records(
        &self,
        user_id: &str,
        study_date: NaiveDate,
    ) -> Result<Vec<EffectiveStudyRecord>, StoreError> {
        let prefix = keys::record_day_prefix(user_id, study_date)?;
        let mut records: Vec<EffectiveStudyRecord> = Vec::new();
        for item in self.study_records.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = item?;
            records.push(Self::deserialize(&raw)?);
        }
        records.sort_by(|a, b| a.window_start.cmp(&b.window_start));
        Ok(records)
    }

    pub fn get_course_records(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Vec<EffectiveStudyRecord>, StoreError> {
        let prefix = keys::record_user_prefix(user_id)?;
        let mut records = Vec::new();
        for item in self.study_records.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = item?;
            let record: EffectiveStudyRecord = Self::deserialize(&raw)?;
            if record.course_id == course_id {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.window_start.cmp(&b.window_start));
        Ok(records)
    }

    /// 日上限 worker 用：某日有学时记录的用户集合（全表扫描）
    pub fn list_users_with_records_on(
        &self,
        study_date: NaiveDate,
    ) -> Result<Vec<String>, StoreError> {
        let mut users = std::collections::BTreeSet::new();
        for item in self.study_records.iter() {
            let (_, raw) = item?;
            let record: EffectiveStudyRecord = Self::deserialize(&raw)?;
            if record.study_date == study_date {
                users.insert(record.user_id);
            }
        }
        Ok(users.into_iter().collect())
    }

    /// Write-back for one classification unit: the record lands and the
    /// session flips to classified in a single transaction, so a crash
    /// mid-unit never leaves half a classification behind.
    pub fn persist_classification(
        &self,
        record: &EffectiveStudyRecord,
        session: &LearnSession,
    ) -> Result<(), StoreError> {
        let record_key = keys::record_key(&record.user_id, record.study_date, &record.session_id)?;
        let record_bytes = Self::serialize(record)?;

        let mut classified = session.clone();
        classified.status = SessionStatus::Classified;
        classified.updated_at = record.updated_at;
        let session_key = keys::session_key(&classified.id)?;
        let session_bytes = Self::serialize(&classified)?;

        (&self.study_records, &self.learn_sessions)
            .transaction(|(tx_records, tx_sessions)| {
                tx_records.insert(record_key.as_bytes(), record_bytes.as_slice())?;
                tx_sessions.insert(session_key.as_bytes(), session_bytes.as_slice())?;
                Ok(())
            })
            .map_err(
                |error: sled::transaction::TransactionError<StoreError>| match error {
                    sled::transaction::TransactionError::Abort(store_error) => store_error,
                    sled::transaction::TransactionError::Storage(storage_error) => {
                        StoreError::Sled(storage_error)
                    }
                },
            )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::StudyTimeStatus;
    use chrono::{DateTime, TimeZone, Utc};

    fn record(user: &str, session: &str, start: DateTime<Utc>) -> EffectiveStudyRecord {
        EffectiveStudyRecord {
            id: format!("esr:{session}:{}", start.date_naive()),
            user_id: user.to_string(),
            session_id: session.to_string(),
            course_id: "c1".to_string(),
            lesson_id: "l1".to_string(),
            study_date: start.date_naive(),
            window_start: start,
            window_end: start + chrono::Duration::hours(1),
            total_secs: 3600.0,
            effective_secs: 3600.0,
            invalid_secs: 0.0,
            status: StudyTimeStatus::Valid,
            invalid_reason: None,
            quality_score: 9.0,
            focus_score: 1.0,
            interaction_score: 0.8,
            continuity_score: 1.0,
            evidence: vec![],
            reviewed_by: None,
            review_comment: None,
            reviewed_at: None,
            include_in_daily_total: true,
            student_notified: false,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn daily_records_are_scoped_and_ordered() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("test.sled").to_str().unwrap()).expect("open");

        let day = |h| Utc.with_ymd_and_hms(2026, 3, 2, h, 0, 0).unwrap();
        store.upsert_record(&record("u1", "s-b", day(14))).unwrap();
        store.upsert_record(&record("u1", "s-a", day(8))).unwrap();
        store
            .upsert_record(&record("u1", "s-c", Utc.with_ymd_and_hms(2026, 3, 3, 8, 0, 0).unwrap()))
            .unwrap();
        store.upsert_record(&record("u2", "s-d", day(9))).unwrap();

        let records = store
            .get_daily_records("u1", day(0).date_naive())
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].session_id, "s-a");
        assert_eq!(records[1].session_id, "s-b");
    }

    #[test]
    fn persist_classification_flips_session_status() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("test.sled").to_str().unwrap()).expect("open");

        let start = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let session = LearnSession {
            id: "s1".to_string(),
            user_id: "u1".to_string(),
            course_id: "c1".to_string(),
            lesson_id: "l1".to_string(),
            device_fingerprint: "fp-1".to_string(),
            ip: "10.0.0.1".to_string(),
            started_at: start,
            ended_at: Some(start + chrono::Duration::hours(1)),
            status: SessionStatus::Ended,
            created_at: start,
            updated_at: start,
        };
        store.create_session(&session).unwrap();

        store
            .persist_classification(&record("u1", "s1", start), &session)
            .unwrap();

        let stored = store.get_session("s1").unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Classified);
        assert!(store
            .get_record("u1", start.date_naive(), "s1")
            .unwrap()
            .is_some());
    }
}
