use crate::engine::types::{AnomalySeverity, AnomalyStatus, LearnAnomaly};
use crate::store::keys;
use crate::store::{Store, StoreError};

impl Store {
    pub fn upsert_anomaly(&self, anomaly: &LearnAnomaly) -> Result<(), StoreError> {
        if anomaly.id.is_empty() {
            return Err(StoreError::Validation("anomaly id must not be empty".into()));
        }
        self.anomalies
            .insert(anomaly.id.as_bytes(), Self::serialize(anomaly)?)?;
        Ok(())
    }

    pub fn get_anomaly(&self, anomaly_id: &str) -> Result<Option<LearnAnomaly>, StoreError> {
        match self.anomalies.get(anomaly_id.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn list_session_anomalies(
        &self,
        session_id: &str,
    ) -> Result<Vec<LearnAnomaly>, StoreError> {
        let prefix = keys::anomaly_session_prefix(session_id)?;
        let mut anomalies = Vec::new();
        for item in self.anomalies.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = item?;
            anomalies.push(Self::deserialize(&raw)?);
        }
        Ok(anomalies)
    }

    /// 自动关闭扫描用：低风险且仍处 detected 的异常
    pub fn list_auto_resolvable_anomalies(&self) -> Result<Vec<LearnAnomaly>, StoreError> {
        let mut anomalies = Vec::new();
        for item in self.anomalies.iter() {
            let (_, raw) = item?;
            let anomaly: LearnAnomaly = Self::deserialize(&raw)?;
            if anomaly.status == AnomalyStatus::Detected
                && anomaly.severity == AnomalySeverity::Low
            {
                anomalies.push(anomaly);
            }
        }
        Ok(anomalies)
    }

    /// 归档汇总用：统计一组会话名下的异常数
    pub fn count_anomalies_for_sessions(
        &self,
        session_ids: &std::collections::HashSet<String>,
    ) -> Result<u64, StoreError> {
        let mut count = 0u64;
        for session_id in session_ids {
            count += self.list_session_anomalies(session_id)?.len() as u64;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::AnomalyType;
    use chrono::Utc;

    fn anomaly(session: &str, anomaly_type: AnomalyType, severity: AnomalySeverity) -> LearnAnomaly {
        let now = Utc::now();
        LearnAnomaly {
            id: format!("an:{session}:{}", anomaly_type.as_str()),
            session_id: session.to_string(),
            user_id: "u1".to_string(),
            anomaly_type,
            description: "test".to_string(),
            data: serde_json::json!({}),
            severity,
            status: AnomalyStatus::Detected,
            auto_detected: true,
            evidence: vec![],
            resolution: None,
            resolved_by: None,
            resolved_at: None,
            detected_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn session_prefix_scan_finds_only_that_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("test.sled").to_str().unwrap()).expect("open");

        store
            .upsert_anomaly(&anomaly("s1", AnomalyType::WindowSwitch, AnomalySeverity::Medium))
            .unwrap();
        store
            .upsert_anomaly(&anomaly("s1", AnomalyType::IdleTimeout, AnomalySeverity::Low))
            .unwrap();
        store
            .upsert_anomaly(&anomaly("s2", AnomalyType::IdleTimeout, AnomalySeverity::Low))
            .unwrap();

        assert_eq!(store.list_session_anomalies("s1").unwrap().len(), 2);
        assert_eq!(store.list_session_anomalies("s2").unwrap().len(), 1);
    }

    #[test]
    fn auto_resolvable_scan_filters_low_detected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("test.sled").to_str().unwrap()).expect("open");

        store
            .upsert_anomaly(&anomaly("s1", AnomalyType::IdleTimeout, AnomalySeverity::Low))
            .unwrap();
        store
            .upsert_anomaly(&anomaly("s1", AnomalyType::MultipleDevice, AnomalySeverity::Critical))
            .unwrap();

        let resolvable = store.list_auto_resolvable_anomalies().unwrap();
        assert_eq!(resolvable.len(), 1);
        assert_eq!(resolvable[0].anomaly_type, AnomalyType::IdleTimeout);
    }
}
