use crate::engine::types::BehaviorEvent;
use crate::store::keys;
use crate::store::{Store, StoreError};

impl Store {
    pub fn append_event(&self, event: &BehaviorEvent) -> Result<(), StoreError> {
        let key = keys::event_key(
            &event.session_id,
            event.timestamp.timestamp_millis(),
            &event.id,
        )?;
        self.behavior_events
            .insert(key.as_bytes(), Self::serialize(event)?)?;
        Ok(())
    }

    /// Events in timestamp order; the key layout makes the prefix scan
    /// come back sorted.
    pub fn get_events_for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<BehaviorEvent>, StoreError> {
        let prefix = keys::event_session_prefix(session_id)?;
        let mut events = Vec::new();
        for item in self.behavior_events.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = item?;
            events.push(Self::deserialize(&raw)?);
        }
        Ok(events)
    }
}
