use crate::engine::progress::LearnProgress;
use crate::store::keys;
use crate::store::{Store, StoreError};

impl Store {
    pub fn get_progress(
        &self,
        user_id: &str,
        lesson_id: &str,
    ) -> Result<Option<LearnProgress>, StoreError> {
        let key = keys::progress_key(user_id, lesson_id)?;
        match self.progress.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn upsert_progress(&self, progress: &LearnProgress) -> Result<(), StoreError> {
        let key = keys::progress_key(&progress.user_id, &progress.lesson_id)?;
        self.progress
            .insert(key.as_bytes(), Self::serialize(progress)?)?;
        Ok(())
    }
}
