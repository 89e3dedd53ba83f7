use crate::engine::archive::LearnArchive;
use crate::store::keys;
use crate::store::{Store, StoreError};

impl Store {
    pub fn get_archive(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Option<LearnArchive>, StoreError> {
        let key = keys::archive_key(user_id, course_id)?;
        match self.archives.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn upsert_archive(&self, archive: &LearnArchive) -> Result<(), StoreError> {
        let key = keys::archive_key(&archive.user_id, &archive.course_id)?;
        self.archives
            .insert(key.as_bytes(), Self::serialize(archive)?)?;
        Ok(())
    }
}
