//! Class/subclass registration and lookup (§4.8).
use crate::class::Class;
use crate::db::Database;
use crate::error::DbError;
use crate::flags::ClassFlags;
use crate::ids::ClassId;
use crate::persistence::Journal;

impl<J: Journal> Database<J> {
    /// register a top-level named class (§4.8). A live collision with the
    /// same name fails with [`DbError::Exists`]; a collision with a
    /// `DECL_DELETED` entry supersedes it in place, reusing the id and
    /// clearing the flag.
    pub async fn enter_class(
        &mut self,
        name: String,
        dynamic: bool,
        commit: bool,
    ) -> Result<ClassId, DbError<J::Error>> {
        let id = match self.find_class(&name) {
            Some(old_id) if self.class(old_id).flags.contains(ClassFlags::DECL_DELETED) => {
                self.class_mut(old_id).flags.remove(ClassFlags::DECL_DELETED);
                old_id
            }
            Some(_) => return Err(DbError::Exists),
            None => {
                let id = ClassId(self.classes.len() as u32);
                self.classes.push(Class::new(id, Some(name.clone())));
                self.collections.classes.push(id);
                id
            }
        };

        if dynamic {
            self.class_mut(id).flags.insert(ClassFlags::DECL_DYNAMIC);
        }

        if commit {
            self.journal.write_named_billing_class(&name, None).await?;
            self.journal.commit_leases().await?;
        }
        Ok(id)
    }

    /// register a subclass of `superclass`, keyed by `match_data` in the
    /// superclass's `subclasses` table (§3 "Class / subclass", §4.8). A
    /// live collision fails with [`DbError::Exists`].
    pub async fn enter_subclass(
        &mut self,
        superclass: ClassId,
        match_data: Vec<u8>,
        dynamic: bool,
        commit: bool,
    ) -> Result<ClassId, DbError<J::Error>> {
        if let Some(&existing) = self.class(superclass).subclasses.get(&match_data) {
            if !self.class(existing).flags.contains(ClassFlags::DECL_DELETED) {
                return Err(DbError::Exists);
            }
            self.class_mut(existing).flags.remove(ClassFlags::DECL_DELETED);
            return Ok(existing);
        }

        let id = ClassId(self.classes.len() as u32);
        let mut class = Class::new(id, None);
        class.superclass = Some(superclass);
        if dynamic {
            class.flags.insert(ClassFlags::DECL_DYNAMIC);
        }
        self.classes.push(class);
        self.class_mut(superclass).subclasses.insert(match_data.clone(), id);

        if commit {
            self.journal
                .write_named_billing_class(&format!("{superclass}"), Some(&match_data))
                .await?;
            self.journal.commit_leases().await?;
        }
        Ok(id)
    }

    /// logically delete `id`, idempotent on `DECL_DELETED` (§4.8). A
    /// top-level class stays in `collections.classes` (its name index is
    /// `find_class`'s live-flag scan, not a separate removable hash); a
    /// subclass is unlinked from its superclass's `subclasses` table.
    pub async fn delete_class(&mut self, id: ClassId, commit: bool) -> Result<(), DbError<J::Error>> {
        if self.class(id).flags.contains(ClassFlags::DECL_DELETED) {
            return Ok(());
        }
        self.class_mut(id).flags.insert(ClassFlags::DECL_DELETED);

        if let Some(superclass) = self.class(id).superclass {
            self.class_mut(superclass).subclasses.retain(|_, v| *v != id);
        }

        if commit {
            if let Some(name) = self.class(id).name.clone() {
                self.journal.write_named_billing_class(&name, None).await?;
            }
            self.journal.commit_leases().await?;
        }
        Ok(())
    }

    /// `find_class`: the live top-level class named `name`, if any (§4.8).
    pub fn find_class(&self, name: &str) -> Option<ClassId> {
        self.collections
            .classes
            .iter()
            .copied()
            .find(|&id| !self.class(id).flags.contains(ClassFlags::DECL_DELETED) && self.class(id).name.as_deref() == Some(name))
    }

    /// `find_subclass`: a live subclass of `superclass` matching `key`.
    pub fn find_subclass(&self, superclass: ClassId, key: &[u8]) -> Option<ClassId> {
        self.class(superclass)
            .subclasses
            .get(key)
            .copied()
            .filter(|&id| !self.class(id).flags.contains(ClassFlags::DECL_DELETED))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::host::Host;
    use crate::lease::Lease;
    use crate::scope::Scope;
    use async_trait::async_trait;

    struct NoopJournal;

    #[derive(Debug, thiserror::Error)]
    #[error("noop journal error")]
    struct NoopError;

    #[async_trait]
    impl Journal for NoopJournal {
        type Error = NoopError;
        async fn write_host(&self, _host: &Host) -> Result<(), Self::Error> {
            Ok(())
        }
        async fn write_lease(&self, _lease: &Lease) -> Result<(), Self::Error> {
            Ok(())
        }
        async fn write_named_billing_class(&self, _name: &str, _cp: Option<&[u8]>) -> Result<(), Self::Error> {
            Ok(())
        }
        async fn write_group(&self, _name: &str, _group: &Scope) -> Result<(), Self::Error> {
            Ok(())
        }
        async fn commit_leases(&self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn duplicate_live_class_name_fails_with_exists() {
        let mut db = Database::new(NoopJournal);
        db.enter_class("voip".into(), false, false).await.unwrap();
        let err = db.enter_class("voip".into(), false, false).await.unwrap_err();
        assert!(matches!(err, DbError::Exists));
    }

    #[tokio::test]
    async fn delete_then_reenter_reuses_id() {
        let mut db = Database::new(NoopJournal);
        let id = db.enter_class("voip".into(), false, false).await.unwrap();
        db.delete_class(id, false).await.unwrap();
        assert_eq!(db.find_class("voip"), None);
        let id2 = db.enter_class("voip".into(), false, false).await.unwrap();
        assert_eq!(id, id2);
    }

    #[tokio::test]
    async fn subclass_round_trips_through_find() {
        let mut db = Database::new(NoopJournal);
        let parent = db.enter_class("voip".into(), false, false).await.unwrap();
        let sub = db
            .enter_subclass(parent, vec![1, 2, 3], false, false)
            .await
            .unwrap();
        assert_eq!(db.find_subclass(parent, &[1, 2, 3]), Some(sub));
        db.delete_class(sub, false).await.unwrap();
        assert_eq!(db.find_subclass(parent, &[1, 2, 3]), None);
    }
}
