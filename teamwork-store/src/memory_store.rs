// SPDX-License-Identifier: MIT OR Apache-2.0

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use crate::traits::{GroupStore, StoreError};
use crate::types::{GroupMeta, PrincipalId};

#[derive(Clone, Debug, Default)]
struct GroupEntry {
    meta: GroupMeta,
    principals: Vec<PrincipalId>,
}

#[derive(Debug, Default)]
struct MemoryGroupStoreInner {
    groups: HashMap<String, GroupEntry>,

    /// Group names in creation order.
    order: Vec<String>,
}

/// In-memory group directory.
///
/// Cloned handles share the same state.
#[derive(Clone, Debug, Default)]
pub struct MemoryGroupStore {
    inner: Rc<RefCell<MemoryGroupStoreInner>>,
}

impl MemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of groups currently stored.
    pub fn len(&self) -> usize {
        self.inner.borrow().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GroupStore for MemoryGroupStore {
    fn create_group(
        &self,
        name: &str,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.borrow_mut();
        if inner.groups.contains_key(name) {
            return Err(StoreError::GroupExists(name.to_owned()));
        }
        let entry = GroupEntry {
            meta: GroupMeta {
                title: title.map(str::to_owned),
                description: description.map(str::to_owned),
            },
            principals: Vec::new(),
        };
        inner.groups.insert(name.to_owned(), entry);
        inner.order.push(name.to_owned());
        trace!(name, "created group");
        Ok(())
    }

    fn remove_group(&self, name: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.borrow_mut();
        if inner.groups.remove(name).is_none() {
            return Ok(false);
        }
        inner.order.retain(|existing| existing != name);
        trace!(name, "removed group");
        Ok(true)
    }

    fn rename_group(&self, old: &str, new: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.borrow_mut();
        if inner.groups.contains_key(new) {
            return Err(StoreError::GroupExists(new.to_owned()));
        }
        let entry = inner
            .groups
            .remove(old)
            .ok_or_else(|| StoreError::GroupNotFound(old.to_owned()))?;
        inner.groups.insert(new.to_owned(), entry);
        if let Some(position) = inner.order.iter().position(|existing| existing == old) {
            inner.order[position] = new.to_owned();
        }
        Ok(())
    }

    fn add_principal(&self, name: &str, principal: &PrincipalId) -> Result<bool, StoreError> {
        let mut inner = self.inner.borrow_mut();
        let entry = inner
            .groups
            .get_mut(name)
            .ok_or_else(|| StoreError::GroupNotFound(name.to_owned()))?;
        if entry.principals.contains(principal) {
            return Ok(false);
        }
        entry.principals.push(principal.clone());
        Ok(true)
    }

    fn remove_principal(&self, name: &str, principal: &PrincipalId) -> Result<bool, StoreError> {
        let mut inner = self.inner.borrow_mut();
        let entry = inner
            .groups
            .get_mut(name)
            .ok_or_else(|| StoreError::GroupNotFound(name.to_owned()))?;
        let before = entry.principals.len();
        entry.principals.retain(|existing| existing != principal);
        Ok(entry.principals.len() != before)
    }

    fn list_principals(&self, name: &str) -> Result<Vec<PrincipalId>, StoreError> {
        let inner = self.inner.borrow();
        inner
            .groups
            .get(name)
            .map(|entry| entry.principals.clone())
            .ok_or_else(|| StoreError::GroupNotFound(name.to_owned()))
    }

    fn list_group_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.inner.borrow().order.clone())
    }

    fn group_meta(&self, name: &str) -> Result<Option<GroupMeta>, StoreError> {
        Ok(self
            .inner
            .borrow()
            .groups
            .get(name)
            .map(|entry| entry.meta.clone()))
    }

    fn set_group_meta(
        &self,
        name: &str,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.borrow_mut();
        let entry = inner
            .groups
            .get_mut(name)
            .ok_or_else(|| StoreError::GroupNotFound(name.to_owned()))?;
        if let Some(title) = title {
            entry.meta.title = Some(title.to_owned());
        }
        if let Some(description) = description {
            entry.meta.description = Some(description.to_owned());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use crate::traits::{GroupStore, StoreError};
    use crate::types::PrincipalId;

    use super::MemoryGroupStore;

    #[test]
    fn membership_keeps_insertion_order() {
        let store = MemoryGroupStore::new();
        store.create_group("ns-viewers", Some("Viewers"), None).unwrap();

        let bob = PrincipalId::new("bob@example.com");
        let alice = PrincipalId::new("alice@example.com");
        assert!(store.add_principal("ns-viewers", &bob).unwrap());
        assert!(store.add_principal("ns-viewers", &alice).unwrap());
        assert!(!store.add_principal("ns-viewers", &bob).unwrap());

        assert_eq!(
            store.list_principals("ns-viewers").unwrap(),
            vec![bob.clone(), alice.clone()]
        );

        assert!(store.remove_principal("ns-viewers", &bob).unwrap());
        assert!(!store.remove_principal("ns-viewers", &bob).unwrap());
        assert_eq!(store.list_principals("ns-viewers").unwrap(), vec![alice]);
    }

    #[test]
    fn unknown_groups() {
        let store = MemoryGroupStore::new();
        let bob = PrincipalId::new("bob@example.com");
        assert_matches!(
            store.add_principal("missing", &bob),
            Err(StoreError::GroupNotFound(name)) if name == "missing"
        );
        assert!(!store.remove_group("missing").unwrap());
        assert!(!store.has_group("missing").unwrap());
    }

    #[test]
    fn duplicate_group() {
        let store = MemoryGroupStore::new();
        store.create_group("a", None, None).unwrap();
        assert_matches!(
            store.create_group("a", None, None),
            Err(StoreError::GroupExists(_))
        );
    }

    #[test]
    fn rename_keeps_members_and_meta() {
        let store = MemoryGroupStore::new();
        store
            .create_group("old", Some("Title"), Some("Description"))
            .unwrap();
        store.create_group("other", None, None).unwrap();
        let bob = PrincipalId::new("bob@example.com");
        store.add_principal("old", &bob).unwrap();

        store.rename_group("old", "new").unwrap();

        assert_eq!(store.list_group_ids().unwrap(), vec!["new", "other"]);
        assert_eq!(store.list_principals("new").unwrap(), vec![bob]);
        let meta = store.group_meta("new").unwrap().unwrap();
        assert_eq!(meta.title.as_deref(), Some("Title"));
        assert_eq!(meta.description.as_deref(), Some("Description"));
        assert!(store.group_meta("old").unwrap().is_none());
    }

    #[test]
    fn update_meta() {
        let store = MemoryGroupStore::new();
        store.create_group("a", Some("A"), Some("first")).unwrap();
        store.set_group_meta("a", Some("B"), None).unwrap();
        let meta = store.group_meta("a").unwrap().unwrap();
        assert_eq!(meta.title.as_deref(), Some("B"));
        assert_eq!(meta.description.as_deref(), Some("first"));
    }
}
