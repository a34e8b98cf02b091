// SPDX-License-Identifier: MIT OR Apache-2.0

use std::cell::RefCell;
use std::rc::Rc;

use teamwork_store::{GroupStore, PrincipalId, SiteMembers, StoreError, WorkspaceTree};
use tracing::{debug, trace};

use crate::cache::Subscription;
use crate::site::Site;

type MemberCache = Rc<RefCell<Option<Vec<PrincipalId>>>>;

/// Adapter onto one named group in the group store.
///
/// The member list is read lazily and cached. The cache is registered on the site's invalidation
/// bus, every write through any adapter of the same group name clears it.
#[derive(Debug)]
pub struct GroupInfo<G, M, T> {
    site: Site<G, M, T>,
    name: String,
    cache: MemberCache,
    _subscription: Subscription,
}

impl<G, M, T> GroupInfo<G, M, T>
where
    G: GroupStore,
    M: SiteMembers,
    T: WorkspaceTree,
{
    pub fn new(site: Site<G, M, T>, name: impl Into<String>) -> Self {
        let name = name.into();
        let cache: MemberCache = Rc::new(RefCell::new(None));
        let subscription = site.bus().subscribe(&name, &cache);
        Self {
            site,
            name,
            cache,
            _subscription: subscription,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exists(&self) -> Result<bool, StoreError> {
        self.site.groups().has_group(&self.name)
    }

    /// Create the group unless it is already present. Returns `true` if it was created.
    pub fn ensure(&self, title: &str, description: &str) -> Result<bool, StoreError> {
        if self.exists()? {
            return Ok(false);
        }
        self.site
            .groups()
            .create_group(&self.name, Some(title), Some(description))?;
        debug!(name = %self.name, "created workspace group");
        self.site.bus().invalidate(&self.name);
        Ok(true)
    }

    pub fn set_title(&self, title: &str) -> Result<(), StoreError> {
        self.site.groups().set_group_meta(&self.name, Some(title), None)
    }

    /// Members in store order without duplicates.
    pub fn keys(&self) -> Result<Vec<PrincipalId>, StoreError> {
        if let Some(cached) = self.cache.borrow().as_ref() {
            return Ok(cached.clone());
        }

        let mut keys: Vec<PrincipalId> = Vec::new();
        for principal in self.site.groups().list_principals(&self.name)? {
            if !keys.contains(&principal) {
                keys.push(principal);
            }
        }
        trace!(name = %self.name, members = keys.len(), "loaded group members");
        *self.cache.borrow_mut() = Some(keys.clone());
        Ok(keys)
    }

    pub fn contains(&self, principal: &PrincipalId) -> Result<bool, StoreError> {
        Ok(self.keys()?.contains(principal))
    }

    /// Add a principal to the group. Returns `false` if it was already a member.
    pub fn assign(&self, principal: &PrincipalId) -> Result<bool, StoreError> {
        let added = self.site.groups().add_principal(&self.name, principal)?;
        self.site.bus().invalidate(&self.name);
        Ok(added)
    }

    /// Remove a principal from the group. Returns `false` if it was not a member.
    pub fn unassign(&self, principal: &PrincipalId) -> Result<bool, StoreError> {
        let removed = self
            .site
            .groups()
            .remove_principal(&self.name, principal)?;
        self.site.bus().invalidate(&self.name);
        Ok(removed)
    }

    /// Drop the cached member list.
    pub fn refresh(&self) {
        self.cache.borrow_mut().take();
    }
}
