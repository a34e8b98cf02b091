// SPDX-License-Identifier: MIT OR Apache-2.0

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::debug;

use crate::traits::{SiteMembers, StoreError};
use crate::types::{PrincipalId, User, UserAttributes};

#[derive(Debug, Default)]
struct MemoryMembersInner {
    users: BTreeMap<PrincipalId, User>,

    /// Recipients of registration notifications, in the order they were sent.
    notified: Vec<String>,
}

/// In-memory site user directory, logins are case-insensitive.
#[derive(Clone, Debug, Default)]
pub struct MemoryMembers {
    inner: Rc<RefCell<MemoryMembersInner>>,
}

impl MemoryMembers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Addresses registration notifications were sent to.
    pub fn notified(&self) -> Vec<String> {
        self.inner.borrow().notified.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn is_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

impl SiteMembers for MemoryMembers {
    fn normalize(&self, raw: &str) -> PrincipalId {
        PrincipalId::new(raw.trim().to_lowercase())
    }

    fn contains(&self, principal: &PrincipalId) -> Result<bool, StoreError> {
        Ok(self.inner.borrow().users.contains_key(principal))
    }

    fn get(&self, principal: &PrincipalId) -> Result<Option<User>, StoreError> {
        Ok(self.inner.borrow().users.get(principal).cloned())
    }

    fn register(
        &self,
        principal: &PrincipalId,
        attributes: UserAttributes,
        send_notification: bool,
    ) -> Result<User, StoreError> {
        if principal.as_str().is_empty() {
            return Err(StoreError::InvalidIdentifier(principal.to_string()));
        }

        let email = if is_email(principal.as_str()) {
            Some(principal.to_string())
        } else {
            attributes.email
        };

        let mut inner = self.inner.borrow_mut();
        if inner.users.contains_key(principal) {
            return Err(StoreError::DuplicatePrincipal(principal.clone()));
        }

        if send_notification {
            match &email {
                Some(email) if is_email(email) => inner.notified.push(email.clone()),
                _ => return Err(StoreError::InvalidIdentifier(principal.to_string())),
            }
        }

        let user = User {
            id: principal.clone(),
            fullname: attributes.fullname,
            email,
            groups: Default::default(),
        };
        inner.users.insert(principal.clone(), user.clone());
        debug!(%principal, send_notification, "registered user");
        Ok(user)
    }

    fn delete(&self, principal: &PrincipalId) -> Result<(), StoreError> {
        match self.inner.borrow_mut().users.remove(principal) {
            Some(_) => {
                debug!(%principal, "deleted user");
                Ok(())
            }
            None => Err(StoreError::PrincipalNotFound(principal.clone())),
        }
    }

    fn search(&self, query: &str) -> Result<Vec<User>, StoreError> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let inner = self.inner.borrow();
        Ok(inner
            .users
            .values()
            .filter(|user| {
                user.id.as_str().contains(&query)
                    || user
                        .fullname
                        .as_ref()
                        .is_some_and(|name| name.to_lowercase().contains(&query))
            })
            .cloned()
            .collect())
    }
}
