// SPDX-License-Identifier: MIT OR Apache-2.0

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use crate::traits::{LocalRoles, StoreError};
use crate::types::NodeId;

/// In-memory local role bindings of group names per content context.
#[derive(Clone, Debug, Default)]
pub struct MemoryLocalRoles {
    bindings: Rc<RefCell<HashMap<(NodeId, String), BTreeSet<String>>>>,
}

impl MemoryLocalRoles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group names with a binding in the given context.
    pub fn bound_groups(&self, context: &NodeId) -> BTreeSet<String> {
        self.bindings
            .borrow()
            .keys()
            .filter(|(bound, _)| bound == context)
            .map(|(_, group_name)| group_name.clone())
            .collect()
    }
}

impl LocalRoles for MemoryLocalRoles {
    fn bind_roles(
        &self,
        context: &NodeId,
        group_name: &str,
        roles: &BTreeSet<String>,
    ) -> Result<(), StoreError> {
        let key = (context.clone(), group_name.to_owned());
        let mut bindings = self.bindings.borrow_mut();
        if roles.is_empty() {
            bindings.remove(&key);
        } else {
            bindings.insert(key, roles.clone());
        }
        Ok(())
    }

    fn roles_for(&self, context: &NodeId, group_name: &str) -> Result<BTreeSet<String>, StoreError> {
        Ok(self
            .bindings
            .borrow()
            .get(&(context.clone(), group_name.to_owned()))
            .cloned()
            .unwrap_or_default())
    }
}
