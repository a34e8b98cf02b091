// SPDX-License-Identifier: MIT OR Apache-2.0

use std::cell::Cell;
use std::rc::Rc;

use teamwork_store::{
    GroupMeta, GroupStore, MemoryGroupStore, MemoryLocalRoles, MemoryMembers, MemoryTree, Node,
    NodeId, NodeKind, PrincipalId, SiteMembers, StoreError, UserAttributes,
};

use crate::config::GroupTypeRegistry;
use crate::handlers;
use crate::hierarchy::{self, Workspace};
use crate::roster::WorkspaceRoster;
use crate::site::Site;
use crate::workgroup::Workgroup;

pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}

/// Group store failing every write while switched on.
#[derive(Clone, Debug, Default)]
pub struct FailingGroupStore {
    inner: MemoryGroupStore,
    fail: Rc<Cell<bool>>,
}

impl FailingGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail.set(fail);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail.get() {
            return Err(StoreError::Backend("write rejected".into()));
        }
        Ok(())
    }
}

impl GroupStore for FailingGroupStore {
    fn create_group(
        &self,
        name: &str,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.inner.create_group(name, title, description)
    }

    fn remove_group(&self, name: &str) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.remove_group(name)
    }

    fn rename_group(&self, old: &str, new: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.rename_group(old, new)
    }

    fn add_principal(&self, name: &str, principal: &PrincipalId) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.add_principal(name, principal)
    }

    fn remove_principal(&self, name: &str, principal: &PrincipalId) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.remove_principal(name, principal)
    }

    fn list_principals(&self, name: &str) -> Result<Vec<PrincipalId>, StoreError> {
        self.inner.list_principals(name)
    }

    fn list_group_ids(&self) -> Result<Vec<String>, StoreError> {
        self.inner.list_group_ids()
    }

    fn group_meta(&self, name: &str) -> Result<Option<GroupMeta>, StoreError> {
        self.inner.group_meta(name)
    }

    fn set_group_meta(
        &self,
        name: &str,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.inner.set_group_meta(name, title, description)
    }
}

/// In-memory site with two projects and four users.
///
/// ```text
/// site
/// ├── p  "Project P"
/// │   └── t  "Team T"
/// │       └── s  "Subteam S"
/// └── q  "Project Q"
/// ```
///
/// Users: `alice`, `bob`, `carol` and `dave@example.com`, none of them member of any workspace.
#[derive(Debug)]
pub struct Fixture<G = MemoryGroupStore> {
    pub site: Site<G, MemoryMembers, MemoryTree>,
    pub groups: G,
    pub members: MemoryMembers,
    pub tree: MemoryTree,
    pub roles: MemoryLocalRoles,
}

impl Fixture<MemoryGroupStore> {
    pub fn new() -> Self {
        Fixture::with_store(MemoryGroupStore::new())
    }
}

impl Fixture<FailingGroupStore> {
    pub fn failing() -> Self {
        Fixture::with_store(FailingGroupStore::new())
    }
}

impl<G> Fixture<G>
where
    G: GroupStore + Clone,
{
    pub fn with_store(groups: G) -> Self {
        setup_logging();

        let members = MemoryMembers::new();
        for (login, fullname) in [
            ("alice", "Alice Smith"),
            ("bob", "Bob Builder"),
            ("carol", "Carol Danvers"),
            ("dave@example.com", "Dave Example"),
        ] {
            let attributes = UserAttributes {
                fullname: Some(fullname.to_owned()),
                email: None,
            };
            members
                .register(&members.normalize(login), attributes, false)
                .unwrap();
        }

        let tree = MemoryTree::new();
        tree.insert(None, Node::new("p", "Project P", NodeKind::Project))
            .unwrap();
        tree.insert(Some(&"p".into()), Node::new("t", "Team T", NodeKind::Workspace))
            .unwrap();
        tree.insert(Some(&"t".into()), Node::new("s", "Subteam S", NodeKind::Workspace))
            .unwrap();
        tree.insert(None, Node::new("q", "Project Q", NodeKind::Project))
            .unwrap();

        let site = Site::new(
            groups.clone(),
            members.clone(),
            tree.clone(),
            GroupTypeRegistry::default(),
        );
        let roles = MemoryLocalRoles::new();
        for id in ["p", "t", "s", "q"] {
            handlers::on_created(&site, &roles, &NodeId::new(id)).unwrap();
        }

        Self {
            site,
            groups,
            members,
            tree,
            roles,
        }
    }

    pub fn workspace(&self, id: &str) -> Workspace {
        hierarchy::find_workspace(self.site.tree(), &NodeId::new(id))
            .unwrap()
            .unwrap()
    }

    pub fn workgroup(
        &self,
        workspace: &str,
        group_id: &str,
    ) -> Workgroup<G, MemoryMembers, MemoryTree> {
        Workgroup::new(self.site.clone(), self.workspace(workspace), group_id).unwrap()
    }

    pub fn roster(&self, workspace: &str) -> WorkspaceRoster<G, MemoryMembers, MemoryTree> {
        self.site.roster(&NodeId::new(workspace)).unwrap()
    }
}
