// SPDX-License-Identifier: MIT OR Apache-2.0

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use teamwork_store::{GroupStore, NodeId, PrincipalId, SiteMembers, User, WorkspaceTree};
use tracing::debug;

use crate::cache::Subscription;
use crate::error::RosterError;
use crate::group::GroupInfo;
use crate::hierarchy::{self, Workspace};
use crate::site::{Site, group_name};
use crate::workgroup::Workgroup;

type UserGroupsCache = Rc<RefCell<Option<HashMap<PrincipalId, BTreeSet<String>>>>>;

/// Membership of one workspace: its base group together with every role group applicable to it.
///
/// Constructing a roster creates missing groups in the store. A principal is a member of the
/// workspace when it belongs to the base group.
#[derive(Debug)]
pub struct WorkspaceRoster<G, M, T> {
    site: Site<G, M, T>,
    workspace: Workspace,
    base: Workgroup<G, M, T>,

    /// Secondary groups in registry order.
    secondary: Vec<Workgroup<G, M, T>>,

    /// Group type ids in registry order, including the base type.
    order: Vec<String>,
    user_groups: UserGroupsCache,
    _subscriptions: Vec<Subscription>,
}

impl<G, M, T> WorkspaceRoster<G, M, T>
where
    G: GroupStore,
    M: SiteMembers,
    T: WorkspaceTree,
{
    pub fn new(site: Site<G, M, T>, workspace: Workspace) -> Result<Self, RosterError> {
        let base_id = site.registry().base_id().to_owned();
        let base = Workgroup::new(site.clone(), workspace.clone(), &base_id)?;
        base.ensure()?;

        let mut secondary = Vec::new();
        let mut order = Vec::new();
        for config in site.group_types_for(&workspace) {
            order.push(config.group_id.clone());
            if config.group_id == base_id {
                continue;
            }
            let workgroup = Workgroup::new(site.clone(), workspace.clone(), &config.group_id)?;
            workgroup.ensure()?;
            secondary.push(workgroup);
        }

        let user_groups: UserGroupsCache = Rc::new(RefCell::new(None));
        let subscriptions: Vec<Subscription> = std::iter::once(&base)
            .chain(secondary.iter())
            .map(|workgroup| site.bus().subscribe(workgroup.name(), &user_groups))
            .collect();

        Ok(Self {
            site,
            workspace,
            base,
            secondary,
            order,
            user_groups,
            _subscriptions: subscriptions,
        })
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn namespace(&self) -> &NodeId {
        self.workspace.namespace()
    }

    /// The base group of this workspace.
    pub fn base(&self) -> &Workgroup<G, M, T> {
        &self.base
    }

    /// Group type ids of this workspace in registry order.
    pub fn group_ids(&self) -> &[String] {
        &self.order
    }

    pub fn group(&self, group_id: &str) -> Option<&Workgroup<G, M, T>> {
        if self.base.group_id() == group_id {
            return Some(&self.base);
        }
        self.secondary
            .iter()
            .find(|workgroup| workgroup.group_id() == group_id)
    }

    /// All groups of this workspace in registry order.
    pub fn groups(&self) -> impl Iterator<Item = &Workgroup<G, M, T>> {
        self.order.iter().filter_map(|group_id| self.group(group_id))
    }

    fn require_group(&self, group_id: &str) -> Result<&Workgroup<G, M, T>, RosterError> {
        self.group(group_id)
            .ok_or_else(|| RosterError::UnknownGroupType(group_id.to_owned()))
    }

    pub fn name(&self) -> &str {
        self.base.name()
    }

    /// Canonical form of a raw login.
    pub fn normalize(&self, raw: &str) -> PrincipalId {
        self.site.normalize(raw)
    }

    pub fn title(&self) -> Result<String, RosterError> {
        self.base.title()
    }

    pub fn contains(&self, principal: impl AsRef<str>) -> Result<bool, RosterError> {
        self.base.contains(principal)
    }

    pub fn get(&self, principal: impl AsRef<str>) -> Result<Option<User>, RosterError> {
        self.base.get(principal)
    }

    pub fn keys(&self) -> Result<Vec<PrincipalId>, RosterError> {
        self.base.keys()
    }

    pub fn len(&self) -> Result<usize, RosterError> {
        self.base.len()
    }

    pub fn is_empty(&self) -> Result<bool, RosterError> {
        self.base.is_empty()
    }

    /// Add a principal to the workspace (and every containing workspace).
    pub fn add(&self, principal: impl AsRef<str>) -> Result<bool, RosterError> {
        self.base.add(principal)
    }

    /// Add a principal to one group of this workspace, the base group if none is given.
    pub fn assign(
        &self,
        principal: impl AsRef<str>,
        group_id: Option<&str>,
    ) -> Result<bool, RosterError> {
        match group_id {
            Some(group_id) => self.require_group(group_id)?.add(principal),
            None => self.base.add(principal),
        }
    }

    /// Group type ids of every group of this workspace the principal belongs to.
    ///
    /// The reverse index is built on first use and kept until any group of this workspace is
    /// written to or [`refresh`](Self::refresh) is called.
    pub fn user_groups(
        &self,
        principal: impl AsRef<str>,
    ) -> Result<BTreeSet<String>, RosterError> {
        let principal = self.site.normalize(principal.as_ref());
        if let Some(index) = self.user_groups.borrow().as_ref() {
            return Ok(index.get(&principal).cloned().unwrap_or_default());
        }

        let mut index: HashMap<PrincipalId, BTreeSet<String>> = HashMap::new();
        for workgroup in self.groups() {
            for member in workgroup.keys()? {
                index
                    .entry(member)
                    .or_default()
                    .insert(workgroup.group_id().to_owned());
            }
        }
        let result = index.get(&principal).cloned().unwrap_or_default();
        *self.user_groups.borrow_mut() = Some(index);
        Ok(result)
    }

    /// Returns true if the principal may be removed from the site through this workspace.
    ///
    /// Only possible from a project the principal is a member of, and only when it is not a
    /// member of any other project.
    pub fn can_purge(&self, principal: impl AsRef<str>) -> Result<bool, RosterError> {
        let principal = self.site.normalize(principal.as_ref());
        if !self.workspace.is_project || !self.base.contains(principal.as_str())? {
            return Ok(false);
        }

        let projects = self.site.user_workspaces(principal.as_str(), true)?;
        Ok(projects
            .iter()
            .all(|project| project.id == self.workspace.id))
    }

    /// Remove a principal from this workspace.
    ///
    /// Without a group id, or with the base group id, the principal is removed from every group
    /// of this workspace and of every nested workspace. With a secondary group id only that one
    /// membership is removed.
    pub fn unassign(
        &self,
        principal: impl AsRef<str>,
        group_id: Option<&str>,
    ) -> Result<(), RosterError> {
        let principal = self.site.normalize(principal.as_ref());
        let workgroup = match group_id {
            Some(group_id) => self.require_group(group_id)?,
            None => &self.base,
        };
        if !workgroup.is_base() {
            return workgroup.unassign(principal.as_str());
        }

        if !self.base.contains(principal.as_str())? {
            return Err(RosterError::NotAMember {
                principal,
                group: self.base.name().to_owned(),
            });
        }

        for nested in hierarchy::downward_closure(self.site.tree(), &self.workspace)? {
            let nested_base = Workgroup::new(
                self.site.clone(),
                nested,
                self.site.registry().base_id(),
            )?;
            // Checked per workspace, the group may be missing or the principal already gone.
            if nested_base.exists()? && nested_base.contains(principal.as_str())? {
                nested_base.unassign(principal.as_str())?;
            }
        }

        self.base.unassign(principal.as_str())?;
        debug!(%principal, workspace = %self.workspace.id, "removed principal from workspace");
        Ok(())
    }

    /// Remove a principal from every workspace and delete it from the site.
    pub fn purge_user(&self, principal: impl AsRef<str>) -> Result<(), RosterError> {
        let principal = self.site.normalize(principal.as_ref());
        if !self.can_purge(principal.as_str())? {
            return Err(RosterError::PurgeNotAllowed(principal));
        }
        self.unassign(principal.as_str(), None)?;
        self.site.members().delete(&principal)?;
        debug!(%principal, project = %self.workspace.id, "purged principal from site");
        Ok(())
    }

    /// Drop every cached read of this roster.
    pub fn refresh(&self) {
        self.base.refresh();
        for workgroup in &self.secondary {
            workgroup.refresh();
        }
        self.user_groups.borrow_mut().take();
    }

    /// Verify the membership invariants of this workspace.
    ///
    /// Every member of a secondary group must be a member of the base group, and every member
    /// of the base group must be a member of all ancestor workspaces.
    pub fn check_integrity(&self) -> Result<(), RosterError> {
        let members = self.base.keys()?;
        for workgroup in &self.secondary {
            if let Some(orphan) = workgroup
                .keys()?
                .into_iter()
                .find(|principal| !members.contains(principal))
            {
                return Err(RosterError::GroupIntegrity(format!(
                    "{orphan} is a member of {} but not of {}",
                    workgroup.name(),
                    self.base.name()
                )));
            }
        }

        let base_id = self.site.registry().base_id();
        for ancestor in hierarchy::ancestor_workspaces(self.site.tree(), &self.workspace.id)? {
            let parent = GroupInfo::new(self.site.clone(), group_name(&ancestor.id, base_id));
            let parent_members = if parent.exists()? {
                parent.keys()?
            } else {
                Vec::new()
            };
            if let Some(orphan) = members
                .iter()
                .find(|principal| !parent_members.contains(principal))
            {
                return Err(RosterError::GroupIntegrity(format!(
                    "{orphan} is a member of {} but not of {}",
                    self.base.name(),
                    parent.name()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use assert_matches::assert_matches;
    use teamwork_store::{GroupStore, PrincipalId, SiteMembers};

    use crate::config::{GroupTypeConfig, Scope};
    use crate::error::RosterError;
    use crate::test_utils::Fixture;

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn groups_follow_registry_order() {
        let fixture = Fixture::new();
        let roster = fixture.roster("t");
        assert_eq!(roster.name(), "t-viewers");
        assert_eq!(roster.group_ids(), ["viewers", "contributors", "managers"]);
        let names: Vec<&str> = roster.groups().map(|group| group.name()).collect();
        assert_eq!(names, ["t-viewers", "t-contributors", "t-managers"]);
        assert!(roster.base().is_base());
        assert!(roster.group("owners").is_none());
    }

    #[test]
    fn project_only_types() {
        let mut fixture = Fixture::new();
        fixture
            .site
            .registry_mut()
            .add_type(GroupTypeConfig::new("leads", "Project leads").with_scope(Scope::Project))
            .unwrap();

        let project = fixture.roster("p");
        assert_eq!(
            project.group_ids(),
            ["viewers", "contributors", "managers", "leads"]
        );
        assert!(fixture.groups.has_group("p-leads").unwrap());

        let team = fixture.roster("t");
        assert_eq!(team.group_ids(), ["viewers", "contributors", "managers"]);
        assert!(!fixture.groups.has_group("t-leads").unwrap());
    }

    #[test]
    fn user_groups_index() {
        let fixture = Fixture::new();
        let roster = fixture.roster("p");
        roster.add("alice").unwrap();
        assert_eq!(roster.user_groups("alice").unwrap(), set(&["viewers"]));

        // Written through another handle, the index must follow.
        fixture.workgroup("p", "managers").add("alice").unwrap();
        assert_eq!(
            roster.user_groups("ALICE").unwrap(),
            set(&["managers", "viewers"])
        );
        assert!(roster.user_groups("bob").unwrap().is_empty());
    }

    #[test]
    fn user_groups_after_direct_store_write() {
        let fixture = Fixture::new();
        let roster = fixture.roster("p");
        assert!(roster.user_groups("bob").unwrap().is_empty());
        fixture
            .groups
            .add_principal("p-viewers", &PrincipalId::new("bob"))
            .unwrap();
        assert!(roster.user_groups("bob").unwrap().is_empty());
        roster.refresh();
        assert_eq!(roster.user_groups("bob").unwrap(), set(&["viewers"]));
    }

    #[test]
    fn assign_by_group_id() {
        let fixture = Fixture::new();
        let roster = fixture.roster("t");
        assert!(roster.assign("bob", None).unwrap());
        assert!(roster.assign("bob", Some("contributors")).unwrap());
        assert!(!roster.assign("bob", Some("contributors")).unwrap());
        assert_matches!(
            roster.assign("bob", Some("owners")),
            Err(RosterError::UnknownGroupType(_))
        );
    }

    #[test]
    fn full_unassign_recurses_downwards() {
        let fixture = Fixture::new();
        fixture.roster("s").add("carol").unwrap();
        fixture.workgroup("s", "managers").add("carol").unwrap();
        fixture.workgroup("t", "contributors").add("carol").unwrap();

        let team = fixture.roster("t");
        team.unassign("carol", None).unwrap();
        assert!(!team.contains("carol").unwrap());
        assert!(!fixture.roster("s").contains("carol").unwrap());
        assert!(!fixture.workgroup("s", "managers").contains("carol").unwrap());
        assert!(!fixture.workgroup("t", "contributors").contains("carol").unwrap());
        assert!(fixture.roster("p").contains("carol").unwrap());
        team.check_integrity().unwrap();
    }

    #[test]
    fn secondary_unassign_does_not_recurse() {
        let fixture = Fixture::new();
        let project = fixture.roster("p");
        project.add("alice").unwrap();
        project.assign("alice", Some("managers")).unwrap();
        fixture.roster("t").add("alice").unwrap();

        project.unassign("alice", Some("managers")).unwrap();
        assert!(project.contains("alice").unwrap());
        assert!(fixture.roster("t").contains("alice").unwrap());
        assert!(project.user_groups("alice").unwrap() == set(&["viewers"]));

        assert_matches!(
            project.unassign("alice", Some("managers")),
            Err(RosterError::NotAMember { .. })
        );
        project.unassign("alice", Some("viewers")).unwrap();
        assert!(!fixture.roster("t").contains("alice").unwrap());
        assert_matches!(
            project.unassign("alice", None),
            Err(RosterError::NotAMember { .. })
        );
    }

    #[test]
    fn purge_eligibility() {
        let fixture = Fixture::new();
        let project = fixture.roster("p");
        let team = fixture.roster("t");
        team.add("bob").unwrap();

        assert!(project.can_purge("bob").unwrap());
        assert!(!team.can_purge("bob").unwrap());
        assert!(!project.can_purge("alice").unwrap());

        let other = fixture.roster("q");
        other.add("bob").unwrap();
        assert!(!project.can_purge("bob").unwrap());
        assert!(!other.can_purge("bob").unwrap());
    }

    #[test]
    fn purge_user() {
        let fixture = Fixture::new();
        let project = fixture.roster("p");
        fixture.roster("s").add("bob").unwrap();
        fixture.roster("q").add("carol").unwrap();
        project.add("carol").unwrap();

        assert_matches!(
            project.purge_user("carol"),
            Err(RosterError::PurgeNotAllowed(principal)) if principal.as_str() == "carol"
        );

        project.purge_user("Bob").unwrap();
        assert!(!project.contains("bob").unwrap());
        assert!(!fixture.roster("s").contains("bob").unwrap());
        let bob = fixture.members.normalize("bob");
        assert!(!fixture.members.contains(&bob).unwrap());
    }

    #[test]
    fn integrity_violations() {
        let fixture = Fixture::new();
        let team = fixture.roster("t");
        team.check_integrity().unwrap();

        fixture
            .groups
            .add_principal("t-managers", &PrincipalId::new("alice"))
            .unwrap();
        team.refresh();
        assert_matches!(team.check_integrity(), Err(RosterError::GroupIntegrity(_)));

        fixture
            .groups
            .remove_principal("t-managers", &PrincipalId::new("alice"))
            .unwrap();
        fixture
            .groups
            .add_principal("t-viewers", &PrincipalId::new("alice"))
            .unwrap();
        team.refresh();
        assert_matches!(team.check_integrity(), Err(RosterError::GroupIntegrity(message))
            if message.contains("p-viewers"));
    }
}
