// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::BTreeSet;

use teamwork_store::{GroupStore, NodeId, PrincipalId, SiteMembers, StoreError, User, WorkspaceTree};
use tracing::{debug, trace};

use crate::config::GroupTypeConfig;
use crate::error::RosterError;
use crate::group::GroupInfo;
use crate::hierarchy::{self, Workspace};
use crate::site::{Site, group_name};

#[derive(Debug)]
enum Kind<G, M, T> {
    /// Membership in the workspace itself.
    Base,

    /// Role group requiring membership in the base group of the same workspace.
    Secondary { base: GroupInfo<G, M, T> },
}

/// One role group of one workspace.
///
/// Identity is the group name `<namespace>-<group id>`, composed from the durable workspace id.
/// Every principal argument is normalized through the site member directory first.
#[derive(Debug)]
pub struct Workgroup<G, M, T> {
    site: Site<G, M, T>,
    workspace: Workspace,
    config: GroupTypeConfig,
    info: GroupInfo<G, M, T>,
    kind: Kind<G, M, T>,
}

impl<G, M, T> Workgroup<G, M, T>
where
    G: GroupStore,
    M: SiteMembers,
    T: WorkspaceTree,
{
    /// Workgroup of the given type in `workspace`. The underlying group is not created, see
    /// [`ensure`](Self::ensure).
    pub fn new(
        site: Site<G, M, T>,
        workspace: Workspace,
        group_id: &str,
    ) -> Result<Self, RosterError> {
        let config = site
            .registry()
            .get(group_id)
            .cloned()
            .ok_or_else(|| RosterError::UnknownGroupType(group_id.to_owned()))?;
        let kind = if site.registry().is_base(group_id) {
            Kind::Base
        } else {
            let base = group_name(&workspace.id, site.registry().base_id());
            Kind::Secondary {
                base: GroupInfo::new(site.clone(), base),
            }
        };
        let info = GroupInfo::new(site.clone(), group_name(&workspace.id, group_id));
        Ok(Self {
            site,
            workspace,
            config,
            info,
            kind,
        })
    }

    /// Create the underlying group with its current title unless it exists already.
    pub fn ensure(&self) -> Result<bool, RosterError> {
        let title = self.title()?;
        Ok(self.info.ensure(&title, &self.config.description)?)
    }

    /// Returns true if the underlying group is present in the store.
    pub fn exists(&self) -> Result<bool, RosterError> {
        Ok(self.info.exists()?)
    }

    /// Full group name.
    pub fn name(&self) -> &str {
        self.info.name()
    }

    pub fn namespace(&self) -> &NodeId {
        self.workspace.namespace()
    }

    /// Identifier of the group type.
    pub fn group_id(&self) -> &str {
        &self.config.group_id
    }

    pub fn is_base(&self) -> bool {
        matches!(self.kind, Kind::Base)
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn config(&self) -> &GroupTypeConfig {
        &self.config
    }

    pub fn description(&self) -> &str {
        &self.config.description
    }

    pub fn roles(&self) -> &BTreeSet<String> {
        &self.config.roles
    }

    /// Display title derived from the current titles of the workspace and its ancestors, for
    /// example "Project / Team - Workspace Viewers".
    pub fn title(&self) -> Result<String, RosterError> {
        let chain = hierarchy::title_chain(self.site.tree(), &self.workspace.id)?;
        Ok(format!("{} - {}", chain.join(" / "), self.config.title))
    }

    /// Store the current title as group meta.
    pub fn refresh_title(&self) -> Result<(), RosterError> {
        let title = self.title()?;
        Ok(self.info.set_title(&title)?)
    }

    pub fn contains(&self, principal: impl AsRef<str>) -> Result<bool, RosterError> {
        let principal = self.site.normalize(principal.as_ref());
        Ok(self.info.contains(&principal)?)
    }

    /// Members in store order.
    pub fn keys(&self) -> Result<Vec<PrincipalId>, RosterError> {
        Ok(self.info.keys()?)
    }

    pub fn len(&self) -> Result<usize, RosterError> {
        Ok(self.info.keys()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, RosterError> {
        Ok(self.len()? == 0)
    }

    /// Site user for a member of this group, with `groups` listing the names of all groups of
    /// this workspace the user belongs to.
    pub fn get(&self, principal: impl AsRef<str>) -> Result<Option<User>, RosterError> {
        let principal = self.site.normalize(principal.as_ref());
        if !self.info.contains(&principal)? {
            return Ok(None);
        }
        let Some(mut user) = self.site.members().get(&principal)? else {
            return Ok(None);
        };
        user.groups = self.workspace_groups_of(&principal)?;
        Ok(Some(user))
    }

    fn workspace_groups_of(&self, principal: &PrincipalId) -> Result<BTreeSet<String>, StoreError> {
        let mut groups = BTreeSet::new();
        for config in self.site.group_types_for(&self.workspace) {
            let info = GroupInfo::new(
                self.site.clone(),
                group_name(&self.workspace.id, &config.group_id),
            );
            if info.exists()? && info.contains(principal)? {
                groups.insert(info.name().to_owned());
            }
        }
        Ok(groups)
    }

    /// Add a principal. Returns `false` if it was already a member.
    ///
    /// Adding to a secondary group requires membership in the base group. Adding to the base
    /// group also adds the principal to the base group of every ancestor workspace.
    pub fn add(&self, principal: impl AsRef<str>) -> Result<bool, RosterError> {
        let principal = self.site.normalize(principal.as_ref());
        if !self.site.members().contains(&principal)? {
            return Err(RosterError::UnknownPrincipal(principal));
        }

        match &self.kind {
            Kind::Secondary { base } => {
                if !base.contains(&principal)? {
                    return Err(RosterError::PrecedenceViolation {
                        principal,
                        group: self.name().to_owned(),
                        base: base.name().to_owned(),
                    });
                }
                self.assign(&principal)
            }
            Kind::Base => {
                let added = self.assign(&principal)?;
                self.propagate_upwards(&principal)?;
                Ok(added)
            }
        }
    }

    /// Add a principal to the base group of every ancestor workspace, creating missing groups.
    pub(crate) fn propagate_upwards(&self, principal: &PrincipalId) -> Result<(), RosterError> {
        let base_id = self.site.registry().base_id().to_owned();
        for ancestor in hierarchy::upward_closure(self.site.tree(), &self.workspace)? {
            let parent = Workgroup::new(self.site.clone(), ancestor, &base_id)?;
            parent.ensure()?;
            parent.assign(principal)?;
        }
        Ok(())
    }

    fn assign(&self, principal: &PrincipalId) -> Result<bool, RosterError> {
        let added = self.info.assign(principal)?;
        if added {
            debug!(%principal, group = %self.name(), "assigned principal");
        } else {
            trace!(%principal, group = %self.name(), "principal already assigned");
        }
        Ok(added)
    }

    /// Remove a principal from this group.
    ///
    /// Removing from the base group also removes the principal from every secondary group of the
    /// same workspace. Nested workspaces are not touched here, see
    /// [`WorkspaceRoster::unassign`](crate::WorkspaceRoster::unassign).
    pub fn unassign(&self, principal: impl AsRef<str>) -> Result<(), RosterError> {
        let principal = self.site.normalize(principal.as_ref());
        if !self.info.contains(&principal)? {
            return Err(RosterError::NotAMember {
                principal,
                group: self.name().to_owned(),
            });
        }

        if self.is_base() {
            let base_id = self.site.registry().base_id().to_owned();
            for config in self.site.group_types_for(&self.workspace) {
                if config.group_id == base_id {
                    continue;
                }
                let secondary = GroupInfo::new(
                    self.site.clone(),
                    group_name(&self.workspace.id, &config.group_id),
                );
                if secondary.exists()? && secondary.unassign(&principal)? {
                    debug!(%principal, group = %secondary.name(), "unassigned principal");
                }
            }
        }

        self.info.unassign(&principal)?;
        debug!(%principal, group = %self.name(), "unassigned principal");
        Ok(())
    }

    /// Drop cached membership reads of this workgroup.
    pub fn refresh(&self) {
        self.info.refresh();
        if let Kind::Secondary { base } = &self.kind {
            base.refresh();
        }
    }
}
