// SPDX-License-Identifier: MIT OR Apache-2.0

//! Membership management of one workspace on behalf of an acting user.
//!
//! Every command reports a [`Receipt`] per principal (and group) instead of failing on expected
//! conditions like unknown principals or existing memberships. Only storage failures and broken
//! invariants are returned as errors.
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use teamwork_store::{
    GroupStore, NodeId, PrincipalId, SiteMembers, StoreError, User, UserAttributes, WorkspaceTree,
};
use tracing::{debug, warn};

use crate::config::{MembershipConfig, SelfRemovalPolicy};
use crate::error::RosterError;
use crate::group::GroupInfo;
use crate::hierarchy::{self, Workspace};
use crate::modifications::{Action, MembershipModifications, Outcome, Receipt, receipt_for};
use crate::roster::WorkspaceRoster;
use crate::site::{Site, group_name};

/// Collapse runs of whitespace in a full name and trim both ends.
pub fn normalize_fullname(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A group column of the membership grid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridColumn {
    pub group_id: String,
    pub title: String,
    pub description: String,
}

/// A member row of the membership grid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridRow {
    pub principal: PrincipalId,
    pub fullname: Option<String>,
    pub email: Option<String>,

    /// Checked state per group type id.
    pub checked: BTreeMap<String, bool>,

    /// The acting user may purge this principal from the site.
    pub can_purge: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipGrid {
    pub columns: Vec<GridColumn>,
    pub rows: Vec<GridRow>,
}

/// A member as shown in the user info of a workspace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub user: User,

    /// Titles of the groups of this workspace the user belongs to, in registry order.
    pub assignments: Vec<String>,

    /// This workspace and nested workspaces the user belongs to.
    pub workspaces: Vec<Workspace>,
}

/// Submitted state of the membership grid.
///
/// Only managed principals are considered. For each of them, groups they are checked in are
/// assigned and all other groups of the workspace are unassigned.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridUpdate {
    pub managed: BTreeSet<String>,

    /// Checked principals per group type id.
    pub checked: BTreeMap<String, BTreeSet<String>>,
}

impl GridUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manage a principal without checking any group.
    pub fn manage(mut self, principal: &str) -> Self {
        self.managed.insert(principal.to_owned());
        self
    }

    /// Manage a principal and check it in the given groups.
    pub fn check<'a, I>(mut self, principal: &str, group_ids: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.managed.insert(principal.to_owned());
        for group_id in group_ids {
            self.checked
                .entry(group_id.to_owned())
                .or_default()
                .insert(principal.to_owned());
        }
        self
    }
}

/// Membership commands and queries for one workspace.
#[derive(Debug)]
pub struct MembershipManager<G, M, T> {
    site: Site<G, M, T>,
    roster: WorkspaceRoster<G, M, T>,
    actor: Option<PrincipalId>,
    config: MembershipConfig,
}

impl<G, M, T> MembershipManager<G, M, T>
where
    G: GroupStore,
    M: SiteMembers,
    T: WorkspaceTree,
{
    /// Start handling a request in the workspace containing `node`.
    pub fn new(
        site: Site<G, M, T>,
        node: &NodeId,
        actor: Option<&str>,
        config: MembershipConfig,
    ) -> Result<Self, RosterError> {
        site.begin();
        let roster = site.roster(node)?;
        let actor = actor.map(|actor| site.normalize(actor));
        Ok(Self {
            site,
            roster,
            actor,
            config,
        })
    }

    pub fn roster(&self) -> &WorkspaceRoster<G, M, T> {
        &self.roster
    }

    pub fn config(&self) -> &MembershipConfig {
        &self.config
    }

    fn is_actor(&self, principal: &PrincipalId) -> bool {
        self.actor.as_ref() == Some(principal)
    }

    /// Group columns and member rows of this workspace.
    pub fn grid(&self) -> Result<MembershipGrid, RosterError> {
        let columns = self
            .roster
            .groups()
            .map(|workgroup| GridColumn {
                group_id: workgroup.group_id().to_owned(),
                title: workgroup.config().title.clone(),
                description: workgroup.description().to_owned(),
            })
            .collect();

        let mut rows = Vec::new();
        for principal in self.roster.keys()? {
            let groups = self.roster.user_groups(principal.as_str())?;
            let checked = self
                .roster
                .group_ids()
                .iter()
                .map(|group_id| (group_id.clone(), groups.contains(group_id)))
                .collect();
            let user = self.site.members().get(&principal)?;
            rows.push(GridRow {
                can_purge: self.can_purge(&principal)?,
                fullname: user.as_ref().and_then(|user| user.fullname.clone()),
                email: user.and_then(|user| user.email),
                principal,
                checked,
            });
        }
        Ok(MembershipGrid { columns, rows })
    }

    /// The acting user may purge this principal from the site. Nobody may purge themselves.
    pub fn can_purge(&self, principal: &PrincipalId) -> Result<bool, RosterError> {
        if self.is_actor(principal) {
            return Ok(false);
        }
        self.roster.can_purge(principal.as_str())
    }

    /// Details of a member of this workspace, `None` for unknown users and non-members.
    pub fn user_info(&self, principal: &str) -> Result<Option<UserInfo>, RosterError> {
        let principal = self.site.normalize(principal);
        if !self.roster.contains(principal.as_str())? {
            return Ok(None);
        }
        let Some(user) = self.site.members().get(&principal)? else {
            return Ok(None);
        };

        let mut assignments = Vec::new();
        for workgroup in self.roster.groups() {
            if workgroup.contains(principal.as_str())? {
                assignments.push(workgroup.title()?);
            }
        }

        let workspace = self.roster.workspace();
        let mut candidates = vec![workspace.clone()];
        candidates.extend(hierarchy::descendant_workspaces(self.site.tree(), &workspace.id)?);
        let workspaces = self.site.filter_member_workspaces(&principal, candidates)?;

        Ok(Some(UserInfo {
            user,
            assignments,
            workspaces,
        }))
    }

    /// Site users matching the query which are not yet members of this workspace.
    pub fn search(&self, query: &str) -> Result<Vec<User>, RosterError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let mut result = Vec::new();
        for user in self.site.members().search(query)? {
            if !self.roster.contains(user.id.as_str())? {
                result.push(user);
            }
        }
        Ok(result)
    }

    /// Add existing site users to this workspace.
    pub fn add_existing(&self, principals: &[&str]) -> Result<Vec<Receipt>, RosterError> {
        let mut receipts = Vec::new();
        let mut modifications = MembershipModifications::new(&self.roster);
        for raw in principals {
            let principal = self.site.normalize(raw);
            let outcome = if !self.site.members().contains(&principal)? {
                warn!(%principal, "user not found");
                Outcome::UnknownPrincipal
            } else if self.roster.contains(principal.as_str())? {
                Outcome::AlreadyMember
            } else {
                modifications.assign(principal.as_str(), None)?;
                continue;
            };
            receipts.push(Receipt::new(principal, None, Action::Assign, outcome));
        }
        receipts.extend(modifications.apply()?);
        Ok(receipts)
    }

    /// Register a new site user and add it to this workspace.
    ///
    /// The login is normalized and the full name has its whitespace collapsed. A registration
    /// notification is sent if `config.notify_registered` is set.
    pub fn register_and_add(
        &self,
        login: &str,
        attributes: UserAttributes,
    ) -> Result<Receipt, RosterError> {
        let principal = self.site.normalize(login);
        let receipt = |outcome| Receipt::new(principal.clone(), None, Action::Register, outcome);
        if principal.as_str().is_empty() {
            return Ok(receipt(Outcome::InvalidIdentifier));
        }
        if self.roster.contains(principal.as_str())? {
            return Ok(receipt(Outcome::AlreadyMember));
        }
        if self.site.members().contains(&principal)? {
            return Ok(receipt(Outcome::AlreadyRegistered));
        }

        let attributes = UserAttributes {
            fullname: attributes
                .fullname
                .as_deref()
                .map(normalize_fullname)
                .filter(|fullname| !fullname.is_empty()),
            email: attributes.email,
        };
        match self
            .site
            .members()
            .register(&principal, attributes, self.config.notify_registered)
        {
            Ok(_) => {}
            Err(StoreError::DuplicatePrincipal(_)) => {
                return Ok(receipt(Outcome::AlreadyRegistered));
            }
            Err(StoreError::InvalidIdentifier(reason)) => {
                warn!(%principal, %reason, "registration rejected");
                return Ok(receipt(Outcome::InvalidIdentifier));
            }
            Err(err) => return Err(err.into()),
        }
        debug!(%principal, "registered user");

        self.roster.add(principal.as_str())?;
        Ok(receipt(Outcome::Succeeded))
    }

    /// Apply a submitted membership grid.
    pub fn update_grid(&self, update: &GridUpdate) -> Result<Vec<Receipt>, RosterError> {
        // Principals removed since the grid was rendered are ignored.
        let known = self.roster.keys()?;
        let managed: BTreeSet<PrincipalId> = update
            .managed
            .iter()
            .map(|raw| self.site.normalize(raw))
            .filter(|principal| known.contains(principal))
            .collect();

        let mut receipts = Vec::new();
        let mut modifications = MembershipModifications::new(&self.roster);
        for workgroup in self.roster.groups() {
            let group_id = workgroup.group_id();
            let checked: BTreeSet<PrincipalId> = update
                .checked
                .get(group_id)
                .into_iter()
                .flatten()
                .map(|raw| self.site.normalize(raw))
                .collect();

            for principal in &managed {
                let member = workgroup.contains(principal.as_str())?;
                let wanted = checked.contains(principal);
                if wanted && !member {
                    modifications.assign(principal.as_str(), Some(group_id))?;
                } else if !wanted && member {
                    match self.check_self_removal(principal, group_id) {
                        Ok(()) => modifications.unassign(principal.as_str(), Some(group_id))?,
                        Err(err) => receipts.push(receipt_for(
                            principal.clone(),
                            Some(group_id),
                            Action::Unassign,
                            Err::<(), _>(err),
                            |_| Outcome::Succeeded,
                        )?),
                    }
                }
            }
        }
        receipts.extend(modifications.apply()?);
        Ok(receipts)
    }

    /// Remove principals from this workspace and all nested workspaces.
    pub fn remove(&self, principals: &[&str]) -> Result<Vec<Receipt>, RosterError> {
        let base_id = self.roster.base().group_id();
        let mut receipts = Vec::new();
        for raw in principals {
            let principal = self.site.normalize(raw);
            let result = self
                .check_self_removal(&principal, base_id)
                .and_then(|()| self.roster.unassign(principal.as_str(), None));
            receipts.push(receipt_for(
                principal,
                None,
                Action::Unassign,
                result,
                |_| Outcome::Succeeded,
            )?);
        }
        Ok(receipts)
    }

    /// Remove principals from the site entirely.
    pub fn purge(&self, principals: &[&str]) -> Result<Vec<Receipt>, RosterError> {
        let mut receipts = Vec::new();
        for raw in principals {
            let principal = self.site.normalize(raw);
            let result = if self.is_actor(&principal) {
                Err(RosterError::PurgeNotAllowed(principal.clone()))
            } else {
                self.roster.purge_user(principal.as_str())
            };
            receipts.push(receipt_for(
                principal,
                None,
                Action::Purge,
                result,
                |_| Outcome::Succeeded,
            )?);
        }
        Ok(receipts)
    }

    /// Fails with [`RosterError::SelfRemovalGuard`] if the acting user would drop their own
    /// membership in a guarded group without the configured safety net.
    pub fn check_self_removal(
        &self,
        principal: &PrincipalId,
        group_id: &str,
    ) -> Result<(), RosterError> {
        if !self.is_actor(principal) || !self.config.guarded_groups.contains(group_id) {
            return Ok(());
        }
        let allowed = match self.config.self_removal {
            SelfRemovalPolicy::Allow => true,
            SelfRemovalPolicy::Block => false,
            SelfRemovalPolicy::AllowIfInherited => self.inherits_management(principal)?,
        };
        if allowed {
            return Ok(());
        }
        Err(RosterError::SelfRemovalGuard {
            principal: principal.clone(),
            group_id: group_id.to_owned(),
        })
    }

    /// Returns true if the principal manages any workspace containing this one.
    fn inherits_management(&self, principal: &PrincipalId) -> Result<bool, RosterError> {
        let ancestors =
            hierarchy::ancestor_workspaces(self.site.tree(), &self.roster.workspace().id)?;
        for ancestor in ancestors {
            let managers = GroupInfo::new(
                self.site.clone(),
                group_name(&ancestor.id, &self.config.management_group),
            );
            if managers.exists()? && managers.contains(principal)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
