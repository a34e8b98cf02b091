// SPDX-License-Identifier: MIT OR Apache-2.0

//! Buffered membership changes applied in one deterministic pass.
use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use teamwork_store::{GroupStore, PrincipalId, SiteMembers, WorkspaceTree};
use tracing::{trace, warn};

use crate::error::RosterError;
use crate::roster::WorkspaceRoster;

/// Kind of change a receipt reports on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Assign,
    Unassign,
    Register,
    Purge,
}

/// Result of one change for one principal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    AlreadyMember,
    NotAMember,
    UnknownPrincipal,
    UnknownGroupType,
    PrecedenceViolation,
    PurgeDisallowed,
    SelfRemovalBlocked,
    AlreadyRegistered,
    InvalidIdentifier,
    NotAWorkspace,
}

impl Outcome {
    /// Outcome reported for a recoverable error, `None` for errors which must abort the request.
    pub fn from_error(error: &RosterError) -> Option<Self> {
        let outcome = match error {
            RosterError::UnknownPrincipal(_) => Outcome::UnknownPrincipal,
            RosterError::NotAMember { .. } => Outcome::NotAMember,
            RosterError::PrecedenceViolation { .. } => Outcome::PrecedenceViolation,
            RosterError::SelfRemovalGuard { .. } => Outcome::SelfRemovalBlocked,
            RosterError::PurgeNotAllowed(_) => Outcome::PurgeDisallowed,
            RosterError::UnknownGroupType(_) => Outcome::UnknownGroupType,
            RosterError::NotAWorkspace(_) => Outcome::NotAWorkspace,
            RosterError::GroupIntegrity(_) | RosterError::Store(_) => return None,
        };
        Some(outcome)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded)
    }
}

/// Outcome of one change for one principal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub principal: PrincipalId,

    /// Group type the change targeted, `None` for changes not bound to a group.
    pub group_id: Option<String>,
    pub action: Action,
    pub outcome: Outcome,
}

impl Receipt {
    pub fn new(
        principal: PrincipalId,
        group_id: Option<&str>,
        action: Action,
        outcome: Outcome,
    ) -> Self {
        Self {
            principal,
            group_id: group_id.map(str::to_owned),
            action,
            outcome,
        }
    }
}

/// Translate the result of a change into a receipt, propagating non-recoverable errors.
pub(crate) fn receipt_for<V>(
    principal: PrincipalId,
    group_id: Option<&str>,
    action: Action,
    result: Result<V, RosterError>,
    on_success: impl FnOnce(V) -> Outcome,
) -> Result<Receipt, RosterError> {
    let outcome = match result {
        Ok(value) => on_success(value),
        Err(err) => match Outcome::from_error(&err) {
            Some(outcome) => {
                warn!(%principal, ?group_id, ?action, "membership change failed: {err}");
                outcome
            }
            None => return Err(err),
        },
    };
    Ok(Receipt::new(principal, group_id, action, outcome))
}

type Planned = HashMap<String, BTreeSet<PrincipalId>>;

/// Queue of planned assignments and removals for one workspace.
///
/// [`apply`](Self::apply) runs every assignment before any removal, the base group first in
/// each phase and the remaining groups in registry order. A principal queued for both assignment
/// and removal of the same group ends up not being a member.
#[derive(Debug)]
pub struct MembershipModifications<'a, G, M, T> {
    roster: &'a WorkspaceRoster<G, M, T>,
    planned_assign: Planned,
    planned_unassign: Planned,
}

impl<'a, G, M, T> MembershipModifications<'a, G, M, T>
where
    G: GroupStore,
    M: SiteMembers,
    T: WorkspaceTree,
{
    pub fn new(roster: &'a WorkspaceRoster<G, M, T>) -> Self {
        Self {
            planned_assign: Self::empty_plan(roster),
            planned_unassign: Self::empty_plan(roster),
            roster,
        }
    }

    fn empty_plan(roster: &WorkspaceRoster<G, M, T>) -> Planned {
        roster
            .group_ids()
            .iter()
            .map(|group_id| (group_id.clone(), BTreeSet::new()))
            .collect()
    }

    fn plan(
        planned: &mut Planned,
        roster: &WorkspaceRoster<G, M, T>,
        principal: &str,
        group_id: Option<&str>,
    ) -> Result<(), RosterError> {
        let group_id = group_id.unwrap_or(roster.base().group_id());
        let principal = roster.normalize(principal);
        planned
            .get_mut(group_id)
            .ok_or_else(|| RosterError::UnknownGroupType(group_id.to_owned()))?
            .insert(principal);
        Ok(())
    }

    /// Queue adding a principal to a group, the base group if none is given.
    pub fn assign(&mut self, principal: &str, group_id: Option<&str>) -> Result<(), RosterError> {
        Self::plan(&mut self.planned_assign, self.roster, principal, group_id)
    }

    /// Queue removing a principal from a group, the base group if none is given.
    pub fn unassign(&mut self, principal: &str, group_id: Option<&str>) -> Result<(), RosterError> {
        Self::plan(&mut self.planned_unassign, self.roster, principal, group_id)
    }

    pub fn planned_assign(&self, group_id: &str) -> Option<&BTreeSet<PrincipalId>> {
        self.planned_assign.get(group_id)
    }

    pub fn planned_unassign(&self, group_id: &str) -> Option<&BTreeSet<PrincipalId>> {
        self.planned_unassign.get(group_id)
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.planned_assign.values().all(BTreeSet::is_empty)
            && self.planned_unassign.values().all(BTreeSet::is_empty)
    }

    /// Group type ids in processing order: base first, then registry order.
    fn processing_order(&self) -> Vec<String> {
        let base_id = self.roster.base().group_id();
        std::iter::once(base_id.to_owned())
            .chain(
                self.roster
                    .group_ids()
                    .iter()
                    .filter(|group_id| group_id.as_str() != base_id)
                    .cloned(),
            )
            .collect()
    }

    /// Apply every queued change and reset the queue.
    ///
    /// Recoverable failures are reported per principal and group. Storage failures abort and
    /// leave the remaining changes unapplied, the queue is reset either way.
    pub fn apply(&mut self) -> Result<Vec<Receipt>, RosterError> {
        let mut assign = std::mem::replace(&mut self.planned_assign, Self::empty_plan(self.roster));
        let mut unassign =
            std::mem::replace(&mut self.planned_unassign, Self::empty_plan(self.roster));
        let order = self.processing_order();
        let mut receipts = Vec::new();

        for group_id in &order {
            for principal in assign.remove(group_id).unwrap_or_default() {
                let result = self.roster.assign(principal.as_str(), Some(group_id.as_str()));
                receipts.push(receipt_for(
                    principal,
                    Some(group_id.as_str()),
                    Action::Assign,
                    result,
                    |added| {
                        if added {
                            Outcome::Succeeded
                        } else {
                            Outcome::AlreadyMember
                        }
                    },
                )?);
            }
        }

        for group_id in &order {
            for principal in unassign.remove(group_id).unwrap_or_default() {
                let member = match self.roster.group(group_id) {
                    Some(workgroup) => workgroup.contains(principal.as_str())?,
                    None => false,
                };
                if !member {
                    // Removed already, typically by an earlier base group removal.
                    trace!(%principal, group_id = %group_id, "skip removal of non-member");
                    receipts.push(Receipt::new(
                        principal,
                        Some(group_id.as_str()),
                        Action::Unassign,
                        Outcome::NotAMember,
                    ));
                    continue;
                }
                let result = self.roster.unassign(principal.as_str(), Some(group_id.as_str()));
                receipts.push(receipt_for(
                    principal,
                    Some(group_id.as_str()),
                    Action::Unassign,
                    result,
                    |_| Outcome::Succeeded,
                )?);
            }
        }

        Ok(receipts)
    }
}
