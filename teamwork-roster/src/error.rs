// SPDX-License-Identifier: MIT OR Apache-2.0

use teamwork_store::{NodeId, PrincipalId, StoreError};
use thiserror::Error;

/// Errors raised by membership operations.
///
/// All variants except [`Store`](RosterError::Store) and
/// [`GroupIntegrity`](RosterError::GroupIntegrity) are recoverable: batch operations report them
/// per principal and carry on with the remaining ones.
#[derive(Debug, Error)]
pub enum RosterError {
    #[error("principal {0} is not known to the site")]
    UnknownPrincipal(PrincipalId),

    #[error("principal {principal} is not a member of group {group}")]
    NotAMember {
        principal: PrincipalId,
        group: String,
    },

    #[error("can not add {principal} to group {group} without membership in group {base}")]
    PrecedenceViolation {
        principal: PrincipalId,
        group: String,
        base: String,
    },

    #[error("{principal} can not remove their own membership in {group_id}")]
    SelfRemovalGuard {
        principal: PrincipalId,
        group_id: String,
    },

    #[error("can not purge {0}: not a member of this project or member of other projects")]
    PurgeNotAllowed(PrincipalId),

    #[error("group integrity violated: {0}")]
    GroupIntegrity(String),

    #[error("unknown group type {0}")]
    UnknownGroupType(String),

    #[error("node {0} is not located in a workspace")]
    NotAWorkspace(NodeId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RosterError {
    /// Returns true for expected per-principal failures which should not abort a batch.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, RosterError::Store(_) | RosterError::GroupIntegrity(_))
    }
}
