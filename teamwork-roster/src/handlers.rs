// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reactions to workspace lifecycle events fired by the host.
use teamwork_store::{GroupStore, LocalRoles, NodeId, SiteMembers, WorkspaceTree};
use tracing::debug;

use crate::error::RosterError;
use crate::hierarchy::{self, Workspace};
use crate::roster::WorkspaceRoster;
use crate::site::{Site, group_name};

fn require_workspace<G, M, T>(
    site: &Site<G, M, T>,
    node: &NodeId,
) -> Result<Workspace, RosterError>
where
    G: GroupStore,
    M: SiteMembers,
    T: WorkspaceTree,
{
    match hierarchy::find_workspace(site.tree(), node)? {
        Some(workspace) if &workspace.id == node => Ok(workspace),
        _ => Err(RosterError::NotAWorkspace(node.clone())),
    }
}

/// A workspace was created: create its groups and bind their roles in the workspace.
pub fn on_created<G, M, T, R>(
    site: &Site<G, M, T>,
    roles: &R,
    node: &NodeId,
) -> Result<WorkspaceRoster<G, M, T>, RosterError>
where
    G: GroupStore,
    M: SiteMembers,
    T: WorkspaceTree,
    R: LocalRoles,
{
    let workspace = require_workspace(site, node)?;
    let roster = site.roster_for(workspace)?;
    for workgroup in roster.groups() {
        roles.bind_roles(node, workgroup.name(), workgroup.roles())?;
    }
    debug!(workspace = %node, groups = roster.group_ids().len(), "workspace created");
    Ok(roster)
}

/// A workspace was renamed or moved.
///
/// Group names and role bindings do not depend on titles or location. The stored group titles of
/// the workspace and all nested workspaces are refreshed, and every member of a moved workspace
/// is added to the base groups of its current ancestors. Memberships in former ancestors are
/// kept.
pub fn on_moved<G, M, T>(site: &Site<G, M, T>, node: &NodeId) -> Result<(), RosterError>
where
    G: GroupStore,
    M: SiteMembers,
    T: WorkspaceTree,
{
    let workspace = require_workspace(site, node)?;
    let nested = hierarchy::descendant_workspaces(site.tree(), node)?;
    for workspace in std::iter::once(workspace).chain(nested) {
        let roster = site.roster_for(workspace)?;
        for workgroup in roster.groups() {
            workgroup.refresh_title()?;
        }
        for principal in roster.keys()? {
            roster.base().propagate_upwards(&principal)?;
        }
    }
    debug!(workspace = %node, "refreshed groups of moved workspace");
    Ok(())
}

/// A workspace was renamed. Same as [`on_moved`].
pub fn on_renamed<G, M, T>(site: &Site<G, M, T>, node: &NodeId) -> Result<(), RosterError>
where
    G: GroupStore,
    M: SiteMembers,
    T: WorkspaceTree,
{
    on_moved(site, node)
}

/// A workspace is being removed or has been removed.
///
/// Removes every group of the workspace, and of nested workspaces still present in the tree.
/// Safe to call for any node in any order, repeatedly. Returns the names of removed groups.
pub fn on_removed<G, M, T>(site: &Site<G, M, T>, node: &NodeId) -> Result<Vec<String>, RosterError>
where
    G: GroupStore,
    M: SiteMembers,
    T: WorkspaceTree,
{
    let mut namespaces = vec![node.clone()];
    if site.tree().node(node)?.is_some() {
        namespaces.extend(
            hierarchy::descendant_workspaces(site.tree(), node)?
                .into_iter()
                .map(|workspace| workspace.id),
        );
    }

    let mut removed = Vec::new();
    for namespace in namespaces {
        for config in site.registry().iter() {
            let name = group_name(&namespace, &config.group_id);
            if site.groups().remove_group(&name)? {
                site.bus().invalidate(&name);
                removed.push(name);
            }
        }
    }
    if !removed.is_empty() {
        debug!(workspace = %node, groups = removed.len(), "removed workspace groups");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use assert_matches::assert_matches;
    use teamwork_store::{GroupStore, LocalRoles, Node, NodeId, NodeKind};

    use crate::error::RosterError;
    use crate::test_utils::Fixture;

    use super::{on_created, on_moved, on_removed, on_renamed};

    #[test]
    fn created_workspace_gets_groups_and_roles() {
        let fixture = Fixture::new();
        let names: BTreeSet<String> = fixture.groups.list_group_ids().unwrap().into_iter().collect();
        for name in ["p-viewers", "t-contributors", "s-managers", "q-viewers"] {
            assert!(names.contains(name), "{name} missing");
        }

        let roles = fixture
            .roles
            .roles_for(&NodeId::new("t"), "t-contributors")
            .unwrap();
        assert_eq!(
            roles,
            BTreeSet::from([
                "Workspace Viewer".to_string(),
                "Workspace Contributor".to_string()
            ])
        );
        assert!(fixture.roles.bound_groups(&NodeId::new("t")).contains("t-managers"));
    }

    #[test]
    fn content_nodes_are_rejected() {
        let fixture = Fixture::new();
        fixture
            .tree
            .insert(Some(&"t".into()), Node::new("doc", "Document", NodeKind::Content))
            .unwrap();
        assert_matches!(
            on_created(&fixture.site, &fixture.roles, &"doc".into()),
            Err(RosterError::NotAWorkspace(_))
        );
        assert_matches!(
            on_moved(&fixture.site, &"doc".into()),
            Err(RosterError::NotAWorkspace(_))
        );
    }

    #[test]
    fn created_twice_keeps_members() {
        let fixture = Fixture::new();
        fixture.roster("t").add("alice").unwrap();
        let roster = on_created(&fixture.site, &fixture.roles, &"t".into()).unwrap();
        assert!(roster.contains("alice").unwrap());
    }

    #[test]
    fn rename_refreshes_titles() {
        let fixture = Fixture::new();
        fixture.roster("s").add("bob").unwrap();
        fixture.tree.rename(&"t".into(), "Renamed Team").unwrap();
        on_renamed(&fixture.site, &"t".into()).unwrap();

        let meta = fixture.groups.group_meta("s-viewers").unwrap().unwrap();
        assert_eq!(
            meta.title.as_deref(),
            Some("Project P / Renamed Team / Subteam S - Workspace Viewers")
        );
        let meta = fixture.groups.group_meta("p-viewers").unwrap().unwrap();
        assert_eq!(meta.title.as_deref(), Some("Project P - Workspace Viewers"));
        assert!(fixture.roster("s").contains("bob").unwrap());
    }

    #[test]
    fn moved_team_keeps_group_names() {
        let fixture = Fixture::new();
        fixture.roster("t").add("carol").unwrap();
        fixture.tree.move_node(&"t".into(), Some(&"q".into())).unwrap();
        on_moved(&fixture.site, &"t".into()).unwrap();

        let roster = fixture.roster("t");
        assert_eq!(roster.name(), "t-viewers");
        assert!(roster.contains("carol").unwrap());
        assert_eq!(
            roster.title().unwrap(),
            "Project Q / Team T - Workspace Viewers"
        );
        assert!(
            fixture
                .roles
                .roles_for(&NodeId::new("t"), "t-managers")
                .unwrap()
                .contains("Manager")
        );

        // Members follow the team into its new project.
        assert!(fixture.roster("q").contains("carol").unwrap());
        for workspace in ["t", "q", "p"] {
            fixture.roster(workspace).check_integrity().unwrap();
        }
        assert!(!fixture.roster("p").can_purge("carol").unwrap());
        assert!(!fixture.roster("q").can_purge("carol").unwrap());
    }

    #[test]
    fn moved_subteam_members_join_new_ancestors() {
        let fixture = Fixture::new();
        fixture.roster("s").add("dave@example.com").unwrap();
        fixture
            .workgroup("s", "contributors")
            .add("dave@example.com")
            .unwrap();
        fixture.tree.move_node(&"t".into(), Some(&"q".into())).unwrap();
        on_moved(&fixture.site, &"t".into()).unwrap();

        for workspace in ["s", "t", "q"] {
            let roster = fixture.roster(workspace);
            assert!(roster.contains("dave@example.com").unwrap(), "member of {workspace}");
            roster.check_integrity().unwrap();
        }
        let meta = fixture.groups.group_meta("s-contributors").unwrap().unwrap();
        assert_eq!(
            meta.title.as_deref(),
            Some("Project Q / Team T / Subteam S - Workspace Contributors")
        );
    }

    #[test]
    fn removal_cascades_and_is_idempotent() {
        let fixture = Fixture::new();
        let removed = on_removed(&fixture.site, &"t".into()).unwrap();
        assert_eq!(removed.len(), 6);
        assert!(!fixture.groups.has_group("t-viewers").unwrap());
        assert!(!fixture.groups.has_group("s-managers").unwrap());
        assert!(fixture.groups.has_group("p-viewers").unwrap());

        // Host removes the subtree and fires again, bottom-up.
        for node in fixture.tree.remove(&"t".into()).unwrap() {
            assert!(on_removed(&fixture.site, &node.id).unwrap().is_empty());
        }
        assert!(on_removed(&fixture.site, &"t".into()).unwrap().is_empty());
    }

    #[test]
    fn removal_after_tree_removal() {
        let fixture = Fixture::new();
        let nodes = fixture.tree.remove(&"t".into()).unwrap();
        assert_eq!(nodes.len(), 2);
        for node in nodes {
            on_removed(&fixture.site, &node.id).unwrap();
        }
        assert!(!fixture.groups.has_group("s-viewers").unwrap());
        assert!(!fixture.groups.has_group("t-contributors").unwrap());
        assert!(fixture.groups.has_group("q-managers").unwrap());
    }
}
