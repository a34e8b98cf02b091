// SPDX-License-Identifier: MIT OR Apache-2.0

use assert_matches::assert_matches;
use rstest::rstest;
use teamwork_store::{
    GroupStore, LocalRoles, MemoryGroupStore, MemoryLocalRoles, MemoryMembers, MemoryTree, Node,
    NodeId, NodeKind, PrincipalId, SiteMembers, UserAttributes,
};

use crate::config::{GroupTypeConfig, GroupTypeRegistry};
use crate::error::RosterError;
use crate::handlers;
use crate::modifications::MembershipModifications;
use crate::site::Site;
use crate::test_utils::{Fixture, setup_logging};

const WORKSPACES: [&str; 4] = ["p", "t", "s", "q"];

fn assert_integrity(fixture: &Fixture) {
    for workspace in WORKSPACES {
        fixture.roster(workspace).check_integrity().unwrap();
    }
}

#[rstest]
#[case::subteam("s", &["s", "t", "p"])]
#[case::team("t", &["t", "p"])]
#[case::project("p", &["p"])]
fn adding_implies_ancestor_membership(#[case] workspace: &str, #[case] members_of: &[&str]) {
    let fixture = Fixture::new();
    fixture.roster(workspace).add("alice").unwrap();

    for other in WORKSPACES {
        assert_eq!(
            fixture.roster(other).contains("alice").unwrap(),
            members_of.contains(&other),
            "membership in {other}"
        );
    }
    assert_integrity(&fixture);
}

#[test]
fn removing_from_root_clears_nested_workspaces() {
    let fixture = Fixture::new();
    fixture.roster("s").add("bob").unwrap();
    fixture.workgroup("s", "managers").add("bob").unwrap();
    fixture.workgroup("t", "contributors").add("bob").unwrap();
    fixture.workgroup("p", "managers").add("bob").unwrap();

    fixture.roster("p").unassign("bob", None).unwrap();

    for workspace in ["p", "t", "s"] {
        let roster = fixture.roster(workspace);
        assert!(!roster.contains("bob").unwrap());
        assert!(roster.user_groups("bob").unwrap().is_empty());
    }
    assert_integrity(&fixture);
}

#[test]
fn cascading_removal_on_subteam() {
    let fixture = Fixture::new();
    fixture.roster("s").add("u1").unwrap_err();

    let u1 = fixture.members.normalize("u1");
    fixture
        .members
        .register(&u1, UserAttributes::default(), false)
        .unwrap();
    fixture.roster("s").add("u1").unwrap();
    for workspace in ["s", "t", "p"] {
        assert!(fixture.roster(workspace).contains("u1").unwrap());
    }

    fixture.roster("p").unassign("u1", None).unwrap();
    for workspace in ["s", "t", "p"] {
        assert!(!fixture.roster(workspace).contains("u1").unwrap());
    }
}

#[test]
fn secondary_membership_never_without_base() {
    let fixture = Fixture::new();

    // Mix of valid and invalid operations, failures are expected and ignored.
    let steps: [(&str, &str, Option<&str>, bool); 12] = [
        ("t", "alice", Some("managers"), true),
        ("t", "alice", None, true),
        ("t", "alice", Some("managers"), true),
        ("s", "bob", Some("contributors"), true),
        ("s", "bob", None, true),
        ("s", "bob", Some("contributors"), true),
        ("p", "bob", None, false),
        ("s", "bob", Some("contributors"), true),
        ("t", "alice", Some("viewers"), false),
        ("t", "alice", Some("managers"), true),
        ("q", "carol", None, true),
        ("q", "carol", Some("managers"), true),
    ];
    for (workspace, principal, group_id, assign) in steps {
        let roster = fixture.roster(workspace);
        let result = if assign {
            roster.assign(principal, group_id).map(|_| ())
        } else {
            roster.unassign(principal, group_id)
        };
        if let Err(err) = result {
            assert!(err.is_recoverable(), "{err}");
        }
        assert_integrity(&fixture);
    }

    assert!(!fixture.roster("s").contains("bob").unwrap());
    assert!(!fixture.workgroup("s", "contributors").contains("bob").unwrap());
    assert!(!fixture.workgroup("t", "managers").contains("alice").unwrap());
    assert!(fixture.workgroup("q", "managers").contains("carol").unwrap());
}

#[test]
fn adding_twice_keeps_keys() {
    let fixture = Fixture::new();
    let managers = fixture.workgroup("t", "managers");
    fixture.roster("t").add("carol").unwrap();
    managers.add("carol").unwrap();
    let keys = managers.keys().unwrap();
    assert!(!managers.add("carol").unwrap());
    assert_eq!(managers.keys().unwrap(), keys);
}

#[test]
fn bulk_queue_net_effect() {
    let fixture = Fixture::new();
    let roster = fixture.roster("t");
    let mut modifications = MembershipModifications::new(&roster);
    modifications.assign("alice", Some("contributors")).unwrap();
    modifications.assign("alice", None).unwrap();
    modifications.unassign("alice", Some("contributors")).unwrap();
    modifications.apply().unwrap();

    assert!(roster.contains("alice").unwrap());
    assert!(!roster.group("contributors").unwrap().contains("alice").unwrap());
    assert!(fixture.roster("p").contains("alice").unwrap());
    assert_integrity(&fixture);
}

#[test]
fn purge_depends_on_other_projects() {
    let fixture = Fixture::new();
    fixture.roster("t").add("dave@example.com").unwrap();
    assert!(fixture.roster("p").can_purge("dave@example.com").unwrap());

    fixture.roster("q").add("dave@example.com").unwrap();
    assert!(!fixture.roster("p").can_purge("dave@example.com").unwrap());
    assert!(!fixture.roster("q").can_purge("dave@example.com").unwrap());

    fixture.roster("q").unassign("dave@example.com", None).unwrap();
    assert!(fixture.roster("p").can_purge("dave@example.com").unwrap());
}

#[test]
fn moved_team_members_stay_purge_safe() {
    let fixture = Fixture::new();
    fixture.roster("t").add("carol").unwrap();
    fixture.tree.move_node(&"t".into(), Some(&"q".into())).unwrap();
    handlers::on_moved(&fixture.site, &"t".into()).unwrap();
    assert_integrity(&fixture);

    assert!(fixture.roster("q").contains("carol").unwrap());
    assert_matches!(
        fixture.roster("p").purge_user("carol"),
        Err(RosterError::PurgeNotAllowed(_))
    );
    assert!(fixture.roster("t").contains("carol").unwrap());
    assert!(fixture.members.contains(&PrincipalId::new("carol")).unwrap());
}

#[test]
fn principals_are_case_insensitive() {
    let fixture = Fixture::new();
    let alice = fixture.members.normalize("Alice@Example.com");
    fixture
        .members
        .register(&alice, UserAttributes::default(), false)
        .unwrap();

    let roster = fixture.roster("p");
    roster.add("Alice@Example.com").unwrap();
    assert!(roster.contains("alice@example.com").unwrap());
    assert_eq!(roster.keys().unwrap(), [PrincipalId::new("alice@example.com")]);
    assert!(!roster.add("ALICE@example.com").unwrap());
    roster.unassign("aLiCe@eXaMpLe.CoM", None).unwrap();
    assert!(roster.is_empty().unwrap());
}

#[test]
fn team_rename_keeps_groups() {
    setup_logging();

    let groups = MemoryGroupStore::new();
    let members = MemoryMembers::new();
    let tree = MemoryTree::new();
    let roles = MemoryLocalRoles::new();
    members
        .register(&PrincipalId::new("u1"), UserAttributes::default(), false)
        .unwrap();
    tree.insert(None, Node::new("p-uuid", "Project", NodeKind::Project))
        .unwrap();
    tree.insert(
        Some(&"p-uuid".into()),
        Node::new("t-uuid", "Team", NodeKind::Workspace),
    )
    .unwrap();

    let site = Site::new(
        groups.clone(),
        members,
        tree.clone(),
        GroupTypeRegistry::default(),
    );
    handlers::on_created(&site, &roles, &"p-uuid".into()).unwrap();
    let team = handlers::on_created(&site, &roles, &"t-uuid".into()).unwrap();
    team.add("u1").unwrap();
    team.assign("u1", Some("managers")).unwrap();
    let managers = team.group("managers").unwrap();
    assert_eq!(managers.title().unwrap(), "Project / Team - Workgroup managers");

    tree.rename(&"t-uuid".into(), "Renamed team").unwrap();
    handlers::on_renamed(&site, &"t-uuid".into()).unwrap();

    assert_eq!(managers.name(), "t-uuid-managers");
    assert!(managers.contains("u1").unwrap());
    assert_eq!(
        managers.title().unwrap(),
        "Project / Renamed team - Workgroup managers"
    );
    let meta = groups.group_meta("t-uuid-managers").unwrap().unwrap();
    assert_eq!(
        meta.title.as_deref(),
        Some("Project / Renamed team - Workgroup managers")
    );
    let roster = site.roster(&NodeId::new("t-uuid")).unwrap();
    assert!(roster.group("managers").unwrap().contains("u1").unwrap());
    assert!(
        roles
            .roles_for(&"t-uuid".into(), "t-uuid-managers")
            .unwrap()
            .contains("Manager")
    );
}

#[test]
fn writes_are_visible_to_every_reader() {
    let fixture = Fixture::new();
    let first = fixture.roster("t");
    let second = fixture.roster("t");
    let nested = fixture.roster("s");
    assert!(!second.contains("bob").unwrap());
    assert!(second.user_groups("bob").unwrap().is_empty());

    first.add("bob").unwrap();
    first.assign("bob", Some("managers")).unwrap();
    assert!(second.contains("bob").unwrap());
    assert!(second.user_groups("bob").unwrap().contains("managers"));

    nested.add("bob").unwrap();
    first.unassign("bob", None).unwrap();
    assert!(!nested.contains("bob").unwrap());
    assert!(second.user_groups("bob").unwrap().is_empty());
}

#[test]
fn begin_drops_stale_reads() {
    let fixture = Fixture::new();
    let roster = fixture.roster("p");
    assert!(roster.keys().unwrap().is_empty());

    fixture
        .groups
        .add_principal("p-viewers", &PrincipalId::new("carol"))
        .unwrap();
    assert!(roster.keys().unwrap().is_empty());

    fixture.site.begin();
    assert_eq!(roster.keys().unwrap(), [PrincipalId::new("carol")]);
}

#[test]
fn registering_group_types_at_runtime() {
    let mut fixture = Fixture::new();
    let before = fixture.site.clone();
    fixture
        .site
        .registry_mut()
        .add_type(GroupTypeConfig::new("reviewers", "Reviewers").with_roles(["Reviewer"]))
        .unwrap();

    let roster = fixture.roster("s");
    assert_eq!(
        roster.group_ids(),
        ["viewers", "contributors", "managers", "reviewers"]
    );
    assert!(fixture.groups.has_group("s-reviewers").unwrap());
    assert!(!before.registry().contains("reviewers"));

    roster.add("alice").unwrap();
    roster.assign("alice", Some("reviewers")).unwrap();
    fixture.roster("t").unassign("alice", None).unwrap();
    assert!(!roster.group("reviewers").unwrap().contains("alice").unwrap());

    fixture.site.registry_mut().remove_type("reviewers").unwrap();
    assert_eq!(
        fixture.roster("s").group_ids(),
        ["viewers", "contributors", "managers"]
    );
}
