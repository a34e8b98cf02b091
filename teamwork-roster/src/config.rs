// SPDX-License-Identifier: MIT OR Apache-2.0

//! Group type registry and membership policy configuration.
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of the base group type every workspace member belongs to.
pub const BASE_GROUP_ID: &str = "viewers";

/// Where a group type is instantiated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Only in top-level projects.
    Project,

    /// In projects and in every nested workspace.
    AnyWorkspace,
}

impl Scope {
    /// Returns true if a group type with this scope is instantiated in workspaces of the
    /// `requested` scope.
    pub fn covers(&self, requested: Scope) -> bool {
        match self {
            Scope::AnyWorkspace => true,
            Scope::Project => requested == Scope::Project,
        }
    }

    /// Scope of a workspace.
    pub fn of_workspace(is_project: bool) -> Self {
        if is_project {
            Scope::Project
        } else {
            Scope::AnyWorkspace
        }
    }
}

/// Configuration of one role-group type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupTypeConfig {
    pub group_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,

    /// Permission roles bound to groups of this type in their workspace.
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default = "default_scope")]
    pub scope: Scope,
}

fn default_scope() -> Scope {
    Scope::AnyWorkspace
}

impl GroupTypeConfig {
    pub fn new(group_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            title: title.into(),
            description: String::new(),
            roles: BTreeSet::new(),
            scope: Scope::AnyWorkspace,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("base group type {0} is not configured")]
    MissingBase(String),

    #[error("base group type {0} can not be removed")]
    BaseRemoval(String),

    #[error("group type {0} is configured more than once")]
    DuplicateType(String),

    #[error("unknown group type {0}")]
    UnknownType(String),

    #[error("group type id must not be empty or contain '-': {0:?}")]
    InvalidTypeId(String),

    #[error("base group type {0} must apply to every workspace")]
    BaseScope(String),

    #[error("order must list every registered group type exactly once")]
    InvalidOrder,
}

/// Serialized form of a registry.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct RegistryDocument {
    #[serde(default = "default_base")]
    base: String,
    group_types: Vec<GroupTypeConfig>,
}

fn default_base() -> String {
    BASE_GROUP_ID.to_owned()
}

/// Ordered mapping of group type identifiers to their configuration.
///
/// Exactly one entry is the base group type, it is always present and can not be removed. All
/// other entries are secondary group types. Iteration follows [`order`](Self::order), which
/// defaults to registration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupTypeRegistry {
    base: String,
    types: HashMap<String, GroupTypeConfig>,
    order: Vec<String>,
}

impl GroupTypeRegistry {
    /// Registry containing only the given base group type.
    pub fn new(base: GroupTypeConfig) -> Result<Self, ConfigError> {
        validate_id(&base.group_id)?;
        if base.scope != Scope::AnyWorkspace {
            return Err(ConfigError::BaseScope(base.group_id));
        }
        let id = base.group_id.clone();
        Ok(Self {
            base: id.clone(),
            types: HashMap::from([(id.clone(), base)]),
            order: vec![id],
        })
    }

    /// Parse a registry from its JSON form.
    pub fn from_json(value: &str) -> Result<Self, ConfigError> {
        let document: RegistryDocument = serde_json::from_str(value)?;
        Self::from_document(document)
    }

    /// Load a registry from a JSON file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// JSON form of this registry, group types in iteration order.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        let document = RegistryDocument {
            base: self.base.clone(),
            group_types: self.iter().cloned().collect(),
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    fn from_document(document: RegistryDocument) -> Result<Self, ConfigError> {
        let mut group_types = document.group_types;
        let base_position = group_types
            .iter()
            .position(|config| config.group_id == document.base)
            .ok_or_else(|| ConfigError::MissingBase(document.base.clone()))?;

        let base = group_types.remove(base_position);
        let mut registry = Self::new(base)?;

        // Keep the position of the base type as given in the document.
        let mut order: Vec<String> = Vec::with_capacity(group_types.len() + 1);
        for config in group_types {
            if registry.types.contains_key(&config.group_id) {
                return Err(ConfigError::DuplicateType(config.group_id));
            }
            order.push(config.group_id.clone());
            registry.add_type(config)?;
        }
        order.insert(base_position.min(order.len()), registry.base.clone());
        registry.set_order(order)?;
        Ok(registry)
    }

    pub fn base(&self) -> &GroupTypeConfig {
        // The base type is inserted on construction and can never be removed.
        &self.types[&self.base]
    }

    pub fn base_id(&self) -> &str {
        &self.base
    }

    pub fn is_base(&self, group_id: &str) -> bool {
        self.base == group_id
    }

    pub fn get(&self, group_id: &str) -> Option<&GroupTypeConfig> {
        self.types.get(group_id)
    }

    pub fn contains(&self, group_id: &str) -> bool {
        self.types.contains_key(group_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Group type configurations in order.
    pub fn iter(&self) -> impl Iterator<Item = &GroupTypeConfig> {
        self.order.iter().filter_map(|id| self.types.get(id))
    }

    /// Group type identifiers in order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Replace the iteration order. The new order must list every registered id exactly once.
    pub fn set_order<I, S>(&mut self, order: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let order: Vec<String> = order.into_iter().map(Into::into).collect();
        let unique: BTreeSet<&String> = order.iter().collect();
        if order.len() != self.types.len()
            || unique.len() != order.len()
            || !order.iter().all(|id| self.types.contains_key(id))
        {
            return Err(ConfigError::InvalidOrder);
        }
        self.order = order;
        Ok(())
    }

    /// Group types instantiated in workspaces of the given scope, all types if no scope is given.
    pub fn select(&self, scope: Option<Scope>) -> Vec<&GroupTypeConfig> {
        self.iter()
            .filter(|config| scope.is_none_or(|scope| config.scope.covers(scope)))
            .collect()
    }

    /// Register a group type. An existing type with the same id is replaced in place.
    pub fn add_type(&mut self, config: GroupTypeConfig) -> Result<(), ConfigError> {
        validate_id(&config.group_id)?;
        if self.is_base(&config.group_id) && config.scope != Scope::AnyWorkspace {
            return Err(ConfigError::BaseScope(config.group_id));
        }
        let id = config.group_id.clone();
        if self.types.insert(id.clone(), config).is_none() {
            self.order.push(id);
        }
        Ok(())
    }

    /// Remove a secondary group type.
    pub fn remove_type(&mut self, group_id: &str) -> Result<GroupTypeConfig, ConfigError> {
        if self.is_base(group_id) {
            return Err(ConfigError::BaseRemoval(group_id.to_owned()));
        }
        let config = self
            .types
            .remove(group_id)
            .ok_or_else(|| ConfigError::UnknownType(group_id.to_owned()))?;
        self.order.retain(|id| id != group_id);
        Ok(config)
    }
}

fn validate_id(group_id: &str) -> Result<(), ConfigError> {
    // Group names are composed as "<namespace>-<group id>", the suffix must stay parseable.
    if group_id.is_empty() || group_id.contains('-') {
        return Err(ConfigError::InvalidTypeId(group_id.to_owned()));
    }
    Ok(())
}

impl Default for GroupTypeRegistry {
    fn default() -> Self {
        let viewers = GroupTypeConfig::new(BASE_GROUP_ID, "Workspace Viewers")
            .with_description("Workspace viewers group.")
            .with_roles(["Workspace Viewer"]);
        let contributors = GroupTypeConfig::new("contributors", "Workspace Contributors")
            .with_description("Contributor group for workspace context.")
            .with_roles(["Workspace Viewer", "Workspace Contributor"]);
        let managers = GroupTypeConfig::new("managers", "Workgroup managers")
            .with_description("Workgroup managers/leads group for workspace context.")
            .with_roles([
                "Workspace Viewer",
                "Workspace Contributor",
                "Editor",
                "Reviewer",
                "FormEntry",
                "Manager",
            ]);

        let types = HashMap::from([
            (viewers.group_id.clone(), viewers),
            (contributors.group_id.clone(), contributors),
            (managers.group_id.clone(), managers),
        ]);
        Self {
            base: BASE_GROUP_ID.to_owned(),
            types,
            order: vec![
                BASE_GROUP_ID.to_owned(),
                "contributors".to_owned(),
                "managers".to_owned(),
            ],
        }
    }
}

/// How the membership facade treats an actor removing their own access.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfRemovalPolicy {
    /// Never allow removing oneself from a guarded group.
    Block,

    /// Allow it only when the actor keeps management rights through an ancestor workspace.
    #[default]
    AllowIfInherited,

    /// No guard.
    Allow,
}

/// Policy settings of the membership facade.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MembershipConfig {
    pub self_removal: SelfRemovalPolicy,

    /// Group types an actor may not drop themselves from (subject to `self_removal`).
    pub guarded_groups: BTreeSet<String>,

    /// Group type conferring management rights, looked up in ancestor workspaces.
    pub management_group: String,

    /// Send a notification to users registered through the facade.
    pub notify_registered: bool,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            self_removal: SelfRemovalPolicy::default(),
            guarded_groups: BTreeSet::from([BASE_GROUP_ID.to_owned(), "managers".to_owned()]),
            management_group: "managers".to_owned(),
            notify_registered: false,
        }
    }
}

impl MembershipConfig {
    pub fn from_json(value: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(value)?)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::{
        ConfigError, GroupTypeConfig, GroupTypeRegistry, MembershipConfig, Scope,
        SelfRemovalPolicy,
    };

    #[test]
    fn default_registry() {
        let registry = GroupTypeRegistry::default();
        assert_eq!(registry.base_id(), "viewers");
        assert_eq!(registry.order(), ["viewers", "contributors", "managers"]);
        assert!(registry.base().roles.contains("Workspace Viewer"));
        assert!(registry.get("managers").unwrap().roles.contains("Manager"));
        assert_eq!(registry.select(None).len(), 3);
    }

    #[test]
    fn select_by_scope() {
        let mut registry = GroupTypeRegistry::default();
        registry
            .add_type(GroupTypeConfig::new("leads", "Project leads").with_scope(Scope::Project))
            .unwrap();

        let project: Vec<&str> = registry
            .select(Some(Scope::Project))
            .into_iter()
            .map(|config| config.group_id.as_str())
            .collect();
        assert_eq!(project, ["viewers", "contributors", "managers", "leads"]);

        let nested: Vec<&str> = registry
            .select(Some(Scope::AnyWorkspace))
            .into_iter()
            .map(|config| config.group_id.as_str())
            .collect();
        assert_eq!(nested, ["viewers", "contributors", "managers"]);
    }

    #[test]
    fn base_is_protected() {
        let mut registry = GroupTypeRegistry::default();
        assert_matches!(
            registry.remove_type("viewers"),
            Err(ConfigError::BaseRemoval(_))
        );
        assert_matches!(
            registry.remove_type("nonsense"),
            Err(ConfigError::UnknownType(_))
        );
        let removed = registry.remove_type("contributors").unwrap();
        assert_eq!(removed.group_id, "contributors");
        assert_eq!(registry.order(), ["viewers", "managers"]);
        assert_matches!(
            registry.add_type(GroupTypeConfig::new("viewers", "V").with_scope(Scope::Project)),
            Err(ConfigError::BaseScope(_))
        );
    }

    #[test]
    fn replace_in_place() {
        let mut registry = GroupTypeRegistry::default();
        registry
            .add_type(GroupTypeConfig::new("contributors", "Writers"))
            .unwrap();
        assert_eq!(registry.order(), ["viewers", "contributors", "managers"]);
        assert_eq!(registry.get("contributors").unwrap().title, "Writers");
    }

    #[test]
    fn explicit_order() {
        let mut registry = GroupTypeRegistry::default();
        registry
            .set_order(["managers", "viewers", "contributors"])
            .unwrap();
        let ids: Vec<&str> = registry.iter().map(|c| c.group_id.as_str()).collect();
        assert_eq!(ids, ["managers", "viewers", "contributors"]);

        assert_matches!(
            registry.set_order(["managers", "viewers"]),
            Err(ConfigError::InvalidOrder)
        );
        assert_matches!(
            registry.set_order(["managers", "managers", "viewers"]),
            Err(ConfigError::InvalidOrder)
        );
    }

    #[test]
    fn rejects_dashed_ids() {
        let mut registry = GroupTypeRegistry::default();
        assert_matches!(
            registry.add_type(GroupTypeConfig::new("team-leads", "Leads")),
            Err(ConfigError::InvalidTypeId(_))
        );
    }

    #[test]
    fn json_document() {
        let registry = GroupTypeRegistry::from_json(
            r#"{
                "base": "members",
                "group_types": [
                    { "group_id": "editors", "title": "Editors", "roles": ["Editor"] },
                    { "group_id": "members", "title": "Members" },
                    { "group_id": "owners", "title": "Owners", "scope": "project" }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(registry.base_id(), "members");
        assert_eq!(registry.order(), ["editors", "members", "owners"]);
        assert_eq!(registry.get("owners").unwrap().scope, Scope::Project);

        let reloaded = GroupTypeRegistry::from_json(&registry.to_json().unwrap()).unwrap();
        assert_eq!(reloaded, registry);

        assert_matches!(
            GroupTypeRegistry::from_json(r#"{ "group_types": [] }"#),
            Err(ConfigError::MissingBase(base)) if base == "viewers"
        );
        assert_matches!(
            GroupTypeRegistry::from_json(
                r#"{ "group_types": [
                    { "group_id": "viewers", "title": "V" },
                    { "group_id": "a", "title": "A" },
                    { "group_id": "a", "title": "A" }
                ] }"#
            ),
            Err(ConfigError::DuplicateType(_))
        );
    }

    #[test]
    fn membership_config_defaults() {
        let config = MembershipConfig::from_json(r#"{ "self_removal": "block" }"#).unwrap();
        assert_eq!(config.self_removal, SelfRemovalPolicy::Block);
        assert!(config.guarded_groups.contains("managers"));
        assert_eq!(config.management_group, "managers");
    }
}
