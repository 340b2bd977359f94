//! Role-based access control
//!
//! Flat permission table keyed by `(role, resource_kind, action)`. Any
//! combination absent from the table is denied. The table is built once at
//! startup and only read afterwards, so the gate can be shared across plan
//! runs without synchronization.

use crate::security::identity::User;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Closed set of roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
    Guest,
}

/// Kind of object an action is performed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Tool,
    Resource,
}

/// Action performed on a tool or resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Execute,
    Register,
    Read,
    Write,
    Delete,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Guest => "guest",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            "guest" => Ok(Role::Guest),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Tool => f.write_str("tool"),
            ResourceKind::Resource => f.write_str("resource"),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Execute => "execute",
            Action::Register => "register",
            Action::Read => "read",
            Action::Write => "write",
            Action::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// What an authorization check is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessTarget {
    Tool(String),
    Resource(String),
}

impl AccessTarget {
    pub fn kind(&self) -> ResourceKind {
        match self {
            AccessTarget::Tool(_) => ResourceKind::Tool,
            AccessTarget::Resource(_) => ResourceKind::Resource,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AccessTarget::Tool(name) | AccessTarget::Resource(name) => name,
        }
    }
}

impl fmt::Display for AccessTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.name())
    }
}

/// Single row of the permission table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRule {
    pub role: Role,
    pub kind: ResourceKind,
    pub action: Action,
    pub allowed: bool,
}

impl PermissionRule {
    pub fn new(role: Role, kind: ResourceKind, action: Action, allowed: bool) -> Self {
        Self {
            role,
            kind,
            action,
            allowed,
        }
    }
}

/// Immutable permission table
#[derive(Debug, Clone, Default)]
pub struct PermissionTable {
    rules: HashMap<(Role, ResourceKind, Action), bool>,
    roles: HashSet<Role>,
}

impl PermissionTable {
    /// Build a table from rules; later rows override earlier ones
    pub fn from_rules(rules: impl IntoIterator<Item = PermissionRule>) -> Self {
        let mut table = Self::default();
        for rule in rules {
            table.roles.insert(rule.role);
            table
                .rules
                .insert((rule.role, rule.kind, rule.action), rule.allowed);
        }
        table
    }

    /// Built-in matrix: admins manage everything, users execute and read
    pub fn default_rules() -> Vec<PermissionRule> {
        use Action::*;
        use ResourceKind::*;

        vec![
            PermissionRule::new(Role::Admin, Tool, Execute, true),
            PermissionRule::new(Role::Admin, Tool, Register, true),
            PermissionRule::new(Role::Admin, Resource, Read, true),
            PermissionRule::new(Role::Admin, Resource, Write, true),
            PermissionRule::new(Role::Admin, Resource, Delete, true),
            PermissionRule::new(Role::User, Tool, Execute, true),
            PermissionRule::new(Role::User, Tool, Register, false),
            PermissionRule::new(Role::User, Resource, Read, true),
            PermissionRule::new(Role::User, Resource, Write, false),
            PermissionRule::new(Role::User, Resource, Delete, false),
        ]
    }

    /// Look up a single entry
    pub fn lookup(&self, role: Role, kind: ResourceKind, action: Action) -> Option<bool> {
        self.rules.get(&(role, kind, action)).copied()
    }

    /// Whether any row mentions the role
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl From<Vec<PermissionRule>> for PermissionTable {
    fn from(rules: Vec<PermissionRule>) -> Self {
        Self::from_rules(rules)
    }
}

/// Default-deny authorization check shared by every plan run
#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    table: Arc<PermissionTable>,
}

impl AuthorizationGate {
    pub fn new(table: PermissionTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }

    /// Decide whether `user` may perform `action` on `target`
    pub fn authorize(&self, user: &User, target: &AccessTarget, action: Action) -> bool {
        if !self.table.has_role(user.role) {
            debug!(user = %user.id, role = %user.role, "role has no permissions, denying");
            return false;
        }

        let allowed = self
            .table
            .lookup(user.role, target.kind(), action)
            .unwrap_or(false);

        debug!(
            user = %user.id,
            role = %user.role,
            target = %target,
            action = %action,
            allowed,
            "authorization decision"
        );
        allowed
    }

    /// Shorthand for checks against a tool
    pub fn authorize_tool(&self, user: &User, tool_name: &str, action: Action) -> bool {
        self.authorize(user, &AccessTarget::Tool(tool_name.to_string()), action)
    }

    pub fn table(&self) -> &PermissionTable {
        &self.table
    }
}

impl Default for AuthorizationGate {
    fn default() -> Self {
        Self::new(PermissionTable::from_rules(PermissionTable::default_rules()))
    }
}
