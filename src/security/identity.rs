//! Identity resolution
//!
//! The core only consumes resolved users; credentials are mapped to users by
//! an injected resolver.

use crate::security::rbac::Role;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub role: Role,
}

impl User {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

/// Maps a credential to a user
pub trait IdentityResolver: Send + Sync {
    fn authenticate(&self, credential: &str) -> Option<User>;
}

/// Static credential entry, as read from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub token: String,
    pub user_id: String,
    pub role: Role,
}

/// Resolver backed by a fixed token table
#[derive(Debug, Clone, Default)]
pub struct StaticTokenResolver {
    tokens: HashMap<String, User>,
}

impl StaticTokenResolver {
    pub fn new(entries: impl IntoIterator<Item = TokenEntry>) -> Self {
        let tokens = entries
            .into_iter()
            .map(|entry| (entry.token, User::new(entry.user_id, entry.role)))
            .collect();
        Self { tokens }
    }

    /// Development table with a single admin token
    pub fn default_entries() -> Vec<TokenEntry> {
        vec![TokenEntry {
            token: "valid_token".to_string(),
            user_id: "test_user".to_string(),
            role: Role::Admin,
        }]
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl IdentityResolver for StaticTokenResolver {
    fn authenticate(&self, credential: &str) -> Option<User> {
        if credential.is_empty() {
            return None;
        }
        self.tokens.get(credential).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_token_resolves_admin() {
        let resolver = StaticTokenResolver::new(StaticTokenResolver::default_entries());
        let user = resolver.authenticate("valid_token").unwrap();
        assert_eq!(user.id, "test_user");
        assert_eq!(user.role, Role::Admin);
    }

    #[test]
    fn test_unknown_token() {
        let resolver = StaticTokenResolver::new(StaticTokenResolver::default_entries());
        assert!(resolver.authenticate("bogus").is_none());
        assert!(resolver.authenticate("").is_none());
    }

    #[test]
    fn test_empty_resolver() {
        let resolver = StaticTokenResolver::default();
        assert!(resolver.is_empty());
        assert!(resolver.authenticate("valid_token").is_none());
    }
}
