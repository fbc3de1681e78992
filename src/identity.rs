//! Authenticated identity abstraction.
//!
//! Session and password handling live outside this crate. The core only sees
//! an [`Identity`] resolved by an [`IdentityProvider`].

use crate::error::{PolisError, PolisResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

string_enum! {
    /// Community role; admins may act on anything.
    pub enum Role ("role") {
        Admin => "admin",
        Curator => "curator",
        Member => "member",
    }
}

/// The caller of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn member(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Member)
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Curators and admins may edit the ontology.
    pub fn can_curate(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Curator)
    }

    /// Owner-or-admin check used by every owned resource.
    pub fn may_modify(&self, owner_id: &str) -> bool {
        self.is_admin() || self.user_id == owner_id
    }
}

/// Fail with `AuthenticationRequired` when no identity is present.
pub fn require(identity: Option<&Identity>) -> PolisResult<&Identity> {
    identity.ok_or(PolisError::AuthenticationRequired)
}

/// Resolves the caller of a request from its credentials.
pub trait IdentityProvider: Send + Sync {
    /// Returns `None` for anonymous or unrecognised credentials.
    fn current_user(&self, token: Option<&str>) -> Option<Identity>;
}

/// Fixed token table, loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    tokens: HashMap<String, Identity>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn current_user(&self, token: Option<&str>) -> Option<Identity> {
        let token = token?.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token);
        self.tokens.get(token).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_provider_resolves_bearer_tokens() {
        let provider = StaticIdentityProvider::new().with_token("t-1", Identity::admin("alice"));

        assert_eq!(provider.current_user(Some("t-1")).unwrap().user_id, "alice");
        assert_eq!(provider.current_user(Some("Bearer t-1")).unwrap().role, Role::Admin);
        assert!(provider.current_user(Some("nope")).is_none());
        assert!(provider.current_user(None).is_none());
    }

    #[test]
    fn require_rejects_anonymous_callers() {
        let err = require(None).unwrap_err();
        assert_eq!(err.status(), 401);
    }

    #[test]
    fn owner_or_admin() {
        let member = Identity::member("bob");
        assert!(member.may_modify("bob"));
        assert!(!member.may_modify("carol"));
        assert!(Identity::admin("root").may_modify("carol"));
        assert!(!member.can_curate());
    }
}
