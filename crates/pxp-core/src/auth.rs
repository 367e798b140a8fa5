//! Roles, the authorization gate, and the token-resolution seam
//!
//! Every domain tool calls `require_permission` as its first step. Failures
//! are returned as structured payloads, never thrown, so the model sees a
//! uniform `{error: …}` shape.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::context::{self, RequestContext};

pub const UNAUTHORIZED_MESSAGE: &str = "You are not authorized to perform this action.";

/// Roles that may mutate project-management data
pub const DEFAULT_ROLES: &[Role] = &[Role::Superadmin, Role::Admin, Role::Pm];

/// Widened set for read-oriented list tools
pub const READ_ROLES: &[Role] = &[Role::Superadmin, Role::Admin, Role::Pm, Role::TeamMember];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Superadmin,
    Admin,
    Pm,
    TeamMember,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Superadmin => "superadmin",
            Role::Admin => "admin",
            Role::Pm => "pm",
            Role::TeamMember => "team_member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "superadmin" => Some(Role::Superadmin),
            "admin" => Some(Role::Admin),
            "pm" => Some(Role::Pm),
            "team_member" => Some(Role::TeamMember),
            _ => None,
        }
    }
}

/// Authenticated caller as resolved from a bearer token
#[derive(Clone, Debug, Serialize)]
pub struct AuthUser {
    pub id: i64,
    pub name: String,
    pub role: Role,
    pub company_id: i64,
}

/// The unauthorized payload returned across the tool boundary
pub fn unauthorized_payload() -> Value {
    json!({ "error": UNAUTHORIZED_MESSAGE })
}

/// Authorization gate.
///
/// Returns the active request context when the caller's role is in `allowed`,
/// otherwise the structured unauthorized payload. No context at all (tool
/// invoked outside a request scope) is treated as unauthorized.
pub fn require_permission(allowed: &[Role]) -> Result<RequestContext, Value> {
    let Some(ctx) = context::current() else {
        return Err(unauthorized_payload());
    };
    if !allowed.contains(&ctx.user.role) {
        return Err(unauthorized_payload());
    }
    Ok(ctx)
}

/// Resolves bearer tokens to users. Production wires this to the identity
/// tables; tests use the in-memory table below.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn resolve(&self, token: &str) -> Option<AuthUser>;
}

/// In-memory token table
#[derive(Default)]
pub struct StaticTokenAuth {
    tokens: RwLock<HashMap<String, AuthUser>>,
}

impl StaticTokenAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, token: impl Into<String>, user: AuthUser) {
        self.tokens
            .write()
            .expect("token table poisoned")
            .insert(token.into(), user);
    }
}

#[async_trait]
impl AuthProvider for StaticTokenAuth {
    async fn resolve(&self, token: &str) -> Option<AuthUser> {
        self.tokens
            .read()
            .expect("token table poisoned")
            .get(token)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context;

    fn pm_user() -> AuthUser {
        AuthUser {
            id: 7,
            name: "Dana".to_string(),
            role: Role::Pm,
            company_id: 1,
        }
    }

    fn member_user() -> AuthUser {
        AuthUser {
            id: 8,
            name: "Kim".to_string(),
            role: Role::TeamMember,
            company_id: 1,
        }
    }

    #[tokio::test]
    async fn no_context_is_unauthorized() {
        let denied = require_permission(DEFAULT_ROLES).expect_err("must deny");
        assert_eq!(denied["error"], UNAUTHORIZED_MESSAGE);
    }

    #[tokio::test]
    async fn pm_passes_default_gate() {
        let ctx = RequestContext::new("t", pm_user());
        context::scope(ctx, async {
            let granted = require_permission(DEFAULT_ROLES).expect("pm allowed");
            assert_eq!(granted.user.id, 7);
        })
        .await;
    }

    #[tokio::test]
    async fn team_member_denied_by_default_allowed_for_reads() {
        let ctx = RequestContext::new("t", member_user());
        context::scope(ctx, async {
            assert!(require_permission(DEFAULT_ROLES).is_err());
            assert!(require_permission(READ_ROLES).is_ok());
        })
        .await;
    }

    #[tokio::test]
    async fn token_table_resolves_known_tokens_only() {
        let auth = StaticTokenAuth::new();
        auth.insert("secret", pm_user());
        assert!(auth.resolve("secret").await.is_some());
        assert!(auth.resolve("other").await.is_none());
    }
}
