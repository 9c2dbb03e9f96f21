//! Access Control / Session Layer.
//!
//! A request is authenticated by an HS256 bearer token issued by the identity
//! provider; the token only proves *who* the caller is. The caller's role is
//! always read from the `users` store, never from a token claim.

pub mod handlers;
pub mod users;

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::AppError;
use crate::state::AppState;

pub use users::Role;

/// Capability set derived from a role. Viewing and AI features need only an
/// authenticated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    pub can_view: bool,
    pub can_use_ai: bool,
    pub can_create: bool,
    pub can_edit: bool,
    pub can_delete: bool,
    pub can_sync: bool,
    pub can_manage_users: bool,
}

impl Permissions {
    pub fn for_role(role: Option<Role>) -> Self {
        let editor = role.map_or(false, |r| r >= Role::Editor);
        let admin = role == Some(Role::Admin);
        Self {
            can_view: true,
            can_use_ai: true,
            can_create: editor,
            can_edit: editor,
            can_delete: editor,
            can_sync: editor,
            can_manage_users: admin,
        }
    }
}

/// The verified caller of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    /// `None` when the identity has no profile (e.g. a deleted user whose
    /// credential still works).
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Copy)]
pub enum Capability {
    Create,
    Edit,
    Delete,
    Sync,
    ManageUsers,
}

impl Session {
    pub fn permissions(&self) -> Permissions {
        Permissions::for_role(self.role)
    }

    /// Fails with `Forbidden` unless the session's role grants `capability`.
    pub fn require(&self, capability: Capability) -> Result<(), AppError> {
        let p = self.permissions();
        let (allowed, needed) = match capability {
            Capability::Create => (p.can_create, "editor"),
            Capability::Edit => (p.can_edit, "editor"),
            Capability::Delete => (p.can_delete, "editor"),
            Capability::Sync => (p.can_sync, "editor"),
            Capability::ManageUsers => (p.can_manage_users, "admin"),
        };
        if allowed {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("{needed} role required")))
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// Verifies `token` and returns its subject.
pub fn verify_token(token: &str, secret: &str) -> Result<String, AppError> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims.sub)
        .map_err(|e| {
            debug!("Rejected bearer token: {e}");
            AppError::Unauthorized
        })
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::Unauthorized)?;
        let user_id = verify_token(token, &state.config.jwt_secret)?;
        let role = state.users.get(&user_id).await?.map(|profile| profile.role);
        Ok(Session { user_id, role })
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::token_for;
    use super::*;

    #[test]
    fn test_viewer_permissions() {
        let p = Permissions::for_role(Some(Role::Viewer));
        assert!(p.can_view && p.can_use_ai);
        assert!(!p.can_create && !p.can_edit && !p.can_delete && !p.can_sync);
        assert!(!p.can_manage_users);
    }

    #[test]
    fn test_editor_and_admin_permissions() {
        let editor = Permissions::for_role(Some(Role::Editor));
        assert!(editor.can_create && editor.can_edit && editor.can_delete && editor.can_sync);
        assert!(!editor.can_manage_users);

        let admin = Permissions::for_role(Some(Role::Admin));
        assert!(admin.can_sync && admin.can_manage_users);
    }

    #[test]
    fn test_profileless_session_keeps_only_unconditional_capabilities() {
        let session = Session {
            user_id: "gone".into(),
            role: None,
        };
        assert_eq!(session.permissions(), Permissions::for_role(Some(Role::Viewer)));
        assert!(matches!(
            session.require(Capability::Edit),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_token_round_trip_and_wrong_secret() {
        let token = token_for("user-42", "s3cret");
        assert_eq!(verify_token(&token, "s3cret").unwrap(), "user-42");
        assert!(matches!(
            verify_token(&token, "other"),
            Err(AppError::Unauthorized)
        ));
    }
}
