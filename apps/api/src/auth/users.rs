use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::auth::Session;
use crate::contracts::store::StoreError;
use crate::errors::AppError;
use crate::models::user::UserRow;

/// Ordered so that `viewer < editor < admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Editor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Editor => "editor",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "viewer" => Ok(Role::Viewer),
            "editor" => Ok(Role::Editor),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPrefs {
    pub email: bool,
    pub renewal_alerts: bool,
    pub cancellation_alerts: bool,
    pub alert_days_before: u32,
}

impl Default for NotificationPrefs {
    fn default() -> Self {
        Self {
            email: true,
            renewal_alerts: true,
            cancellation_alerts: true,
            alert_days_before: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// The identity provider's user id.
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub department: Option<String>,
    pub notifications: NotificationPrefs,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserProfile {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(UserProfile {
            id: row.id,
            email: row.email,
            display_name: row.display_name,
            role: row.role.parse().map_err(StoreError::Corrupt)?,
            department: row.department,
            notifications: serde_json::from_value(row.notifications)?,
            created_at: row.created_at,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Profile store
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<UserProfile>, StoreError>;
    async fn list(&self) -> Result<Vec<UserProfile>, StoreError>;
    async fn insert(&self, profile: &UserProfile) -> Result<(), StoreError>;
    async fn update_role(&self, id: &str, role: Role) -> Result<(), StoreError>;
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

fn user_not_found(id: &str) -> StoreError {
    StoreError::NotFound(format!("User {id} not found"))
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn get(&self, id: &str) -> Result<Option<UserProfile>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(UserProfile::try_from).transpose()
    }

    async fn list(&self) -> Result<Vec<UserProfile>, StoreError> {
        let rows: Vec<UserRow> = sqlx::query_as("SELECT * FROM users ORDER BY email ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(UserProfile::try_from).collect()
    }

    async fn insert(&self, p: &UserProfile) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, display_name, role, department, notifications, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&p.id)
        .bind(&p.email)
        .bind(&p.display_name)
        .bind(p.role.as_str())
        .bind(&p.department)
        .bind(serde_json::to_value(&p.notifications)?)
        .bind(p.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_role(&self, id: &str, role: Role) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET role = $1 WHERE id = $2")
            .bind(role.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(user_not_found(id));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, UserProfile>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get(&self, id: &str) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<UserProfile>, StoreError> {
        let mut users: Vec<_> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }

    async fn insert(&self, profile: &UserProfile) -> Result<(), StoreError> {
        self.users
            .write()
            .await
            .insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn update_role(&self, id: &str, role: Role) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let profile = users.get_mut(id).ok_or_else(|| user_not_found(id))?;
        profile.role = role;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.users.write().await.remove(id);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Identity provider admin API
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Identity administration is not configured")]
    NotConfigured,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Identity provider error (status {status}): {message}")]
    Api { status: u16, message: String },
}

/// Privileged operations on login credentials.
#[async_trait]
pub trait IdentityAdmin: Send + Sync {
    /// Creates a credential and returns its user id. The provider emails the
    /// user a link to set their own password.
    async fn create_identity(&self, email: &str, display_name: Option<&str>)
        -> Result<String, IdentityError>;

    async fn delete_identity(&self, user_id: &str) -> Result<(), IdentityError>;
}

/// Stand-in used when `IDENTITY_ADMIN_URL` is not set.
pub struct UnconfiguredIdentityAdmin;

#[async_trait]
impl IdentityAdmin for UnconfiguredIdentityAdmin {
    async fn create_identity(&self, _: &str, _: Option<&str>) -> Result<String, IdentityError> {
        Err(IdentityError::NotConfigured)
    }

    async fn delete_identity(&self, _: &str) -> Result<(), IdentityError> {
        Err(IdentityError::NotConfigured)
    }
}

pub struct HttpIdentityAdmin {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateIdentityRequest<'a> {
    email: &'a str,
    display_name: Option<&'a str>,
    send_password_reset: bool,
}

#[derive(Deserialize)]
struct CreateIdentityResponse {
    id: String,
}

impl HttpIdentityAdmin {
    pub fn new(base_url: String, token: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, IdentityError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(IdentityError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl IdentityAdmin for HttpIdentityAdmin {
    async fn create_identity(
        &self,
        email: &str,
        display_name: Option<&str>,
    ) -> Result<String, IdentityError> {
        let response = self
            .client
            .post(format!("{}/users", self.base_url))
            .bearer_auth(&self.token)
            .json(&CreateIdentityRequest {
                email,
                display_name,
                send_password_reset: true,
            })
            .send()
            .await?;
        let created: CreateIdentityResponse = Self::check(response).await?.json().await?;
        Ok(created.id)
    }

    async fn delete_identity(&self, user_id: &str) -> Result<(), IdentityError> {
        let response = self
            .client
            .delete(format!("{}/users/{user_id}", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Admin operations
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    pub display_name: Option<String>,
    pub role: Option<Role>,
    pub department: Option<String>,
}

/// Re-reads the caller's role from the store rather than trusting the session.
async fn require_admin(users: &dyn UserStore, caller: &Session) -> Result<(), AppError> {
    match users.get(&caller.user_id).await? {
        Some(profile) if profile.role == Role::Admin => Ok(()),
        _ => Err(AppError::Forbidden("Only admins can manage users".into())),
    }
}

/// Creates the login credential, then the profile (role defaults to viewer).
pub async fn provision_user(
    users: &dyn UserStore,
    identity: &dyn IdentityAdmin,
    caller: &Session,
    data: NewUser,
) -> Result<UserProfile, AppError> {
    require_admin(users, caller).await?;
    if data.email.trim().is_empty() {
        return Err(AppError::Validation("email is required".into()));
    }

    let id = identity
        .create_identity(&data.email, data.display_name.as_deref())
        .await?;
    let profile = UserProfile {
        id,
        email: data.email,
        display_name: data.display_name,
        role: data.role.unwrap_or(Role::Viewer),
        department: data.department,
        notifications: NotificationPrefs::default(),
        created_at: Utc::now(),
    };
    if let Err(e) = users.insert(&profile).await {
        // Roll back the credential so the email can be provisioned again.
        if let Err(cleanup) = identity.delete_identity(&profile.id).await {
            warn!(
                "Profile insert for {} failed and its identity could not be removed: {cleanup}",
                profile.id
            );
        }
        return Err(e.into());
    }
    info!("Provisioned user {} as {}", profile.id, profile.role);
    Ok(profile)
}

pub async fn update_user_role(
    users: &dyn UserStore,
    caller: &Session,
    target_id: &str,
    role: Role,
) -> Result<(), AppError> {
    require_admin(users, caller).await?;
    users.update_role(target_id, role).await?;
    info!("User {target_id} role set to {role} by {}", caller.user_id);
    Ok(())
}

/// Deletes the credential and then the profile. Contracts the user created
/// are left in place.
pub async fn delete_user(
    users: &dyn UserStore,
    identity: &dyn IdentityAdmin,
    caller: &Session,
    target_id: &str,
) -> Result<(), AppError> {
    require_admin(users, caller).await?;
    if target_id == caller.user_id {
        return Err(AppError::Validation("Cannot delete your own account".into()));
    }

    identity.delete_identity(target_id).await?;
    users.delete(target_id).await?;
    info!("Deleted user {target_id} (requested by {})", caller.user_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingIdentityAdmin {
        deleted: Mutex<Vec<String>>,
        fail_delete: bool,
    }

    #[async_trait]
    impl IdentityAdmin for RecordingIdentityAdmin {
        async fn create_identity(&self, email: &str, _: Option<&str>) -> Result<String, IdentityError> {
            Ok(format!("uid-{email}"))
        }

        async fn delete_identity(&self, user_id: &str) -> Result<(), IdentityError> {
            if self.fail_delete {
                return Err(IdentityError::Api {
                    status: 503,
                    message: "identity service unavailable".into(),
                });
            }
            self.deleted.lock().unwrap().push(user_id.to_string());
            Ok(())
        }
    }

    /// Reads from the wrapped store; every insert fails.
    struct RejectingInsertStore(MemoryUserStore);

    #[async_trait]
    impl UserStore for RejectingInsertStore {
        async fn get(&self, id: &str) -> Result<Option<UserProfile>, StoreError> {
            self.0.get(id).await
        }
        async fn list(&self) -> Result<Vec<UserProfile>, StoreError> {
            self.0.list().await
        }
        async fn insert(&self, _profile: &UserProfile) -> Result<(), StoreError> {
            Err(StoreError::Validation("email already registered".into()))
        }
        async fn update_role(&self, id: &str, role: Role) -> Result<(), StoreError> {
            self.0.update_role(id, role).await
        }
        async fn delete(&self, id: &str) -> Result<(), StoreError> {
            self.0.delete(id).await
        }
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            display_name: None,
            role: Some(Role::Editor),
            department: None,
        }
    }

    fn profile(id: &str, role: Role) -> UserProfile {
        UserProfile {
            id: id.into(),
            email: format!("{id}@example.com"),
            display_name: None,
            role,
            department: None,
            notifications: NotificationPrefs::default(),
            created_at: Utc::now(),
        }
    }

    fn session(id: &str, role: Option<Role>) -> Session {
        Session {
            user_id: id.into(),
            role,
        }
    }

    async fn seeded() -> MemoryUserStore {
        let store = MemoryUserStore::new();
        store.insert(&profile("admin", Role::Admin)).await.unwrap();
        store.insert(&profile("ed", Role::Editor)).await.unwrap();
        store
    }

    #[test]
    fn test_role_ordering() {
        assert!(Role::Viewer < Role::Editor && Role::Editor < Role::Admin);
        assert_eq!("editor".parse::<Role>(), Ok(Role::Editor));
    }

    #[tokio::test]
    async fn test_provision_defaults_to_viewer_with_default_notifications() {
        let store = seeded().await;
        let identity = RecordingIdentityAdmin::default();
        let created = provision_user(
            &store,
            &identity,
            &session("admin", Some(Role::Admin)),
            NewUser {
                email: "new@example.com".into(),
                display_name: Some("New Person".into()),
                role: None,
                department: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(created.id, "uid-new@example.com");
        assert_eq!(created.role, Role::Viewer);
        assert_eq!(created.notifications.alert_days_before, 30);
        assert!(store.get(&created.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_profile_insert_removes_new_identity() {
        let store = RejectingInsertStore(seeded().await);
        let identity = RecordingIdentityAdmin::default();
        let err = provision_user(
            &store,
            &identity,
            &session("admin", Some(Role::Admin)),
            new_user("dup@example.com"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Validation(ref m) if m == "email already registered"));
        assert_eq!(
            *identity.deleted.lock().unwrap(),
            vec!["uid-dup@example.com".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failed_rollback_still_returns_insert_error() {
        let store = RejectingInsertStore(seeded().await);
        let identity = RecordingIdentityAdmin {
            fail_delete: true,
            ..Default::default()
        };
        let err = provision_user(
            &store,
            &identity,
            &session("admin", Some(Role::Admin)),
            new_user("dup@example.com"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_user_checks_stored_role_not_session_claim() {
        let store = seeded().await;
        let identity = RecordingIdentityAdmin::default();
        // The session claims admin but the stored profile is an editor.
        let err = delete_user(&store, &identity, &session("ed", Some(Role::Admin)), "admin")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(identity.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_user_rejects_self_deletion() {
        let store = seeded().await;
        let identity = RecordingIdentityAdmin::default();
        let err = delete_user(&store, &identity, &session("admin", Some(Role::Admin)), "admin")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_user_removes_identity_then_profile() {
        let store = seeded().await;
        let identity = RecordingIdentityAdmin::default();
        delete_user(&store, &identity, &session("admin", Some(Role::Admin)), "ed")
            .await
            .unwrap();
        assert_eq!(*identity.deleted.lock().unwrap(), vec!["ed".to_string()]);
        assert!(store.get("ed").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_role_of_unknown_user_is_not_found() {
        let store = seeded().await;
        let err = update_user_role(&store, &session("admin", Some(Role::Admin)), "nobody", Role::Editor)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_http_identity_admin_surfaces_provider_errors() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/users/u-1"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such user"))
            .mount(&server)
            .await;

        let admin = HttpIdentityAdmin::new(server.uri(), "t".into());
        match admin.delete_identity("u-1").await {
            Err(IdentityError::Api { status, message }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "no such user");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }
}
