use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;

/// Raw `users` row, keyed by the identity provider's user id.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
    pub department: Option<String>,
    pub notifications: Value,
    pub created_at: DateTime<Utc>,
}
