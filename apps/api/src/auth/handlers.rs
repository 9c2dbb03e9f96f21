use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::users::{self, NewUser, Role, UserProfile};
use crate::auth::{Capability, Permissions, Session};
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user_id: String,
    pub role: Option<Role>,
    pub profile: Option<UserProfile>,
    pub permissions: Permissions,
}

/// GET /api/v1/me
pub async fn handle_me(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<MeResponse>, AppError> {
    let profile = state.users.get(&session.user_id).await?;
    Ok(Json(MeResponse {
        permissions: session.permissions(),
        user_id: session.user_id,
        role: session.role,
        profile,
    }))
}

/// GET /api/v1/users
pub async fn handle_list_users(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<UserProfile>>, AppError> {
    session.require(Capability::ManageUsers)?;
    Ok(Json(state.users.list().await?))
}

/// POST /api/v1/users
pub async fn handle_create_user(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<NewUser>,
) -> Result<(StatusCode, Json<UserProfile>), AppError> {
    let profile =
        users::provision_user(state.users.as_ref(), state.identity.as_ref(), &session, req).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

#[derive(Deserialize)]
pub struct RoleUpdate {
    pub role: Role,
}

/// PATCH /api/v1/users/:id/role
pub async fn handle_update_role(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(req): Json<RoleUpdate>,
) -> Result<StatusCode, AppError> {
    users::update_user_role(state.users.as_ref(), &session, &id, req.role).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/users/:id
pub async fn handle_delete_user(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    users::delete_user(state.users.as_ref(), state.identity.as_ref(), &session, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
