use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::auth::{Capability, Session};
use crate::crm::{self, BulkSyncReport, ConnectionStatus, CrmError, CrmGateway, SyncOutcome};
use crate::errors::AppError;
use crate::state::AppState;

fn gateway(state: &AppState) -> Result<Arc<dyn CrmGateway>, AppError> {
    state.crm.clone().ok_or_else(|| CrmError::NotConfigured.into())
}

/// POST /api/v1/contracts/:id/sync
pub async fn handle_sync_contract(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<SyncOutcome>, AppError> {
    session.require(Capability::Sync)?;
    let gateway = gateway(&state)?;
    let contract = state.contracts.get_contract(id).await?;
    let outcome = crm::sync_and_record(state.contracts.as_ref(), gateway.as_ref(), &contract).await?;
    Ok(Json(outcome))
}

/// POST /api/v1/sync/customers
pub async fn handle_sync_all(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<BulkSyncReport>, AppError> {
    session.require(Capability::Sync)?;
    let gateway = gateway(&state)?;
    let report = crm::sync_all(
        state.contracts.as_ref(),
        gateway.as_ref(),
        state.config.sync_concurrency,
    )
    .await?;
    Ok(Json(report))
}

/// GET /api/v1/crm/status
pub async fn handle_crm_status(
    State(state): State<AppState>,
    _session: Session,
) -> Result<Json<ConnectionStatus>, AppError> {
    let gateway = gateway(&state)?;
    Ok(Json(gateway.test_connection().await?))
}

/// GET /api/v1/crm/deals/:id
/// Freshsales deal ids are numeric; anything else is rejected before a URL
/// is built from it.
pub async fn handle_get_deal(
    State(state): State<AppState>,
    _session: Session,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id: u64 = id
        .parse()
        .map_err(|_| AppError::Validation(format!("Invalid deal id: {id}")))?;
    let gateway = gateway(&state)?;
    Ok(Json(gateway.get_deal(id).await?))
}
