use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{Capability, Session};
use crate::contracts::dates::{
    cancellation_deadline, days_until, format_file_size, group_by_month, is_past_cancellation_deadline,
    month_labels, today, urgency_level, Urgency, EXPIRING_SOON_DAYS,
};
use crate::contracts::models::{
    Assessment, Contract, ContractFilter, ContractKind, ContractPatch, ContractStats, NewContract,
};
use crate::contracts::store;
use crate::crm;
use crate::errors::AppError;
use crate::state::AppState;
use crate::storage::document_key;

// ────────────────────────────────────────────────────────────────────────────
// Views
// ────────────────────────────────────────────────────────────────────────────

/// A contract plus the values derived from its dates as of today.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractView {
    #[serde(flatten)]
    pub contract: Contract,
    pub days_until_expiry: i64,
    pub urgency: Urgency,
    pub cancellation_deadline: Option<NaiveDate>,
    pub past_cancellation_deadline: bool,
}

impl ContractView {
    pub fn new(contract: Contract, today: NaiveDate) -> Self {
        let days = days_until(contract.end_date, today);
        let deadline = cancellation_deadline(
            Some(contract.end_date),
            Some(contract.cancellation_notice_days),
        );
        Self {
            days_until_expiry: days,
            urgency: urgency_level(days),
            cancellation_deadline: deadline,
            past_cancellation_deadline: is_past_cancellation_deadline(deadline, today),
            contract,
        }
    }
}

fn views(contracts: Vec<Contract>) -> Vec<ContractView> {
    let today = today();
    contracts
        .into_iter()
        .map(|c| ContractView::new(c, today))
        .collect()
}

/// Checks that the store does not enforce itself.
fn validate_terms(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    notice_days: Option<i32>,
    renewal_period: Option<i32>,
) -> Result<(), AppError> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(AppError::Validation(
                "endDate must be on or after startDate".into(),
            ));
        }
    }
    if notice_days.map_or(false, |d| d < 0) {
        return Err(AppError::Validation(
            "cancellationNoticeDays must not be negative".into(),
        ));
    }
    if renewal_period.map_or(false, |p| p <= 0) {
        return Err(AppError::Validation(
            "autoRenewalPeriod must be a positive number of years".into(),
        ));
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// CRUD
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/contracts
pub async fn handle_list_contracts(
    State(state): State<AppState>,
    _session: Session,
    Query(filter): Query<ContractFilter>,
) -> Result<Json<Vec<ContractView>>, AppError> {
    let contracts = state.contracts.list_contracts(&filter).await?;
    Ok(Json(views(contracts)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedContract {
    pub id: Uuid,
    pub contract: ContractView,
}

/// POST /api/v1/contracts
///
/// New customer contracts are pushed to the CRM straight away when it is
/// configured; a failed push only marks the contract's sync status.
pub async fn handle_create_contract(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<NewContract>,
) -> Result<(StatusCode, Json<CreatedContract>), AppError> {
    session.require(Capability::Create)?;
    validate_terms(
        req.start_date,
        req.end_date,
        Some(req.cancellation_notice_days),
        req.auto_renewal_period.filter(|_| req.auto_renewal),
    )?;

    let id = state.contracts.create_contract(req, &session.user_id).await?;
    let mut contract = state.contracts.get_contract(id).await?;

    if let (ContractKind::Customer, Some(gateway)) = (contract.kind, state.crm.as_ref()) {
        match crm::sync_and_record(state.contracts.as_ref(), gateway.as_ref(), &contract).await {
            Ok(outcome) => info!("Contract {id} synced to CRM as deal {}", outcome.freshsales_id),
            Err(e) => warn!("Contract {id} saved but CRM sync failed: {e}"),
        }
        contract = state.contracts.get_contract(id).await?;
    }

    Ok((
        StatusCode::CREATED,
        Json(CreatedContract {
            id,
            contract: ContractView::new(contract, today()),
        }),
    ))
}

/// GET /api/v1/contracts/:id
pub async fn handle_get_contract(
    State(state): State<AppState>,
    _session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<ContractView>, AppError> {
    let contract = state.contracts.get_contract(id).await?;
    Ok(Json(ContractView::new(contract, today())))
}

/// PATCH /api/v1/contracts/:id
pub async fn handle_update_contract(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(patch): Json<ContractPatch>,
) -> Result<Json<ContractView>, AppError> {
    session.require(Capability::Edit)?;
    let current = state.contracts.get_contract(id).await?;
    validate_terms(
        Some(patch.start_date.unwrap_or(current.start_date)),
        Some(patch.end_date.unwrap_or(current.end_date)),
        patch.cancellation_notice_days,
        patch.auto_renewal_period,
    )?;

    state.contracts.update_contract(id, patch).await?;
    let updated = state.contracts.get_contract(id).await?;
    Ok(Json(ContractView::new(updated, today())))
}

/// DELETE /api/v1/contracts/:id
pub async fn handle_delete_contract(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    session.require(Capability::Delete)?;
    state.contracts.delete_contract(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/contracts/:id/assessments
pub async fn handle_list_assessments(
    State(state): State<AppState>,
    _session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Assessment>>, AppError> {
    Ok(Json(state.contracts.list_assessments(id).await?))
}

// ────────────────────────────────────────────────────────────────────────────
// Deadlines and dashboard
// ────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ExpiringQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    #[serde(rename = "type")]
    pub kind: Option<ContractKind>,
}

/// GET /api/v1/contracts/expiring
/// Defaults to the next 90 days, capped at the last representable date.
pub async fn handle_list_expiring(
    State(state): State<AppState>,
    _session: Session,
    Query(q): Query<ExpiringQuery>,
) -> Result<Json<Vec<ContractView>>, AppError> {
    let from = q.from.unwrap_or_else(today);
    let to = match q.to {
        Some(to) => to,
        None => from
            .checked_add_signed(Duration::days(EXPIRING_SOON_DAYS))
            .unwrap_or(NaiveDate::MAX),
    };
    let contracts = state.contracts.list_expiring(from, to, q.kind).await?;
    Ok(Json(views(contracts)))
}

/// GET /api/v1/contracts/stats
pub async fn handle_stats(
    State(state): State<AppState>,
    _session: Session,
) -> Result<Json<ContractStats>, AppError> {
    let stats = store::get_stats(state.contracts.as_ref(), today()).await?;
    Ok(Json(stats))
}

#[derive(Deserialize)]
pub struct CalendarQuery {
    #[serde(rename = "type")]
    pub kind: Option<ContractKind>,
}

#[derive(Serialize)]
pub struct CalendarMonth {
    pub month: u32,
    pub label: String,
    pub contracts: Vec<ContractView>,
}

#[derive(Serialize)]
pub struct CalendarResponse {
    pub year: i32,
    pub months: Vec<CalendarMonth>,
}

/// GET /api/v1/calendar/:year
pub async fn handle_calendar(
    State(state): State<AppState>,
    _session: Session,
    Path(year): Path<i32>,
    Query(q): Query<CalendarQuery>,
) -> Result<Json<CalendarResponse>, AppError> {
    let filter = ContractFilter {
        kind: q.kind,
        ..Default::default()
    };
    let contracts = state.contracts.list_contracts(&filter).await?;
    let buckets = group_by_month(&contracts, year);
    let today = today();

    let months = month_labels(year)
        .into_iter()
        .zip(buckets)
        .enumerate()
        .map(|(i, (label, bucket))| CalendarMonth {
            month: i as u32 + 1,
            label,
            contracts: bucket
                .into_iter()
                .map(|c| ContractView::new(c.clone(), today))
                .collect(),
        })
        .collect();

    Ok(Json(CalendarResponse { year, months }))
}

// ────────────────────────────────────────────────────────────────────────────
// Document upload
// ────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub document_url: String,
    pub document_name: String,
    pub document_size: i64,
    pub formatted_size: String,
}

/// POST /api/v1/contracts/:id/document
///
/// Stores the multipart `file` field, then records it on the contract. Both
/// steps are keyed by contract id and file name, so a retry overwrites
/// rather than duplicates.
pub async fn handle_upload_document(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    session.require(Capability::Edit)?;
    // Fail fast on unknown ids before reading the body.
    state.contracts.get_contract(id).await?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| AppError::Validation("file name is required".into()))?;
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(e.to_string()))?;
        upload = Some((file_name, content_type, bytes.to_vec()));
        break;
    }
    let (file_name, content_type, bytes) =
        upload.ok_or_else(|| AppError::Validation("multipart field 'file' is required".into()))?;
    if bytes.is_empty() {
        return Err(AppError::Validation("uploaded file is empty".into()));
    }

    let size = bytes.len();
    let key = document_key(id, &file_name);
    let url = state.documents.put(&key, bytes, &content_type).await?;

    state
        .contracts
        .update_contract(
            id,
            ContractPatch {
                document_url: Some(url.clone()),
                document_name: Some(file_name.clone()),
                document_size: Some(size as i64),
                document_path: Some(key),
                uploaded_at: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await?;
    info!("Stored document '{file_name}' for contract {id}");

    Ok(Json(UploadResponse {
        document_url: url,
        document_name: file_name,
        document_size: size as i64,
        formatted_size: format_file_size(size as u64),
    }))
}
