use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Raw `contracts` row. Enumerations are lowercase TEXT and are decoded into
/// domain types by the store.
#[derive(Debug, Clone, FromRow)]
pub struct ContractRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub kind: String,
    pub area: Option<String>,
    pub type_of_contract: Option<String>,
    pub users_or_account_number: Option<String>,
    pub requested_from: Option<String>,
    pub contract_type: Option<String>,
    pub service_type: Vec<String>,
    pub customer_id: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub date_signed: Option<NaiveDate>,
    pub initial_expiration_date: Option<NaiveDate>,
    pub auto_renewal: bool,
    pub auto_renewal_period: Option<i32>,
    pub cancellation_notice_days: i32,
    pub assessed: bool,
    pub risk_level: Option<String>,
    pub assessment_summary: Option<String>,
    pub assessment_id: Option<Uuid>,
    pub document_url: Option<String>,
    pub document_name: Option<String>,
    pub document_size: Option<i64>,
    pub document_path: Option<String>,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub freshsales_id: Option<String>,
    pub sync_status: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub status: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AssessmentRow {
    pub id: Uuid,
    pub contract_id: Option<Uuid>,
    pub summary: String,
    pub risk_level: String,
    pub findings: Value,
    pub key_terms: Value,
    pub assessment_criteria: Vec<String>,
    pub model_used: Option<String>,
    pub assessed_by: String,
    pub assessed_at: DateTime<Utc>,
}
