use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::contracts::store::StoreError;

/// Declares a lowercase, string-backed enum with `as_str` / `FromStr` so the
/// same spelling is used on the wire (serde) and in TEXT columns.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(
    /// Contract discriminant. Immutable after creation.
    ContractKind { Vendor => "vendor", Customer => "customer" }
);

text_enum!(
    /// Agreement shape of a customer contract.
    CustomerContractType {
        Msa => "msa",
        Nda => "nda",
        Service => "service",
        Project => "project",
    }
);

text_enum!(
    /// Used for contract risk, finding severity and comparison impact.
    RiskLevel { Low => "low", Medium => "medium", High => "high" }
);

text_enum!(
    SyncStatus { Pending => "pending", Synced => "synced", Error => "error" }
);

text_enum!(
    ContractStatus {
        Active => "active",
        Pending => "pending",
        Expired => "expired",
        Cancelled => "cancelled",
    }
);

text_enum!(
    FindingKind { Concern => "concern", Warning => "warning", Info => "info" }
);

// ────────────────────────────────────────────────────────────────────────────
// Contract
// ────────────────────────────────────────────────────────────────────────────

/// One tracked vendor or customer agreement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: ContractKind,

    // Vendor-only
    pub area: Option<String>,
    pub type_of_contract: Option<String>,
    pub users_or_account_number: Option<String>,
    pub requested_from: Option<String>,

    // Customer-only
    pub contract_type: Option<CustomerContractType>,
    pub service_type: Vec<String>,
    pub customer_id: Option<String>,

    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub date_signed: Option<NaiveDate>,
    pub initial_expiration_date: Option<NaiveDate>,

    pub auto_renewal: bool,
    /// Years. Always `None` when `auto_renewal` is false.
    pub auto_renewal_period: Option<i32>,
    pub cancellation_notice_days: i32,

    pub assessed: bool,
    pub risk_level: Option<RiskLevel>,
    pub assessment_summary: Option<String>,
    pub assessment_id: Option<Uuid>,

    pub document_url: Option<String>,
    pub document_name: Option<String>,
    pub document_size: Option<i64>,
    pub document_path: Option<String>,
    pub uploaded_at: Option<DateTime<Utc>>,

    // Customer-only CRM linkage
    pub freshsales_id: Option<String>,
    pub sync_status: Option<SyncStatus>,
    pub last_synced_at: Option<DateTime<Utc>>,

    pub status: ContractStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    pub fn is_customer(&self) -> bool {
        self.kind == ContractKind::Customer
    }

    /// Merges a partial update. `updated_at` is always refreshed and the
    /// auto-renewal invariant is re-applied after the merge.
    pub fn apply(&mut self, patch: ContractPatch, now: DateTime<Utc>) {
        let ContractPatch {
            name,
            description,
            area,
            type_of_contract,
            users_or_account_number,
            requested_from,
            contract_type,
            service_type,
            customer_id,
            start_date,
            end_date,
            date_signed,
            initial_expiration_date,
            auto_renewal,
            auto_renewal_period,
            cancellation_notice_days,
            status,
            assessed,
            risk_level,
            assessment_summary,
            assessment_id,
            document_url,
            document_name,
            document_size,
            document_path,
            uploaded_at,
            freshsales_id,
            sync_status,
            last_synced_at,
        } = patch;

        if let Some(v) = name {
            self.name = v;
        }
        if let Some(v) = description {
            self.description = Some(v);
        }
        if let Some(v) = area {
            self.area = Some(v);
        }
        if let Some(v) = type_of_contract {
            self.type_of_contract = Some(v);
        }
        if let Some(v) = users_or_account_number {
            self.users_or_account_number = Some(v);
        }
        if let Some(v) = requested_from {
            self.requested_from = Some(v);
        }
        if let Some(v) = contract_type {
            self.contract_type = Some(v);
        }
        if let Some(v) = service_type {
            self.service_type = v;
        }
        if let Some(v) = customer_id {
            self.customer_id = Some(v);
        }
        if let Some(v) = start_date {
            self.start_date = v;
        }
        if let Some(v) = end_date {
            self.end_date = v;
        }
        if let Some(v) = date_signed {
            self.date_signed = Some(v);
        }
        if let Some(v) = initial_expiration_date {
            self.initial_expiration_date = Some(v);
        }
        if let Some(v) = auto_renewal {
            self.auto_renewal = v;
        }
        if let Some(v) = auto_renewal_period {
            self.auto_renewal_period = Some(v);
        }
        if let Some(v) = cancellation_notice_days {
            self.cancellation_notice_days = v;
        }
        if let Some(v) = status {
            self.status = v;
        }
        if let Some(v) = assessed {
            self.assessed = v;
        }
        if let Some(v) = risk_level {
            self.risk_level = Some(v);
        }
        if let Some(v) = assessment_summary {
            self.assessment_summary = Some(v);
        }
        if let Some(v) = assessment_id {
            self.assessment_id = Some(v);
        }
        if let Some(v) = document_url {
            self.document_url = Some(v);
        }
        if let Some(v) = document_name {
            self.document_name = Some(v);
        }
        if let Some(v) = document_size {
            self.document_size = Some(v);
        }
        if let Some(v) = document_path {
            self.document_path = Some(v);
        }
        if let Some(v) = uploaded_at {
            self.uploaded_at = Some(v);
        }
        if let Some(v) = freshsales_id {
            self.freshsales_id = Some(v);
        }
        if let Some(v) = sync_status {
            self.sync_status = Some(v);
        }
        if let Some(v) = last_synced_at {
            self.last_synced_at = Some(v);
        }

        if !self.auto_renewal {
            self.auto_renewal_period = None;
        }
        if self.is_customer() {
            self.area = None;
            self.type_of_contract = None;
            self.users_or_account_number = None;
            self.requested_from = None;
        } else {
            self.contract_type = None;
            self.service_type.clear();
            self.freshsales_id = None;
            self.sync_status = None;
            self.last_synced_at = None;
        }
        self.updated_at = now;
    }
}

/// Caller-supplied fields for `create_contract`. The four required fields are
/// optional here so their absence surfaces as a validation error rather than
/// a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContract {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<ContractKind>,
    pub area: Option<String>,
    pub type_of_contract: Option<String>,
    pub users_or_account_number: Option<String>,
    pub requested_from: Option<String>,
    pub contract_type: Option<CustomerContractType>,
    #[serde(default)]
    pub service_type: Vec<String>,
    pub customer_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub date_signed: Option<NaiveDate>,
    pub initial_expiration_date: Option<NaiveDate>,
    #[serde(default)]
    pub auto_renewal: bool,
    pub auto_renewal_period: Option<i32>,
    #[serde(default)]
    pub cancellation_notice_days: i32,
    pub status: Option<ContractStatus>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl NewContract {
    /// Builds the stored record: status defaults to active, assessed=false,
    /// timestamps default to `now`, and fields irrelevant to the contract
    /// kind are dropped.
    pub fn into_contract(
        self,
        id: Uuid,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Contract, StoreError> {
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| StoreError::Validation("name is required".into()))?;
        let kind = self
            .kind
            .ok_or_else(|| StoreError::Validation("type is required".into()))?;
        let start_date = self
            .start_date
            .ok_or_else(|| StoreError::Validation("startDate is required".into()))?;
        let end_date = self
            .end_date
            .ok_or_else(|| StoreError::Validation("endDate is required".into()))?;

        let is_customer = kind == ContractKind::Customer;
        let created_at = self.created_at.unwrap_or(now);

        Ok(Contract {
            id,
            name,
            description: self.description,
            kind,
            area: self.area.filter(|_| !is_customer),
            type_of_contract: self.type_of_contract.filter(|_| !is_customer),
            users_or_account_number: self.users_or_account_number.filter(|_| !is_customer),
            requested_from: self.requested_from.filter(|_| !is_customer),
            contract_type: self.contract_type.filter(|_| is_customer),
            service_type: if is_customer { self.service_type } else { Vec::new() },
            customer_id: self.customer_id,
            start_date,
            end_date,
            date_signed: self.date_signed,
            initial_expiration_date: self.initial_expiration_date,
            auto_renewal: self.auto_renewal,
            auto_renewal_period: self.auto_renewal_period.filter(|_| self.auto_renewal),
            cancellation_notice_days: self.cancellation_notice_days,
            assessed: false,
            risk_level: None,
            assessment_summary: None,
            assessment_id: None,
            document_url: None,
            document_name: None,
            document_size: None,
            document_path: None,
            uploaded_at: None,
            freshsales_id: None,
            sync_status: is_customer.then_some(SyncStatus::Pending),
            last_synced_at: None,
            status: self.status.unwrap_or(ContractStatus::Active),
            created_by: owner_id.to_string(),
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
        })
    }
}

/// Partial update. `None` leaves a field untouched. Linkage fields owned by
/// the upload, assessment and sync flows are not accepted from clients.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub area: Option<String>,
    pub type_of_contract: Option<String>,
    pub users_or_account_number: Option<String>,
    pub requested_from: Option<String>,
    pub contract_type: Option<CustomerContractType>,
    pub service_type: Option<Vec<String>>,
    pub customer_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub date_signed: Option<NaiveDate>,
    pub initial_expiration_date: Option<NaiveDate>,
    pub auto_renewal: Option<bool>,
    pub auto_renewal_period: Option<i32>,
    pub cancellation_notice_days: Option<i32>,
    pub status: Option<ContractStatus>,
    #[serde(skip_deserializing)]
    pub assessed: Option<bool>,
    #[serde(skip_deserializing)]
    pub risk_level: Option<RiskLevel>,
    #[serde(skip_deserializing)]
    pub assessment_summary: Option<String>,
    #[serde(skip_deserializing)]
    pub assessment_id: Option<Uuid>,
    #[serde(skip_deserializing)]
    pub document_url: Option<String>,
    #[serde(skip_deserializing)]
    pub document_name: Option<String>,
    #[serde(skip_deserializing)]
    pub document_size: Option<i64>,
    #[serde(skip_deserializing)]
    pub document_path: Option<String>,
    #[serde(skip_deserializing)]
    pub uploaded_at: Option<DateTime<Utc>>,
    #[serde(skip_deserializing)]
    pub freshsales_id: Option<String>,
    #[serde(skip_deserializing)]
    pub sync_status: Option<SyncStatus>,
    #[serde(skip_deserializing)]
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Query filter for `list_contracts`. Results are ordered by end date.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractFilter {
    #[serde(rename = "type")]
    pub kind: Option<ContractKind>,
    pub status: Option<ContractStatus>,
    pub contract_type: Option<CustomerContractType>,
    pub customer_id: Option<String>,
    pub limit: Option<usize>,
}

impl ContractFilter {
    pub fn matches(&self, contract: &Contract) -> bool {
        self.kind.map_or(true, |k| contract.kind == k)
            && self.status.map_or(true, |s| contract.status == s)
            && self
                .contract_type
                .map_or(true, |t| contract.contract_type == Some(t))
            && self
                .customer_id
                .as_deref()
                .map_or(true, |c| contract.customer_id.as_deref() == Some(c))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Assessment
// ────────────────────────────────────────────────────────────────────────────

/// A single flagged issue within an assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FindingKind>,
    pub category: String,
    pub severity: RiskLevel,
    pub description: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub recommendation: Option<String>,
}

/// One AI-produced risk evaluation. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: Uuid,
    pub contract_id: Option<Uuid>,
    pub summary: String,
    pub risk_level: RiskLevel,
    pub findings: Vec<Finding>,
    pub key_terms: BTreeMap<String, String>,
    pub assessment_criteria: Vec<String>,
    pub model_used: Option<String>,
    pub assessed_by: String,
    pub assessed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAssessment {
    pub contract_id: Option<Uuid>,
    pub summary: String,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub key_terms: BTreeMap<String, String>,
    #[serde(default)]
    pub assessment_criteria: Vec<String>,
    pub model_used: Option<String>,
}

impl NewAssessment {
    pub fn into_assessment(self, id: Uuid, assessor_id: &str, now: DateTime<Utc>) -> Assessment {
        Assessment {
            id,
            contract_id: self.contract_id,
            summary: self.summary,
            risk_level: self.risk_level,
            findings: self.findings,
            key_terms: self.key_terms,
            assessment_criteria: self.assessment_criteria,
            model_used: self.model_used,
            assessed_by: assessor_id.to_string(),
            assessed_at: now,
        }
    }

    /// The secondary write applied to the owning contract.
    pub fn contract_linkage(&self, assessment_id: Uuid) -> ContractPatch {
        ContractPatch {
            assessed: Some(true),
            risk_level: Some(self.risk_level),
            assessment_summary: Some(self.summary.clone()),
            assessment_id: Some(assessment_id),
            ..Default::default()
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stats
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractStats {
    pub total: usize,
    pub vendor: usize,
    pub customer: usize,
    pub active: usize,
    pub expiring_soon: usize,
    pub high_risk: usize,
    pub auto_renewal: usize,
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_missing_required_fields_are_rejected() {
        let mut input = new_contract("Acme", ContractKind::Vendor, date(2027, 1, 1));
        input.end_date = None;
        let err = input
            .into_contract(Uuid::new_v4(), "u", Utc::now())
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(ref m) if m.contains("endDate")));

        let mut input = new_contract("  ", ContractKind::Vendor, date(2027, 1, 1));
        input.name = Some("  ".into());
        assert!(input.into_contract(Uuid::new_v4(), "u", Utc::now()).is_err());
    }

    #[test]
    fn test_auto_renewal_period_dropped_when_not_auto_renewing() {
        let mut input = new_contract("Globex", ContractKind::Customer, date(2027, 6, 30));
        input.auto_renewal = false;
        input.auto_renewal_period = Some(3);
        let contract = input.into_contract(Uuid::new_v4(), "u", Utc::now()).unwrap();
        assert_eq!(contract.auto_renewal_period, None);
    }

    #[test]
    fn test_defaults_on_create() {
        let contract = contract("Initech", ContractKind::Customer, date(2027, 1, 1));
        assert_eq!(contract.status, ContractStatus::Active);
        assert!(!contract.assessed);
        assert_eq!(contract.sync_status, Some(SyncStatus::Pending));
        assert_eq!(contract.created_at, contract.updated_at);
    }

    #[test]
    fn test_vendor_contract_drops_customer_fields() {
        let mut input = new_contract("Hooli", ContractKind::Vendor, date(2027, 1, 1));
        input.contract_type = Some(CustomerContractType::Nda);
        input.service_type = vec!["voice".into()];
        input.area = Some("IT".into());
        let contract = input.into_contract(Uuid::new_v4(), "u", Utc::now()).unwrap();
        assert_eq!(contract.contract_type, None);
        assert!(contract.service_type.is_empty());
        assert_eq!(contract.area.as_deref(), Some("IT"));
        assert_eq!(contract.sync_status, None);
    }

    #[test]
    fn test_patch_turning_off_auto_renewal_clears_period() {
        let mut input = new_contract("Umbrella", ContractKind::Vendor, date(2027, 1, 1));
        input.auto_renewal = true;
        input.auto_renewal_period = Some(2);
        let mut contract = input.into_contract(Uuid::new_v4(), "u", Utc::now()).unwrap();
        assert_eq!(contract.auto_renewal_period, Some(2));

        let later = contract.updated_at + chrono::Duration::seconds(5);
        contract.apply(
            ContractPatch {
                auto_renewal: Some(false),
                ..Default::default()
            },
            later,
        );
        assert_eq!(contract.auto_renewal_period, None);
        assert_eq!(contract.updated_at, later);
    }

    #[test]
    fn test_patch_ignores_client_supplied_linkage_fields() {
        let patch: ContractPatch = serde_json::from_value(serde_json::json!({
            "name": "Renamed",
            "assessed": true,
            "freshsalesId": "999"
        }))
        .unwrap();
        assert_eq!(patch.name.as_deref(), Some("Renamed"));
        assert_eq!(patch.assessed, None);
        assert_eq!(patch.freshsales_id, None);
    }

    #[test]
    fn test_filter_matches_on_every_supplied_field() {
        let mut c = contract("Acme", ContractKind::Customer, date(2027, 1, 1));
        c.customer_id = Some("cust-7".into());
        let filter = ContractFilter {
            kind: Some(ContractKind::Customer),
            contract_type: Some(CustomerContractType::Msa),
            customer_id: Some("cust-7".into()),
            ..Default::default()
        };
        assert!(filter.matches(&c));

        let other = ContractFilter {
            customer_id: Some("cust-8".into()),
            ..Default::default()
        };
        assert!(!other.matches(&c));
    }

    #[test]
    fn test_contract_serializes_kind_as_type() {
        let c = contract("Acme", ContractKind::Vendor, date(2027, 1, 1));
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["type"], "vendor");
        assert_eq!(json["endDate"], "2027-01-01");
        assert!(json.get("cancellationNoticeDays").is_some());
    }

    #[test]
    fn test_text_enum_round_trips_through_str() {
        assert_eq!("msa".parse::<CustomerContractType>(), Ok(CustomerContractType::Msa));
        assert_eq!(RiskLevel::High.as_str(), "high");
        assert!("urgent".parse::<RiskLevel>().is_err());
    }
}
