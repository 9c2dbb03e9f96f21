//! Contract Repository: the persistence seam for contracts and assessments.
//!
//! `AppState` carries an `Arc<dyn ContractStore>`: `PgContractStore` in
//! production, `MemoryContractStore` when no database is configured and in tests.
//! Operations that span several records (`save_assessment`, `get_stats`) are
//! written once against the trait.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::contracts::dates::{days_until, EXPIRING_SOON_DAYS};
use crate::contracts::models::{
    Assessment, Contract, ContractFilter, ContractKind, ContractPatch, ContractStats,
    ContractStatus, NewAssessment, NewContract, RiskLevel,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored record is malformed: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn contract_not_found(id: Uuid) -> Self {
        StoreError::NotFound(format!("Contract {id} not found"))
    }

    pub fn assessment_not_found(id: Uuid) -> Self {
        StoreError::NotFound(format!("Assessment {id} not found"))
    }
}

#[async_trait]
pub trait ContractStore: Send + Sync {
    /// Stores a new contract and returns its store-assigned id.
    async fn create_contract(&self, data: NewContract, owner_id: &str) -> Result<Uuid, StoreError>;

    /// Merges `patch` into an existing contract, refreshing `updated_at`.
    async fn update_contract(&self, id: Uuid, patch: ContractPatch) -> Result<(), StoreError>;

    async fn get_contract(&self, id: Uuid) -> Result<Contract, StoreError>;

    /// Ordered ascending by end date; `filter.limit` truncates.
    async fn list_contracts(&self, filter: &ContractFilter) -> Result<Vec<Contract>, StoreError>;

    /// Active contracts whose end date lies in `[from, to]`, ascending by end date.
    async fn list_expiring(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        kind: Option<ContractKind>,
    ) -> Result<Vec<Contract>, StoreError>;

    /// Removes the contract record only. Its stored document and assessments stay.
    async fn delete_contract(&self, id: Uuid) -> Result<(), StoreError>;

    async fn insert_assessment(&self, assessment: &Assessment) -> Result<(), StoreError>;

    async fn get_assessment(&self, id: Uuid) -> Result<Assessment, StoreError>;

    /// Assessment history for one contract, newest first.
    async fn list_assessments(&self, contract_id: Uuid) -> Result<Vec<Assessment>, StoreError>;
}

/// Inserts an assessment, then links it to its contract.
///
/// The two writes are not atomic: if the contract update fails the assessment
/// stays as an orphan and the error is only logged. Re-running the linkage is
/// safe because it sets the same fields to the same values.
pub async fn save_assessment(
    store: &dyn ContractStore,
    data: NewAssessment,
    assessor_id: &str,
) -> Result<Uuid, StoreError> {
    let id = Uuid::new_v4();
    let linkage = data.contract_id.map(|cid| (cid, data.contract_linkage(id)));
    let assessment = data.into_assessment(id, assessor_id, Utc::now());

    store.insert_assessment(&assessment).await?;
    info!("Saved assessment {id} (risk={})", assessment.risk_level);

    if let Some((contract_id, patch)) = linkage {
        if let Err(e) = store.update_contract(contract_id, patch).await {
            warn!("Assessment {id} saved but contract {contract_id} was not updated: {e}");
        }
    }

    Ok(id)
}

/// Loads the full contract set and folds the dashboard counters.
pub async fn get_stats(store: &dyn ContractStore, today: NaiveDate) -> Result<ContractStats, StoreError> {
    let contracts = store.list_contracts(&ContractFilter::default()).await?;
    Ok(compute_stats(&contracts, today))
}

pub fn compute_stats(contracts: &[Contract], today: NaiveDate) -> ContractStats {
    contracts.iter().fold(ContractStats::default(), |mut stats, c| {
        stats.total += 1;
        match c.kind {
            ContractKind::Vendor => stats.vendor += 1,
            ContractKind::Customer => stats.customer += 1,
        }
        if c.status == ContractStatus::Active {
            stats.active += 1;
        }
        let days = days_until(c.end_date, today);
        if days > 0 && days <= EXPIRING_SOON_DAYS {
            stats.expiring_soon += 1;
        }
        if c.risk_level == Some(RiskLevel::High) {
            stats.high_risk += 1;
        }
        if c.auto_renewal {
            stats.auto_renewal += 1;
        }
        stats
    })
}
