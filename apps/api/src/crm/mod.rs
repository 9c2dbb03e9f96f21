//! CRM Sync Adapter: mirrors customer contracts into Freshsales as a contact
//! plus a deal. Re-syncing a contract updates the deal recorded in
//! `freshsales_id` instead of creating a new one.

pub mod freshsales;
pub mod handlers;
pub mod mapping;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::contracts::models::{Contract, ContractFilter, ContractKind, ContractPatch, SyncStatus};
use crate::contracts::store::{ContractStore, StoreError};
use crate::crm::mapping::{contact_payload, deal_payload, ContactPayload, DealPayload};

#[derive(Debug, Error)]
pub enum CrmError {
    #[error("Only customer contracts can be synced to Freshsales")]
    NotCustomer,

    #[error("CRM integration is not configured")]
    NotConfigured,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to {action} in Freshsales: {status_text}")]
    Api {
        action: String,
        status: u16,
        status_text: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub connected: bool,
    pub status: u16,
    pub message: String,
}

#[async_trait]
pub trait CrmGateway: Send + Sync {
    /// Id of the first contact matching `name`, if any.
    async fn search_contact(&self, name: &str) -> Result<Option<String>, CrmError>;
    async fn create_contact(&self, contact: &ContactPayload) -> Result<String, CrmError>;
    /// Updates `existing_id` when given, otherwise creates. Returns the deal id.
    async fn upsert_deal(&self, deal: &DealPayload, existing_id: Option<&str>) -> Result<String, CrmError>;
    async fn get_deal(&self, id: u64) -> Result<Value, CrmError>;
    async fn test_connection(&self) -> Result<ConnectionStatus, CrmError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub freshsales_id: String,
    pub contact_id: String,
}

/// Finds or creates the contact, then upserts the deal.
pub async fn sync_contract(gateway: &dyn CrmGateway, contract: &Contract) -> Result<SyncOutcome, CrmError> {
    if contract.kind != ContractKind::Customer {
        return Err(CrmError::NotCustomer);
    }

    let existing = match gateway.search_contact(&contract.name).await {
        Ok(found) => found,
        Err(e) => {
            warn!("Freshsales contact search for '{}' failed, creating a new contact: {e}", contract.name);
            None
        }
    };
    let contact_id = match existing {
        Some(id) => id,
        None => gateway.create_contact(&contact_payload(contract)).await?,
    };

    let deal = deal_payload(contract, &contact_id);
    let freshsales_id = gateway
        .upsert_deal(&deal, contract.freshsales_id.as_deref())
        .await?;

    Ok(SyncOutcome {
        freshsales_id,
        contact_id,
    })
}

/// Writes the outcome of a sync attempt back onto the contract.
pub async fn record_sync(
    store: &dyn ContractStore,
    contract_id: Uuid,
    result: &Result<SyncOutcome, CrmError>,
) -> Result<(), StoreError> {
    let patch = match result {
        Ok(outcome) => ContractPatch {
            freshsales_id: Some(outcome.freshsales_id.clone()),
            sync_status: Some(SyncStatus::Synced),
            last_synced_at: Some(Utc::now()),
            ..Default::default()
        },
        Err(_) => ContractPatch {
            sync_status: Some(SyncStatus::Error),
            ..Default::default()
        },
    };
    store.update_contract(contract_id, patch).await
}

/// Syncs one stored contract and records the result on it.
pub async fn sync_and_record(
    store: &dyn ContractStore,
    gateway: &dyn CrmGateway,
    contract: &Contract,
) -> Result<SyncOutcome, CrmError> {
    let result = sync_contract(gateway, contract).await;
    if let Err(e) = record_sync(store, contract.id, &result).await {
        warn!("Sync status for contract {} was not saved: {e}", contract.id);
    }
    result
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailure {
    pub contract_id: Uuid,
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSyncReport {
    pub synced: usize,
    pub errors: usize,
    pub failures: Vec<SyncFailure>,
}

/// Syncs every customer contract with at most `concurrency` in flight. With
/// a concurrency of 1 contracts are processed one at a time in list order.
/// A failure is counted and never stops the batch.
pub async fn sync_all(
    store: &dyn ContractStore,
    gateway: &dyn CrmGateway,
    concurrency: usize,
) -> Result<BulkSyncReport, StoreError> {
    let filter = ContractFilter {
        kind: Some(ContractKind::Customer),
        ..Default::default()
    };
    let contracts = store.list_contracts(&filter).await?;
    info!(
        "Bulk sync of {} customer contracts (concurrency={concurrency})",
        contracts.len()
    );

    let results: Vec<(Contract, Result<SyncOutcome, CrmError>)> = stream::iter(contracts)
        .map(|contract| async move {
            let result = sync_and_record(store, gateway, &contract).await;
            (contract, result)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let report = results
        .into_iter()
        .fold(BulkSyncReport::default(), |mut report, (contract, result)| {
            match result {
                Ok(_) => report.synced += 1,
                Err(e) => {
                    report.errors += 1;
                    report.failures.push(SyncFailure {
                        contract_id: contract.id,
                        name: contract.name,
                        error: e.to_string(),
                    });
                }
            }
            report
        });

    info!(
        "Bulk sync complete: {} synced, {} errors",
        report.synced, report.errors
    );
    Ok(report)
}
