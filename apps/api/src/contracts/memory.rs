//! In-process contract store. Used when no `DATABASE_URL` is configured
//! (local development) and as the backend for repository tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::contracts::models::{
    Assessment, Contract, ContractFilter, ContractKind, ContractPatch, ContractStatus, NewContract,
};
use crate::contracts::store::{ContractStore, StoreError};

#[derive(Default)]
pub struct MemoryContractStore {
    contracts: RwLock<HashMap<Uuid, Contract>>,
    assessments: RwLock<HashMap<Uuid, Assessment>>,
}

impl MemoryContractStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_by_end_date(mut contracts: Vec<Contract>) -> Vec<Contract> {
    contracts.sort_by_key(|c| c.end_date);
    contracts
}

#[async_trait]
impl ContractStore for MemoryContractStore {
    async fn create_contract(&self, data: NewContract, owner_id: &str) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let contract = data.into_contract(id, owner_id, Utc::now())?;
        self.contracts.write().await.insert(id, contract);
        Ok(id)
    }

    async fn update_contract(&self, id: Uuid, patch: ContractPatch) -> Result<(), StoreError> {
        let mut contracts = self.contracts.write().await;
        let contract = contracts
            .get_mut(&id)
            .ok_or_else(|| StoreError::contract_not_found(id))?;
        contract.apply(patch, Utc::now());
        Ok(())
    }

    async fn get_contract(&self, id: Uuid) -> Result<Contract, StoreError> {
        self.contracts
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::contract_not_found(id))
    }

    async fn list_contracts(&self, filter: &ContractFilter) -> Result<Vec<Contract>, StoreError> {
        let matching = self
            .contracts
            .read()
            .await
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        let mut contracts = sorted_by_end_date(matching);
        if let Some(limit) = filter.limit {
            contracts.truncate(limit);
        }
        Ok(contracts)
    }

    async fn list_expiring(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        kind: Option<ContractKind>,
    ) -> Result<Vec<Contract>, StoreError> {
        let matching = self
            .contracts
            .read()
            .await
            .values()
            .filter(|c| c.status == ContractStatus::Active)
            .filter(|c| c.end_date >= from && c.end_date <= to)
            .filter(|c| kind.map_or(true, |k| c.kind == k))
            .cloned()
            .collect();
        Ok(sorted_by_end_date(matching))
    }

    async fn delete_contract(&self, id: Uuid) -> Result<(), StoreError> {
        self.contracts
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::contract_not_found(id))
    }

    async fn insert_assessment(&self, assessment: &Assessment) -> Result<(), StoreError> {
        self.assessments
            .write()
            .await
            .insert(assessment.id, assessment.clone());
        Ok(())
    }

    async fn get_assessment(&self, id: Uuid) -> Result<Assessment, StoreError> {
        self.assessments
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::assessment_not_found(id))
    }

    async fn list_assessments(&self, contract_id: Uuid) -> Result<Vec<Assessment>, StoreError> {
        let mut history: Vec<Assessment> = self
            .assessments
            .read()
            .await
            .values()
            .filter(|a| a.contract_id == Some(contract_id))
            .cloned()
            .collect();
        history.sort_by(|a, b| b.assessed_at.cmp(&a.assessed_at));
        Ok(history)
    }
}
