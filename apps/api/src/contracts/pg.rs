use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;
use uuid::Uuid;

use crate::contracts::models::{
    Assessment, Contract, ContractFilter, ContractKind, ContractPatch, NewContract,
};
use crate::contracts::store::{ContractStore, StoreError};
use crate::models::contract::{AssessmentRow, ContractRow};

/// Postgres-backed contract repository.
#[derive(Clone)]
pub struct PgContractStore {
    pool: PgPool,
}

impl PgContractStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, c: &Contract) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO contracts
                (id, name, description, kind, area, type_of_contract, users_or_account_number,
                 requested_from, contract_type, service_type, customer_id, start_date, end_date,
                 date_signed, initial_expiration_date, auto_renewal, auto_renewal_period,
                 cancellation_notice_days, assessed, risk_level, assessment_summary, assessment_id,
                 document_url, document_name, document_size, document_path, uploaded_at,
                 freshsales_id, sync_status, last_synced_at, status, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32, $33, $34)
            "#,
        )
        .bind(c.id)
        .bind(&c.name)
        .bind(&c.description)
        .bind(c.kind.as_str())
        .bind(&c.area)
        .bind(&c.type_of_contract)
        .bind(&c.users_or_account_number)
        .bind(&c.requested_from)
        .bind(c.contract_type.map(|t| t.as_str()))
        .bind(&c.service_type)
        .bind(&c.customer_id)
        .bind(c.start_date)
        .bind(c.end_date)
        .bind(c.date_signed)
        .bind(c.initial_expiration_date)
        .bind(c.auto_renewal)
        .bind(c.auto_renewal_period)
        .bind(c.cancellation_notice_days)
        .bind(c.assessed)
        .bind(c.risk_level.map(|r| r.as_str()))
        .bind(&c.assessment_summary)
        .bind(c.assessment_id)
        .bind(&c.document_url)
        .bind(&c.document_name)
        .bind(c.document_size)
        .bind(&c.document_path)
        .bind(c.uploaded_at)
        .bind(&c.freshsales_id)
        .bind(c.sync_status.map(|s| s.as_str()))
        .bind(c.last_synced_at)
        .bind(c.status.as_str())
        .bind(&c.created_by)
        .bind(c.created_at)
        .bind(c.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Rewrites the mutable columns of an existing row. Never inserts, so a
    /// contract deleted since it was read stays deleted.
    async fn update_row(&self, c: &Contract) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE contracts SET
                name = $2,
                description = $3,
                area = $4,
                type_of_contract = $5,
                users_or_account_number = $6,
                requested_from = $7,
                contract_type = $8,
                service_type = $9,
                customer_id = $10,
                start_date = $11,
                end_date = $12,
                date_signed = $13,
                initial_expiration_date = $14,
                auto_renewal = $15,
                auto_renewal_period = $16,
                cancellation_notice_days = $17,
                assessed = $18,
                risk_level = $19,
                assessment_summary = $20,
                assessment_id = $21,
                document_url = $22,
                document_name = $23,
                document_size = $24,
                document_path = $25,
                uploaded_at = $26,
                freshsales_id = $27,
                sync_status = $28,
                last_synced_at = $29,
                status = $30,
                updated_at = $31
            WHERE id = $1
            "#,
        )
        .bind(c.id)
        .bind(&c.name)
        .bind(&c.description)
        .bind(&c.area)
        .bind(&c.type_of_contract)
        .bind(&c.users_or_account_number)
        .bind(&c.requested_from)
        .bind(c.contract_type.map(|t| t.as_str()))
        .bind(&c.service_type)
        .bind(&c.customer_id)
        .bind(c.start_date)
        .bind(c.end_date)
        .bind(c.date_signed)
        .bind(c.initial_expiration_date)
        .bind(c.auto_renewal)
        .bind(c.auto_renewal_period)
        .bind(c.cancellation_notice_days)
        .bind(c.assessed)
        .bind(c.risk_level.map(|r| r.as_str()))
        .bind(&c.assessment_summary)
        .bind(c.assessment_id)
        .bind(&c.document_url)
        .bind(&c.document_name)
        .bind(c.document_size)
        .bind(&c.document_path)
        .bind(c.uploaded_at)
        .bind(&c.freshsales_id)
        .bind(c.sync_status.map(|s| s.as_str()))
        .bind(c.last_synced_at)
        .bind(c.status.as_str())
        .bind(c.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::contract_not_found(c.id));
        }
        Ok(())
    }
}

#[async_trait]
impl ContractStore for PgContractStore {
    async fn create_contract(&self, data: NewContract, owner_id: &str) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let contract = data.into_contract(id, owner_id, Utc::now())?;
        self.insert(&contract).await?;
        info!("Created {} contract {id} for user {owner_id}", contract.kind);
        Ok(id)
    }

    async fn update_contract(&self, id: Uuid, patch: ContractPatch) -> Result<(), StoreError> {
        let mut contract = self.get_contract(id).await?;
        contract.apply(patch, Utc::now());
        self.update_row(&contract).await
    }

    async fn get_contract(&self, id: Uuid) -> Result<Contract, StoreError> {
        let row: Option<ContractRow> = sqlx::query_as("SELECT * FROM contracts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or_else(|| StoreError::contract_not_found(id))?
            .try_into()
    }

    async fn list_contracts(&self, filter: &ContractFilter) -> Result<Vec<Contract>, StoreError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM contracts WHERE TRUE");
        if let Some(kind) = filter.kind {
            qb.push(" AND kind = ").push_bind(kind.as_str());
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(contract_type) = filter.contract_type {
            qb.push(" AND contract_type = ")
                .push_bind(contract_type.as_str());
        }
        if let Some(customer_id) = &filter.customer_id {
            qb.push(" AND customer_id = ").push_bind(customer_id.clone());
        }
        qb.push(" ORDER BY end_date ASC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows: Vec<ContractRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(Contract::try_from).collect()
    }

    async fn list_expiring(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        kind: Option<ContractKind>,
    ) -> Result<Vec<Contract>, StoreError> {
        let rows: Vec<ContractRow> = sqlx::query_as(
            r#"
            SELECT * FROM contracts
            WHERE status = 'active'
              AND end_date >= $1 AND end_date <= $2
              AND ($3::TEXT IS NULL OR kind = $3)
            ORDER BY end_date ASC
            "#,
        )
        .bind(from)
        .bind(to)
        .bind(kind.map(|k| k.as_str()))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Contract::try_from).collect()
    }

    async fn delete_contract(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM contracts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::contract_not_found(id));
        }
        info!("Deleted contract {id}");
        Ok(())
    }

    async fn insert_assessment(&self, a: &Assessment) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO assessments
                (id, contract_id, summary, risk_level, findings, key_terms,
                 assessment_criteria, model_used, assessed_by, assessed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(a.id)
        .bind(a.contract_id)
        .bind(&a.summary)
        .bind(a.risk_level.as_str())
        .bind(serde_json::to_value(&a.findings)?)
        .bind(serde_json::to_value(&a.key_terms)?)
        .bind(&a.assessment_criteria)
        .bind(&a.model_used)
        .bind(&a.assessed_by)
        .bind(a.assessed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_assessment(&self, id: Uuid) -> Result<Assessment, StoreError> {
        let row: Option<AssessmentRow> = sqlx::query_as("SELECT * FROM assessments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or_else(|| StoreError::assessment_not_found(id))?
            .try_into()
    }

    async fn list_assessments(&self, contract_id: Uuid) -> Result<Vec<Assessment>, StoreError> {
        let rows: Vec<AssessmentRow> = sqlx::query_as(
            "SELECT * FROM assessments WHERE contract_id = $1 ORDER BY assessed_at DESC",
        )
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Assessment::try_from).collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Row decoding
// ────────────────────────────────────────────────────────────────────────────

fn parse_text<T: std::str::FromStr<Err = String>>(value: &str) -> Result<T, StoreError> {
    value.parse::<T>().map_err(StoreError::Corrupt)
}

fn parse_opt<T: std::str::FromStr<Err = String>>(value: Option<String>) -> Result<Option<T>, StoreError> {
    value.as_deref().map(parse_text).transpose()
}

impl TryFrom<ContractRow> for Contract {
    type Error = StoreError;

    fn try_from(row: ContractRow) -> Result<Self, Self::Error> {
        Ok(Contract {
            id: row.id,
            name: row.name,
            description: row.description,
            kind: parse_text(&row.kind)?,
            area: row.area,
            type_of_contract: row.type_of_contract,
            users_or_account_number: row.users_or_account_number,
            requested_from: row.requested_from,
            contract_type: parse_opt(row.contract_type)?,
            service_type: row.service_type,
            customer_id: row.customer_id,
            start_date: row.start_date,
            end_date: row.end_date,
            date_signed: row.date_signed,
            initial_expiration_date: row.initial_expiration_date,
            auto_renewal: row.auto_renewal,
            auto_renewal_period: row.auto_renewal_period,
            cancellation_notice_days: row.cancellation_notice_days,
            assessed: row.assessed,
            risk_level: parse_opt(row.risk_level)?,
            assessment_summary: row.assessment_summary,
            assessment_id: row.assessment_id,
            document_url: row.document_url,
            document_name: row.document_name,
            document_size: row.document_size,
            document_path: row.document_path,
            uploaded_at: row.uploaded_at,
            freshsales_id: row.freshsales_id,
            sync_status: parse_opt(row.sync_status)?,
            last_synced_at: row.last_synced_at,
            status: parse_text(&row.status)?,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<AssessmentRow> for Assessment {
    type Error = StoreError;

    fn try_from(row: AssessmentRow) -> Result<Self, Self::Error> {
        Ok(Assessment {
            id: row.id,
            contract_id: row.contract_id,
            summary: row.summary,
            risk_level: parse_text(&row.risk_level)?,
            findings: serde_json::from_value(row.findings)?,
            key_terms: serde_json::from_value(row.key_terms)?,
            assessment_criteria: row.assessment_criteria,
            model_used: row.model_used,
            assessed_by: row.assessed_by,
            assessed_at: row.assessed_at,
        })
    }
}
