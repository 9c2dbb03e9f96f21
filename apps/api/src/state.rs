use std::sync::Arc;

use crate::auth::users::{IdentityAdmin, UserStore};
use crate::config::Config;
use crate::contracts::store::ContractStore;
use crate::crm::CrmGateway;
use crate::extraction::TextExtractor;
use crate::llm_client::LlmClient;
use crate::storage::DocumentStorage;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Postgres-backed, or in-memory when `DATABASE_URL` is unset.
    pub contracts: Arc<dyn ContractStore>,
    pub users: Arc<dyn UserStore>,
    pub documents: Arc<dyn DocumentStorage>,
    pub llm: LlmClient,
    pub extractor: Arc<dyn TextExtractor>,
    /// `None` when Freshsales credentials are not configured.
    pub crm: Option<Arc<dyn CrmGateway>>,
    pub identity: Arc<dyn IdentityAdmin>,
    pub config: Config,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::auth::users::{MemoryUserStore, UnconfiguredIdentityAdmin};
    use crate::contracts::memory::MemoryContractStore;
    use crate::extraction::LibraryExtractor;
    use crate::storage::fixtures::MemoryDocumentStorage;

    pub const TEST_JWT_SECRET: &str = "test-secret";

    pub fn test_config() -> Config {
        Config {
            database_url: None,
            s3_bucket: "contracts".into(),
            s3_endpoint: "http://localhost:9000".into(),
            aws_access_key_id: "minio".into(),
            aws_secret_access_key: "minio".into(),
            anthropic_api_key: "test-key".into(),
            jwt_secret: TEST_JWT_SECRET.into(),
            freshsales: None,
            identity_admin: None,
            sync_concurrency: 1,
            max_upload_bytes: 1024 * 1024,
            port: 0,
            rust_log: "info".into(),
        }
    }

    /// Memory-backed state whose model calls go to `llm_base_url`.
    pub fn test_state(llm_base_url: &str) -> AppState {
        AppState {
            contracts: Arc::new(MemoryContractStore::new()),
            users: Arc::new(MemoryUserStore::new()),
            documents: Arc::new(MemoryDocumentStorage::default()),
            llm: LlmClient::with_base_url("test-key".into(), llm_base_url.into()),
            extractor: Arc::new(LibraryExtractor),
            crm: None,
            identity: Arc::new(UnconfiguredIdentityAdmin),
            config: test_config(),
        }
    }
}
