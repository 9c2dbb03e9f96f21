mod assessment;
mod auth;
mod config;
mod contracts;
mod crm;
mod db;
mod errors;
mod extraction;
mod llm_client;
mod models;
mod routes;
mod state;
mod storage;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::auth::users::{
    HttpIdentityAdmin, IdentityAdmin, MemoryUserStore, PgUserStore, UnconfiguredIdentityAdmin,
    UserStore,
};
use crate::config::Config;
use crate::contracts::memory::MemoryContractStore;
use crate::contracts::pg::PgContractStore;
use crate::contracts::store::ContractStore;
use crate::crm::freshsales::FreshsalesClient;
use crate::crm::CrmGateway;
use crate::db::create_pool;
use crate::extraction::LibraryExtractor;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::S3DocumentStorage;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting contracts API v{}", env!("CARGO_PKG_VERSION"));

    // Contract and user stores: PostgreSQL when configured, in-process otherwise
    let (contracts, users): (Arc<dyn ContractStore>, Arc<dyn UserStore>) =
        match &config.database_url {
            Some(url) => {
                let pool = create_pool(url).await?;
                (
                    Arc::new(PgContractStore::new(pool.clone())),
                    Arc::new(PgUserStore::new(pool)),
                )
            }
            None => {
                warn!("DATABASE_URL not set; using the in-memory store (data is lost on restart)");
                (
                    Arc::new(MemoryContractStore::new()),
                    Arc::new(MemoryUserStore::new()),
                )
            }
        };

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    let documents = Arc::new(S3DocumentStorage::new(
        s3,
        config.s3_bucket.clone(),
        config.s3_endpoint.clone(),
    ));
    info!("Document storage initialized (bucket: {})", config.s3_bucket);

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone());
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let crm: Option<Arc<dyn CrmGateway>> = match &config.freshsales {
        Some(fs) => {
            info!("Freshsales CRM configured ({})", fs.domain);
            Some(Arc::new(FreshsalesClient::new(&fs.domain, fs.api_key.clone())))
        }
        None => {
            warn!("Freshsales credentials not set; CRM sync is disabled");
            None
        }
    };

    let identity: Arc<dyn IdentityAdmin> = match &config.identity_admin {
        Some(admin) => Arc::new(HttpIdentityAdmin::new(
            admin.base_url.clone(),
            admin.token.clone(),
        )),
        None => {
            warn!("IDENTITY_ADMIN_URL not set; user provisioning is disabled");
            Arc::new(UnconfiguredIdentityAdmin)
        }
    };

    let state = AppState {
        contracts,
        users,
        documents,
        llm,
        extractor: Arc::new(LibraryExtractor),
        crm,
        identity,
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "contracts-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    // Path-style addressing so MinIO buckets resolve without DNS.
    let s3_config = aws_sdk_s3::config::Builder::from(&s3_config)
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(s3_config)
}
