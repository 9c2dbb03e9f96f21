pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post},
    Router,
};

use crate::assessment::handlers as assessment;
use crate::auth::handlers as auth;
use crate::contracts::handlers as contracts;
use crate::crm::handlers as crm;
use crate::extraction::handlers as extraction;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);

    Router::new()
        .route("/health", get(health::health_handler))
        // Extraction gateway and model proxy
        .route("/api/extract-pdf-text", post(extraction::handle_extract_pdf))
        .route("/api/extract-docx-text", post(extraction::handle_extract_docx))
        .route("/api/anthropic", post(assessment::handle_model_proxy))
        // Session
        .route("/api/v1/me", get(auth::handle_me))
        // Contracts
        .route(
            "/api/v1/contracts",
            get(contracts::handle_list_contracts).post(contracts::handle_create_contract),
        )
        .route("/api/v1/contracts/expiring", get(contracts::handle_list_expiring))
        .route("/api/v1/contracts/stats", get(contracts::handle_stats))
        .route(
            "/api/v1/contracts/:id",
            get(contracts::handle_get_contract)
                .patch(contracts::handle_update_contract)
                .delete(contracts::handle_delete_contract),
        )
        .route(
            "/api/v1/contracts/:id/document",
            post(contracts::handle_upload_document),
        )
        .route(
            "/api/v1/contracts/:id/assessments",
            get(contracts::handle_list_assessments),
        )
        .route(
            "/api/v1/contracts/:id/assess",
            post(assessment::handle_assess_contract),
        )
        .route("/api/v1/contracts/:id/sync", post(crm::handle_sync_contract))
        .route("/api/v1/calendar/:year", get(contracts::handle_calendar))
        // Assessments and AI
        .route("/api/v1/assessments", post(assessment::handle_save_assessment))
        .route("/api/v1/assessments/analyze", post(assessment::handle_analyze))
        .route("/api/v1/assessments/:id", get(assessment::handle_get_assessment))
        .route("/api/v1/compare", post(assessment::handle_compare))
        .route("/api/v1/query", post(assessment::handle_query))
        // CRM
        .route("/api/v1/sync/customers", post(crm::handle_sync_all))
        .route("/api/v1/crm/status", get(crm::handle_crm_status))
        .route("/api/v1/crm/deals/:id", get(crm::handle_get_deal))
        // Users
        .route(
            "/api/v1/users",
            get(auth::handle_list_users).post(auth::handle_create_user),
        )
        .route("/api/v1/users/:id/role", patch(auth::handle_update_role))
        .route("/api/v1/users/:id", delete(auth::handle_delete_user))
        .layer(body_limit)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::state::fixtures::test_state;

    #[tokio::test]
    async fn test_health_needs_no_session() {
        let response = build_router(test_state("http://127.0.0.1:9"))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_contract_routes_need_a_session() {
        let response = build_router(test_state("http://127.0.0.1:9"))
            .oneshot(
                Request::builder()
                    .uri("/api/v1/contracts/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
