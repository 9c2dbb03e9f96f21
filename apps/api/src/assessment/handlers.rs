use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::assessment::assess::{assess, AssessmentOutcome};
use crate::assessment::compare::{compare, contract_metadata, Comparison, ComparisonItem, Focus, Mode};
use crate::assessment::query::{query_contracts, QueryResult};
use crate::auth::{Capability, Session};
use crate::contracts::models::{Assessment, ContractFilter, ContractKind, NewAssessment};
use crate::contracts::store::save_assessment;
use crate::errors::AppError;
use crate::extraction::{DocumentFormat, SourceDocument};
use crate::state::AppState;

#[derive(Serialize)]
pub struct Created {
    pub id: Uuid,
}

fn decode(format: DocumentFormat, encoded: &str) -> Result<SourceDocument, AppError> {
    SourceDocument::from_base64(format, encoded).map_err(|e| AppError::Validation(e.to_string()))
}

// ────────────────────────────────────────────────────────────────────────────
// Assessment
// ────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub struct AssessRequest {
    #[serde(default)]
    pub criteria: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessResponse {
    pub assessment_id: Uuid,
    #[serde(flatten)]
    pub outcome: AssessmentOutcome,
}

/// POST /api/v1/contracts/:id/assess
/// Assesses the contract's stored document and links the result to it.
pub async fn handle_assess_contract(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
    body: Option<Json<AssessRequest>>,
) -> Result<Json<AssessResponse>, AppError> {
    session.require(Capability::Edit)?;
    let req = body.map(|Json(r)| r).unwrap_or_default();

    let contract = state.contracts.get_contract(id).await?;
    let key = contract
        .document_path
        .as_deref()
        .ok_or_else(|| AppError::Validation(format!("Contract {id} has no uploaded document")))?;
    let bytes = state.documents.get(key).await?;
    let format = DocumentFormat::from_file_name(contract.document_name.as_deref().unwrap_or(key));

    let outcome = assess(
        &state.llm,
        state.extractor.as_ref(),
        SourceDocument { format, bytes },
        &req.criteria,
    )
    .await?;

    let assessment_id = save_assessment(
        state.contracts.as_ref(),
        outcome.clone().into_new_assessment(Some(id)),
        &session.user_id,
    )
    .await?;
    info!("Contract {id} assessed as {}", outcome.analysis.risk_level);

    Ok(Json(AssessResponse {
        assessment_id,
        outcome,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub document_base64: String,
    pub format: DocumentFormat,
    #[serde(default)]
    pub criteria: Vec<String>,
}

/// POST /api/v1/assessments/analyze
/// Assesses an ad-hoc document without persisting anything.
pub async fn handle_analyze(
    State(state): State<AppState>,
    _session: Session,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AssessmentOutcome>, AppError> {
    let document = decode(req.format, &req.document_base64)?;
    let outcome = assess(&state.llm, state.extractor.as_ref(), document, &req.criteria).await?;
    Ok(Json(outcome))
}

/// POST /api/v1/assessments
pub async fn handle_save_assessment(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<NewAssessment>,
) -> Result<(StatusCode, Json<Created>), AppError> {
    session.require(Capability::Edit)?;
    let id = save_assessment(state.contracts.as_ref(), req, &session.user_id).await?;
    Ok((StatusCode::CREATED, Json(Created { id })))
}

/// GET /api/v1/assessments/:id
pub async fn handle_get_assessment(
    State(state): State<AppState>,
    _session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Assessment>, AppError> {
    Ok(Json(state.contracts.get_assessment(id).await?))
}

// ────────────────────────────────────────────────────────────────────────────
// Comparison and query
// ────────────────────────────────────────────────────────────────────────────

/// Either a stored contract or an ad-hoc document.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareItemRequest {
    pub contract_id: Option<Uuid>,
    pub name: Option<String>,
    pub document_base64: Option<String>,
    pub format: Option<DocumentFormat>,
}

#[derive(Deserialize)]
pub struct CompareRequest {
    pub items: Vec<CompareItemRequest>,
    pub focus: Focus,
    pub mode: Mode,
}

async fn resolve_item(state: &AppState, item: CompareItemRequest) -> Result<ComparisonItem, AppError> {
    if let Some(id) = item.contract_id {
        let contract = state.contracts.get_contract(id).await?;
        let document = match contract.document_path.as_deref() {
            Some(key) => {
                let bytes = state.documents.get(key).await?;
                let name = contract.document_name.as_deref().unwrap_or(key);
                Some(SourceDocument {
                    format: DocumentFormat::from_file_name(name),
                    bytes,
                })
            }
            None => None,
        };
        return Ok(ComparisonItem {
            name: item.name.unwrap_or_else(|| contract.name.clone()),
            metadata: contract_metadata(&contract),
            document,
        });
    }

    let name = item
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| AppError::Validation("each item needs a contractId or a name".into()))?;
    let encoded = item
        .document_base64
        .ok_or_else(|| AppError::Validation(format!("item '{name}' has no document")))?;
    let format = item.format.unwrap_or(DocumentFormat::Pdf);
    Ok(ComparisonItem {
        document: Some(decode(format, &encoded)?),
        metadata: Value::Null,
        name,
    })
}

/// POST /api/v1/compare
pub async fn handle_compare(
    State(state): State<AppState>,
    _session: Session,
    Json(req): Json<CompareRequest>,
) -> Result<Json<Comparison>, AppError> {
    if req.items.len() < 2 {
        return Err(AppError::Validation(
            "At least two contracts are required for comparison".into(),
        ));
    }

    let mut items = Vec::with_capacity(req.items.len());
    for item in req.items {
        items.push(resolve_item(&state, item).await?);
    }

    let comparison = compare(&state.llm, state.extractor.as_ref(), items, req.focus, req.mode).await?;
    Ok(Json(comparison))
}

#[derive(Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(rename = "type")]
    pub kind: Option<ContractKind>,
}

/// POST /api/v1/query
pub async fn handle_query(
    State(state): State<AppState>,
    _session: Session,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResult>, AppError> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err(AppError::Validation("question is required".into()));
    }

    let filter = ContractFilter {
        kind: req.kind,
        ..Default::default()
    };
    let contracts = state.contracts.list_contracts(&filter).await?;
    let result = query_contracts(&state.llm, question, &contracts).await?;
    Ok(Json(result))
}

// ────────────────────────────────────────────────────────────────────────────
// Model proxy
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/anthropic
/// Forwards a raw Messages request and relays the provider's status and body.
pub async fn handle_model_proxy(
    State(state): State<AppState>,
    _session: Session,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let (status, reply) = state
        .llm
        .forward(&body)
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?;
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    Ok((status, Json(reply)))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::{NaiveDate, Utc};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::auth::fixtures::token_for;
    use crate::auth::users::{NotificationPrefs, Role, UserProfile};
    use crate::contracts::models::fixtures::new_contract;
    use crate::contracts::models::{ContractKind, ContractPatch, RiskLevel};
    use crate::routes::build_router;
    use crate::state::fixtures::{test_state, TEST_JWT_SECRET};
    use crate::state::AppState;

    const ASSESSMENT_REPLY: &str = r#"{"summary":"Annual renewal with 60 day notice.","riskLevel":"high","findings":[],"keyTerms":{"noticePeriod":"60 days"}}"#;

    fn model_reply(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": text}]
        }))
    }

    async fn editor_state(llm_base_url: &str) -> AppState {
        let state = test_state(llm_base_url);
        state
            .users
            .insert(&UserProfile {
                id: "editor-1".into(),
                email: "editor@example.com".into(),
                display_name: Some("Ed".into()),
                role: Role::Editor,
                department: None,
                notifications: NotificationPrefs::default(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        state
    }

    fn post(uri: &str, user: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", token_for(user, TEST_JWT_SECRET)),
            )
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_assess_contract_links_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(model_reply(ASSESSMENT_REPLY))
            .expect(1)
            .mount(&server)
            .await;

        let state = editor_state(&server.uri()).await;
        let id = state
            .contracts
            .create_contract(
                new_contract("Acme", ContractKind::Vendor, NaiveDate::from_ymd_opt(2027, 3, 1).unwrap()),
                "editor-1",
            )
            .await
            .unwrap();
        let key = format!("contracts/{id}/original-terms.txt");
        state
            .documents
            .put(&key, b"This agreement renews annually.".to_vec(), "text/plain")
            .await
            .unwrap();
        state
            .contracts
            .update_contract(
                id,
                ContractPatch {
                    document_path: Some(key),
                    document_name: Some("terms.txt".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let response = build_router(state.clone())
            .oneshot(post(&format!("/api/v1/contracts/{id}/assess"), "editor-1", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["analysis"]["riskLevel"], "high");

        let contract = state.contracts.get_contract(id).await.unwrap();
        assert!(contract.assessed);
        assert_eq!(contract.risk_level, Some(RiskLevel::High));
        assert_eq!(contract.assessment_id.unwrap().to_string(), body["assessmentId"]);
    }

    #[tokio::test]
    async fn test_assess_without_document_is_400() {
        let state = editor_state("http://127.0.0.1:9").await;
        let id = state
            .contracts
            .create_contract(
                new_contract("Acme", ContractKind::Vendor, NaiveDate::from_ymd_opt(2027, 3, 1).unwrap()),
                "editor-1",
            )
            .await
            .unwrap();
        let response = build_router(state)
            .oneshot(post(&format!("/api/v1/contracts/{id}/assess"), "editor-1", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_compare_needs_two_items() {
        let state = editor_state("http://127.0.0.1:9").await;
        let response = build_router(state)
            .oneshot(post(
                "/api/v1/compare",
                "viewer-1",
                json!({
                    "items": [{"name": "Only", "documentBase64": "JVBERi0=", "format": "pdf"}],
                    "focus": "terms",
                    "mode": "existing"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(
            body["error"]["message"],
            "At least two contracts are required for comparison"
        );
    }

    #[tokio::test]
    async fn test_unparsable_model_reply_is_502() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(model_reply("I cannot answer that."))
            .mount(&server)
            .await;

        let state = editor_state(&server.uri()).await;
        let response = build_router(state)
            .oneshot(post(
                "/api/v1/query",
                "viewer-1",
                json!({ "question": "Which contracts renew this year?" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "UNPARSABLE_RESPONSE");
    }

    #[tokio::test]
    async fn test_viewer_cannot_save_assessment() {
        let state = editor_state("http://127.0.0.1:9").await;
        let response = build_router(state)
            .oneshot(post(
                "/api/v1/assessments",
                "viewer-1",
                json!({ "summary": "s", "riskLevel": "low" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_proxy_relays_provider_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(json!({"error": {"type": "rate_limit_error"}})),
            )
            .mount(&server)
            .await;

        let state = editor_state(&server.uri()).await;
        let response = build_router(state)
            .oneshot(post(
                "/api/anthropic",
                "viewer-1",
                json!({"model": "m", "max_tokens": 10, "messages": []}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = json_body(response).await;
        assert_eq!(body["error"]["type"], "rate_limit_error");
    }
}
