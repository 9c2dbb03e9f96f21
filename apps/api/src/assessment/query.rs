use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::assessment::json_extract::parse_model_json;
use crate::assessment::prompts::{fill_template, QUERY_PROMPT_TEMPLATE};
use crate::assessment::EngineError;
use crate::contracts::models::Contract;
use crate::llm_client::{LlmClient, MessageContent, MessagesRequest, QUERY_MAX_TOKENS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub answer: String,
    #[serde(default)]
    pub relevant_contracts: Vec<RelevantContract>,
    #[serde(default)]
    pub observations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelevantContract {
    pub id: String,
    pub name: String,
    pub reason: String,
    #[serde(default)]
    pub key_details: Option<String>,
}

fn query_metadata(c: &Contract) -> Value {
    json!({
        "id": c.id,
        "name": c.name,
        "type": c.kind,
        "contractType": c.contract_type,
        "startDate": c.start_date,
        "endDate": c.end_date,
        "autoRenewal": c.auto_renewal,
        "autoRenewalPeriod": c.auto_renewal_period,
        "cancellationNoticeDays": c.cancellation_notice_days,
        "status": c.status,
        "riskLevel": c.risk_level,
        "assessmentSummary": c.assessment_summary,
        "serviceType": c.service_type,
    })
}

pub fn build_query_prompt(question: &str, contracts: &[Contract]) -> String {
    let data: Vec<Value> = contracts.iter().map(query_metadata).collect();
    let contracts_json =
        serde_json::to_string_pretty(&data).unwrap_or_else(|_| Value::Array(data).to_string());
    fill_template(
        QUERY_PROMPT_TEMPLATE,
        &[("contracts_json", contracts_json.as_str()), ("question", question)],
    )
}

/// Answers a free-form question over the metadata of `contracts`.
pub async fn query_contracts(
    llm: &LlmClient,
    question: &str,
    contracts: &[Contract],
) -> Result<QueryResult, EngineError> {
    let prompt = build_query_prompt(question, contracts);
    let request = MessagesRequest::user(MessageContent::Text(prompt), QUERY_MAX_TOKENS);
    let reply = llm.complete(&request).await?;
    parse_model_json(&reply)
}
