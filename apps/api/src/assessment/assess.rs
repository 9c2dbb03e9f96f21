use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::info;

use crate::assessment::json_extract::parse_model_json;
use crate::assessment::prompts::{fill_template, ASSESS_PROMPT_TEMPLATE, DEFAULT_CRITERIA};
use crate::assessment::EngineError;
use crate::contracts::models::{Finding, NewAssessment, RiskLevel};
use crate::extraction::{DocumentFormat, SourceDocument, TextExtractor};
use crate::llm_client::{LlmClient, MessageContent, MessagesRequest, ASSESS_MAX_TOKENS, MODEL};

/// The model's assessment, validated against the expected schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentAnalysis {
    pub summary: String,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default, deserialize_with = "scalar_map")]
    pub key_terms: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentOutcome {
    pub analysis: AssessmentAnalysis,
    pub model_used: String,
    pub assessment_criteria: Vec<String>,
}

impl AssessmentOutcome {
    pub fn into_new_assessment(self, contract_id: Option<uuid::Uuid>) -> NewAssessment {
        NewAssessment {
            contract_id,
            summary: self.analysis.summary,
            risk_level: self.analysis.risk_level,
            findings: self.analysis.findings,
            key_terms: self.analysis.key_terms,
            assessment_criteria: self.assessment_criteria,
            model_used: Some(self.model_used),
        }
    }
}

/// Key-term values are free text; numbers and booleans are stringified and
/// nulls dropped. Nested structures are rejected.
fn scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
    let mut terms = BTreeMap::new();
    for (key, value) in raw {
        let text = match value {
            Value::Null => continue,
            Value::String(s) => s,
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            _ => {
                return Err(serde::de::Error::custom(format!(
                    "keyTerms.{key} must be a scalar"
                )))
            }
        };
        terms.insert(key, text);
    }
    Ok(terms)
}

/// Caller-supplied criteria, or the six defaults when none are given.
pub fn effective_criteria(criteria: &[String]) -> Vec<String> {
    let given: Vec<String> = criteria
        .iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    if given.is_empty() {
        DEFAULT_CRITERIA.iter().map(|c| c.to_string()).collect()
    } else {
        given
    }
}

pub fn build_assess_prompt(criteria: &[String], contract_text: &str) -> String {
    let enumerated = criteria
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {c}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");
    fill_template(
        ASSESS_PROMPT_TEMPLATE,
        &[("criteria", enumerated.as_str()), ("contract_text", contract_text)],
    )
}

/// Extracts the document's text, asks the model for a risk assessment and
/// validates the reply. Empty extracted text fails before any model call.
pub async fn assess(
    llm: &LlmClient,
    extractor: &dyn TextExtractor,
    document: SourceDocument,
    criteria: &[String],
) -> Result<AssessmentOutcome, EngineError> {
    let label = document.format.label();
    let text = match document.format {
        DocumentFormat::Text => String::from_utf8_lossy(&document.bytes).into_owned(),
        _ => {
            extractor
                .extract(document)
                .await
                .map_err(|e| {
                    EngineError::ExtractionFailed(format!("Failed to extract text from {label}: {e}"))
                })?
                .text
        }
    };
    if text.trim().is_empty() {
        return Err(EngineError::ExtractionFailed(format!(
            "No text could be extracted from the {label}"
        )));
    }

    let criteria = effective_criteria(criteria);
    let prompt = build_assess_prompt(&criteria, &text);
    let request = MessagesRequest::user(MessageContent::Text(prompt), ASSESS_MAX_TOKENS);

    let reply = llm.complete(&request).await?;
    let analysis: AssessmentAnalysis = parse_model_json(&reply)?;
    info!(
        "Assessment complete: risk={}, findings={}",
        analysis.risk_level,
        analysis.findings.len()
    );

    Ok(AssessmentOutcome {
        analysis,
        model_used: MODEL.to_string(),
        assessment_criteria: criteria,
    })
}
