use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::info;

use crate::assessment::json_extract::parse_model_json;
use crate::assessment::prompts::{
    fill_template, COMPARE_FAVORABLE_BODY, COMPARE_PRICING_BODY, COMPARE_PROMPT_TEMPLATE, COMPARE_RISKS_BODY,
    COMPARE_TERMS_BODY,
};
use crate::assessment::EngineError;
use crate::contracts::models::{Contract, RiskLevel};
use crate::extraction::{DocumentFormat, SourceDocument, TextExtractor};
use crate::llm_client::{
    ContentBlock, LlmClient, MessageContent, MessagesRequest, COMPARE_MAX_TOKENS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Focus {
    Terms,
    Risks,
    Pricing,
    Favorable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Existing,
    Proposals,
    Renewal,
}

impl Mode {
    fn subject(&self) -> &'static str {
        match self {
            Mode::Existing => "existing contracts",
            Mode::Proposals => "new vendor proposals",
            Mode::Renewal => "a renewal proposal against the existing contract",
        }
    }

    fn recommendation_hint(&self) -> &'static str {
        match self {
            Mode::Renewal => "Accept renewal, negotiate changes, or seek alternatives",
            _ => "Which contract is best for us and why",
        }
    }
}

/// Focus body plus the mode-specific extra instruction, if any.
fn focus_instructions(focus: Focus, mode: Mode) -> String {
    let (body, extra) = match focus {
        Focus::Terms => (
            COMPARE_TERMS_BODY,
            match mode {
                Mode::Proposals => Some("- Recommend which proposal offers the best value"),
                Mode::Renewal => Some("- Is the new proposal better or worse than the existing contract?"),
                Mode::Existing => None,
            },
        ),
        Focus::Risks => (
            COMPARE_RISKS_BODY,
            (mode == Mode::Renewal).then_some("- Does the new proposal increase or decrease risk exposure?"),
        ),
        Focus::Pricing => (
            COMPARE_PRICING_BODY,
            (mode == Mode::Renewal).then_some("- Is the new pricing better, worse, or comparable?"),
        ),
        Focus::Favorable => (
            COMPARE_FAVORABLE_BODY,
            (mode == Mode::Renewal)
                .then_some("- Should we accept the renewal or negotiate/seek alternatives?"),
        ),
    };
    match extra {
        Some(line) => format!("{body}\n{line}"),
        None => body.to_string(),
    }
}

/// One side of a comparison: a document when one is stored, otherwise the
/// contract's metadata.
#[derive(Debug, Clone)]
pub struct ComparisonItem {
    pub name: String,
    pub document: Option<SourceDocument>,
    pub metadata: Value,
}

/// Metadata inlined for items without a document.
pub fn contract_metadata(contract: &Contract) -> Value {
    serde_json::json!({
        "startDate": contract.start_date,
        "endDate": contract.end_date,
        "autoRenewal": contract.auto_renewal,
        "autoRenewalPeriod": contract.auto_renewal_period,
        "cancellationNoticeDays": contract.cancellation_notice_days,
        "riskLevel": contract.risk_level,
        "assessmentSummary": contract.assessment_summary,
    })
}

/// An item ready for the request: its attached block, if it has a document.
#[derive(Debug, Clone)]
pub struct PreparedItem {
    pub name: String,
    pub block: Option<ContentBlock>,
    pub metadata: Value,
}

/// PDFs are attached as base64 documents; DOCX and text are extracted and
/// attached as plain-text documents.
pub async fn prepare_items(
    extractor: &dyn TextExtractor,
    items: Vec<ComparisonItem>,
) -> Result<Vec<PreparedItem>, EngineError> {
    let mut prepared = Vec::with_capacity(items.len());
    for item in items {
        let block = match item.document {
            None => None,
            Some(doc) if doc.format == DocumentFormat::Pdf => {
                Some(ContentBlock::pdf(STANDARD.encode(&doc.bytes)))
            }
            Some(doc) => {
                let label = doc.format.label();
                let text = extractor
                    .extract(doc)
                    .await
                    .map_err(|e| {
                        EngineError::ExtractionFailed(format!(
                            "Failed to extract text from {label} for {}: {e}",
                            item.name
                        ))
                    })?
                    .text;
                if text.trim().is_empty() {
                    return Err(EngineError::ExtractionFailed(format!(
                        "No text could be extracted from the {label} for {}",
                        item.name
                    )));
                }
                Some(ContentBlock::plain_document(text))
            }
        };
        prepared.push(PreparedItem {
            name: item.name,
            block,
            metadata: item.metadata,
        });
    }
    Ok(prepared)
}

pub fn build_compare_prompt(items: &[PreparedItem], focus: Focus, mode: Mode) -> String {
    let listing = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let detail = if item.block.is_some() {
                "[Full document provided for analysis]".to_string()
            } else {
                let json = serde_json::to_string_pretty(&item.metadata)
                    .unwrap_or_else(|_| item.metadata.to_string());
                format!("Metadata: {json}")
            };
            format!("Contract {}: {}\n{detail}\n", i + 1, item.name)
        })
        .collect::<Vec<_>>()
        .join("\n");

    fill_template(
        COMPARE_PROMPT_TEMPLATE,
        &[
            ("subject", mode.subject()),
            ("focus_body", focus_instructions(focus, mode).as_str()),
            ("recommendation_hint", mode.recommendation_hint()),
            ("contracts", listing.as_str()),
        ],
    )
}

/// Document blocks in item order, then the prompt as the final text block.
pub fn build_compare_request(items: &[PreparedItem], focus: Focus, mode: Mode) -> MessagesRequest {
    let mut blocks: Vec<ContentBlock> = items.iter().filter_map(|i| i.block.clone()).collect();
    blocks.push(ContentBlock::text(build_compare_prompt(items, focus, mode)));
    MessagesRequest::user(MessageContent::Blocks(blocks), COMPARE_MAX_TOKENS)
}

// ────────────────────────────────────────────────────────────────────────────
// Response shape
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub summary: String,
    pub contracts: Vec<ComparedContract>,
    pub key_differences: Vec<KeyDifference>,
    pub recommendation: String,
    pub concerns: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparedContract {
    pub name: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub key_terms: Vec<String>,
    #[serde(default, deserialize_with = "score_1_to_10")]
    pub score: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDifference {
    pub category: String,
    pub description: String,
    pub impact: RiskLevel,
    #[serde(default)]
    pub favors_buyer: Option<bool>,
}

/// Accepts an integer or a numeric string; anything outside 1..=10 is rejected.
fn score_1_to_10<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    let number = match raw {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    match number {
        Some(n) if n.fract() == 0.0 && (1.0..=10.0).contains(&n) => Ok(Some(n as u8)),
        _ => Err(serde::de::Error::custom("score must be an integer from 1 to 10")),
    }
}

/// Compares two or more contracts in a single model call. The caller checks
/// the item count.
pub async fn compare(
    llm: &LlmClient,
    extractor: &dyn TextExtractor,
    items: Vec<ComparisonItem>,
    focus: Focus,
    mode: Mode,
) -> Result<Comparison, EngineError> {
    let prepared = prepare_items(extractor, items).await?;
    let attached = prepared.iter().filter(|i| i.block.is_some()).count();
    info!(
        "Comparing {} contracts ({attached} with documents), focus={focus:?}, mode={mode:?}",
        prepared.len()
    );

    let request = build_compare_request(&prepared, focus, mode);
    let reply = llm.complete(&request).await?;
    parse_model_json(&reply)
}
