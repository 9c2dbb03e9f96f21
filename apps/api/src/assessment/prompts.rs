// All LLM prompt templates for contract assessment, comparison and query.

/// Used when the caller supplies no criteria.
pub const DEFAULT_CRITERIA: [&str; 6] = [
    "auto-renewal clauses and terms",
    "cancellation notice requirements",
    "liability limitations",
    "payment terms and conditions",
    "concerning or unusual clauses",
    "jurisdiction and governing law",
];

/// Assessment prompt. Fill `{criteria}` and `{contract_text}`.
pub const ASSESS_PROMPT_TEMPLATE: &str = r#"You are a legal contract analyst. I need you to carefully review this contract document and provide a comprehensive assessment.

Please analyze the document for the following:
{criteria}

Provide your analysis in the following JSON format:
{
  "summary": "Brief 2-3 sentence overall summary of the contract",
  "riskLevel": "low|medium|high",
  "findings": [
    {
      "type": "concern|warning|info",
      "category": "auto-renewal|cancellation|liability|pricing|other",
      "description": "Clear description of the finding",
      "severity": "low|medium|high",
      "excerpt": "Relevant quote from the contract",
      "recommendation": "What action should be taken"
    }
  ],
  "keyTerms": {
    "autoRenewal": "Yes/No and details",
    "renewalPeriod": "Duration if auto-renew exists",
    "cancellationNotice": "Number of days and any special requirements",
    "paymentTerms": "Net 30, Net 60, etc.",
    "liabilityLimits": "Any liability caps or exclusions",
    "jurisdiction": "Which state/country law governs"
  }
}

Focus especially on identifying any concerning clauses that might be disadvantageous, such as:
- Unusually long auto-renewal periods
- Short cancellation notice windows
- Broad liability waivers
- Automatic price increases
- One-sided termination rights
- Unusual jurisdiction clauses

Be thorough but concise. Flag anything that could cause problems down the road.

CONTRACT TEXT:
{contract_text}"#;

pub const COMPARE_TERMS_BODY: &str = "Compare these contracts focusing on:
- Key terms and conditions
- Payment terms and pricing
- Contract duration and renewal terms
- Cancellation and termination clauses
- Any significant differences in obligations";

pub const COMPARE_RISKS_BODY: &str = "Compare these contracts focusing on risk factors:
- Liability limitations and indemnification
- Insurance requirements
- Warranty provisions
- Dispute resolution mechanisms
- Any concerning or unfavorable clauses";

pub const COMPARE_PRICING_BODY: &str = "Compare these contracts focusing on financial terms:
- Pricing structure and rates
- Payment terms and schedules
- Price increase provisions
- Additional fees or charges
- Cost comparison and value analysis";

pub const COMPARE_FAVORABLE_BODY: &str = "Analyze which contract is most favorable to us as the buyer:
- Better terms and conditions
- Lower risk exposure
- More flexible cancellation
- Better pricing
- Overall recommendation";

/// Comparison prompt. Fill `{subject}`, `{focus_body}`, `{contracts}` and
/// `{recommendation_hint}`.
pub const COMPARE_PROMPT_TEMPLATE: &str = r#"You are a legal contract analyst comparing {subject}.

{focus_body}

Contracts to compare:
{contracts}

Provide a comprehensive comparison in JSON format:
{
  "summary": "Overall comparison summary with clear recommendation",
  "contracts": [
    {
      "name": "Contract name",
      "strengths": ["strength 1", "strength 2"],
      "weaknesses": ["weakness 1", "weakness 2"],
      "keyTerms": ["term 1", "term 2"],
      "score": 7
    }
  ],
  "keyDifferences": [
    {
      "category": "category name",
      "description": "detailed description of differences",
      "impact": "low|medium|high",
      "favorsBuyer": true
    }
  ],
  "recommendation": "{recommendation_hint}",
  "concerns": ["concern 1", "concern 2"],
  "actionItems": ["action 1", "action 2"]
}

"score" is an integer from 1 to 10 rating favorability to the buyer."#;

/// Query prompt. Fill `{contracts_json}` and `{question}`.
pub const QUERY_PROMPT_TEMPLATE: &str = r#"You are a contract management assistant. I have a database of contracts and need you to answer questions about them.

Here is the contract data:
{contracts_json}

User question: {question}

Please analyze the contracts and provide:
1. A direct answer to the question
2. A list of relevant contracts with key details
3. Any important observations or warnings

Format your response as JSON:
{
  "answer": "Direct answer to the question",
  "relevantContracts": [
    {
      "id": "contract id",
      "name": "contract name",
      "reason": "why this contract is relevant",
      "keyDetails": "important details to note"
    }
  ],
  "observations": ["any important patterns or concerns"]
}"#;

/// Substitutes `{name}` placeholders in a single left-to-right pass.
/// Inserted values are never rescanned, so placeholder syntax inside a value
/// stays literal. Braces that do not name a placeholder are kept as-is.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        let placeholder = values
            .iter()
            .find(|(name, _)| tail.starts_with(name) && tail[name.len()..].starts_with('}'));
        match placeholder {
            Some((name, value)) => {
                out.push_str(value);
                rest = &tail[name.len() + 1..];
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_keeps_json_braces() {
        let filled = fill_template("{\n  \"q\": \"{question}\"\n}", &[("question", "why?")]);
        assert_eq!(filled, "{\n  \"q\": \"why?\"\n}");
    }

    #[test]
    fn test_placeholder_inside_value_stays_literal() {
        let filled = fill_template(
            "Q: {question}\nDATA: {contracts_json}",
            &[("contracts_json", "[secret]"), ("question", "show {contracts_json}")],
        );
        assert_eq!(filled, "Q: show {contracts_json}\nDATA: [secret]");
    }

    #[test]
    fn test_every_template_placeholder_is_filled() {
        let filled = fill_template(
            COMPARE_PROMPT_TEMPLATE,
            &[
                ("subject", "vendor contracts"),
                ("focus_body", "focus"),
                ("recommendation_hint", "hint"),
                ("contracts", "listing"),
            ],
        );
        for name in ["{subject}", "{focus_body}", "{recommendation_hint}", "{contracts}"] {
            assert!(!filled.contains(name), "{name} left unfilled");
        }
    }
}
