use serde::Serialize;
use serde_json::Value;

use crate::contracts::models::{Contract, RiskLevel};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactPayload {
    pub contact: ContactFields,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactFields {
    pub first_name: String,
    pub last_name: String,
    pub company_name: String,
    pub custom_field: ContactCustomFields,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactCustomFields {
    pub cf_contract_type: Option<String>,
    pub cf_service_types: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DealPayload {
    pub deal: DealFields,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DealFields {
    pub name: String,
    pub amount: u32,
    pub contact_id: Value,
    pub expected_close: String,
    pub custom_field: DealCustomFields,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DealCustomFields {
    pub cf_contract_start_date: String,
    pub cf_contract_end_date: String,
    pub cf_renewal_date: String,
    pub cf_auto_renewal: String,
    pub cf_auto_renewal_period: String,
    pub cf_cancellation_notice_days: i32,
    pub cf_contract_type: Option<String>,
    pub cf_service_types: String,
    pub cf_contract_status: String,
    pub cf_risk_level: String,
}

/// Splits a company name into first word / remainder; the remainder falls
/// back to "Account" for single-word names.
fn split_name(name: &str) -> (String, String) {
    let mut words = name.split_whitespace();
    let first = words.next().unwrap_or(name).to_string();
    let rest = words.collect::<Vec<_>>().join(" ");
    let last = if rest.is_empty() { "Account".to_string() } else { rest };
    (first, last)
}

/// Numeric CRM ids are sent as numbers, anything else as a string.
pub fn id_value(id: &str) -> Value {
    id.parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(id.to_string()))
}

pub fn contact_payload(contract: &Contract) -> ContactPayload {
    let (first_name, last_name) = split_name(&contract.name);
    ContactPayload {
        contact: ContactFields {
            first_name,
            last_name,
            company_name: contract.name.clone(),
            custom_field: ContactCustomFields {
                cf_contract_type: contract.contract_type.map(|t| t.as_str().to_string()),
                cf_service_types: contract.service_type.join(", "),
            },
        },
    }
}

pub fn deal_payload(contract: &Contract, contact_id: &str) -> DealPayload {
    let name = match contract.contract_type {
        Some(t) => format!("{} - {}", contract.name, t.as_str().to_uppercase()),
        None => contract.name.clone(),
    };
    let end = contract.end_date.to_string();

    DealPayload {
        deal: DealFields {
            name,
            amount: 0,
            contact_id: id_value(contact_id),
            expected_close: end.clone(),
            custom_field: DealCustomFields {
                cf_contract_start_date: contract.start_date.to_string(),
                cf_contract_end_date: end.clone(),
                cf_renewal_date: if contract.auto_renewal { end } else { String::new() },
                cf_auto_renewal: if contract.auto_renewal { "Yes" } else { "No" }.to_string(),
                cf_auto_renewal_period: contract
                    .auto_renewal_period
                    .map(|years| format!("{years} years"))
                    .unwrap_or_default(),
                cf_cancellation_notice_days: contract.cancellation_notice_days,
                cf_contract_type: contract.contract_type.map(|t| t.as_str().to_string()),
                cf_service_types: contract.service_type.join(", "),
                cf_contract_status: contract.status.as_str().to_string(),
                cf_risk_level: contract.risk_level.unwrap_or(RiskLevel::Low).as_str().to_string(),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::models::fixtures::contract;
    use crate::contracts::models::{ContractKind, CustomerContractType};
    use chrono::NaiveDate;

    fn customer() -> Contract {
        let mut c = contract(
            "Northwind Traders",
            ContractKind::Customer,
            NaiveDate::from_ymd_opt(2027, 6, 30).unwrap(),
        );
        c.contract_type = Some(CustomerContractType::Service);
        c.service_type = vec!["voice".into(), "broadband".into()];
        c.auto_renewal = true;
        c.auto_renewal_period = Some(2);
        c.cancellation_notice_days = 60;
        c
    }

    #[test]
    fn test_deal_mapping() {
        let deal = deal_payload(&customer(), "4021").deal;
        assert_eq!(deal.name, "Northwind Traders - SERVICE");
        assert_eq!(deal.contact_id, Value::from(4021));
        assert_eq!(deal.expected_close, "2027-06-30");
        let cf = deal.custom_field;
        assert_eq!(cf.cf_contract_start_date, "2024-01-01");
        assert_eq!(cf.cf_auto_renewal, "Yes");
        assert_eq!(cf.cf_auto_renewal_period, "2 years");
        assert_eq!(cf.cf_renewal_date, "2027-06-30");
        assert_eq!(cf.cf_cancellation_notice_days, 60);
        assert_eq!(cf.cf_service_types, "voice, broadband");
        assert_eq!(cf.cf_contract_status, "active");
        assert_eq!(cf.cf_risk_level, "low");
    }

    #[test]
    fn test_contact_name_split() {
        let contact = contact_payload(&customer()).contact;
        assert_eq!(contact.first_name, "Northwind");
        assert_eq!(contact.last_name, "Traders");

        let mut single = customer();
        single.name = "Contoso".into();
        let contact = contact_payload(&single).contact;
        assert_eq!(contact.first_name, "Contoso");
        assert_eq!(contact.last_name, "Account");
        assert_eq!(contact.company_name, "Contoso");
    }

    #[test]
    fn test_non_auto_renewing_deal_has_blank_renewal_fields() {
        let mut c = customer();
        c.auto_renewal = false;
        c.auto_renewal_period = None;
        let cf = deal_payload(&c, "abc").deal.custom_field;
        assert_eq!(cf.cf_auto_renewal, "No");
        assert_eq!(cf.cf_auto_renewal_period, "");
        assert_eq!(cf.cf_renewal_date, "");
        assert_eq!(id_value("abc"), Value::String("abc".into()));
    }
}
