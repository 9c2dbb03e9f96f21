use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::crm::mapping::{ContactPayload, DealPayload};
use crate::crm::{ConnectionStatus, CrmError, CrmGateway};

/// Freshsales REST client (`Authorization: Token token=<key>`).
pub struct FreshsalesClient {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    contacts: Vec<Record>,
}

#[derive(Deserialize)]
struct ContactResponse {
    contact: Record,
}

#[derive(Deserialize)]
struct DealResponse {
    deal: Record,
}

#[derive(Deserialize)]
struct Record {
    id: Value,
}

impl Record {
    fn id_string(&self) -> String {
        match &self.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl FreshsalesClient {
    pub fn new(domain: &str, api_key: String) -> Self {
        Self::with_base_url(format!("https://{domain}"), api_key)
    }

    pub fn with_base_url(base_url: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", format!("Token token={}", self.api_key))
            .header("Content-Type", "application/json")
    }

    async fn checked(response: Response, action: &str) -> Result<Response, CrmError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(CrmError::Api {
                action: action.to_string(),
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
            })
        }
    }
}

#[async_trait]
impl CrmGateway for FreshsalesClient {
    async fn search_contact(&self, name: &str) -> Result<Option<String>, CrmError> {
        let request = self
            .client
            .get(format!("{}/api/contacts/search", self.base_url))
            .query(&[("q", name)]);
        let response = self.authorized(request).send().await?;
        let found: SearchResponse = Self::checked(response, "search contacts").await?.json().await?;
        Ok(found.contacts.first().map(Record::id_string))
    }

    async fn create_contact(&self, contact: &ContactPayload) -> Result<String, CrmError> {
        let request = self
            .client
            .post(format!("{}/api/contacts", self.base_url))
            .json(contact);
        let response = self.authorized(request).send().await?;
        let created: ContactResponse = Self::checked(response, "create contact").await?.json().await?;
        Ok(created.contact.id_string())
    }

    async fn upsert_deal(&self, deal: &DealPayload, existing_id: Option<&str>) -> Result<String, CrmError> {
        let (request, action) = match existing_id {
            Some(id) => (
                self.client.put(format!("{}/api/deals/{id}", self.base_url)),
                "update deal",
            ),
            None => (
                self.client.post(format!("{}/api/deals", self.base_url)),
                "create deal",
            ),
        };
        let response = self.authorized(request.json(deal)).send().await?;
        let saved: DealResponse = Self::checked(response, action).await?.json().await?;
        debug!("Freshsales {action} -> {}", saved.deal.id_string());
        Ok(saved.deal.id_string())
    }

    async fn get_deal(&self, id: u64) -> Result<Value, CrmError> {
        let request = self.client.get(format!("{}/api/deals/{id}", self.base_url));
        let response = self.authorized(request).send().await?;
        let body: Value = Self::checked(response, "fetch deal").await?.json().await?;
        Ok(body.get("deal").cloned().unwrap_or(body))
    }

    async fn test_connection(&self) -> Result<ConnectionStatus, CrmError> {
        let request = self
            .client
            .get(format!("{}/api/contacts", self.base_url))
            .query(&[("per_page", "1")]);
        let response = self.authorized(request).send().await?;
        let status = response.status();
        Ok(ConnectionStatus {
            connected: status.is_success(),
            status: status.as_u16(),
            message: if status.is_success() {
                "Connected successfully"
            } else {
                "Connection failed"
            }
            .to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::models::fixtures::contract;
    use crate::contracts::models::ContractKind;
    use crate::crm::mapping::{contact_payload, deal_payload};
    use crate::crm::sync_contract;
    use chrono::NaiveDate;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn customer() -> crate::contracts::models::Contract {
        contract(
            "Fabrikam Inc",
            ContractKind::Customer,
            NaiveDate::from_ymd_opt(2027, 9, 30).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_first_sync_creates_contact_and_deal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/contacts/search"))
            .and(query_param("q", "Fabrikam Inc"))
            .and(header("Authorization", "Token token=key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"contacts": []})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/contacts"))
            .and(body_partial_json(json!({"contact": {"last_name": "Inc"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"contact": {"id": 77}})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/deals"))
            .and(body_partial_json(json!({"deal": {"contact_id": 77, "name": "Fabrikam Inc - MSA"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"deal": {"id": 9001}})))
            .expect(1)
            .mount(&server)
            .await;

        let client = FreshsalesClient::with_base_url(server.uri(), "key".into());
        let outcome = sync_contract(&client, &customer()).await.unwrap();
        assert_eq!(outcome.freshsales_id, "9001");
        assert_eq!(outcome.contact_id, "77");
    }

    #[tokio::test]
    async fn test_resync_updates_existing_deal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/contacts/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"contacts": [{"id": 77}]})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/contacts"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/deals/9001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"deal": {"id": 9001}})))
            .expect(1)
            .mount(&server)
            .await;

        let mut c = customer();
        c.freshsales_id = Some("9001".into());
        let client = FreshsalesClient::with_base_url(server.uri(), "key".into());
        let outcome = sync_contract(&client, &c).await.unwrap();
        assert_eq!(outcome.freshsales_id, "9001");
    }

    #[tokio::test]
    async fn test_search_failure_is_treated_as_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/contacts/search"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/contacts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"contact": {"id": "c-1"}})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/deals"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"deal": {"id": 5}})))
            .mount(&server)
            .await;

        let client = FreshsalesClient::with_base_url(server.uri(), "key".into());
        let outcome = sync_contract(&client, &customer()).await.unwrap();
        assert_eq!(outcome.contact_id, "c-1");
    }

    #[tokio::test]
    async fn test_deal_failure_carries_status_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/deals"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;

        let client = FreshsalesClient::with_base_url(server.uri(), "key".into());
        let c = customer();
        let err = client
            .upsert_deal(&deal_payload(&c, "1"), None)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to create deal in Freshsales: Unprocessable Entity"
        );
        // Contact payload is still well-formed for the same contract.
        assert_eq!(contact_payload(&c).contact.first_name, "Fabrikam");
    }

    #[tokio::test]
    async fn test_connection_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/contacts"))
            .and(query_param("per_page", "1"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = FreshsalesClient::with_base_url(server.uri(), "bad".into());
        let status = client.test_connection().await.unwrap();
        assert!(!status.connected);
        assert_eq!(status.status, 401);
    }
}
