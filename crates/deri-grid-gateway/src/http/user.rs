/*
[INPUT]:  Currency query parameters and auth header
[OUTPUT]: Account balance snapshots
[POS]:    HTTP layer - account data endpoints (require auth)
[UPDATE]: When adding new account endpoints or changing query parameters
*/

use crate::http::{DeribitClient, Result};
use crate::types::AccountSummary;
use reqwest::Method;

impl DeribitClient {
    /// Fetch the account summary for a settlement currency
    ///
    /// GET /api/v2/private/get_account_summary?currency={currency}
    pub async fn fetch_account_summary(&self, currency: &str) -> Result<AccountSummary> {
        let endpoint = format!("/api/v2/private/get_account_summary?currency={}", currency);
        let builder = self.private_request(Method::GET, &endpoint)?;
        self.send_json(builder).await
    }
}

#[cfg(test)]
mod tests {
    use crate::http::{ClientConfig, Credentials, DeribitClient};
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_account_summary() {
        let server = MockServer::start().await;
        let mock_response = r#"{
            "result": {
                "currency": "USDT",
                "equity": "1000.5",
                "balance": "1000.5",
                "available_funds": "990.5"
            }
        }"#;

        let _mock = Mock::given(method("GET"))
            .and(path("/api/v2/private/get_account_summary"))
            .and(query_param("currency", "USDT"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_raw(mock_response, "application/json"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut client =
            DeribitClient::with_config_and_base_url(ClientConfig::default(), &server.uri())
                .expect("client init");
        client.set_credentials(Credentials {
            client_id: "test-id".to_string(),
            client_secret: "test-secret".to_string(),
        });

        let summary = client
            .fetch_account_summary("USDT")
            .await
            .expect("fetch_account_summary failed");

        assert_eq!(summary.currency, "USDT");
        assert_eq!(summary.equity, Decimal::from_str("1000.5").unwrap());
        assert_eq!(summary.available_funds, Decimal::from_str("990.5").unwrap());
    }
}
