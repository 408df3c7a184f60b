/*
[INPUT]:  Limit order parameters and order identifiers
[OUTPUT]: Order confirmations, order state snapshots, cancel counts
[POS]:    HTTP layer - trading endpoints (require auth)
[UPDATE]: When adding new trading endpoints or changing order flow
*/

use crate::http::{DeribitClient, Result};
use crate::types::{OrderInfo, PlaceOrderResult, Side};
use reqwest::Method;
use rust_decimal::Decimal;

impl DeribitClient {
    /// Place a limit order on the given side
    ///
    /// GET /api/v2/private/{buy|sell}?instrument_name={i}&amount={a}&price={p}&type=limit
    pub async fn place_limit_order(
        &self,
        instrument_name: &str,
        side: Side,
        amount: Decimal,
        price: Decimal,
    ) -> Result<OrderInfo> {
        let endpoint = format!(
            "/api/v2/private/{}?instrument_name={}&amount={}&price={}&type=limit",
            side.as_str(),
            instrument_name,
            amount,
            price
        );
        let builder = self.private_request(Method::GET, &endpoint)?;
        let result: PlaceOrderResult = self.send_json(builder).await?;
        Ok(result.order)
    }

    /// Fetch the current state of one order
    ///
    /// GET /api/v2/private/get_order_state?order_id={id}
    pub async fn fetch_order_state(&self, order_id: &str) -> Result<OrderInfo> {
        let endpoint = format!("/api/v2/private/get_order_state?order_id={}", order_id);
        let builder = self.private_request(Method::GET, &endpoint)?;
        self.send_json(builder).await
    }

    /// Fetch all open orders for an instrument
    ///
    /// GET /api/v2/private/get_open_orders_by_instrument?instrument_name={i}
    pub async fn fetch_open_orders(&self, instrument_name: &str) -> Result<Vec<OrderInfo>> {
        let endpoint = format!(
            "/api/v2/private/get_open_orders_by_instrument?instrument_name={}",
            instrument_name
        );
        let builder = self.private_request(Method::GET, &endpoint)?;
        self.send_json(builder).await
    }

    /// Cancel all open orders for an instrument, returning the cancel count
    ///
    /// GET /api/v2/private/cancel_all_by_instrument?instrument_name={i}
    pub async fn cancel_all_by_instrument(&self, instrument_name: &str) -> Result<u64> {
        let endpoint = format!(
            "/api/v2/private/cancel_all_by_instrument?instrument_name={}",
            instrument_name
        );
        let builder = self.private_request(Method::GET, &endpoint)?;
        self.send_json(builder).await
    }
}

#[cfg(test)]
mod tests {
    use crate::http::{ClientConfig, Credentials, DeribitClient, GatewayError};
    use crate::types::{OrderStatus, Side};
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use wiremock::matchers::{header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn authed_client(base_url: &str) -> DeribitClient {
        let mut client = DeribitClient::with_config_and_base_url(ClientConfig::default(), base_url)
            .expect("client init");
        client.set_credentials(Credentials {
            client_id: "test-id".to_string(),
            client_secret: "test-secret".to_string(),
        });
        client
    }

    #[tokio::test]
    async fn test_place_limit_order() {
        let server = MockServer::start().await;
        let mock_response = r#"{
            "result": {
                "order": {
                    "order_id": "USDT-42",
                    "instrument_name": "USDC_USDT",
                    "direction": "buy",
                    "price": 0.9998,
                    "amount": 10,
                    "filled_amount": 0,
                    "order_state": "open",
                    "order_type": "limit",
                    "creation_timestamp": 1724500000000
                }
            }
        }"#;

        let _mock = Mock::given(method("GET"))
            .and(path("/api/v2/private/buy"))
            .and(query_param("instrument_name", "USDC_USDT"))
            .and(query_param("price", "0.9998"))
            .and(header_exists("Authorization"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_raw(mock_response, "application/json"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = authed_client(&server.uri());
        let order = client
            .place_limit_order(
                "USDC_USDT",
                Side::Buy,
                Decimal::from(10),
                Decimal::from_str("0.9998").unwrap(),
            )
            .await
            .expect("place_limit_order failed");

        assert_eq!(order.order_id, "USDT-42");
        assert_eq!(order.direction, Side::Buy);
        assert_eq!(order.order_state, OrderStatus::Open);
        assert_eq!(order.price, Decimal::from_str("0.9998").unwrap());
    }

    #[tokio::test]
    async fn test_private_endpoint_requires_credentials() {
        let client =
            DeribitClient::with_config_and_base_url(ClientConfig::default(), "http://127.0.0.1:9")
                .expect("client init");

        let err = client
            .fetch_order_state("USDT-42")
            .await
            .expect_err("expected config error");

        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[tokio::test]
    async fn test_cancel_all_by_instrument() {
        let server = MockServer::start().await;

        let _mock = Mock::given(method("GET"))
            .and(path("/api/v2/private/cancel_all_by_instrument"))
            .and(query_param("instrument_name", "USDC_USDT"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_raw(r#"{"result": 3}"#, "application/json"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = authed_client(&server.uri());
        let cancelled = client
            .cancel_all_by_instrument("USDC_USDT")
            .await
            .expect("cancel_all failed");

        assert_eq!(cancelled, 3);
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_retryable_error() {
        let server = MockServer::start().await;

        let _mock = Mock::given(method("GET"))
            .and(path("/api/v2/private/get_order_state"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let client = authed_client(&server.uri());
        let err = client
            .fetch_order_state("USDT-42")
            .await
            .expect_err("expected rate limit error");

        assert!(err.is_retryable());
        match err {
            GatewayError::RateLimit { retry_after } => assert_eq!(retry_after, 7),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
