/*
[INPUT]:  Engine requests for market data and order mutations.
[OUTPUT]: Venue responses behind an object-safe trait.
[POS]:    Seam between the engine and the HTTP client; mocked in tests.
[UPDATE]: When the engine needs new venue capabilities.
*/

use std::future::Future;
use std::pin::Pin;

use rust_decimal::Decimal;

use deri_grid_gateway::{
    AccountSummary, DeribitClient, OrderInfo, Result as GatewayResult, Side, Ticker,
};

pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = GatewayResult<T>> + Send + 'a>>;

/// Everything the engine needs from the venue.
pub trait ExchangeGateway: Send + Sync {
    fn fetch_ticker<'a>(&'a self, instrument: &'a str) -> GatewayFuture<'a, Ticker>;

    fn fetch_balance<'a>(&'a self, currency: &'a str) -> GatewayFuture<'a, AccountSummary>;

    fn place_limit_order<'a>(
        &'a self,
        instrument: &'a str,
        side: Side,
        amount: Decimal,
        price: Decimal,
    ) -> GatewayFuture<'a, OrderInfo>;

    fn fetch_order_status<'a>(&'a self, order_id: &'a str) -> GatewayFuture<'a, OrderInfo>;

    fn fetch_open_orders<'a>(&'a self, instrument: &'a str) -> GatewayFuture<'a, Vec<OrderInfo>>;

    fn cancel_all_orders<'a>(&'a self, instrument: &'a str) -> GatewayFuture<'a, u64>;
}

impl ExchangeGateway for DeribitClient {
    fn fetch_ticker<'a>(&'a self, instrument: &'a str) -> GatewayFuture<'a, Ticker> {
        Box::pin(async move { DeribitClient::fetch_ticker(self, instrument).await })
    }

    fn fetch_balance<'a>(&'a self, currency: &'a str) -> GatewayFuture<'a, AccountSummary> {
        Box::pin(async move { self.fetch_account_summary(currency).await })
    }

    fn place_limit_order<'a>(
        &'a self,
        instrument: &'a str,
        side: Side,
        amount: Decimal,
        price: Decimal,
    ) -> GatewayFuture<'a, OrderInfo> {
        Box::pin(
            async move { DeribitClient::place_limit_order(self, instrument, side, amount, price).await },
        )
    }

    fn fetch_order_status<'a>(&'a self, order_id: &'a str) -> GatewayFuture<'a, OrderInfo> {
        Box::pin(async move { self.fetch_order_state(order_id).await })
    }

    fn fetch_open_orders<'a>(&'a self, instrument: &'a str) -> GatewayFuture<'a, Vec<OrderInfo>> {
        Box::pin(async move { DeribitClient::fetch_open_orders(self, instrument).await })
    }

    fn cancel_all_orders<'a>(&'a self, instrument: &'a str) -> GatewayFuture<'a, u64> {
        Box::pin(async move { self.cancel_all_by_instrument(instrument).await })
    }
}
