/*
[INPUT]:  Scripted gateway responses and temp-dir order logs.
[OUTPUT]: Engine lifecycle assertions against a mock venue.
[POS]:    Integration tests for the control loop.
[UPDATE]: When engine lifecycle or cycle semantics change.
*/

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use deri_grid_gateway::{
    AccountSummary, GatewayError, OrderInfo, OrderStatus, OrderType, Side, Ticker,
};
use deri_grid_strategy::gateway::{ExchangeGateway, GatewayFuture};
use deri_grid_strategy::{EnginePhase, GridConfig, GridEngine, GridOrder, LadderPair, OrderStore};

fn dec(value: &str) -> Decimal {
    Decimal::from_str(value).expect("valid decimal")
}

fn ticker(bid: &str, ask: &str) -> Ticker {
    Ticker {
        instrument_name: "USDC_USDT".to_string(),
        best_bid_price: dec(bid),
        best_ask_price: dec(ask),
        last_price: None,
    }
}

fn test_config(dir: &Path, fixed_mid: Option<&str>, buy_levels: u32, sell_levels: u32) -> GridConfig {
    GridConfig {
        symbol: "USDC_USDT".to_string(),
        currency: "USDT".to_string(),
        position_size: dec("10"),
        num_buy_levels: buy_levels,
        num_sell_levels: sell_levels,
        step_size: dec("0.0001"),
        poll_interval_secs: 1,
        order_check_delay_ms: 0,
        order_log: dir.join("orders.json"),
        log_dir: None,
        fixed_mid_price: fixed_mid.map(dec),
    }
}

#[derive(Debug)]
struct MockState {
    ticker: Ticker,
    fail_ticker: bool,
    fail_order_status: bool,
    next_id: u64,
    placed: Vec<(Side, Decimal)>,
    orders: HashMap<String, OrderInfo>,
    cancel_all_calls: u32,
}

/// Scripted venue: orders it places are the orders it reports open.
#[derive(Debug, Clone)]
struct MockGateway {
    state: Arc<Mutex<MockState>>,
}

impl MockGateway {
    fn new(ticker: Ticker) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                ticker,
                fail_ticker: false,
                fail_order_status: false,
                next_id: 0,
                placed: Vec::new(),
                orders: HashMap::new(),
                cancel_all_calls: 0,
            })),
        }
    }

    fn set_ticker(&self, ticker: Ticker) {
        self.state.lock().unwrap().ticker = ticker;
    }

    fn set_fail_ticker(&self, fail: bool) {
        self.state.lock().unwrap().fail_ticker = fail;
    }

    fn set_fail_order_status(&self, fail: bool) {
        self.state.lock().unwrap().fail_order_status = fail;
    }

    fn mark_filled(&self, order_id: &str) {
        let mut state = self.state.lock().unwrap();
        let order = state.orders.get_mut(order_id).expect("order exists");
        order.order_state = OrderStatus::Filled;
        order.filled_amount = order.amount;
    }

    fn set_state(&self, order_id: &str, status: OrderStatus) {
        let mut state = self.state.lock().unwrap();
        let order = state.orders.get_mut(order_id).expect("order exists");
        order.order_state = status;
    }

    fn placed(&self) -> Vec<(Side, Decimal)> {
        self.state.lock().unwrap().placed.clone()
    }

    fn cancel_all_calls(&self) -> u32 {
        self.state.lock().unwrap().cancel_all_calls
    }
}

impl ExchangeGateway for MockGateway {
    fn fetch_ticker<'a>(&'a self, _instrument: &'a str) -> GatewayFuture<'a, Ticker> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            if state.fail_ticker {
                return Err(GatewayError::Timeout { duration: 30 });
            }
            Ok(state.ticker.clone())
        })
    }

    fn fetch_balance<'a>(&'a self, currency: &'a str) -> GatewayFuture<'a, AccountSummary> {
        let currency = currency.to_string();
        Box::pin(async move {
            Ok(AccountSummary {
                currency,
                equity: dec("1000"),
                balance: dec("1000"),
                available_funds: dec("990"),
            })
        })
    }

    fn place_limit_order<'a>(
        &'a self,
        instrument: &'a str,
        side: Side,
        amount: Decimal,
        price: Decimal,
    ) -> GatewayFuture<'a, OrderInfo> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let order_id = format!("ord-{}", state.next_id);
            let info = OrderInfo {
                order_id: order_id.clone(),
                instrument_name: instrument.to_string(),
                direction: side,
                price,
                amount,
                filled_amount: Decimal::ZERO,
                order_state: OrderStatus::Open,
                order_type: OrderType::Limit,
                creation_timestamp: 0,
            };
            state.placed.push((side, price));
            state.orders.insert(order_id, info.clone());
            Ok(info)
        })
    }

    fn fetch_order_status<'a>(&'a self, order_id: &'a str) -> GatewayFuture<'a, OrderInfo> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            if state.fail_order_status {
                return Err(GatewayError::Timeout { duration: 30 });
            }
            state
                .orders
                .get(order_id)
                .cloned()
                .ok_or_else(|| GatewayError::InvalidResponse(format!("unknown order {order_id}")))
        })
    }

    fn fetch_open_orders<'a>(&'a self, _instrument: &'a str) -> GatewayFuture<'a, Vec<OrderInfo>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            Ok(state
                .orders
                .values()
                .filter(|o| o.order_state == OrderStatus::Open)
                .cloned()
                .collect())
        })
    }

    fn cancel_all_orders<'a>(&'a self, _instrument: &'a str) -> GatewayFuture<'a, u64> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.cancel_all_calls += 1;
            let mut cancelled = 0;
            for order in state.orders.values_mut() {
                if order.order_state == OrderStatus::Open {
                    order.order_state = OrderStatus::Cancelled;
                    cancelled += 1;
                }
            }
            Ok(cancelled)
        })
    }
}

#[tokio::test]
async fn bootstrap_places_only_eligible_levels() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = test_config(dir.path(), Some("1.0000"), 2, 2);
    let mock = MockGateway::new(ticker("0.9999", "1.0001"));
    let mut engine = GridEngine::new(config.clone(), mock.clone(), OrderStore::new(&config.order_log));

    engine.bootstrap().await.expect("bootstrap");

    // 0.9999 sits at the bid and 1.0001 at the ask; only the outer levels go on.
    let placed = mock.placed();
    assert_eq!(placed, vec![(Side::Buy, dec("0.9998")), (Side::Sell, dec("1.0002"))]);
    assert_eq!(engine.ladders().buy.len(), 1);
    assert_eq!(engine.ladders().sell.len(), 1);
    assert_eq!(engine.phase(), EnginePhase::SteadyPolling);
}

#[tokio::test]
async fn steady_cycle_does_not_duplicate_levels() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = test_config(dir.path(), Some("1.0000"), 2, 2);
    let mock = MockGateway::new(ticker("0.9999", "1.0001"));
    let mut engine = GridEngine::new(config.clone(), mock.clone(), OrderStore::new(&config.order_log));

    engine.bootstrap().await.expect("bootstrap");
    let report = engine.poll_cycle().await.expect("cycle");

    assert_eq!(report.placed, 0);
    assert_eq!(report.filled, 0);
    assert_eq!(mock.placed().len(), 2);
}

#[tokio::test]
async fn ticker_failure_skips_the_cycle() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = test_config(dir.path(), Some("1.0000"), 2, 2);
    let mock = MockGateway::new(ticker("0.9999", "1.0001"));
    let mut engine = GridEngine::new(config.clone(), mock.clone(), OrderStore::new(&config.order_log));

    engine.bootstrap().await.expect("bootstrap");
    mock.set_fail_ticker(true);
    let report = engine.poll_cycle().await.expect("cycle");

    assert_eq!(report.placed, 0);
    assert_eq!(report.filled, 0);
    assert_eq!(report.removed, 0);
    assert_eq!(engine.ladders().buy.len(), 1);
    assert_eq!(engine.ladders().sell.len(), 1);
}

#[tokio::test]
async fn order_status_failure_keeps_the_order_tracked() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = test_config(dir.path(), Some("1.0000"), 2, 2);
    let mock = MockGateway::new(ticker("0.9999", "1.0001"));
    let mut engine = GridEngine::new(config.clone(), mock.clone(), OrderStore::new(&config.order_log));

    engine.bootstrap().await.expect("bootstrap");
    let buy_id = engine.ladders().buy.order_ids()[0].clone();
    mock.mark_filled(&buy_id);

    // The venue times out; the fill must go unnoticed this cycle.
    mock.set_fail_order_status(true);
    let report = engine.poll_cycle().await.expect("cycle");

    assert_eq!(report.filled, 0);
    assert_eq!(report.removed, 0);
    assert!(engine.ladders().buy.get(&buy_id).is_some());

    // Next cycle the venue recovers and the fill is picked up.
    mock.set_fail_order_status(false);
    let report = engine.poll_cycle().await.expect("cycle");

    assert_eq!(report.filled, 1);
    assert_eq!(report.removed, 1);
    assert!(engine.ladders().buy.get(&buy_id).is_none());
}

#[tokio::test]
async fn unrecognized_order_state_is_treated_as_still_open() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = test_config(dir.path(), Some("1.0000"), 2, 2);
    let mock = MockGateway::new(ticker("0.9999", "1.0001"));
    let mut engine = GridEngine::new(config.clone(), mock.clone(), OrderStore::new(&config.order_log));

    engine.bootstrap().await.expect("bootstrap");
    let buy_id = engine.ladders().buy.order_ids()[0].clone();
    mock.set_state(&buy_id, OrderStatus::Unknown);

    let report = engine.poll_cycle().await.expect("cycle");

    assert_eq!(report.filled, 0);
    assert_eq!(report.removed, 0);
    assert!(engine.ladders().buy.get(&buy_id).is_some());
}

#[tokio::test]
async fn replenishment_blocked_when_it_would_cross_mid() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = test_config(dir.path(), Some("1.0000"), 2, 2);
    let mock = MockGateway::new(ticker("0.9999", "1.0001"));
    let mut engine = GridEngine::new(config.clone(), mock.clone(), OrderStore::new(&config.order_log));

    engine.bootstrap().await.expect("bootstrap");
    let buy_id = engine.ladders().buy.order_ids()[0].clone();
    mock.mark_filled(&buy_id);

    let report = engine.poll_cycle().await.expect("cycle");

    // A buy fill at 0.9998 would replenish a sell at 0.9999, below mid 1.0000.
    assert_eq!(report.filled, 1);
    assert_eq!(report.removed, 1);
    assert!(engine.ladders().buy.is_empty());
    assert!(!mock.placed().contains(&(Side::Sell, dec("0.9999"))));
}

#[tokio::test]
async fn replenishment_placed_once_mid_has_moved_past_it() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = test_config(dir.path(), None, 2, 2);
    let mock = MockGateway::new(ticker("0.9999", "1.0001"));
    let mut engine = GridEngine::new(config.clone(), mock.clone(), OrderStore::new(&config.order_log));

    engine.bootstrap().await.expect("bootstrap");
    let buy_id = engine.ladders().buy.order_ids()[0].clone();

    // Market drops to mid 0.9996, then the resting buy at 0.9998 fills.
    mock.set_ticker(ticker("0.9995", "0.9997"));
    mock.mark_filled(&buy_id);
    let report = engine.poll_cycle().await.expect("cycle");

    assert_eq!(report.filled, 1);
    assert!(mock.placed().contains(&(Side::Sell, dec("0.9999"))));
    assert!(engine.ladders().sell.covers_price(dec("0.9999")));
}

#[tokio::test]
async fn fill_removal_is_persisted() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = test_config(dir.path(), Some("1.0000"), 2, 2);
    let mock = MockGateway::new(ticker("0.9999", "1.0001"));
    let mut engine = GridEngine::new(config.clone(), mock.clone(), OrderStore::new(&config.order_log));

    engine.bootstrap().await.expect("bootstrap");
    let buy_id = engine.ladders().buy.order_ids()[0].clone();
    mock.mark_filled(&buy_id);
    engine.poll_cycle().await.expect("cycle");

    let reloaded = OrderStore::new(&config.order_log).load().await.expect("reload");
    assert!(reloaded.buy.get(&buy_id).is_none());
    assert_eq!(reloaded.sell.len(), 1);
}

#[tokio::test]
async fn bootstrap_drops_snapshot_orders_missing_from_venue() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = test_config(dir.path(), Some("1.0000"), 2, 2);

    // Seed a snapshot with an order the venue no longer knows about.
    let store = OrderStore::new(&config.order_log);
    let mut pair = LadderPair::default();
    pair.buy
        .insert(GridOrder {
            order_id: "ghost-1".to_string(),
            side: Side::Buy,
            price: dec("0.9998"),
            size: dec("10"),
        })
        .unwrap();
    store.save(&pair).await.expect("seed snapshot");

    let mock = MockGateway::new(ticker("0.9999", "1.0001"));
    let mut engine = GridEngine::new(config.clone(), mock.clone(), OrderStore::new(&config.order_log));
    engine.bootstrap().await.expect("bootstrap");

    assert!(engine.ladders().buy.get("ghost-1").is_none());
    // The vacated level was re-placed with a live order.
    assert!(engine.ladders().buy.covers_price(dec("0.9998")));

    let reloaded = OrderStore::new(&config.order_log).load().await.expect("reload");
    assert!(reloaded.buy.get("ghost-1").is_none());
}

#[tokio::test]
async fn empty_sell_ladder_ends_the_run() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = test_config(dir.path(), Some("1.0000"), 1, 1);
    let mock = MockGateway::new(ticker("0.99995", "1.00005"));
    let mut engine = GridEngine::new(config.clone(), mock.clone(), OrderStore::new(&config.order_log));

    engine.bootstrap().await.expect("bootstrap");
    assert_eq!(engine.ladders().sell.len(), 1);
    let sell_id = engine.ladders().sell.order_ids()[0].clone();
    mock.mark_filled(&sell_id);

    engine.run(CancellationToken::new()).await.expect("run");

    assert_eq!(engine.phase(), EnginePhase::Stopped);
    assert_eq!(mock.cancel_all_calls(), 1);
    assert!(engine.ladders().buy.is_empty());
    assert!(engine.ladders().sell.is_empty());

    let reloaded = OrderStore::new(&config.order_log).load().await.expect("reload");
    assert!(reloaded.buy.is_empty());
    assert!(reloaded.sell.is_empty());
}

#[tokio::test]
async fn shutdown_cancels_all_resting_orders() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = test_config(dir.path(), Some("1.0000"), 2, 2);
    let mock = MockGateway::new(ticker("0.9999", "1.0001"));
    let mut engine = GridEngine::new(config.clone(), mock.clone(), OrderStore::new(&config.order_log));

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    engine.run(shutdown).await.expect("run");

    assert_eq!(engine.phase(), EnginePhase::Stopped);
    assert_eq!(mock.cancel_all_calls(), 1);
}

#[tokio::test]
async fn corrupt_order_log_aborts_bootstrap() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = test_config(dir.path(), Some("1.0000"), 2, 2);
    tokio::fs::write(&config.order_log, b"{ not json").await.unwrap();

    let mock = MockGateway::new(ticker("0.9999", "1.0001"));
    let mut engine = GridEngine::new(config.clone(), mock.clone(), OrderStore::new(&config.order_log));

    let err = engine.bootstrap().await.expect_err("corrupt log must abort");
    assert!(err.to_string().contains("refusing to start"));
    assert!(mock.placed().is_empty());
}
