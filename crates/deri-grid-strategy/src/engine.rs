/*
[INPUT]:  Ticker and order state from the gateway, persisted ladders.
[OUTPUT]: Placed/replenished grid orders, updated snapshots, run lifecycle.
[POS]:    Control loop - bootstrap, steady polling, drain.
[UPDATE]: When the polling cycle or lifecycle transitions change.
*/

use std::collections::HashSet;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use deri_grid_gateway::{AccountSummary, OrderStatus, Side, Ticker};

use crate::config::GridConfig;
use crate::gateway::ExchangeGateway;
use crate::grid;
use crate::ladder::{GridOrder, LadderPair};
use crate::store::OrderStore;

/// Where the engine is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Bootstrapping,
    SteadyPolling,
    Draining,
    Stopped,
}

/// What one polling cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub placed: usize,
    pub filled: usize,
    pub removed: usize,
    pub sell_ladder_empty: bool,
}

/// The grid control loop.
///
/// Drives one instrument: tops the ladders up to their configured depth,
/// polls resting orders for fills, replenishes the opposite side after each
/// fill, and persists the ladders after every mutation. The run ends when
/// the sell ladder empties out (inventory fully unwound) or on shutdown.
pub struct GridEngine<G: ExchangeGateway> {
    run_id: Uuid,
    config: GridConfig,
    gateway: G,
    store: OrderStore,
    ladders: LadderPair,
    phase: EnginePhase,
    initial_balance: Option<AccountSummary>,
}

impl<G: ExchangeGateway> GridEngine<G> {
    pub fn new(config: GridConfig, gateway: G, store: OrderStore) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            config,
            gateway,
            store,
            ladders: LadderPair::default(),
            phase: EnginePhase::Bootstrapping,
            initial_balance: None,
        }
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn ladders(&self) -> &LadderPair {
        &self.ladders
    }

    /// Load persisted state, reconcile it with the venue, and seed the grid.
    ///
    /// A snapshot that exists but cannot be read is fatal: it may describe
    /// resting orders the engine would otherwise lose track of.
    pub async fn bootstrap(&mut self) -> Result<()> {
        info!(
            run_id = %self.run_id,
            symbol = %self.config.symbol,
            "bootstrapping grid engine"
        );

        self.ladders = self
            .store
            .load()
            .await
            .context("refusing to start: order log unreadable, resting orders may be live")?;

        match self.gateway.fetch_balance(&self.config.currency).await {
            Ok(summary) => {
                info!(
                    run_id = %self.run_id,
                    currency = %summary.currency,
                    balance = %summary.balance,
                    available = %summary.available_funds,
                    "initial balance"
                );
                self.initial_balance = Some(summary);
            }
            Err(err) => {
                warn!(run_id = %self.run_id, error = %err, "initial balance unavailable");
            }
        }

        if !self.ladders.buy.is_empty() || !self.ladders.sell.is_empty() {
            self.reconcile_with_venue().await;
        }

        match self.gateway.fetch_ticker(&self.config.symbol).await {
            Ok(ticker) => {
                let mid = self.mid_price(&ticker);
                for side in [Side::Buy, Side::Sell] {
                    if self.top_up_side(side, &ticker, mid).await > 0 {
                        self.persist().await;
                    }
                }
            }
            Err(err) => {
                warn!(
                    run_id = %self.run_id,
                    error = %err,
                    "ticker unavailable at bootstrap, grid will seed on the first cycle"
                );
            }
        }

        self.phase = EnginePhase::SteadyPolling;
        info!(
            run_id = %self.run_id,
            buy_orders = self.ladders.buy.len(),
            sell_orders = self.ladders.sell.len(),
            "bootstrap complete"
        );
        Ok(())
    }

    /// One steady-state cycle: top up, poll fills, replenish, persist.
    pub async fn poll_cycle(&mut self) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        let ticker = match self.gateway.fetch_ticker(&self.config.symbol).await {
            Ok(ticker) => ticker,
            Err(err) => {
                warn!(run_id = %self.run_id, error = %err, "ticker fetch failed, skipping cycle");
                report.sell_ladder_empty = self.ladders.sell.is_empty();
                return Ok(report);
            }
        };
        let mid = self.mid_price(&ticker);

        report.placed = self.top_up(&ticker, mid).await;
        if report.placed > 0 {
            self.persist().await;
        }

        let (closed, fills) = self.poll_order_states().await;
        report.filled = fills.len();

        let mut mutated = false;
        for filled in &fills {
            if self.replenish_after_fill(filled, mid).await {
                mutated = true;
            }
        }

        report.removed = self.ladders.remove_ids(&closed);
        if report.removed > 0 {
            mutated = true;
        }
        if mutated {
            self.persist().await;
        }

        report.sell_ladder_empty = self.ladders.sell.is_empty();
        debug!(
            run_id = %self.run_id,
            placed = report.placed,
            filled = report.filled,
            removed = report.removed,
            buy_orders = self.ladders.buy.len(),
            sell_orders = self.ladders.sell.len(),
            "cycle complete"
        );
        Ok(report)
    }

    /// Cancel everything and report the final balance.
    pub async fn drain(&mut self) {
        self.phase = EnginePhase::Draining;
        info!(run_id = %self.run_id, "draining: cancelling all resting orders");

        match self.gateway.cancel_all_orders(&self.config.symbol).await {
            Ok(cancelled) => {
                info!(run_id = %self.run_id, cancelled, "cancel-all complete");
                self.ladders = LadderPair::default();
                self.persist().await;
            }
            Err(err) => {
                error!(
                    run_id = %self.run_id,
                    error = %err,
                    "cancel-all failed, resting orders may remain on the venue"
                );
            }
        }

        match self.gateway.fetch_balance(&self.config.currency).await {
            Ok(summary) => {
                let initial = self
                    .initial_balance
                    .as_ref()
                    .map(|b| b.balance.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                info!(
                    run_id = %self.run_id,
                    initial_balance = %initial,
                    final_balance = %summary.balance,
                    "run finished"
                );
            }
            Err(err) => {
                warn!(run_id = %self.run_id, error = %err, "final balance unavailable");
            }
        }

        self.phase = EnginePhase::Stopped;
    }

    /// Run until the sell ladder empties out or shutdown is requested.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        if self.phase == EnginePhase::Bootstrapping {
            self.bootstrap().await?;
        }

        loop {
            if shutdown.is_cancelled() {
                info!(run_id = %self.run_id, "shutdown requested");
                break;
            }

            let report = self.poll_cycle().await?;
            if report.sell_ladder_empty {
                info!(run_id = %self.run_id, "sell ladder empty, winding down");
                break;
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(run_id = %self.run_id, "shutdown requested");
                    break;
                }
                _ = sleep(self.config.poll_interval()) => {}
            }
        }

        self.drain().await;
        Ok(())
    }

    async fn log_balance(&self, context: &str) {
        match self.gateway.fetch_balance(&self.config.currency).await {
            Ok(summary) => {
                info!(
                    run_id = %self.run_id,
                    balance = %summary.balance,
                    available = %summary.available_funds,
                    "{context}"
                );
            }
            Err(err) => {
                warn!(run_id = %self.run_id, error = %err, "balance unavailable");
            }
        }
    }

    fn mid_price(&self, ticker: &Ticker) -> Decimal {
        self.config
            .fixed_mid_price
            .unwrap_or_else(|| ticker.mid_price())
    }

    /// Drop snapshot orders the venue no longer knows about.
    ///
    /// Best effort: if open orders cannot be fetched the snapshot is trusted
    /// as-is and stale entries fall out through normal status polling.
    async fn reconcile_with_venue(&mut self) {
        let open = match self.gateway.fetch_open_orders(&self.config.symbol).await {
            Ok(open) => open,
            Err(err) => {
                warn!(
                    run_id = %self.run_id,
                    error = %err,
                    "open-order fetch failed, keeping snapshot as-is"
                );
                return;
            }
        };

        let live: HashSet<String> = open.into_iter().map(|o| o.order_id).collect();
        let mut stale = HashSet::new();
        for side in [Side::Buy, Side::Sell] {
            for id in self.ladders.ladder(side).order_ids() {
                if !live.contains(&id) {
                    stale.insert(id);
                }
            }
        }

        if !stale.is_empty() {
            let removed = self.ladders.remove_ids(&stale);
            warn!(
                run_id = %self.run_id,
                removed,
                "dropped snapshot orders no longer open on the venue"
            );
            self.persist().await;
        }
    }

    /// Place any missing eligible levels on both sides.
    async fn top_up(&mut self, ticker: &Ticker, mid: Decimal) -> usize {
        let mut placed = 0;
        for side in [Side::Buy, Side::Sell] {
            placed += self.top_up_side(side, ticker, mid).await;
        }
        placed
    }

    async fn top_up_side(&mut self, side: Side, ticker: &Ticker, mid: Decimal) -> usize {
        let count = match side {
            Side::Buy => self.config.num_buy_levels,
            Side::Sell => self.config.num_sell_levels,
        };
        let mut placed = 0;
        for price in grid::ladder_prices(side, mid, self.config.step_size, count) {
            if self.ladders.ladder(side).covers_price(price) {
                continue;
            }
            if !grid::is_eligible(side, price, ticker) {
                debug!(
                    run_id = %self.run_id,
                    side = side.as_str(),
                    price = %price,
                    "level inside the spread, skipping"
                );
                continue;
            }
            if self.place_and_track(side, price).await {
                placed += 1;
            }
        }
        placed
    }

    /// Poll every tracked order once, pausing between requests.
    ///
    /// Returns the ids to drop from the ladders and the fills to replenish.
    /// A failed status request leaves the order tracked for the next cycle.
    async fn poll_order_states(&mut self) -> (HashSet<String>, Vec<GridOrder>) {
        let mut tracked: Vec<GridOrder> = Vec::new();
        for side in [Side::Buy, Side::Sell] {
            tracked.extend(self.ladders.ladder(side).orders_sorted());
        }

        let delay = self.config.order_check_delay();
        let mut closed = HashSet::new();
        let mut fills = Vec::new();

        for (index, order) in tracked.iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                sleep(delay).await;
            }

            let info = match self.gateway.fetch_order_status(&order.order_id).await {
                Ok(info) => info,
                Err(err) => {
                    warn!(
                        run_id = %self.run_id,
                        order_id = %order.order_id,
                        error = %err,
                        retryable = err.is_retryable(),
                        "order status fetch failed, will retry next cycle"
                    );
                    continue;
                }
            };

            match info.order_state {
                OrderStatus::Filled => {
                    info!(
                        run_id = %self.run_id,
                        order_id = %order.order_id,
                        side = order.side.as_str(),
                        price = %order.price,
                        "order filled"
                    );
                    closed.insert(order.order_id.clone());
                    fills.push(order.clone());
                    if order.side == Side::Sell {
                        self.log_balance("balance after sell fill").await;
                    }
                }
                OrderStatus::Cancelled | OrderStatus::Rejected => {
                    warn!(
                        run_id = %self.run_id,
                        order_id = %order.order_id,
                        state = ?info.order_state,
                        "order closed without filling, dropping from the grid"
                    );
                    closed.insert(order.order_id.clone());
                }
                OrderStatus::Open => {}
                OrderStatus::Unknown => {
                    warn!(
                        run_id = %self.run_id,
                        order_id = %order.order_id,
                        "unrecognized order state, treating as still open"
                    );
                }
            }
        }

        (closed, fills)
    }

    /// Place the opposite-side order one step beyond a fill.
    async fn replenish_after_fill(&mut self, filled: &GridOrder, mid: Decimal) -> bool {
        let (side, price) =
            grid::replenishment_order(filled.side, filled.price, self.config.step_size);

        if !grid::replenishment_allowed(side, price, mid) {
            warn!(
                run_id = %self.run_id,
                side = side.as_str(),
                price = %price,
                mid = %mid,
                "replenishment would cross mid, skipping"
            );
            return false;
        }
        if self.ladders.ladder(side).covers_price(price) {
            debug!(
                run_id = %self.run_id,
                side = side.as_str(),
                price = %price,
                "replenishment level already occupied"
            );
            return false;
        }

        self.place_and_track(side, price).await
    }

    /// Place one limit order and track it. Placement failures are tolerated;
    /// the level stays vacant and the next top-up retries it.
    async fn place_and_track(&mut self, side: Side, price: Decimal) -> bool {
        let size = self.config.position_size;
        let info = match self
            .gateway
            .place_limit_order(&self.config.symbol, side, size, price)
            .await
        {
            Ok(info) => info,
            Err(err) => {
                warn!(
                    run_id = %self.run_id,
                    side = side.as_str(),
                    price = %price,
                    error = %err,
                    retryable = err.is_retryable(),
                    "order placement failed, will retry next cycle"
                );
                return false;
            }
        };

        info!(
            run_id = %self.run_id,
            order_id = %info.order_id,
            side = side.as_str(),
            price = %price,
            size = %size,
            "order placed"
        );

        let tracked = GridOrder {
            order_id: info.order_id,
            side,
            price,
            size,
        };
        if let Err(err) = self.ladders.ladder_mut(side).insert(tracked) {
            warn!(run_id = %self.run_id, error = %err, "could not track placed order");
            return false;
        }
        true
    }

    /// Write the current ladders out. A failed write is logged and the next
    /// mutation retries it; in-memory state stays authoritative meanwhile.
    async fn persist(&mut self) {
        if let Err(err) = self.store.save(&self.ladders).await {
            error!(
                run_id = %self.run_id,
                path = %self.store.path().display(),
                error = %err,
                "order log write failed"
            );
        }
    }
}
