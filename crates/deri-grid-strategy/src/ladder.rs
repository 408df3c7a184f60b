/*
[INPUT]:  Venue-assigned order identifiers and grid-aligned prices.
[OUTPUT]: Tracked resting orders per side, keyed by order id.
[POS]:    State layer - resting order bookkeeping.
[UPDATE]: When order identity or level-occupancy rules change.
*/

use std::collections::{HashMap, HashSet};
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use deri_grid_gateway::Side;

/// One resting limit order tracked by the engine.
///
/// `price` is the exact grid level the order was requested at, not the venue's
/// echo of it; level dedup relies on exact decimal equality against this value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridOrder {
    pub order_id: String,
    pub side: Side,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub size: Decimal,
}

/// Errors emitted by ladder bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LadderError {
    DuplicateOrderId { order_id: String },
    PriceLevelOccupied { price: String },
}

impl fmt::Display for LadderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LadderError::DuplicateOrderId { order_id } => {
                write!(f, "duplicate order_id: {order_id}")
            }
            LadderError::PriceLevelOccupied { price } => {
                write!(f, "price level already has a resting order: {price}")
            }
        }
    }
}

impl std::error::Error for LadderError {}

/// All resting orders for one side, keyed by order id.
///
/// Invariants: no duplicate order ids, at most one order per exact price level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ladder {
    orders: HashMap<String, GridOrder>,
}

impl Ladder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ladder from a persisted order list, re-checking invariants.
    pub fn from_orders(orders: Vec<GridOrder>) -> Result<Self, LadderError> {
        let mut ladder = Self::new();
        for order in orders {
            ladder.insert(order)?;
        }
        Ok(ladder)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn get(&self, order_id: &str) -> Option<&GridOrder> {
        self.orders.get(order_id)
    }

    /// Returns true when a resting order already sits at this exact price.
    pub fn covers_price(&self, price: Decimal) -> bool {
        self.orders.values().any(|order| order.price == price)
    }

    /// Track a newly placed order, enforcing id and level uniqueness.
    pub fn insert(&mut self, order: GridOrder) -> Result<(), LadderError> {
        if self.orders.contains_key(&order.order_id) {
            return Err(LadderError::DuplicateOrderId {
                order_id: order.order_id,
            });
        }
        if self.covers_price(order.price) {
            return Err(LadderError::PriceLevelOccupied {
                price: order.price.to_string(),
            });
        }

        self.orders.insert(order.order_id.clone(), order);
        Ok(())
    }

    /// Order ids sorted by price then id, for deterministic polling order.
    pub fn order_ids(&self) -> Vec<String> {
        let mut ids: Vec<(&Decimal, &String)> = self
            .orders
            .values()
            .map(|order| (&order.price, &order.order_id))
            .collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id.clone()).collect()
    }

    /// Orders sorted by price ascending, for snapshots and logging.
    pub fn orders_sorted(&self) -> Vec<GridOrder> {
        let mut orders: Vec<GridOrder> = self.orders.values().cloned().collect();
        orders.sort_by(|a, b| a.price.cmp(&b.price).then(a.order_id.cmp(&b.order_id)));
        orders
    }

    /// Drop every order whose id is in `ids`, returning how many were removed.
    pub fn remove_ids(&mut self, ids: &HashSet<String>) -> usize {
        let before = self.orders.len();
        self.orders.retain(|order_id, _| !ids.contains(order_id));
        before - self.orders.len()
    }
}

/// Both ladders, owned as one explicit value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LadderPair {
    pub buy: Ladder,
    pub sell: Ladder,
}

impl LadderPair {
    pub fn ladder(&self, side: Side) -> &Ladder {
        match side {
            Side::Buy => &self.buy,
            Side::Sell => &self.sell,
        }
    }

    pub fn ladder_mut(&mut self, side: Side) -> &mut Ladder {
        match side {
            Side::Buy => &mut self.buy,
            Side::Sell => &mut self.sell,
        }
    }

    /// Remove the given ids from both sides, returning the total removed.
    pub fn remove_ids(&mut self, ids: &HashSet<String>) -> usize {
        self.buy.remove_ids(ids) + self.sell.remove_ids(ids)
    }
}
