/*
[INPUT]:  Mid price, grid step, ladder depth, best bid/ask.
[OUTPUT]: Target price levels, eligibility and replenishment decisions.
[POS]:    Planning layer - pure grid arithmetic, no I/O.
[UPDATE]: When level spacing or placement guards change.
*/

use rust_decimal::Decimal;

use deri_grid_gateway::{Side, Ticker};

/// Target price levels for one side, nearest to mid first.
///
/// Buy level i is `mid - step * i`, sell level i is `mid + step * i`
/// (1-indexed), so the sequence is strictly monotonic away from mid.
pub fn ladder_prices(side: Side, mid: Decimal, step: Decimal, count: u32) -> Vec<Decimal> {
    (1..=count)
        .map(|i| {
            let offset = step * Decimal::from(i);
            match side {
                Side::Buy => mid - offset,
                Side::Sell => mid + offset,
            }
        })
        .collect()
}

/// A level may only be placed strictly beyond the touch: buy below the best
/// bid, sell above the best ask. Anything closer would rest at or cross the
/// spread and execute immediately.
pub fn is_eligible(side: Side, price: Decimal, ticker: &Ticker) -> bool {
    match side {
        Side::Buy => price < ticker.best_bid_price,
        Side::Sell => price > ticker.best_ask_price,
    }
}

/// Opposite-side order to place after a fill: one step beyond the fill price.
pub fn replenishment_order(filled_side: Side, fill_price: Decimal, step: Decimal) -> (Side, Decimal) {
    match filled_side {
        Side::Buy => (Side::Sell, fill_price + step),
        Side::Sell => (Side::Buy, fill_price - step),
    }
}

/// Mid-crossing guard: a replenishment sell must sit above mid, a
/// replenishment buy below it, so the ladder never drifts through mid.
pub fn replenishment_allowed(side: Side, price: Decimal, mid: Decimal) -> bool {
    match side {
        Side::Buy => price < mid,
        Side::Sell => price > mid,
    }
}
