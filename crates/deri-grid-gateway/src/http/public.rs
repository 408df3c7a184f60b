/*
[INPUT]:  Instrument identifiers and query parameters
[OUTPUT]: Market data (ticker snapshots)
[POS]:    HTTP layer - public market data endpoints (no auth required)
[UPDATE]: When adding new public endpoints or changing response format
*/

use crate::http::{DeribitClient, Result};
use crate::types::Ticker;
use reqwest::Method;

impl DeribitClient {
    /// Fetch the current best bid/ask for an instrument
    ///
    /// GET /api/v2/public/ticker?instrument_name={instrument}
    pub async fn fetch_ticker(&self, instrument_name: &str) -> Result<Ticker> {
        let endpoint = format!("/api/v2/public/ticker?instrument_name={}", instrument_name);
        let builder = self.public_request(Method::GET, &endpoint)?;
        self.send_json(builder).await
    }
}
