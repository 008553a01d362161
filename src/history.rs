use tracing::{debug, info};

use crate::api::candles::{Candlestick, Granularity, TimeWindow};
use crate::api::client::KalshiClient;
use crate::api::markets::Market;
use crate::data::CandleRow;
use crate::error::Result;

/// The two reads a history pull needs.
#[allow(async_fn_in_trait)]
pub trait MarketData {
    /// Settled markets of a series, in listing order.
    async fn settled_markets(&self, series: &str) -> Result<Vec<Market>>;

    /// Candlesticks of one market over `window`.
    async fn candlesticks(
        &self,
        market: &Market,
        window: &TimeWindow,
        granularity: Granularity,
    ) -> Result<Vec<Candlestick>>;
}

impl MarketData for KalshiClient {
    async fn settled_markets(&self, series: &str) -> Result<Vec<Market>> {
        KalshiClient::settled_markets(self, series).await
    }

    async fn candlesticks(
        &self,
        market: &Market,
        window: &TimeWindow,
        granularity: Granularity,
    ) -> Result<Vec<Candlestick>> {
        KalshiClient::candlesticks(self, market, window, granularity).await
    }
}

/// Pull candlestick history for every settled market of `series`.
///
/// Markets are visited one at a time in listing order; the first failure
/// aborts the whole pull and nothing partial is returned.
pub async fn fetch_history<A: MarketData>(
    api: &A,
    series: &str,
    granularity: Granularity,
    lookback_secs: i64,
) -> Result<Vec<CandleRow>> {
    let markets = api.settled_markets(series).await?;
    info!(series, markets = markets.len(), %granularity, "fetching candlesticks");

    let mut tables = Vec::with_capacity(markets.len());
    for market in &markets {
        let window = TimeWindow::ending_at(market.close_ts()?, lookback_secs)?;
        let candles = api.candlesticks(market, &window, granularity).await?;
        debug!(ticker = %market.ticker, candles = candles.len(), "candlesticks received");
        tables.push(tag_candles(market, granularity, candles));
    }

    info!("Retrieved {} markets' candlestick data.", tables.len());
    Ok(aggregate(tables))
}

/// Tag every candle of `market` with its ticker and total volume.
pub fn tag_candles(market: &Market, granularity: Granularity, candles: Vec<Candlestick>) -> Vec<CandleRow> {
    candles
        .into_iter()
        .map(|candle| CandleRow::tagged(market, granularity, candle))
        .collect()
}

/// Concatenate per-market tables in the order given.
pub fn aggregate(tables: Vec<Vec<CandleRow>>) -> Vec<CandleRow> {
    tables.into_iter().flatten().collect()
}
