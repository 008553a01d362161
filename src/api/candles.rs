use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Fixed look-back before a market's close: 7 days.
pub const LOOKBACK_SECS: i64 = 604_800;

/// Candlestick bucket size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    Day,
    Hour,
    Minute,
}

impl Granularity {
    pub const ALL: [Granularity; 3] = [Granularity::Day, Granularity::Hour, Granularity::Minute];

    /// Bucket length in minutes, as the `period_interval` query parameter.
    pub fn period_minutes(&self) -> i64 {
        match self {
            Self::Day => 1440,
            Self::Hour => 60,
            Self::Minute => 1,
        }
    }

    pub fn period_secs(&self) -> i64 {
        self.period_minutes() * 60
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
        }
    }
}

impl FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "day" => Ok(Self::Day),
            "hour" => Ok(Self::Hour),
            "minute" => Ok(Self::Minute),
            other => Err(Error::config(format!(
                "unknown granularity {:?} (expected day, hour or minute)",
                other
            ))),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candlestick request window, epoch seconds. `start_ts < end_ts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_ts: i64,
    pub end_ts: i64,
}

impl TimeWindow {
    /// Window of `lookback_secs` ending at `close_ts`.
    pub fn ending_at(close_ts: i64, lookback_secs: i64) -> Result<Self> {
        if lookback_secs <= 0 {
            return Err(Error::config("look-back must be positive"));
        }
        let start_ts = close_ts
            .checked_sub(lookback_secs)
            .ok_or_else(|| Error::config(format!("close time {} out of range", close_ts)))?;
        Ok(Self {
            start_ts,
            end_ts: close_ts,
        })
    }
}

pub fn candlesticks_path(
    series: &str,
    ticker: &str,
    window: &TimeWindow,
    granularity: Granularity,
) -> String {
    format!(
        "/trade-api/v2/series/{}/markets/{}/candlesticks?start_ts={}&end_ts={}&period_interval={}",
        series,
        ticker,
        window.start_ts,
        window.end_ts,
        granularity.period_minutes()
    )
}

// =========================================================================
// Wire format
// =========================================================================

/// Trade price statistics for one bucket, in cents. Null when nothing traded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceStats {
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub mean: Option<f64>,
    pub previous: Option<f64>,
}

/// Best bid or ask OHLC for one bucket, in cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteStats {
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
}

/// One bucket as returned by the candlesticks endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Candlestick {
    pub end_period_ts: i64,
    #[serde(default)]
    pub open_interest: Option<i64>,
    #[serde(default)]
    pub volume: Option<i64>,
    #[serde(default)]
    pub price: PriceStats,
    #[serde(default)]
    pub yes_bid: QuoteStats,
    #[serde(default)]
    pub yes_ask: QuoteStats,
}

#[derive(Debug, Deserialize)]
struct CandlesticksResponse {
    candlesticks: Vec<Candlestick>,
}

pub fn decode_candlesticks(ticker: &str, body: &str) -> Result<Vec<Candlestick>> {
    let response: CandlesticksResponse = serde_json::from_str(body)
        .map_err(|e| Error::decode(format!("candlesticks of {}", ticker), e))?;
    Ok(response.candlesticks)
}
