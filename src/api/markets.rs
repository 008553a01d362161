use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Url;
use serde::Deserialize;

use crate::error::{Error, Result};

pub const MARKETS_PATH: &str = "/trade-api/v2/markets";

/// Largest page the listing endpoint returns.
pub const PAGE_LIMIT: usize = 1000;

/// A settled market, decoded from one row of the listing response.
#[derive(Debug, Clone, PartialEq)]
pub struct Market {
    /// e.g. "KXNFLGAME-25OCT26BUFCAR-BUF"
    pub ticker: String,
    pub event_ticker: Option<String>,
    pub title: Option<String>,
    pub close_time: Option<DateTime<Utc>>,
    /// Total contracts traded over the market's life.
    pub volume: u64,
    /// Settlement outcome ("yes" / "no") when reported.
    pub result: Option<String>,
}

impl Market {
    /// Series ticker: the part of the market ticker before the first '-'.
    pub fn series(&self) -> &str {
        series_of(&self.ticker)
    }

    /// Close time in epoch seconds. A market without one cannot be windowed.
    pub fn close_ts(&self) -> Result<i64> {
        self.close_time
            .map(|t| t.timestamp())
            .ok_or_else(|| Error::decode(format!("market {}", self.ticker), "missing close_time"))
    }
}

pub fn series_of(ticker: &str) -> &str {
    ticker.split('-').next().unwrap_or(ticker)
}

/// Listing path for one page of settled markets in `series`.
///
/// Query values are form-encoded; cursors are opaque and may contain `+`, `/` or `=`.
pub fn markets_path(series: &str, limit: usize, cursor: Option<&str>) -> Result<String> {
    // Only the path and query of this URL are kept.
    let mut url = Url::parse("http://localhost")
        .and_then(|base| base.join(MARKETS_PATH))
        .map_err(|e| Error::config(format!("listing path: {}", e)))?;

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("limit", &limit.to_string())
            .append_pair("series_ticker", series)
            .append_pair("status", "settled");
        if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
            query.append_pair("cursor", cursor);
        }
    }

    Ok(format!("{}?{}", url.path(), url.query().unwrap_or_default()))
}

// =========================================================================
// Wire format
// =========================================================================

#[derive(Debug, Deserialize)]
struct MarketsPage {
    markets: Vec<MarketRecord>,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MarketRecord {
    ticker: String,
    #[serde(default)]
    event_ticker: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    close_time: Option<String>,
    #[serde(default)]
    volume: Option<u64>,
    #[serde(default)]
    result: Option<String>,
}

/// One decoded listing page plus the cursor for the next one.
#[derive(Debug)]
pub struct Page {
    pub markets: Vec<Market>,
    /// Empty or absent when there is nothing more to read.
    pub cursor: Option<String>,
}

impl Page {
    pub fn next_cursor(&self) -> Option<&str> {
        self.cursor.as_deref().filter(|c| !c.is_empty())
    }
}

/// Decode a listing response body.
pub fn decode_markets_page(body: &str) -> Result<Page> {
    let page: MarketsPage =
        serde_json::from_str(body).map_err(|e| Error::decode("markets response", e))?;

    let markets = page
        .markets
        .into_iter()
        .map(|record| {
            let close_time = match record.close_time.as_deref() {
                Some(raw) => parse_close_time(raw).map_err(|e| {
                    Error::decode(format!("close_time of {}", record.ticker), e)
                })?,
                None => None,
            };
            Ok(Market {
                ticker: record.ticker,
                event_ticker: record.event_ticker,
                title: record.title,
                close_time,
                volume: record.volume.unwrap_or(0),
                result: record.result,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Page {
        markets,
        cursor: page.cursor,
    })
}

/// Parse a close timestamp in any of the shapes the API has been seen to use.
///
/// Accepts RFC 3339 (with or without fractional seconds, `Z` or an offset),
/// naive date-times with `T` or a space (taken as UTC), and bare dates.
/// Empty input means "no close time".
pub fn parse_close_time(raw: &str) -> std::result::Result<Option<DateTime<Utc>>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Some(naive.and_utc()));
        }
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Ok(Some(dt.with_timezone(&Utc)));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Some(naive.and_utc()));
        }
    }

    Err(format!("unrecognized timestamp {:?}", raw))
}
