use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::api::candles::{Candlestick, Granularity, PriceStats, QuoteStats};
use crate::api::markets::Market;
use crate::error::{Error, Result};

/// One candlestick tagged with the market it belongs to.
///
/// This is the row of the combined table. `volume` is the market's total
/// volume (same on every row of a market); the bucket's own volume is kept
/// in `period_volume`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandleRow {
    pub end_period_ts: i64,
    pub start_period_ts: i64,
    pub open_interest: Option<i64>,
    pub period_volume: Option<i64>,
    pub price: PriceStats,
    pub yes_bid: QuoteStats,
    pub yes_ask: QuoteStats,
    pub market: String,
    pub volume: u64,
}

impl CandleRow {
    pub fn tagged(market: &Market, granularity: Granularity, candle: Candlestick) -> Self {
        Self {
            end_period_ts: candle.end_period_ts,
            start_period_ts: candle.end_period_ts - granularity.period_secs(),
            open_interest: candle.open_interest,
            period_volume: candle.volume,
            price: candle.price,
            yes_bid: candle.yes_bid,
            yes_ask: candle.yes_ask,
            market: market.ticker.clone(),
            volume: market.volume,
        }
    }

    /// Nullable price column, if `column` is one.
    pub fn float_mut(&mut self, column: Column) -> Option<&mut Option<f64>> {
        use Column::*;
        Some(match column {
            PriceOpen => &mut self.price.open,
            PriceHigh => &mut self.price.high,
            PriceLow => &mut self.price.low,
            PriceClose => &mut self.price.close,
            PriceMean => &mut self.price.mean,
            PricePrevious => &mut self.price.previous,
            YesBidOpen => &mut self.yes_bid.open,
            YesBidHigh => &mut self.yes_bid.high,
            YesBidLow => &mut self.yes_bid.low,
            YesBidClose => &mut self.yes_bid.close,
            YesAskOpen => &mut self.yes_ask.open,
            YesAskHigh => &mut self.yes_ask.high,
            YesAskLow => &mut self.yes_ask.low,
            YesAskClose => &mut self.yes_ask.close,
            _ => return None,
        })
    }

    /// Nullable integer column, if `column` is one.
    pub fn int_mut(&mut self, column: Column) -> Option<&mut Option<i64>> {
        match column {
            Column::OpenInterest => Some(&mut self.open_interest),
            Column::PeriodVolume => Some(&mut self.period_volume),
            _ => None,
        }
    }

    /// Raw text of a cell; missing values are empty.
    pub fn field(&self, column: Column) -> String {
        fn opt<T: ToString>(v: Option<T>) -> String {
            v.map(|v| v.to_string()).unwrap_or_default()
        }

        use Column::*;
        match column {
            EndPeriodTs => self.end_period_ts.to_string(),
            StartPeriodTs => self.start_period_ts.to_string(),
            OpenInterest => opt(self.open_interest),
            PeriodVolume => opt(self.period_volume),
            PriceOpen => opt(self.price.open),
            PriceHigh => opt(self.price.high),
            PriceLow => opt(self.price.low),
            PriceClose => opt(self.price.close),
            PriceMean => opt(self.price.mean),
            PricePrevious => opt(self.price.previous),
            YesBidOpen => opt(self.yes_bid.open),
            YesBidHigh => opt(self.yes_bid.high),
            YesBidLow => opt(self.yes_bid.low),
            YesBidClose => opt(self.yes_bid.close),
            YesAskOpen => opt(self.yes_ask.open),
            YesAskHigh => opt(self.yes_ask.high),
            YesAskLow => opt(self.yes_ask.low),
            YesAskClose => opt(self.yes_ask.close),
            Column::Market => self.market.clone(),
            Column::Volume => self.volume.to_string(),
        }
    }

    /// Set a cell from its raw text. Timestamp columns take epoch seconds.
    pub fn set_field(&mut self, column: Column, raw: &str) -> Result<()> {
        let raw = raw.trim();
        let bad = |e: &dyn fmt::Display| Error::decode(format!("column {}", column), format!("{:?}: {}", raw, e));

        match column {
            Column::EndPeriodTs => self.end_period_ts = raw.parse().map_err(|e| bad(&e))?,
            Column::StartPeriodTs => self.start_period_ts = raw.parse().map_err(|e| bad(&e))?,
            Column::Market => self.market = raw.to_string(),
            Column::Volume => self.volume = raw.parse().map_err(|e| bad(&e))?,
            _ => {
                if let Some(slot) = self.int_mut(column) {
                    *slot = if raw.is_empty() {
                        None
                    } else {
                        Some(raw.parse().map_err(|e| bad(&e))?)
                    };
                } else if let Some(slot) = self.float_mut(column) {
                    *slot = if raw.is_empty() {
                        None
                    } else {
                        Some(raw.parse().map_err(|e| bad(&e))?)
                    };
                }
            }
        }
        Ok(())
    }
}

/// Columns of the combined table, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    EndPeriodTs,
    StartPeriodTs,
    OpenInterest,
    PeriodVolume,
    PriceOpen,
    PriceHigh,
    PriceLow,
    PriceClose,
    PriceMean,
    PricePrevious,
    YesBidOpen,
    YesBidHigh,
    YesBidLow,
    YesBidClose,
    YesAskOpen,
    YesAskHigh,
    YesAskLow,
    YesAskClose,
    Market,
    Volume,
}

impl Column {
    pub const ALL: [Column; 20] = [
        Column::EndPeriodTs,
        Column::StartPeriodTs,
        Column::OpenInterest,
        Column::PeriodVolume,
        Column::PriceOpen,
        Column::PriceHigh,
        Column::PriceLow,
        Column::PriceClose,
        Column::PriceMean,
        Column::PricePrevious,
        Column::YesBidOpen,
        Column::YesBidHigh,
        Column::YesBidLow,
        Column::YesBidClose,
        Column::YesAskOpen,
        Column::YesAskHigh,
        Column::YesAskLow,
        Column::YesAskClose,
        Column::Market,
        Column::Volume,
    ];

    pub fn name(&self) -> &'static str {
        use Column::*;
        match self {
            EndPeriodTs => "end_period_ts",
            StartPeriodTs => "start_period_ts",
            OpenInterest => "open_interest",
            PeriodVolume => "period_volume",
            PriceOpen => "price.open",
            PriceHigh => "price.high",
            PriceLow => "price.low",
            PriceClose => "price.close",
            PriceMean => "price.mean",
            PricePrevious => "price.previous",
            YesBidOpen => "yes_bid.open",
            YesBidHigh => "yes_bid.high",
            YesBidLow => "yes_bid.low",
            YesBidClose => "yes_bid.close",
            YesAskOpen => "yes_ask.open",
            YesAskHigh => "yes_ask.high",
            YesAskLow => "yes_ask.low",
            YesAskClose => "yes_ask.close",
            Column::Market => "market",
            Column::Volume => "volume",
        }
    }

    /// Epoch-second columns that can be decoded into datetimes.
    pub fn is_timestamp(&self) -> bool {
        matches!(self, Column::EndPeriodTs | Column::StartPeriodTs)
    }

    /// Columns that may hold missing values.
    pub fn is_nullable(&self) -> bool {
        !matches!(
            self,
            Column::EndPeriodTs | Column::StartPeriodTs | Column::Market | Column::Volume
        )
    }

    pub fn nullable() -> impl Iterator<Item = Column> {
        Self::ALL.into_iter().filter(|c| c.is_nullable())
    }
}

impl FromStr for Column {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| Error::config(format!("unknown column {:?}", s)))
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
