use reqwest::Method;
use tracing::{debug, instrument, warn};

use super::auth::AuthHeaders;
use super::candles::{candlesticks_path, decode_candlesticks, Candlestick, Granularity, TimeWindow};
use super::markets::{decode_markets_page, markets_path, Market};
use super::signer::Signer;
use crate::config::{ApiConfig, FetchConfig};
use crate::error::{Error, Result};

/// Authenticated client for the Kalshi trade API.
///
/// Every request is signed on its own; nothing is cached between calls.
#[derive(Debug)]
pub struct KalshiClient {
    base_url: String,
    access_key_id: String,
    signer: Signer,
    page_limit: usize,
    follow_cursor: bool,
    http: reqwest::Client,
}

impl KalshiClient {
    pub fn new(api: &ApiConfig, fetch: &FetchConfig, signer: Signer) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(api.timeout)
            .build()
            .map_err(|e| Error::config(format!("http client: {}", e)))?;

        debug!(base_url = %api.base_url, timeout = ?api.timeout, "KalshiClient initialised");

        Ok(Self {
            base_url: api.base_url.clone(),
            access_key_id: api.access_key_id.clone(),
            signer,
            page_limit: fetch.page_limit,
            follow_cursor: fetch.follow_cursor,
            http,
        })
    }

    /// Signed GET of `path` (query string included), returning the body text.
    #[instrument(skip(self), name = "kalshi::get")]
    pub async fn get(&self, path: &str) -> Result<String> {
        let headers = AuthHeaders::now(&self.signer, &self.access_key_id, &Method::GET, path)?
            .to_header_map()?;
        let url = format!("{}{}", self.base_url, path);

        let transport = |source| Error::Transport {
            path: path.to_string(),
            source,
        };
        let response = self
            .http
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let body = response.text().await.map_err(transport)?;
        if !status.is_success() {
            return Err(Error::Status {
                path: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        debug!(status = status.as_u16(), bytes = body.len(), "response received");
        Ok(body)
    }

    /// Settled markets of `series`. Reads one page unless cursor following
    /// is enabled; a truncated listing is reported, never silently dropped.
    #[instrument(skip(self), name = "kalshi::settled_markets")]
    pub async fn settled_markets(&self, series: &str) -> Result<Vec<Market>> {
        let mut markets = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let path = markets_path(series, self.page_limit, cursor.as_deref())?;
            let page = decode_markets_page(&self.get(&path).await?)?;
            let page_len = page.markets.len();
            let step = next_page(
                page.next_cursor(),
                cursor.as_deref(),
                page_len,
                self.page_limit,
                self.follow_cursor,
            )?;
            markets.extend(page.markets);

            match step {
                NextPage::Follow(next) => cursor = Some(next),
                NextPage::Truncated => {
                    warn!(
                        series,
                        fetched = markets.len(),
                        "more settled markets exist beyond the first page; \
                         set fetch.follow_cursor to read them"
                    );
                    break;
                }
                NextPage::Done => break,
            }
        }

        debug!(series, count = markets.len(), "settled markets listed");
        Ok(markets)
    }

    /// Candlesticks of one market over `window`.
    #[instrument(skip(self, market), fields(ticker = %market.ticker), name = "kalshi::candlesticks")]
    pub async fn candlesticks(
        &self,
        market: &Market,
        window: &TimeWindow,
        granularity: Granularity,
    ) -> Result<Vec<Candlestick>> {
        let path = candlesticks_path(market.series(), &market.ticker, window, granularity);
        let body = self.get(&path).await?;
        decode_candlesticks(&market.ticker, &body)
    }
}

/// What to do after one listing page.
#[derive(Debug, PartialEq, Eq)]
enum NextPage {
    Follow(String),
    /// A full page with more behind it, left unread.
    Truncated,
    Done,
}

fn next_page(
    next: Option<&str>,
    current: Option<&str>,
    page_len: usize,
    page_limit: usize,
    follow_cursor: bool,
) -> Result<NextPage> {
    let Some(next) = next else {
        return Ok(NextPage::Done);
    };
    if follow_cursor && page_len > 0 {
        if current == Some(next) {
            return Err(Error::decode(
                "markets response",
                format!("cursor {:?} returned twice", next),
            ));
        }
        return Ok(NextPage::Follow(next.to_string()));
    }
    if page_len >= page_limit {
        return Ok(NextPage::Truncated);
    }
    Ok(NextPage::Done)
}
