use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::pss::Signature;
use rsa::signature::Verifier;
use std::collections::HashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use kalshi_history::api::auth::{ACCESS_KEY_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use kalshi_history::api::candles::LOOKBACK_SECS;
use kalshi_history::api::{Granularity, KalshiClient, Signer};
use kalshi_history::config::Config;
use kalshi_history::history::fetch_history;
use kalshi_history::Error;

const KEY_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/rsa_pkcs8.pem");

/// One request as the loopback server saw it.
#[derive(Debug)]
struct Seen {
    method: String,
    target: String,
    headers: HashMap<String, String>,
}

/// Serve `responses` in order, one connection each, and hand back what was requested.
async fn serve(responses: Vec<(u16, String)>) -> (String, JoinHandle<Vec<Seen>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let mut seen = Vec::new();
        for (status, body) in responses {
            let (mut socket, _) = listener.accept().await.unwrap();

            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }

            let text = String::from_utf8_lossy(&buf).to_string();
            let mut lines = text.split("\r\n");
            let mut request_line = lines.next().unwrap_or_default().split(' ');
            let method = request_line.next().unwrap_or_default().to_string();
            let target = request_line.next().unwrap_or_default().to_string();
            let headers = lines
                .take_while(|l| !l.is_empty())
                .filter_map(|l| l.split_once(':'))
                .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
                .collect();
            seen.push(Seen {
                method,
                target,
                headers,
            });

            let response = format!(
                "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        }
        seen
    });

    (base_url, handle)
}

fn config(base_url: &str, fetch: &str) -> Config {
    let toml = format!(
        "[api]\nbase_url = \"{}\"\naccess_key_id = \"test-key-id\"\nprivate_key = {{ source = \"file\", path = \"{}\" }}\n\n[fetch]\n{}\n",
        base_url, KEY_PATH, fetch
    );
    Config::from_toml_str(&toml, |_| None).unwrap()
}

fn client(cfg: &Config) -> KalshiClient {
    let signer = Signer::from_source(&cfg.api.private_key).unwrap();
    KalshiClient::new(&cfg.api, &cfg.fetch, signer).unwrap()
}

fn assert_signed(seen: &Seen, verifier: &Signer) {
    assert_eq!(seen.method, "GET");
    assert_eq!(seen.headers[&ACCESS_KEY_HEADER.to_ascii_lowercase()], "test-key-id");

    let timestamp = &seen.headers[&TIMESTAMP_HEADER.to_ascii_lowercase()];
    let path = seen.target.split('?').next().unwrap();
    let message = format!("{}GET{}", timestamp, path);

    let bytes = STANDARD
        .decode(&seen.headers[&SIGNATURE_HEADER.to_ascii_lowercase()])
        .unwrap();
    let signature = Signature::try_from(bytes.as_slice()).unwrap();
    assert!(
        verifier.verifying_key().verify(message.as_bytes(), &signature).is_ok(),
        "signature for {} does not verify",
        seen.target
    );
}

fn markets_body(markets: &[(&str, &str, u64)], cursor: &str) -> String {
    let rows: Vec<String> = markets
        .iter()
        .map(|(ticker, close, volume)| {
            format!(
                r#"{{"ticker": "{}", "close_time": "{}", "volume": {}, "status": "finalized"}}"#,
                ticker, close, volume
            )
        })
        .collect();
    format!(r#"{{"cursor": "{}", "markets": [{}]}}"#, cursor, rows.join(","))
}

fn candles_body(points: &[(i64, i64)]) -> String {
    let rows: Vec<String> = points
        .iter()
        .map(|(ts, close)| {
            format!(
                r#"{{"end_period_ts": {}, "volume": 3, "open_interest": 9, "price": {{"close": {}}}, "yes_bid": {{}}, "yes_ask": {{}}}}"#,
                ts, close
            )
        })
        .collect();
    format!(r#"{{"candlesticks": [{}]}}"#, rows.join(","))
}

#[tokio::test]
async fn test_fetch_history_over_http() {
    let (base_url, server) = serve(vec![
        (
            200,
            markets_body(
                &[
                    ("KXNFLGAME-25OCT26BUFCAR-BUF", "2025-10-26T20:25:00Z", 500),
                    ("KXNFLGAME-25OCT26BUFCAR-CAR", "2025-10-26 20:25:00", 480),
                ],
                "",
            ),
        ),
        (200, candles_body(&[(1_761_436_800, 60), (1_761_523_200, 99)])),
        (200, candles_body(&[(1_761_436_800, 40)])),
    ])
    .await;

    let cfg = config(&base_url, "");
    let rows = fetch_history(&client(&cfg), "KXNFLGAME", Granularity::Day, LOOKBACK_SECS)
        .await
        .unwrap();

    let got: Vec<(&str, u64, i64, Option<f64>)> = rows
        .iter()
        .map(|r| (r.market.as_str(), r.volume, r.end_period_ts, r.price.close))
        .collect();
    assert_eq!(
        got,
        vec![
            ("KXNFLGAME-25OCT26BUFCAR-BUF", 500, 1_761_436_800, Some(60.0)),
            ("KXNFLGAME-25OCT26BUFCAR-BUF", 500, 1_761_523_200, Some(99.0)),
            ("KXNFLGAME-25OCT26BUFCAR-CAR", 480, 1_761_436_800, Some(40.0)),
        ]
    );

    let seen = server.await.unwrap();
    assert_eq!(seen.len(), 3);
    assert_eq!(
        seen[0].target,
        "/trade-api/v2/markets?limit=1000&series_ticker=KXNFLGAME&status=settled"
    );
    assert_eq!(
        seen[1].target,
        "/trade-api/v2/series/KXNFLGAME/markets/KXNFLGAME-25OCT26BUFCAR-BUF/candlesticks?start_ts=1760905500&end_ts=1761510300&period_interval=1440"
    );
    assert!(seen[2].target.contains("/markets/KXNFLGAME-25OCT26BUFCAR-CAR/candlesticks?"));

    let verifier = Signer::from_pem(&std::fs::read_to_string(KEY_PATH).unwrap()).unwrap();
    for request in &seen {
        assert_signed(request, &verifier);
    }
}

#[tokio::test]
async fn test_http_error_aborts() {
    let (base_url, server) = serve(vec![(401, r#"{"error": "unauthorized"}"#.to_string())]).await;

    let cfg = config(&base_url, "");
    let err = fetch_history(&client(&cfg), "KXNFLGAME", Granularity::Hour, LOOKBACK_SECS)
        .await
        .unwrap_err();
    match err {
        Error::Status { status, body, .. } => {
            assert_eq!(status, 401);
            assert!(body.contains("unauthorized"));
        }
        other => panic!("unexpected error: {other}"),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn test_follow_cursor_reads_every_page() {
    let (base_url, server) = serve(vec![
        (200, markets_body(&[("KXNFLGAME-A-X", "2025-09-07T17:00:00Z", 1)], "page-2")),
        (200, markets_body(&[("KXNFLGAME-B-Y", "2025-09-14T17:00:00Z", 2)], "")),
    ])
    .await;

    let cfg = config(&base_url, "page_limit = 1\nfollow_cursor = true");
    let markets = client(&cfg).settled_markets("KXNFLGAME").await.unwrap();
    let tickers: Vec<_> = markets.iter().map(|m| m.ticker.as_str()).collect();
    assert_eq!(tickers, vec!["KXNFLGAME-A-X", "KXNFLGAME-B-Y"]);

    let seen = server.await.unwrap();
    assert_eq!(
        seen[1].target,
        "/trade-api/v2/markets?limit=1&series_ticker=KXNFLGAME&status=settled&cursor=page-2"
    );
}

#[tokio::test]
async fn test_single_page_by_default() {
    let (base_url, server) = serve(vec![(
        200,
        markets_body(&[("KXNFLGAME-A-X", "2025-09-07T17:00:00Z", 1)], "page-2"),
    )])
    .await;

    let cfg = config(&base_url, "page_limit = 1");
    let markets = client(&cfg).settled_markets("KXNFLGAME").await.unwrap();
    assert_eq!(markets.len(), 1);
    assert_eq!(server.await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cursor_is_sent_encoded() {
    let cursor = "CgYIARCgHBoA+abc/def==";
    let (base_url, server) = serve(vec![
        (200, markets_body(&[("KXNFLGAME-A-X", "2025-09-07T17:00:00Z", 1)], cursor)),
        (200, markets_body(&[("KXNFLGAME-B-Y", "2025-09-14T17:00:00Z", 2)], "")),
    ])
    .await;

    let cfg = config(&base_url, "page_limit = 1\nfollow_cursor = true");
    let markets = client(&cfg).settled_markets("KXNFLGAME").await.unwrap();
    assert_eq!(markets.len(), 2);

    let seen = server.await.unwrap();
    let url = reqwest::Url::parse(&format!("{}{}", base_url, seen[1].target)).unwrap();
    let sent = url
        .query_pairs()
        .find(|(k, _)| k == "cursor")
        .map(|(_, v)| v.into_owned());
    assert_eq!(sent.as_deref(), Some(cursor));

    let verifier = Signer::from_pem(&std::fs::read_to_string(KEY_PATH).unwrap()).unwrap();
    assert_signed(&seen[1], &verifier);
}

#[tokio::test]
async fn test_repeated_cursor_stops_listing() {
    let page = markets_body(&[("KXNFLGAME-A-X", "2025-09-07T17:00:00Z", 1)], "same");
    let (base_url, server) = serve(vec![(200, page.clone()), (200, page)]).await;

    let cfg = config(&base_url, "page_limit = 1\nfollow_cursor = true");
    let err = client(&cfg).settled_markets("KXNFLGAME").await.unwrap_err();
    assert!(matches!(err, Error::Decode { .. }), "unexpected error: {err}");
    assert_eq!(server.await.unwrap().len(), 2);
}
