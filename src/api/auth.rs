use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;

use super::signer::Signer;
use crate::error::{Error, Result};

pub const ACCESS_KEY_HEADER: &str = "KALSHI-ACCESS-KEY";
pub const SIGNATURE_HEADER: &str = "KALSHI-ACCESS-SIGNATURE";
pub const TIMESTAMP_HEADER: &str = "KALSHI-ACCESS-TIMESTAMP";

/// The three headers every authenticated request carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeaders {
    pub access_key: String,
    pub signature: String,
    /// Milliseconds since epoch, exactly as it appears in the signed message.
    pub timestamp: String,
}

impl AuthHeaders {
    /// Build headers for `method path` signed at `timestamp_ms`.
    ///
    /// `path` may carry a query string; only the part before the first `?`
    /// is signed, the caller still sends the full path.
    pub fn build(
        signer: &Signer,
        access_key: &str,
        method: &Method,
        path: &str,
        timestamp_ms: i64,
    ) -> Result<Self> {
        let timestamp = timestamp_ms.to_string();
        let message = signing_message(&timestamp, method.as_str(), path);
        let signature = signer.sign(&message)?;

        Ok(Self {
            access_key: access_key.to_string(),
            signature,
            timestamp,
        })
    }

    /// Same as `build`, stamped with the current wall-clock time.
    pub fn now(signer: &Signer, access_key: &str, method: &Method, path: &str) -> Result<Self> {
        Self::build(
            signer,
            access_key,
            method,
            path,
            chrono::Utc::now().timestamp_millis(),
        )
    }

    pub fn to_header_map(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in [
            (ACCESS_KEY_HEADER, &self.access_key),
            (SIGNATURE_HEADER, &self.signature),
            (TIMESTAMP_HEADER, &self.timestamp),
        ] {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| Error::config(format!("{} is not a valid header name", name)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| Error::config(format!("{} is not a valid header value", name)))?;
            headers.insert(header, value);
        }
        Ok(headers)
    }
}

/// Path used for signing: everything before the first `?`.
pub fn signing_path(path: &str) -> &str {
    match path.find('?') {
        Some(idx) => &path[..idx],
        None => path,
    }
}

/// timestamp ‖ method ‖ query-stripped path, no separators.
pub fn signing_message(timestamp: &str, method: &str, path: &str) -> String {
    format!("{}{}{}", timestamp, method, signing_path(path))
}
