use thiserror::Error;

/// Everything that can abort a history pull or a processing run.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid key material, unknown granularity, bad config values.
    #[error("configuration error: {0}")]
    Config(String),

    /// The RSA-PSS signing step itself failed.
    #[error("failed to sign request: {0}")]
    Signing(#[source] rsa::signature::Error),

    /// Network failure or timeout talking to the API.
    #[error("request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a non-2xx status.
    #[error("{path} returned HTTP {status}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    /// A response or stored row is missing fields or has unparsable values.
    #[error("failed to decode {context}: {message}")]
    Decode { context: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Bincode(#[from] bincode::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn decode(context: impl Into<String>, message: impl ToString) -> Self {
        Error::Decode {
            context: context.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
