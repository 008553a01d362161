pub mod auth;
pub mod candles;
pub mod client;
pub mod markets;
pub mod signer;

pub use auth::AuthHeaders;
pub use candles::{Candlestick, Granularity, TimeWindow};
pub use client::KalshiClient;
pub use markets::Market;
pub use signer::Signer;
