pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod history;

pub use error::{Error, Result};
