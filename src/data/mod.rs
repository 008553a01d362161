pub mod pipeline;
pub mod row;
pub mod store;

pub use pipeline::{DateTimeTransform, ForwardFill, Frame, Pipeline, Processor, Transform};
pub use row::{CandleRow, Column};
pub use store::{DataLoader, Format};
