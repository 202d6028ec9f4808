pub mod database;
pub mod null_sink;

pub use database::TradeDatabase;
pub use null_sink::NullSink;
