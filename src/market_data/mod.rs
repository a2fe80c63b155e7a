pub mod normalizer;
pub mod provider;
pub mod raw_table;
pub mod yahoo;

// Re-exports for convenient access (e.g. `use crate::market_data::RawTable`).
pub use provider::{CachedProvider, HistoryProvider};
pub use raw_table::RawTable;
pub use yahoo::YahooProvider;
