pub mod series;
pub mod tick_store;

pub use series::BoundedSeries;
pub use tick_store::TickHistoryStore;
