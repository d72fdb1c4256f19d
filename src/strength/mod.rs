pub mod aggregator;
pub mod feed;
pub mod percent_change;

pub use aggregator::StrengthAggregator;
pub use feed::StrengthSeriesFeed;
pub use percent_change::PercentChangeCalculator;
