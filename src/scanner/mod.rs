pub mod grid;
pub mod scan;
pub mod state_key;
pub mod table;

pub use scan::{CancelFlag, ConditionalProbabilityScanner, ScanConfig, ScanJob};
pub use state_key::{StateKey, StateKeySpec};
pub use table::{Counts, ProbabilityRow, ProbabilityTable, RowKey};
