// Analyzer module: structural change detection around statement dates.

pub mod causal_impact;
pub mod stats;
pub mod structural_change;
pub mod summary;
pub mod window;

pub use causal_impact::LocalLevelModel;
pub use structural_change::StructuralChange;
pub use summary::SummaryTable;
