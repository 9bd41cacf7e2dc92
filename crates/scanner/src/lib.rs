//! Market-wide fan-out of the decision engine.

pub mod scanner;
pub mod snapshot;
pub mod state;

pub use scanner::{MarketScanner, ScanConfig};
pub use snapshot::SnapshotStore;
pub use state::{rank, ScanHit, ScanState, ScanStatus, UnitOutcome};
