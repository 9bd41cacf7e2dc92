pub mod alert;
pub mod binance;
pub mod dispatcher;
pub mod lifecycle;

pub use alert::format_alert;
pub use binance::BinanceFuturesClient;
pub use dispatcher::{Dispatch, SignalDispatcher};
pub use lifecycle::{Scheduler, SchedulerCommand, SchedulerHandle, SchedulerStatus, WatchList, WatchResult};
