//! Session lifecycle: types and the trade-loop scheduler

pub mod scheduler;
pub mod types;

pub use scheduler::{SchedulerContext, SessionCommand, SessionScheduler};
pub use types::{Capital, Session, SessionEvent, SessionStatus, StopReason, TradeRecord};
