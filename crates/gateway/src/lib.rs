pub mod gateway;
pub mod kv;
pub mod log;
mod migrations;
pub mod store;

pub use gateway::Gateway;
pub use kv::{keys, TtlCache};
pub use log::{AppendLog, LogEntry};
pub use store::{HitRateRow, InsertOutcome, RecordStore};
