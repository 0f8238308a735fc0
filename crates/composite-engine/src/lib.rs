pub mod actor;
pub mod algorithm;
pub mod override_arbitration;

pub use actor::{EngineContext, RecomputeActor};
