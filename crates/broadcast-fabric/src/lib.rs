pub mod fabric;

pub use fabric::BroadcastFabric;
