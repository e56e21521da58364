pub mod cohere;
pub mod decimate;
pub mod synchronizer;

pub use cohere::BurstCohering;
pub use decimate::GatePairCombiner;
pub use synchronizer::{ChannelRings, PulseSynchronizer};
