pub mod pulse;
pub mod ring;

pub use pulse::{
    BurstData, G0Estimate, PulseData, PulseTime, SynchronizedTriple, CHANNEL_BURST, CHANNEL_H,
    CHANNEL_V,
};
pub use ring::RecyclingRing;
