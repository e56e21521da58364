//! Acquisition-control core of the Ka-band DRX.
//!
//! Three digitizer channels are fused into one pulse stream, framed into the
//! binary streaming protocol and served to a single TCP client, while the AFC
//! keeps the four local oscillators locked to the transmitter.

pub mod afc;
pub mod config;
pub mod ingest;
pub mod iwrf;
pub mod math;
pub mod monitor;
pub mod prelude;
pub mod processing;
pub mod shutdown;
pub mod streamer;
pub mod telemetry;

pub use config::DrxConfig;
pub use prelude::{DrxError, DrxResult, GateGeometry, IqStage};
pub use shutdown::ShutdownToken;
pub use streamer::IwrfStreamer;
