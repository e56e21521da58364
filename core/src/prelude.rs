use crate::ingest::SynchronizedTriple;

/// Range geometry of the gates published for one pulse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateGeometry {
    pub n_gates: usize,
    pub start_range_m: f64,
    pub gate_spacing_m: f64,
}

/// Common error type for the acquisition core.
#[derive(thiserror::Error, Debug)]
pub enum DrxError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("wire encoding: {0}")]
    Wire(String),
    #[error("oscillator {index}: {message}")]
    Oscillator { index: usize, message: String },
    #[error("internal failure: {0}")]
    Internal(String),
}

pub type DrxResult<T> = Result<T, DrxError>;

/// Per-pulse transform applied to a synchronized triple before it is framed.
///
/// Stages may rewrite the H/V samples in place and adjust the published gate
/// geometry (e.g. when gates are combined).
pub trait IqStage: Send {
    fn name(&self) -> &'static str;
    fn apply(
        &mut self,
        triple: &mut SynchronizedTriple,
        geometry: &mut GateGeometry,
    ) -> DrxResult<()>;
}
