//! Automatic frequency control of the four local oscillators.

pub mod averager;
pub mod blanking;
pub mod controller;
pub mod oscillator;

pub use averager::{Admission, FrequencyAverage, FrequencySample, SampleAverager};
pub use blanking::{BlankingEvent, BlankingQueue, BlankingReport};
pub use controller::{AfcController, AfcCore, AfcMode, AfcOutcome};
pub use oscillator::{
    Oscillator, OscillatorBank, OscillatorId, OscillatorLimits, OscillatorReadout,
    SimulatedOscillator,
};
