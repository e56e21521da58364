use crate::config::{OscillatorSettings, OscillatorTable};
use crate::prelude::{DrxError, DrxResult};
use log::{info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Fixed offset of the transmit chain above the oscillator sum, Hz.
const TX_FREQUENCY_OFFSET_HZ: u64 = 25_000_000;

const DEFAULT_SET_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OscillatorId {
    Osc0 = 0,
    Osc1 = 1,
    Osc2 = 2,
    Osc3 = 3,
}

impl OscillatorId {
    pub const ALL: [OscillatorId; 4] = [
        OscillatorId::Osc0,
        OscillatorId::Osc1,
        OscillatorId::Osc2,
        OscillatorId::Osc3,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Static tuning range of an oscillator. Frequencies are in units of
/// `step_hz`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OscillatorLimits {
    pub step_hz: u32,
    pub scaled_min: u32,
    pub scaled_max: u32,
}

impl OscillatorLimits {
    pub fn scaled_center(&self) -> u32 {
        (self.scaled_min + self.scaled_max) / 2
    }

    pub fn contains(&self, scaled: i64) -> bool {
        scaled >= self.scaled_min as i64 && scaled <= self.scaled_max as i64
    }

    pub fn clamp(&self, scaled: i64) -> u32 {
        scaled.clamp(self.scaled_min as i64, self.scaled_max as i64) as u32
    }
}

impl From<&OscillatorSettings> for OscillatorLimits {
    fn from(settings: &OscillatorSettings) -> Self {
        Self {
            step_hz: settings.step_hz,
            scaled_min: settings.scaled_min,
            scaled_max: settings.scaled_max,
        }
    }
}

/// Actuator for one local oscillator. Calls complete before returning.
pub trait Oscillator: Send {
    fn limits(&self) -> OscillatorLimits;
    fn scaled_frequency(&self) -> u32;
    fn set_scaled_frequency(&mut self, scaled: u32) -> DrxResult<()>;
}

/// In-memory oscillator used when no hardware is attached.
#[derive(Debug, Clone)]
pub struct SimulatedOscillator {
    limits: OscillatorLimits,
    scaled: u32,
    failures_pending: u32,
}

impl SimulatedOscillator {
    pub fn new(limits: OscillatorLimits) -> Self {
        Self {
            limits,
            scaled: limits.scaled_min,
            failures_pending: 0,
        }
    }

    /// Makes the next `count` set requests fail.
    pub fn fail_next(mut self, count: u32) -> Self {
        self.failures_pending = count;
        self
    }
}

impl Oscillator for SimulatedOscillator {
    fn limits(&self) -> OscillatorLimits {
        self.limits
    }

    fn scaled_frequency(&self) -> u32 {
        self.scaled
    }

    fn set_scaled_frequency(&mut self, scaled: u32) -> DrxResult<()> {
        if self.failures_pending > 0 {
            self.failures_pending -= 1;
            return Err(DrxError::Internal("no status reply".into()));
        }
        self.scaled = scaled;
        Ok(())
    }
}

/// Lock-free view of the four oscillator frequencies in Hz.
///
/// Status reporting reads this while the control thread may be in the middle
/// of an adjustment, so a reading can mix old and new values.
#[derive(Debug, Clone, Default)]
pub struct OscillatorReadout {
    hz: Arc<[AtomicU64; 4]>,
}

impl OscillatorReadout {
    pub fn frequency_hz(&self, id: OscillatorId) -> u64 {
        self.hz[id.index()].load(Ordering::Relaxed)
    }

    pub fn frequencies_hz(&self) -> [u64; 4] {
        OscillatorId::ALL.map(|id| self.frequency_hz(id))
    }

    /// Transmitter frequency implied by the oscillator settings.
    pub fn derived_tx_frequency_hz(&self) -> u64 {
        let [f0, _, f2, f3] = self.frequencies_hz();
        2 * f2 + f0 + f3 + TX_FREQUENCY_OFFSET_HZ
    }

    fn store(&self, id: OscillatorId, hz: u64) {
        self.hz[id.index()].store(hz, Ordering::Relaxed);
    }
}

/// The four actuators plus the published readout.
pub struct OscillatorBank {
    oscillators: [Box<dyn Oscillator>; 4],
    readout: OscillatorReadout,
    max_attempts: u32,
}

impl OscillatorBank {
    pub fn new(oscillators: [Box<dyn Oscillator>; 4]) -> Self {
        let bank = Self {
            oscillators,
            readout: OscillatorReadout::default(),
            max_attempts: DEFAULT_SET_ATTEMPTS,
        };
        for id in OscillatorId::ALL {
            bank.publish(id);
        }
        bank
    }

    /// Bank of simulated oscillators with the configured ranges.
    pub fn simulated(table: &OscillatorTable) -> Self {
        let [o0, o1, o2, o3] = table
            .as_array()
            .map(|settings| SimulatedOscillator::new(OscillatorLimits::from(&settings)));
        Self::new([Box::new(o0), Box::new(o1), Box::new(o2), Box::new(o3)])
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn readout(&self) -> OscillatorReadout {
        self.readout.clone()
    }

    pub fn limits(&self, id: OscillatorId) -> OscillatorLimits {
        self.oscillators[id.index()].limits()
    }

    pub fn scaled(&self, id: OscillatorId) -> u32 {
        self.oscillators[id.index()].scaled_frequency()
    }

    /// Programs one oscillator, clamping the target into its range and
    /// retrying failed requests. Returns the frequency actually applied.
    pub fn set_scaled(&mut self, id: OscillatorId, target: i64) -> DrxResult<u32> {
        let limits = self.limits(id);
        let scaled = limits.clamp(target);
        if !limits.contains(target) {
            warn!(
                "Oscillator {} target {} outside [{}, {}], using {}",
                id.index(),
                target,
                limits.scaled_min,
                limits.scaled_max,
                scaled
            );
        }

        let oscillator = &mut self.oscillators[id.index()];
        let mut last_error = None;
        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                warn!("...try again to set oscillator {} frequency", id.index());
            }
            match oscillator.set_scaled_frequency(scaled) {
                Ok(()) => {
                    last_error = None;
                    break;
                }
                Err(err) => last_error = Some(err),
            }
        }
        self.publish(id);
        match last_error {
            None => Ok(scaled),
            Some(err) => Err(DrxError::Oscillator {
                index: id.index(),
                message: format!("gave up after {} attempts: {err}", self.max_attempts),
            }),
        }
    }

    /// Programs all four oscillators from the table: the AFC start point when
    /// `afc_enabled`, otherwise the fixed operating frequencies.
    pub fn program_initial(&mut self, table: &OscillatorTable, afc_enabled: bool) -> DrxResult<()> {
        for (id, settings) in OscillatorId::ALL.into_iter().zip(table.as_array()) {
            let scaled = if afc_enabled {
                settings.initial_scaled
            } else {
                settings.fixed_scaled
            };
            self.set_scaled(id, scaled as i64)?;
        }
        info!(
            "Oscillators set to {:?} Hz ({})",
            self.readout.frequencies_hz(),
            if afc_enabled { "AFC start" } else { "fixed" }
        );
        Ok(())
    }

    fn publish(&self, id: OscillatorId) {
        let oscillator = &self.oscillators[id.index()];
        let hz = oscillator.scaled_frequency() as u64 * oscillator.limits().step_hz as u64;
        self.readout.store(id, hz);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_target_is_clamped() {
        let mut bank = OscillatorBank::simulated(&OscillatorTable::default());
        assert_eq!(bank.set_scaled(OscillatorId::Osc3, 2_500).unwrap(), 2_160);
        assert_eq!(bank.set_scaled(OscillatorId::Osc3, -4).unwrap(), 2_140);
        assert_eq!(bank.scaled(OscillatorId::Osc3), 2_140);
    }

    #[test]
    fn readout_tracks_settings() {
        let mut bank = OscillatorBank::simulated(&OscillatorTable::default());
        bank.program_initial(&OscillatorTable::default(), true).unwrap();
        let readout = bank.readout();
        assert_eq!(readout.frequency_hz(OscillatorId::Osc0), 1_500_000_000);
        assert_eq!(readout.frequency_hz(OscillatorId::Osc2), 16_500_000_000);
        assert_eq!(readout.frequency_hz(OscillatorId::Osc3), 107_500_000);
        assert_eq!(
            readout.derived_tx_frequency_hz(),
            2 * 16_500_000_000 + 1_500_000_000 + 107_500_000 + 25_000_000
        );
    }

    #[test]
    fn fixed_frequencies_when_afc_disabled() {
        let mut bank = OscillatorBank::simulated(&OscillatorTable::default());
        bank.program_initial(&OscillatorTable::default(), false).unwrap();
        let readout = bank.readout();
        assert_eq!(readout.frequency_hz(OscillatorId::Osc0), 1_560_000_000);
        assert_eq!(readout.frequency_hz(OscillatorId::Osc1), 132_800_000);
        assert_eq!(readout.frequency_hz(OscillatorId::Osc3), 107_800_000);
    }

    #[test]
    fn failed_set_is_retried() {
        let table = OscillatorTable::default();
        let flaky = SimulatedOscillator::new(OscillatorLimits::from(&table.osc1)).fail_next(2);
        let steady = |s: &OscillatorSettings| SimulatedOscillator::new(OscillatorLimits::from(s));
        let mut bank = OscillatorBank::new([
            Box::new(steady(&table.osc0)),
            Box::new(flaky),
            Box::new(steady(&table.osc2)),
            Box::new(steady(&table.osc3)),
        ]);
        assert_eq!(bank.set_scaled(OscillatorId::Osc1, 13_000).unwrap(), 13_000);
    }

    #[test]
    fn persistent_failure_surfaces_after_bounded_attempts() {
        let table = OscillatorTable::default();
        let dead = SimulatedOscillator::new(OscillatorLimits::from(&table.osc0)).fail_next(10);
        let steady = |s: &OscillatorSettings| SimulatedOscillator::new(OscillatorLimits::from(s));
        let mut bank = OscillatorBank::new([
            Box::new(dead),
            Box::new(steady(&table.osc1)),
            Box::new(steady(&table.osc2)),
            Box::new(steady(&table.osc3)),
        ])
        .with_max_attempts(3);
        let err = bank.set_scaled(OscillatorId::Osc0, 15_500).unwrap_err();
        assert!(matches!(err, DrxError::Oscillator { index: 0, .. }));
    }
}
