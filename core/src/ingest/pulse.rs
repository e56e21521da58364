use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// UTC time split into whole seconds and nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PulseTime {
    pub secs: i64,
    pub nanos: u32,
}

impl PulseTime {
    pub fn new(secs: i64, nanos: u32) -> Self {
        Self { secs, nanos }
    }

    pub fn now() -> Self {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => Self {
                secs: elapsed.as_secs() as i64,
                nanos: elapsed.subsec_nanos(),
            },
            Err(_) => Self::default(),
        }
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.secs as f64 + self.nanos as f64 * 1.0e-9
    }
}

/// Channel identifiers used by the digitizer.
pub const CHANNEL_H: u32 = 0;
pub const CHANNEL_V: u32 = 1;
pub const CHANNEL_BURST: u32 = 2;

/// I/Q samples of one pulse from one receive channel.
///
/// Instances are recycled through the channel rings, so `set` reuses the
/// existing sample allocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PulseData {
    pub seq_num: i64,
    pub time: PulseTime,
    pub channel_id: u32,
    pub gates: usize,
    /// Interleaved I,Q per gate; `2 * gates` values.
    pub iq: Vec<i16>,
}

impl PulseData {
    pub fn set(&mut self, seq_num: i64, channel_id: u32, time: PulseTime, iq: &[i16]) {
        self.seq_num = seq_num;
        self.channel_id = channel_id;
        self.time = time;
        self.gates = iq.len() / 2;
        self.iq.clear();
        self.iq.extend_from_slice(&iq[..self.gates * 2]);
    }
}

/// Reference-channel burst for one transmitted pulse, with the G0 estimates
/// derived from it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BurstData {
    pub seq_num: i64,
    pub time: PulseTime,
    pub g0_power_dbm: f64,
    pub g0_phase_deg: f64,
    /// Unit phasor of the burst's G0 sample.
    pub g0_ival_norm: f64,
    pub g0_qval_norm: f64,
    pub g0_freq_hz: f64,
    pub g0_freq_corr_hz: f64,
    pub samples: usize,
    pub iq: Vec<i16>,
}

/// G0 estimates carried with a burst.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct G0Estimate {
    pub power_dbm: f64,
    pub phase_deg: f64,
    pub ival_norm: f64,
    pub qval_norm: f64,
    pub freq_hz: f64,
    pub freq_corr_hz: f64,
}

impl BurstData {
    pub fn set(&mut self, seq_num: i64, time: PulseTime, g0: G0Estimate, iq: &[i16]) {
        self.seq_num = seq_num;
        self.time = time;
        self.g0_power_dbm = g0.power_dbm;
        self.g0_phase_deg = g0.phase_deg;
        self.g0_ival_norm = g0.ival_norm;
        self.g0_qval_norm = g0.qval_norm;
        self.g0_freq_hz = g0.freq_hz;
        self.g0_freq_corr_hz = g0.freq_corr_hz;
        self.samples = iq.len() / 2;
        self.iq.clear();
        self.iq.extend_from_slice(&iq[..self.samples * 2]);
    }
}

/// H, V and burst data for one physical pulse.
#[derive(Debug)]
pub struct SynchronizedTriple {
    pub h: PulseData,
    pub v: PulseData,
    pub burst: BurstData,
}

impl SynchronizedTriple {
    pub fn seq_num(&self) -> i64 {
        self.h.seq_num
    }

    /// Published gate count: the larger of the two polarizations.
    pub fn gates(&self) -> usize {
        self.h.gates.max(self.v.gates)
    }

    pub fn time(&self) -> PulseTime {
        self.h.time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulse_set_reuses_allocation() {
        let mut pulse = PulseData::default();
        pulse.set(1, CHANNEL_H, PulseTime::new(10, 0), &[1, 2, 3, 4, 5, 6]);
        let capacity = pulse.iq.capacity();
        pulse.set(2, CHANNEL_H, PulseTime::new(10, 100), &[7, 8]);
        assert_eq!(pulse.gates, 1);
        assert_eq!(pulse.iq, vec![7, 8]);
        assert_eq!(pulse.iq.capacity(), capacity);
    }

    #[test]
    fn triple_publishes_larger_gate_count() {
        let mut h = PulseData::default();
        h.set(5, CHANNEL_H, PulseTime::default(), &[0; 8]);
        let mut v = PulseData::default();
        v.set(5, CHANNEL_V, PulseTime::default(), &[0; 12]);
        let triple = SynchronizedTriple {
            h,
            v,
            burst: BurstData::default(),
        };
        assert_eq!(triple.gates(), 6);
        assert_eq!(triple.seq_num(), 5);
    }
}
