use crate::generator::template::{add_into, tone};
use kadrxcore::ingest::{BurstData, G0Estimate, PulseData, PulseTime};
use kadrxcore::math::StatsHelper;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Synthetic digitizer and transmitter behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Pulses to generate; 0 runs until interrupted.
    pub pulses: u64,
    pub seed: u64,
    /// Sleep one PRT per pulse instead of running flat out.
    pub realtime: bool,
    pub burst_samples: usize,
    /// Probability that a channel loses a given pulse.
    pub h_drop_probability: f64,
    pub v_drop_probability: f64,
    pub burst_drop_probability: f64,
    /// Hz, true magnetron frequency at start-up
    pub tx_frequency_hz: f64,
    /// Hz/s of simulated time
    pub tx_drift_hz_per_sec: f64,
    /// dBm of G0 with zero frequency offset
    pub g0_peak_dbm: f64,
    pub g0_floor_dbm: f64,
    /// Hz; offset at which G0 has fallen by 10 dB
    pub capture_bandwidth_hz: f64,
    /// Hz, uniform error on each frequency estimate
    pub freq_noise_hz: f64,
    /// counts
    pub noise_amplitude: f64,
    pub target_gate: usize,
    pub target_amplitude: f64,
    /// Toggle transmit blanking every this many pulses; 0 disables.
    pub blanking_interval: u64,
    pub monitor_refresh_secs: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            pulses: 20_000,
            seed: 0,
            realtime: false,
            burst_samples: 32,
            h_drop_probability: 0.0,
            v_drop_probability: 0.0,
            burst_drop_probability: 0.0,
            tx_frequency_hz: 34.6328e9,
            tx_drift_hz_per_sec: 0.0,
            g0_peak_dbm: -10.0,
            g0_floor_dbm: -80.0,
            capture_bandwidth_hz: 1.0e6,
            freq_noise_hz: 5.0e3,
            noise_amplitude: 8.0,
            target_gate: 100,
            target_amplitude: 2000.0,
            blanking_interval: 0,
            monitor_refresh_secs: 1.0,
        }
    }
}

impl SimulationConfig {
    /// True transmitter frequency after `elapsed_secs` of simulated time.
    pub fn tx_frequency_at(&self, elapsed_secs: f64) -> f64 {
        self.tx_frequency_hz + self.tx_drift_hz_per_sec * elapsed_secs
    }

    /// G0 power seen with the receiver mistuned by `offset_hz`.
    pub fn g0_power_dbm(&self, offset_hz: f64) -> f64 {
        let relative = offset_hz / self.capture_bandwidth_hz.max(1.0);
        (self.g0_peak_dbm - 10.0 * relative * relative).max(self.g0_floor_dbm)
    }
}

/// Pulse timing shared by the channel generators: sequence numbers map to
/// times through the (possibly staggered) PRT.
#[derive(Debug, Clone, Copy)]
pub struct PulseClock {
    start: PulseTime,
    prt1: f64,
    prt2: f64,
    staggered: bool,
}

impl PulseClock {
    pub fn new(start: PulseTime, prt1: f64, prt2: f64, staggered: bool) -> Self {
        Self {
            start,
            prt1,
            prt2,
            staggered,
        }
    }

    pub fn elapsed_secs(&self, seq_num: i64) -> f64 {
        if !self.staggered {
            return seq_num as f64 * self.prt1;
        }
        let pairs = seq_num / 2;
        let odd = seq_num % 2;
        pairs as f64 * (self.prt1 + self.prt2) + odd as f64 * self.prt1
    }

    pub fn time_of(&self, seq_num: i64) -> PulseTime {
        let total_nanos = self.start.nanos as f64 + self.elapsed_secs(seq_num) * 1.0e9;
        let secs = (total_nanos / 1.0e9).floor();
        let nanos = (total_nanos - secs * 1.0e9) as u32;
        PulseTime::new(self.start.secs + secs as i64, nanos.min(999_999_999))
    }
}

/// Noise plus one point target for the H or V digitizer channel.
pub struct PulseGenerator {
    channel_id: u32,
    gates: usize,
    target: Vec<i16>,
    noise_amplitude: f64,
    drop_probability: f64,
    rng: StdRng,
    scratch: Vec<i16>,
}

impl PulseGenerator {
    pub fn new(
        config: &SimulationConfig,
        channel_id: u32,
        gates: usize,
        drop_probability: f64,
    ) -> Self {
        let mut target = vec![0i16; gates * 2];
        if config.target_gate < gates {
            let gate = config.target_gate;
            target[gate * 2..gate * 2 + 2]
                .copy_from_slice(&tone(1, 0.0, config.target_amplitude, 0.0));
        }
        Self {
            channel_id,
            gates,
            target,
            noise_amplitude: config.noise_amplitude,
            drop_probability,
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(channel_id as u64)),
            scratch: Vec::with_capacity(gates * 2),
        }
    }

    /// Fills `pulse` for `seq_num`, or returns false when this channel loses
    /// the pulse.
    pub fn fill(&mut self, pulse: &mut PulseData, seq_num: i64, time: PulseTime) -> bool {
        if self.drop_probability > 0.0 && self.rng.gen_bool(self.drop_probability.min(1.0)) {
            return false;
        }
        self.scratch.clear();
        for _ in 0..self.gates * 2 {
            let noise = self.rng.gen_range(-1.0f64..=1.0) * self.noise_amplitude;
            self.scratch.push(noise.round() as i16);
        }
        add_into(&mut self.scratch, &self.target);
        pulse.set(seq_num, self.channel_id, time, &self.scratch);
        true
    }
}

/// Reference-channel bursts, with the G0 estimates derived from the current
/// mistuning of the receiver.
pub struct BurstGenerator {
    config: SimulationConfig,
    sample_frequency: f64,
    rng: StdRng,
}

/// What one burst measured, as handed to the AFC.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurstMeasurement {
    pub g0_power_dbm: f64,
    pub freq_offset_hz: f64,
}

impl BurstGenerator {
    pub fn new(config: &SimulationConfig, sample_frequency: f64) -> Self {
        Self {
            config: config.clone(),
            sample_frequency,
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(0xb0)),
        }
    }

    pub fn drops_pulse(&mut self) -> bool {
        let p = self.config.burst_drop_probability;
        p > 0.0 && self.rng.gen_bool(p.min(1.0))
    }

    /// Fills `burst` for a receiver mistuned by `offset_hz`.
    pub fn fill(
        &mut self,
        burst: &mut BurstData,
        seq_num: i64,
        time: PulseTime,
        offset_hz: f64,
    ) -> BurstMeasurement {
        let power_dbm = self.config.g0_power_dbm(offset_hz);
        let noise = self.config.freq_noise_hz;
        let measured_offset = if noise > 0.0 {
            offset_hz + self.rng.gen_range(-noise..=noise)
        } else {
            offset_hz
        };
        let phase: f64 = self.rng.gen_range(-std::f64::consts::PI..std::f64::consts::PI);

        // counts for the G0 power, referenced to 0 dBm at full scale
        let amplitude = (i16::MAX as f64) * 10f64.powf(power_dbm / 20.0);
        let iq = tone(
            self.config.burst_samples,
            offset_hz / self.sample_frequency.max(1.0),
            amplitude,
            phase,
        );
        let burst_power = StatsHelper::mean_power_dbm(&iq, i16::MAX as f64);
        let g0 = G0Estimate {
            power_dbm: if burst_power.is_finite() {
                burst_power
            } else {
                power_dbm
            },
            phase_deg: phase.to_degrees(),
            ival_norm: phase.cos(),
            qval_norm: phase.sin(),
            freq_hz: measured_offset,
            freq_corr_hz: -measured_offset,
        };
        burst.set(seq_num, time, g0, &iq);
        BurstMeasurement {
            g0_power_dbm: power_dbm,
            freq_offset_hz: measured_offset,
        }
    }
}
