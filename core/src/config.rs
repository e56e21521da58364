use crate::prelude::{DrxError, DrxResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Speed of light, m/s.
pub const SPEED_OF_LIGHT: f64 = 2.99792458e8;

/// Static bounds and start-up settings of one oscillator, all frequencies in
/// units of the oscillator's step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OscillatorSettings {
    pub step_hz: u32,
    pub scaled_min: u32,
    pub scaled_max: u32,
    /// Start frequency when AFC is running.
    pub initial_scaled: u32,
    /// Operating frequency used when AFC is disabled.
    pub fixed_scaled: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OscillatorTable {
    pub osc0: OscillatorSettings,
    pub osc1: OscillatorSettings,
    pub osc2: OscillatorSettings,
    pub osc3: OscillatorSettings,
}

impl OscillatorTable {
    pub fn as_array(&self) -> [OscillatorSettings; 4] {
        [self.osc0, self.osc1, self.osc2, self.osc3]
    }
}

impl Default for OscillatorTable {
    fn default() -> Self {
        Self {
            // 1.5-1.6 GHz
            osc0: OscillatorSettings {
                step_hz: 100_000,
                scaled_min: 15_000,
                scaled_max: 16_000,
                initial_scaled: 15_000,
                fixed_scaled: 15_600,
            },
            // 127.5-137.5 MHz, tracks oscillator 3
            osc1: OscillatorSettings {
                step_hz: 10_000,
                scaled_min: 12_750,
                scaled_max: 13_750,
                initial_scaled: 13_250,
                fixed_scaled: 13_280,
            },
            // set-and-forget at 16.5 GHz
            osc2: OscillatorSettings {
                step_hz: 1_000_000,
                scaled_min: 16_000,
                scaled_max: 17_000,
                initial_scaled: 16_500,
                fixed_scaled: 16_500,
            },
            // 107-108 MHz, third-stage downconverter
            osc3: OscillatorSettings {
                step_hz: 50_000,
                scaled_min: 2_140,
                scaled_max: 2_160,
                initial_scaled: 2_150,
                fixed_scaled: 2_156,
            },
        }
    }
}

/// Radar, timing, streaming and AFC parameters, read once at start-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DrxConfig {
    pub radar_id: String,
    pub site_name: String,

    pub gates: usize,
    pub staggered_prt: bool,
    /// seconds
    pub prt1: f64,
    /// seconds
    pub prt2: f64,
    /// Transmit H only, receive co- and cross-polar.
    pub ldr_mode: bool,

    /// W
    pub tx_peak_power: f64,
    /// Hz
    pub tx_cntr_freq: f64,
    /// seconds
    pub tx_pulse_width: f64,
    /// dB
    pub tx_waveguide_loss: f64,

    /// dB
    pub rcvr_waveguide_loss: f64,
    /// dB
    pub rcvr_filter_mismatch: f64,
    /// seconds; sets the gate spacing
    pub rcvr_pulse_width: f64,
    pub rcvr_h_power_corr: f64,
    pub rcvr_v_power_corr: f64,
    /// metres
    pub range_to_gate0: f64,

    pub ant_gain: f64,
    pub ant_hbeam_width: f64,
    pub ant_vbeam_width: f64,

    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,

    /// Hz
    pub burst_sample_frequency: f64,
    pub iqcount_scale_for_mw: f64,

    pub merge_queue_size: usize,
    pub iwrf_server_tcp_port: u16,
    pub pulse_interval_per_iwrf_meta_data: u64,
    pub status_interval_secs: f64,

    pub cohere_iq_to_burst: bool,
    pub combine_every_second_gate: bool,

    pub simulate_antenna_angles: bool,
    pub sim_n_elev: u32,
    pub sim_start_elev: f64,
    pub sim_delta_elev: f64,
    /// deg/s
    pub sim_az_rate: f64,

    pub afc_enabled: bool,
    pub afc_g0_threshold_dbm: f64,
    /// Hz
    pub afc_coarse_step: u32,
    /// Hz
    pub afc_fine_step: u32,
    pub afc_search_pulses: u32,
    pub afc_track_pulses: u32,
    /// Hz
    pub afc_deadband_hz: f64,
    pub afc_coast_pulses: i64,
    /// seconds
    pub afc_max_data_latency: f64,
    pub allow_blanking: bool,
    pub oscillators: OscillatorTable,

    pub progress_log_interval: u64,
}

impl Default for DrxConfig {
    fn default() -> Self {
        Self {
            radar_id: "KA".to_string(),
            site_name: "field".to_string(),
            gates: 400,
            staggered_prt: false,
            prt1: 1.0e-4,
            prt2: 1.5e-4,
            ldr_mode: false,
            tx_peak_power: 1700.0,
            tx_cntr_freq: 34.83e9,
            tx_pulse_width: 2.56e-7,
            tx_waveguide_loss: 0.8,
            rcvr_waveguide_loss: 1.2,
            rcvr_filter_mismatch: 1.5,
            rcvr_pulse_width: 2.5e-7,
            rcvr_h_power_corr: 0.0,
            rcvr_v_power_corr: 0.0,
            range_to_gate0: 0.0,
            ant_gain: 49.0,
            ant_hbeam_width: 0.33,
            ant_vbeam_width: 0.33,
            latitude: 40.0,
            longitude: -105.0,
            altitude: 1600.0,
            burst_sample_frequency: 125.0e6,
            iqcount_scale_for_mw: 9_900.0,
            merge_queue_size: 1000,
            iwrf_server_tcp_port: 12000,
            pulse_interval_per_iwrf_meta_data: 5000,
            status_interval_secs: 2.0,
            cohere_iq_to_burst: false,
            combine_every_second_gate: false,
            simulate_antenna_angles: false,
            sim_n_elev: 10,
            sim_start_elev: 0.5,
            sim_delta_elev: 1.0,
            sim_az_rate: 10.0,
            afc_enabled: true,
            afc_g0_threshold_dbm: -25.0,
            afc_coarse_step: 500_000,
            afc_fine_step: 100_000,
            afc_search_pulses: 10,
            afc_track_pulses: 50,
            afc_deadband_hz: 6.0e4,
            afc_coast_pulses: 20_000,
            afc_max_data_latency: 0.5,
            allow_blanking: false,
            oscillators: OscillatorTable::default(),
            progress_log_interval: 5000,
        }
    }
}

impl DrxConfig {
    pub fn validate(&self) -> DrxResult<()> {
        if self.gates == 0 {
            return Err(DrxError::Config("gates must be positive".into()));
        }
        if self.prt1 <= 0.0 || (self.staggered_prt && self.prt2 <= 0.0) {
            return Err(DrxError::Config("PRT must be positive".into()));
        }
        if self.merge_queue_size == 0 {
            return Err(DrxError::Config("merge_queue_size must be positive".into()));
        }
        if self.afc_search_pulses == 0 || self.afc_track_pulses == 0 {
            return Err(DrxError::Config("AFC block sizes must be positive".into()));
        }
        if self.afc_coast_pulses < 0 {
            return Err(DrxError::Config("afc_coast_pulses must not be negative".into()));
        }
        if !self.status_interval_secs.is_finite() || self.status_interval_secs <= 0.0 {
            return Err(DrxError::Config(
                "status_interval_secs must be positive and finite".into(),
            ));
        }
        if !self.afc_max_data_latency.is_finite() {
            return Err(DrxError::Config("afc_max_data_latency must be finite".into()));
        }

        for (index, osc) in self.oscillators.as_array().iter().enumerate() {
            if osc.step_hz == 0 {
                return Err(DrxError::Config(format!("oscillator {index} has a zero step")));
            }
            if osc.scaled_min > osc.scaled_max {
                return Err(DrxError::Config(format!(
                    "oscillator {index} minimum {} exceeds maximum {}",
                    osc.scaled_min, osc.scaled_max
                )));
            }
            let bounds = osc.scaled_min..=osc.scaled_max;
            if !bounds.contains(&osc.initial_scaled) || !bounds.contains(&osc.fixed_scaled) {
                return Err(DrxError::Config(format!(
                    "oscillator {index} start frequency outside [{}, {}]",
                    osc.scaled_min, osc.scaled_max
                )));
            }
        }

        // The AFC steps are split across oscillators 0, 1 and 3, so each must
        // divide evenly into all three step sizes.
        let table = &self.oscillators;
        for (label, step) in [
            ("afc_coarse_step", self.afc_coarse_step),
            ("afc_fine_step", self.afc_fine_step),
        ] {
            let divisible = [table.osc0.step_hz, table.osc1.step_hz, table.osc3.step_hz]
                .iter()
                .all(|osc_step| step % osc_step == 0);
            if step == 0 || !divisible {
                return Err(DrxError::Config(format!(
                    "{label} of {step} Hz must be a multiple of {}, {} and {} Hz",
                    table.osc0.step_hz, table.osc1.step_hz, table.osc3.step_hz
                )));
            }
        }
        Ok(())
    }

    pub fn wavelength_m(&self) -> f64 {
        SPEED_OF_LIGHT / self.tx_cntr_freq
    }

    pub fn gate_spacing_m(&self) -> f64 {
        SPEED_OF_LIGHT * self.rcvr_pulse_width / 2.0
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs_f64(self.status_interval_secs)
    }

    pub fn afc_latency(&self) -> Duration {
        Duration::from_secs_f64(self.afc_max_data_latency.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        DrxConfig::default().validate().unwrap();
    }

    #[test]
    fn coarse_step_must_divide_oscillator_steps() {
        let config = DrxConfig {
            afc_coarse_step: 125_000,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(DrxError::Config(_))));
    }

    #[test]
    fn initial_frequency_outside_bounds_is_rejected() {
        let mut config = DrxConfig::default();
        config.oscillators.osc3.initial_scaled = 3_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_finite_durations_are_rejected() {
        for interval in [f64::NAN, f64::INFINITY] {
            let config = DrxConfig {
                status_interval_secs: interval,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(DrxError::Config(_))));
        }
        let config = DrxConfig {
            afc_max_data_latency: f64::INFINITY,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(DrxError::Config(_))));
    }

    #[test]
    fn gate_spacing_follows_receiver_pulse_width() {
        let config = DrxConfig {
            rcvr_pulse_width: 2.0e-7,
            ..Default::default()
        };
        assert!((config.gate_spacing_m() - 29.979_245_8).abs() < 1e-6);
    }
}
