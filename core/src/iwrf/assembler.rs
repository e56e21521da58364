use crate::config::DrxConfig;
use crate::ingest::{PulseTime, SynchronizedTriple, CHANNEL_BURST};
use crate::iwrf::packet::{
    BurstRecord, Calibration, Packet, PulseRecord, RadarInfo, TsProcessing, XmitPower,
    PULSE_FLAG_COHERED, PULSE_FLAG_GATES_COMBINED, PULSE_FLAG_SIMULATED_ANGLES,
};
use crate::math::stats::StatsHelper;
use crate::monitor::ReceiverStatus;
use crate::prelude::{DrxResult, GateGeometry};
use log::debug;

/// Half the peak power goes to each polarization in simultaneous mode.
const HALF_POWER_DB: f64 = 3.0103;

const PLATFORM_FIXED: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AntennaAngles {
    pub elevation: f64,
    pub azimuth: f64,
    pub volume: i32,
    pub sweep: i32,
}

/// Stand-in antenna: constant-rate azimuth rotation stepping through a fixed
/// list of elevations, one per revolution.
#[derive(Debug, Clone)]
pub struct AngleSimulator {
    az_per_pulse: f64,
    n_elev: u32,
    start_elev: f64,
    delta_elev: f64,
    azimuth: f64,
    elev_index: u32,
    volume: i32,
}

impl AngleSimulator {
    pub fn new(config: &DrxConfig) -> Self {
        Self {
            az_per_pulse: config.sim_az_rate * config.prt1,
            n_elev: config.sim_n_elev.max(1),
            start_elev: config.sim_start_elev,
            delta_elev: config.sim_delta_elev,
            azimuth: 0.0,
            elev_index: 0,
            volume: 0,
        }
    }

    pub fn next_angles(&mut self) -> AntennaAngles {
        let angles = AntennaAngles {
            elevation: self.start_elev + self.delta_elev * self.elev_index as f64,
            azimuth: self.azimuth,
            volume: self.volume,
            sweep: self.elev_index as i32,
        };
        let advanced = self.azimuth + self.az_per_pulse;
        let revolutions = (advanced / 360.0).floor().max(0.0) as u64;
        self.azimuth = advanced.rem_euclid(360.0);
        if revolutions > 0 {
            let sweeps = self.elev_index as u64 + revolutions;
            self.elev_index = (sweeps % self.n_elev as u64) as u32;
            self.volume += (sweeps / self.n_elev as u64) as i32;
        }
        angles
    }
}

/// Turns configuration and synchronized pulses into wire packets. Owns the
/// packet sequence counter and the metadata resend cadence.
pub struct PacketAssembler {
    config: DrxConfig,
    packet_seq: u64,
    buffer: Vec<u8>,
    metadata_interval: u64,
    pulses_since_metadata: u64,
    last_gates: Option<usize>,
    angles: Option<AngleSimulator>,
}

impl PacketAssembler {
    pub fn new(config: DrxConfig) -> Self {
        let angles = config
            .simulate_antenna_angles
            .then(|| AngleSimulator::new(&config));
        Self {
            metadata_interval: config.pulse_interval_per_iwrf_meta_data.max(1),
            config,
            packet_seq: 0,
            buffer: Vec::new(),
            pulses_since_metadata: 0,
            last_gates: None,
            angles,
        }
    }

    /// Sequence number the next assembled packet will carry.
    pub fn next_packet_seq(&self) -> u64 {
        self.packet_seq
    }

    /// Encodes a packet with the next sequence number. The returned bytes
    /// stay valid until the next call.
    pub fn assemble(&mut self, packet: &Packet<'_>, time: PulseTime) -> DrxResult<&[u8]> {
        packet.encode(self.packet_seq, time, &mut self.buffer)?;
        self.packet_seq += 1;
        Ok(&self.buffer)
    }

    /// Counts a pulse and reports whether the metadata set must go out
    /// before it: on the first pulse, on a gate-count change, or once the
    /// resend interval has elapsed.
    pub fn metadata_due(&mut self, n_gates: usize) -> bool {
        let due = self.last_gates != Some(n_gates)
            || self.pulses_since_metadata >= self.metadata_interval;
        if due {
            if let Some(previous) = self.last_gates.filter(|&g| g != n_gates) {
                debug!("Gate count changed from {} to {}", previous, n_gates);
            }
            self.last_gates = Some(n_gates);
            self.pulses_since_metadata = 0;
        }
        self.pulses_since_metadata += 1;
        due
    }

    fn pulse_flags(&self) -> u32 {
        let mut flags = 0;
        if self.config.cohere_iq_to_burst {
            flags |= PULSE_FLAG_COHERED;
        }
        if self.config.combine_every_second_gate {
            flags |= PULSE_FLAG_GATES_COMBINED;
        }
        if self.angles.is_some() {
            flags |= PULSE_FLAG_SIMULATED_ANGLES;
        }
        flags
    }

    fn wavelength_cm(&self) -> f32 {
        (self.config.wavelength_m() * 100.0) as f32
    }

    pub fn radar_info(&self) -> Packet<'static> {
        let config = &self.config;
        Packet::RadarInfo(RadarInfo {
            latitude: config.latitude as f32,
            longitude: config.longitude as f32,
            altitude: config.altitude as f32,
            platform_type: PLATFORM_FIXED,
            beamwidth_h: config.ant_hbeam_width as f32,
            beamwidth_v: config.ant_vbeam_width as f32,
            wavelength_cm: self.wavelength_cm(),
            radar_name: config.radar_id.clone(),
            site_name: config.site_name.clone(),
        })
    }

    pub fn ts_processing(&self, geometry: &GateGeometry) -> Packet<'static> {
        let config = &self.config;
        Packet::TsProcessing(TsProcessing {
            pol_mode: config.ldr_mode as i32,
            prt_mode: config.staggered_prt as i32,
            prt1: config.prt1 as f32,
            prt2: if config.staggered_prt {
                config.prt2 as f32
            } else {
                config.prt1 as f32
            },
            pulse_width_us: (config.rcvr_pulse_width * 1.0e6) as f32,
            start_range_m: geometry.start_range_m as f32,
            gate_spacing_m: geometry.gate_spacing_m as f32,
            n_gates: geometry.n_gates as u32,
            cohered: config.cohere_iq_to_burst,
            gates_combined: config.combine_every_second_gate,
        })
    }

    pub fn calibration(&self) -> Packet<'static> {
        let config = &self.config;
        let peak_dbm = StatsHelper::watts_to_dbm(config.tx_peak_power);
        let per_channel_dbm = if config.ldr_mode {
            peak_dbm
        } else {
            peak_dbm - HALF_POWER_DB
        };
        let two_way_loss = (config.tx_waveguide_loss + config.rcvr_waveguide_loss) as f32;
        Packet::Calibration(Calibration {
            wavelength_cm: self.wavelength_cm(),
            beamwidth_h: config.ant_hbeam_width as f32,
            beamwidth_v: config.ant_vbeam_width as f32,
            gain_h: config.ant_gain as f32,
            gain_v: config.ant_gain as f32,
            pulse_width_us: (config.tx_pulse_width * 1.0e6) as f32,
            xmit_power_h_dbm: per_channel_dbm as f32,
            xmit_power_v_dbm: per_channel_dbm as f32,
            two_way_waveguide_loss_h: two_way_loss,
            two_way_waveguide_loss_v: two_way_loss,
            receiver_mismatch_loss: config.rcvr_filter_mismatch as f32,
        })
    }

    /// Advances the simulated antenna, if enabled.
    pub fn pulse<'a>(
        &mut self,
        triple: &'a SynchronizedTriple,
        geometry: &GateGeometry,
    ) -> Packet<'a> {
        let flags = self.pulse_flags();
        let angles = match self.angles.as_mut() {
            Some(sim) => sim.next_angles(),
            None => AntennaAngles {
                elevation: 0.0,
                azimuth: 0.0,
                volume: 0,
                sweep: 0,
            },
        };
        let config = &self.config;
        let (prt, prt_next) = if config.staggered_prt && triple.seq_num() % 2 != 0 {
            (config.prt2, config.prt1)
        } else if config.staggered_prt {
            (config.prt1, config.prt2)
        } else {
            (config.prt1, config.prt1)
        };
        let burst = &triple.burst;
        Packet::Pulse(PulseRecord {
            seq_num: triple.seq_num(),
            n_gates: geometry.n_gates as u32,
            flags,
            elevation: angles.elevation as f32,
            azimuth: angles.azimuth as f32,
            prt: prt as f32,
            prt_next: prt_next as f32,
            pulse_width_us: (config.rcvr_pulse_width * 1.0e6) as f32,
            start_range_m: geometry.start_range_m as f32,
            gate_spacing_m: geometry.gate_spacing_m as f32,
            burst_power_h: burst.g0_power_dbm as f32,
            burst_power_v: burst.g0_power_dbm as f32,
            burst_phase_h: burst.g0_phase_deg as f32,
            burst_phase_v: burst.g0_phase_deg as f32,
            iq_scale: config.iqcount_scale_for_mw as f32,
            volume: angles.volume,
            sweep: angles.sweep,
            h: &triple.h.iq,
            v: &triple.v.iq,
            burst: &burst.iq,
        })
    }

    pub fn burst<'a>(&self, triple: &'a SynchronizedTriple) -> Packet<'a> {
        let burst = &triple.burst;
        Packet::Burst(BurstRecord {
            seq_num: burst.seq_num,
            channel_id: CHANNEL_BURST,
            power_dbm: burst.g0_power_dbm as f32,
            phase_deg: burst.g0_phase_deg as f32,
            freq_hz: burst.g0_freq_hz as f32,
            freq_corr_hz: burst.g0_freq_corr_hz as f32,
            sampling_freq_hz: self.config.burst_sample_frequency as f32,
            iq: &burst.iq,
        })
    }

    /// Transmit power from the receiver's power detectors plus the configured
    /// coupler corrections.
    pub fn xmit_power(&self, receiver: &ReceiverStatus) -> Packet<'static> {
        Packet::XmitPower(XmitPower {
            h_dbm: (receiver.h_tx_power_video as f64 + self.config.rcvr_h_power_corr) as f32,
            v_dbm: (receiver.v_tx_power_video as f64 + self.config.rcvr_v_power_corr) as f32,
        })
    }

    /// Geometry for the configured gates before any stage runs.
    pub fn base_geometry(&self, n_gates: usize) -> GateGeometry {
        GateGeometry {
            n_gates,
            start_range_m: self.config.range_to_gate0,
            gate_spacing_m: self.config.gate_spacing_m(),
        }
    }
}
