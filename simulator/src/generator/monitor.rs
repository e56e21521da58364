use kadrxcore::monitor::{MonitorCache, ReceiverStatus, TransmitterFault, TransmitterStatus};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Wandering transmitter and receiver readings for the monitor cache.
pub struct MonitorSimulator {
    rng: StdRng,
    refreshes: u64,
    blower_faults: i32,
}

impl MonitorSimulator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed.wrapping_add(0x4d4f4e)),
            refreshes: 0,
            blower_faults: 0,
        }
    }

    fn jitter(&mut self, center: f64, spread: f64) -> f64 {
        center + self.rng.gen_range(-spread..=spread)
    }

    pub fn transmitter(&mut self) -> TransmitterStatus {
        let mut status = TransmitterStatus {
            serial_connected: true,
            unit_on: true,
            hvps_on: true,
            remote_enabled: true,
            hvps_voltage: self.jitter(12.2, 0.1),
            magnetron_current: self.jitter(5.5, 0.05),
            hvps_current: self.jitter(0.12, 0.01),
            temperature: self.jitter(38.0, 0.5),
            ..Default::default()
        };
        // an occasional blower glitch so the fault history has content
        if self.rng.gen_bool(0.01) {
            self.blower_faults += 1;
        }
        if self.blower_faults > 0 {
            let fault = status.fault_mut(TransmitterFault::Blower);
            fault.count = self.blower_faults;
            fault.last_time = self.refreshes as i64;
        }
        status
    }

    pub fn receiver(&mut self) -> ReceiverStatus {
        ReceiverStatus {
            proc_enclosure_temp: self.jitter(31.0, 0.3) as f32,
            proc_drx_temp: self.jitter(45.0, 0.3) as f32,
            tx_enclosure_temp: self.jitter(33.0, 0.3) as f32,
            rx_top_temp: self.jitter(29.5, 0.2) as f32,
            rx_back_temp: self.jitter(29.0, 0.2) as f32,
            rx_front_temp: self.jitter(28.5, 0.2) as f32,
            h_tx_power_video: self.jitter(-8.0, 0.2) as f32,
            v_tx_power_video: self.jitter(-30.0, 0.2) as f32,
            test_target_power_video: self.jitter(-60.0, 0.5) as f32,
            ps_voltage: self.jitter(5.0, 0.02) as f32,
            wg_pressure_good: true,
            locked_100mhz: true,
            gps_time_server_good: true,
        }
    }

    /// Pushes one fresh reading of both monitors into `cache`.
    pub fn refresh(&mut self, cache: &MonitorCache) {
        self.refreshes += 1;
        let transmitter = self.transmitter();
        let receiver = self.receiver();
        cache.update_transmitter(transmitter);
        cache.update_receiver(receiver);
    }
}
