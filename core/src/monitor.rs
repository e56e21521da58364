//! Read-only hardware health snapshots consumed by status reporting.
//!
//! The transmitter daemon and the receiver monitor refresh on their own
//! cadence (about 1 Hz); this core only ever reads the latest snapshot.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Transmitter fault categories tracked with a count and last-fault time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransmitterFault {
    MagnetronCurrent,
    Blower,
    SafetyInterlock,
    ReversePower,
    PulseInput,
    HvpsCurrent,
    WaveguidePressure,
    HvpsUnderVoltage,
    HvpsOverVoltage,
}

impl TransmitterFault {
    pub const ALL: [TransmitterFault; 9] = [
        TransmitterFault::MagnetronCurrent,
        TransmitterFault::Blower,
        TransmitterFault::SafetyInterlock,
        TransmitterFault::ReversePower,
        TransmitterFault::PulseInput,
        TransmitterFault::HvpsCurrent,
        TransmitterFault::WaveguidePressure,
        TransmitterFault::HvpsUnderVoltage,
        TransmitterFault::HvpsOverVoltage,
    ];

    /// Element-name stem used in the status document.
    pub fn tag(self) -> &'static str {
        match self {
            TransmitterFault::MagnetronCurrent => "magnetronCurrentFault",
            TransmitterFault::Blower => "blowerFault",
            TransmitterFault::SafetyInterlock => "safetyInterlock",
            TransmitterFault::ReversePower => "reversePowerFault",
            TransmitterFault::PulseInput => "pulseInputFault",
            TransmitterFault::HvpsCurrent => "hvpsCurrentFault",
            TransmitterFault::WaveguidePressure => "waveguidePressureFault",
            TransmitterFault::HvpsUnderVoltage => "hvpsUnderVoltage",
            TransmitterFault::HvpsOverVoltage => "hvpsOverVoltage",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultHistory {
    pub count: i32,
    /// Unix seconds of the most recent occurrence, -1 if never.
    pub last_time: i64,
}

impl Default for FaultHistory {
    fn default() -> Self {
        Self {
            count: -1,
            last_time: -1,
        }
    }
}

/// Snapshot of the transmitter daemon's status. Unknown values default to
/// false / -1 / -9999.9.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmitterStatus {
    pub serial_connected: bool,
    pub fault_summary: bool,
    pub hvps_runup: bool,
    pub standby: bool,
    pub heater_warmup: bool,
    pub cooldown: bool,
    pub unit_on: bool,
    pub magnetron_current_fault: bool,
    pub blower_fault: bool,
    pub hvps_on: bool,
    pub remote_enabled: bool,
    pub safety_interlock: bool,
    pub reverse_power_fault: bool,
    pub pulse_input_fault: bool,
    pub hvps_current_fault: bool,
    pub waveguide_pressure_fault: bool,
    pub hvps_under_voltage: bool,
    pub hvps_over_voltage: bool,
    /// kV
    pub hvps_voltage: f64,
    /// A
    pub magnetron_current: f64,
    /// A
    pub hvps_current: f64,
    /// C
    pub temperature: f64,
    pub faults: [FaultHistory; 9],
    pub auto_pulse_fault_resets: i32,
}

impl Default for TransmitterStatus {
    fn default() -> Self {
        Self {
            serial_connected: false,
            fault_summary: false,
            hvps_runup: false,
            standby: false,
            heater_warmup: false,
            cooldown: false,
            unit_on: false,
            magnetron_current_fault: false,
            blower_fault: false,
            hvps_on: false,
            remote_enabled: false,
            safety_interlock: false,
            reverse_power_fault: false,
            pulse_input_fault: false,
            hvps_current_fault: false,
            waveguide_pressure_fault: false,
            hvps_under_voltage: false,
            hvps_over_voltage: false,
            hvps_voltage: -9999.9,
            magnetron_current: -9999.9,
            hvps_current: -9999.9,
            temperature: -9999.9,
            faults: [FaultHistory::default(); 9],
            auto_pulse_fault_resets: -1,
        }
    }
}

impl TransmitterStatus {
    pub fn fault(&self, fault: TransmitterFault) -> FaultHistory {
        self.faults[fault.index()]
    }

    pub fn fault_mut(&mut self, fault: TransmitterFault) -> &mut FaultHistory {
        &mut self.faults[fault.index()]
    }

    /// Boolean flags in status-document order.
    pub fn flags(&self) -> [(&'static str, bool); 18] {
        [
            ("serialConnected", self.serial_connected),
            ("faultSummary", self.fault_summary),
            ("hvpsRunup", self.hvps_runup),
            ("standby", self.standby),
            ("heaterWarmup", self.heater_warmup),
            ("cooldown", self.cooldown),
            ("unitOn", self.unit_on),
            ("magnetronCurrentFault", self.magnetron_current_fault),
            ("blowerFault", self.blower_fault),
            ("hvpsOn", self.hvps_on),
            ("remoteEnabled", self.remote_enabled),
            ("safetyInterlock", self.safety_interlock),
            ("reversePowerFault", self.reverse_power_fault),
            ("pulseInputFault", self.pulse_input_fault),
            ("hvpsCurrentFault", self.hvps_current_fault),
            ("waveguidePressureFault", self.waveguide_pressure_fault),
            ("hvpsUnderVoltage", self.hvps_under_voltage),
            ("hvpsOverVoltage", self.hvps_over_voltage),
        ]
    }

    pub fn analog(&self) -> [(&'static str, f64); 4] {
        [
            ("hvpsVoltage", self.hvps_voltage),
            ("magnetronCurrent", self.magnetron_current),
            ("hvpsCurrent", self.hvps_current),
            ("temperature", self.temperature),
        ]
    }
}

/// Snapshot of the receiver enclosure monitor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReceiverStatus {
    /// C
    pub proc_enclosure_temp: f32,
    pub proc_drx_temp: f32,
    pub tx_enclosure_temp: f32,
    pub rx_top_temp: f32,
    pub rx_back_temp: f32,
    pub rx_front_temp: f32,
    /// dBm, raw power detector readings
    pub h_tx_power_video: f32,
    pub v_tx_power_video: f32,
    pub test_target_power_video: f32,
    /// V
    pub ps_voltage: f32,
    pub wg_pressure_good: bool,
    pub locked_100mhz: bool,
    pub gps_time_server_good: bool,
}

impl Default for ReceiverStatus {
    fn default() -> Self {
        Self {
            proc_enclosure_temp: -99.9,
            proc_drx_temp: -99.9,
            tx_enclosure_temp: -99.9,
            rx_top_temp: -99.9,
            rx_back_temp: -99.9,
            rx_front_temp: -99.9,
            h_tx_power_video: -99.9,
            v_tx_power_video: -99.9,
            test_target_power_video: -99.9,
            ps_voltage: 0.0,
            wg_pressure_good: false,
            locked_100mhz: false,
            gps_time_server_good: false,
        }
    }
}

impl ReceiverStatus {
    pub fn analog(&self) -> [(&'static str, f32); 10] {
        [
            ("procEnclosureTemp", self.proc_enclosure_temp),
            ("procDrxTemp", self.proc_drx_temp),
            ("txEnclosureTemp", self.tx_enclosure_temp),
            ("rxTopTemp", self.rx_top_temp),
            ("rxBackTemp", self.rx_back_temp),
            ("rxFrontTemp", self.rx_front_temp),
            ("hTxPowerVideo", self.h_tx_power_video),
            ("vTxPowerVideo", self.v_tx_power_video),
            ("testTargetPowerVideo", self.test_target_power_video),
            ("psVoltage", self.ps_voltage),
        ]
    }

    pub fn flags(&self) -> [(&'static str, bool); 3] {
        [
            ("wgPressureGood", self.wg_pressure_good),
            ("locked100MHz", self.locked_100mhz),
            ("gpsTimeServerGood", self.gps_time_server_good),
        ]
    }
}

pub trait TransmitterStatusSource: Send + Sync {
    fn transmitter_status(&self) -> TransmitterStatus;
}

pub trait ReceiverMonitor: Send + Sync {
    fn receiver_status(&self) -> ReceiverStatus;
}

/// Latest-value cache written by whatever polls the hardware and read by
/// the status aggregator.
#[derive(Debug, Default)]
pub struct MonitorCache {
    transmitter: RwLock<TransmitterStatus>,
    receiver: RwLock<ReceiverStatus>,
}

impl MonitorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_transmitter(&self, status: TransmitterStatus) {
        *self.transmitter.write() = status;
    }

    pub fn update_receiver(&self, status: ReceiverStatus) {
        *self.receiver.write() = status;
    }
}

impl TransmitterStatusSource for MonitorCache {
    fn transmitter_status(&self) -> TransmitterStatus {
        self.transmitter.read().clone()
    }
}

impl ReceiverMonitor for MonitorCache {
    fn receiver_status(&self) -> ReceiverStatus {
        *self.receiver.read()
    }
}
