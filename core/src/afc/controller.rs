use crate::afc::averager::{Admission, FrequencyAverage, FrequencySample, SampleAverager};
use crate::afc::blanking::{BlankingEvent, BlankingQueue, BlankingReport};
use crate::afc::oscillator::{OscillatorBank, OscillatorId, OscillatorReadout};
use crate::config::DrxConfig;
use crate::prelude::{DrxError, DrxResult};
use crate::shutdown::ShutdownToken;
use crate::telemetry::{AfcMetrics, LogThrottle};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, info, warn};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const WORKER_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AfcMode {
    Searching,
    Tracking,
}

/// What the state machine did with one average.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfcOutcome {
    EnteredTracking,
    /// Lost G0; oscillator 0 restarted at its minimum.
    EnteredSearching { osc0: u32 },
    SearchStep { osc0: u32 },
    WithinDeadband,
    Adjusted { osc0: u32, osc1: u32, osc3: u32 },
}

impl AfcOutcome {
    /// True when oscillators were reprogrammed and in-flight data is stale.
    pub fn retuned(&self) -> bool {
        !matches!(self, AfcOutcome::EnteredTracking | AfcOutcome::WithinDeadband)
    }
}

#[derive(Debug, Clone, Copy)]
struct AfcTuning {
    g0_threshold_dbm: f64,
    coarse_step: u32,
    fine_step: u32,
    deadband_hz: f64,
    search_pulses: u32,
    track_pulses: u32,
}

/// Mode, running average and oscillators; everything the control lock
/// protects.
pub struct AfcCore {
    mode: AfcMode,
    averager: SampleAverager,
    bank: OscillatorBank,
    tuning: AfcTuning,
}

impl AfcCore {
    pub fn new(config: &DrxConfig, bank: OscillatorBank) -> Self {
        let tuning = AfcTuning {
            g0_threshold_dbm: config.afc_g0_threshold_dbm,
            coarse_step: config.afc_coarse_step,
            fine_step: config.afc_fine_step,
            deadband_hz: config.afc_deadband_hz,
            search_pulses: config.afc_search_pulses,
            track_pulses: config.afc_track_pulses,
        };
        Self {
            mode: AfcMode::Searching,
            averager: SampleAverager::new(
                tuning.search_pulses,
                config.afc_coast_pulses,
                config.allow_blanking,
            ),
            bank,
            tuning,
        }
    }

    pub fn mode(&self) -> AfcMode {
        self.mode
    }

    pub fn block_size(&self) -> u32 {
        self.averager.block_size()
    }

    pub fn bank(&self) -> &OscillatorBank {
        &self.bank
    }

    pub fn admit(&mut self, sample: FrequencySample, blanking: Option<bool>) -> Admission {
        let tracking = self.mode == AfcMode::Tracking;
        self.averager.admit(sample, blanking, tracking)
    }

    /// Runs one step of the SEARCHING / TRACKING state machine.
    pub fn process_average(&mut self, average: &FrequencyAverage) -> DrxResult<AfcOutcome> {
        info!(
            "New {}-pulse average: G0 {:.2} dBm, freq offset {:.0} Hz",
            average.sample_count, average.g0_power_avg, average.freq_offset
        );
        let new_mode = if average.g0_power_avg < self.tuning.g0_threshold_dbm {
            AfcMode::Searching
        } else {
            AfcMode::Tracking
        };

        match (self.mode, new_mode) {
            (AfcMode::Tracking, AfcMode::Searching) => {
                warn!(
                    "G0 power {:.2} dBm has dropped below min of {:.2} dBm. Returning to SEARCH mode.",
                    average.g0_power_avg, self.tuning.g0_threshold_dbm
                );
                self.mode = AfcMode::Searching;
                self.averager.restart(self.tuning.search_pulses);
                let min = self.bank.limits(OscillatorId::Osc0).scaled_min;
                let osc0 = self.bank.set_scaled(OscillatorId::Osc0, min as i64)?;
                Ok(AfcOutcome::EnteredSearching { osc0 })
            }
            (AfcMode::Searching, AfcMode::Searching) => self.search_step(),
            (AfcMode::Searching, AfcMode::Tracking) => {
                info!("G0 power is high enough, entering tracking mode");
                self.mode = AfcMode::Tracking;
                self.averager.restart(self.tuning.track_pulses);
                Ok(AfcOutcome::EnteredTracking)
            }
            (AfcMode::Tracking, AfcMode::Tracking) => self.track(average.freq_offset),
        }
    }

    fn search_step(&mut self) -> DrxResult<AfcOutcome> {
        let limits = self.bank.limits(OscillatorId::Osc0);
        let current = self.bank.scaled(OscillatorId::Osc0) as i64;
        let mut next = current + (self.tuning.coarse_step / limits.step_hz) as i64;
        if next > limits.scaled_max as i64 {
            warn!(
                "SEARCH starting again at min frequency ({} x {}) Hz",
                limits.scaled_min, limits.step_hz
            );
            next = limits.scaled_min as i64;
        } else {
            debug!(
                "SEARCH stepping oscillator 0 frequency to ({} x {}) Hz",
                next, limits.step_hz
            );
        }
        let osc0 = self.bank.set_scaled(OscillatorId::Osc0, next)?;
        Ok(AfcOutcome::SearchStep { osc0 })
    }

    fn track(&mut self, freq_offset: f64) -> DrxResult<AfcOutcome> {
        if freq_offset.abs() < self.tuning.deadband_hz {
            debug!(
                "Frequency offset {:.0} Hz inside dead-band, nothing to do",
                freq_offset
            );
            return Ok(AfcOutcome::WithinDeadband);
        }

        let fine = self.tuning.fine_step as i64;
        let step0 = self.bank.limits(OscillatorId::Osc0).step_hz as i64;
        let step1 = self.bank.limits(OscillatorId::Osc1).step_hz as i64;
        let limits3 = self.bank.limits(OscillatorId::Osc3);
        let step3 = limits3.step_hz as i64;

        let cur0 = self.bank.scaled(OscillatorId::Osc0) as i64;
        let cur1 = self.bank.scaled(OscillatorId::Osc1) as i64;
        let cur3 = self.bank.scaled(OscillatorId::Osc3) as i64;

        let fine_steps = (freq_offset / fine as f64).round() as i64;
        let mut osc0_steps = 0;
        let mut osc1_steps = fine_steps * (fine / step1);
        let mut osc3_steps = fine_steps * (fine / step3);

        if !limits3.contains(cur3 + osc3_steps) {
            // recentre 3 (and 1 with it), remainder goes to oscillator 0
            osc3_steps = limits3.scaled_center() as i64 - cur3;
            osc1_steps = osc3_steps * (step3 / step1);
            let remainder = freq_offset - (osc3_steps * step3) as f64;
            osc0_steps = (remainder / fine as f64).round() as i64 * (fine / step0);
        }

        info!(
            "TRACKING: Changing 0 by {} Hz, 1 and 3 by {} Hz",
            osc0_steps * step0,
            osc3_steps * step3
        );
        let result = self.retune(
            [
                (OscillatorId::Osc0, cur0 + osc0_steps),
                (OscillatorId::Osc1, cur1 + osc1_steps),
                (OscillatorId::Osc3, cur3 + osc3_steps),
            ],
            [cur0, cur1, cur3],
        );
        self.averager.clear();
        let [osc0, osc1, osc3] = result?;
        Ok(AfcOutcome::Adjusted { osc0, osc1, osc3 })
    }

    /// Applies the targets in order. When one write fails, the oscillators
    /// already moved are put back to `previous` so 1 and 3 stay in step.
    fn retune(
        &mut self,
        targets: [(OscillatorId, i64); 3],
        previous: [i64; 3],
    ) -> DrxResult<[u32; 3]> {
        let mut applied = [0u32; 3];
        for (index, &(id, target)) in targets.iter().enumerate() {
            match self.bank.set_scaled(id, target) {
                Ok(scaled) => applied[index] = scaled,
                Err(err) => {
                    for (&(moved, _), &scaled) in targets[..index].iter().zip(&previous) {
                        if let Err(restore_err) = self.bank.set_scaled(moved, scaled) {
                            error!(
                                "Could not restore oscillator {}: {}",
                                moved.index(),
                                restore_err
                            );
                        }
                    }
                    return Err(err);
                }
            }
        }
        Ok(applied)
    }
}

/// Thread-safe front end of the AFC: the per-pulse admission path, blanking
/// reports and the control worker all go through here.
pub struct AfcController {
    core: Mutex<AfcCore>,
    blanking: Mutex<BlankingQueue>,
    averages_tx: Sender<FrequencyAverage>,
    averages_rx: Receiver<FrequencyAverage>,
    readout: OscillatorReadout,
    metrics: Arc<AfcMetrics>,
    throttle: LogThrottle,
    enabled: bool,
    latency: Duration,
}

impl AfcController {
    /// Programs the oscillators for start-up and builds the controller. With
    /// AFC disabled the oscillators stay at their fixed frequencies.
    pub fn new(config: &DrxConfig, mut bank: OscillatorBank) -> DrxResult<Self> {
        bank.program_initial(&config.oscillators, config.afc_enabled)?;
        if config.afc_enabled {
            info!(
                "AFC enabled: G0 threshold {} dBm, coarse step {} Hz, fine step {} Hz, latency {} s",
                config.afc_g0_threshold_dbm,
                config.afc_coarse_step,
                config.afc_fine_step,
                config.afc_max_data_latency
            );
        } else {
            info!("AFC disabled, oscillators held at fixed frequencies");
        }
        let readout = bank.readout();
        let (averages_tx, averages_rx) = channel::bounded(1);
        Ok(Self {
            core: Mutex::new(AfcCore::new(config, bank)),
            blanking: Mutex::new(BlankingQueue::new()),
            averages_tx,
            averages_rx,
            readout,
            metrics: Arc::new(AfcMetrics::new()),
            throttle: LogThrottle::new(config.progress_log_interval),
            enabled: config.afc_enabled,
            latency: config.afc_latency(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn metrics(&self) -> Arc<AfcMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn readout(&self) -> OscillatorReadout {
        self.readout.clone()
    }

    /// Per-pulse measurement entry point. Never blocks: if the control lock
    /// is held the sample is counted and dropped.
    pub fn submit_sample(&self, g0_power_dbm: f64, freq_offset_hz: f64, seq_num: i64) {
        let received = self.metrics.record_received();
        if self.throttle.due(received) {
            let snapshot = self.metrics.snapshot();
            debug!(
                "{} pulses received, {} dropped, {} dropped while blanking",
                received, snapshot.dropped_busy, snapshot.dropped_blanked
            );
        }
        if !self.enabled {
            return;
        }

        let Some(mut core) = self.core.try_lock() else {
            self.metrics.record_busy_drop();
            return;
        };
        // held only for map updates, never across the control lock
        let blanking = self.blanking.lock().drain_through(seq_num);

        let sample = FrequencySample {
            g0_power_dbm,
            freq_offset_hz,
            seq_num,
        };
        let admission = core.admit(sample, blanking);
        drop(core);
        match admission {
            Admission::Summed => self.metrics.record_summed(),
            Admission::Blanked => self.metrics.record_blanked_drop(),
            Admission::Coasting => self.metrics.record_coasting_drop(),
            Admission::Completed(average) => {
                self.metrics.record_summed();
                self.publish(average);
            }
        }
    }

    /// Latest average wins: a block the worker has not picked up yet is
    /// replaced.
    fn publish(&self, average: FrequencyAverage) {
        self.metrics.record_average();
        if let Err(TrySendError::Full(average)) = self.averages_tx.try_send(average) {
            if self.averages_rx.try_recv().is_ok() {
                self.metrics.record_average_overwritten();
            }
            if self.averages_tx.try_send(average).is_err() {
                self.metrics.record_average_overwritten();
            }
        }
    }

    /// Records a blanking transition taking effect at `seq_num`. Callable
    /// from any thread.
    pub fn report_blanking(&self, seq_num: i64, enabled: bool) -> BlankingReport {
        self.blanking.lock().report(seq_num, enabled)
    }

    pub fn pending_blanking(&self) -> Vec<BlankingEvent> {
        self.blanking.lock().pending()
    }

    /// Takes the control lock the way an oscillator adjustment does. Samples
    /// submitted while the guard lives are dropped.
    pub fn begin_adjustment(&self) -> MutexGuard<'_, AfcCore> {
        self.core.lock()
    }

    pub fn mode(&self) -> AfcMode {
        self.core.lock().mode()
    }

    /// Waits for one average and applies it. Returns `None` on timeout.
    ///
    /// The control lock stays held through the post-adjustment latency sleep,
    /// so samples measured on the old frequencies are dropped.
    pub fn run_once(&self, timeout: Duration, shutdown: &ShutdownToken) -> Option<AfcOutcome> {
        let average = match self.averages_rx.recv_timeout(timeout) {
            Ok(average) => average,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return None,
        };
        let mut core = self.core.lock();
        match core.process_average(&average) {
            Ok(outcome) => {
                if outcome.retuned() {
                    self.metrics.record_adjustment();
                    if !self.latency.is_zero() {
                        shutdown.sleep(self.latency);
                    }
                }
                Some(outcome)
            }
            Err(err) => {
                error!("AFC adjustment failed: {}", err);
                None
            }
        }
    }

    /// Control-thread loop; returns once shutdown is requested.
    pub fn run(&self, shutdown: &ShutdownToken) {
        info!("AFC control thread started");
        while !shutdown.is_triggered() {
            self.run_once(WORKER_POLL, shutdown);
        }
        info!("AFC control thread stopped");
    }

    /// Starts the control thread. Nothing is spawned when AFC is disabled.
    pub fn spawn(self: &Arc<Self>, shutdown: ShutdownToken) -> DrxResult<Option<JoinHandle<()>>> {
        if !self.enabled {
            return Ok(None);
        }
        let controller = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("afc-control".into())
            .spawn(move || controller.run(&shutdown))
            .map_err(|err| DrxError::Internal(format!("failed to start AFC thread: {err}")))?;
        Ok(Some(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::afc::oscillator::{OscillatorLimits, SimulatedOscillator};

    fn average(power: f64, offset: f64) -> FrequencyAverage {
        FrequencyAverage {
            g0_power_avg: power,
            freq_offset: offset,
            sample_count: 10,
            seq_num: 0,
        }
    }

    fn core() -> AfcCore {
        let config = DrxConfig::default();
        let mut bank = OscillatorBank::simulated(&config.oscillators);
        bank.program_initial(&config.oscillators, true).unwrap();
        AfcCore::new(&config, bank)
    }

    fn tracking_core() -> AfcCore {
        let mut core = core();
        core.process_average(&average(-10.0, 0.0)).unwrap();
        assert_eq!(core.mode(), AfcMode::Tracking);
        core
    }

    #[test]
    fn threshold_power_enters_tracking() {
        let mut core = core();
        assert_eq!(core.block_size(), 10);
        let outcome = core.process_average(&average(-25.0, 0.0)).unwrap();
        assert_eq!(outcome, AfcOutcome::EnteredTracking);
        assert_eq!(core.mode(), AfcMode::Tracking);
        assert_eq!(core.block_size(), 50);
    }

    #[test]
    fn below_threshold_stays_searching() {
        let mut core = core();
        let outcome = core.process_average(&average(-26.0, 0.0)).unwrap();
        assert_eq!(outcome, AfcOutcome::SearchStep { osc0: 15_005 });
        assert_eq!(core.mode(), AfcMode::Searching);
        assert_eq!(core.block_size(), 10);
    }

    #[test]
    fn losing_g0_returns_to_search_at_minimum() {
        let mut core = tracking_core();
        core.process_average(&average(-10.0, 2.0e5)).unwrap();
        let outcome = core.process_average(&average(-26.0, 0.0)).unwrap();
        assert_eq!(outcome, AfcOutcome::EnteredSearching { osc0: 15_000 });
        assert_eq!(core.block_size(), 10);
    }

    #[test]
    fn search_wraps_past_maximum() {
        let mut core = core();
        core.bank.set_scaled(OscillatorId::Osc0, 16_000).unwrap();
        let outcome = core.process_average(&average(-40.0, 0.0)).unwrap();
        assert_eq!(outcome, AfcOutcome::SearchStep { osc0: 15_000 });
    }

    #[test]
    fn small_offset_is_ignored() {
        let mut core = tracking_core();
        let outcome = core.process_average(&average(-10.0, 5.9e4)).unwrap();
        assert_eq!(outcome, AfcOutcome::WithinDeadband);
        assert!(!outcome.retuned());
    }

    #[test]
    fn offset_absorbed_by_oscillators_three_and_one() {
        let mut core = tracking_core();
        // 300 kHz = 3 fine steps = 6 steps of osc3, 30 steps of osc1
        let outcome = core.process_average(&average(-10.0, 3.0e5)).unwrap();
        assert_eq!(
            outcome,
            AfcOutcome::Adjusted {
                osc0: 15_000,
                osc1: 13_280,
                osc3: 2_156,
            }
        );
    }

    #[test]
    fn large_offset_recentres_and_moves_oscillator_zero() {
        let mut core = tracking_core();
        core.bank.set_scaled(OscillatorId::Osc3, 2_158).unwrap();
        core.bank.set_scaled(OscillatorId::Osc1, 13_290).unwrap();
        // 2158 + 2*8 is past 2160: recentre osc3 (-8 steps, -400 kHz), osc1
        // follows (-40 steps), remaining 1.2 MHz lands on osc0 (+12 steps)
        let outcome = core.process_average(&average(-10.0, 8.0e5)).unwrap();
        assert_eq!(
            outcome,
            AfcOutcome::Adjusted {
                osc0: 15_012,
                osc1: 13_250,
                osc3: 2_150,
            }
        );
    }

    #[test]
    fn disabled_controller_only_counts() {
        let config = DrxConfig {
            afc_enabled: false,
            ..Default::default()
        };
        let controller =
            AfcController::new(&config, OscillatorBank::simulated(&config.oscillators)).unwrap();
        for seq in 0..20 {
            controller.submit_sample(-10.0, 0.0, seq);
        }
        let snapshot = controller.metrics().snapshot();
        assert_eq!(snapshot.received, 20);
        assert_eq!(snapshot.summed, 0);
        assert_eq!(controller.readout().frequency_hz(OscillatorId::Osc0), 1_560_000_000);
    }

    #[test]
    fn completed_block_reaches_worker() {
        let config = DrxConfig {
            afc_max_data_latency: 0.0,
            ..Default::default()
        };
        let controller =
            AfcController::new(&config, OscillatorBank::simulated(&config.oscillators)).unwrap();
        for seq in 1..=10 {
            controller.submit_sample(-10.0, 0.0, seq);
        }
        let outcome = controller.run_once(Duration::from_secs(1), &ShutdownToken::new());
        assert_eq!(outcome, Some(AfcOutcome::EnteredTracking));
        assert_eq!(controller.mode(), AfcMode::Tracking);
    }

    #[test]
    fn unread_average_is_replaced() {
        let config = DrxConfig::default();
        let controller =
            AfcController::new(&config, OscillatorBank::simulated(&config.oscillators)).unwrap();
        for seq in 1..=20 {
            controller.submit_sample(-40.0, 0.0, seq);
        }
        let snapshot = controller.metrics().snapshot();
        assert_eq!(snapshot.averages_published, 2);
        assert_eq!(snapshot.averages_overwritten, 1);
        let latest = controller.averages_rx.try_recv().unwrap();
        assert_eq!(latest.seq_num, 20);
    }

    #[test]
    fn blanked_samples_are_dropped_by_controller() {
        let config = DrxConfig::default();
        let controller =
            AfcController::new(&config, OscillatorBank::simulated(&config.oscillators)).unwrap();
        controller.report_blanking(5, true);
        for seq in 1..=30 {
            controller.submit_sample(-10.0, 0.0, seq);
        }
        let snapshot = controller.metrics().snapshot();
        assert_eq!(snapshot.summed, 4);
        assert_eq!(snapshot.dropped_blanked, 26);
        assert_eq!(snapshot.averages_published, 0);
    }

    #[test]
    fn allow_blanking_starts_blanked() {
        let config = DrxConfig {
            allow_blanking: true,
            ..Default::default()
        };
        let controller =
            AfcController::new(&config, OscillatorBank::simulated(&config.oscillators)).unwrap();
        controller.submit_sample(-10.0, 0.0, 1);
        controller.report_blanking(2, false);
        controller.submit_sample(-10.0, 0.0, 2);
        let snapshot = controller.metrics().snapshot();
        assert_eq!(snapshot.dropped_blanked, 1);
        assert_eq!(snapshot.summed, 1);
    }

    #[test]
    fn failed_oscillator_three_leaves_one_and_three_in_step() {
        let config = DrxConfig::default();
        let table = &config.oscillators;
        let steady = |s: &crate::config::OscillatorSettings| {
            SimulatedOscillator::new(OscillatorLimits::from(s))
        };
        let bank = OscillatorBank::new([
            Box::new(steady(&table.osc0)),
            Box::new(steady(&table.osc1)),
            Box::new(steady(&table.osc2)),
            Box::new(steady(&table.osc3).fail_next(1)),
        ])
        .with_max_attempts(1);
        let mut core = AfcCore::new(&config, bank);
        core.process_average(&average(-10.0, 0.0)).unwrap();
        core.admit(
            FrequencySample {
                g0_power_dbm: -10.0,
                freq_offset_hz: 0.0,
                seq_num: 1,
            },
            None,
        );
        assert_eq!(core.averager.n_summed(), 1);

        let result = core.process_average(&average(-10.0, 3.0e5));
        assert!(matches!(result, Err(DrxError::Oscillator { index: 3, .. })));
        assert_eq!(core.bank().scaled(OscillatorId::Osc1), 12_750);
        assert_eq!(core.bank().scaled(OscillatorId::Osc3), 2_140);
        assert_eq!(core.averager.n_summed(), 0);

        // the next adjustment moves both again
        let outcome = core.process_average(&average(-10.0, 3.0e5)).unwrap();
        assert_eq!(
            outcome,
            AfcOutcome::Adjusted {
                osc0: 15_000,
                osc1: 12_780,
                osc3: 2_146,
            }
        );
    }

    #[test]
    fn blanking_reported_under_contention_still_drops_samples() {
        let config = DrxConfig::default();
        let controller = Arc::new(
            AfcController::new(&config, OscillatorBank::simulated(&config.oscillators)).unwrap(),
        );
        controller.report_blanking(5, true);
        for seq in 1..=4 {
            controller.submit_sample(-10.0, 0.0, seq);
        }

        let (locked_tx, locked_rx) = channel::bounded(0);
        let holder = {
            let controller = Arc::clone(&controller);
            thread::spawn(move || {
                let _queue = controller.blanking.lock();
                locked_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(50));
            })
        };
        locked_rx.recv().unwrap();
        for seq in 5..=10 {
            controller.submit_sample(-10.0, 0.0, seq);
        }
        holder.join().unwrap();

        let snapshot = controller.metrics().snapshot();
        assert_eq!(snapshot.summed, 4);
        assert_eq!(snapshot.dropped_blanked, 6);
        assert_eq!(snapshot.averages_published, 0);
    }
}
