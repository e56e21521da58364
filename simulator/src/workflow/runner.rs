use crate::generator::monitor::MonitorSimulator;
use crate::generator::profile::{BurstGenerator, PulseClock, PulseGenerator, SimulationConfig};
use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use kadrxcore::afc::{AfcController, AfcMode, OscillatorBank};
use kadrxcore::ingest::{BurstData, PulseData, PulseTime, RecyclingRing, CHANNEL_H, CHANNEL_V};
use kadrxcore::iwrf::{PacketSink, SendOutcome, StatusAggregator};
use kadrxcore::monitor::MonitorCache;
use kadrxcore::processing::{ChannelRings, PulseSynchronizer};
use kadrxcore::telemetry::{AfcSnapshot, StreamMetrics, StreamSnapshot};
use kadrxcore::{IwrfStreamer, ShutdownToken};
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const FULL_RING_BACKOFF: Duration = Duration::from_micros(50);
const DRAIN_POLL: Duration = Duration::from_millis(20);
const DRAIN_LIMIT: Duration = Duration::from_secs(2);
const DRAIN_STALL_POLLS: u32 = 5;

/// Summary written at the end of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub pulses_generated: u64,
    pub elapsed_secs: f64,
    pub stream: StreamSnapshot,
    pub afc: AfcSnapshot,
    pub ring_overruns: u64,
    pub afc_mode: AfcMode,
    pub oscillator_hz: [u64; 4],
    pub derived_tx_hz: u64,
    pub actual_tx_hz: f64,
    pub residual_offset_hz: f64,
}

/// Discards packets, keeping only counts.
#[derive(Debug, Default)]
pub struct NullSink {
    pub packets: u64,
    pub bytes: u64,
}

impl PacketSink for NullSink {
    fn send(&mut self, packet: &[u8]) -> SendOutcome {
        self.packets += 1;
        self.bytes += packet.len() as u64;
        SendOutcome::Written
    }
}

/// Decides when a producer may write its next pulse.
#[derive(Debug, Clone, Copy)]
struct Pacer {
    clock: PulseClock,
    started: Instant,
    realtime: bool,
}

impl Pacer {
    /// Waits for the pulse's slot, or for room in the ring when running flat
    /// out. Returns false once shutdown has been requested.
    fn wait_turn<T: Default>(
        &self,
        seq_num: i64,
        ring: &RecyclingRing<T>,
        shutdown: &ShutdownToken,
    ) -> bool {
        if self.realtime {
            let due = self.started + Duration::from_secs_f64(self.clock.elapsed_secs(seq_num));
            let now = Instant::now();
            if due > now {
                thread::sleep(due - now);
            }
        } else {
            while ring.len() >= ring.capacity() {
                if shutdown.is_triggered() {
                    return false;
                }
                thread::sleep(FULL_RING_BACKOFF);
            }
        }
        !shutdown.is_triggered()
    }
}

fn last_seq_num(simulation: &SimulationConfig) -> i64 {
    if simulation.pulses == 0 {
        i64::MAX
    } else {
        simulation.pulses as i64
    }
}

fn spawn_named<T, F>(name: &str, body: F) -> anyhow::Result<JoinHandle<T>>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .with_context(|| format!("spawning {name} thread"))
}

fn join_named<T>(name: &str, handle: JoinHandle<T>) -> anyhow::Result<T> {
    handle
        .join()
        .map_err(|_| anyhow::anyhow!("{name} thread panicked"))
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    /// Drives the simulated digitizer, transmitter and monitors through the
    /// acquisition core until the configured pulse count is reached or
    /// `shutdown` fires. Packets go to `sink`.
    pub fn execute<S>(&self, sink: S, shutdown: &ShutdownToken) -> anyhow::Result<RunReport>
    where
        S: PacketSink + 'static,
    {
        let drx = self.config.drx.clone();
        let simulation = self.config.simulation.clone();
        drx.validate().context("validating DRX configuration")?;

        let started = Instant::now();
        let clock = PulseClock::new(PulseTime::now(), drx.prt1, drx.prt2, drx.staggered_prt);
        let pacer = Pacer {
            clock,
            started,
            realtime: simulation.realtime,
        };
        let last = last_seq_num(&simulation);

        let rings = ChannelRings::with_capacity(drx.merge_queue_size);
        let stream_metrics = Arc::new(StreamMetrics::new());
        let bank = OscillatorBank::simulated(&drx.oscillators);
        let afc = Arc::new(AfcController::new(&drx, bank).context("starting AFC")?);
        let cache = Arc::new(MonitorCache::new());
        let mut monitor = MonitorSimulator::new(simulation.seed);
        monitor.refresh(&cache);

        // stops the consumers once the producers are done and drained
        let pipeline = ShutdownToken::new();

        let afc_worker = afc.spawn(pipeline.clone()).context("starting AFC worker")?;

        let monitor_thread = {
            let cache = Arc::clone(&cache);
            let pipeline = pipeline.clone();
            let refresh = Duration::from_secs_f64(simulation.monitor_refresh_secs.max(0.01));
            spawn_named("monitor", move || {
                while pipeline.sleep(refresh) {
                    monitor.refresh(&cache);
                }
            })?
        };

        let streamer_thread = {
            let synchronizer = PulseSynchronizer::new(rings.clone(), Arc::clone(&stream_metrics));
            let status = StatusAggregator::new(
                cache.clone(),
                cache.clone(),
                afc.readout(),
                drx.status_interval(),
            );
            let mut streamer =
                IwrfStreamer::new(&drx, synchronizer, sink, Arc::clone(&stream_metrics))
                    .with_status(status);
            let pipeline = pipeline.clone();
            spawn_named("iwrf-streamer", move || streamer.run(&pipeline))?
        };

        let mut producers = Vec::new();
        for (name, channel_id, drop_probability) in [
            ("h-channel", CHANNEL_H, simulation.h_drop_probability),
            ("v-channel", CHANNEL_V, simulation.v_drop_probability),
        ] {
            let ring = if channel_id == CHANNEL_H {
                Arc::clone(&rings.h)
            } else {
                Arc::clone(&rings.v)
            };
            let mut generator =
                PulseGenerator::new(&simulation, channel_id, drx.gates, drop_probability);
            let shutdown = shutdown.clone();
            let afc = Arc::clone(&afc);
            let blanking_interval = simulation.blanking_interval;
            let mut blanked = drx.allow_blanking;
            let handle = spawn_named(name, move || {
                let mut slot = PulseData::default();
                let mut written = 0u64;
                for seq_num in 1..=last {
                    if !pacer.wait_turn(seq_num, &ring, &shutdown) {
                        break;
                    }
                    // the H channel stands in for the transmitter's blanking control
                    if channel_id == CHANNEL_H
                        && blanking_interval > 0
                        && seq_num as u64 % blanking_interval == 0
                    {
                        blanked = !blanked;
                        afc.report_blanking(seq_num, blanked);
                    }
                    if generator.fill(&mut slot, seq_num, clock.time_of(seq_num)) {
                        slot = ring.write(slot);
                        written += 1;
                    }
                }
                written
            })?;
            producers.push((name, handle));
        }

        let burst_thread = {
            let ring = Arc::clone(&rings.burst);
            let mut generator = BurstGenerator::new(&simulation, drx.burst_sample_frequency);
            let readout = afc.readout();
            let shutdown = shutdown.clone();
            let afc = Arc::clone(&afc);
            let simulation = simulation.clone();
            spawn_named("burst-channel", move || {
                let mut slot = BurstData::default();
                let mut generated = 0u64;
                for seq_num in 1..=last {
                    if !pacer.wait_turn(seq_num, &ring, &shutdown) {
                        break;
                    }
                    generated = seq_num as u64;
                    if generator.drops_pulse() {
                        continue;
                    }
                    let actual = simulation.tx_frequency_at(clock.elapsed_secs(seq_num));
                    let offset = actual - readout.derived_tx_frequency_hz() as f64;
                    let measured =
                        generator.fill(&mut slot, seq_num, clock.time_of(seq_num), offset);
                    slot = ring.write(slot);
                    afc.submit_sample(measured.g0_power_dbm, measured.freq_offset_hz, seq_num);
                }
                generated
            })?
        };

        for (name, handle) in producers {
            let written = join_named(name, handle)?;
            info!("{} wrote {} pulses", name, written);
        }
        let pulses_generated = join_named("burst-channel", burst_thread)?;

        self.drain(&rings, &stream_metrics, shutdown);
        pipeline.trigger();
        join_named("iwrf-streamer", streamer_thread)?;
        if let Some(worker) = afc_worker {
            join_named("afc-control", worker)?;
        }
        join_named("monitor", monitor_thread)?;

        let readout = afc.readout();
        let derived_tx_hz = readout.derived_tx_frequency_hz();
        let actual_tx_hz =
            simulation.tx_frequency_at(clock.elapsed_secs(pulses_generated as i64));
        let report = RunReport {
            pulses_generated,
            elapsed_secs: started.elapsed().as_secs_f64(),
            stream: stream_metrics.snapshot(),
            afc: afc.metrics().snapshot(),
            ring_overruns: rings.overruns(),
            afc_mode: afc.mode(),
            oscillator_hz: readout.frequencies_hz(),
            derived_tx_hz,
            actual_tx_hz,
            residual_offset_hz: actual_tx_hz - derived_tx_hz as f64,
        };
        info!(
            "Run finished: {} pulses generated, {} streamed, AFC {:?} with residual {:.0} Hz",
            report.pulses_generated,
            report.stream.pulses_streamed,
            report.afc_mode,
            report.residual_offset_hz
        );
        Ok(report)
    }

    /// Lets the streamer consume what the producers left in the rings. A ring
    /// whose partner channel lost the final pulses never empties, so the wait
    /// also ends once the streamer stops making progress.
    fn drain(&self, rings: &ChannelRings, metrics: &StreamMetrics, shutdown: &ShutdownToken) {
        let deadline = Instant::now() + DRAIN_LIMIT;
        let mut last_seen = metrics.snapshot().last_seq_num;
        let mut stalled = 0;
        while !shutdown.is_triggered() && Instant::now() < deadline {
            if rings.h.is_empty() && rings.v.is_empty() && rings.burst.is_empty() {
                return;
            }
            thread::sleep(DRAIN_POLL);
            let now_seen = metrics.snapshot().last_seq_num;
            if now_seen == last_seen {
                stalled += 1;
                if stalled >= DRAIN_STALL_POLLS {
                    return;
                }
            } else {
                stalled = 0;
                last_seen = now_seen;
            }
        }
        if !shutdown.is_triggered() {
            warn!("Streamer did not drain the rings within {:?}", DRAIN_LIMIT);
        }
    }
}
