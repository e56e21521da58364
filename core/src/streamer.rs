use crate::config::DrxConfig;
use crate::ingest::PulseTime;
use crate::iwrf::{Packet, PacketAssembler, PacketSink, SendOutcome, StatusAggregator};
use crate::prelude::{DrxResult, IqStage};
use crate::processing::{BurstCohering, GatePairCombiner, PulseSynchronizer};
use crate::shutdown::ShutdownToken;
use crate::telemetry::{LogThrottle, StreamMetrics};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Instant;

fn emit<S: PacketSink>(
    assembler: &mut PacketAssembler,
    sink: &mut S,
    metrics: &StreamMetrics,
    packet: &Packet<'_>,
    time: PulseTime,
) -> DrxResult<()> {
    let bytes = assembler.assemble(packet, time)?;
    let outcome = sink.send(bytes);
    metrics.record_packet(outcome == SendOutcome::Written);
    if outcome == SendOutcome::Disconnected {
        metrics.record_client_drop();
    }
    Ok(())
}

/// The synchronizer thread: align, transform, frame, send.
pub struct IwrfStreamer<S: PacketSink> {
    synchronizer: PulseSynchronizer,
    stages: Vec<Box<dyn IqStage>>,
    assembler: PacketAssembler,
    status: Option<StatusAggregator>,
    sink: S,
    metrics: Arc<StreamMetrics>,
    throttle: LogThrottle,
}

impl<S: PacketSink> IwrfStreamer<S> {
    pub fn new(
        config: &DrxConfig,
        synchronizer: PulseSynchronizer,
        sink: S,
        metrics: Arc<StreamMetrics>,
    ) -> Self {
        let mut stages: Vec<Box<dyn IqStage>> = Vec::new();
        if config.cohere_iq_to_burst {
            stages.push(Box::new(BurstCohering::new()));
        }
        if config.combine_every_second_gate {
            stages.push(Box::new(GatePairCombiner::new()));
        }
        info!(
            "Streamer stages: [{}]",
            stages
                .iter()
                .map(|stage| stage.name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Self {
            synchronizer,
            stages,
            assembler: PacketAssembler::new(config.clone()),
            status: None,
            sink,
            metrics,
            throttle: LogThrottle::new(config.progress_log_interval),
        }
    }

    pub fn with_status(mut self, status: StatusAggregator) -> Self {
        self.status = Some(status);
        self
    }

    pub fn metrics(&self) -> Arc<StreamMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Handles one synchronized pulse. Returns false once shutdown has been
    /// requested and no more pulses will be read.
    pub fn step(&mut self, shutdown: &ShutdownToken) -> bool {
        let Some(mut triple) = self.synchronizer.next_triple(shutdown) else {
            return false;
        };

        let mut geometry = self.assembler.base_geometry(triple.gates());
        for stage in self.stages.iter_mut() {
            if let Err(err) = stage.apply(&mut triple, &mut geometry) {
                warn!("Stage {} failed on pulse {}: {}", stage.name(), triple.seq_num(), err);
                self.metrics.record_stage_error();
            }
        }

        let time = triple.time();
        let mut packets = Vec::with_capacity(5);
        if self.assembler.metadata_due(geometry.n_gates) {
            debug!("Sending metadata before pulse {}", triple.seq_num());
            packets.push(self.assembler.radar_info());
            packets.push(self.assembler.ts_processing(&geometry));
            packets.push(self.assembler.calibration());
            self.metrics.record_metadata();
        }
        packets.push(self.assembler.burst(&triple));
        packets.push(self.assembler.pulse(&triple, &geometry));
        for packet in &packets {
            if let Err(err) = emit(
                &mut self.assembler,
                &mut self.sink,
                &self.metrics,
                packet,
                time,
            ) {
                error!("Dropping {:?} packet for pulse {}: {}", packet.id(), triple.seq_num(), err);
            }
        }
        drop(packets);

        let seq_num = triple.seq_num();
        self.metrics.record_pulse(seq_num);
        self.synchronizer.recycle(triple);

        self.send_status();

        let streamed = self.metrics.snapshot();
        if self.throttle.due(streamed.pulses_streamed) {
            info!(
                "Streamed {} pulses (last {}), {} gaps, {} packets written, {} ring overruns",
                streamed.pulses_streamed,
                streamed.last_seq_num,
                streamed.pulse_gaps,
                streamed.packets_written,
                self.synchronizer.rings().overruns()
            );
        }
        true
    }

    fn send_status(&mut self) {
        let Some(status) = self.status.as_mut() else {
            return;
        };
        if !status.due(Instant::now()) {
            return;
        }
        let now = PulseTime::now();
        match status.build_xml() {
            Ok(xml) => {
                if let Err(err) = emit(
                    &mut self.assembler,
                    &mut self.sink,
                    &self.metrics,
                    &Packet::StatusXml(&xml),
                    now,
                ) {
                    error!("Dropping status packet: {}", err);
                }
            }
            Err(err) => error!("Failed to build status document: {}", err),
        }
        let power = self.assembler.xmit_power(&status.receiver_status());
        if let Err(err) = emit(&mut self.assembler, &mut self.sink, &self.metrics, &power, now) {
            error!("Dropping transmit power packet: {}", err);
        }
        self.metrics.record_status();
    }

    /// Streams until shutdown.
    pub fn run(&mut self, shutdown: &ShutdownToken) {
        info!("Streamer started");
        while self.step(shutdown) {}
        info!("Streamer stopped after {} pulses", self.metrics.snapshot().pulses_streamed);
    }
}
