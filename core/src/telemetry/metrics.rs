use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Counters maintained by the synchronizer / streaming thread.
#[derive(Debug)]
pub struct StreamMetrics {
    pulses_streamed: AtomicU64,
    pulse_gaps: AtomicU64,
    pulses_missing: AtomicU64,
    stale_reads: AtomicU64,
    metadata_sends: AtomicU64,
    status_sends: AtomicU64,
    packets_assembled: AtomicU64,
    packets_written: AtomicU64,
    client_drops: AtomicU64,
    stage_errors: AtomicU64,
    last_seq_num: AtomicI64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamSnapshot {
    pub pulses_streamed: u64,
    pub pulse_gaps: u64,
    pub pulses_missing: u64,
    pub stale_reads: u64,
    pub metadata_sends: u64,
    pub status_sends: u64,
    pub packets_assembled: u64,
    pub packets_written: u64,
    pub client_drops: u64,
    pub stage_errors: u64,
    pub last_seq_num: i64,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self {
            pulses_streamed: AtomicU64::new(0),
            pulse_gaps: AtomicU64::new(0),
            pulses_missing: AtomicU64::new(0),
            stale_reads: AtomicU64::new(0),
            metadata_sends: AtomicU64::new(0),
            status_sends: AtomicU64::new(0),
            packets_assembled: AtomicU64::new(0),
            packets_written: AtomicU64::new(0),
            client_drops: AtomicU64::new(0),
            stage_errors: AtomicU64::new(0),
            last_seq_num: AtomicI64::new(-1),
        }
    }

    pub fn record_pulse(&self, seq_num: i64) {
        self.pulses_streamed.fetch_add(1, Ordering::Relaxed);
        self.last_seq_num.store(seq_num, Ordering::Relaxed);
    }

    pub fn record_gap(&self, missing: u64) {
        self.pulse_gaps.fetch_add(1, Ordering::Relaxed);
        self.pulses_missing.fetch_add(missing, Ordering::Relaxed);
    }

    pub fn record_stale_read(&self) {
        self.stale_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_metadata(&self) {
        self.metadata_sends.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_status(&self) {
        self.status_sends.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_packet(&self, written: bool) {
        self.packets_assembled.fetch_add(1, Ordering::Relaxed);
        if written {
            self.packets_written.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_client_drop(&self) {
        self.client_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stage_error(&self) {
        self.stage_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        StreamSnapshot {
            pulses_streamed: self.pulses_streamed.load(Ordering::Relaxed),
            pulse_gaps: self.pulse_gaps.load(Ordering::Relaxed),
            pulses_missing: self.pulses_missing.load(Ordering::Relaxed),
            stale_reads: self.stale_reads.load(Ordering::Relaxed),
            metadata_sends: self.metadata_sends.load(Ordering::Relaxed),
            status_sends: self.status_sends.load(Ordering::Relaxed),
            packets_assembled: self.packets_assembled.load(Ordering::Relaxed),
            packets_written: self.packets_written.load(Ordering::Relaxed),
            client_drops: self.client_drops.load(Ordering::Relaxed),
            stage_errors: self.stage_errors.load(Ordering::Relaxed),
            last_seq_num: self.last_seq_num.load(Ordering::Relaxed),
        }
    }
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters for the AFC admission path and control thread. Updated from the
/// real-time producer, so everything here is lock-free.
#[derive(Debug, Default)]
pub struct AfcMetrics {
    received: AtomicU64,
    dropped_busy: AtomicU64,
    dropped_blanked: AtomicU64,
    dropped_coasting: AtomicU64,
    summed: AtomicU64,
    averages_published: AtomicU64,
    averages_overwritten: AtomicU64,
    adjustments: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AfcSnapshot {
    pub received: u64,
    pub dropped_busy: u64,
    pub dropped_blanked: u64,
    pub dropped_coasting: u64,
    pub summed: u64,
    pub averages_published: u64,
    pub averages_overwritten: u64,
    pub adjustments: u64,
}

impl AfcMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts an incoming sample and returns how many were seen before it.
    pub fn record_received(&self) -> u64 {
        self.received.fetch_add(1, Ordering::Relaxed)
    }

    pub fn record_busy_drop(&self) {
        self.dropped_busy.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_blanked_drop(&self) {
        self.dropped_blanked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coasting_drop(&self) {
        self.dropped_coasting.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_summed(&self) {
        self.summed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_average(&self) {
        self.averages_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_average_overwritten(&self) {
        self.averages_overwritten.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_adjustment(&self) {
        self.adjustments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> AfcSnapshot {
        AfcSnapshot {
            received: self.received.load(Ordering::Relaxed),
            dropped_busy: self.dropped_busy.load(Ordering::Relaxed),
            dropped_blanked: self.dropped_blanked.load(Ordering::Relaxed),
            dropped_coasting: self.dropped_coasting.load(Ordering::Relaxed),
            summed: self.summed.load(Ordering::Relaxed),
            averages_published: self.averages_published.load(Ordering::Relaxed),
            averages_overwritten: self.averages_overwritten.load(Ordering::Relaxed),
            adjustments: self.adjustments.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_counts_missing_pulses() {
        let metrics = StreamMetrics::new();
        metrics.record_gap(3);
        metrics.record_gap(1);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.pulse_gaps, 2);
        assert_eq!(snapshot.pulses_missing, 4);
    }

    #[test]
    fn packet_counter_separates_written() {
        let metrics = StreamMetrics::new();
        metrics.record_packet(true);
        metrics.record_packet(false);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.packets_assembled, 2);
        assert_eq!(snapshot.packets_written, 1);
    }

    #[test]
    fn afc_snapshot_serializes() {
        let metrics = AfcMetrics::new();
        assert_eq!(metrics.record_received(), 0);
        metrics.record_busy_drop();
        let json = serde_json::to_string(&metrics.snapshot()).unwrap();
        assert!(json.contains("\"dropped_busy\":1"));
    }
}
