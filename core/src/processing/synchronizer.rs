use crate::ingest::{BurstData, PulseData, RecyclingRing, SynchronizedTriple};
use crate::shutdown::ShutdownToken;
use crate::telemetry::StreamMetrics;
use log::{debug, warn};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// The three per-channel rings feeding the synchronizer.
#[derive(Clone)]
pub struct ChannelRings {
    pub h: Arc<RecyclingRing<PulseData>>,
    pub v: Arc<RecyclingRing<PulseData>>,
    pub burst: Arc<RecyclingRing<BurstData>>,
}

impl ChannelRings {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            h: Arc::new(RecyclingRing::with_capacity(capacity)),
            v: Arc::new(RecyclingRing::with_capacity(capacity)),
            burst: Arc::new(RecyclingRing::with_capacity(capacity)),
        }
    }

    pub fn overruns(&self) -> u64 {
        self.h.overruns() + self.v.overruns() + self.burst.overruns()
    }
}

/// Aligns the H, V and burst channels on a common pulse sequence number.
///
/// Each cycle reads one item per channel, then keeps replacing whichever
/// channel lags the highest sequence number seen until all three agree.
/// Items from channels that ran ahead are never discarded, only laggards.
pub struct PulseSynchronizer {
    rings: ChannelRings,
    poll_interval: Duration,
    prev_seq_num: Option<i64>,
    metrics: Arc<StreamMetrics>,
}

fn read_blocking<T: Default>(
    ring: &RecyclingRing<T>,
    poll_interval: Duration,
    shutdown: &ShutdownToken,
) -> Option<T> {
    loop {
        if let Some(item) = ring.pop() {
            return Some(item);
        }
        if shutdown.is_triggered() {
            return None;
        }
        thread::sleep(poll_interval);
    }
}

impl PulseSynchronizer {
    pub fn new(rings: ChannelRings, metrics: Arc<StreamMetrics>) -> Self {
        Self {
            rings,
            poll_interval: Duration::from_micros(100),
            prev_seq_num: None,
            metrics,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn rings(&self) -> &ChannelRings {
        &self.rings
    }

    /// Blocks until the next aligned triple is available. Returns `None` only
    /// when shutdown has been requested.
    pub fn next_triple(&mut self, shutdown: &ShutdownToken) -> Option<SynchronizedTriple> {
        let poll = self.poll_interval;
        loop {
            let mut h = read_blocking(&self.rings.h, poll, shutdown)?;
            let mut v = read_blocking(&self.rings.v, poll, shutdown)?;
            let mut burst = read_blocking(&self.rings.burst, poll, shutdown)?;

            loop {
                let max_seq = h.seq_num.max(v.seq_num).max(burst.seq_num);
                if h.seq_num == max_seq && v.seq_num == max_seq && burst.seq_num == max_seq {
                    break;
                }
                if h.seq_num < max_seq {
                    let next = read_blocking(&self.rings.h, poll, shutdown)?;
                    self.rings.h.recycle(std::mem::replace(&mut h, next));
                    self.metrics.record_stale_read();
                }
                if v.seq_num < max_seq {
                    let next = read_blocking(&self.rings.v, poll, shutdown)?;
                    self.rings.v.recycle(std::mem::replace(&mut v, next));
                    self.metrics.record_stale_read();
                }
                if burst.seq_num < max_seq {
                    let next = read_blocking(&self.rings.burst, poll, shutdown)?;
                    self.rings.burst.recycle(std::mem::replace(&mut burst, next));
                    self.metrics.record_stale_read();
                }
            }

            let seq_num = h.seq_num;
            if let Some(prev) = self.prev_seq_num {
                if seq_num <= prev {
                    warn!(
                        "Discarding pulse {} aligned after {} (sequence went backwards)",
                        seq_num, prev
                    );
                    self.metrics.record_stale_read();
                    self.recycle(SynchronizedTriple { h, v, burst });
                    continue;
                }
                if seq_num != prev + 1 {
                    let missing = (seq_num - prev - 1) as u64;
                    warn!("Missing {} pulses between {} and {}", missing, prev, seq_num);
                    self.metrics.record_gap(missing);
                }
            } else {
                debug!("First synchronized pulse {}", seq_num);
            }
            self.prev_seq_num = Some(seq_num);
            return Some(SynchronizedTriple { h, v, burst });
        }
    }

    /// Hands the triple's buffers back to their channel rings.
    pub fn recycle(&self, triple: SynchronizedTriple) {
        self.rings.h.recycle(triple.h);
        self.rings.v.recycle(triple.v);
        self.rings.burst.recycle(triple.burst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(rings: &ChannelRings, h: &[i64], v: &[i64], b: &[i64]) {
        for &seq in h {
            rings.h.write(PulseData {
                seq_num: seq,
                ..Default::default()
            });
        }
        for &seq in v {
            rings.v.write(PulseData {
                seq_num: seq,
                ..Default::default()
            });
        }
        for &seq in b {
            rings.burst.write(BurstData {
                seq_num: seq,
                ..Default::default()
            });
        }
    }

    /// Emits triples until one of the fed rings runs dry. The token is
    /// triggered up front so an empty ring ends the drain instead of waiting.
    fn drain(sync: &mut PulseSynchronizer) -> Vec<i64> {
        let shutdown = ShutdownToken::new();
        shutdown.trigger();
        let mut out = Vec::new();
        while let Some(triple) = sync.next_triple(&shutdown) {
            assert_eq!(triple.h.seq_num, triple.v.seq_num);
            assert_eq!(triple.h.seq_num, triple.burst.seq_num);
            out.push(triple.seq_num());
            sync.recycle(triple);
        }
        out
    }

    #[test]
    fn aligned_channels_pass_straight_through() {
        let rings = ChannelRings::with_capacity(16);
        let metrics = Arc::new(StreamMetrics::new());
        let mut sync = PulseSynchronizer::new(rings.clone(), Arc::clone(&metrics));
        feed(&rings, &[1, 2, 3], &[1, 2, 3], &[1, 2, 3]);
        assert_eq!(drain(&mut sync), vec![1, 2, 3]);
        assert_eq!(metrics.snapshot().pulse_gaps, 0);
        assert_eq!(metrics.snapshot().stale_reads, 0);
    }

    #[test]
    fn laggard_channels_are_advanced() {
        let rings = ChannelRings::with_capacity(16);
        let metrics = Arc::new(StreamMetrics::new());
        let mut sync = PulseSynchronizer::new(rings.clone(), Arc::clone(&metrics));
        // V started late and burst dropped pulse 3, so 4 is the first triple
        feed(&rings, &[1, 2, 3, 4, 5], &[3, 4, 5], &[1, 2, 4, 5]);
        let seqs = drain(&mut sync);
        assert_eq!(seqs, vec![4, 5]);
        let snapshot = metrics.snapshot();
        // first emitted pulse never counts as a gap
        assert_eq!(snapshot.pulse_gaps, 0);
        assert!(snapshot.stale_reads >= 3);
    }

    #[test]
    fn gap_reports_exact_size() {
        let rings = ChannelRings::with_capacity(16);
        let metrics = Arc::new(StreamMetrics::new());
        let mut sync = PulseSynchronizer::new(rings.clone(), Arc::clone(&metrics));
        feed(&rings, &[1, 2, 6], &[1, 2, 6], &[1, 2, 6]);
        assert_eq!(drain(&mut sync), vec![1, 2, 6]);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.pulse_gaps, 1);
        assert_eq!(snapshot.pulses_missing, 3);
    }

    #[test]
    fn sequence_restart_is_discarded() {
        let rings = ChannelRings::with_capacity(16);
        let metrics = Arc::new(StreamMetrics::new());
        let mut sync = PulseSynchronizer::new(rings.clone(), Arc::clone(&metrics));
        feed(&rings, &[10, 11, 2, 12], &[10, 11, 2, 12], &[10, 11, 2, 12]);
        assert_eq!(drain(&mut sync), vec![10, 11, 12]);
    }

    #[test]
    fn shutdown_unblocks_empty_read() {
        let rings = ChannelRings::with_capacity(4);
        let mut sync = PulseSynchronizer::new(rings, Arc::new(StreamMetrics::new()))
            .with_poll_interval(Duration::from_millis(1));
        let shutdown = ShutdownToken::new();
        shutdown.trigger();
        assert!(sync.next_triple(&shutdown).is_none());
    }

    #[test]
    fn output_is_strictly_increasing_under_skewed_rates() {
        let rings = ChannelRings::with_capacity(256);
        let mut sync = PulseSynchronizer::new(rings.clone(), Arc::new(StreamMetrics::new()));
        let h: Vec<i64> = (1..=100).filter(|s| s % 7 != 0).collect();
        let v: Vec<i64> = (1..=100).filter(|s| s % 5 != 0).collect();
        let b: Vec<i64> = (1..=100).filter(|s| s % 3 != 0).collect();
        feed(&rings, &h, &v, &b);
        let seqs = drain(&mut sync);
        assert!(!seqs.is_empty());
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
        assert!(seqs.iter().all(|s| s % 7 != 0 && s % 5 != 0 && s % 3 != 0));
    }

    #[test]
    fn drained_laggard_ring_ends_alignment_on_shutdown() {
        let rings = ChannelRings::with_capacity(16);
        let mut sync = PulseSynchronizer::new(rings.clone(), Arc::new(StreamMetrics::new()))
            .with_poll_interval(Duration::from_millis(1));
        // burst never reaches 3, so aligning on 3 empties its ring
        feed(&rings, &[3], &[3], &[1, 2]);
        let shutdown = ShutdownToken::new();
        let stopper = {
            let shutdown = shutdown.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                shutdown.trigger();
            })
        };
        assert!(sync.next_triple(&shutdown).is_none());
        stopper.join().unwrap();
    }
}
