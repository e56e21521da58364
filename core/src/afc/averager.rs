use log::{debug, warn};

/// One pulse's transmit-frequency measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencySample {
    pub g0_power_dbm: f64,
    pub freq_offset_hz: f64,
    pub seq_num: i64,
}

/// Block average handed to the control thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyAverage {
    pub g0_power_avg: f64,
    pub freq_offset: f64,
    pub sample_count: u32,
    /// Pulse that completed the block.
    pub seq_num: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Summed,
    Completed(FrequencyAverage),
    Blanked,
    Coasting,
}

/// Running block sum with the blanking / coasting gate in front of it.
#[derive(Debug)]
pub struct SampleAverager {
    block_size: u32,
    n_summed: u32,
    power_sum: f64,
    offset_sum: f64,
    blanked: bool,
    coast_pulses: i64,
    coast_end: i64,
    coasted: u64,
    last_seq_num: Option<i64>,
}

impl SampleAverager {
    pub fn new(block_size: u32, coast_pulses: i64, start_blanked: bool) -> Self {
        Self {
            block_size: block_size.max(1),
            n_summed: 0,
            power_sum: 0.0,
            offset_sum: 0.0,
            blanked: start_blanked,
            coast_pulses,
            coast_end: i64::MIN,
            coasted: 0,
            last_seq_num: None,
        }
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn n_summed(&self) -> u32 {
        self.n_summed
    }

    /// Changes the block size and discards the partial sum.
    pub fn restart(&mut self, block_size: u32) {
        self.block_size = block_size.max(1);
        self.clear();
    }

    pub fn clear(&mut self) {
        self.n_summed = 0;
        self.power_sum = 0.0;
        self.offset_sum = 0.0;
    }

    /// Applies a blanking transition (if one became due at this sample) and
    /// then sums the sample unless it falls in a blanked or coasting window.
    /// Lifting blanking while `tracking` starts a coasting window.
    pub fn admit(
        &mut self,
        sample: FrequencySample,
        blanking: Option<bool>,
        tracking: bool,
    ) -> Admission {
        let seq_num = sample.seq_num;
        if let Some(blanked) = blanking {
            if blanked != self.blanked {
                debug!(
                    "Blanking changed from {} to {} @ {}",
                    self.blanked, blanked, seq_num
                );
                if !blanked && tracking {
                    self.coast_end = seq_num.saturating_add(self.coast_pulses);
                }
                self.blanked = blanked;
            }
        }

        if self.blanked || seq_num < self.coast_end {
            self.clear();
            self.last_seq_num = Some(seq_num);
            if self.blanked {
                return Admission::Blanked;
            }
            if self.coasted % 1000 == 0 {
                debug!(
                    "Coasting {} pulses: offset {:.0} Hz",
                    self.coasted, sample.freq_offset_hz
                );
            }
            self.coasted += 1;
            return Admission::Coasting;
        }

        if self.coasted > 0 {
            debug!("Coasted through {} pulses", self.coasted);
            self.coasted = 0;
        }

        if let Some(last) = self.last_seq_num {
            let gap = seq_num - last - 1;
            if gap != 0 && self.n_summed != 0 {
                warn!(
                    "AFC sample gap of {} pulses before {} (n_summed = {})",
                    gap, seq_num, self.n_summed
                );
            }
        }
        self.last_seq_num = Some(seq_num);

        self.power_sum += sample.g0_power_dbm;
        self.offset_sum += sample.freq_offset_hz;
        self.n_summed += 1;
        if self.n_summed < self.block_size {
            return Admission::Summed;
        }

        let count = self.n_summed;
        let average = FrequencyAverage {
            g0_power_avg: self.power_sum / count as f64,
            freq_offset: self.offset_sum / count as f64,
            sample_count: count,
            seq_num,
        };
        self.clear();
        Admission::Completed(average)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(seq_num: i64, power: f64) -> FrequencySample {
        FrequencySample {
            g0_power_dbm: power,
            freq_offset_hz: 1.0e5,
            seq_num,
        }
    }

    #[test]
    fn completes_after_block_size() {
        let mut averager = SampleAverager::new(3, 100, false);
        assert_eq!(averager.admit(sample(1, -10.0), None, false), Admission::Summed);
        assert_eq!(averager.admit(sample(2, -20.0), None, false), Admission::Summed);
        match averager.admit(sample(3, -30.0), None, false) {
            Admission::Completed(avg) => {
                assert_eq!(avg.g0_power_avg, -20.0);
                assert_eq!(avg.freq_offset, 1.0e5);
                assert_eq!(avg.sample_count, 3);
                assert_eq!(avg.seq_num, 3);
            }
            other => panic!("expected a completed block, got {other:?}"),
        }
        assert_eq!(averager.n_summed(), 0);
    }

    #[test]
    fn blanked_samples_never_contribute() {
        let mut averager = SampleAverager::new(2, 0, false);
        averager.admit(sample(1, 100.0), None, false);
        assert_eq!(averager.admit(sample(2, 100.0), Some(true), false), Admission::Blanked);
        assert_eq!(averager.admit(sample(3, 100.0), None, false), Admission::Blanked);
        averager.admit(sample(4, -5.0), Some(false), false);
        match averager.admit(sample(5, -5.0), None, false) {
            Admission::Completed(avg) => assert_eq!(avg.g0_power_avg, -5.0),
            other => panic!("expected a completed block, got {other:?}"),
        }
    }

    #[test]
    fn lifting_blanking_while_tracking_coasts() {
        let mut averager = SampleAverager::new(50, 3, true);
        assert_eq!(averager.admit(sample(10, 0.0), None, true), Admission::Blanked);
        assert_eq!(averager.admit(sample(11, 0.0), Some(false), true), Admission::Coasting);
        assert_eq!(averager.admit(sample(12, 0.0), None, true), Admission::Coasting);
        assert_eq!(averager.admit(sample(13, 0.0), None, true), Admission::Coasting);
        assert_eq!(averager.admit(sample(14, 0.0), None, true), Admission::Summed);
    }

    #[test]
    fn lifting_blanking_while_searching_does_not_coast() {
        let mut averager = SampleAverager::new(10, 20_000, true);
        assert_eq!(averager.admit(sample(1, 0.0), Some(false), false), Admission::Summed);
    }

    #[test]
    fn restart_discards_partial_sum() {
        let mut averager = SampleAverager::new(10, 0, false);
        averager.admit(sample(1, 0.0), None, false);
        averager.restart(50);
        assert_eq!(averager.block_size(), 50);
        assert_eq!(averager.n_summed(), 0);
    }
}
