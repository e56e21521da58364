pub struct StatsHelper;

impl StatsHelper {
    /// Power of one I/Q pair, in squared counts.
    pub fn iq_power(i: i16, q: i16) -> f64 {
        let (i, q) = (i as f64, q as f64);
        i * i + q * q
    }

    /// Rounds to the nearest integer and saturates at the int16 limits.
    pub fn clamp_i16(value: f64) -> i16 {
        if value.is_nan() {
            return 0;
        }
        value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
    }

    pub fn mean(values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        values.iter().sum::<f64>() / values.len() as f64
    }

    pub fn watts_to_dbm(watts: f64) -> f64 {
        10.0 * (watts * 1000.0).log10()
    }

    /// Mean power over interleaved I/Q counts, converted to dBm using the
    /// digitizer's count scale.
    pub fn mean_power_dbm(iq: &[i16], count_scale_for_mw: f64) -> f64 {
        let pairs = iq.len() / 2;
        if pairs == 0 || count_scale_for_mw <= 0.0 {
            return f64::NEG_INFINITY;
        }
        let sum: f64 = iq
            .chunks_exact(2)
            .map(|pair| Self::iq_power(pair[0], pair[1]))
            .sum();
        let mean_mw = sum / pairs as f64 / (count_scale_for_mw * count_scale_for_mw);
        10.0 * mean_mw.log10()
    }
}
