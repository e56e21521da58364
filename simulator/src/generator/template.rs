use std::f64::consts::PI;

/// Interleaved I/Q counts of a complex tone, `cycles_per_sample` turns per
/// sample starting at `phase` radians.
pub fn tone(samples: usize, cycles_per_sample: f64, amplitude: f64, phase: f64) -> Vec<i16> {
    let mut iq = Vec::with_capacity(samples * 2);
    for n in 0..samples {
        let angle = 2.0 * PI * cycles_per_sample * n as f64 + phase;
        iq.push(to_count(amplitude * angle.cos()));
        iq.push(to_count(amplitude * angle.sin()));
    }
    iq
}

/// Adds `other` onto `iq` sample by sample, saturating at the count limits.
pub fn add_into(iq: &mut [i16], other: &[i16]) {
    for (value, extra) in iq.iter_mut().zip(other) {
        *value = value.saturating_add(*extra);
    }
}

fn to_count(value: f64) -> i16 {
    value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}
