use crate::ingest::SynchronizedTriple;
use crate::math::stats::StatsHelper;
use crate::prelude::{DrxResult, GateGeometry, IqStage};
use num_complex::Complex64;

/// Rotates H and V samples by the conjugate of the burst's unit phasor so the
/// pulse-to-pulse transmit phase jitter cancels.
#[derive(Debug, Default)]
pub struct BurstCohering;

impl BurstCohering {
    pub fn new() -> Self {
        Self
    }

    /// Rotates interleaved I/Q in place: `(I + jQ) * (a - jb)`.
    pub fn rotate(iq: &mut [i16], ival_norm: f64, qval_norm: f64) {
        let phasor = Complex64::new(ival_norm, -qval_norm);
        for pair in iq.chunks_exact_mut(2) {
            let rotated = Complex64::new(pair[0] as f64, pair[1] as f64) * phasor;
            pair[0] = StatsHelper::clamp_i16(rotated.re);
            pair[1] = StatsHelper::clamp_i16(rotated.im);
        }
    }
}

impl IqStage for BurstCohering {
    fn name(&self) -> &'static str {
        "cohere-to-burst"
    }

    fn apply(
        &mut self,
        triple: &mut SynchronizedTriple,
        _geometry: &mut GateGeometry,
    ) -> DrxResult<()> {
        let (a, b) = (triple.burst.g0_ival_norm, triple.burst.g0_qval_norm);
        Self::rotate(&mut triple.h.iq, a, b);
        Self::rotate(&mut triple.v.iq, a, b);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{BurstData, PulseData};

    fn geometry() -> GateGeometry {
        GateGeometry {
            n_gates: 2,
            start_range_m: 0.0,
            gate_spacing_m: 37.5,
        }
    }

    #[test]
    fn unit_phasor_is_identity() {
        let samples = vec![100, -200, 32767, -32768, 0, 5];
        let mut triple = SynchronizedTriple {
            h: PulseData {
                iq: samples.clone(),
                gates: 3,
                ..Default::default()
            },
            v: PulseData {
                iq: samples.clone(),
                gates: 3,
                ..Default::default()
            },
            burst: BurstData {
                g0_ival_norm: 1.0,
                g0_qval_norm: 0.0,
                ..Default::default()
            },
        };
        BurstCohering::new()
            .apply(&mut triple, &mut geometry())
            .unwrap();
        assert_eq!(triple.h.iq, samples);
        assert_eq!(triple.v.iq, samples);
    }

    #[test]
    fn quarter_turn_rotates_i_into_negative_q() {
        // burst phasor at +90 degrees: a = 0, b = 1
        let mut iq = vec![1000, 0];
        BurstCohering::rotate(&mut iq, 0.0, 1.0);
        assert_eq!(iq, vec![0, -1000]);
    }

    #[test]
    fn rotation_result_is_clamped() {
        let mut iq = vec![30000, 30000];
        let half = std::f64::consts::FRAC_1_SQRT_2;
        BurstCohering::rotate(&mut iq, half, half);
        // magnitude 42426 lands on the I axis and saturates
        assert_eq!(iq[0], i16::MAX);
        assert_eq!(iq[1], 0);
    }
}
