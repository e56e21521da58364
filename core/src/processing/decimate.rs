use crate::ingest::SynchronizedTriple;
use crate::math::stats::StatsHelper;
use crate::prelude::{DrxResult, GateGeometry, IqStage};

/// Combines each pair of adjacent gates into one, keeping the first gate's
/// phase and the pair's mean power. Halves the gate count.
#[derive(Debug, Default)]
pub struct GatePairCombiner;

impl GatePairCombiner {
    pub fn new() -> Self {
        Self
    }

    /// Combines gate pairs in place and truncates the buffer. A trailing odd
    /// gate is dropped. Returns the new gate count.
    pub fn combine(iq: &mut Vec<i16>) -> usize {
        let out_gates = iq.len() / 4;
        for gate in 0..out_gates {
            let base = gate * 4;
            let (i0, q0) = (iq[base], iq[base + 1]);
            let (i1, q1) = (iq[base + 2], iq[base + 3]);
            let first_power = StatsHelper::iq_power(i0, q0);
            let mean_power = (first_power + StatsHelper::iq_power(i1, q1)) / 2.0;
            let (i, q) = if first_power > 0.0 {
                let scale = (mean_power / first_power).sqrt();
                (
                    StatsHelper::clamp_i16(i0 as f64 * scale),
                    StatsHelper::clamp_i16(q0 as f64 * scale),
                )
            } else {
                (i0, q0)
            };
            iq[gate * 2] = i;
            iq[gate * 2 + 1] = q;
        }
        iq.truncate(out_gates * 2);
        out_gates
    }
}

impl IqStage for GatePairCombiner {
    fn name(&self) -> &'static str {
        "combine-gate-pairs"
    }

    fn apply(
        &mut self,
        triple: &mut SynchronizedTriple,
        geometry: &mut GateGeometry,
    ) -> DrxResult<()> {
        triple.h.gates = Self::combine(&mut triple.h.iq);
        triple.v.gates = Self::combine(&mut triple.v.iq);
        geometry.n_gates = triple.gates();
        geometry.start_range_m += geometry.gate_spacing_m / 2.0;
        geometry.gate_spacing_m *= 2.0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{BurstData, PulseData};

    #[test]
    fn equal_gates_keep_their_power() {
        let mut iq = vec![300, -400, 300, -400];
        assert_eq!(GatePairCombiner::combine(&mut iq), 1);
        assert_eq!(iq, vec![300, -400]);
    }

    #[test]
    fn zero_power_first_gate_passes_through() {
        let mut iq = vec![0, 0, 1000, 1000];
        assert_eq!(GatePairCombiner::combine(&mut iq), 1);
        assert_eq!(iq, vec![0, 0]);
    }

    #[test]
    fn combined_gate_carries_mean_power_and_first_phase() {
        // first gate power 100^2, second 0 -> mean power 5000, scale 1/sqrt(2)
        let mut iq = vec![100, 0, 0, 0, 30, 40, 30, 40, 7, 7];
        assert_eq!(GatePairCombiner::combine(&mut iq), 2);
        assert_eq!(iq, vec![71, 0, 30, 40]);
    }

    #[test]
    fn geometry_is_shifted_and_doubled() {
        let mut triple = SynchronizedTriple {
            h: PulseData {
                iq: vec![1; 128],
                gates: 64,
                ..Default::default()
            },
            v: PulseData {
                iq: vec![1; 128],
                gates: 64,
                ..Default::default()
            },
            burst: BurstData::default(),
        };
        let mut geometry = GateGeometry {
            n_gates: 64,
            start_range_m: 100.0,
            gate_spacing_m: 30.0,
        };
        GatePairCombiner::new()
            .apply(&mut triple, &mut geometry)
            .unwrap();
        assert_eq!(geometry.n_gates, 32);
        assert_eq!(geometry.start_range_m, 115.0);
        assert_eq!(geometry.gate_spacing_m, 60.0);
        assert_eq!(triple.h.iq.len(), 64);
    }
}
