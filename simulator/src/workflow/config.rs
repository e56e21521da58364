use crate::generator::profile::SimulationConfig;
use anyhow::Context;
use kadrxcore::DrxConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Everything a simulated run needs: the DRX parameters plus the behaviour
/// of the synthetic hardware.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub drx: DrxConfig,
    pub simulation: SimulationConfig,
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        config
            .drx
            .validate()
            .with_context(|| format!("validating workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    /// Applies command-line overrides on top of the loaded values.
    pub fn with_overrides(mut self, pulses: Option<u64>, port: Option<u16>) -> Self {
        if let Some(pulses) = pulses {
            self.simulation.pulses = pulses;
        }
        if let Some(port) = port {
            self.drx.iwrf_server_tcp_port = port;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn overrides_replace_loaded_values() {
        let cfg = WorkflowConfig::default().with_overrides(Some(12), Some(0));
        assert_eq!(cfg.simulation.pulses, 12);
        assert_eq!(cfg.drx.iwrf_server_tcp_port, 0);
    }

    #[test]
    fn config_load_reads_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"drx:\n  gates: 128\n  afc_enabled: false\n  oscillators:\n    osc2:\n      step_hz: 1000000\n      scaled_min: 16000\n      scaled_max: 17000\n      initial_scaled: 16400\n      fixed_scaled: 16400\nsimulation:\n  seed: 7\n  h_drop_probability: 0.01\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();
        assert_eq!(cfg.drx.gates, 128);
        assert!(!cfg.drx.afc_enabled);
        assert_eq!(cfg.drx.oscillators.osc2.fixed_scaled, 16400);
        assert_eq!(cfg.drx.oscillators.osc0.step_hz, 100_000);
        assert_eq!(cfg.simulation.seed, 7);
        assert_eq!(cfg.simulation.burst_samples, 32);
    }

    #[test]
    fn invalid_drx_section_is_rejected() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"drx:\n  gates: 0\n").unwrap();
        let path = temp.into_temp_path();
        assert!(WorkflowConfig::load(&path).is_err());
    }
}
