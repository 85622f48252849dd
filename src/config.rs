//! Folder layout, read from the environment (`.env` supported).
//!
//! - `BETATA_DATA_DIR` (default `data`): `<data>/<device>/<t1|t2e|t2r|rpm|s21>/*.json`
//!   trace containers, `<data>/simulation/*.csv` tables
//! - `BETATA_OUT_DIR` (default `out`): `<out>/qubits/<name>.json`,
//!   `<out>/resonators/<name>.json`, `<out>/plots/<name>/...`

use std::path::PathBuf;

pub const DATA_DIR_VAR: &str = "BETATA_DATA_DIR";
pub const OUT_DIR_VAR: &str = "BETATA_OUT_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub out_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let dir = |key: &str, default: &str| {
            PathBuf::from(lookup(key).filter(|v| !v.trim().is_empty()).unwrap_or_else(|| default.to_string()))
        };
        Self {
            data_dir: dir(DATA_DIR_VAR, "data"),
            out_dir: dir(OUT_DIR_VAR, "out"),
        }
    }

    /// Trace folder of one device and measurement kind.
    pub fn trace_dir(&self, device: &str, kind: &str) -> PathBuf {
        self.data_dir.join(device).join(kind)
    }

    pub fn simulation_dir(&self) -> PathBuf {
        self.data_dir.join("simulation")
    }

    pub fn qubit_file(&self, name: &str) -> PathBuf {
        self.out_dir.join("qubits").join(format!("{name}.json"))
    }

    pub fn resonator_dir(&self) -> PathBuf {
        self.out_dir.join("resonators")
    }

    pub fn resonator_file(&self, name: &str) -> PathBuf {
        self.resonator_dir().join(format!("{name}.json"))
    }

    pub fn plot_dir(&self, name: &str) -> PathBuf {
        self.out_dir.join("plots").join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset_or_blank() {
        let cfg = Config::from_lookup(|key| (key == OUT_DIR_VAR).then(|| "  ".to_string()));
        assert_eq!(cfg.data_dir, PathBuf::from("data"));
        assert_eq!(cfg.out_dir, PathBuf::from("out"));
    }

    #[test]
    fn layout_follows_configured_roots() {
        let cfg = Config::from_lookup(|key| match key {
            DATA_DIR_VAR => Some("/mnt/meas".to_string()),
            OUT_DIR_VAR => Some("/tmp/res".to_string()),
            _ => None,
        });
        assert_eq!(cfg.trace_dir("Q6", "t1"), PathBuf::from("/mnt/meas/Q6/t1"));
        assert_eq!(cfg.qubit_file("Q6"), PathBuf::from("/tmp/res/qubits/Q6.json"));
        assert_eq!(cfg.resonator_file("R1_F11_6p1"), PathBuf::from("/tmp/res/resonators/R1_F11_6p1.json"));
        assert_eq!(cfg.plot_dir("Q6"), PathBuf::from("/tmp/res/plots/Q6"));
    }
}
