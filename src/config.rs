//! Show configuration loaded from a JSON file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LoomError, LoomResult};

fn default_frame_rate() -> u32 {
    60
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HardwareConfig {
    /// Local address the UDP socket binds to.
    #[serde(default = "HardwareConfig::default_bind")]
    pub bind: String,
    #[serde(default = "HardwareConfig::default_target_port")]
    pub target_port: u16,
}

impl HardwareConfig {
    fn default_bind() -> String {
        "0.0.0.0:0".to_string()
    }

    fn default_target_port() -> u16 {
        crate::output::hardware::DEFAULT_TARGET_PORT
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShowConfig {
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    /// LED coordinate file.
    pub positions: PathBuf,
    /// Vertex adjacency file.
    pub adjacency: PathBuf,
    /// Controller wiring file. Without it the show renders to the debug
    /// viewer only.
    #[serde(default)]
    pub controllers: Option<PathBuf>,
    /// Soundtrack timing sheet driving the generator.
    #[serde(default)]
    pub timings: Option<PathBuf>,
    /// Listen address for the WebSocket debug viewer.
    #[serde(default)]
    pub debug_listen: Option<String>,
    #[serde(default)]
    pub hardware: Option<HardwareConfig>,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl ShowConfig {
    pub fn load(path: &Path) -> LoomResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| LoomError::config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LoomResult<()> {
        if self.frame_rate == 0 {
            return Err(LoomError::config("frame_rate must be positive"));
        }
        if self.hardware.is_some() && self.controllers.is_none() {
            return Err(LoomError::config(
                "hardware output requires a controllers file",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let config: ShowConfig = serde_json::from_str(
            r#"{"positions": "ledpos.txt", "adjacency": "mapping.txt"}"#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.frame_rate, 60);
        assert!(config.controllers.is_none());
        assert!(config.hardware.is_none());
    }

    #[test]
    fn hardware_without_controllers_is_rejected() {
        let config: ShowConfig = serde_json::from_str(
            r#"{
                "positions": "ledpos.txt",
                "adjacency": "mapping.txt",
                "hardware": {"target_port": 5151}
            }"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_frame_rate_is_rejected() {
        let config: ShowConfig = serde_json::from_str(
            r#"{"positions": "a", "adjacency": "b", "frame_rate": 0}"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn full_config_round_trips() {
        let config = ShowConfig {
            frame_rate: 40,
            positions: "ledpos.txt".into(),
            adjacency: "mapping.txt".into(),
            controllers: Some("teensy.txt".into()),
            timings: Some("timings.tsv".into()),
            debug_listen: Some("127.0.0.1:4567".to_string()),
            hardware: Some(HardwareConfig {
                bind: "0.0.0.0:0".to_string(),
                target_port: 5151,
            }),
            seed: Some(42),
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: ShowConfig = serde_json::from_str(&json).unwrap();
        back.validate().unwrap();
        assert_eq!(back.frame_rate, 40);
        assert_eq!(back.hardware.unwrap().target_port, 5151);
    }
}
