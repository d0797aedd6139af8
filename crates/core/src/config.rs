//! Loads [`EngineConfig`] from a TOML document on disk (spec §6, "config"
//! ambient concern). Only compiled with the `config-toml` feature.

use crate::error::{DrivelogError, Result};
use drivelog_types::EngineConfig;
use std::path::Path;

impl From<toml::de::Error> for DrivelogError {
    fn from(e: toml::de::Error) -> Self {
        DrivelogError::InvalidFormat(e.to_string())
    }
}

pub fn load_engine_config(path: impl AsRef<Path>) -> Result<EngineConfig> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let cfg: EngineConfig = toml::from_str(&text)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_overrides_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"min_distance_km = 0.25"#).unwrap();
        let cfg = load_engine_config(file.path()).unwrap();
        assert_eq!(cfg.min_distance_km, 0.25);
        // Everything else keeps its default.
        assert_eq!(cfg.max_waypoints, EngineConfig::default().max_waypoints);
    }

    #[test]
    fn missing_file_errors() {
        assert!(load_engine_config("/nonexistent/path/drivelog.toml").is_err());
    }
}
