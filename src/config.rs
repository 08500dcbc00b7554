//! File configuration, one TOML table per component.
//!
//! ```toml
//! [tracker]
//! history_len = 30
//! grace_frames = 8
//!
//! [flow]
//! redetect_interval = 5
//!
//! [color]
//! lower = [0, 0, 80]
//! min_area = 1500.0
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::Result;
use crate::integration::{ColorConfig, DetectionFilter, DetectorConfig, FlowConfig};
use crate::recorder::RecorderConfig;
use crate::tracker::{AssociatorConfig, TrackerConfig};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tracker: TrackerConfig,
    pub detector: DetectorConfig,
    pub color: ColorConfig,
    pub flow: FlowConfig,
    pub associator: AssociatorConfig,
    pub objects: DetectionFilter,
    pub recorder: RecorderConfig,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = Self::from_toml_str(&fs::read_to_string(path)?)?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.tracker.validate()?;
        self.detector.validate()?;
        self.color.validate()?;
        self.flow.validate()?;
        self.associator.validate()?;
        self.objects.validate()?;
        self.recorder.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_empty_file_gives_defaults() {
        assert_eq!(AppConfig::from_toml_str("").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_partial_tables_keep_other_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [tracker]
            grace_frames = 8

            [recorder]
            fps = 15
            output = "clip.mp4"
            "#,
        )
        .unwrap();
        assert_eq!(config.tracker.grace_frames, 8);
        assert_eq!(config.tracker.history_len, 50);
        assert_eq!(config.recorder.fps, 15);
        assert_eq!(config.recorder.codec, "mp4v");
        assert_eq!(config.flow, FlowConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            AppConfig::from_toml_str("[tracker]\nhistory_len = 0"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            AppConfig::from_toml_str("[objects]\nconfidence = 2.0"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            AppConfig::from_toml_str("[tracker]\nhistory_len = \"many\""),
            Err(Error::Toml(_))
        ));
    }

    #[test]
    fn test_color_table() {
        let config = AppConfig::from_toml_str(
            r#"
            [color]
            lower = [0, 40, 80]
            kernel_radius = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.color.lower, [0, 40, 80]);
        assert_eq!(config.color.upper, [180, 255, 255]);
        assert_eq!(config.color.kernel_radius, 3);
        assert_eq!(config.color.min_area, 1000.0);
        assert!(matches!(
            AppConfig::from_toml_str("[color]\nlower = [0, 0, 90]\nupper = [180, 255, 60]"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cuptrack.toml");
        fs::write(&path, "[flow]\nredetect_interval = 4\n").unwrap();
        assert_eq!(AppConfig::load(&path).unwrap().flow.redetect_interval, 4);
        assert!(matches!(
            AppConfig::load(dir.path().join("missing.toml")),
            Err(Error::Io(_))
        ));
    }
}
