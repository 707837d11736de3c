// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Acquisition settings, loadable from TOML.
//!
//! ```toml
//! preview = "igu"
//! header_policy = "reject"
//! scan_directory = "/data/hosi"
//!
//! [serial]
//! path = "/dev/ttyACM0"
//! ```
use std::fs;
use std::path::{Path, PathBuf};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

use crate::common::{BASE_INTEGRATION_OFFSET_US, LUMINANCE_SCALE, PIXEL_COUNT};
use crate::error::LibraryError;

/// What the live preview shows.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive, Serialize, Deserialize,
)]
#[repr(u8)]
#[serde(rename_all = "lowercase")]
pub enum PreviewMode {
    /// No live preview; the image is only rendered when the scan finishes.
    Deferred = 0,
    Rgb = 1,
    /// RGB with saturated cells highlighted.
    Saturation = 2,
    /// Near infrared, photopic, near ultraviolet false color.
    Igu = 3,
    /// Chlorophyll absorption against near infrared.
    Ndvi = 4,
}

impl Default for PreviewMode {
    fn default() -> Self {
        Self::Rgb
    }
}

impl PreviewMode {
    /// The next live mode, wrapping back around to RGB.
    pub fn next(self) -> Self {
        match self {
            Self::Deferred | Self::Ndvi => Self::Rgb,
            Self::Rgb => Self::Saturation,
            Self::Saturation => Self::Igu,
            Self::Igu => Self::Ndvi,
        }
    }
}

/// When a decoded sample is processed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulingPolicy {
    /// As soon as it's decoded.
    Immediate,
    /// On the next tick (or before the next line), leaving time to redraw the preview.
    Deferred,
}

impl SchedulingPolicy {
    /// Live previews defer processing by a tick, otherwise samples are processed inline.
    pub fn for_preview(preview: PreviewMode) -> Self {
        match preview {
            PreviewMode::Deferred => Self::Immediate,
            _ => Self::Deferred,
        }
    }
}

/// What to do with a scan header while a scan is already being filled.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeaderPolicy {
    /// Finish (and save) the current scan, then start the new one.
    #[default]
    FinalizeThenReplace,
    /// Refuse the new header and keep filling the current scan.
    Reject,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub path: Option<String>,
    pub baud_rate: u32,
    /// How long a single read may block before it counts as "nothing yet".
    pub timeout_ms: u64,
    /// Consecutive empty reads before giving up on an acknowledgement.
    pub idle_poll_limit: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: None,
            baud_rate: 115_200,
            timeout_ms: 100,
            idle_poll_limit: 600,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub pixel_count: usize,
    pub base_integration_offset_us: f64,
    pub luminance_scale: f64,
    pub preview: PreviewMode,
    /// Overrides the policy implied by `preview`.
    pub scheduling: Option<SchedulingPolicy>,
    pub header_policy: HeaderPolicy,
    /// Preview brightness, 1 to 100. Lower values brighten the preview.
    pub brightness_percent: u8,
    pub scan_directory: PathBuf,
    /// Appended to saved scan file names.
    pub scan_label: String,
    pub serial: SerialConfig,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            pixel_count: PIXEL_COUNT,
            base_integration_offset_us: BASE_INTEGRATION_OFFSET_US,
            luminance_scale: LUMINANCE_SCALE,
            preview: PreviewMode::default(),
            scheduling: None,
            header_policy: HeaderPolicy::default(),
            brightness_percent: 100,
            scan_directory: PathBuf::from("scans"),
            scan_label: String::new(),
            serial: SerialConfig::default(),
        }
    }
}

impl AcquisitionConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, LibraryError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, LibraryError> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), LibraryError> {
        if self.pixel_count == 0 {
            return Err(LibraryError::Config("pixel_count must be positive".into()));
        }
        if !(1..=100).contains(&self.brightness_percent) {
            return Err(LibraryError::Config(format!(
                "brightness_percent must be between 1 and 100, not {}",
                self.brightness_percent
            )));
        }
        Ok(())
    }

    pub fn scheduling(&self) -> SchedulingPolicy {
        self.scheduling
            .unwrap_or_else(|| SchedulingPolicy::for_preview(self.preview))
    }

    /// The preview gain from the brightness setting.
    pub fn preview_gain(&self) -> f64 {
        100.0 / f64::from(self.brightness_percent.max(1))
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::{AcquisitionConfig, HeaderPolicy, PreviewMode, SchedulingPolicy};
    use crate::error::LibraryError;

    #[test]
    fn defaults() {
        let config = AcquisitionConfig::from_toml_str("").unwrap();
        assert_eq!(config, AcquisitionConfig::default());
        assert_eq!(config.pixel_count, 288);
        assert_eq!(config.base_integration_offset_us, 550.0);
        assert_eq!(config.scheduling(), SchedulingPolicy::Deferred);
        assert_eq!(config.preview_gain(), 1.0);
        assert_eq!(config.serial.baud_rate, 115_200);
    }

    #[test]
    fn overrides() {
        let config = AcquisitionConfig::from_toml_str(
            r#"
            preview = "deferred"
            header_policy = "reject"
            brightness_percent = 50
            scan_label = "meadow"

            [serial]
            path = "/dev/ttyUSB0"
            "#,
        )
        .unwrap();
        assert_eq!(config.preview, PreviewMode::Deferred);
        assert_eq!(config.scheduling(), SchedulingPolicy::Immediate);
        assert_eq!(config.header_policy, HeaderPolicy::Reject);
        assert_eq!(config.preview_gain(), 2.0);
        assert_eq!(config.serial.path.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.serial.timeout_ms, 100);
    }

    #[test]
    fn explicit_scheduling_wins() {
        let config = AcquisitionConfig::from_toml_str("preview = \"igu\"\nscheduling = \"immediate\"").unwrap();
        assert_eq!(config.scheduling(), SchedulingPolicy::Immediate);
    }

    #[test]
    fn invalid_brightness() {
        assert!(matches!(
            AcquisitionConfig::from_toml_str("brightness_percent = 0"),
            Err(LibraryError::Config(_))
        ));
    }

    #[test]
    fn unknown_preview_mode() {
        assert!(matches!(
            AcquisitionConfig::from_toml_str("preview = \"thermal\""),
            Err(LibraryError::Config(_))
        ));
    }

    #[test]
    fn from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "scan_directory = \"/tmp/hosi\"").unwrap();
        let config = AcquisitionConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.scan_directory.to_str(), Some("/tmp/hosi"));
    }

    #[test]
    fn preview_cycle() {
        let mut mode = PreviewMode::Deferred;
        let mut seen = Vec::new();
        for _ in 0..5 {
            mode = mode.next();
            seen.push(u8::from(mode));
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 1]);
        assert_eq!(PreviewMode::try_from(3u8).unwrap(), PreviewMode::Igu);
    }
}
