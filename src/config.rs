//! Construction-time configuration for detectors, tracker and slicing.
//!
//! Everything here is plain data with serde derives so a whole tracking
//! setup can be loaded from a JSON file. Validation happens once, when a
//! component is built; nothing is reconfigurable afterwards.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::slicer::SliceMode;
use crate::MAX_SENSOR_DIM;

/// Rising-edge intervals shorter than this are treated as sensor noise.
pub const DEFAULT_DEBOUNCE_US: i64 = 1000;

/// Below this magnitude an eigenvector candidate falls back to `(0, 1)`.
pub const DEFAULT_EIGENVECTOR_EPSILON: f64 = 1e-9;

fn validate_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::invalid("dimensions", "must be positive"));
    }
    if width > MAX_SENSOR_DIM || height > MAX_SENSOR_DIM {
        return Err(Error::invalid(
            "dimensions",
            format!("exceed maximum of {}", MAX_SENSOR_DIM),
        ));
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrequencyDetectorConfig {
    pub width: u32,
    pub height: u32,
    pub target_frequency_hz: f64,
    pub tolerance_hz: f64,
    pub required_matches: u32,
    #[serde(default = "default_debounce_us")]
    pub debounce_us: i64,
}

fn default_debounce_us() -> i64 {
    DEFAULT_DEBOUNCE_US
}

impl FrequencyDetectorConfig {
    pub fn new(
        width: u32,
        height: u32,
        target_frequency_hz: f64,
        tolerance_hz: f64,
        required_matches: u32,
    ) -> Self {
        Self {
            width,
            height,
            target_frequency_hz,
            tolerance_hz,
            required_matches,
            debounce_us: DEFAULT_DEBOUNCE_US,
        }
    }

    pub fn with_debounce_us(mut self, debounce_us: i64) -> Self {
        self.debounce_us = debounce_us;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_dimensions(self.width, self.height)?;
        if !(self.target_frequency_hz.is_finite() && self.target_frequency_hz > 0.0) {
            return Err(Error::invalid(
                "target_frequency_hz",
                "must be positive and finite",
            ));
        }
        if !(self.tolerance_hz.is_finite() && self.tolerance_hz >= 0.0) {
            return Err(Error::invalid(
                "tolerance_hz",
                "must be non-negative and finite",
            ));
        }
        if self.required_matches == 0 {
            return Err(Error::invalid("required_matches", "must be at least 1"));
        }
        if self.debounce_us < 1 {
            return Err(Error::invalid("debounce_us", "must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PcaTrackerConfig {
    pub max_window_size: usize,
    #[serde(default = "default_eigenvector_epsilon")]
    pub eigenvector_epsilon: f64,
}

fn default_eigenvector_epsilon() -> f64 {
    DEFAULT_EIGENVECTOR_EPSILON
}

impl PcaTrackerConfig {
    pub fn new(max_window_size: usize) -> Self {
        Self {
            max_window_size,
            eigenvector_epsilon: DEFAULT_EIGENVECTOR_EPSILON,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_window_size < 2 {
            return Err(Error::invalid("max_window_size", "must be at least 2"));
        }
        if !(self.eigenvector_epsilon.is_finite() && self.eigenvector_epsilon > 0.0) {
            return Err(Error::invalid(
                "eigenvector_epsilon",
                "must be positive and finite",
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceConfig {
    pub mode: SliceMode,
    /// Events per batch (`ByCount`) or microseconds per batch (`ByTime`).
    pub threshold: i64,
}

impl Default for SliceConfig {
    fn default() -> Self {
        Self {
            mode: SliceMode::ByTime,
            threshold: 10_000,
        }
    }
}

/// One frequency detector of a [`TrackingConfig`]; the sensor size is shared.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorSpec {
    pub target_frequency_hz: f64,
    pub tolerance_hz: f64,
    pub required_matches: u32,
    #[serde(default = "default_debounce_us")]
    pub debounce_us: i64,
}

impl DetectorSpec {
    pub fn new(target_frequency_hz: f64, tolerance_hz: f64, required_matches: u32) -> Self {
        Self {
            target_frequency_hz,
            tolerance_hz,
            required_matches,
            debounce_us: DEFAULT_DEBOUNCE_US,
        }
    }

    pub fn to_config(&self, width: u32, height: u32) -> FrequencyDetectorConfig {
        FrequencyDetectorConfig {
            width,
            height,
            target_frequency_hz: self.target_frequency_hz,
            tolerance_hz: self.tolerance_hz,
            required_matches: self.required_matches,
            debounce_us: self.debounce_us,
        }
    }
}

/// A complete tracking setup: sensor size, any number of frequency
/// detectors, an optional PCA tracker and the batch slicing policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub width: u32,
    pub height: u32,
    pub detectors: Vec<DetectorSpec>,
    pub pca: Option<PcaTrackerConfig>,
    pub slice: SliceConfig,
}

impl Default for TrackingConfig {
    /// Four LED detectors at 100..400 Hz with 10% tolerance, a 20k-event PCA
    /// window and 10 ms slices on a 128x128 sensor.
    fn default() -> Self {
        Self {
            width: 128,
            height: 128,
            detectors: [100.0, 200.0, 300.0, 400.0]
                .iter()
                .map(|&hz| DetectorSpec::new(hz, hz / 10.0, 3))
                .collect(),
            pca: Some(PcaTrackerConfig::new(20_000)),
            slice: SliceConfig::default(),
        }
    }
}

impl TrackingConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: TrackingConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn detector_configs(&self) -> impl Iterator<Item = FrequencyDetectorConfig> + '_ {
        self.detectors
            .iter()
            .map(|d| d.to_config(self.width, self.height))
    }

    pub fn validate(&self) -> Result<()> {
        validate_dimensions(self.width, self.height)?;
        for detector in self.detector_configs() {
            detector.validate()?;
        }
        if let Some(pca) = &self.pca {
            pca.validate()?;
        }
        if self.slice.threshold <= 0 {
            return Err(Error::invalid("slice.threshold", "must be positive"));
        }
        Ok(())
    }
}
