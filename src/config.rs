//! Tracer configuration.
//!
//! Loaded from JSON; every field is optional and falls back to its
//! default.
//!
//! ```
//! use changeprobe::TracerConfig;
//!
//! let config = TracerConfig::from_json_str(r#"{ "default_timeout_secs": 2.5 }"#).unwrap();
//! assert_eq!(config.default_timeout_secs, 2.5);
//! assert!(config.normalize_attribute_names);
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ProbeResult};
use crate::typed::EnumLabels;

/// Configuration for an [`EventTracer`](crate::EventTracer) and the
/// assertions issued through it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    /// Timeout used by assertions when no shared budget is set (seconds).
    pub default_timeout_secs: f64,
    /// Reduce raw attribute names to their short form.
    pub normalize_attribute_names: bool,
    /// Cap on the events listed in a failure message (the latest are kept).
    pub max_events_in_report: Option<usize>,
    /// Enum label tables keyed by attribute name; events of those
    /// attributes are typed when received.
    pub event_enum_mapping: BTreeMap<String, EnumLabels>,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 0.0,
            normalize_attribute_names: true,
            max_events_in_report: None,
            event_enum_mapping: BTreeMap::new(),
        }
    }
}

impl TracerConfig {
    /// Parse a JSON document and validate it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` on malformed JSON and
    /// `ConfigError::Invalid` if validation fails.
    pub fn from_json_str(json: &str) -> ProbeResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()
    }

    /// Read and parse a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` if the file cannot be read, otherwise
    /// the errors of [`from_json_str`](Self::from_json_str).
    pub fn from_path(path: impl AsRef<Path>) -> ProbeResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json_str(&json)
    }

    /// Normalize and check the values.
    ///
    /// Negative or non-finite timeouts become 0. A report cap of zero is
    /// rejected.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for `max_events_in_report == Some(0)`
    /// or an enum mapping with an empty attribute name.
    pub fn validate(mut self) -> ProbeResult<Self> {
        if !self.default_timeout_secs.is_finite() || self.default_timeout_secs < 0.0 {
            self.default_timeout_secs = 0.0;
        }
        if self.max_events_in_report == Some(0) {
            return Err(ConfigError::Invalid {
                field: "max_events_in_report",
                reason: "must be at least 1 (omit it to list every event)".to_string(),
            }
            .into());
        }
        if self.event_enum_mapping.keys().any(String::is_empty) {
            return Err(ConfigError::Invalid {
                field: "event_enum_mapping",
                reason: "attribute names must not be empty".to_string(),
            }
            .into());
        }
        Ok(self)
    }
}
