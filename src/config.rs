// SPDX-License-Identifier: GPL-3.0-only

//! Stream configuration, partial updates and change classification

use crate::constants::{self, bounds};
use crate::errors::ConfigError;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

/// Capture source implementation family
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// libcamera (Raspberry Pi CSI cameras and friends)
    #[default]
    Libcamera,
    /// Plain V4L2 capture device (USB webcams)
    V4l2,
    /// Synthetic test pattern
    Test,
}

impl SourceKind {
    /// GStreamer element implementing this source
    pub fn implementation(&self) -> &'static str {
        match self {
            SourceKind::Libcamera => "libcamerasrc",
            SourceKind::V4l2 => "v4l2src",
            SourceKind::Test => "videotestsrc",
        }
    }

    /// Parse either the short name or the element name
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "libcamera" | "libcamerasrc" => Some(SourceKind::Libcamera),
            "v4l2" | "v4l2src" => Some(SourceKind::V4l2),
            "test" | "videotestsrc" => Some(SourceKind::Test),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Libcamera => write!(f, "libcamera"),
            SourceKind::V4l2 => write!(f, "v4l2"),
            SourceKind::Test => write!(f, "test"),
        }
    }
}

/// How an applied update has to be carried out on the live pipeline
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeClass {
    /// Nothing changed
    None,
    /// Only the network destination changed; patch the sink in place
    ConnectionOnly,
    /// Capture or encode parameters changed; the pipeline must be rebuilt
    TopologyChanging,
}

/// The validated streaming configuration
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StreamConfig {
    /// Destination host
    pub host: String,
    /// Destination UDP port
    pub port: u16,
    /// Capture source family
    #[serde(rename = "src")]
    pub source: SourceKind,
    /// Source specific device identifier (None = auto-detect)
    pub device: Option<String>,
    /// Preferred encoder element
    pub encoder: String,
    /// Capture width
    pub width: u32,
    /// Capture height
    pub height: u32,
    /// Capture framerate
    pub framerate: u32,
    /// Continuous autofocus on/off (None = leave source default)
    pub autofocus: Option<bool>,
    /// Manual lens position, normalized 0.0 (infinity) to 1.0 (closest)
    pub lens_position: Option<f32>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            host: constants::DEFAULT_HOST.to_string(),
            port: constants::DEFAULT_PORT,
            source: SourceKind::default(),
            device: None,
            encoder: constants::DEFAULT_ENCODER.to_string(),
            width: constants::DEFAULT_WIDTH,
            height: constants::DEFAULT_HEIGHT,
            framerate: constants::DEFAULT_FRAMERATE,
            autofocus: None,
            lens_position: None,
        }
    }
}

/// A partial configuration update.
///
/// Numeric fields are kept wide so out-of-range input survives parsing and
/// is rejected (and logged) by [`StreamConfig::apply`] instead.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigUpdate {
    pub host: Option<String>,
    pub port: Option<i64>,
    pub source: Option<String>,
    /// `Some(None)` clears the device (auto-detect)
    pub device: Option<Option<String>>,
    pub encoder: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub framerate: Option<i64>,
    /// `Some(None)` restores the source's own focus behaviour
    pub autofocus: Option<Option<bool>>,
    /// `Some(None)` clears a manual lens position
    pub lens_position: Option<Option<f64>>,
}

impl ConfigUpdate {
    /// Extract recognized fields from a JSON object.
    ///
    /// Fields with the wrong JSON type are ignored individually; only a
    /// non-object document is an error.
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let object = value
            .as_object()
            .ok_or_else(|| ConfigError::Parse("expected a JSON object".to_string()))?;

        let mut update = ConfigUpdate::default();

        for (key, field) in object {
            // Null clears the optional fields; elsewhere it means "not given"
            if field.is_null()
                && !matches!(key.as_str(), "device" | "camera" | "autofocus" | "lens_position")
            {
                continue;
            }
            match key.as_str() {
                "host" => update.host = string_field(key, field),
                "port" => update.port = int_field(key, field),
                "src" | "source" => update.source = string_field(key, field),
                // "camera" is the historical name of the device field
                "device" | "camera" => {
                    if key == "camera" && object.contains_key("device") {
                        continue;
                    }
                    update.device = if field.is_null() {
                        Some(None)
                    } else {
                        string_field(key, field).map(normalize_device)
                    };
                }
                "encoder" => update.encoder = string_field(key, field),
                "width" => update.width = int_field(key, field),
                "height" => update.height = int_field(key, field),
                "framerate" => update.framerate = int_field(key, field),
                "autofocus" if field.is_null() => update.autofocus = Some(None),
                "autofocus" => match field.as_bool() {
                    Some(v) => update.autofocus = Some(Some(v)),
                    None => warn!(field = %key, "Ignoring non-boolean value"),
                },
                "lens_position" if field.is_null() => update.lens_position = Some(None),
                "lens_position" => match field.as_f64() {
                    Some(v) => update.lens_position = Some(Some(v)),
                    None => warn!(field = %key, "Ignoring non-numeric value"),
                },
                other => warn!(field = %other, "Ignoring unrecognized configuration field"),
            }
        }

        Ok(update)
    }

    /// Parse a JSON document
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(&value)
    }
}

fn string_field(key: &str, value: &Value) -> Option<String> {
    match value.as_str() {
        Some(s) => Some(s.to_string()),
        None => {
            warn!(field = %key, "Ignoring non-string value");
            None
        }
    }
}

fn int_field(key: &str, value: &Value) -> Option<i64> {
    match value.as_i64() {
        Some(v) => Some(v),
        None => {
            warn!(field = %key, value = %value, "Ignoring non-integer value");
            None
        }
    }
}

fn normalize_device(device: String) -> Option<String> {
    let trimmed = device.trim();
    if trimmed.is_empty() || trimmed == constants::AUTO_DETECT_DEVICE {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Accept `value` if it lies within `min..=max`, logging the rejection otherwise
fn bounded_u32(name: &str, value: i64, min: u32, max: u32, current: u32) -> Option<u32> {
    if value >= i64::from(min) && value <= i64::from(max) {
        Some(value as u32)
    } else {
        warn!(
            "Invalid {} {} (allowed {}-{}), keeping current value {}",
            name, value, min, max, current
        );
        None
    }
}

impl StreamConfig {
    /// Apply a partial update and classify the resulting change.
    ///
    /// Present in-bound fields overwrite stored ones; out-of-bound or
    /// malformed fields are logged and the stored value is kept.
    pub fn apply(&mut self, update: &ConfigUpdate) -> ChangeClass {
        let old = self.clone();

        if let Some(host) = &update.host {
            let host = host.trim();
            if host.is_empty() {
                warn!(current = %self.host, "Invalid empty host, keeping current value");
            } else {
                self.host = host.to_string();
            }
        }

        if let Some(port) = update.port {
            if port >= i64::from(bounds::PORT_MIN) && port <= i64::from(u16::MAX) {
                self.port = port as u16;
            } else {
                warn!("Invalid port {}, keeping current value {}", port, self.port);
            }
        }

        if let Some(source) = &update.source {
            match SourceKind::parse(source) {
                Some(kind) => self.source = kind,
                None => warn!(
                    "Unknown source {:?}, keeping current value {}",
                    source, self.source
                ),
            }
        }

        if let Some(device) = &update.device {
            self.device = device.clone();
        }

        if let Some(encoder) = &update.encoder {
            let encoder = encoder.trim();
            if encoder.is_empty() {
                warn!(current = %self.encoder, "Invalid empty encoder, keeping current value");
            } else {
                self.encoder = encoder.to_string();
            }
        }

        if let Some(width) = update.width {
            if let Some(v) = bounded_u32("width", width, bounds::WIDTH_MIN, bounds::WIDTH_MAX, self.width) {
                self.width = v;
            }
        }

        if let Some(height) = update.height {
            if let Some(v) = bounded_u32(
                "height",
                height,
                bounds::HEIGHT_MIN,
                bounds::HEIGHT_MAX,
                self.height,
            ) {
                self.height = v;
            }
        }

        if let Some(framerate) = update.framerate {
            if let Some(v) = bounded_u32(
                "framerate",
                framerate,
                bounds::FRAMERATE_MIN,
                bounds::FRAMERATE_MAX,
                self.framerate,
            ) {
                self.framerate = v;
            }
        }

        if let Some(autofocus) = update.autofocus {
            self.autofocus = autofocus;
        }

        match update.lens_position {
            None => {}
            Some(None) => self.lens_position = None,
            Some(Some(position)) => {
                let min = f64::from(bounds::LENS_POSITION_MIN);
            let max = f64::from(bounds::LENS_POSITION_MAX);
                if position.is_finite() && position >= min && position <= max {
                    self.lens_position = Some(position as f32);
                } else {
                    warn!(
                        "Invalid lens_position {}, keeping current value {:?}",
                        position, self.lens_position
                    );
                }
            }
        }

        let class = classify(&old, self);
        if class != ChangeClass::None {
            info!(change = ?class, config = %self, "Configuration updated");
        }
        class
    }

    /// Destination as (host, port)
    pub fn destination(&self) -> (&str, u16) {
        (&self.host, self.port)
    }

    /// Copy of this config with capture and encode settings reset to defaults
    /// (destination kept)
    pub fn with_default_capture(&self) -> Self {
        Self {
            host: self.host.clone(),
            port: self.port,
            ..Self::default()
        }
    }

    /// Replace capture and encode settings with those of `other`
    pub fn adopt_capture(&mut self, other: &StreamConfig) {
        self.source = other.source;
        self.device = other.device.clone();
        self.encoder = other.encoder.clone();
        self.width = other.width;
        self.height = other.height;
        self.framerate = other.framerate;
        self.autofocus = other.autofocus;
        self.lens_position = other.lens_position;
    }

    fn same_topology(&self, other: &StreamConfig) -> bool {
        self.source == other.source
            && self.device == other.device
            && self.encoder == other.encoder
            && self.width == other.width
            && self.height == other.height
            && self.framerate == other.framerate
            && self.autofocus == other.autofocus
            && self.lens_position == other.lens_position
    }
}

impl std::fmt::Display for StreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} src={} device={} encoder={} {}x{}@{}fps",
            self.host,
            self.port,
            self.source,
            self.device.as_deref().unwrap_or(constants::AUTO_DETECT_DEVICE),
            self.encoder,
            self.width,
            self.height,
            self.framerate
        )
    }
}

/// Classify the difference between two configurations
pub fn classify(old: &StreamConfig, new: &StreamConfig) -> ChangeClass {
    if !old.same_topology(new) {
        ChangeClass::TopologyChanging
    } else if old.destination() != new.destination() {
        ChangeClass::ConnectionOnly
    } else {
        ChangeClass::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn update(value: Value) -> ConfigUpdate {
        ConfigUpdate::from_value(&value).unwrap()
    }

    #[test]
    fn test_host_only_is_connection_change() {
        let mut config = StreamConfig::default();
        let class = config.apply(&update(json!({"host": "10.0.0.5"})));
        assert_eq!(class, ChangeClass::ConnectionOnly);
        assert_eq!(config.host, "10.0.0.5");
    }

    #[test]
    fn test_resolution_is_topology_change() {
        let mut config = StreamConfig::default();
        let class = config.apply(&update(json!({"width": 1920, "height": 1080})));
        assert_eq!(class, ChangeClass::TopologyChanging);
        assert_eq!((config.width, config.height), (1920, 1080));
    }

    #[test]
    fn test_topology_wins_over_connection() {
        let mut config = StreamConfig::default();
        let class = config.apply(&update(json!({"port": 6000, "encoder": "x264enc"})));
        assert_eq!(class, ChangeClass::TopologyChanging);
        assert_eq!(config.port, 6000);
    }

    #[test]
    fn test_reapplying_is_idempotent() {
        let mut config = StreamConfig::default();
        let body = update(json!({"framerate": 60, "host": "192.168.1.2"}));
        assert_ne!(config.apply(&body), ChangeClass::None);
        assert_eq!(config.apply(&body), ChangeClass::None);
    }

    #[test]
    fn test_bounds_inclusive() {
        let mut config = StreamConfig::default();
        config.apply(&update(json!({"width": 320, "height": 2592, "framerate": 120})));
        assert_eq!((config.width, config.height, config.framerate), (320, 2592, 120));

        config.apply(&update(json!({"width": 4608, "height": 240, "framerate": 1})));
        assert_eq!((config.width, config.height, config.framerate), (4608, 240, 1));
    }

    #[test]
    fn test_out_of_bounds_keeps_previous() {
        let mut config = StreamConfig::default();
        let class = config.apply(&update(json!({
            "width": 319, "height": 2593, "framerate": 0, "port": 70000
        })));
        assert_eq!(class, ChangeClass::None);
        assert_eq!(config, StreamConfig::default());

        config.apply(&update(json!({"width": 4609, "height": 239, "framerate": 121, "port": 0})));
        assert_eq!(config, StreamConfig::default());
    }

    #[test]
    fn test_invalid_field_does_not_block_valid_ones() {
        let mut config = StreamConfig::default();
        let class = config.apply(&update(json!({"width": 99999, "height": 1080})));
        assert_eq!(class, ChangeClass::TopologyChanging);
        assert_eq!(config.width, crate::constants::DEFAULT_WIDTH);
        assert_eq!(config.height, 1080);
    }

    #[test]
    fn test_wrong_types_and_unknown_fields_ignored() {
        let body = update(json!({"width": "1920", "port": 5.5, "bogus": true, "host": 7}));
        assert_eq!(body, ConfigUpdate::default());
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(ConfigUpdate::from_value(&json!([1, 2, 3])).is_err());
        assert!(ConfigUpdate::from_json(b"{not json").is_err());
    }

    #[test]
    fn test_camera_alias_and_auto_detect() {
        let mut config = StreamConfig::default();
        config.apply(&update(json!({"camera": "/base/imx708"})));
        assert_eq!(config.device.as_deref(), Some("/base/imx708"));

        let class = config.apply(&update(json!({"device": "auto-detect"})));
        assert_eq!(class, ChangeClass::TopologyChanging);
        assert_eq!(config.device, None);
    }

    #[test]
    fn test_focus_fields_are_topology() {
        let mut config = StreamConfig::default();
        assert_eq!(
            config.apply(&update(json!({"autofocus": false}))),
            ChangeClass::TopologyChanging
        );
        assert_eq!(
            config.apply(&update(json!({"lens_position": 0.5}))),
            ChangeClass::TopologyChanging
        );
        assert_eq!(
            config.apply(&update(json!({"lens_position": 1.5}))),
            ChangeClass::None
        );
        assert_eq!(config.lens_position, Some(0.5));
    }

    #[test]
    fn test_null_clears_focus_overrides() {
        let mut config = StreamConfig::default();
        config.apply(&update(json!({"autofocus": true, "lens_position": 0.5})));

        let class = config.apply(&update(json!({"lens_position": null})));
        assert_eq!(class, ChangeClass::TopologyChanging);
        assert_eq!(config.lens_position, None);
        assert_eq!(config.autofocus, Some(true));

        let class = config.apply(&update(json!({"autofocus": null})));
        assert_eq!(class, ChangeClass::TopologyChanging);
        assert_eq!(config.autofocus, None);

        // Already cleared
        assert_eq!(
            config.apply(&update(json!({"autofocus": null, "lens_position": null}))),
            ChangeClass::None
        );
    }

    #[test]
    fn test_source_parsing() {
        assert_eq!(SourceKind::parse("v4l2src"), Some(SourceKind::V4l2));
        assert_eq!(SourceKind::parse("TEST"), Some(SourceKind::Test));
        assert_eq!(SourceKind::parse("webcam"), None);
    }
}
