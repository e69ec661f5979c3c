// SPDX-License-Identifier: GPL-3.0-only

//! Read-only capability introspection for the `/get` endpoints

use crate::constants::AUTO_DETECT_DEVICE;
use serde::Serialize;

/// A capture resolution a device claims to support
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
    pub max_framerate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Resolution {
    pub fn new(width: u32, height: u32, max_framerate: u32) -> Self {
        Self {
            width,
            height,
            max_framerate,
            description: None,
        }
    }
}

/// Source of camera and encoder information
pub trait CapabilityProvider: Send + Sync {
    /// Identifiers of the capture devices present
    fn cameras(&self) -> Vec<String>;

    /// H.264 encoders installed
    fn encoders(&self) -> Vec<String>;

    /// Resolutions supported by `device`
    fn resolutions(&self, device: &str) -> Vec<Resolution>;
}

/// Common modes offered when a device only reports a size range
const COMMON_MODES: &[(u32, u32, u32)] = &[
    (640, 480, 60),
    (1280, 720, 60),
    (1920, 1080, 30),
    (2304, 1296, 25),
    (4608, 2592, 10),
];

/// Common modes that fit inside a reported size range
pub fn common_modes_within(width: (u32, u32), height: (u32, u32)) -> Vec<Resolution> {
    COMMON_MODES
        .iter()
        .filter(|(w, h, _)| (width.0..=width.1).contains(w) && (height.0..=height.1).contains(h))
        .map(|&(w, h, fps)| Resolution::new(w, h, fps))
        .collect()
}

/// Modes reported when a device cannot be probed at all
pub fn fallback_resolutions() -> Vec<Resolution> {
    [
        (640, 480, 30, "VGA (basic fallback)"),
        (1280, 720, 30, "HD (basic fallback)"),
        (1920, 1080, 15, "Full HD (basic fallback)"),
    ]
    .iter()
    .map(|&(w, h, fps, desc)| Resolution {
        description: Some(desc.to_string()),
        ..Resolution::new(w, h, fps)
    })
    .collect()
}

/// Never report an empty camera list; the source can still auto-detect
pub fn with_camera_fallback(cameras: Vec<String>) -> Vec<String> {
    if cameras.is_empty() {
        vec![AUTO_DETECT_DEVICE.to_string()]
    } else {
        cameras
    }
}

/// Never report an empty encoder list; x264enc is the usual software fallback
pub fn with_encoder_fallback(encoders: Vec<String>) -> Vec<String> {
    if encoders.is_empty() {
        vec!["x264enc".to_string()]
    } else {
        encoders
    }
}

#[cfg(feature = "gst")]
pub use self::gst_impl::GstCapabilities;

#[cfg(feature = "gst")]
mod gst_impl {
    use super::*;
    use crate::constants::encoding;
    use gstreamer as gst;
    use gstreamer::prelude::*;
    use tracing::{debug, warn};

    /// Capabilities from the GStreamer registry and device monitor
    #[derive(Debug, Default, Clone)]
    pub struct GstCapabilities;

    impl GstCapabilities {
        fn video_sources() -> Vec<gst::Device> {
            let monitor = gst::DeviceMonitor::new();
            let _ = monitor.add_filter(Some("Video/Source"), None);
            if let Err(e) = monitor.start() {
                warn!(error = %e, "Device monitor failed to start");
                return Vec::new();
            }
            let devices: Vec<gst::Device> = monitor.devices().into_iter().collect();
            monitor.stop();
            devices
        }

        fn identifier(device: &gst::Device) -> String {
            device
                .properties()
                .and_then(|p| p.get::<String>("device.path").ok())
                .unwrap_or_else(|| device.display_name().to_string())
        }

        fn resolutions_from_caps(caps: &gst::CapsRef) -> Vec<Resolution> {
            let mut found: Vec<Resolution> = Vec::new();

            for s in caps.iter().filter(|s| s.name().starts_with("video/x-raw")) {
                let max_framerate = s
                    .get::<gst::Fraction>("framerate")
                    .ok()
                    .filter(|f| f.denom() > 0)
                    .map(|f| (f.numer() / f.denom()).max(0) as u32)
                    .unwrap_or(30);

                let modes = match (s.get::<i32>("width"), s.get::<i32>("height")) {
                    (Ok(w), Ok(h)) => vec![Resolution::new(w as u32, h as u32, max_framerate)],
                    _ => match (
                        s.get::<gst::IntRange<i32>>("width"),
                        s.get::<gst::IntRange<i32>>("height"),
                    ) {
                        (Ok(w), Ok(h)) => common_modes_within(
                            (w.min() as u32, w.max() as u32),
                            (h.min() as u32, h.max() as u32),
                        ),
                        _ => Vec::new(),
                    },
                };

                for mode in modes {
                    if !found.contains(&mode) {
                        found.push(mode);
                    }
                }
            }
            found
        }
    }

    impl CapabilityProvider for GstCapabilities {
        fn cameras(&self) -> Vec<String> {
            let cameras: Vec<String> = Self::video_sources().iter().map(Self::identifier).collect();
            debug!(count = cameras.len(), "Enumerated cameras");
            with_camera_fallback(cameras)
        }

        fn encoders(&self) -> Vec<String> {
            let encoders = encoding::KNOWN_H264_ENCODERS
                .iter()
                .filter(|name| gst::ElementFactory::find(name).is_some())
                .map(|name| name.to_string())
                .collect();
            with_encoder_fallback(encoders)
        }

        fn resolutions(&self, device: &str) -> Vec<Resolution> {
            let devices = Self::video_sources();
            let selected = if device == AUTO_DETECT_DEVICE {
                devices.first()
            } else {
                devices
                    .iter()
                    .find(|d| Self::identifier(d) == device || d.display_name().as_str() == device)
            };

            let probed = selected
                .and_then(|d| d.caps())
                .map(|caps| Self::resolutions_from_caps(&caps))
                .unwrap_or_default();

            if probed.is_empty() {
                debug!(device = %device, "No resolutions probed, using fallbacks");
                fallback_resolutions()
            } else {
                probed
            }
        }
    }
}
