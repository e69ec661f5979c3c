// SPDX-License-Identifier: GPL-3.0-only

//! Per-implementation property tables
//!
//! Each stage implementation gets a fixed set of tuning properties. All
//! values are in string form so the backend can parse them against the
//! element's own property types. Unknown implementations get no properties.

use super::StageKind;
use crate::config::StreamConfig;
use crate::constants::{encoding, focus};

/// A property name and its string value
pub type Property = (&'static str, String);

/// Properties for `implementation` acting as stage `kind`
pub fn properties_for(kind: StageKind, implementation: &str, config: &StreamConfig) -> Vec<Property> {
    match kind {
        StageKind::Capture => capture_properties(implementation, config),
        StageKind::Encode => encoder_properties(implementation),
        StageKind::StreamFormat => vec![(
            "caps",
            format!("video/x-h264,level=(string){}", encoding::H264_LEVEL),
        )],
        StageKind::Packetize if implementation == "rtph264pay" => {
            // Resend SPS/PPS with every keyframe so late joiners can decode
            vec![("config-interval", "-1".to_string())]
        }
        StageKind::Transmit if implementation == "udpsink" => {
            let mut props = destination_properties(config);
            props.push(("sync", "false".to_string()));
            props.push(("async", "false".to_string()));
            props
        }
        _ => Vec::new(),
    }
}

/// Destination properties of the transmit stage, patched in place on
/// connection-only changes
pub fn destination_properties(config: &StreamConfig) -> Vec<Property> {
    vec![
        ("host", config.host.clone()),
        ("port", config.port.to_string()),
    ]
}

fn capture_properties(implementation: &str, config: &StreamConfig) -> Vec<Property> {
    let mut props = Vec::new();
    match implementation {
        "libcamerasrc" => {
            if let Some(device) = &config.device {
                props.push(("camera-name", device.clone()));
            }
            // Manual lens position wins over autofocus
            if let Some(position) = config.lens_position {
                props.push(("af-mode", "manual".to_string()));
                let dioptres = position * focus::LENS_POSITION_MAX_DIOPTRES;
                props.push(("lens-position", format!("{:.2}", dioptres)));
            } else if let Some(autofocus) = config.autofocus {
                let mode = if autofocus { "continuous" } else { "manual" };
                props.push(("af-mode", mode.to_string()));
            }
        }
        "v4l2src" => {
            if let Some(device) = &config.device {
                props.push(("device", device.clone()));
            }
        }
        "videotestsrc" => {
            props.push(("is-live", "true".to_string()));
        }
        _ => {}
    }
    props
}

fn encoder_properties(implementation: &str) -> Vec<Property> {
    let bitrate = encoding::BITRATE_KBPS;
    let gop = encoding::KEYFRAME_INTERVAL;
    match implementation {
        "x264enc" => vec![
            ("tune", "zerolatency".to_string()),
            ("speed-preset", "superfast".to_string()),
            ("bitrate", bitrate.to_string()),
            ("threads", "1".to_string()),
            ("key-int-max", gop.to_string()),
        ],
        "v4l2h264enc" => vec![(
            "extra-controls",
            "controls,repeat_sequence_header=true".to_string(),
        )],
        "omxh264enc" => vec![
            ("target-bitrate", (bitrate * 1000).to_string()),
            ("control-rate", "variable".to_string()),
        ],
        "nvh264enc" => vec![
            ("bitrate", bitrate.to_string()),
            ("gop-size", gop.to_string()),
            ("preset", "low-latency-hq".to_string()),
        ],
        "vaapih264enc" => vec![
            ("bitrate", bitrate.to_string()),
            ("keyframe-period", gop.to_string()),
        ],
        _ => Vec::new(),
    }
}
