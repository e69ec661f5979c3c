// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Default destination host for the RTP stream
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default destination UDP port for the RTP stream
pub const DEFAULT_PORT: u16 = 5000;

/// Default HTTP control plane port
pub const DEFAULT_HTTP_PORT: u16 = 8888;

/// Default capture width
pub const DEFAULT_WIDTH: u32 = 1280;

/// Default capture height
pub const DEFAULT_HEIGHT: u32 = 720;

/// Default capture framerate
pub const DEFAULT_FRAMERATE: u32 = 30;

/// Default encoder (V4L2 M2M hardware encoder on Raspberry Pi class boards)
pub const DEFAULT_ENCODER: &str = "v4l2h264enc";

/// Device identifier meaning "let the source pick"
pub const AUTO_DETECT_DEVICE: &str = "auto-detect";

/// Validation bounds applied to every configuration update
pub mod bounds {
    /// Minimum accepted width
    pub const WIDTH_MIN: u32 = 320;
    /// Maximum accepted width
    pub const WIDTH_MAX: u32 = 4608;
    /// Minimum accepted height
    pub const HEIGHT_MIN: u32 = 240;
    /// Maximum accepted height
    pub const HEIGHT_MAX: u32 = 2592;
    /// Minimum accepted framerate
    pub const FRAMERATE_MIN: u32 = 1;
    /// Maximum accepted framerate
    pub const FRAMERATE_MAX: u32 = 120;
    /// Minimum accepted destination port
    pub const PORT_MIN: u16 = 1;
    /// Minimum normalized lens position (infinity)
    pub const LENS_POSITION_MIN: f32 = 0.0;
    /// Maximum normalized lens position (closest focus)
    pub const LENS_POSITION_MAX: f32 = 1.0;
}

/// Encoder selection and tuning
pub mod encoding {
    /// Encoders tried after the configured one, in priority order
    pub const ENCODER_FALLBACKS: &[&str] = &[
        "v4l2h264enc",  // Hardware encoder (Pi default)
        "omxh264enc",   // OpenMAX encoder (legacy Pi)
        "x264enc",      // Software
        "nvh264enc",    // NVIDIA
        "vaapih264enc", // Intel VA-API
    ];

    /// Encoders reported by the capability listing
    pub const KNOWN_H264_ENCODERS: &[&str] = &[
        "v4l2h264enc",
        "omxh264enc",
        "x264enc",
        "nvh264enc",
        "vaapih264enc",
        "qsvh264enc",
        "vtenc_h264",
        "mfh264enc",
    ];

    /// Target bitrate in kbps
    pub const BITRATE_KBPS: u32 = 2048;

    /// Keyframe interval in frames
    pub const KEYFRAME_INTERVAL: u32 = 30;

    /// H.264 level enforced on the encoded stream
    pub const H264_LEVEL: &str = "4";
}

/// Fallback capture format used when the configured one fails to link
pub mod fallback_format {
    pub const WIDTH: u32 = super::DEFAULT_WIDTH;
    pub const HEIGHT: u32 = super::DEFAULT_HEIGHT;
    pub const FRAMERATE: u32 = super::DEFAULT_FRAMERATE;
}

/// Focus control mapping for libcamerasrc
pub mod focus {
    /// Dioptre value the normalized lens position 1.0 maps to
    pub const LENS_POSITION_MAX_DIOPTRES: f32 = 15.0;
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Bounded wait for the pipeline to confirm it reached NULL
    pub const QUIESCE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Grace period for the OS to release the capture device after teardown
    pub const DEVICE_RELEASE_GRACE: Duration = Duration::from_secs(1);

    /// Event channel poll timeout
    pub const EVENT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

    /// Sleep when no event channel exists (mid-rebuild)
    pub const IDLE_INTERVAL: Duration = Duration::from_millis(100);

    /// Transmitted data units between periodic streaming logs
    pub const STATS_LOG_INTERVAL: u64 = 60;
}

/// Statistics reporting
pub mod stats {
    /// Upper bound for the reported framerate efficiency (percent)
    pub const FRAMERATE_EFFICIENCY_CAP: f64 = 150.0;
}

/// Config file location
pub mod storage {
    /// Environment variable overriding the config file path
    pub const CONFIG_PATH_ENV: &str = "CAMERA_TX_CONFIG_PATH";

    /// Directory name under the XDG config dir
    pub const CONFIG_DIR_NAME: &str = "camera-tx";

    /// Hidden directory name under $HOME when no XDG config dir exists
    pub const HOME_DIR_NAME: &str = ".camera-tx";

    /// Config file name
    pub const CONFIG_FILE_NAME: &str = "config.json";
}
