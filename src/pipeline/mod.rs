// SPDX-License-Identifier: MPL-2.0

//! Streaming pipeline model
//!
//! A pipeline is a linear chain of eight stages. Each stage has a role
//! ([`StageKind`]) and is realized by one concrete media-framework element
//! chosen at build time:
//!
//! ```text
//! ┌─────────┐   ┌────────┐   ┌─────────┐   ┌────────┐   ┌──────────┐   ┌───────┐   ┌────────────┐   ┌──────────┐
//! │ Capture │ → │ Format │ → │ Convert │ → │ Encode │ → │ H.264 L4 │ → │ Parse │ → │ Packetize  │ → │ Transmit │
//! │         │   │ caps   │   │         │   │        │   │ caps     │   │       │   │ (RTP)      │   │ (UDP)    │
//! └─────────┘   └────────┘   └─────────┘   └────────┘   └──────────┘   └───────┘   └────────────┘   └──────────┘
//! ```
//!
//! - [`properties`]: per-implementation tuning tables
//! - [`factory`]: candidate resolution for one stage
//! - [`builder`]: full assembly with format fallback and statistics taps

pub mod builder;
pub mod factory;
pub mod properties;

pub use builder::{BuiltPipeline, PipelineBuilder};
pub use factory::{SelectedStage, StageFactory};

use crate::constants::fallback_format;
use std::fmt;
use std::sync::Arc;

/// Role of a stage in the streaming chain
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StageKind {
    Capture,
    FormatConstrain,
    Convert,
    Encode,
    StreamFormat,
    Parse,
    Packetize,
    Transmit,
}

impl StageKind {
    /// Every stage in link order
    pub const ALL: [StageKind; 8] = [
        StageKind::Capture,
        StageKind::FormatConstrain,
        StageKind::Convert,
        StageKind::Encode,
        StageKind::StreamFormat,
        StageKind::Parse,
        StageKind::Packetize,
        StageKind::Transmit,
    ];

    /// Element name given to the stage inside the pipeline
    pub fn element_name(&self) -> &'static str {
        match self {
            StageKind::Capture => "source",
            StageKind::FormatConstrain => "capsfilter",
            StageKind::Convert => "convert",
            StageKind::Encode => "encoder",
            StageKind::StreamFormat => "encoder_caps",
            StageKind::Parse => "parser",
            StageKind::Packetize => "payloader",
            StageKind::Transmit => "sink",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            StageKind::Capture => "capture",
            StageKind::FormatConstrain => "format-constrain",
            StageKind::Convert => "convert",
            StageKind::Encode => "encode",
            StageKind::StreamFormat => "stream-format",
            StageKind::Parse => "parse",
            StageKind::Packetize => "packetize",
            StageKind::Transmit => "transmit",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Raw video format imposed on the capture side
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct FormatSpec {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    /// Optional pixel format hint (e.g. "NV12")
    pub pixel_format: Option<String>,
}

impl FormatSpec {
    /// Format requested by a capture implementation.
    ///
    /// libcamerasrc negotiates far more reliably with an explicit NV12 hint.
    pub fn for_capture(implementation: &str, width: u32, height: u32, framerate: u32) -> Self {
        let pixel_format = (implementation == "libcamerasrc").then(|| "NV12".to_string());
        Self {
            width,
            height,
            framerate,
            pixel_format,
        }
    }

    /// Conservative format retried when the configured one fails to link
    pub fn fallback() -> Self {
        Self {
            width: fallback_format::WIDTH,
            height: fallback_format::HEIGHT,
            framerate: fallback_format::FRAMERATE,
            pixel_format: None,
        }
    }
}

impl fmt::Display for FormatSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{}fps", self.width, self.height, self.framerate)?;
        if let Some(format) = &self.pixel_format {
            write!(f, " ({})", format)?;
        }
        Ok(())
    }
}

/// Registry answer for an implementation name
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Availability {
    Available,
    Unavailable,
    /// The registry cannot tell; instantiation is attempted anyway
    Unknown,
}

/// Which side of a stage a data tap observes
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TapPoint {
    Input,
    Output,
}

/// Callback invoked for every data unit passing a tap, with its size in bytes
pub type DataTap = Arc<dyn Fn(usize) + Send + Sync>;

/// Asynchronous notification from a running pipeline
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    Error {
        source: String,
        message: String,
        debug: Option<String>,
    },
    Warning {
        source: String,
        message: String,
        debug: Option<String>,
    },
    Info {
        source: String,
        message: String,
    },
    EndOfStream,
    StateChanged {
        source: String,
        /// Whether the transition belongs to the pipeline itself
        is_pipeline: bool,
        old: String,
        new: String,
    },
}
