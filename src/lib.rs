// SPDX-License-Identifier: MPL-2.0

//! camera-tx - live camera streamer with a runtime control plane
//!
//! Captures video, encodes it to H.264, packetizes it as RTP and sends it
//! over UDP. An HTTP control plane changes routing and encoding parameters
//! while the stream is running.
//!
//! # Architecture
//!
//! - [`config`]: stream configuration, validation and change classification
//! - [`storage`]: config file location and persistence
//! - [`pipeline`]: stage model, stage factory and pipeline builder
//! - [`backends`]: media framework abstraction and the GStreamer backend
//! - [`controller`]: lifecycle state machine and event monitor
//! - [`stats`]: byte and frame accounting fed by pipeline taps
//! - [`capabilities`]: camera and encoder introspection
//! - [`api`]: axum HTTP control plane
//!
//! # Example
//!
//! ```ignore
//! // Stream the default camera and serve the API on :8888, then redirect the stream
//! // camera-tx --http-port 8888
//! // curl -X POST localhost:8888/config -d '{"host":"192.168.1.10"}'
//! ```

pub mod api;
pub mod backends;
pub mod capabilities;
pub mod config;
pub mod constants;
pub mod controller;
pub mod errors;
pub mod pipeline;
pub mod stats;
pub mod storage;

// Re-export commonly used types
pub use config::{ChangeClass, ConfigUpdate, SourceKind, StreamConfig};
pub use controller::{
    ControlHandle, ControllerSettings, EncoderErrorPolicy, ExitReason, LifecycleController,
    LifecycleState,
};
pub use errors::{AppError, AppResult};
