// SPDX-License-Identifier: MPL-2.0

//! Media backend abstraction
//!
//! The controller and pipeline builder only talk to these traits. The
//! GStreamer implementation lives in [`gstreamer`]; tests substitute an
//! in-memory backend.
//!
//! ```text
//! ┌──────────────────────┐
//! │ LifecycleController  │
//! └──────────┬───────────┘
//!            │
//! ┌──────────┴───────────┐
//! │   PipelineBuilder    │
//! └──────────┬───────────┘
//!            │
//! ┌──────────┴───────────┐     ┌───────────────┐
//! │ MediaBackend trait   │ ──▶ │ MediaPipeline │ ──▶ EventChannel
//! └──────────────────────┘     └───────────────┘
//! ```

#[cfg(feature = "gst")]
pub mod gstreamer;

use crate::errors::{BuildError, StageError};
use crate::pipeline::{Availability, DataTap, FormatSpec, PipelineEvent, StageKind, TapPoint};
use std::sync::Arc;
use std::time::Duration;

/// Entry point into a media framework
pub trait MediaBackend: Send + Sync {
    /// Ask the element registry whether an implementation exists
    fn probe(&self, implementation: &str) -> Availability;

    /// Create an empty pipeline container
    fn new_pipeline(&self) -> Result<Box<dyn MediaPipeline>, BuildError>;
}

/// One pipeline instance being assembled or running
///
/// Dropping a pipeline must release every resource it holds.
pub trait MediaPipeline: Send {
    /// Create a stage from a concrete implementation and add it to the pipeline
    fn instantiate(&mut self, kind: StageKind, implementation: &str) -> Result<(), StageError>;

    /// Implementation chosen for a stage
    fn implementation(&self, kind: StageKind) -> Option<String>;

    /// Set a property from its string form
    fn set_property(&mut self, kind: StageKind, name: &str, value: &str)
        -> Result<(), StageError>;

    /// Impose a raw video format on a format-constraining stage
    fn set_format(&mut self, kind: StageKind, format: &FormatSpec) -> Result<(), StageError>;

    /// Link every instantiated stage in [`StageKind::ALL`] order
    fn link(&mut self) -> Result<(), StageError>;

    /// Undo [`MediaPipeline::link`]
    fn unlink(&mut self);

    /// Observe every data unit flowing through one side of a stage
    fn add_tap(&mut self, kind: StageKind, point: TapPoint, tap: DataTap)
        -> Result<(), StageError>;

    /// Transition to the running state
    fn start(&mut self) -> Result<(), StageError>;

    /// Transition to the stopped state and wait up to `timeout` for confirmation
    fn stop(&mut self, timeout: Duration) -> Result<(), StageError>;

    /// Event channel of this pipeline
    fn events(&self) -> Option<Arc<dyn EventChannel>>;
}

/// Source of asynchronous pipeline events
pub trait EventChannel: Send + Sync {
    /// Wait up to `timeout` for the next event
    fn poll(&self, timeout: Duration) -> Option<PipelineEvent>;
}
