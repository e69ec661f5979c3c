// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline lifecycle controller
//!
//! The controller owns the live pipeline and is the only place that builds,
//! rebuilds or tears it down. HTTP handlers talk to it through a cloneable
//! [`ControlHandle`] that shares one lock-guarded `ControlState`:
//!
//! ```text
//!   HTTP handlers ──▶ ControlHandle ──┐
//!                                     ▼
//!                           Arc<Mutex<ControlState>>
//!                                     ▲
//!   main thread ──▶ LifecycleController::tick()
//!                     ├─ terminate requested? → teardown, exit
//!                     ├─ restart requested?   → teardown, grace, build
//!                     └─ otherwise            → poll events (lock released)
//! ```
//!
//! Host/port changes are patched into the live transmit stage under the lock
//! and never cause a rebuild.

pub mod monitor;

use crate::backends::{EventChannel, MediaBackend, MediaPipeline};
use crate::config::{ChangeClass, ConfigUpdate, StreamConfig};
use crate::constants::timing;
use crate::errors::BuildError;
use crate::pipeline::factory::candidates_for;
use crate::pipeline::properties::destination_properties;
use crate::pipeline::{BuiltPipeline, FormatSpec, PipelineBuilder, StageKind};
use crate::stats::{StatsCollector, StatsSnapshot};
use crate::storage::ConfigPersister;
use monitor::MonitorAction;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Running state of the streaming pipeline
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Stopped,
    Running,
    Rebuilding,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Stopped => write!(f, "stopped"),
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::Rebuilding => write!(f, "rebuilding"),
        }
    }
}

/// What to do when the encoder reports a runtime error
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, clap::ValueEnum)]
pub enum EncoderErrorPolicy {
    /// Stop streaming and exit (the operator picks another encoder)
    #[default]
    Terminate,
    /// Rebuild with the next encoder that has not failed yet
    Fallback,
}

/// Why the controller stopped
#[derive(Clone, Debug, PartialEq)]
pub enum ExitReason {
    Shutdown,
    EndOfStream,
    RuntimeError(String),
    BuildFailed(String),
}

impl ExitReason {
    /// Whether the process should exit with a failure status
    pub fn is_failure(&self) -> bool {
        matches!(self, ExitReason::RuntimeError(_) | ExitReason::BuildFailed(_))
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Shutdown => write!(f, "shutdown requested"),
            ExitReason::EndOfStream => write!(f, "end of stream"),
            ExitReason::RuntimeError(msg) => write!(f, "runtime error: {}", msg),
            ExitReason::BuildFailed(msg) => write!(f, "pipeline build failed: {}", msg),
        }
    }
}

/// Controller tuning
#[derive(Clone, Debug)]
pub struct ControllerSettings {
    pub encoder_error_policy: EncoderErrorPolicy,
    /// Retry a failed build once with default capture/encode settings
    pub retry_with_defaults: bool,
    pub quiesce_timeout: Duration,
    pub release_grace: Duration,
    pub poll_timeout: Duration,
    pub idle_interval: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            encoder_error_policy: EncoderErrorPolicy::default(),
            retry_with_defaults: false,
            quiesce_timeout: timing::QUIESCE_TIMEOUT,
            release_grace: timing::DEVICE_RELEASE_GRACE,
            poll_timeout: timing::EVENT_POLL_TIMEOUT,
            idle_interval: timing::IDLE_INTERVAL,
        }
    }
}

/// State shared between the controller loop and HTTP handlers
struct ControlState {
    config: StreamConfig,
    pipeline: Option<Box<dyn MediaPipeline>>,
    events: Option<Arc<dyn EventChannel>>,
    active_encoder: Option<String>,
    active_format: Option<FormatSpec>,
    lifecycle: LifecycleState,
    restart_requested: bool,
    terminate_requested: Option<ExitReason>,
}

impl ControlState {
    /// Point the live transmit stage at the configured destination
    fn sync_destination(&mut self) {
        let Some(pipeline) = self.pipeline.as_mut() else {
            debug!("No live pipeline, destination applies on next build");
            return;
        };
        for (name, value) in destination_properties(&self.config) {
            if let Err(e) = pipeline.set_property(StageKind::Transmit, name, &value) {
                warn!(error = %e, "Failed to update stream destination");
            }
        }
        info!(host = %self.config.host, port = self.config.port, "Stream destination updated");
    }
}

/// Observable controller status
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ControllerStatus {
    pub lifecycle: LifecycleState,
    pub encoder: Option<String>,
    pub format: Option<FormatSpec>,
    pub restart_pending: bool,
}

/// Cloneable handle used by the control plane
#[derive(Clone)]
pub struct ControlHandle {
    state: Arc<Mutex<ControlState>>,
    stats: Arc<StatsCollector>,
    persister: ConfigPersister,
}

impl ControlHandle {
    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply a partial update.
    ///
    /// Topology changes raise the restart signal; destination changes are
    /// applied to the live pipeline immediately. The new configuration is
    /// persisted before the lock is released, so the file always holds the
    /// latest applied update.
    pub fn apply_update(&self, update: &ConfigUpdate) -> ChangeClass {
        let mut state = self.lock();
        let class = state.config.apply(update);
        match class {
            ChangeClass::TopologyChanging => {
                state.restart_requested = true;
                info!("Pipeline restart requested");
            }
            ChangeClass::ConnectionOnly => state.sync_destination(),
            ChangeClass::None => debug!("Configuration unchanged"),
        }

        if class != ChangeClass::None {
            self.persister.persist(&state.config);
        }
        class
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> StreamConfig {
        self.lock().config.clone()
    }

    pub fn status(&self) -> ControllerStatus {
        let state = self.lock();
        ControllerStatus {
            lifecycle: state.lifecycle,
            encoder: state.active_encoder.clone(),
            format: state.active_format.clone(),
            restart_pending: state.restart_requested,
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Ask for a rebuild with the current configuration
    pub fn request_restart(&self) {
        self.lock().restart_requested = true;
    }

    /// Ask the controller loop to tear down and exit
    pub fn request_shutdown(&self) {
        self.request_termination(ExitReason::Shutdown);
    }

    fn request_termination(&self, reason: ExitReason) {
        let mut state = self.lock();
        if state.terminate_requested.is_none() {
            info!(reason = %reason, "Termination requested");
            state.terminate_requested = Some(reason);
        }
    }

    pub fn is_terminating(&self) -> bool {
        self.lock().terminate_requested.is_some()
    }
}

/// Outcome of one controller iteration
#[derive(Clone, Debug, PartialEq)]
pub enum Tick {
    /// Nothing happened within the poll interval
    Idle,
    /// An event was handled
    Event,
    /// The pipeline was rebuilt
    Rebuilt,
    /// The controller stopped; the loop must end
    Exit(ExitReason),
}

/// Drives the pipeline through its lifecycle
pub struct LifecycleController {
    handle: ControlHandle,
    builder: PipelineBuilder,
    settings: ControllerSettings,
    /// Encoders that raised runtime errors (fallback policy only)
    failed_encoders: Vec<String>,
    /// Encoder configured when `failed_encoders` was last reset
    configured_encoder: String,
}

impl LifecycleController {
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        config: StreamConfig,
        persister: ConfigPersister,
        settings: ControllerSettings,
    ) -> Self {
        let stats = Arc::new(StatsCollector::new());
        let configured_encoder = config.encoder.clone();
        let state = ControlState {
            config,
            pipeline: None,
            events: None,
            active_encoder: None,
            active_format: None,
            lifecycle: LifecycleState::Stopped,
            restart_requested: false,
            terminate_requested: None,
        };

        Self {
            handle: ControlHandle {
                state: Arc::new(Mutex::new(state)),
                stats: Arc::clone(&stats),
                persister,
            },
            builder: PipelineBuilder::new(backend, stats),
            settings,
            failed_encoders: Vec::new(),
            configured_encoder,
        }
    }

    pub fn handle(&self) -> ControlHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> LifecycleState {
        self.handle.lock().lifecycle
    }

    /// Initial build (`Stopped → Running`)
    pub fn start(&mut self) -> Result<(), BuildError> {
        let snapshot = self.handle.config();
        info!(config = %snapshot, "Starting stream");
        self.build_and_install(snapshot)
    }

    /// Run until the controller exits
    pub fn run(&mut self) -> ExitReason {
        loop {
            if let Tick::Exit(reason) = self.tick() {
                return reason;
            }
        }
    }

    /// One loop iteration: terminate check, then rebuild check, then event poll
    pub fn tick(&mut self) -> Tick {
        if let Some(reason) = self.pending_termination() {
            self.shutdown();
            return Tick::Exit(reason);
        }

        if self.restart_pending() {
            return match self.rebuild() {
                Ok(()) => Tick::Rebuilt,
                Err(e) => {
                    error!(error = %e, "Pipeline rebuild failed");
                    Tick::Exit(ExitReason::BuildFailed(e.to_string()))
                }
            };
        }

        self.poll_events()
    }

    fn pending_termination(&self) -> Option<ExitReason> {
        self.handle.lock().terminate_requested.clone()
    }

    fn restart_pending(&self) -> bool {
        self.handle.lock().restart_requested
    }

    /// `Running → Rebuilding → Running`.
    ///
    /// The restart signal is cleared before teardown so requests arriving
    /// during the rebuild trigger another one on the next tick.
    pub fn rebuild(&mut self) -> Result<(), BuildError> {
        let old = {
            let mut state = self.handle.lock();
            state.restart_requested = false;
            state.lifecycle = LifecycleState::Rebuilding;
            state.events = None;
            state.active_encoder = None;
            state.active_format = None;
            state.pipeline.take()
        };

        info!("Rebuilding pipeline");
        self.teardown(old, true);

        let snapshot = self.handle.config();
        // A newly chosen encoder gets a clean slate
        if snapshot.encoder != self.configured_encoder {
            self.failed_encoders.clear();
            self.configured_encoder = snapshot.encoder.clone();
        }
        self.build_and_install(snapshot)
    }

    /// Tear down the live pipeline and mark the controller stopped
    pub fn shutdown(&mut self) {
        let old = {
            let mut state = self.handle.lock();
            state.lifecycle = LifecycleState::Stopped;
            state.events = None;
            state.active_encoder = None;
            state.active_format = None;
            state.pipeline.take()
        };
        if old.is_some() {
            info!("Shutting down pipeline");
        }
        self.teardown(old, false);
    }

    /// Quiesce with a bounded wait, release, then optionally wait for the
    /// capture device to be released by the OS
    fn teardown(&self, pipeline: Option<Box<dyn MediaPipeline>>, grace: bool) {
        let Some(mut pipeline) = pipeline else {
            return;
        };

        if let Err(e) = pipeline.stop(self.settings.quiesce_timeout) {
            warn!(error = %e, "Pipeline did not quiesce, forcing release");
        }
        drop(pipeline);
        debug!("Pipeline released");

        if grace && !self.settings.release_grace.is_zero() {
            std::thread::sleep(self.settings.release_grace);
        }
    }

    fn build_and_install(&mut self, snapshot: StreamConfig) -> Result<(), BuildError> {
        let err = match self.builder.build(&snapshot, &self.failed_encoders) {
            Ok(built) => {
                self.install(built, &snapshot);
                return Ok(());
            }
            Err(e) => e,
        };

        let defaults = snapshot.with_default_capture();
        if !self.settings.retry_with_defaults || defaults == snapshot {
            self.handle.lock().lifecycle = LifecycleState::Stopped;
            return Err(err);
        }

        warn!(error = %err, "Build failed, retrying once with default capture settings");
        if !self.settings.release_grace.is_zero() {
            std::thread::sleep(self.settings.release_grace);
        }

        match self.builder.build(&defaults, &self.failed_encoders) {
            Ok(built) => {
                {
                    let mut state = self.handle.lock();
                    state.config.adopt_capture(&defaults);
                    self.handle.persister.persist(&state.config);
                }
                self.install(built, &defaults);
                Ok(())
            }
            Err(retry_err) => {
                self.handle.lock().lifecycle = LifecycleState::Stopped;
                warn!(error = %retry_err, "Build with default settings failed too");
                Err(err)
            }
        }
    }

    fn install(&self, built: BuiltPipeline, built_from: &StreamConfig) {
        let BuiltPipeline {
            pipeline,
            events,
            encoder,
            format,
        } = built;

        let mut state = self.handle.lock();
        state.pipeline = Some(pipeline);
        state.events = events;
        state.active_encoder = Some(encoder);
        state.active_format = Some(format);
        state.lifecycle = LifecycleState::Running;

        // Destination changes made while building only reached the config
        if state.config.destination() != built_from.destination() {
            state.sync_destination();
        }
    }

    fn poll_events(&mut self) -> Tick {
        // Cloned under the lock, polled without it
        let events = self.handle.lock().events.clone();
        let Some(events) = events else {
            std::thread::sleep(self.settings.idle_interval);
            return Tick::Idle;
        };

        let Some(event) = events.poll(self.settings.poll_timeout) else {
            return Tick::Idle;
        };

        let encoder = self.handle.lock().active_encoder.clone();
        match monitor::handle_event(&event, self.settings.encoder_error_policy, encoder.as_deref()) {
            MonitorAction::Continue => {}
            MonitorAction::Terminate(reason) => self.handle.request_termination(reason),
            MonitorAction::FallbackEncoder => self.fall_back_encoder(encoder),
        }
        Tick::Event
    }

    fn fall_back_encoder(&mut self, failed: Option<String>) {
        if let Some(encoder) = failed {
            if !self.failed_encoders.contains(&encoder) {
                self.failed_encoders.push(encoder);
            }
        }

        let config = self.handle.config();
        let untried = candidates_for(StageKind::Encode, &config, &[])
            .into_iter()
            .any(|c| !self.failed_encoders.contains(&c));

        if untried {
            self.handle.request_restart();
        } else {
            error!("Every encoder candidate has failed");
            self.handle
                .request_termination(ExitReason::RuntimeError("no working encoder".to_string()));
        }
    }
}
