// SPDX-License-Identifier: GPL-3.0-only

//! In-memory media backend shared by the integration tests
#![allow(dead_code)]

use camera_tx::backends::{EventChannel, MediaBackend, MediaPipeline};
use camera_tx::controller::ControllerSettings;
use camera_tx::errors::{BuildError, StageError};
use camera_tx::pipeline::{Availability, DataTap, FormatSpec, PipelineEvent, StageKind, TapPoint};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Knobs controlling how the fake backend misbehaves
#[derive(Default)]
pub struct FakeSettings {
    /// Implementations the registry does not know
    pub unavailable: Mutex<HashSet<String>>,
    /// Implementations that fail to instantiate
    pub broken: Mutex<HashSet<String>>,
    /// Property names the fake refuses
    pub rejected_properties: Mutex<HashSet<String>>,
    /// Widest capture format that links
    pub max_link_width: Mutex<Option<u32>>,
    pub fail_start: AtomicBool,
    pub fail_stop: AtomicBool,
}

/// Everything one fake pipeline went through
#[derive(Default)]
pub struct FakeRecord {
    /// Implementations handed to instantiate, in order
    pub attempts: Vec<String>,
    pub stages: Vec<(StageKind, String)>,
    pub properties: Vec<(StageKind, String, String)>,
    pub formats: Vec<FormatSpec>,
    pub taps: Vec<(StageKind, TapPoint, DataTap)>,
    pub linked: bool,
    pub started: bool,
    pub stopped: bool,
    pub dropped: bool,
}

#[derive(Default)]
pub struct FakeEvents {
    queue: Mutex<VecDeque<PipelineEvent>>,
}

impl EventChannel for FakeEvents {
    fn poll(&self, _timeout: Duration) -> Option<PipelineEvent> {
        self.queue.lock().unwrap().pop_front()
    }
}

/// Test-side view of one pipeline created by the fake backend
#[derive(Clone)]
pub struct FakeHandle {
    pub record: Arc<Mutex<FakeRecord>>,
    pub events: Arc<FakeEvents>,
}

impl FakeHandle {
    pub fn implementation(&self, kind: StageKind) -> Option<String> {
        self.record
            .lock()
            .unwrap()
            .stages
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, i)| i.clone())
    }

    /// Latest value set for a property
    pub fn property(&self, kind: StageKind, name: &str) -> Option<String> {
        self.record
            .lock()
            .unwrap()
            .properties
            .iter()
            .rev()
            .find(|(k, n, _)| *k == kind && n == name)
            .map(|(_, _, v)| v.clone())
    }

    pub fn format(&self) -> Option<FormatSpec> {
        self.record.lock().unwrap().formats.last().cloned()
    }

    pub fn attempts(&self) -> Vec<String> {
        self.record.lock().unwrap().attempts.clone()
    }

    pub fn is_started(&self) -> bool {
        self.record.lock().unwrap().started
    }

    pub fn is_stopped(&self) -> bool {
        self.record.lock().unwrap().stopped
    }

    pub fn is_dropped(&self) -> bool {
        self.record.lock().unwrap().dropped
    }

    pub fn push_event(&self, event: PipelineEvent) {
        self.events.queue.lock().unwrap().push_back(event);
    }

    /// Push `count` data units of `size` bytes through a tap
    pub fn emit(&self, kind: StageKind, point: TapPoint, size: usize, count: usize) {
        let taps: Vec<DataTap> = self
            .record
            .lock()
            .unwrap()
            .taps
            .iter()
            .filter(|(k, p, _)| *k == kind && *p == point)
            .map(|(_, _, t)| Arc::clone(t))
            .collect();
        for _ in 0..count {
            for tap in &taps {
                tap(size);
            }
        }
    }

    /// Simulate streaming: captures at the source and packets at the sink
    pub fn stream(&self, frames: usize, packet_size: usize) {
        self.emit(StageKind::Capture, TapPoint::Output, packet_size, frames);
        self.emit(StageKind::Transmit, TapPoint::Input, packet_size, frames);
    }
}

pub struct FakePipeline {
    handle: FakeHandle,
    settings: Arc<FakeSettings>,
}

impl FakePipeline {
    fn has_stage(&self, kind: StageKind) -> bool {
        self.handle
            .record
            .lock()
            .unwrap()
            .stages
            .iter()
            .any(|(k, _)| *k == kind)
    }
}

impl MediaPipeline for FakePipeline {
    fn instantiate(&mut self, kind: StageKind, implementation: &str) -> Result<(), StageError> {
        let mut record = self.handle.record.lock().unwrap();
        record.attempts.push(implementation.to_string());
        if self.settings.broken.lock().unwrap().contains(implementation) {
            return Err(StageError::Instantiate {
                implementation: implementation.to_string(),
                message: "no such device".to_string(),
            });
        }
        record.stages.retain(|(k, _)| *k != kind);
        record.stages.push((kind, implementation.to_string()));
        Ok(())
    }

    fn implementation(&self, kind: StageKind) -> Option<String> {
        self.handle.implementation(kind)
    }

    fn set_property(&mut self, kind: StageKind, name: &str, value: &str) -> Result<(), StageError> {
        if !self.has_stage(kind) {
            return Err(StageError::Missing(kind));
        }
        if self.settings.rejected_properties.lock().unwrap().contains(name) {
            return Err(StageError::Property {
                kind,
                property: name.to_string(),
                message: "rejected".to_string(),
            });
        }
        self.handle
            .record
            .lock()
            .unwrap()
            .properties
            .push((kind, name.to_string(), value.to_string()));
        Ok(())
    }

    fn set_format(&mut self, kind: StageKind, format: &FormatSpec) -> Result<(), StageError> {
        if !self.has_stage(kind) {
            return Err(StageError::Missing(kind));
        }
        self.handle.record.lock().unwrap().formats.push(format.clone());
        Ok(())
    }

    fn link(&mut self) -> Result<(), StageError> {
        let mut record = self.handle.record.lock().unwrap();
        for pair in StageKind::ALL.windows(2) {
            let present = |kind: StageKind| record.stages.iter().any(|(k, _)| *k == kind);
            if !present(pair[0]) || !present(pair[1]) {
                return Err(StageError::Link {
                    from: pair[0],
                    to: pair[1],
                });
            }
        }
        let width = record.formats.last().map(|f| f.width).unwrap_or(0);
        if let Some(max) = *self.settings.max_link_width.lock().unwrap() {
            if width > max {
                return Err(StageError::Link {
                    from: StageKind::FormatConstrain,
                    to: StageKind::Convert,
                });
            }
        }
        record.linked = true;
        Ok(())
    }

    fn unlink(&mut self) {
        self.handle.record.lock().unwrap().linked = false;
    }

    fn add_tap(&mut self, kind: StageKind, point: TapPoint, tap: DataTap) -> Result<(), StageError> {
        if !self.has_stage(kind) {
            return Err(StageError::Missing(kind));
        }
        self.handle.record.lock().unwrap().taps.push((kind, point, tap));
        Ok(())
    }

    fn start(&mut self) -> Result<(), StageError> {
        if self.settings.fail_start.load(Ordering::SeqCst) {
            return Err(StageError::State("refused".to_string()));
        }
        self.handle.record.lock().unwrap().started = true;
        Ok(())
    }

    fn stop(&mut self, timeout: Duration) -> Result<(), StageError> {
        let mut record = self.handle.record.lock().unwrap();
        record.started = false;
        record.stopped = true;
        if self.settings.fail_stop.load(Ordering::SeqCst) {
            return Err(StageError::Timeout(format!("{:?}", timeout)));
        }
        Ok(())
    }

    fn events(&self) -> Option<Arc<dyn EventChannel>> {
        Some(self.handle.events.clone())
    }
}

impl Drop for FakePipeline {
    fn drop(&mut self) {
        if let Ok(mut record) = self.handle.record.lock() {
            record.dropped = true;
        }
    }
}

/// Backend whose pipelines only record what happens to them
#[derive(Default)]
pub struct FakeBackend {
    pub settings: Arc<FakeSettings>,
    pipelines: Mutex<Vec<FakeHandle>>,
    /// Runs once, when the next pipeline is created
    build_hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn mark_unavailable(&self, implementation: &str) {
        self.settings
            .unavailable
            .lock()
            .unwrap()
            .insert(implementation.to_string());
    }

    pub fn mark_broken(&self, implementation: &str) {
        self.settings
            .broken
            .lock()
            .unwrap()
            .insert(implementation.to_string());
    }

    pub fn repair(&self, implementation: &str) {
        self.settings.broken.lock().unwrap().remove(implementation);
    }

    pub fn reject_property(&self, name: &str) {
        self.settings
            .rejected_properties
            .lock()
            .unwrap()
            .insert(name.to_string());
    }

    /// Run `hook` in the middle of the next build
    pub fn on_next_build(&self, hook: impl FnOnce() + Send + 'static) {
        *self.build_hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn limit_link_width(&self, width: u32) {
        *self.settings.max_link_width.lock().unwrap() = Some(width);
    }

    pub fn pipelines(&self) -> Vec<FakeHandle> {
        self.pipelines.lock().unwrap().clone()
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.lock().unwrap().len()
    }

    /// Most recently created pipeline
    pub fn latest(&self) -> FakeHandle {
        self.pipelines
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no pipeline created yet")
    }

    /// A fresh pipeline not registered with the backend history
    pub fn detached_pipeline(&self) -> (FakePipeline, FakeHandle) {
        let handle = FakeHandle {
            record: Arc::new(Mutex::new(FakeRecord::default())),
            events: Arc::new(FakeEvents::default()),
        };
        (
            FakePipeline {
                handle: handle.clone(),
                settings: Arc::clone(&self.settings),
            },
            handle,
        )
    }
}

impl MediaBackend for FakeBackend {
    fn probe(&self, implementation: &str) -> Availability {
        if self.settings.unavailable.lock().unwrap().contains(implementation) {
            Availability::Unavailable
        } else {
            Availability::Available
        }
    }

    fn new_pipeline(&self) -> Result<Box<dyn MediaPipeline>, BuildError> {
        let hook = self.build_hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        let (pipeline, handle) = self.detached_pipeline();
        self.pipelines.lock().unwrap().push(handle);
        Ok(Box::new(pipeline))
    }
}

/// Controller settings without real-time waits
pub fn fast_settings() -> ControllerSettings {
    ControllerSettings {
        release_grace: Duration::ZERO,
        poll_timeout: Duration::ZERO,
        idle_interval: Duration::from_millis(1),
        ..ControllerSettings::default()
    }
}
