// SPDX-License-Identifier: MPL-2.0

//! GStreamer implementation of the media backend

use super::{EventChannel, MediaBackend, MediaPipeline};
use crate::errors::{BuildError, StageError};
use crate::pipeline::{Availability, DataTap, FormatSpec, PipelineEvent, StageKind, TapPoint};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_video as gst_video;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

static PIPELINE_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Backend creating real GStreamer pipelines
///
/// `gst::init()` must have been called before use.
#[derive(Debug, Default, Clone)]
pub struct GstBackend;

impl GstBackend {
    pub fn new() -> Self {
        Self
    }
}

impl MediaBackend for GstBackend {
    fn probe(&self, implementation: &str) -> Availability {
        if gst::ElementFactory::find(implementation).is_some() {
            Availability::Available
        } else {
            Availability::Unavailable
        }
    }

    fn new_pipeline(&self) -> Result<Box<dyn MediaPipeline>, BuildError> {
        let id = PIPELINE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let name = format!("camera-tx-{}", id);
        let pipeline = gst::Pipeline::with_name(&name);
        let bus = pipeline
            .bus()
            .ok_or_else(|| BuildError::Backend("Pipeline has no bus".to_string()))?;

        debug!(pipeline = %name, "Created pipeline");

        Ok(Box::new(GstPipeline {
            events: Arc::new(GstEventChannel {
                bus,
                pipeline_name: name,
            }),
            pipeline,
            stages: Vec::new(),
            linked: false,
        }))
    }
}

struct Stage {
    kind: StageKind,
    implementation: String,
    element: gst::Element,
}

/// A GStreamer pipeline assembled stage by stage
pub struct GstPipeline {
    pipeline: gst::Pipeline,
    stages: Vec<Stage>,
    events: Arc<GstEventChannel>,
    linked: bool,
}

impl GstPipeline {
    fn element(&self, kind: StageKind) -> Result<&gst::Element, StageError> {
        self.stages
            .iter()
            .find(|s| s.kind == kind)
            .map(|s| &s.element)
            .ok_or(StageError::Missing(kind))
    }

    /// Stages present in the pipeline, in link order
    fn ordered(&self) -> Vec<&Stage> {
        StageKind::ALL
            .iter()
            .filter_map(|kind| self.stages.iter().find(|s| s.kind == *kind))
            .collect()
    }
}

impl MediaPipeline for GstPipeline {
    fn instantiate(&mut self, kind: StageKind, implementation: &str) -> Result<(), StageError> {
        let element = gst::ElementFactory::make(implementation)
            .name(kind.element_name())
            .build()
            .map_err(|e| StageError::Instantiate {
                implementation: implementation.to_string(),
                message: e.to_string(),
            })?;

        // Replace a previous attempt for the same role
        if let Some(pos) = self.stages.iter().position(|s| s.kind == kind) {
            let old = self.stages.remove(pos);
            let _ = self.pipeline.remove(&old.element);
        }

        self.pipeline
            .add(&element)
            .map_err(|e| StageError::Instantiate {
                implementation: implementation.to_string(),
                message: e.to_string(),
            })?;

        self.stages.push(Stage {
            kind,
            implementation: implementation.to_string(),
            element,
        });
        Ok(())
    }

    fn implementation(&self, kind: StageKind) -> Option<String> {
        self.stages
            .iter()
            .find(|s| s.kind == kind)
            .map(|s| s.implementation.clone())
    }

    fn set_property(&mut self, kind: StageKind, name: &str, value: &str) -> Result<(), StageError> {
        let element = self.element(kind)?;
        if !element.has_property(name) {
            return Err(StageError::Property {
                kind,
                property: name.to_string(),
                message: "no such property".to_string(),
            });
        }
        // Unparsable values are reported instead of aborting in glib
        element
            .try_set_property_from_str(name, value)
            .map_err(|e| StageError::Property {
                kind,
                property: name.to_string(),
                message: e.to_string(),
            })
    }

    fn set_format(&mut self, kind: StageKind, format: &FormatSpec) -> Result<(), StageError> {
        let element = self.element(kind)?;

        let mut builder = gst::Caps::builder("video/x-raw")
            .field("width", format.width as i32)
            .field("height", format.height as i32)
            .field("framerate", gst::Fraction::new(format.framerate as i32, 1));

        if let Some(pixel_format) = &format.pixel_format {
            let parsed = gst_video::VideoFormat::from_string(pixel_format);
            if parsed == gst_video::VideoFormat::Unknown {
                warn!(format = %pixel_format, "Ignoring unknown pixel format hint");
            } else {
                builder = builder.field("format", parsed.to_str().as_str());
            }
        }

        let caps = builder.build();
        debug!(caps = %caps, "Setting capture caps");
        element.set_property("caps", &caps);
        Ok(())
    }

    fn link(&mut self) -> Result<(), StageError> {
        let failure = self.ordered().windows(2).find_map(|pair| {
            let (from, to) = (pair[0], pair[1]);
            from.element.link(&to.element).err().map(|_| StageError::Link {
                from: from.kind,
                to: to.kind,
            })
        });

        // Partial links are undone so the next attempt starts clean
        self.linked = true;
        if let Some(err) = failure {
            warn!(error = %err, "Link failed");
            self.unlink();
            return Err(err);
        }
        Ok(())
    }

    fn unlink(&mut self) {
        if !self.linked {
            return;
        }
        let ordered = self.ordered();
        for pair in ordered.windows(2) {
            pair[0].element.unlink(&pair[1].element);
        }
        self.linked = false;
    }

    fn add_tap(&mut self, kind: StageKind, point: TapPoint, tap: DataTap) -> Result<(), StageError> {
        let element = self.element(kind)?;
        let pad_name = match point {
            TapPoint::Input => "sink",
            TapPoint::Output => "src",
        };
        let pad = element.static_pad(pad_name).ok_or_else(|| StageError::Tap {
            kind,
            message: format!("no static {} pad", pad_name),
        })?;

        pad.add_probe(
            gst::PadProbeType::BUFFER | gst::PadProbeType::BUFFER_LIST,
            move |_pad, info| {
                match &info.data {
                    Some(gst::PadProbeData::Buffer(buffer)) => tap(buffer.size()),
                    Some(gst::PadProbeData::BufferList(list)) => {
                        for buffer in list.iter() {
                            tap(buffer.size());
                        }
                    }
                    _ => {}
                }
                gst::PadProbeReturn::Ok
            },
        )
        .ok_or_else(|| StageError::Tap {
            kind,
            message: "probe rejected".to_string(),
        })?;

        Ok(())
    }

    fn start(&mut self) -> Result<(), StageError> {
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| StageError::State(format!("Failed to start pipeline: {}", e)))?;
        info!(pipeline = %self.events.pipeline_name, "Pipeline set to PLAYING");
        Ok(())
    }

    fn stop(&mut self, timeout: Duration) -> Result<(), StageError> {
        self.pipeline
            .set_state(gst::State::Null)
            .map_err(|e| StageError::State(format!("Failed to stop pipeline: {}", e)))?;

        let (result, state, _) = self
            .pipeline
            .state(gst::ClockTime::from_mseconds(timeout.as_millis() as u64));
        match result {
            Ok(_) if state == gst::State::Null => {
                debug!(pipeline = %self.events.pipeline_name, "Pipeline reached NULL");
                Ok(())
            }
            _ => Err(StageError::Timeout(format!(
                "pipeline still in {:?} after {:?}",
                state, timeout
            ))),
        }
    }

    fn events(&self) -> Option<Arc<dyn EventChannel>> {
        Some(self.events.clone())
    }
}

impl Drop for GstPipeline {
    fn drop(&mut self) {
        // Releases the capture device even if stop() was never called
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

/// Bus of one pipeline
pub struct GstEventChannel {
    bus: gst::Bus,
    pipeline_name: String,
}

impl EventChannel for GstEventChannel {
    fn poll(&self, timeout: Duration) -> Option<PipelineEvent> {
        let msg = self
            .bus
            .timed_pop(gst::ClockTime::from_mseconds(timeout.as_millis() as u64))?;
        let source = msg
            .src()
            .map(|s| s.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let event = match msg.view() {
            gst::MessageView::Error(err) => PipelineEvent::Error {
                source,
                message: err.error().to_string(),
                debug: err.debug().map(|d| d.to_string()),
            },
            gst::MessageView::Warning(w) => PipelineEvent::Warning {
                source,
                message: w.error().to_string(),
                debug: w.debug().map(|d| d.to_string()),
            },
            gst::MessageView::Info(i) => PipelineEvent::Info {
                source,
                message: i.error().to_string(),
            },
            gst::MessageView::Eos(_) => PipelineEvent::EndOfStream,
            gst::MessageView::StateChanged(s) => PipelineEvent::StateChanged {
                is_pipeline: source == self.pipeline_name,
                source,
                old: format!("{:?}", s.old()),
                new: format!("{:?}", s.current()),
            },
            _ => return None,
        };
        Some(event)
    }
}
