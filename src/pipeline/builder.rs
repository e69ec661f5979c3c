// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline builder
//!
//! Assembles the full stage chain through the [`StageFactory`], negotiates
//! the capture format (with a single fallback attempt), wires the statistics
//! taps and starts the pipeline. Any failure drops the partially built
//! pipeline, which releases every stage created so far.

use super::factory::{StageFactory, candidates_for};
use super::{FormatSpec, StageKind, TapPoint};
use crate::backends::{EventChannel, MediaBackend, MediaPipeline};
use crate::config::StreamConfig;
use crate::constants::timing;
use crate::errors::BuildError;
use crate::stats::StatsCollector;
use std::sync::Arc;
use tracing::{info, warn};

/// A started pipeline and what was chosen for it
pub struct BuiltPipeline {
    pub pipeline: Box<dyn MediaPipeline>,
    pub events: Option<Arc<dyn EventChannel>>,
    /// Encoder implementation that was selected
    pub encoder: String,
    /// Capture format the pipeline actually linked with
    pub format: FormatSpec,
}

impl std::fmt::Debug for BuiltPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltPipeline")
            .field("encoder", &self.encoder)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// Builds streaming pipelines against a media backend
#[derive(Clone)]
pub struct PipelineBuilder {
    backend: Arc<dyn MediaBackend>,
    stats: Arc<StatsCollector>,
}

impl PipelineBuilder {
    pub fn new(backend: Arc<dyn MediaBackend>, stats: Arc<StatsCollector>) -> Self {
        Self { backend, stats }
    }

    /// Build and start a pipeline for `config`.
    ///
    /// Encoders listed in `excluded_encoders` are skipped when possible.
    pub fn build(
        &self,
        config: &StreamConfig,
        excluded_encoders: &[String],
    ) -> Result<BuiltPipeline, BuildError> {
        info!(config = %config, "Building pipeline");

        let mut pipeline = self.backend.new_pipeline()?;
        let factory = StageFactory::new(self.backend.as_ref());

        let mut encoder = String::new();
        for kind in StageKind::ALL {
            let candidates = candidates_for(kind, config, excluded_encoders);
            let selected = factory.create(kind, &candidates, config, pipeline.as_mut())?;
            if kind == StageKind::Encode {
                encoder = selected.implementation;
            }
        }

        let capture = pipeline
            .implementation(StageKind::Capture)
            .unwrap_or_default();
        let preferred =
            FormatSpec::for_capture(&capture, config.width, config.height, config.framerate);
        let format = negotiate_format(pipeline.as_mut(), preferred)?;

        let stats = Arc::clone(&self.stats);
        pipeline.add_tap(
            StageKind::Transmit,
            TapPoint::Input,
            Arc::new(move |size| stats.record_transmit(size)),
        )?;

        // Capture timing is informational; streaming works without it
        let stats = Arc::clone(&self.stats);
        if let Err(e) = pipeline.add_tap(
            StageKind::Capture,
            TapPoint::Output,
            Arc::new(move |_| stats.record_capture()),
        ) {
            warn!(error = %e, "Capture tap unavailable, framerate will not be measured");
        }

        self.stats.reset(format.framerate);

        if let Err(e) = pipeline.start() {
            if let Err(stop_err) = pipeline.stop(timing::QUIESCE_TIMEOUT) {
                warn!(error = %stop_err, "Failed to stop pipeline after start failure");
            }
            return Err(BuildError::Start(e));
        }

        info!(encoder = %encoder, format = %format, "Pipeline started");

        let events = pipeline.events();
        Ok(BuiltPipeline {
            pipeline,
            events,
            encoder,
            format,
        })
    }
}

/// Constrain the capture format and link, retrying once with the fallback
/// format when the device rejects the preferred one
fn negotiate_format(
    pipeline: &mut dyn MediaPipeline,
    preferred: FormatSpec,
) -> Result<FormatSpec, BuildError> {
    pipeline.set_format(StageKind::FormatConstrain, &preferred)?;

    let err = match pipeline.link() {
        Ok(()) => return Ok(preferred),
        Err(e) => e,
    };

    let fallback = FormatSpec::fallback();
    if preferred == fallback {
        return Err(BuildError::Link(err));
    }

    warn!(
        error = %err,
        requested = %preferred,
        fallback = %fallback,
        "Linking failed, retrying with fallback format"
    );
    pipeline.unlink();
    pipeline.set_format(StageKind::FormatConstrain, &fallback)?;
    pipeline.link().map_err(BuildError::Link)?;

    Ok(fallback)
}
