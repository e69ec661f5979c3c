// SPDX-License-Identifier: GPL-3.0-only

//! Stage factory
//!
//! Resolves one stage from an ordered list of candidate implementations:
//! the registry is consulted first, then the candidate is instantiated for
//! real, and the first success gets its property table applied.

use super::properties::properties_for;
use super::{Availability, StageKind};
use crate::backends::{MediaBackend, MediaPipeline};
use crate::config::StreamConfig;
use crate::constants::encoding;
use crate::errors::StageError;
use tracing::{debug, info, warn};

/// Result of a successful stage resolution
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectedStage {
    pub kind: StageKind,
    pub implementation: String,
}

/// Creates stages on a pipeline using a backend's registry
pub struct StageFactory<'a> {
    backend: &'a dyn MediaBackend,
}

impl<'a> StageFactory<'a> {
    pub fn new(backend: &'a dyn MediaBackend) -> Self {
        Self { backend }
    }

    /// Instantiate the first working candidate for `kind` on `pipeline`.
    ///
    /// Duplicate candidates are attempted once. Property failures are
    /// logged and do not disqualify a candidate.
    pub fn create(
        &self,
        kind: StageKind,
        candidates: &[String],
        config: &StreamConfig,
        pipeline: &mut dyn MediaPipeline,
    ) -> Result<SelectedStage, StageError> {
        let mut tried: Vec<String> = Vec::new();

        for candidate in candidates {
            if tried.iter().any(|t| t == candidate) {
                continue;
            }
            tried.push(candidate.clone());

            if self.backend.probe(candidate) == Availability::Unavailable {
                debug!(stage = %kind, implementation = %candidate, "Not in registry, skipping");
                continue;
            }

            if let Err(e) = pipeline.instantiate(kind, candidate) {
                warn!(stage = %kind, error = %e, "Candidate failed to instantiate");
                continue;
            }

            for (name, value) in properties_for(kind, candidate, config) {
                if let Err(e) = pipeline.set_property(kind, name, &value) {
                    warn!(stage = %kind, error = %e, "Failed to apply property");
                }
            }

            info!(stage = %kind, implementation = %candidate, "Stage created");
            return Ok(SelectedStage {
                kind,
                implementation: candidate.clone(),
            });
        }

        Err(StageError::NoCandidate { kind, tried })
    }
}

/// Ordered candidate implementations for a stage.
///
/// Encoders named in `excluded` are dropped from the encode list unless that
/// would leave it empty.
pub fn candidates_for(kind: StageKind, config: &StreamConfig, excluded: &[String]) -> Vec<String> {
    match kind {
        StageKind::Capture => vec![config.source.implementation().to_string()],
        StageKind::FormatConstrain | StageKind::StreamFormat => vec!["capsfilter".to_string()],
        StageKind::Convert => vec!["videoconvert".to_string()],
        StageKind::Encode => {
            let all: Vec<String> = std::iter::once(config.encoder.as_str())
                .chain(encoding::ENCODER_FALLBACKS.iter().copied())
                .map(str::to_string)
                .collect();
            let remaining: Vec<String> = all
                .iter()
                .filter(|c| !excluded.contains(c))
                .cloned()
                .collect();
            if remaining.is_empty() { all } else { remaining }
        }
        StageKind::Parse => vec!["h264parse".to_string()],
        StageKind::Packetize => vec!["rtph264pay".to_string()],
        StageKind::Transmit => vec!["udpsink".to_string()],
    }
}
