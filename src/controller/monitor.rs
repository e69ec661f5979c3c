// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline event monitor
//!
//! Maps events from the running pipeline to controller actions. Everything is
//! logged; only errors and end-of-stream stop the stream.

use super::{EncoderErrorPolicy, ExitReason};
use crate::pipeline::{PipelineEvent, StageKind};
use tracing::{debug, error, info, warn};

/// What the controller should do after an event
#[derive(Clone, Debug, PartialEq)]
pub enum MonitorAction {
    Continue,
    Terminate(ExitReason),
    /// Rebuild with the next encoder candidate
    FallbackEncoder,
}

fn is_encoder(source: &str) -> bool {
    source == StageKind::Encode.element_name()
}

/// Log `event` and decide the follow-up action
pub fn handle_event(
    event: &PipelineEvent,
    policy: EncoderErrorPolicy,
    encoder: Option<&str>,
) -> MonitorAction {
    match event {
        PipelineEvent::Error {
            source,
            message,
            debug: details,
        } => {
            error!(source = %source, debug = ?details, "Pipeline error: {}", message);

            if !is_encoder(source) {
                return MonitorAction::Terminate(ExitReason::RuntimeError(message.clone()));
            }

            let encoder = encoder.unwrap_or("unknown");
            match policy {
                EncoderErrorPolicy::Terminate => {
                    error!(
                        encoder = %encoder,
                        "Encoder error detected. Consider using a different encoder via the /config API \
                         (e.g. {{\"encoder\": \"x264enc\"}})"
                    );
                    MonitorAction::Terminate(ExitReason::RuntimeError(message.clone()))
                }
                EncoderErrorPolicy::Fallback => {
                    warn!(encoder = %encoder, "Encoder error detected, falling back to next encoder");
                    MonitorAction::FallbackEncoder
                }
            }
        }
        PipelineEvent::EndOfStream => {
            info!("End of stream");
            MonitorAction::Terminate(ExitReason::EndOfStream)
        }
        PipelineEvent::Warning {
            source,
            message,
            debug: details,
        } => {
            warn!(source = %source, debug = ?details, "Pipeline warning: {}", message);
            MonitorAction::Continue
        }
        PipelineEvent::Info { source, message } => {
            info!(source = %source, "Pipeline info: {}", message);
            MonitorAction::Continue
        }
        PipelineEvent::StateChanged {
            source,
            is_pipeline,
            old,
            new,
        } => {
            if *is_pipeline {
                info!(old = %old, new = %new, "Pipeline state changed");
            } else {
                debug!(source = %source, old = %old, new = %new, "Element state changed");
            }
            MonitorAction::Continue
        }
    }
}
