// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! - Running the stream with its HTTP control plane
//! - Listing cameras, encoders and resolutions

use camera_tx::api::{self, ApiState};
use camera_tx::backends::gstreamer::GstBackend;
use camera_tx::capabilities::{CapabilityProvider, GstCapabilities};
use camera_tx::controller::{ControllerSettings, EncoderErrorPolicy, LifecycleController};
use camera_tx::errors::{AppError, AppResult};
use camera_tx::storage::{self, ConfigPersister};
use camera_tx::{StreamConfig, constants};
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// Options for the streaming command
pub struct StreamOptions {
    pub http_bind: String,
    pub http_port: u16,
    pub config_path: Option<PathBuf>,
    pub persist: bool,
    pub encoder_error_policy: EncoderErrorPolicy,
    pub retry_with_defaults: bool,
}

fn init_gstreamer() -> AppResult<()> {
    gstreamer::init().map_err(|e| AppError::Other(format!("Failed to initialize GStreamer: {}", e)))
}

/// Load the configuration, honouring `--no-persist`
fn load_configuration(options: &StreamOptions) -> (StreamConfig, ConfigPersister) {
    let path = options
        .config_path
        .clone()
        .unwrap_or_else(storage::resolve_config_path);

    if options.persist {
        let config = storage::load_or_init(&path);
        (config, ConfigPersister::new(path))
    } else {
        let config = storage::load_config(&path).unwrap_or_else(|e| {
            info!(path = %path.display(), error = %e, "No usable config file, using defaults");
            StreamConfig::default()
        });
        (config, ConfigPersister::disabled())
    }
}

fn log_endpoints(port: u16) {
    info!("Available endpoints:");
    info!("  GET  http://localhost:{}/health", port);
    info!("  GET  http://localhost:{}/stats", port);
    info!("  GET  http://localhost:{}/config", port);
    info!("  POST http://localhost:{}/config", port);
    info!("  GET  http://localhost:{}/get", port);
    info!("  GET  http://localhost:{}/get/<camera>", port);
}

/// Stream until shutdown, end of stream or a fatal error
pub fn run_stream(options: StreamOptions) -> AppResult<()> {
    init_gstreamer()?;

    let (config, persister) = load_configuration(&options);

    // Bind before streaming so a busy port fails fast
    let listener = TcpListener::bind((options.http_bind.as_str(), options.http_port)).map_err(|e| {
        AppError::Http(format!(
            "Failed to bind {}:{}: {}",
            options.http_bind, options.http_port, e
        ))
    })?;

    let settings = ControllerSettings {
        encoder_error_policy: options.encoder_error_policy,
        retry_with_defaults: options.retry_with_defaults,
        ..ControllerSettings::default()
    };
    let mut controller =
        LifecycleController::new(Arc::new(GstBackend::new()), config, persister, settings);

    // SIGINT/SIGTERM during the initial build is honoured on the first tick
    let signal_handle = controller.handle();
    ctrlc::set_handler(move || signal_handle.request_shutdown())
        .map_err(|e| AppError::Other(format!("Failed to install signal handler: {}", e)))?;

    if let Err(e) = controller.start() {
        error!(error = %e, "Failed to start stream");
        error!(
            "Try another encoder, e.g. set \"encoder\": \"x264enc\" in the config file, \
             or start with --retry-defaults"
        );
        return Err(e.into());
    }

    let handle = controller.handle();

    let shutdown = Arc::new(Notify::new());
    let state = ApiState::new(handle, Arc::new(GstCapabilities));
    let server = api::spawn(listener, state, Arc::clone(&shutdown))
        .map_err(|e| AppError::Http(e.to_string()))?;

    log_endpoints(options.http_port);

    let reason = controller.run();
    info!(reason = %reason, "Stream stopped");

    shutdown.notify_one();
    if server.join().is_err() {
        warn!("HTTP server thread panicked");
    }

    if reason.is_failure() {
        Err(AppError::Other(reason.to_string()))
    } else {
        Ok(())
    }
}

/// Print cameras and encoders, or the resolutions of one camera
pub fn list_capabilities(device: Option<String>) -> AppResult<()> {
    init_gstreamer()?;
    let provider = GstCapabilities;

    match device {
        Some(device) => {
            println!("Resolutions for {}:", device);
            for mode in provider.resolutions(&device) {
                match &mode.description {
                    Some(desc) => println!(
                        "  {}x{}@{}fps ({})",
                        mode.width, mode.height, mode.max_framerate, desc
                    ),
                    None => println!("  {}x{}@{}fps", mode.width, mode.height, mode.max_framerate),
                }
            }
        }
        None => {
            println!("Cameras:");
            for camera in provider.cameras() {
                println!("  {}", camera);
            }
            println!();
            println!("Encoders:");
            for encoder in provider.encoders() {
                let marker = if encoder == constants::DEFAULT_ENCODER {
                    " (default)"
                } else {
                    ""
                };
                println!("  {}{}", encoder, marker);
            }
        }
    }

    Ok(())
}
