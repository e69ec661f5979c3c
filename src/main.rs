// SPDX-License-Identifier: GPL-3.0-only

use camera_tx::EncoderErrorPolicy;
use camera_tx::constants;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-tx")]
#[command(about = "Stream a live camera as H.264 over RTP/UDP with an HTTP control plane")]
#[command(version = env!("GIT_VERSION"))]
#[command(subcommand_required = false)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Address the HTTP control plane binds to
    #[arg(long, default_value = "0.0.0.0")]
    http_bind: String,

    /// HTTP control plane port
    #[arg(long, default_value_t = constants::DEFAULT_HTTP_PORT)]
    http_port: u16,

    /// Config file path (default: $CAMERA_TX_CONFIG_PATH or ~/.config/camera-tx/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Do not write configuration changes to disk
    #[arg(long)]
    no_persist: bool,

    /// Reaction to encoder runtime errors
    #[arg(long, value_enum, default_value_t = EncoderErrorPolicy::Terminate)]
    encoder_error_policy: EncoderErrorPolicy,

    /// Retry a failed pipeline build once with default capture settings
    #[arg(long)]
    retry_defaults: bool,

    /// Log filter used when RUST_LOG is not set (e.g. "debug", "camera_tx=trace")
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List cameras and encoders, or the resolutions of one camera
    List {
        /// Camera to probe for resolutions
        #[arg(short, long)]
        device: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    // RUST_LOG takes precedence over --log-level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_tx=debug,gstreamer=warn
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_target(true)
        .with_level(true)
        .init();

    match cli.command {
        Some(Commands::List { device }) => cli::list_capabilities(device)?,
        None => cli::run_stream(cli::StreamOptions {
            http_bind: cli.http_bind,
            http_port: cli.http_port,
            config_path: cli.config,
            persist: !cli.no_persist,
            encoder_error_policy: cli.encoder_error_policy,
            retry_with_defaults: cli.retry_defaults,
        })?,
    }

    Ok(())
}
