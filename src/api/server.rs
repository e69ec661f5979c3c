// SPDX-License-Identifier: GPL-3.0-only

//! Control plane server thread
//!
//! The server runs on a dedicated tokio runtime in its own thread so the
//! synchronous controller loop on the main thread is undisturbed.

use super::{ApiState, router};
use std::io;
use std::net::TcpListener;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::Notify;
use tracing::{error, info};

/// Serve the control plane on an already bound listener until `shutdown`
/// is notified.
///
/// Binding happens in the caller so a busy port is reported before the
/// stream starts.
pub fn spawn(
    listener: TcpListener,
    state: ApiState,
    shutdown: Arc<Notify>,
) -> io::Result<JoinHandle<()>> {
    listener.set_nonblocking(true)?;
    let addr = listener.local_addr()?;

    std::thread::Builder::new()
        .name("camera-tx-http".into())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!(error = %e, "Failed to build HTTP runtime");
                    return;
                }
            };

            rt.block_on(async move {
                let listener = match tokio::net::TcpListener::from_std(listener) {
                    Ok(listener) => listener,
                    Err(e) => {
                        error!(error = %e, "Failed to register HTTP listener");
                        return;
                    }
                };

                info!("HTTP control plane listening on http://{}", addr);

                let serve = axum::serve(listener, router(state))
                    .with_graceful_shutdown(async move { shutdown.notified().await });
                if let Err(e) = serve.await {
                    error!(error = %e, "HTTP server stopped unexpectedly");
                }
                info!("HTTP control plane stopped");
            });
        })
}
