//! Application lifecycle
//!
//! Binds the HTTP listener, runs the capture loop as its own task and serves
//! the router until shutdown. On shutdown the broadcaster is closed first,
//! ending every open stream so graceful HTTP shutdown can complete; once the
//! server has drained, the capture loop is stopped, releasing the device.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::broadcast::Broadcaster;
use crate::capture::{CaptureLoop, CaptureStats};
use crate::config::Config;
use crate::error::Result;
use crate::source::{FrameSource, Source};

use super::routes::{router, AppState};

/// Bound but not yet running application
pub struct App {
    config: Arc<Config>,
    source: Source,
    listener: TcpListener,
}

impl App {
    /// Select the frame source and bind the listener
    ///
    /// Port 0 binds an ephemeral port; see [`local_addr`](Self::local_addr).
    pub async fn bind(config: Config) -> Result<Self> {
        let source = Source::select(&config);
        let listener = TcpListener::bind(config.listen_socket_addr()).await?;

        Ok(Self {
            config: Arc::new(config),
            source,
            listener,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Startup configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run capture and HTTP serving until `shutdown` resolves
    ///
    /// Returns the capture loop's totals.
    pub async fn run_until<F>(self, shutdown: F) -> Result<CaptureStats>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Self {
            config,
            source,
            listener,
        } = self;
        let addr = listener.local_addr()?;

        let broadcaster = Broadcaster::new(config.stream_buffer);
        let source_kind = source.kind();
        let (capture, health) = CaptureLoop::new(source, broadcaster.clone(), &config);

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let capture_task = tokio::spawn(capture.run_until(async move {
            let _ = stop_rx.await;
        }));

        let app = router(AppState::new(
            Arc::clone(&config),
            broadcaster.clone(),
            health,
        ));

        tracing::info!(
            addr = %addr,
            source = %source_kind,
            fps = config.frame_rate,
            width = config.resolution_width,
            height = config.resolution_height,
            "MJPEG server listening"
        );

        let closing = broadcaster.clone();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("Shutdown signal received");
                // Stream bodies never finish on their own
                closing.close();
            })
            .await;

        // Stop capture even when serving failed
        let _ = stop_tx.send(());
        let stats = match capture_task.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(error = %e, "Capture task failed");
                CaptureStats::default()
            }
        };
        broadcaster.close();

        served?;

        tracing::info!(
            frames = stats.frames_published,
            failures = stats.failures,
            "Server stopped"
        );

        Ok(stats)
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("config", &self.config)
            .field("source", &self.source.kind())
            .field("listener", &self.listener.local_addr().ok())
            .finish()
    }
}
