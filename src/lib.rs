//! Gesture Capture - mouse-gesture triggered photos and recordings.
//!
//! This is the main library crate. It wires configuration, capture devices,
//! storage and the muxer into a [`monitor::Monitor`] fed from stdin.

pub mod capture;
pub mod config;
pub mod export;
pub mod gesture;
pub mod input;
pub mod monitor;
pub mod recorder;
pub mod storage;
pub mod utils;

use anyhow::Context;
use capture::CaptureBackend;
use config::AppConfig;
use export::FfmpegMuxer;
use gesture::{GestureRecognizer, GestureTiming};
use input::LineInput;
use monitor::Monitor;
use recorder::{PhotoCapturer, SessionManager};
use std::path::PathBuf;
use std::sync::Arc;
use storage::MountedRoots;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "devices")]
fn build_backend(config: &AppConfig) -> Arc<dyn CaptureBackend> {
    Arc::new(capture::NativeBackend::new(config.clone()))
}

#[cfg(not(feature = "devices"))]
fn build_backend(config: &AppConfig) -> Arc<dyn CaptureBackend> {
    Arc::new(capture::FfmpegBackend::new(config.clone()))
}

/// Run the application until stdin closes
pub fn run() -> anyhow::Result<()> {
    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gesture_capture=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Gesture Capture v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::discover(std::env::args_os().nth(1).map(PathBuf::from))
        .context("failed to load configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("gesture-capture")
        .build()
        .context("failed to start async runtime")?;

    let muxer = FfmpegMuxer::new(config.ffmpeg_path.clone());
    if !runtime.block_on(muxer.is_available()) {
        tracing::warn!(
            "{} not found, recordings will be saved without audio",
            config.ffmpeg_path
        );
    }

    if config.output_roots.is_empty() {
        tracing::warn!("No output roots configured, captures will fail until one is set");
    }

    let backend = build_backend(&config);
    let locator = Arc::new(MountedRoots::new(config.output_roots.clone()));
    let photo = Arc::new(PhotoCapturer::new(
        backend.clone(),
        locator.clone(),
        config.camera_indices.clone(),
        config.photo_warmup(),
    ));
    let recognizer = GestureRecognizer::new(GestureTiming {
        photo_cooldown: config.photo_cooldown(),
        click_timeout: config.click_timeout(),
    });
    let sessions = Arc::new(SessionManager::new(
        config,
        backend,
        locator,
        Arc::new(muxer),
        runtime.handle().clone(),
    ));

    let mut monitor = Monitor::new(recognizer, photo, sessions, runtime.handle().clone());
    let stdin = std::io::stdin();
    let mut input = LineInput::new(stdin.lock());
    let result = monitor.run(&mut input);
    monitor.shutdown();

    result.context("failed reading input events")?;
    tracing::info!("Gesture Capture stopped");
    Ok(())
}
