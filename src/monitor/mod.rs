//! Event loop wiring input, recognizer and capture
//!
//! The listener thread only runs recognizer logic. Photo grabs and session
//! start/stop are pushed onto the tokio runtime so a slow camera never
//! delays the next input event.

use crate::gesture::{Activity, GestureRecognizer, InputEvent, Trigger};
use crate::input::InputSource;
use crate::recorder::{PhotoCapturer, SessionManager, SessionState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

pub const INSTRUCTIONS: &str = "\
Gesture capture ready.
  Photo:            hold left and right buttons together
  Start/stop video: click left twice and right twice within 0.5s
End of input stops any active recording and exits.";

/// Clears the toggle flag when the start/stop task ends, even by panic
struct ToggleGuard(Arc<AtomicBool>);

impl Drop for ToggleGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Monitor {
    recognizer: GestureRecognizer,
    photo: Arc<PhotoCapturer>,
    sessions: Arc<SessionManager>,
    runtime: Handle,
    /// Set while a start or stop is in flight
    toggling: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Monitor {
    pub fn new(
        recognizer: GestureRecognizer,
        photo: Arc<PhotoCapturer>,
        sessions: Arc<SessionManager>,
        runtime: Handle,
    ) -> Self {
        Self {
            recognizer,
            photo,
            sessions,
            runtime,
            toggling: Arc::new(AtomicBool::new(false)),
            tasks: Vec::new(),
        }
    }

    fn activity(&self) -> Activity {
        Activity {
            capturing: self.photo.is_capturing(),
            recording: self.sessions.state() != SessionState::Idle
                || self.toggling.load(Ordering::Acquire),
            last_photo: self.photo.last_capture(),
        }
    }

    /// Feed one event and dispatch whatever it triggers
    pub fn handle_event(&mut self, event: InputEvent) {
        let activity = self.activity();
        match self.recognizer.on_event(event, activity) {
            Some(Trigger::Photo) => self.dispatch_photo(),
            Some(Trigger::ToggleRecording) => self.toggle_recording(),
            None => {}
        }
    }

    fn dispatch_photo(&mut self) {
        // Taken here so the next event already sees a capture in flight
        let latch = match self.photo.begin() {
            Ok(latch) => latch,
            Err(e) => {
                tracing::warn!(code = e.code(), "Photo gesture ignored: {}", e);
                return;
            }
        };

        tracing::info!("Photo gesture detected");
        let photo = self.photo.clone();
        let task = self.runtime.spawn_blocking(move || {
            if let Err(e) = photo.capture_with(latch) {
                tracing::error!(code = e.code(), "Photo capture failed: {}", e);
            }
        });
        self.track(task);
    }

    fn toggle_recording(&mut self) {
        if self.toggling.swap(true, Ordering::AcqRel) {
            tracing::warn!("Recording toggle ignored, previous toggle still running");
            return;
        }

        let guard = ToggleGuard(self.toggling.clone());
        let sessions = self.sessions.clone();
        let task = self.runtime.spawn(async move {
            if sessions.state() == SessionState::Idle {
                tracing::info!("Record gesture detected, starting session");
                let starting = sessions.clone();
                match tokio::task::spawn_blocking(move || starting.start()).await {
                    Ok(Ok(artifacts)) => {
                        tracing::info!("Recording to {:?}", artifacts.temp_video)
                    }
                    Ok(Err(e)) => {
                        tracing::error!(code = e.code(), "Could not start recording: {}", e)
                    }
                    Err(e) => tracing::error!("Start task failed: {}", e),
                }
                drop(guard);
                return;
            }

            tracing::info!("Record gesture detected, stopping session");
            let stopping = sessions.clone();
            let finalization = tokio::task::spawn_blocking(move || stopping.stop()).await;
            drop(guard);

            match finalization {
                Ok(Some(finalization)) => {
                    let output = finalization.wait().await;
                    tracing::debug!("Session output settled at {:?}", output);
                }
                Ok(None) => tracing::debug!("Stop requested with no active session"),
                Err(e) => tracing::error!("Stop task failed: {}", e),
            }
        });
        self.track(task);
    }

    fn track(&mut self, task: JoinHandle<()>) {
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(task);
    }

    /// Block until every dispatched photo and toggle task has finished
    ///
    /// Must be called from outside the runtime.
    fn drain(&mut self) {
        for task in self.tasks.drain(..) {
            if let Err(e) = self.runtime.block_on(task) {
                tracing::error!("Capture task failed: {}", e);
            }
        }
    }

    /// Print instructions, then process events until the source ends
    pub fn run(&mut self, input: &mut dyn InputSource) -> std::io::Result<()> {
        println!("{}", INSTRUCTIONS);
        tracing::info!("Listening for gestures");
        input.run(&mut |event| self.handle_event(event))
    }

    /// Finish in-flight work and close any active session
    pub fn shutdown(mut self) {
        self.drain();

        if self.sessions.state() == SessionState::Idle {
            return;
        }

        tracing::info!("Input closed, stopping active session");
        if let Some(finalization) = self.sessions.stop() {
            let output = self.runtime.block_on(finalization.wait());
            tracing::debug!("Session output settled at {:?}", output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::testing::{FakeBackend, FakeMuxer};
    use crate::config::AppConfig;
    use crate::gesture::{Button, GestureTiming};
    use crate::input::LineInput;
    use crate::storage::{MountedRoots, PHOTO_DIR, VIDEO_DIR};
    use std::io::Cursor;
    use std::path::{Path, PathBuf};
    use std::time::{Duration, Instant};
    use tempfile::{tempdir, TempDir};
    use tokio::runtime::Runtime;

    struct Harness {
        _runtime: Runtime,
        monitor: Monitor,
        sessions: Arc<SessionManager>,
        root: TempDir,
    }

    fn harness() -> Harness {
        harness_on(|root| root.to_path_buf())
    }

    fn harness_on(output_root: impl Fn(&Path) -> PathBuf) -> Harness {
        let runtime = Runtime::new().unwrap();
        let root = tempdir().unwrap();
        let config = AppConfig {
            output_roots: vec![output_root(root.path())],
            photo_warmup_ms: 1,
            frame_poll_ms: 1,
            ..AppConfig::default()
        };

        let backend = Arc::new(FakeBackend::with_cameras(&[0]));
        let locator = Arc::new(MountedRoots::new(config.output_roots.clone()));
        let photo = Arc::new(PhotoCapturer::new(
            backend.clone(),
            locator.clone(),
            config.camera_indices.clone(),
            config.photo_warmup(),
        ));
        let sessions = Arc::new(SessionManager::new(
            config,
            backend,
            locator,
            Arc::new(FakeMuxer::succeeding()),
            runtime.handle().clone(),
        ));
        let monitor = Monitor::new(
            GestureRecognizer::new(GestureTiming::default()),
            photo,
            sessions.clone(),
            runtime.handle().clone(),
        );

        Harness {
            _runtime: runtime,
            monitor,
            sessions,
            root,
        }
    }

    fn click(monitor: &mut Monitor, button: Button, at: Instant) {
        monitor.handle_event(InputEvent::press(button, at));
        monitor.handle_event(InputEvent::release(button, at + Duration::from_millis(5)));
    }

    fn chord(monitor: &mut Monitor, at: Instant) {
        monitor.handle_event(InputEvent::press(Button::Left, at));
        monitor.handle_event(InputEvent::press(Button::Right, at + Duration::from_millis(10)));
        monitor.handle_event(InputEvent::release(Button::Left, at + Duration::from_millis(200)));
        monitor.handle_event(InputEvent::release(Button::Right, at + Duration::from_millis(200)));
    }

    fn toggle(monitor: &mut Monitor, base: Instant) {
        click(monitor, Button::Left, base);
        click(monitor, Button::Left, base + Duration::from_millis(50));
        click(monitor, Button::Right, base + Duration::from_millis(100));
        click(monitor, Button::Right, base + Duration::from_millis(150));
    }

    fn files_in(dir: &Path) -> Vec<String> {
        match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    #[test]
    fn test_chord_writes_one_photo() {
        let mut h = harness();
        let t0 = Instant::now();

        h.monitor.handle_event(InputEvent::press(Button::Left, t0));
        h.monitor
            .handle_event(InputEvent::press(Button::Right, t0 + Duration::from_millis(10)));
        h.monitor.drain();

        let photos = files_in(&h.root.path().join(PHOTO_DIR));
        assert_eq!(photos.len(), 1);
        assert!(photos[0].starts_with("monitor_photo_"));
        assert_eq!(h.sessions.state(), SessionState::Idle);
    }

    #[test]
    fn test_failed_photo_can_be_retried_at_once() {
        let mut h = harness_on(|root| root.join("usb"));
        let t0 = Instant::now();

        // Stick not mounted yet
        chord(&mut h.monitor, t0);
        h.monitor.drain();
        assert!(h.monitor.photo.last_capture().is_none());

        let usb = h.root.path().join("usb");
        std::fs::create_dir(&usb).unwrap();
        chord(&mut h.monitor, t0 + Duration::from_millis(600));
        h.monitor.drain();

        assert_eq!(files_in(&usb.join(PHOTO_DIR)).len(), 1);
        assert!(h.monitor.photo.last_capture().is_some());
    }

    #[test]
    fn test_toggle_twice_produces_merged_video() {
        let mut h = harness();
        let t0 = Instant::now();

        toggle(&mut h.monitor, t0);
        h.monitor.drain();
        assert_eq!(h.sessions.state(), SessionState::Recording);

        std::thread::sleep(Duration::from_millis(30));
        toggle(&mut h.monitor, t0 + Duration::from_secs(2));
        h.monitor.drain();
        assert_eq!(h.sessions.state(), SessionState::Idle);

        let videos = files_in(&h.root.path().join(VIDEO_DIR));
        assert_eq!(videos.len(), 1, "temporaries should be gone: {:?}", videos);
        assert!(videos[0].starts_with("monitor_video_") && videos[0].ends_with(".mp4"));
    }

    #[test]
    fn test_photo_chord_ignored_while_recording() {
        let mut h = harness();
        let t0 = Instant::now();

        toggle(&mut h.monitor, t0);
        h.monitor.drain();

        let later = t0 + Duration::from_secs(2);
        h.monitor.handle_event(InputEvent::press(Button::Left, later));
        h.monitor
            .handle_event(InputEvent::press(Button::Right, later + Duration::from_millis(10)));
        h.monitor.drain();

        assert!(files_in(&h.root.path().join(PHOTO_DIR)).is_empty());
        h.monitor.shutdown();
        assert_eq!(h.sessions.state(), SessionState::Idle);
    }

    #[test]
    fn test_run_then_shutdown_closes_open_session() {
        let mut h = harness();
        let script = "left down\nleft up\nleft down\nleft up\nright down\nright up\nright down\nright up\n";
        let mut input = LineInput::new(Cursor::new(script));

        h.monitor.run(&mut input).unwrap();
        h.monitor.drain();
        assert_eq!(h.sessions.state(), SessionState::Recording);

        let sessions = h.sessions.clone();
        h.monitor.shutdown();

        assert_eq!(sessions.state(), SessionState::Idle);
        let videos = files_in(&h.root.path().join(VIDEO_DIR));
        assert!(videos.iter().any(|name| name.starts_with("monitor_video_")));
    }
}
