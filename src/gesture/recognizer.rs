//! Press/release classifier
//!
//! Turns raw mouse button events into photo and record-toggle triggers.
//! - Both buttons held at once: photo (with cooldown)
//! - Two left presses and two right presses inside the click window: toggle recording

use std::time::{Duration, Instant};

/// Mouse button relevant to gestures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Left,
    Right,
}

/// A single press or release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub button: Button,
    pub pressed: bool,
    pub timestamp: Instant,
}

impl InputEvent {
    pub fn press(button: Button, timestamp: Instant) -> Self {
        Self {
            button,
            pressed: true,
            timestamp,
        }
    }

    pub fn release(button: Button, timestamp: Instant) -> Self {
        Self {
            button,
            pressed: false,
            timestamp,
        }
    }
}

/// Action derived from input events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Photo,
    ToggleRecording,
}

/// What the pipeline is doing when an event arrives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Activity {
    /// A single-shot photo is in flight
    pub capturing: bool,
    /// A recording session is not idle
    pub recording: bool,
    /// When the last photo was actually written; the cooldown runs from here
    pub last_photo: Option<Instant>,
}

/// Timing windows of the recognizer
#[derive(Debug, Clone, Copy)]
pub struct GestureTiming {
    pub photo_cooldown: Duration,
    pub click_timeout: Duration,
}

impl Default for GestureTiming {
    fn default() -> Self {
        Self {
            photo_cooldown: Duration::from_secs(1),
            click_timeout: Duration::from_millis(500),
        }
    }
}

/// Gesture recognizer state
#[derive(Debug)]
pub struct GestureRecognizer {
    timing: GestureTiming,
    left_held: bool,
    right_held: bool,
    left_count: u32,
    right_count: u32,
    last_click_time: Option<Instant>,
}

impl GestureRecognizer {
    pub fn new(timing: GestureTiming) -> Self {
        Self {
            timing,
            left_held: false,
            right_held: false,
            left_count: 0,
            right_count: 0,
            last_click_time: None,
        }
    }

    /// Feed one event; at most one trigger comes out.
    pub fn on_event(&mut self, event: InputEvent, activity: Activity) -> Option<Trigger> {
        let now = event.timestamp;

        match event.button {
            Button::Left => self.left_held = event.pressed,
            Button::Right => self.right_held = event.pressed,
        }

        let photo = self.check_photo(now, activity);

        if !event.pressed {
            return photo;
        }

        let window_expired = self
            .last_click_time
            .map_or(true, |last| now.saturating_duration_since(last) > self.timing.click_timeout);
        if window_expired {
            self.left_count = 0;
            self.right_count = 0;
        }
        self.last_click_time = Some(now);

        match event.button {
            Button::Left => self.left_count += 1,
            Button::Right => self.right_count += 1,
        }

        if photo.is_some() {
            return photo;
        }

        self.check_toggle(activity)
    }

    fn check_photo(&mut self, now: Instant, activity: Activity) -> Option<Trigger> {
        if !(self.left_held && self.right_held) || activity.capturing || activity.recording {
            return None;
        }

        let cooled_down = activity
            .last_photo
            .map_or(true, |last| now.saturating_duration_since(last) > self.timing.photo_cooldown);
        if !cooled_down {
            return None;
        }

        tracing::debug!("Simultaneous hold detected, photo trigger");
        self.left_held = false;
        self.right_held = false;
        Some(Trigger::Photo)
    }

    fn check_toggle(&mut self, activity: Activity) -> Option<Trigger> {
        if self.left_count < 2 || self.right_count < 2 {
            return None;
        }

        // A photo in flight blocks starting a session, but not stopping one
        if activity.capturing && !activity.recording {
            return None;
        }

        tracing::debug!(
            "Click pattern L{} R{} detected, toggle trigger",
            self.left_count,
            self.right_count
        );
        self.left_count = 0;
        self.right_count = 0;
        self.left_held = false;
        self.right_held = false;
        Some(Trigger::ToggleRecording)
    }

    /// Current (left, right) click counters
    pub fn counts(&self) -> (u32, u32) {
        (self.left_count, self.right_count)
    }

    /// Current (left, right) held flags
    pub fn held(&self) -> (bool, bool) {
        (self.left_held, self.right_held)
    }
}

impl Default for GestureRecognizer {
    fn default() -> Self {
        Self::new(GestureTiming::default())
    }
}
