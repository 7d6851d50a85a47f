//! Gesture recognition
//!
//! Converts raw mouse button events into capture triggers.

pub mod recognizer;

pub use recognizer::{Activity, Button, GestureRecognizer, GestureTiming, InputEvent, Trigger};
