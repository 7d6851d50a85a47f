//! Input event sources

pub mod line;

pub use line::{parse_line, LineInput};

use crate::gesture::InputEvent;

/// Delivers button events to a handler until the source is exhausted
pub trait InputSource {
    /// Blocks the calling thread for the lifetime of the source
    fn run(&mut self, handler: &mut dyn FnMut(InputEvent)) -> std::io::Result<()>;
}
