//! Line-oriented event source
//!
//! One event per line: `<button> <action>`, where button is `left`/`l` or
//! `right`/`r` and action is `down`/`press` or `up`/`release`. Blank lines
//! and `#` comments are skipped. Events are timestamped on arrival.

use crate::gesture::{Button, InputEvent};
use crate::input::InputSource;
use std::io::BufRead;
use std::time::Instant;

/// Parse one line into `(button, pressed)`; `Ok(None)` for blank/comment lines
pub fn parse_line(line: &str) -> Result<Option<(Button, bool)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut parts = line.split_whitespace();
    let button = match parts.next().map(str::to_ascii_lowercase).as_deref() {
        Some("left") | Some("l") => Button::Left,
        Some("right") | Some("r") => Button::Right,
        other => return Err(format!("unknown button {:?}", other.unwrap_or(""))),
    };
    let pressed = match parts.next().map(str::to_ascii_lowercase).as_deref() {
        Some("down") | Some("press") => true,
        Some("up") | Some("release") => false,
        other => return Err(format!("unknown action {:?}", other.unwrap_or(""))),
    };
    if let Some(extra) = parts.next() {
        return Err(format!("unexpected trailing {:?}", extra));
    }

    Ok(Some((button, pressed)))
}

pub struct LineInput<R> {
    reader: R,
}

impl<R: BufRead> LineInput<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> InputSource for LineInput<R> {
    fn run(&mut self, handler: &mut dyn FnMut(InputEvent)) -> std::io::Result<()> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(());
            }

            match parse_line(&line) {
                Ok(Some((button, pressed))) => handler(InputEvent {
                    button,
                    pressed,
                    timestamp: Instant::now(),
                }),
                Ok(None) => {}
                Err(e) => tracing::warn!("Ignoring input line {:?}: {}", line.trim(), e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_variants() {
        assert_eq!(parse_line("left down"), Ok(Some((Button::Left, true))));
        assert_eq!(parse_line("  R release\n"), Ok(Some((Button::Right, false))));
        assert_eq!(parse_line("l UP"), Ok(Some((Button::Left, false))));
        assert_eq!(parse_line("# comment"), Ok(None));
        assert_eq!(parse_line(""), Ok(None));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_line("middle down").is_err());
        assert!(parse_line("left sideways").is_err());
        assert!(parse_line("left").is_err());
        assert!(parse_line("left down now").is_err());
    }

    #[test]
    fn test_run_skips_bad_lines_and_keeps_going() {
        let script = "left down\nbogus\n\nright down\nright up\n";
        let mut input = LineInput::new(Cursor::new(script));
        let mut events = Vec::new();

        input
            .run(&mut |event| events.push((event.button, event.pressed)))
            .unwrap();

        assert_eq!(
            events,
            vec![(Button::Left, true), (Button::Right, true), (Button::Right, false)]
        );
    }
}
