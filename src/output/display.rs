//! Text rendering for the 8-line status display.
//!
//! The display shows the most recent devices first, one per 21-column row:
//!
//! ```text
//! Device 2 (18x)
//! Device 1 (8x)
//! ```

use super::{DeviceDisplay, OutputError};
use std::collections::VecDeque;
use std::io::Write;

/// Rows on the display.
pub const DISPLAY_LINES: usize = 8;

/// Characters per row.
pub const DISPLAY_COLUMNS: usize = 21;

/// Format one display row: `"<label> (<count>x)"`, padded or cut to the row width.
pub fn format_line(label: &str, seen_count: u32) -> String {
    let line = format!("{label} ({seen_count}x)");
    let mut line: String = line.chars().take(DISPLAY_COLUMNS).collect();
    let width = line.chars().count();
    line.extend(std::iter::repeat_n(' ', DISPLAY_COLUMNS - width));
    line
}

/// Fixed-depth ring of rows, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineBuffer {
    lines: VecDeque<String>,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self {
            lines: std::iter::repeat_n(String::new(), DISPLAY_LINES).collect(),
        }
    }
}

impl LineBuffer {
    /// Put `line` on top, dropping the oldest row.
    pub fn push(&mut self, line: String) {
        self.lines.pop_back();
        self.lines.push_front(line);
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Display that renders its rows as text to any writer (a terminal, a
/// character device, a file watched by another program).
pub struct TextDisplay<W> {
    buffer: LineBuffer,
    out: W,
}

impl<W: Write + Send> TextDisplay<W> {
    pub fn new(out: W) -> Self {
        Self {
            buffer: LineBuffer::default(),
            out,
        }
    }

    pub fn buffer(&self) -> &LineBuffer {
        &self.buffer
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> DeviceDisplay for TextDisplay<W> {
    fn render_device(&mut self, label: &str, seen_count: u32) {
        self.buffer.push(format_line(label, seen_count));
    }

    fn flush(&mut self) -> Result<(), OutputError> {
        for line in self.buffer.lines() {
            writeln!(self.out, "{line}")?;
        }
        self.out.flush()?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), OutputError> {
        self.buffer.clear();
        let blank = " ".repeat(DISPLAY_COLUMNS);
        for _ in 0..DISPLAY_LINES {
            writeln!(self.out, "{blank}")?;
        }
        self.out.flush()?;
        Ok(())
    }
}
