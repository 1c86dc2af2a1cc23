//! Line framing with skip-then-capture
//!
//! Turns a raw byte stream into newline-delimited text lines. A reader that
//! attaches to a device mid-transmission would otherwise see the tail of a
//! line as if it were complete, so every framing pass first discards input
//! up through one terminator and only then captures the following line.
//!
//! The terminator is `\n`; a `\r` directly before it belongs to the
//! terminator. Bytes are decoded incrementally as UTF-8 and anything that is
//! not valid UTF-8 is dropped without disturbing the line around it.

/// Line terminator
pub const TERMINATOR: u8 = b'\n';

/// Framing phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// Discarding input up to and including the next terminator
    Skip,
    /// Accumulating the line that follows
    Capture,
}

/// Result of feeding one byte to the framer
///
/// `dropped` counts bytes thrown away as invalid UTF-8 just before this
/// output; they never appear in any line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutput {
    /// The byte is held as part of an unfinished multi-byte sequence
    Pending,
    /// A character was decoded (captured or skipped)
    Decoded { dropped: usize },
    /// Bytes were thrown away and no character was decoded
    Dropped(usize),
    /// A complete line
    Line { text: String, dropped: usize },
    /// The line grew past the length limit and was thrown away
    Overflow { dropped: usize },
}

impl FrameOutput {
    /// Bytes thrown away as invalid UTF-8
    pub fn dropped(&self) -> usize {
        match self {
            FrameOutput::Pending => 0,
            FrameOutput::Dropped(n) => *n,
            FrameOutput::Decoded { dropped }
            | FrameOutput::Line { dropped, .. }
            | FrameOutput::Overflow { dropped } => *dropped,
        }
    }

    /// Whether a valid character ended any run of invalid bytes
    pub fn is_decoded(&self) -> bool {
        !matches!(self, FrameOutput::Pending | FrameOutput::Dropped(_))
    }
}

/// Incremental UTF-8 decoder that drops invalid input
#[derive(Debug, Default)]
struct Utf8Accumulator {
    pending: Vec<u8>,
    expected: usize,
}

impl Utf8Accumulator {
    /// Feed a byte; yields a char when one completes and the number of bytes
    /// that had to be thrown away
    fn push(&mut self, byte: u8) -> (Option<char>, usize) {
        let mut dropped = 0;

        if !self.pending.is_empty() {
            if byte & 0xC0 == 0x80 {
                self.pending.push(byte);
                if self.pending.len() < self.expected {
                    return (None, 0);
                }
                let decoded = std::str::from_utf8(&self.pending)
                    .ok()
                    .and_then(|s| s.chars().next());
                let len = self.pending.len();
                self.clear();
                return match decoded {
                    Some(c) => (Some(c), 0),
                    None => (None, len),
                };
            }
            // Sequence cut short; the new byte starts over
            dropped = self.pending.len();
            self.clear();
        }

        match byte {
            0x00..=0x7F => (Some(byte as char), dropped),
            0xC2..=0xDF => self.start(byte, 2, dropped),
            0xE0..=0xEF => self.start(byte, 3, dropped),
            0xF0..=0xF4 => self.start(byte, 4, dropped),
            _ => (None, dropped + 1),
        }
    }

    fn start(&mut self, byte: u8, expected: usize, dropped: usize) -> (Option<char>, usize) {
        self.pending.push(byte);
        self.expected = expected;
        (None, dropped)
    }

    fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn clear(&mut self) {
        self.pending.clear();
        self.expected = 0;
    }
}

/// Skip-then-capture line framer
#[derive(Debug)]
pub struct LineFramer {
    phase: FramePhase,
    line: String,
    decoder: Utf8Accumulator,
    max_line_length: usize,
    line_chars: usize,
}

impl LineFramer {
    /// Create a framer that discards lines longer than `max_line_length`
    /// characters
    pub fn new(max_line_length: usize) -> Self {
        Self {
            phase: FramePhase::Skip,
            line: String::with_capacity(128),
            decoder: Utf8Accumulator::default(),
            max_line_length: max_line_length.max(1),
            line_chars: 0,
        }
    }

    /// Current phase
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Characters captured so far in the current line
    pub fn buffered_len(&self) -> usize {
        self.line_chars
    }

    /// Start a fresh pass: back to skipping, partial line discarded
    pub fn reset(&mut self) {
        self.phase = FramePhase::Skip;
        self.line.clear();
        self.line_chars = 0;
        self.decoder.clear();
    }

    /// Feed one byte
    ///
    /// After a [`FrameOutput::Line`] or [`FrameOutput::Overflow`] the framer
    /// is back in the skip phase.
    pub fn push(&mut self, byte: u8) -> FrameOutput {
        if byte == TERMINATOR {
            // A sequence cut short by the terminator is lost
            let dropped = self.decoder.pending_len();
            self.decoder.clear();
            return match self.phase {
                FramePhase::Skip => {
                    self.phase = FramePhase::Capture;
                    self.line.clear();
                    self.line_chars = 0;
                    FrameOutput::Decoded { dropped }
                }
                FramePhase::Capture => {
                    if self.line.ends_with('\r') {
                        self.line.pop();
                    }
                    let text = std::mem::take(&mut self.line);
                    self.line_chars = 0;
                    self.phase = FramePhase::Skip;
                    tracing::trace!(len = text.len(), dropped, "Line framed");
                    FrameOutput::Line { text, dropped }
                }
            };
        }

        let (decoded, dropped) = self.decoder.push(byte);
        let Some(c) = decoded else {
            return if dropped > 0 {
                FrameOutput::Dropped(dropped)
            } else {
                FrameOutput::Pending
            };
        };

        if self.phase == FramePhase::Capture {
            // `\r` only counts when it precedes the terminator
            let limit = if c == '\r' {
                self.max_line_length + 1
            } else {
                self.max_line_length
            };
            if self.line_chars >= limit {
                tracing::debug!(
                    max = self.max_line_length,
                    "Line exceeded length limit, discarding"
                );
                self.reset();
                return FrameOutput::Overflow { dropped };
            }
            self.line.push(c);
            self.line_chars += 1;
        }

        FrameOutput::Decoded { dropped }
    }

    /// Feed a slice, collecting every output worth reporting
    ///
    /// `Pending` and clean `Decoded` outputs are left out.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<FrameOutput> {
        bytes
            .iter()
            .map(|&b| self.push(b))
            .filter(|out| {
                !matches!(
                    out,
                    FrameOutput::Pending | FrameOutput::Decoded { dropped: 0 }
                )
            })
            .collect()
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_LINE_LENGTH)
    }
}
