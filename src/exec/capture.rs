// src/exec/capture.rs

use std::collections::VecDeque;

/// Lines of stdout/stderr kept per stream.
pub const TAIL_LINES: usize = 50;

/// Tail of a step's output, attached to its completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

/// Bounded line buffer that drops the oldest lines.
#[derive(Debug, Clone)]
pub struct TailBuffer {
    lines: VecDeque<String>,
    capacity: usize,
    dropped: usize,
}

impl Default for TailBuffer {
    fn default() -> Self {
        Self::new(TAIL_LINES)
    }
}

impl TailBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(TAIL_LINES)),
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.capacity == 0 {
            self.dropped += 1;
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
            self.dropped += 1;
        }
        self.lines.push_back(line);
    }

    /// Number of lines pushed out of the buffer so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines.into()
    }
}
