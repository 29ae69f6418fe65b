// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pending Line Protocol lines, grouped into write requests.
//!
//! Size-based cuts happen here. Time-based flushing is driven by the write
//! worker's ticker.

/// Lines sent together in one write request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Batch {
    lines: Vec<String>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Newline-separated request body.
    pub fn body(&self) -> String {
        self.lines.join("\n")
    }
}

/// Collects encoded lines until `capacity` is reached.
pub struct BatchBuffer {
    pending: Vec<String>,
    capacity: usize,
    pending_bytes: usize,
}

impl BatchBuffer {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pending: Vec::with_capacity(capacity.min(1024)),
            capacity,
            pending_bytes: 0,
        }
    }

    /// Queue a line; returns the full batch once `capacity` lines are pending.
    pub fn push(&mut self, line: String) -> Option<Batch> {
        self.pending_bytes += line.len();
        self.pending.push(line);
        (self.pending.len() >= self.capacity).then(|| self.take())
    }

    /// Everything pending, possibly empty.
    pub fn take(&mut self) -> Batch {
        self.pending_bytes = 0;
        Batch {
            lines: std::mem::take(&mut self.pending),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Size of the pending lines, separators excluded.
    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }
}
