//! Streaming bin-packing of collected files into size-bounded batches
//!
//! One pass, greedy, input order preserved:
//!
//! 1. A file larger than `max` fits no batch; it is reported and dropped.
//! 2. If adding the file would push the current batch past `max`, the
//!    current batch is closed (as `Filled` if it reached `min`, otherwise
//!    `Forced`) and a new batch starts with the file.
//! 3. Otherwise the file is appended.
//! 4. At end of input, a non-empty trailing batch below `min` is merged into
//!    the batch before it, if there is one; otherwise it is emitted as is.
//!
//! Because of rule 4 the most recently closed batch is held back until the
//! next one closes or the input ends, so `push` emits with a lag of one.

use crate::batch::types::{Batch, CloseReason, SizeBounds};
use crate::collect::FileDescriptor;
use crate::report::RunReport;
use std::mem;

/// Greedy single-pass batcher
pub struct Batcher {
    bounds: SizeBounds,
    current: Batch,
    held: Option<Batch>,
    emitted: usize,
}

impl Batcher {
    /// Create a new batcher
    pub fn new(bounds: SizeBounds) -> Self {
        Self {
            bounds,
            current: Batch::new(),
            held: None,
            emitted: 0,
        }
    }

    /// Batch a whole sequence
    pub fn batch_all<I>(bounds: SizeBounds, files: I, report: &mut RunReport) -> Vec<Batch>
    where
        I: IntoIterator<Item = FileDescriptor>,
    {
        let mut batcher = Self::new(bounds);
        let mut batches: Vec<Batch> = files
            .into_iter()
            .filter_map(|file| batcher.push(file, report))
            .collect();
        batches.extend(batcher.finish(report));
        batches
    }

    /// Feed one file; returns a batch once it can no longer change
    pub fn push(&mut self, file: FileDescriptor, report: &mut RunReport) -> Option<Batch> {
        if file.size > self.bounds.max {
            report.file_oversized(&file.path, file.size, self.bounds.max);
            return None;
        }

        let current_size = self.current.aggregate_size();
        if current_size.saturating_add(file.size) <= self.bounds.max {
            self.current.push(file);
            return None;
        }

        let reason = if current_size >= self.bounds.min {
            CloseReason::Filled
        } else {
            report.forced_close(self.current.len(), current_size, self.bounds.min);
            CloseReason::Forced
        };

        let mut closed = mem::take(&mut self.current);
        closed.close_reason = reason;
        self.current.push(file);

        self.held.replace(closed).map(|b| self.number(b))
    }

    /// Flush the held and trailing batches
    pub fn finish(mut self, report: &mut RunReport) -> Vec<Batch> {
        let trailing = mem::take(&mut self.current);
        let mut out = Vec::with_capacity(2);

        match self.held.take() {
            Some(mut previous) if !trailing.is_empty() && trailing.aggregate_size() < self.bounds.min => {
                report.trailing_merged(
                    trailing.len(),
                    trailing.aggregate_size(),
                    previous.aggregate_size() + trailing.aggregate_size(),
                    self.bounds.max,
                );
                previous.absorb(trailing);
                out.push(self.number(previous));
            }
            Some(previous) => {
                out.push(self.number(previous));
                if !trailing.is_empty() {
                    out.push(self.number(trailing));
                }
            }
            None => {
                if !trailing.is_empty() {
                    out.push(self.number(trailing));
                }
            }
        }

        out
    }

    /// Number of batches emitted so far
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    fn number(&mut self, mut batch: Batch) -> Batch {
        self.emitted += 1;
        batch.index = self.emitted;
        batch
    }
}
