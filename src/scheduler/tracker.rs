//! Ordered completion tracker
//!
//! Keeps the pending list (tickets in submission order) and the ready list
//! (finished output frames) under one mutex. Batches may complete in any
//! order; outputs are only published by draining the longest done-prefix of
//! the pending list, so the ready list is always in submission order.
//!
//! A ticket completed with no output (failed launch or post-processing) is
//! discarded during the drain and shows up to the consumer as a missing
//! frame, never as a reordering.

use std::collections::VecDeque;
use std::sync::Mutex;

use tracing::warn;

use crate::utils::error::{FrameflowError, Result};

/// Outcome of a single poll
#[derive(Debug, PartialEq, Eq)]
pub enum Poll<T> {
    /// The next output frame in submission order
    Ready(T),
    /// Frames are pending but the earliest is still in flight
    NotReady,
    /// Nothing is pending or ready
    Empty,
}

struct PendingTicket<T> {
    seq: u64,
    done: bool,
    output: Option<T>,
}

struct TrackerInner<T> {
    pending: VecDeque<PendingTicket<T>>,
    ready: VecDeque<T>,
    next_seq: u64,
}

/// Shared order-preserving output queue
pub struct OutputTracker<T> {
    inner: Mutex<TrackerInner<T>>,
}

impl<T> Default for OutputTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OutputTracker<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TrackerInner {
                pending: VecDeque::new(),
                ready: VecDeque::new(),
                next_seq: 0,
            }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, TrackerInner<T>>> {
        self.inner
            .lock()
            .map_err(|_| FrameflowError::Internal("completion tracker mutex poisoned".to_string()))
    }

    /// Append a ticket for a newly submitted frame; returns its sequence.
    pub fn register(&self) -> Result<u64> {
        let mut inner = self.lock()?;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.pending.push_back(PendingTicket {
            seq,
            done: false,
            output: None,
        });
        Ok(seq)
    }

    /// Mark a batch of tickets done and drain the finished prefix.
    ///
    /// `None` outputs are published as gaps (dropped frames).
    pub fn complete_batch(&self, results: Vec<(u64, Option<T>)>) -> Result<()> {
        let mut inner = self.lock()?;
        for (seq, output) in results {
            let front_seq = match inner.pending.front() {
                Some(front) => front.seq,
                None => {
                    warn!(seq, "completion for ticket with empty pending list");
                    continue;
                }
            };
            // Pending tickets are contiguous in sequence, so position is an
            // offset from the front.
            let index = match seq.checked_sub(front_seq).map(|i| i as usize) {
                Some(i) if i < inner.pending.len() => i,
                _ => {
                    warn!(seq, front_seq, "completion for unknown ticket");
                    continue;
                }
            };
            let ticket = &mut inner.pending[index];
            if ticket.done {
                warn!(seq, "ticket completed twice");
                continue;
            }
            ticket.done = true;
            ticket.output = output;
        }

        // Drain the longest done-prefix into the ready list.
        while inner.pending.front().map(|t| t.done).unwrap_or(false) {
            let ticket = inner
                .pending
                .pop_front()
                .ok_or_else(|| FrameflowError::Internal("pending front vanished".to_string()))?;
            if let Some(frame) = ticket.output {
                inner.ready.push_back(frame);
            }
        }
        Ok(())
    }

    /// Next ordered output, or why there is none yet.
    pub fn poll(&self) -> Result<Poll<T>> {
        let mut inner = self.lock()?;
        if let Some(frame) = inner.ready.pop_front() {
            return Ok(Poll::Ready(frame));
        }
        if inner.pending.is_empty() {
            Ok(Poll::Empty)
        } else {
            Ok(Poll::NotReady)
        }
    }

    /// Tickets still awaiting completion or drainage
    pub fn pending_len(&self) -> Result<usize> {
        Ok(self.lock()?.pending.len())
    }

    /// Outputs awaiting consumption
    pub fn ready_len(&self) -> Result<usize> {
        Ok(self.lock()?.ready.len())
    }

    /// True when no frame is inside the tracker in any state
    pub fn is_empty(&self) -> Result<bool> {
        let inner = self.lock()?;
        Ok(inner.pending.is_empty() && inner.ready.is_empty())
    }
}
