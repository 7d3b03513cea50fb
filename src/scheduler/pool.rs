//! Bounded inference request pool
//!
//! Holds the idle request slots behind a mutex and condition variable.
//! Returning a slot to the front keeps a half-filled batch the next one
//! handed out, so successive submissions keep filling the same request.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::utils::error::{FrameflowError, Result};

/// One submitted frame riding inside a batch slot
pub struct SlotTicket<T> {
    pub seq: u64,
    pub frame: T,
}

/// A reusable inference request plus its per-dispatch fill state
pub struct BatchSlot<R, T> {
    pub id: usize,
    pub request: R,
    pub tickets: Vec<SlotTicket<T>>,
}

impl<R, T> BatchSlot<R, T> {
    pub fn new(id: usize, request: R) -> Self {
        Self {
            id,
            request,
            tickets: Vec::new(),
        }
    }

    /// Frames written into this slot so far
    pub fn fill(&self) -> usize {
        self.tickets.len()
    }
}

/// LIFO pool of idle batch slots
pub struct SlotPool<R, T> {
    slots: Mutex<VecDeque<BatchSlot<R, T>>>,
    available: Condvar,
    capacity: usize,
}

impl<R, T> SlotPool<R, T> {
    pub fn new(slots: Vec<BatchSlot<R, T>>) -> Self {
        let capacity = slots.len();
        Self {
            slots: Mutex::new(slots.into()),
            available: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, VecDeque<BatchSlot<R, T>>>> {
        self.slots
            .lock()
            .map_err(|_| FrameflowError::Internal("request pool mutex poisoned".to_string()))
    }

    /// Take the front slot, blocking until one is available.
    pub fn take(&self) -> Result<BatchSlot<R, T>> {
        let mut guard = self.lock()?;
        loop {
            if let Some(slot) = guard.pop_front() {
                return Ok(slot);
            }
            guard = self
                .available
                .wait(guard)
                .map_err(|_| FrameflowError::Internal("request pool mutex poisoned".to_string()))?;
        }
    }

    /// Take the front slot if one is available right now.
    pub fn try_take(&self) -> Result<Option<BatchSlot<R, T>>> {
        Ok(self.lock()?.pop_front())
    }

    /// Return a slot to the back of the pool.
    pub fn give(&self, slot: BatchSlot<R, T>) -> Result<()> {
        let mut guard = self.lock()?;
        guard.push_back(slot);
        self.available.notify_all();
        Ok(())
    }

    /// Return a slot to the front so the next take hands it out again.
    pub fn give_front(&self, slot: BatchSlot<R, T>) -> Result<()> {
        let mut guard = self.lock()?;
        guard.push_front(slot);
        self.available.notify_all();
        Ok(())
    }

    /// Currently idle slots
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    /// Total slots this pool was created with
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Block until every slot is back in the pool.
    pub fn wait_idle(&self) -> Result<()> {
        let mut guard = self.lock()?;
        while guard.len() < self.capacity {
            guard = self
                .available
                .wait(guard)
                .map_err(|_| FrameflowError::Internal("request pool mutex poisoned".to_string()))?;
        }
        Ok(())
    }
}
