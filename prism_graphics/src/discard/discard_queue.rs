/// Deferred destruction of GPU objects
///
/// A GPU object released during a frame may still be referenced by command
/// buffers in flight. Instead of destroying it, its owner packages the
/// destruction into a closure and pushes it here. The frame loop drains the
/// queue once it knows the GPU is done with the previous work.
///
/// The queue never synchronizes with the GPU itself: choosing the safe
/// point is the caller's job.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use crate::{prism_debug, prism_warn};

/// One pending destruction. Owns everything it needs to run.
pub type DiscardEntry = Box<dyn FnOnce() + Send + 'static>;

/// Point of the frame at which draining is known to be safe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafePoint {
    /// Start of frame N, after waiting on the fence of frame N - frames_in_flight
    FrameBoundary(u64),
    /// A specific submission fence was observed signaled
    FenceSignaled,
    /// The device was idle (shutdown, swapchain recreation)
    DeviceIdle,
}

impl fmt::Display for SafePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafePoint::FrameBoundary(frame) => write!(f, "frame boundary {}", frame),
            SafePoint::FenceSignaled => write!(f, "fence signaled"),
            SafePoint::DeviceIdle => write!(f, "device idle"),
        }
    }
}

/// FIFO of pending destruction closures
///
/// Shared as `Arc<DiscardQueue>` between the device and every resource
/// handle created on it. `enqueue` may be called from any thread.
pub struct DiscardQueue {
    entries: Mutex<Vec<DiscardEntry>>,
}

impl DiscardQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    // Poison-tolerant: a Vec of closures has no invariant to break
    fn lock(&self) -> MutexGuard<'_, Vec<DiscardEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a destruction closure
    pub fn enqueue<F>(&self, entry: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.lock().push(Box::new(entry));
    }

    /// Number of pending entries
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no entry is pending
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run and clear every pending entry in FIFO order
    ///
    /// The pending list is swapped out under the lock and executed outside
    /// it, so an entry may enqueue further entries; those run on the next
    /// drain. Returns the number of entries executed.
    pub fn drain_at(&self, point: SafePoint) -> usize {
        let pending = std::mem::take(&mut *self.lock());
        let count = pending.len();

        for entry in pending {
            entry();
        }

        if count > 0 {
            prism_debug!("prism::DiscardQueue", "Drained {} entries at {}", count, point);
        }
        count
    }
}

impl Default for DiscardQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DiscardQueue {
    fn drop(&mut self) {
        let leaked = self
            .entries
            .get_mut()
            .map(|entries| entries.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len());

        if leaked > 0 {
            prism_warn!(
                "prism::DiscardQueue",
                "Dropped with {} pending entries; their GPU objects are leaked",
                leaked
            );
        }
    }
}

#[cfg(test)]
#[path = "discard_queue_tests.rs"]
mod tests;
