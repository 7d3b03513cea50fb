pub mod engine;
pub mod pool;
pub mod tracker;

pub use engine::{InferenceScheduler, PostProcFn, PreProcFn};
pub use pool::{BatchSlot, SlotPool, SlotTicket};
pub use tracker::{OutputTracker, Poll};
