//! Frameflow: streaming DNN inference scheduler
//!
//! This library sits between a frame-producing media pipeline and a neural
//! network runtime that can keep several inferences in flight. Decoded
//! frames are coalesced into fixed-size batches, dispatched over a bounded
//! pool of reusable inference requests, and returned to the pipeline in
//! submission order regardless of how the asynchronous completions land.
//!
//! ## Example
//!
//! ```no_run
//! use frameflow::{InferenceOptions, InferenceScheduler, NativeRuntime, Poll};
//!
//! fn main() -> frameflow::Result<()> {
//!     let opts = InferenceOptions::default()
//!         .with_model_path("models/identity.json")
//!         .with_input_name("data")
//!         .with_output_name("out")
//!         .with_batch_size(4)
//!         .with_nireq(8);
//!
//!     let sched: InferenceScheduler<_, Vec<u8>> =
//!         InferenceScheduler::open(&NativeRuntime::new(), opts)?;
//!     sched.set_pre_proc(|frame, tensor| {
//!         tensor.data().copy_from_slice(frame);
//!         Ok(())
//!     });
//!     sched.set_post_proc(|_frame, tensor| Ok(tensor.data().to_vec()));
//!
//!     sched.submit(vec![0u8; 16])?;
//!     sched.flush()?;
//!     while !sched.queue_empty()? {
//!         if let Poll::Ready(frame) = sched.poll()? {
//!             // hand the frame downstream
//!             let _ = frame;
//!         }
//!     }
//!     sched.close()
//! }
//! ```

pub mod config;
pub mod metrics;
pub mod runtime;
pub mod scheduler;
pub mod tensor;
pub mod utils;

pub use config::InferenceOptions;
pub use metrics::{MetricsSnapshot, SchedulerMetrics};
pub use runtime::{
    CompletionFn, InferenceRuntime, LaunchError, Layout, ModelHandle, NativeModel, NativeRuntime,
    RuntimeModel,
};
pub use scheduler::{InferenceScheduler, Poll};
pub use tensor::{DataType, Tensor, TensorDesc, TensorMut};
pub use utils::error::{FrameflowError, Result};
