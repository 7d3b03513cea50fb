//! Runtime capability traits
//!
//! The scheduler is generic over any inference runtime that can load a
//! model, hand out reusable request handles with typed tensor buffers, and
//! execute a request asynchronously with a completion callback. The bundled
//! CPU implementation lives in [`native`]; an accelerator runtime plugs in
//! by implementing the same two traits.

pub mod model;
pub mod native;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::tensor::{Tensor, TensorDesc, TensorMut};
use crate::utils::error::{FrameflowError, Result};

pub use model::ModelHandle;
pub use native::{NativeModel, NativeRuntime};

/// Memory layout requested for a 4-D input at the model boundary.
///
/// Descriptors are always reported as `[N,C,H,W]`; setting `Nhwc` tells the
/// runtime that callers write interleaved data and it must transpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    Any,
    Nchw,
    Nhwc,
}

/// Callback invoked exactly once when an asynchronous launch finishes.
///
/// The request handle is returned to the caller together with the execution
/// status, so the handle can be recycled whether the run succeeded or not.
pub type CompletionFn<R> = Box<dyn FnOnce(R, Result<()>) + Send + 'static>;

/// A rejected asynchronous launch.
///
/// Hands the request back so the caller can recycle it; the completion
/// callback is guaranteed not to have been invoked.
pub struct LaunchError<R> {
    pub request: R,
    pub error: FrameflowError,
}

impl<R> LaunchError<R> {
    pub fn new(request: R, error: FrameflowError) -> Self {
        Self { request, error }
    }
}

/// Entry point of a runtime backend: loads models onto a device.
pub trait InferenceRuntime {
    type Model: RuntimeModel;

    /// Load a model from a file onto the named device.
    ///
    /// Fails with [`FrameflowError::ModelLoad`] for unreadable or invalid
    /// files and [`FrameflowError::Config`] for unknown devices.
    fn load_model(&self, path: &Path, device: &str) -> Result<Self::Model>;
}

/// A loaded model: tensor metadata plus request creation and execution.
///
/// Request handles own their input/output buffers and may be in flight on a
/// runtime worker thread while the model is used from other threads, so the
/// model itself must be shareable.
pub trait RuntimeModel: Send + Sync + 'static {
    type Request: Send + 'static;

    fn input_names(&self) -> Vec<String>;

    fn output_names(&self) -> Vec<String>;

    fn input_desc(&self, name: &str) -> Result<TensorDesc>;

    fn output_desc(&self, name: &str) -> Result<TensorDesc>;

    /// Declare the layout callers use for a 4-D input.
    fn set_input_layout(&mut self, name: &str, layout: Layout) -> Result<()>;

    /// Resize the batch dimension of the named input (and the outputs that
    /// depend on it). Must be called before any request is created.
    fn reshape_input_batch(&mut self, name: &str, batch: usize) -> Result<()>;

    /// Allocate a reusable inference request with its tensor buffers.
    fn create_request(&self) -> Result<Self::Request>;

    /// Mutable view of a request's input buffer.
    fn input_tensor<'r>(&self, request: &'r mut Self::Request, name: &str) -> Result<TensorMut<'r>>;

    /// View of a request's output buffer.
    fn output_tensor<'r>(&self, request: &'r Self::Request, name: &str) -> Result<Tensor<'r>>;

    /// Execute synchronously on the calling thread.
    fn infer(&self, request: &mut Self::Request) -> Result<()>;

    /// Execute asynchronously; `on_complete` fires exactly once on a runtime
    /// worker thread. A rejected launch returns the request without having
    /// invoked the callback.
    fn infer_async(
        &self,
        request: Self::Request,
        on_complete: CompletionFn<Self::Request>,
    ) -> std::result::Result<(), LaunchError<Self::Request>>;
}
