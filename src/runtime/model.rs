//! Model handle
//!
//! Thin adapter between the scheduler and a [`RuntimeModel`]: resolves the
//! configured input/output names once at open time, fixes the input layout,
//! reshapes the batch dimension, and exposes per-request batch-slice views.
//! The handle knows nothing about frames or queues.

use tracing::info;

use crate::config::InferenceOptions;
use crate::runtime::{CompletionFn, InferenceRuntime, LaunchError, Layout, RuntimeModel};
use crate::tensor::{Tensor, TensorDesc, TensorMut};
use crate::utils::error::{FrameflowError, Result};

#[derive(Debug)]
pub struct ModelHandle<M: RuntimeModel> {
    model: M,
    input_name: String,
    output_name: String,
    input_desc: TensorDesc,
}

impl<M: RuntimeModel> ModelHandle<M> {
    /// Load a model and prepare it for batched execution.
    ///
    /// The batch dimension becomes `opts.batch_size` (or 1 for synchronous
    /// execution) and 4-D input data is declared `NHWC`; the runtime is
    /// relied on to transpose into its native storage order.
    pub fn open<R>(runtime: &R, opts: &InferenceOptions) -> Result<Self>
    where
        R: InferenceRuntime<Model = M>,
    {
        let mut model = runtime.load_model(&opts.model_path, &opts.device)?;

        if !model.input_names().iter().any(|n| n == &opts.input_name) {
            return Err(FrameflowError::Config(format!(
                "model has no input named '{}'",
                opts.input_name
            )));
        }
        if !model.output_names().iter().any(|n| n == &opts.output_name) {
            return Err(FrameflowError::Config(format!(
                "model has no output named '{}'",
                opts.output_name
            )));
        }

        model.set_input_layout(&opts.input_name, Layout::Nhwc)?;

        let batch = if opts.async_exec { opts.batch_size } else { 1 };
        model.reshape_input_batch(&opts.input_name, batch)?;

        let input_desc = model.input_desc(&opts.input_name)?;
        info!(
            input = %opts.input_name,
            output = %opts.output_name,
            batch,
            channels = input_desc.channels,
            height = input_desc.height,
            width = input_desc.width,
            "model opened"
        );

        Ok(Self {
            model,
            input_name: opts.input_name.clone(),
            output_name: opts.output_name.clone(),
            input_desc,
        })
    }

    /// Descriptor of the configured input, post-reshape
    pub fn input_desc(&self) -> TensorDesc {
        self.input_desc
    }

    /// Descriptor of the configured output
    pub fn output_desc(&self) -> Result<TensorDesc> {
        self.model.output_desc(&self.output_name)
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    /// Allocate `count` reusable requests.
    pub fn create_requests(&self, count: usize) -> Result<Vec<M::Request>> {
        let mut requests = Vec::with_capacity(count);
        for i in 0..count {
            let request = self.model.create_request().map_err(|e| {
                FrameflowError::Resource(format!(
                    "allocated {} of {} inference requests: {}",
                    i, count, e
                ))
            })?;
            requests.push(request);
        }
        Ok(requests)
    }

    /// Mutable single-frame view of the input at batch slot `index`
    pub fn input_slice<'r>(
        &self,
        request: &'r mut M::Request,
        index: usize,
    ) -> Result<TensorMut<'r>> {
        self.model
            .input_tensor(request, &self.input_name)?
            .into_batch(index)
    }

    /// Single-frame view of the output at batch slot `index`
    pub fn output_slice<'r>(&self, request: &'r M::Request, index: usize) -> Result<Tensor<'r>> {
        self.model
            .output_tensor(request, &self.output_name)?
            .into_batch(index)
    }

    pub fn infer(&self, request: &mut M::Request) -> Result<()> {
        self.model.infer(request)
    }

    pub fn infer_async(
        &self,
        request: M::Request,
        on_complete: CompletionFn<M::Request>,
    ) -> std::result::Result<(), LaunchError<M::Request>> {
        self.model.infer_async(request, on_complete)
    }
}
