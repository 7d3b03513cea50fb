//! Shared test harness
//!
//! Provides an identity model descriptor for the bundled CPU runtime and a
//! manual runtime whose completions are fired by the test itself, so
//! completion order can be controlled precisely.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use frameflow::{
    CompletionFn, DataType, FrameflowError, InferenceOptions, InferenceRuntime, InferenceScheduler,
    LaunchError, Layout, Poll, Result, RuntimeModel, Tensor, TensorDesc, TensorMut,
};

/// 4 bytes per frame: one little-endian u32 payload
pub const FRAME_BYTES: usize = 4;

fn frame_desc() -> TensorDesc {
    TensorDesc {
        batch: 1,
        channels: 1,
        height: 2,
        width: 2,
        dtype: DataType::Uint8,
    }
}

/// Unique frame payload for submission index `i`
pub fn frame(i: usize) -> Vec<u8> {
    (i as u32).to_le_bytes().to_vec()
}

/// Write an identity model descriptor for the CPU runtime
pub fn identity_descriptor_file() -> PathBuf {
    static SEQ: AtomicU32 = AtomicU32::new(0);
    let path = std::env::temp_dir().join(format!(
        "frameflow-it-{}-{}.json",
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    let contents = r#"{
  "name": "identity",
  "inputs":  [{"name": "data", "channels": 1, "height": 2, "width": 2, "dtype": "uint8"}],
  "outputs": [{"name": "out",  "channels": 1, "height": 2, "width": 2, "dtype": "uint8"}]
}"#;
    std::fs::write(&path, contents).expect("write descriptor");
    path
}

/// Options wired for the identity descriptor
pub fn identity_opts(path: &Path) -> InferenceOptions {
    InferenceOptions::default()
        .with_model_path(path)
        .with_input_name("data")
        .with_output_name("out")
}

/// Install byte-copy callbacks on a scheduler of `Vec<u8>` frames
pub fn identity_callbacks<M: RuntimeModel>(sched: &InferenceScheduler<M, Vec<u8>>) {
    sched.set_pre_proc(|frame: &Vec<u8>, tensor| {
        tensor.data().copy_from_slice(frame);
        Ok(())
    });
    sched.set_post_proc(|_frame, tensor| Ok(tensor.data().to_vec()));
}

/// Poll until the scheduler reports end of stream, collecting outputs
pub fn drain_all<M: RuntimeModel>(sched: &InferenceScheduler<M, Vec<u8>>) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    loop {
        match sched.poll().expect("poll") {
            Poll::Ready(frame) => frames.push(frame),
            Poll::NotReady => std::thread::yield_now(),
            Poll::Empty => return frames,
        }
    }
}

// ---------------------------------------------------------------------------
// Manual runtime: the test decides when and in which order batches complete.
// ---------------------------------------------------------------------------

pub struct ManualRequest {
    input: Vec<u8>,
    output: Vec<u8>,
    input_desc: TensorDesc,
    output_desc: TensorDesc,
}

struct Held {
    request: ManualRequest,
    on_complete: CompletionFn<ManualRequest>,
}

/// Test-side handle to a manual model's launch queue
#[derive(Clone, Default)]
pub struct ManualControls {
    held: Arc<Mutex<Vec<Held>>>,
    fail_next_launch: Arc<AtomicBool>,
}

impl ManualControls {
    /// Launched batches not yet completed
    pub fn in_flight(&self) -> usize {
        self.held.lock().unwrap().len()
    }

    /// The next `infer_async` is rejected at launch
    pub fn fail_next_launch(&self) {
        self.fail_next_launch.store(true, Ordering::SeqCst);
    }

    fn fire(mut held: Held, result: Result<()>) {
        if result.is_ok() {
            held.request.output.copy_from_slice(&held.request.input);
        }
        (held.on_complete)(held.request, result);
    }

    /// Complete the launch at `index` (0 = oldest) successfully
    pub fn complete_index(&self, index: usize) {
        let held = self.held.lock().unwrap().remove(index);
        Self::fire(held, Ok(()));
    }

    /// Complete the oldest launch successfully
    pub fn complete_next(&self) {
        self.complete_index(0);
    }

    /// Complete everything currently in flight, newest first
    pub fn complete_all_reversed(&self) {
        loop {
            let held = {
                let mut guard = self.held.lock().unwrap();
                guard.pop()
            };
            match held {
                Some(held) => Self::fire(held, Ok(())),
                None => return,
            }
        }
    }

    /// Complete the oldest launch with an execution error
    pub fn fail_next_execution(&self) {
        let held = self.held.lock().unwrap().remove(0);
        Self::fire(
            held,
            Err(FrameflowError::Runtime("injected execution failure".to_string())),
        );
    }
}

pub struct ManualModel {
    input_desc: TensorDesc,
    output_desc: TensorDesc,
    controls: ManualControls,
}

impl RuntimeModel for ManualModel {
    type Request = ManualRequest;

    fn input_names(&self) -> Vec<String> {
        vec!["data".to_string()]
    }

    fn output_names(&self) -> Vec<String> {
        vec!["out".to_string()]
    }

    fn input_desc(&self, name: &str) -> Result<TensorDesc> {
        match name {
            "data" => Ok(self.input_desc),
            _ => Err(FrameflowError::InvalidArgument(format!(
                "unknown tensor '{}'",
                name
            ))),
        }
    }

    fn output_desc(&self, name: &str) -> Result<TensorDesc> {
        match name {
            "out" => Ok(self.output_desc),
            _ => Err(FrameflowError::InvalidArgument(format!(
                "unknown tensor '{}'",
                name
            ))),
        }
    }

    fn set_input_layout(&mut self, _name: &str, _layout: Layout) -> Result<()> {
        Ok(())
    }

    fn reshape_input_batch(&mut self, _name: &str, batch: usize) -> Result<()> {
        self.input_desc = self.input_desc.with_batch(batch);
        self.output_desc = self.output_desc.with_batch(batch);
        Ok(())
    }

    fn create_request(&self) -> Result<ManualRequest> {
        Ok(ManualRequest {
            input: vec![0u8; self.input_desc.total_bytes()],
            output: vec![0u8; self.output_desc.total_bytes()],
            input_desc: self.input_desc,
            output_desc: self.output_desc,
        })
    }

    fn input_tensor<'r>(&self, request: &'r mut ManualRequest, _name: &str) -> Result<TensorMut<'r>> {
        TensorMut::new(request.input_desc, &mut request.input)
    }

    fn output_tensor<'r>(&self, request: &'r ManualRequest, _name: &str) -> Result<Tensor<'r>> {
        Tensor::new(request.output_desc, &request.output)
    }

    fn infer(&self, request: &mut ManualRequest) -> Result<()> {
        let input = request.input.clone();
        request.output.copy_from_slice(&input);
        Ok(())
    }

    fn infer_async(
        &self,
        request: ManualRequest,
        on_complete: CompletionFn<ManualRequest>,
    ) -> std::result::Result<(), LaunchError<ManualRequest>> {
        if self.controls.fail_next_launch.swap(false, Ordering::SeqCst) {
            return Err(LaunchError::new(
                request,
                FrameflowError::Launch("injected launch failure".to_string()),
            ));
        }
        self.controls.held.lock().unwrap().push(Held {
            request,
            on_complete,
        });
        Ok(())
    }
}

/// Runtime producing manual models; keeps the control handle
#[derive(Default)]
pub struct ManualRuntime {
    controls: ManualControls,
}

impl ManualRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn controls(&self) -> ManualControls {
        self.controls.clone()
    }
}

impl InferenceRuntime for ManualRuntime {
    type Model = ManualModel;

    fn load_model(&self, _path: &Path, _device: &str) -> Result<ManualModel> {
        Ok(ManualModel {
            input_desc: frame_desc(),
            output_desc: frame_desc(),
            controls: self.controls.clone(),
        })
    }
}

/// Options wired for the manual runtime (model path is unused but validated)
pub fn manual_opts() -> InferenceOptions {
    InferenceOptions::default()
        .with_model_path("manual.model")
        .with_input_name("data")
        .with_output_name("out")
}
