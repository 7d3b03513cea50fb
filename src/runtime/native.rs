//! Bundled CPU runtime
//!
//! Loads a JSON model descriptor (tensor names, shapes, dtypes) and executes
//! requests on a small worker-thread pool. The compute is a batched identity
//! copy from the first input to every output, which is what wiring tests and
//! the benchmark driver need; a real accelerator backend implements the same
//! traits against its own device API.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::runtime::{CompletionFn, InferenceRuntime, LaunchError, Layout, RuntimeModel};
use crate::tensor::{DataType, Tensor, TensorDesc, TensorMut};
use crate::utils::error::{FrameflowError, Result};

/// Upper bound on execution worker threads
const MAX_WORKERS: usize = 8;

/// Shape and dtype of one named tensor in a model descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorSpec {
    pub name: String,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub dtype: DataType,
}

impl TensorSpec {
    fn to_desc(&self) -> TensorDesc {
        TensorDesc {
            batch: 1,
            channels: self.channels,
            height: self.height,
            width: self.width,
            dtype: self.dtype,
        }
    }
}

/// On-disk model format consumed by the CPU runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    pub inputs: Vec<TensorSpec>,
    pub outputs: Vec<TensorSpec>,
}

impl ModelDescriptor {
    fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() || self.outputs.is_empty() {
            return Err(FrameflowError::ModelLoad(
                "descriptor must declare at least one input and one output".to_string(),
            ));
        }
        for spec in self.inputs.iter().chain(self.outputs.iter()) {
            if spec.channels == 0 || spec.height == 0 || spec.width == 0 {
                return Err(FrameflowError::ModelLoad(format!(
                    "tensor '{}' has a zero dimension",
                    spec.name
                )));
            }
        }
        Ok(())
    }
}

/// A reusable request with host-side input/output buffers
pub struct NativeRequest {
    inputs: Vec<(String, TensorDesc, Vec<u8>)>,
    outputs: Vec<(String, TensorDesc, Vec<u8>)>,
}

fn run_identity(request: &mut NativeRequest) -> Result<()> {
    let src = match request.inputs.first() {
        Some((_, _, buf)) => buf,
        None => {
            return Err(FrameflowError::Runtime(
                "request has no input buffer".to_string(),
            ))
        }
    };

    for (_, _, out) in request.outputs.iter_mut() {
        let n = src.len().min(out.len());
        out[..n].copy_from_slice(&src[..n]);
        out[n..].fill(0);
    }
    Ok(())
}

struct Job {
    request: NativeRequest,
    on_complete: CompletionFn<NativeRequest>,
}

/// Fixed-size execution thread pool.
///
/// Threads exit when the sender is dropped; they are detached rather than
/// joined so a model may be dropped from one of its own completion callbacks.
#[derive(Debug)]
struct WorkerPool {
    tx: Mutex<Option<Sender<Job>>>,
}

impl WorkerPool {
    fn new(workers: usize) -> Self {
        let (tx, rx) = channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));

        for _ in 0..workers {
            let rx = Arc::clone(&rx);
            thread::spawn(move || Self::worker_loop(rx));
        }

        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    fn worker_loop(rx: Arc<Mutex<Receiver<Job>>>) {
        loop {
            let job = match rx.lock() {
                Ok(guard) => guard.recv(),
                Err(_) => return,
            };
            match job {
                Ok(mut job) => {
                    let result = run_identity(&mut job.request);
                    (job.on_complete)(job.request, result);
                }
                Err(_) => return,
            }
        }
    }

    fn submit(&self, job: Job) -> std::result::Result<(), Job> {
        let guard = match self.tx.lock() {
            Ok(guard) => guard,
            Err(_) => return Err(job),
        };
        match guard.as_ref() {
            Some(tx) => tx.send(job).map_err(|e| e.0),
            None => Err(job),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }
    }
}

/// CPU model: descriptor metadata plus an execution thread pool
#[derive(Debug)]
pub struct NativeModel {
    inputs: Vec<(String, TensorDesc)>,
    outputs: Vec<(String, TensorDesc)>,
    layouts: HashMap<String, Layout>,
    workers: WorkerPool,
    requests_created: AtomicBool,
}

impl NativeModel {
    /// Build a model directly from a parsed descriptor.
    pub fn from_descriptor(desc: ModelDescriptor) -> Result<Self> {
        desc.validate()?;

        let workers = num_cpus::get().clamp(2, MAX_WORKERS);
        debug!(
            workers,
            model = desc.name.as_deref().unwrap_or("unnamed"),
            "creating native model"
        );

        Ok(Self {
            inputs: desc.inputs.iter().map(|s| (s.name.clone(), s.to_desc())).collect(),
            outputs: desc.outputs.iter().map(|s| (s.name.clone(), s.to_desc())).collect(),
            layouts: HashMap::new(),
            workers: WorkerPool::new(workers),
            requests_created: AtomicBool::new(false),
        })
    }

    fn find(list: &[(String, TensorDesc)], name: &str) -> Result<TensorDesc> {
        list.iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| *d)
            .ok_or_else(|| FrameflowError::InvalidArgument(format!("unknown tensor '{}'", name)))
    }
}

impl RuntimeModel for NativeModel {
    type Request = NativeRequest;

    fn input_names(&self) -> Vec<String> {
        self.inputs.iter().map(|(n, _)| n.clone()).collect()
    }

    fn output_names(&self) -> Vec<String> {
        self.outputs.iter().map(|(n, _)| n.clone()).collect()
    }

    fn input_desc(&self, name: &str) -> Result<TensorDesc> {
        Self::find(&self.inputs, name)
    }

    fn output_desc(&self, name: &str) -> Result<TensorDesc> {
        Self::find(&self.outputs, name)
    }

    fn set_input_layout(&mut self, name: &str, layout: Layout) -> Result<()> {
        Self::find(&self.inputs, name)?;
        self.layouts.insert(name.to_string(), layout);
        Ok(())
    }

    fn reshape_input_batch(&mut self, name: &str, batch: usize) -> Result<()> {
        if batch == 0 {
            return Err(FrameflowError::InvalidArgument(
                "batch dimension must be at least 1".to_string(),
            ));
        }
        if self.requests_created.load(Ordering::Acquire) {
            return Err(FrameflowError::InvalidArgument(
                "cannot reshape after requests were created".to_string(),
            ));
        }
        Self::find(&self.inputs, name)?;

        for (n, desc) in self.inputs.iter_mut() {
            if n == name {
                *desc = desc.with_batch(batch);
            }
        }
        // Outputs follow the network's batch dimension.
        for (_, desc) in self.outputs.iter_mut() {
            *desc = desc.with_batch(batch);
        }
        Ok(())
    }

    fn create_request(&self) -> Result<NativeRequest> {
        self.requests_created.store(true, Ordering::Release);
        Ok(NativeRequest {
            inputs: self
                .inputs
                .iter()
                .map(|(n, d)| (n.clone(), *d, vec![0u8; d.total_bytes()]))
                .collect(),
            outputs: self
                .outputs
                .iter()
                .map(|(n, d)| (n.clone(), *d, vec![0u8; d.total_bytes()]))
                .collect(),
        })
    }

    fn input_tensor<'r>(&self, request: &'r mut NativeRequest, name: &str) -> Result<TensorMut<'r>> {
        let (_, desc, buf) = request
            .inputs
            .iter_mut()
            .find(|(n, _, _)| n == name)
            .ok_or_else(|| FrameflowError::InvalidArgument(format!("unknown input '{}'", name)))?;
        TensorMut::new(*desc, buf)
    }

    fn output_tensor<'r>(&self, request: &'r NativeRequest, name: &str) -> Result<Tensor<'r>> {
        let (_, desc, buf) = request
            .outputs
            .iter()
            .find(|(n, _, _)| n == name)
            .ok_or_else(|| FrameflowError::InvalidArgument(format!("unknown output '{}'", name)))?;
        Tensor::new(*desc, buf)
    }

    fn infer(&self, request: &mut NativeRequest) -> Result<()> {
        run_identity(request)
    }

    fn infer_async(
        &self,
        request: NativeRequest,
        on_complete: CompletionFn<NativeRequest>,
    ) -> std::result::Result<(), LaunchError<NativeRequest>> {
        let job = Job {
            request,
            on_complete,
        };
        self.workers.submit(job).map_err(|job| {
            LaunchError::new(
                job.request,
                FrameflowError::Launch("execution workers are shut down".to_string()),
            )
        })
    }
}

/// CPU runtime backend
#[derive(Debug, Default)]
pub struct NativeRuntime;

impl NativeRuntime {
    pub fn new() -> Self {
        Self
    }
}

impl InferenceRuntime for NativeRuntime {
    type Model = NativeModel;

    fn load_model(&self, path: &Path, device: &str) -> Result<NativeModel> {
        if !device.eq_ignore_ascii_case("cpu") {
            return Err(FrameflowError::Config(format!(
                "native runtime only supports device CPU, got '{}'",
                device
            )));
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            FrameflowError::ModelLoad(format!("cannot read '{}': {}", path.display(), e))
        })?;
        let desc: ModelDescriptor = serde_json::from_str(&contents).map_err(|e| {
            FrameflowError::ModelLoad(format!("invalid descriptor '{}': {}", path.display(), e))
        })?;

        info!(
            model = desc.name.as_deref().unwrap_or("unnamed"),
            path = %path.display(),
            "loaded model descriptor"
        );
        NativeModel::from_descriptor(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::mpsc;

    fn descriptor() -> ModelDescriptor {
        ModelDescriptor {
            name: Some("identity".to_string()),
            inputs: vec![TensorSpec {
                name: "data".to_string(),
                channels: 3,
                height: 2,
                width: 2,
                dtype: DataType::Uint8,
            }],
            outputs: vec![TensorSpec {
                name: "out".to_string(),
                channels: 3,
                height: 2,
                width: 2,
                dtype: DataType::Uint8,
            }],
        }
    }

    fn temp_descriptor_file(desc: &ModelDescriptor) -> std::path::PathBuf {
        static SEQ: AtomicU32 = AtomicU32::new(0);
        let path = std::env::temp_dir().join(format!(
            "frameflow-native-{}-{}.json",
            std::process::id(),
            SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::write(&path, serde_json::to_vec(desc).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_load_model_from_file() {
        let path = temp_descriptor_file(&descriptor());
        let model = NativeRuntime::new().load_model(&path, "CPU").unwrap();
        assert_eq!(model.input_names(), vec!["data".to_string()]);
        assert_eq!(model.output_names(), vec!["out".to_string()]);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = NativeRuntime::new()
            .load_model(Path::new("/nonexistent/model.json"), "CPU")
            .unwrap_err();
        assert!(matches!(err, FrameflowError::ModelLoad(_)));
    }

    #[test]
    fn test_unknown_device_rejected() {
        let path = temp_descriptor_file(&descriptor());
        let err = NativeRuntime::new().load_model(&path, "TPU").unwrap_err();
        assert!(matches!(err, FrameflowError::Config(_)));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_reshape_then_identity_infer() {
        let mut model = NativeModel::from_descriptor(descriptor()).unwrap();
        model.reshape_input_batch("data", 2).unwrap();
        assert_eq!(model.input_desc("data").unwrap().batch, 2);
        assert_eq!(model.output_desc("out").unwrap().batch, 2);

        let mut request = model.create_request().unwrap();
        let payload: Vec<u8> = (0..24).collect();
        model
            .input_tensor(&mut request, "data")
            .unwrap()
            .data()
            .copy_from_slice(&payload);

        model.infer(&mut request).unwrap();
        assert_eq!(model.output_tensor(&request, "out").unwrap().data(), &payload[..]);
    }

    #[test]
    fn test_reshape_after_create_request_fails() {
        let mut model = NativeModel::from_descriptor(descriptor()).unwrap();
        let _request = model.create_request().unwrap();
        assert!(model.reshape_input_batch("data", 2).is_err());
    }

    #[test]
    fn test_async_completion_fires() {
        let model = NativeModel::from_descriptor(descriptor()).unwrap();
        let mut request = model.create_request().unwrap();
        let payload: Vec<u8> = (100..112).collect();
        model
            .input_tensor(&mut request, "data")
            .unwrap()
            .data()
            .copy_from_slice(&payload);

        let (tx, rx) = mpsc::channel();
        model
            .infer_async(
                request,
                Box::new(move |request, result| {
                    tx.send((request, result.is_ok())).unwrap();
                }),
            )
            .map_err(|e| e.error)
            .unwrap();

        let (request, ok) = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert!(ok);
        assert_eq!(model.output_tensor(&request, "out").unwrap().data(), &payload[..]);
    }
}
