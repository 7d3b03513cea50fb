//! Asynchronous batching inference scheduler
//!
//! Routes frames from a single producer thread through pre-processing into
//! the current batch slot, launches full batches on the runtime, and hands
//! results back in submission order across out-of-order completions.
//!
//! Locking: the pool mutex and the tracker mutex are never held at the same
//! time. A completion callback takes the tracker mutex first, releases it,
//! and only then returns the slot to the pool.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::InferenceOptions;
use crate::metrics::{MetricsSnapshot, SchedulerMetrics};
use crate::runtime::{InferenceRuntime, LaunchError, ModelHandle, RuntimeModel};
use crate::scheduler::pool::{BatchSlot, SlotPool, SlotTicket};
use crate::scheduler::tracker::{OutputTracker, Poll};
use crate::tensor::{Tensor, TensorMut};
use crate::utils::error::{FrameflowError, Result};

/// Writes one frame into a single-frame input tensor view
pub type PreProcFn<T> = dyn Fn(&T, &mut TensorMut<'_>) -> Result<()> + Send + Sync;

/// Materializes an output frame from the input frame and a single-frame
/// output tensor view
pub type PostProcFn<T> = dyn Fn(&T, &Tensor<'_>) -> Result<T> + Send + Sync;

enum Mode<R, T> {
    /// Batched asynchronous execution over a bounded request pool
    Batched(SlotPool<R, T>),
    /// One-frame synchronous execution with a single reused request
    Sync(Mutex<Option<R>>),
}

struct Shared<M: RuntimeModel, T> {
    model: ModelHandle<M>,
    mode: Mode<M::Request, T>,
    batch_size: usize,
    /// Tickets of launched batches, keyed by slot id until completion
    in_flight: Mutex<HashMap<usize, Vec<SlotTicket<T>>>>,
    tracker: OutputTracker<T>,
    pre_proc: RwLock<Option<Arc<PreProcFn<T>>>>,
    post_proc: RwLock<Option<Arc<PostProcFn<T>>>>,
    metrics: SchedulerMetrics,
}

impl<M, T> Shared<M, T>
where
    M: RuntimeModel,
    T: Send + 'static,
{
    /// Runs on a runtime completion thread, once per launched batch.
    fn on_batch_complete(
        &self,
        slot_id: usize,
        request: M::Request,
        result: Result<()>,
    ) {
        let tickets = match self.in_flight.lock() {
            Ok(mut guard) => guard.remove(&slot_id).unwrap_or_default(),
            Err(_) => {
                warn!(slot = slot_id, "in-flight table mutex poisoned");
                Vec::new()
            }
        };
        let post = self.post_proc.read().ok().and_then(|g| g.clone());

        let mut results = Vec::with_capacity(tickets.len());
        match result {
            Ok(()) => {
                for (index, ticket) in tickets.into_iter().enumerate() {
                    let output = match post.as_deref() {
                        Some(post) => self
                            .model
                            .output_slice(&request, index)
                            .and_then(|slice| post(&ticket.frame, &slice)),
                        None => Err(FrameflowError::InvalidArgument(
                            "post-processing callback is not set".to_string(),
                        )),
                    };
                    match output {
                        Ok(frame) => results.push((ticket.seq, Some(frame))),
                        Err(e) => {
                            warn!(seq = ticket.seq, "post-processing failed: {}", e);
                            self.metrics.record_postproc_failure();
                            results.push((ticket.seq, None));
                        }
                    }
                }
            }
            Err(e) => {
                warn!(slot = slot_id, "batch execution failed: {}", e);
                for ticket in tickets {
                    results.push((ticket.seq, None));
                }
            }
        }

        if let Err(e) = self.tracker.complete_batch(results) {
            warn!(slot = slot_id, "completion tracking failed: {}", e);
        }

        // Tracker mutex is released; the slot can go back to the pool.
        if let Mode::Batched(pool) = &self.mode {
            if let Err(e) = pool.give(BatchSlot::new(slot_id, request)) {
                warn!(slot = slot_id, "failed to recycle slot: {}", e);
            }
        }
    }
}

/// Top-level streaming inference scheduler.
///
/// Generic over the runtime model capability and the pipeline's frame type.
/// `submit`/`flush` are meant for one logical producer thread; `poll` may be
/// called from anywhere. `submit` blocks only when every request is in
/// flight, which is the backpressure the pipeline sees.
pub struct InferenceScheduler<M: RuntimeModel, T: Send + 'static> {
    shared: Arc<Shared<M, T>>,
}

impl<M, T> InferenceScheduler<M, T>
where
    M: RuntimeModel,
    T: Send + 'static,
{
    /// Load the model, reshape it for batching, and allocate the request
    /// pool (`nireq` requests, or a single reused request in sync mode).
    pub fn open<R>(runtime: &R, opts: InferenceOptions) -> Result<Self>
    where
        R: InferenceRuntime<Model = M>,
    {
        opts.validate()?;
        let model = ModelHandle::open(runtime, &opts)?;

        let batch_size = if opts.async_exec { opts.batch_size } else { 1 };
        let mode = if opts.async_exec {
            let slots = model
                .create_requests(opts.nireq)?
                .into_iter()
                .enumerate()
                .map(|(id, request)| BatchSlot::new(id, request))
                .collect();
            Mode::Batched(SlotPool::new(slots))
        } else {
            let request = model.create_requests(1)?.pop();
            Mode::Sync(Mutex::new(request))
        };

        info!(
            nireq = opts.nireq,
            batch_size,
            async_exec = opts.async_exec,
            device = %opts.device,
            "inference scheduler opened"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                model,
                mode,
                batch_size,
                in_flight: Mutex::new(HashMap::new()),
                tracker: OutputTracker::new(),
                pre_proc: RwLock::new(None),
                post_proc: RwLock::new(None),
                metrics: SchedulerMetrics::new(),
            }),
        })
    }

    /// Register the frame-to-tensor callback used on submission.
    pub fn set_pre_proc<F>(&self, f: F)
    where
        F: Fn(&T, &mut TensorMut<'_>) -> Result<()> + Send + Sync + 'static,
    {
        if let Ok(mut guard) = self.shared.pre_proc.write() {
            *guard = Some(Arc::new(f));
        }
    }

    /// Register the tensor-to-frame callback used on completion.
    pub fn set_post_proc<F>(&self, f: F)
    where
        F: Fn(&T, &Tensor<'_>) -> Result<T> + Send + Sync + 'static,
    {
        if let Ok(mut guard) = self.shared.post_proc.write() {
            *guard = Some(Arc::new(f));
        }
    }

    /// Submit one frame.
    ///
    /// May block on the request pool when every request is in flight. On
    /// pre-processing failure the frame is dropped, nothing is queued, and
    /// the current batch keeps filling from the same slot.
    pub fn submit(&self, frame: T) -> Result<()> {
        let pre = self
            .shared
            .pre_proc
            .read()
            .map_err(|_| FrameflowError::Internal("pre-proc registry poisoned".to_string()))?
            .clone()
            .ok_or_else(|| {
                FrameflowError::InvalidArgument("pre-processing callback is not set".to_string())
            })?;

        match &self.shared.mode {
            Mode::Batched(pool) => self.submit_batched(pool, pre.as_ref(), frame),
            Mode::Sync(request) => self.submit_sync(request, pre.as_ref(), frame),
        }
    }

    fn submit_batched(
        &self,
        pool: &SlotPool<M::Request, T>,
        pre: &PreProcFn<T>,
        frame: T,
    ) -> Result<()> {
        let mut slot = pool.take()?;
        let index = slot.fill();

        let written = self
            .shared
            .model
            .input_slice(&mut slot.request, index)
            .and_then(|mut view| pre(&frame, &mut view).map_err(as_preproc));
        if let Err(e) = written {
            // Frame is dropped; the slot goes back unchanged as the current
            // fill target.
            pool.give_front(slot)?;
            if matches!(e, FrameflowError::PreProc(_)) {
                self.shared.metrics.record_preproc_failure();
                debug!("frame dropped by pre-processing: {}", e);
            }
            return Err(e);
        }

        let seq = match self.shared.tracker.register() {
            Ok(seq) => seq,
            Err(e) => {
                pool.give_front(slot)?;
                return Err(e);
            }
        };
        slot.tickets.push(SlotTicket { seq, frame });
        self.shared.metrics.record_submitted();

        if slot.fill() == self.shared.batch_size {
            self.launch(pool, slot)
        } else {
            pool.give_front(slot)
        }
    }

    fn submit_sync(
        &self,
        request: &Mutex<Option<M::Request>>,
        pre: &PreProcFn<T>,
        frame: T,
    ) -> Result<()> {
        let post = self
            .shared
            .post_proc
            .read()
            .map_err(|_| FrameflowError::Internal("post-proc registry poisoned".to_string()))?
            .clone()
            .ok_or_else(|| {
                FrameflowError::InvalidArgument("post-processing callback is not set".to_string())
            })?;

        let mut guard = request
            .lock()
            .map_err(|_| FrameflowError::Internal("sync request mutex poisoned".to_string()))?;
        let mut request = guard
            .take()
            .ok_or_else(|| FrameflowError::Internal("sync request missing".to_string()))?;

        let written = self
            .shared
            .model
            .input_slice(&mut request, 0)
            .and_then(|mut view| pre(&frame, &mut view).map_err(as_preproc));
        if let Err(e) = written {
            *guard = Some(request);
            if matches!(e, FrameflowError::PreProc(_)) {
                self.shared.metrics.record_preproc_failure();
            }
            return Err(e);
        }

        let seq = match self.shared.tracker.register() {
            Ok(seq) => seq,
            Err(e) => {
                *guard = Some(request);
                return Err(e);
            }
        };
        self.shared.metrics.record_submitted();

        if let Err(e) = self.shared.model.infer(&mut request) {
            *guard = Some(request);
            self.shared.tracker.complete_batch(vec![(seq, None)])?;
            return Err(FrameflowError::Runtime(e.to_string()));
        }

        let output = self
            .shared
            .model
            .output_slice(&request, 0)
            .and_then(|slice| post(&frame, &slice).map_err(as_postproc));
        *guard = Some(request);

        match output {
            Ok(out) => self.shared.tracker.complete_batch(vec![(seq, Some(out))]),
            Err(e) => {
                self.shared.metrics.record_postproc_failure();
                self.shared.tracker.complete_batch(vec![(seq, None)])?;
                Err(e)
            }
        }
    }

    /// Detach a filled (or flushed) slot and hand it to the runtime.
    fn launch(&self, pool: &SlotPool<M::Request, T>, slot: BatchSlot<M::Request, T>) -> Result<()> {
        let BatchSlot {
            id, request, tickets,
        } = slot;
        let fill = tickets.len();
        let batch_id = Uuid::new_v4();
        debug!(slot = id, fill, batch = %batch_id, "launching batch");

        {
            let mut in_flight = self
                .shared
                .in_flight
                .lock()
                .map_err(|_| FrameflowError::Internal("in-flight table poisoned".to_string()))?;
            in_flight.insert(id, tickets);
        }

        let shared = Arc::clone(&self.shared);
        let launched = self.shared.model.infer_async(
            request,
            Box::new(move |request, result| shared.on_batch_complete(id, request, result)),
        );

        match launched {
            Ok(()) => {
                self.shared
                    .metrics
                    .record_batch_launched(fill, self.shared.batch_size);
                Ok(())
            }
            Err(LaunchError { request, error }) => {
                warn!(slot = id, "async launch rejected: {}", error);
                self.shared.metrics.record_launch_failure();

                // Tickets must not be orphaned: publish them as gaps and
                // recycle the slot.
                let tickets = self
                    .shared
                    .in_flight
                    .lock()
                    .map_err(|_| FrameflowError::Internal("in-flight table poisoned".to_string()))?
                    .remove(&id)
                    .unwrap_or_default();
                let gaps = tickets.into_iter().map(|t| (t.seq, None)).collect();
                self.shared.tracker.complete_batch(gaps)?;
                pool.give(BatchSlot::new(id, request))?;
                Err(FrameflowError::Launch(error.to_string()))
            }
        }
    }

    /// Fetch the next output frame without blocking.
    pub fn poll(&self) -> Result<Poll<T>> {
        let polled = self.shared.tracker.poll()?;
        if matches!(polled, Poll::Ready(_)) {
            self.shared.metrics.record_consumed();
        }
        Ok(polled)
    }

    /// Launch whatever is currently accumulating, even under-filled.
    ///
    /// A no-op when nothing is accumulating or execution is synchronous.
    pub fn flush(&self) -> Result<()> {
        let pool = match &self.shared.mode {
            Mode::Batched(pool) => pool,
            Mode::Sync(_) => return Ok(()),
        };

        // The filling slot, when one exists, is at the pool front.
        let slot = match pool.try_take()? {
            Some(slot) => slot,
            None => return Ok(()),
        };
        if slot.tickets.is_empty() {
            return pool.give_front(slot);
        }

        debug!(fill = slot.fill(), "flushing partial batch");
        self.launch(pool, slot)
    }

    /// True when no frame is pending, in flight, or awaiting consumption.
    pub fn queue_empty(&self) -> Result<bool> {
        self.shared.tracker.is_empty()
    }

    /// Wait for in-flight requests to finish, then tear down.
    ///
    /// Frames still inside the scheduler that were never polled are lost;
    /// callers wanting them drain with `flush` + `poll` first.
    pub fn close(self) -> Result<()> {
        if let Mode::Batched(pool) = &self.shared.mode {
            pool.wait_idle()?;
        }
        let snap = self.shared.metrics.snapshot();
        info!(
            submitted = snap.submitted,
            consumed = snap.consumed,
            batches = snap.batches_launched,
            "inference scheduler closed"
        );
        Ok(())
    }

    /// Current counter values
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}

fn as_preproc(e: FrameflowError) -> FrameflowError {
    match e {
        FrameflowError::PreProc(_) => e,
        other => FrameflowError::PreProc(other.to_string()),
    }
}

fn as_postproc(e: FrameflowError) -> FrameflowError {
    match e {
        FrameflowError::PostProc(_) => e,
        other => FrameflowError::PostProc(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::native::{ModelDescriptor, NativeRuntime, TensorSpec};
    use crate::tensor::DataType;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn write_descriptor() -> std::path::PathBuf {
        static SEQ: AtomicU32 = AtomicU32::new(0);
        let desc = ModelDescriptor {
            name: Some("identity".to_string()),
            inputs: vec![TensorSpec {
                name: "data".to_string(),
                channels: 1,
                height: 2,
                width: 2,
                dtype: DataType::Uint8,
            }],
            outputs: vec![TensorSpec {
                name: "out".to_string(),
                channels: 1,
                height: 2,
                width: 2,
                dtype: DataType::Uint8,
            }],
        };
        let path = std::env::temp_dir().join(format!(
            "frameflow-engine-{}-{}.json",
            std::process::id(),
            SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::write(&path, serde_json::to_vec(&desc).unwrap()).unwrap();
        path
    }

    fn identity_callbacks(sched: &InferenceScheduler<crate::runtime::NativeModel, Vec<u8>>) {
        sched.set_pre_proc(|frame: &Vec<u8>, tensor| {
            tensor.data().copy_from_slice(frame);
            Ok(())
        });
        sched.set_post_proc(|_frame, tensor| Ok(tensor.data().to_vec()));
    }

    #[test]
    fn test_sync_mode_round_trip() {
        let path = write_descriptor();
        let opts = InferenceOptions::default()
            .with_model_path(&path)
            .with_input_name("data")
            .with_output_name("out")
            .with_async(false);
        let sched: InferenceScheduler<_, Vec<u8>> =
            InferenceScheduler::open(&NativeRuntime::new(), opts).unwrap();
        identity_callbacks(&sched);

        sched.submit(vec![1, 2, 3, 4]).unwrap();
        assert_eq!(sched.poll().unwrap(), Poll::Ready(vec![1, 2, 3, 4]));
        assert_eq!(sched.poll().unwrap(), Poll::Empty);
        assert!(sched.flush().is_ok());
        sched.close().unwrap();
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_submit_without_preproc_rejected() {
        let path = write_descriptor();
        let opts = InferenceOptions::default()
            .with_model_path(&path)
            .with_input_name("data")
            .with_output_name("out");
        let sched: InferenceScheduler<_, Vec<u8>> =
            InferenceScheduler::open(&NativeRuntime::new(), opts).unwrap();

        let err = sched.submit(vec![0; 4]).unwrap_err();
        assert!(matches!(err, FrameflowError::InvalidArgument(_)));
        sched.close().unwrap();
        std::fs::remove_file(path).ok();
    }
}
