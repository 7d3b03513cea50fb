//! Benchmark utility for frameflow
//!
//! Streams synthetic frames through the scheduler on the bundled CPU
//! runtime and reports throughput.
//!
//! Usage: cargo run --release --bin benchmark

use std::time::Instant;

use frameflow::runtime::native::{ModelDescriptor, TensorSpec};
use frameflow::{DataType, InferenceOptions, InferenceScheduler, NativeRuntime, Poll};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("frameflow=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== frameflow benchmark ===\n");

    let frames = env_usize("BENCHMARK_FRAMES", 10_000);
    let batch_size = env_usize("BENCHMARK_BATCH_SIZE", 4);
    let nireq = env_usize("BENCHMARK_NIREQ", 8);
    let channels = env_usize("BENCHMARK_CHANNELS", 3);
    let height = env_usize("BENCHMARK_HEIGHT", 224);
    let width = env_usize("BENCHMARK_WIDTH", 224);

    println!("Benchmark configuration:");
    println!("  Frames: {}", frames);
    println!("  Batch size: {}", batch_size);
    println!("  Request pool: {}", nireq);
    println!("  Frame shape: {}x{}x{}", channels, height, width);
    println!();

    // The model is either supplied by the caller or a generated identity
    // descriptor matching the frame shape.
    let model_path = match std::env::var("FRAMEFLOW_MODEL") {
        Ok(path) => std::path::PathBuf::from(path),
        Err(_) => {
            let desc = ModelDescriptor {
                name: Some("benchmark-identity".to_string()),
                inputs: vec![TensorSpec {
                    name: "data".to_string(),
                    channels,
                    height,
                    width,
                    dtype: DataType::Uint8,
                }],
                outputs: vec![TensorSpec {
                    name: "out".to_string(),
                    channels,
                    height,
                    width,
                    dtype: DataType::Uint8,
                }],
            };
            let path = std::env::temp_dir().join(format!("frameflow-bench-{}.json", std::process::id()));
            let contents = match serde_json::to_vec_pretty(&desc) {
                Ok(contents) => contents,
                Err(e) => {
                    eprintln!("failed to serialize model descriptor: {}", e);
                    std::process::exit(1);
                }
            };
            if let Err(e) = std::fs::write(&path, contents) {
                eprintln!("failed to write model descriptor: {}", e);
                std::process::exit(1);
            }
            path
        }
    };

    let mut opts = InferenceOptions::default()
        .with_model_path(&model_path)
        .with_input_name("data")
        .with_output_name("out")
        .with_batch_size(batch_size)
        .with_nireq(nireq);
    opts.apply_env_overrides();

    let sched: InferenceScheduler<_, Vec<u8>> =
        match InferenceScheduler::open(&NativeRuntime::new(), opts) {
            Ok(sched) => sched,
            Err(e) => {
                eprintln!("failed to open scheduler: {}", e);
                std::process::exit(1);
            }
        };

    sched.set_pre_proc(|frame: &Vec<u8>, tensor| {
        let data = tensor.data();
        let n = frame.len().min(data.len());
        data[..n].copy_from_slice(&frame[..n]);
        Ok(())
    });
    sched.set_post_proc(|_frame, tensor| Ok(tensor.data().to_vec()));

    let frame_bytes = channels * height * width;
    let mut consumed = 0usize;
    let start = Instant::now();

    for i in 0..frames {
        let frame = vec![(i % 251) as u8; frame_bytes];
        if let Err(e) = sched.submit(frame) {
            eprintln!("submit failed at frame {}: {}", i, e);
            std::process::exit(1);
        }

        // Keep the ready list short while producing.
        loop {
            match sched.poll() {
                Ok(Poll::Ready(_)) => consumed += 1,
                Ok(_) => break,
                Err(e) => {
                    eprintln!("poll failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }

    if let Err(e) = sched.flush() {
        eprintln!("flush failed: {}", e);
        std::process::exit(1);
    }

    // Drain to end of stream.
    loop {
        match sched.poll() {
            Ok(Poll::Ready(_)) => consumed += 1,
            Ok(Poll::Empty) => break,
            Ok(Poll::NotReady) => std::thread::yield_now(),
            Err(e) => {
                eprintln!("poll failed during drain: {}", e);
                std::process::exit(1);
            }
        }
    }

    let elapsed = start.elapsed();
    let fps = consumed as f64 / elapsed.as_secs_f64();
    let snapshot = sched.metrics();

    if let Err(e) = sched.close() {
        eprintln!("close failed: {}", e);
        std::process::exit(1);
    }

    println!("Results:");
    println!("  Consumed: {} frames in {:.2?}", consumed, elapsed);
    println!("  Throughput: {:.1} frames/sec", fps);
    match serde_json::to_string_pretty(&snapshot) {
        Ok(json) => println!("  Metrics: {}", json),
        Err(_) => println!("  Metrics: {:?}", snapshot),
    }
}
