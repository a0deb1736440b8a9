//! Adapter throughput benchmark: pack, run, decode.
//!
//! Times a full `evaluate_batch` round trip per batch size. With the
//! uniform provider this measures adapter overhead alone.
//!
//! Usage:
//!   # no network
//!   cargo run --release -p nnbridge-backends --bin bench_decode -- --width 19 --height 19
//!
//!   # ONNX Runtime
//!   cargo run --release -p nnbridge-backends --features onnx --bin bench_decode -- \
//!       --device onnx --model model.onnx
//!
//! Set `RUST_LOG=debug` to see per-call predict times.

use nnbridge_core::{
    evaluate_batch, Accelerator, BatchBufferSet, ComputeContext, ComputeOptions, ContextConfig,
    InferenceHandle, InferenceProvider, ModelDescriptor, StructuredOutput, UniformProvider,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Instant;

struct Args {
    width: usize,
    height: usize,
    max_batch: usize,
    iters: usize,
    version: u32,
    device: String,
    model: Option<String>,
    accelerator: Accelerator,
    ownership: bool,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args {
        width: 19,
        height: 19,
        max_batch: 256,
        iters: 200,
        version: nnbridge_core::DEFAULT_MODEL_VERSION,
        device: "uniform".to_string(),
        model: None,
        accelerator: Accelerator::Cpu,
        ownership: false,
    };
    let mut i = 1;
    while i < args.len() {
        let value = || args.get(i + 1).unwrap_or_else(|| panic!("{} needs a value", args[i]));
        match args[i].as_str() {
            "--width" => parsed.width = value().parse().expect("invalid width"),
            "--height" => parsed.height = value().parse().expect("invalid height"),
            "--max-batch" => parsed.max_batch = value().parse().expect("invalid max-batch"),
            "--iters" => parsed.iters = value().parse().expect("invalid iters"),
            "--version" => parsed.version = value().parse().expect("invalid version"),
            "--device" => parsed.device = value().clone(),
            "--model" => parsed.model = Some(value().clone()),
            "--accelerator" => parsed.accelerator = value().parse().expect("invalid accelerator"),
            "--ownership" => {
                parsed.ownership = true;
                i += 1;
                continue;
            }
            other => panic!("unknown arg: {other}"),
        }
        i += 2;
    }
    parsed
}

fn main() {
    env_logger::init();
    let args = parse_args();

    let model = ModelDescriptor::for_version("bench", args.version).unwrap_or_else(|e| {
        eprintln!("{e}");
        std::process::exit(1);
    });
    let context = ComputeContext::new(ContextConfig {
        accelerator: args.accelerator,
    });
    let handle = InferenceHandle::create(
        &context,
        Arc::new(model),
        args.max_batch,
        args.width,
        args.height,
        ComputeOptions {
            inputs_use_nhwc: true,
            ..Default::default()
        },
    );

    let mut provider: Box<dyn InferenceProvider> = match args.device.as_str() {
        "uniform" => Box::new(UniformProvider::new(&handle)),
        #[cfg(feature = "onnx")]
        "onnx" => {
            let path = args.model.as_deref().unwrap_or_else(|| {
                eprintln!("--device onnx needs --model <path>");
                std::process::exit(1);
            });
            match nnbridge_backends::GraphBackend::new(&context, &handle, path) {
                Ok(backend) => Box::new(backend),
                Err(e) => {
                    eprintln!("{e}");
                    std::process::exit(1);
                }
            }
        }
        other => {
            let mut supported = vec!["uniform"];
            if cfg!(feature = "onnx") {
                supported.push("onnx");
            }
            eprintln!("Device '{other}' not available. Compiled with support for: {supported:?}");
            std::process::exit(1);
        }
    };
    if args.model.is_some() && args.device == "uniform" {
        eprintln!("--model ignored with the uniform device");
    }

    let mut buffers = handle.allocate_buffers();
    fill_random(&mut buffers, args.max_batch);
    let mut outputs = StructuredOutput::batch_for(&handle, args.ownership);

    println!(
        "Adapter throughput: {}x{}, version {}, device={}, ownership={}",
        args.width,
        args.height,
        args.version,
        provider.name(),
        args.ownership
    );
    println!("  {:>6} {:>12} {:>12}", "batch", "call_µs", "rows/s");
    println!("  {:-<34}", "");

    let mut batch_size = 1;
    while batch_size <= args.max_batch {
        let mut run = || {
            if let Err(e) =
                evaluate_batch(provider.as_mut(), &handle, &buffers, batch_size, &mut outputs)
            {
                eprintln!("batch {batch_size}: {e}");
                std::process::exit(1);
            }
        };

        // warmup
        run();

        let t0 = Instant::now();
        for _ in 0..args.iters {
            run();
        }
        let per_call = t0.elapsed().as_secs_f64() / args.iters as f64;
        println!(
            "  {:>6} {:>12.1} {:>12}",
            batch_size,
            per_call * 1e6,
            format_throughput(batch_size as f64 / per_call)
        );
        batch_size *= 2;
    }
}

fn fill_random(buffers: &mut BatchBufferSet, rows: usize) {
    let mut rng = SmallRng::seed_from_u64(42);
    for row in 0..rows {
        for v in buffers.spatial_row_mut(row) {
            *v = if rng.gen_bool(0.3) { 1.0 } else { 0.0 };
        }
        for v in buffers.global_row_mut(row) {
            *v = rng.gen_range(-1.0..1.0);
        }
    }
    let flags: [bool; 3] = rng.gen();
    *buffers.symmetries_mut() = flags;
}

fn format_throughput(per_sec: f64) -> String {
    if per_sec >= 1_000_000.0 {
        format!("{:.2}M", per_sec / 1_000_000.0)
    } else if per_sec >= 1_000.0 {
        format!("{:.1}k", per_sec / 1_000.0)
    } else {
        format!("{:.0}", per_sec)
    }
}
