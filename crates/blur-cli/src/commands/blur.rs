//! Blur command
//!
//! Runs one request through the processor and waits on the completion
//! queue from the main thread.

use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use blur_engine::{BlurQuality, EngineConfig, Processor};
use tracing::{info, trace};

use crate::BlurArgs;

pub fn run(args: BlurArgs, config: &EngineConfig, verbose: u8) -> Result<()> {
    trace!(input = %args.input.display(), intensity = args.intensity, "blur::run");

    let image = super::load_image(&args.input)?;
    let quality = if args.progressive {
        BlurQuality::Progressive
    } else {
        config.blur_quality()
    };

    let processor = Processor::with_config(&config.processor).context("Cannot start processor")?;
    info!(
        threads = processor.thread_count(),
        intensity = args.intensity,
        ?quality,
        "Submitting blur"
    );
    if verbose > 0 {
        println!(
            "Blurring {} ({}x{}) at intensity {:.1}",
            args.input.display(),
            image.width(),
            image.height(),
            args.intensity
        );
    }

    let (tx, rx) = mpsc::channel();
    let started = Instant::now();
    let id = processor.submit(&image, args.intensity, quality, move |result| {
        let _ = tx.send(result);
    });
    trace!(id, "Submitted");

    let deadline = started + Duration::from_secs(args.timeout);
    let result = loop {
        if let Ok(result) = rx.try_recv() {
            break result;
        }
        let now = Instant::now();
        if now >= deadline {
            processor.cancel(id);
            bail!("Blur timed out after {}s", args.timeout);
        }
        processor.dispatch_timeout((deadline - now).min(Duration::from_millis(100)));
    };
    let blurred = result.context("Blur failed")?;
    let elapsed = started.elapsed();

    super::save_image(&args.output, &blurred)?;
    processor.destroy();

    info!(elapsed_ms = elapsed.as_millis() as u64, output = %args.output.display(), "Blur done");
    if verbose > 0 {
        println!("Done in {:.1} ms -> {}", elapsed.as_secs_f64() * 1000.0, args.output.display());
    }
    Ok(())
}
