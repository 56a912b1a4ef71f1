//! Kernel command
//!
//! Prints the Gaussian kernel the engine would use for an intensity.

use anyhow::{Result, bail};
use blur_engine::BlurQuality;
use blur_ops::{Kernel, MAX_INTENSITY, sigma_for_intensity};

use crate::KernelArgs;

pub fn run(args: KernelArgs) -> Result<()> {
    if !args.intensity.is_finite() || !(0.0..=MAX_INTENSITY).contains(&args.intensity) {
        bail!("Intensity must be within 0.0..={MAX_INTENSITY}, got {}", args.intensity);
    }

    let quality = BlurQuality::from_progressive(args.progressive);
    let sigma = quality.effective_sigma(sigma_for_intensity(args.intensity));
    if sigma <= 0.0 {
        println!("intensity {:.2}: identity (no blur)", args.intensity);
        return Ok(());
    }

    let kernel = Kernel::for_sigma(sigma)?;
    println!(
        "intensity {:.2}: sigma {:.3}, size {}, radius {}",
        args.intensity,
        kernel.sigma(),
        kernel.len(),
        kernel.radius()
    );

    if args.weights {
        for (i, w) in kernel.weights().iter().enumerate() {
            let offset = i as isize - kernel.radius() as isize;
            println!("  {:>4}  {:.6}", offset, w);
        }
        println!("  sum   {:.6}", kernel.sum());
    }
    Ok(())
}
