//! # blur-ops
//!
//! Gaussian blur primitives for the blurkit engine.
//!
//! # Modules
//!
//! - [`kernel`] - intensity to sigma mapping and 1-D Gaussian kernels
//! - [`convolve`] - separable two-pass convolution with mirrored edges
//!
//! # Example
//!
//! ```rust
//! use blur_core::{Channels, PixelBuffer};
//! use blur_ops::{apply_blur, scratch_len, sigma_for_intensity, BlurQuality};
//!
//! let img = PixelBuffer::new(64, 48, Channels::Rgb);
//! let mut scratch = vec![0u8; scratch_len(64, 48)];
//!
//! let sigma = sigma_for_intensity(1.5);
//! let out = apply_blur(&img, sigma, BlurQuality::Full, &mut scratch).unwrap();
//! assert_eq!(out.dimensions(), (64, 48));
//! ```
//!
//! The functions here are synchronous and single-threaded. Scheduling,
//! cancellation and scratch ownership live in `blur-engine`.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod error;
pub mod convolve;
pub mod kernel;

pub use convolve::{apply_blur, mirror_index, scratch_len, BlurQuality, SCRATCH_SLACK};
pub use error::{OpsError, OpsResult};
pub use kernel::{kernel_size, sigma_for_intensity, Kernel, MAX_INTENSITY};
