//! # blur-core
//!
//! Core types shared by every blurkit crate.
//!
//! - [`PixelBuffer`] - shared, immutable 8-bit RGB/RGBA image
//! - [`Channels`] - interleaved channel layout
//! - [`Error`], [`ErrorKind`], [`Result`] - engine-wide error handling
//! - [`MAX_IMAGE_DIMENSION`] - input size cap
//!
//! ## Crate Structure
//!
//! ```text
//! blur-core (this crate)
//!    ^
//!    +-- blur-ops    (kernel + separable convolution)
//!    +-- blur-cache  (LRU result cache)
//!    +-- blur-engine (worker pool, completion dispatch, debounce)
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod image;

pub use error::{Error, ErrorKind, Result};
pub use image::{Channels, PixelBuffer, MAX_IMAGE_DIMENSION};
