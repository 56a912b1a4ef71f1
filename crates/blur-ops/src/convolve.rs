//! Separable Gaussian convolution over 8-bit buffers.
//!
//! The 2-D blur runs as two 1-D passes:
//!
//! ```text
//! source rows --horizontal--> scratch (packed u8) --vertical--> new buffer
//! ```
//!
//! which costs O(k) per pixel instead of O(k^2). Samples outside the image
//! are mirrored back in (see [`mirror_index`]), so edges neither darken nor
//! brighten. Every channel, alpha included, is filtered the same way.
//!
//! # Example
//!
//! ```rust
//! use blur_core::{Channels, PixelBuffer};
//! use blur_ops::convolve::{apply_blur, scratch_len, BlurQuality};
//!
//! let img = PixelBuffer::filled(16, 16, Channels::Rgba, &[200, 100, 50, 255]).unwrap();
//! let mut scratch = vec![0u8; scratch_len(16, 16)];
//! let out = apply_blur(&img, 3.0, BlurQuality::Full, &mut scratch).unwrap();
//!
//! // A flat image stays flat.
//! assert!(out.same_pixels(&img));
//! assert!(!out.ptr_eq(&img));
//! ```

use blur_core::PixelBuffer;
use tracing::{debug, trace};

use crate::kernel::Kernel;
use crate::{OpsError, OpsResult};

/// Extra bytes added to scratch buffers for alignment slack.
pub const SCRATCH_SLACK: usize = 64;

/// Scratch bytes needed for the worst-case (RGBA) image of the given size.
#[inline]
pub fn scratch_len(max_width: u32, max_height: u32) -> usize {
    max_width as usize * max_height as usize * 4 + SCRATCH_SLACK
}

/// Blur quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlurQuality {
    /// Full sigma.
    #[default]
    Full,
    /// Half sigma; a faster, lighter preview.
    Progressive,
}

impl BlurQuality {
    /// Sigma actually used for `sigma` at this quality.
    #[inline]
    pub fn effective_sigma(self, sigma: f64) -> f64 {
        match self {
            Self::Full => sigma,
            Self::Progressive => sigma * 0.5,
        }
    }

    /// Maps the boolean `progressive` flag used by callers.
    #[inline]
    pub fn from_progressive(progressive: bool) -> Self {
        if progressive { Self::Progressive } else { Self::Full }
    }
}

/// Reflects a coordinate into `[0, n)`.
///
/// `i < 0` maps to `-i` and `i >= n` maps to `2n - i - 1`. The reflection is
/// repeated while the result is still outside the range, which only happens
/// when the kernel is wider than the image.
#[inline]
pub fn mirror_index(i: isize, n: usize) -> usize {
    let n = n as isize;
    if n <= 1 {
        return 0;
    }
    let mut i = i;
    while i < 0 || i >= n {
        i = if i < 0 { -i } else { 2 * n - i - 1 };
    }
    i as usize
}

/// Applies a Gaussian blur with the given sigma.
///
/// `sigma <= 0` returns a handle to the source unchanged. Otherwise the
/// horizontal pass writes into `scratch`, which must hold at least
/// `width * height * channels` bytes, and the vertical pass writes a freshly
/// allocated, tightly packed result.
pub fn apply_blur(
    image: &PixelBuffer,
    sigma: f64,
    quality: BlurQuality,
    scratch: &mut [u8],
) -> OpsResult<PixelBuffer> {
    if sigma.is_nan() || sigma <= 0.0 {
        return Ok(image.clone());
    }

    let width = image.width() as usize;
    let height = image.height() as usize;
    let channels = image.channels().count();
    let needed = image.byte_len();

    if width == 0 || height == 0 {
        return Err(OpsError::InvalidDimensions(format!(
            "image must be non-empty, got {width}x{height}"
        )));
    }
    if scratch.len() < needed {
        return Err(OpsError::InvalidDimensions(format!(
            "scratch buffer has {} bytes, {width}x{height}x{channels} needs {needed}",
            scratch.len()
        )));
    }

    let effective = quality.effective_sigma(sigma);
    let kernel = Kernel::for_sigma(effective)?;
    trace!(width, height, channels, sigma = effective, taps = kernel.len(), "apply_blur");

    let tmp = &mut scratch[..needed];
    horizontal_pass(image, tmp, &kernel);

    let mut dst = vec![0u8; needed];
    vertical_pass(tmp, &mut dst, width, height, channels, &kernel);

    debug!(width, height, sigma = effective, ?quality, "Blur complete");
    PixelBuffer::from_vec(image.width(), image.height(), image.channels(), dst)
        .map_err(|e| OpsError::InvalidDimensions(e.to_string()))
}

/// Mirrored source index for every tap position `-radius..len + radius`.
fn mirror_table(len: usize, radius: usize) -> Vec<usize> {
    let r = radius as isize;
    (-r..len as isize + r).map(|i| mirror_index(i, len)).collect()
}

#[inline]
fn store(sum: f32) -> u8 {
    (sum + 0.5).clamp(0.0, 255.0) as u8
}

/// Blurs each source row into the packed `dst`.
fn horizontal_pass(src: &PixelBuffer, dst: &mut [u8], kernel: &Kernel) {
    let width = src.width() as usize;
    let channels = src.channels().count();
    let row_len = width * channels;
    let weights = kernel.weights();
    let table = mirror_table(width, kernel.radius());

    for (y, dst_row) in dst.chunks_exact_mut(row_len).enumerate() {
        let src_row = src.row(y as u32);
        for (x, out) in dst_row.chunks_exact_mut(channels).enumerate() {
            let mut acc = [0.0f32; 4];
            for (k, &w) in weights.iter().enumerate() {
                let sx = table[x + k];
                let px = &src_row[sx * channels..sx * channels + channels];
                for (a, &s) in acc.iter_mut().zip(px) {
                    *a += s as f32 * w;
                }
            }
            for (o, &a) in out.iter_mut().zip(&acc) {
                *o = store(a);
            }
        }
    }
}

/// Blurs columns of the packed `src` into the packed `dst`.
///
/// Works a row at a time, accumulating whole source rows so memory access
/// stays sequential.
fn vertical_pass(
    src: &[u8],
    dst: &mut [u8],
    width: usize,
    height: usize,
    channels: usize,
    kernel: &Kernel,
) {
    let row_len = width * channels;
    let weights = kernel.weights();
    let table = mirror_table(height, kernel.radius());
    let mut acc = vec![0.0f32; row_len];

    for (y, dst_row) in dst.chunks_exact_mut(row_len).enumerate() {
        acc.fill(0.0);
        for (k, &w) in weights.iter().enumerate() {
            let sy = table[y + k];
            let src_row = &src[sy * row_len..sy * row_len + row_len];
            for (a, &s) in acc.iter_mut().zip(src_row) {
                *a += s as f32 * w;
            }
        }
        for (d, &a) in dst_row.iter_mut().zip(&acc) {
            *d = store(a);
        }
    }
}
