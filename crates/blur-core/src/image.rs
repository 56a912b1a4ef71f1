//! Shared 8-bit pixel buffers.
//!
//! [`PixelBuffer`] is the only image type the engine deals with: 8-bit
//! samples, 3 (RGB) or 4 (RGBA) interleaved channels, row-major with a row
//! stride that may include padding.
//!
//! # Memory Layout
//!
//! ```text
//! Memory: [R G B R G B ... pad]  <- Row 0 (stride bytes)
//!         [R G B R G B ... pad]  <- Row 1
//!         ...
//! ```
//!
//! # Sharing
//!
//! Pixel storage lives in an [`Arc<Vec<u8>>`]. Cloning a buffer is a cheap
//! handle copy and never duplicates pixels, which is how a source image is
//! handed to a worker thread and how cached results are returned to callers.
//! Buffers are immutable after construction; operations always produce new
//! buffers.
//!
//! # Example
//!
//! ```rust
//! use blur_core::{Channels, PixelBuffer};
//!
//! let data = vec![255u8; 4 * 2 * 3];
//! let img = PixelBuffer::from_vec(4, 2, Channels::Rgb, data).unwrap();
//! assert_eq!(img.pixel(3, 1), &[255, 255, 255]);
//!
//! let shared = img.clone();
//! assert!(shared.ptr_eq(&img));
//! ```

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Largest width or height the engine accepts.
pub const MAX_IMAGE_DIMENSION: u32 = 8192;

/// Interleaved channel layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channels {
    /// Red, green, blue.
    Rgb,
    /// Red, green, blue, alpha.
    Rgba,
}

impl Channels {
    /// Number of samples per pixel.
    #[inline]
    pub const fn count(self) -> usize {
        match self {
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }

    /// Maps a raw channel count to a layout.
    pub fn from_count(count: usize) -> Result<Self> {
        match count {
            3 => Ok(Self::Rgb),
            4 => Ok(Self::Rgba),
            n => Err(Error::InvalidImage(format!(
                "unsupported channel count {n} (expected 3 or 4)"
            ))),
        }
    }

    /// True if the layout carries alpha.
    #[inline]
    pub const fn has_alpha(self) -> bool {
        matches!(self, Self::Rgba)
    }
}

/// Immutable, shareable 8-bit image.
#[derive(Clone)]
pub struct PixelBuffer {
    /// Pixel storage (Arc for cheap cloning)
    data: Arc<Vec<u8>>,
    width: u32,
    height: u32,
    channels: Channels,
    /// Bytes per row, >= width * channels
    stride: usize,
}

impl PixelBuffer {
    /// Creates a zero-filled, tightly packed buffer.
    pub fn new(width: u32, height: u32, channels: Channels) -> Self {
        let stride = width as usize * channels.count();
        Self {
            data: Arc::new(vec![0u8; stride * height as usize]),
            width,
            height,
            channels,
            stride,
        }
    }

    /// Creates a buffer filled with a single pixel value.
    ///
    /// `pixel` must have exactly `channels.count()` samples.
    pub fn filled(width: u32, height: u32, channels: Channels, pixel: &[u8]) -> Result<Self> {
        if pixel.len() != channels.count() {
            return Err(Error::InvalidImage(format!(
                "fill pixel has {} samples, layout needs {}",
                pixel.len(),
                channels.count()
            )));
        }
        let data = pixel
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * channels.count())
            .collect();
        Self::from_vec(width, height, channels, data)
    }

    /// Wraps tightly packed pixel data (stride = width * channels).
    pub fn from_vec(width: u32, height: u32, channels: Channels, data: Vec<u8>) -> Result<Self> {
        let stride = width as usize * channels.count();
        Self::from_vec_with_stride(width, height, channels, stride, data)
    }

    /// Wraps pixel data whose rows are `stride` bytes apart.
    ///
    /// The last row only needs `width * channels` bytes, matching how
    /// decoders commonly trim the final row's padding.
    pub fn from_vec_with_stride(
        width: u32,
        height: u32,
        channels: Channels,
        stride: usize,
        data: Vec<u8>,
    ) -> Result<Self> {
        let buf = Self {
            data: Arc::new(data),
            width,
            height,
            channels,
            stride,
        };
        buf.check_layout()?;
        Ok(buf)
    }

    /// Image width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns (width, height).
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Channel layout.
    #[inline]
    pub fn channels(&self) -> Channels {
        self.channels
    }

    /// Bytes between the starts of consecutive rows.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Visible bytes per row (`width * channels`).
    #[inline]
    pub fn row_len(&self) -> usize {
        self.width as usize * self.channels.count()
    }

    /// Visible pixel bytes: `width * height * channels`.
    ///
    /// Stride padding is not counted.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.row_len() * self.height as usize
    }

    /// True if rows are stored without padding.
    #[inline]
    pub fn is_packed(&self) -> bool {
        self.stride == self.row_len()
    }

    /// Raw storage including any stride padding.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Visible samples of row `y`.
    ///
    /// # Panics
    ///
    /// Panics if `y >= height`.
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.row_len()]
    }

    /// Samples of the pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of bounds.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let c = self.channels.count();
        let start = x as usize * c;
        &self.row(y)[start..start + c]
    }

    /// Copies the visible pixels into a tightly packed vector.
    pub fn to_packed(&self) -> Vec<u8> {
        if self.is_packed() {
            return self.data[..self.byte_len()].to_vec();
        }
        let mut out = Vec::with_capacity(self.byte_len());
        for y in 0..self.height {
            out.extend_from_slice(self.row(y));
        }
        out
    }

    /// True if both handles share the same pixel storage.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// True if both buffers have the same dimensions, layout and visible pixels.
    pub fn same_pixels(&self, other: &Self) -> bool {
        if self.dimensions() != other.dimensions() || self.channels != other.channels {
            return false;
        }
        (0..self.height).all(|y| self.row(y) == other.row(y))
    }

    /// Checks the buffer against the engine's input contract.
    ///
    /// Dimensions must be positive and at most [`MAX_IMAGE_DIMENSION`], and the
    /// storage must hold every visible row at the declared stride.
    pub fn validate(&self) -> Result<()> {
        if self.width > MAX_IMAGE_DIMENSION || self.height > MAX_IMAGE_DIMENSION {
            return Err(Error::InvalidImage(format!(
                "{}x{} exceeds the {MAX_IMAGE_DIMENSION} pixel limit",
                self.width, self.height
            )));
        }
        self.check_layout()
    }

    fn check_layout(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidImage(format!(
                "dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        let row_len = self.row_len();
        if self.stride < row_len {
            return Err(Error::InvalidImage(format!(
                "stride {} is less than row length {row_len}",
                self.stride
            )));
        }
        let required = (self.height as usize - 1)
            .checked_mul(self.stride)
            .and_then(|v| v.checked_add(row_len))
            .ok_or_else(|| Error::InvalidImage("buffer size overflows".into()))?;
        if self.data.len() < required {
            return Err(Error::InvalidImage(format!(
                "pixel data has {} bytes, {}x{} at stride {} needs {required}",
                self.data.len(),
                self.width,
                self.height,
                self.stride
            )));
        }
        Ok(())
    }

    /// Content identity string, e.g. `img_3fa94c0b12d7e881`.
    ///
    /// Derived from the dimensions, layout and visible pixels, so two buffers
    /// with identical content share a fingerprint regardless of stride. Used
    /// as the cache key prefix for blur results of this image.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.width.to_le_bytes());
        hasher.update(self.height.to_le_bytes());
        hasher.update([self.channels.count() as u8]);
        for y in 0..self.height {
            hasher.update(self.row(y));
        }
        let digest = hasher.finalize();
        let hex: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
        format!("img_{hex}")
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("stride", &self.stride)
            .field("bytes", &self.data.len())
            .finish()
    }
}
