//! 1-D Gaussian kernels.
//!
//! Maps a user-facing blur intensity to a Gaussian standard deviation and
//! builds the normalized 1-D kernel used by both passes of the separable
//! convolution.
//!
//! # Formulas
//!
//! | Quantity | Formula | Range |
//! |----------|---------|-------|
//! | sigma | `clamp(intensity, 0, 10) * 2` | `[0, 20]` |
//! | size | `2 * ceil(3 * sigma) + 1`, odd | `[3, 121]` |
//! | weight(i) | `exp(-(i - size/2)^2 / (2 sigma^2)) / sum` | sums to 1 |
//!
//! # Example
//!
//! ```rust
//! use blur_ops::kernel::{kernel_size, sigma_for_intensity, Kernel};
//!
//! let sigma = sigma_for_intensity(2.5);
//! assert_eq!(sigma, 5.0);
//!
//! let k = Kernel::gaussian(sigma, kernel_size(sigma)).unwrap();
//! assert_eq!(k.len(), 31);
//! assert!((k.sum() - 1.0).abs() < 1e-5);
//! ```

use crate::{OpsError, OpsResult};

/// Highest accepted intensity.
pub const MAX_INTENSITY: f64 = 10.0;

/// Sigma per unit of intensity.
pub const SIGMA_PER_INTENSITY: f64 = 2.0;

/// Smallest kernel size.
pub const MIN_KERNEL_SIZE: usize = 3;

/// Largest kernel size (sigma = 20).
pub const MAX_KERNEL_SIZE: usize = 121;

/// Converts blur intensity to Gaussian sigma.
///
/// Intensity is clamped to `[0, 10]` first, so the result is in `[0, 20]`.
/// NaN maps to 0.
#[inline]
pub fn sigma_for_intensity(intensity: f64) -> f64 {
    if intensity.is_nan() {
        return 0.0;
    }
    intensity.clamp(0.0, MAX_INTENSITY) * SIGMA_PER_INTENSITY
}

/// Kernel size covering +/- 3 sigma.
///
/// Always odd and within `[3, 121]`; `sigma <= 0` gives the minimum.
pub fn kernel_size(sigma: f64) -> usize {
    if sigma.is_nan() || sigma <= 0.0 {
        return MIN_KERNEL_SIZE;
    }
    let reach = (3.0 * sigma).ceil().min(MAX_KERNEL_SIZE as f64);
    let mut size = 2 * reach as usize + 1;
    if size % 2 == 0 {
        size += 1;
    }
    size.clamp(MIN_KERNEL_SIZE, MAX_KERNEL_SIZE)
}

/// Normalized 1-D Gaussian kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    weights: Vec<f32>,
    sigma: f64,
}

impl Kernel {
    /// Generates a kernel of `size` samples for `sigma`.
    ///
    /// Fails for `sigma <= 0`, non-finite sigma, and sizes that are even or
    /// below [`MIN_KERNEL_SIZE`].
    pub fn gaussian(sigma: f64, size: usize) -> OpsResult<Self> {
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(OpsError::InvalidParameter(format!(
                "sigma must be positive, got {sigma}"
            )));
        }
        if size < MIN_KERNEL_SIZE || size % 2 == 0 {
            return Err(OpsError::InvalidParameter(format!(
                "kernel size must be odd and >= {MIN_KERNEL_SIZE}, got {size}"
            )));
        }

        let center = (size / 2) as i64;
        let two_sigma_sq = 2.0 * sigma * sigma;

        let raw: Vec<f64> = (0..size as i64)
            .map(|i| {
                let offset = (i - center) as f64;
                (-(offset * offset) / two_sigma_sq).exp()
            })
            .collect();
        let sum: f64 = raw.iter().sum();

        let weights = raw.iter().map(|w| (w / sum) as f32).collect();
        Ok(Self { weights, sigma })
    }

    /// Kernel sized by [`kernel_size`] for `sigma`.
    pub fn for_sigma(sigma: f64) -> OpsResult<Self> {
        Self::gaussian(sigma, kernel_size(sigma))
    }

    /// Normalized weights, center at `len() / 2`.
    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Number of taps.
    #[inline]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Always false; kernels have at least three taps.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Taps on each side of the center.
    #[inline]
    pub fn radius(&self) -> usize {
        self.weights.len() / 2
    }

    /// Sigma the kernel was built for.
    #[inline]
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Sum of the weights (1.0 up to float error).
    pub fn sum(&self) -> f64 {
        self.weights.iter().map(|&w| w as f64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sigma_mapping() {
        assert_eq!(sigma_for_intensity(0.0), 0.0);
        assert_eq!(sigma_for_intensity(2.5), 5.0);
        assert_eq!(sigma_for_intensity(10.0), 20.0);
        // Clamped
        assert_eq!(sigma_for_intensity(-3.0), 0.0);
        assert_eq!(sigma_for_intensity(42.0), 20.0);
        assert_eq!(sigma_for_intensity(f64::NAN), 0.0);
    }

    #[test]
    fn test_kernel_size_bounds() {
        assert_eq!(kernel_size(0.0), 3);
        assert_eq!(kernel_size(-1.0), 3);
        assert!(kernel_size(0.5) >= 3);
        assert_eq!(kernel_size(0.5), 5);
        assert_eq!(kernel_size(1.0), 7);
        assert_eq!(kernel_size(20.0), 121);
        assert_eq!(kernel_size(1000.0), 121);
    }

    #[test]
    fn test_kernel_size_always_odd() {
        let mut sigma = 0.0;
        while sigma <= 25.0 {
            let size = kernel_size(sigma);
            assert_eq!(size % 2, 1, "even size {size} for sigma {sigma}");
            assert!((MIN_KERNEL_SIZE..=MAX_KERNEL_SIZE).contains(&size));
            sigma += 0.05;
        }
    }

    #[test]
    fn test_kernel_sums_to_one() {
        for step in 1..=200 {
            let sigma = step as f64 * 0.1;
            let k = Kernel::for_sigma(sigma).unwrap();
            assert!((k.sum() - 1.0).abs() < 1e-5, "sigma {sigma}: sum {}", k.sum());
        }
    }

    #[test]
    fn test_kernel_symmetric_peak() {
        let k = Kernel::gaussian(2.0, 13).unwrap();
        let w = k.weights();
        let r = k.radius();
        for i in 0..r {
            assert_relative_eq!(w[i], w[w.len() - 1 - i], epsilon = 1e-7);
            assert!(w[i] < w[i + 1]);
        }
    }

    #[test]
    fn test_kernel_deterministic() {
        let a = Kernel::gaussian(3.7, 23).unwrap();
        let b = Kernel::gaussian(3.7, 23).unwrap();
        let bits_a: Vec<u32> = a.weights().iter().map(|w| w.to_bits()).collect();
        let bits_b: Vec<u32> = b.weights().iter().map(|w| w.to_bits()).collect();
        assert_eq!(bits_a, bits_b);
    }

    #[test]
    fn test_kernel_rejects_bad_input() {
        assert!(Kernel::gaussian(0.0, 3).is_err());
        assert!(Kernel::gaussian(-1.0, 3).is_err());
        assert!(Kernel::gaussian(f64::INFINITY, 3).is_err());
        assert!(Kernel::gaussian(1.0, 4).is_err());
        assert!(Kernel::gaussian(1.0, 1).is_err());
    }
}
