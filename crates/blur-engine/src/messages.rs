//! Message types for client <-> coordinator communication.
//!
//! The client sends [`CoordinatorMsg`] commands, the coordinator answers with
//! [`CoordinatorEvent`]s.

use blur_core::{Error, PixelBuffer};

/// Commands to the coordinator thread.
#[derive(Debug, Clone)]
pub enum CoordinatorMsg {
    /// Replace the base image.
    ///
    /// `identity` keys cached results; `None` derives it from the pixels.
    SetBaseImage {
        /// New base pixels.
        image: PixelBuffer,
        /// Cache identity override.
        identity: Option<String>,
    },

    /// New slider value.
    SetIntensity(f64),

    /// Cancel pending work and return to intensity 0.
    Reset {
        /// Also drop every cached result.
        clear_cache: bool,
    },

    /// A completion is waiting; sent by the processor's waker.
    Wake,

    /// Stop the coordinator thread.
    Close,
}

/// Events from the coordinator.
#[derive(Debug)]
pub enum CoordinatorEvent {
    /// The stored intensity changed.
    IntensityChanged(f64),

    /// A blurred image is ready to display.
    BlurReady {
        /// Intensity the image was blurred at.
        intensity: f64,
        /// Blurred pixels.
        image: PixelBuffer,
        /// Served from the result cache.
        from_cache: bool,
    },

    /// Show the unblurred base image.
    ShowBase(PixelBuffer),

    /// A request failed.
    Error(Error),
}
