//! # blur-engine
//!
//! Asynchronous blur processing for interactive clients.
//!
//! # Modules
//!
//! - [`processor`] - bounded worker pool, request table, completion dispatch
//! - [`scratch`] - per-job scratch buffers
//! - [`debounce`] - cancellable deadline
//! - [`coordinator`] - debounce + cache + processor state machine
//! - [`handler`], [`session`], [`messages`] - the coordinator on its own thread
//! - [`config`] - RON-loadable settings
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use blur_core::{Channels, PixelBuffer};
//! use blur_engine::{BlurSession, CoordinatorEvent, EngineConfig};
//!
//! let session = BlurSession::start(&EngineConfig::default()).unwrap();
//! session.set_base_image(PixelBuffer::new(640, 480, Channels::Rgb), None);
//! session.set_intensity(2.5);
//!
//! while let Some(event) = session.recv_event_timeout(Duration::from_secs(1)) {
//!     if let CoordinatorEvent::BlurReady { image, .. } = event {
//!         println!("blurred {}x{}", image.width(), image.height());
//!         break;
//!     }
//! }
//! ```
//!
//! # Threading
//!
//! | Context | Runs |
//! |---------|------|
//! | caller / coordinator thread | `submit`, `cancel`, callbacks, cache puts |
//! | rayon workers (1..=8) | convolution only |

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod coordinator;
pub mod debounce;
pub mod handler;
pub mod messages;
pub mod processor;
pub mod scratch;
pub mod session;

pub use config::{
    detect_thread_count, resolve_thread_count, CacheConfig, EngineConfig, ProcessorConfig,
    QualityMode, MAX_THREADS, MIN_THREADS,
};
pub use coordinator::BlurCoordinator;
pub use debounce::{Debouncer, DEFAULT_DEBOUNCE};
pub use messages::{CoordinatorEvent, CoordinatorMsg};
pub use processor::{BlurBackend, BlurCallback, GaussianBackend, Processor, RequestId, WakeFn};
pub use session::BlurSession;

pub use blur_ops::BlurQuality;
