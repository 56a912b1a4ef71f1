//! Debounced blur coordination.
//!
//! [`BlurCoordinator`] turns a stream of slider values into as few blur jobs
//! as possible:
//!
//! 1. Every new intensity restarts the debounce delay.
//! 2. Intensity 0 skips the delay: running work is cancelled and the base
//!    image is shown at once.
//! 3. When the delay expires the running request is cancelled, the cache is
//!    consulted, and only a miss submits a job.
//! 4. Finished jobs are stored in the cache and reported as
//!    [`CoordinatorEvent::BlurReady`].
//!
//! The coordinator is passive: the owning thread calls
//! [`poll`](BlurCoordinator::poll) when [`next_deadline`](BlurCoordinator::next_deadline)
//! passes or when the processor signals a completion.

use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};

use blur_cache::{CacheStats, ResultCache};
use blur_core::{Error, PixelBuffer, Result};
use blur_ops::{BlurQuality, MAX_INTENSITY};
use tracing::{debug, info, trace, warn};

use crate::config::EngineConfig;
use crate::debounce::Debouncer;
use crate::messages::CoordinatorEvent;
use crate::processor::{Processor, RequestId};

struct BaseImage {
    image: PixelBuffer,
    identity: String,
}

/// Debounce, cache and processor glued into one state machine.
pub struct BlurCoordinator {
    processor: Processor,
    cache: Arc<ResultCache>,
    debouncer: Debouncer,
    quality: BlurQuality,
    base: Option<BaseImage>,
    intensity: f64,
    active: RequestId,
    events: Sender<CoordinatorEvent>,
}

impl BlurCoordinator {
    /// Builds the processor and cache from `config`.
    pub fn new(config: &EngineConfig, events: Sender<CoordinatorEvent>) -> Result<Self> {
        config.validate()?;
        let processor = Processor::with_config(&config.processor)?;
        let cache = Arc::new(ResultCache::new(
            config.cache.max_entries,
            config.cache.max_memory_bytes,
        )?);
        Ok(Self::from_parts(
            processor,
            cache,
            config.debounce(),
            config.blur_quality(),
            events,
        ))
    }

    /// Assembles a coordinator from existing parts.
    pub fn from_parts(
        processor: Processor,
        cache: Arc<ResultCache>,
        delay: Duration,
        quality: BlurQuality,
        events: Sender<CoordinatorEvent>,
    ) -> Self {
        Self {
            processor,
            cache,
            debouncer: Debouncer::new(delay),
            quality,
            base: None,
            intensity: 0.0,
            active: 0,
            events,
        }
    }

    fn send(&self, event: CoordinatorEvent) {
        let _ = self.events.send(event);
    }

    fn cancel_active(&mut self) {
        if self.active != 0 {
            self.processor.cancel(self.active);
            self.active = 0;
        }
    }

    fn show_base(&self) {
        if let Some(base) = &self.base {
            self.send(CoordinatorEvent::ShowBase(base.image.clone()));
        }
    }

    /// Replaces the base image.
    ///
    /// Cached results of the previous image are dropped and pending work is
    /// cancelled. With a non-zero intensity the new image is blurred right
    /// away; otherwise it is shown as is.
    pub fn set_base_image(&mut self, image: PixelBuffer, identity: Option<String>) {
        let identity = identity.unwrap_or_else(|| image.fingerprint());
        self.debouncer.cancel();
        self.cancel_active();

        if let Some(old) = self.base.take() {
            if old.identity != identity {
                self.cache.remove(&old.identity);
            }
        }
        info!(
            identity = %identity,
            width = image.width(),
            height = image.height(),
            "Base image set"
        );
        self.base = Some(BaseImage { image, identity });

        if self.intensity > 0.0 {
            self.fire();
        } else {
            self.show_base();
        }
    }

    /// Records a new slider value at time `now`.
    ///
    /// Values outside `[0, 10]` (or NaN) are reported as an error event and
    /// leave the current state untouched.
    pub fn set_intensity(&mut self, value: f64, now: Instant) {
        if !value.is_finite() || !(0.0..=MAX_INTENSITY).contains(&value) {
            warn!(value, "Ignoring out-of-range intensity");
            self.send(CoordinatorEvent::Error(Error::InvalidIntensity(value)));
            return;
        }
        self.intensity = value;
        self.send(CoordinatorEvent::IntensityChanged(value));
        self.debouncer.cancel();

        if value <= 0.0 {
            trace!("Zero intensity, bypassing debounce");
            self.cancel_active();
            self.show_base();
            return;
        }
        self.debouncer.schedule(now);
    }

    /// Fires a due debounce and delivers finished jobs.
    ///
    /// Returns the number of completions delivered.
    pub fn poll(&mut self, now: Instant) -> usize {
        if self.debouncer.fire_if_due(now) {
            self.fire();
        }
        self.processor.dispatch_pending()
    }

    /// Waits up to `timeout` for a completion and delivers it.
    pub fn wait_for_completion(&mut self, timeout: Duration) -> usize {
        self.processor.dispatch_timeout(timeout)
    }

    fn fire(&mut self) {
        self.cancel_active();
        let Some(base) = &self.base else {
            trace!("Debounce fired without a base image");
            return;
        };
        let intensity = self.intensity;

        if let Some(image) = self.cache.get(&base.identity, intensity) {
            debug!(intensity, "Serving blur from cache");
            self.send(CoordinatorEvent::BlurReady {
                intensity,
                image,
                from_cache: true,
            });
            return;
        }

        let cache = Arc::clone(&self.cache);
        let identity = base.identity.clone();
        let events = self.events.clone();
        let id = self.processor.submit(&base.image, intensity, self.quality, move |outcome| {
            let event = match outcome {
                Ok(image) => {
                    cache.put(&identity, intensity, &image);
                    CoordinatorEvent::BlurReady {
                        intensity,
                        image,
                        from_cache: false,
                    }
                }
                Err(e) => CoordinatorEvent::Error(e),
            };
            let _ = events.send(event);
        });
        debug!(id, intensity, "Requested blur");
        self.active = id;
    }

    /// Cancels pending work and returns to intensity 0.
    pub fn reset(&mut self, clear_cache: bool) {
        self.debouncer.cancel();
        self.cancel_active();
        if clear_cache {
            self.cache.clear();
        }
        self.intensity = 0.0;
        self.send(CoordinatorEvent::IntensityChanged(0.0));
        self.show_base();
    }

    /// When [`poll`](Self::poll) next has a debounce to fire.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Last intensity set.
    pub fn intensity(&self) -> f64 {
        self.intensity
    }

    /// Request currently in flight.
    pub fn active_request(&self) -> Option<RequestId> {
        self.processor.is_active(self.active).then_some(self.active)
    }

    /// Identity of the base image.
    pub fn base_identity(&self) -> Option<&str> {
        self.base.as_ref().map(|b| b.identity.as_str())
    }

    /// Cache statistics snapshot.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Shared result cache.
    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Underlying processor.
    pub fn processor(&self) -> &Processor {
        &self.processor
    }

    /// Drops the pending debounce and destroys the processor.
    pub fn shutdown(&mut self) {
        self.debouncer.cancel();
        self.active = 0;
        self.processor.destroy();
    }
}
