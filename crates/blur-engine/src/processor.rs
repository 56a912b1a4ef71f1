//! Asynchronous blur processor.
//!
//! A [`Processor`] owns a bounded rayon pool, a table of active requests and
//! a single-consumer completion channel:
//!
//! ```text
//!  submit() --> active table (id -> callback)
//!      |
//!      +--> rayon worker --blur--> Completion { id, outcome } --mpsc--+
//!                                                                     |
//!  dispatch_pending() <-----------------------------------------------+
//!      remove id from table; present -> callback(outcome), absent -> drop
//! ```
//!
//! Workers never run user callbacks. Callbacks only run on the thread that
//! calls [`Processor::dispatch_pending`] or [`Processor::dispatch_timeout`],
//! and only one dispatcher runs at a time, so callbacks of one processor are
//! never concurrent. Cancelling a request removes it from the table; a
//! worker that is already running finishes, and its result is discarded at
//! dispatch.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, TryLockError};
use std::time::{Duration, Instant};

use blur_core::{Error, PixelBuffer, Result};
use blur_ops::{apply_blur, scratch_len, sigma_for_intensity, BlurQuality, MAX_INTENSITY};
use tracing::{debug, info, trace, warn};

use crate::config::{resolve_thread_count, ProcessorConfig};
use crate::scratch::ScratchPool;

/// Request handle. Issued from 1 upward; 0 means "not submitted".
pub type RequestId = u64;

/// Completion callback.
pub type BlurCallback = Box<dyn FnOnce(Result<PixelBuffer>) + Send + 'static>;

/// Called on a worker thread whenever a completion is queued.
pub type WakeFn = Arc<dyn Fn() + Send + Sync + 'static>;

/// Pre-allocated scratch buffers.
const SCRATCH_BUFFERS: usize = 2;

/// Blur implementation run on worker threads.
pub trait BlurBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str {
        "gaussian"
    }

    /// Blurs `image` with `sigma`, using `scratch` for intermediate rows.
    fn blur(
        &self,
        image: &PixelBuffer,
        sigma: f64,
        quality: BlurQuality,
        scratch: &mut [u8],
    ) -> Result<PixelBuffer>;
}

/// Separable Gaussian blur from `blur-ops`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianBackend;

impl BlurBackend for GaussianBackend {
    fn blur(
        &self,
        image: &PixelBuffer,
        sigma: f64,
        quality: BlurQuality,
        scratch: &mut [u8],
    ) -> Result<PixelBuffer> {
        Ok(apply_blur(image, sigma, quality, scratch)?)
    }
}

struct ActiveRequest {
    callback: BlurCallback,
    intensity: f64,
    submitted: Instant,
}

struct Completion {
    id: RequestId,
    outcome: Result<PixelBuffer>,
}

/// Count of queued or running jobs.
#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) {
        *self.lock() += 1;
    }

    fn wait_idle(&self) {
        let mut count = self.lock();
        while *count > 0 {
            count = self.idle.wait(count).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Decrements the in-flight count on drop, including during unwinding.
struct InFlightGuard<'a>(&'a InFlight);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut count = self.0.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.0.idle.notify_all();
        }
    }
}

/// State shared with worker jobs.
struct Shared {
    active: Mutex<HashMap<RequestId, ActiveRequest>>,
    destroyed: AtomicBool,
    in_flight: InFlight,
    scratch: Arc<ScratchPool>,
    backend: Arc<dyn BlurBackend>,
    waker: RwLock<Option<WakeFn>>,
}

impl Shared {
    fn lock_active(&self) -> MutexGuard<'_, HashMap<RequestId, ActiveRequest>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn wake(&self) {
        let waker = self
            .waker
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(wake) = waker {
            wake();
        }
    }
}

/// Asynchronous blur processor.
pub struct Processor {
    shared: Arc<Shared>,
    pool: Mutex<Option<rayon::ThreadPool>>,
    thread_count: usize,
    max_width: u32,
    max_height: u32,
    next_id: AtomicU64,
    tx: Sender<Completion>,
    rx: Mutex<Receiver<Completion>>,
}

impl Processor {
    /// Creates a processor.
    ///
    /// `max_width`/`max_height` size the pre-allocated scratch buffers and
    /// must be within `1..=8192`. A negative `thread_count` means one worker
    /// per CPU; the count is clamped to `1..=8`.
    pub fn create(max_width: i32, max_height: i32, thread_count: i32) -> Result<Self> {
        Self::with_config(&ProcessorConfig {
            max_width,
            max_height,
            thread_count,
        })
    }

    /// Creates a processor from configuration.
    pub fn with_config(config: &ProcessorConfig) -> Result<Self> {
        Self::with_backend(config, Arc::new(GaussianBackend))
    }

    /// Creates a processor that blurs through `backend`.
    pub fn with_backend(config: &ProcessorConfig, backend: Arc<dyn BlurBackend>) -> Result<Self> {
        config.validate()?;
        let max_width = config.max_width as u32;
        let max_height = config.max_height as u32;
        let thread_count = resolve_thread_count(config.thread_count);
        let scratch = ScratchPool::new(scratch_len(max_width, max_height), SCRATCH_BUFFERS)?;
        let (tx, rx) = mpsc::channel();

        info!(
            max_width,
            max_height,
            threads = thread_count,
            backend = backend.name(),
            "Created blur processor"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                active: Mutex::new(HashMap::new()),
                destroyed: AtomicBool::new(false),
                in_flight: InFlight::default(),
                scratch,
                backend,
                waker: RwLock::new(None),
            }),
            pool: Mutex::new(None),
            thread_count,
            max_width,
            max_height,
            next_id: AtomicU64::new(1),
            tx,
            rx: Mutex::new(rx),
        })
    }

    /// Registers a function called whenever a completion is queued.
    pub fn with_waker(self, wake: impl Fn() + Send + Sync + 'static) -> Self {
        self.set_waker(Arc::new(wake));
        self
    }

    /// Replaces the completion waker.
    pub fn set_waker(&self, wake: WakeFn) {
        *self
            .shared
            .waker
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(wake);
    }

    fn lock_pool(&self) -> MutexGuard<'_, Option<rayon::ThreadPool>> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Submits a blur request.
    ///
    /// Returns the request id, or 0 if the request failed synchronously; in
    /// that case `callback` has already been called with the error. Zero
    /// intensity completes synchronously with the unmodified source and
    /// still returns a fresh id.
    pub fn submit<F>(
        &self,
        image: &PixelBuffer,
        intensity: f64,
        quality: BlurQuality,
        callback: F,
    ) -> RequestId
    where
        F: FnOnce(Result<PixelBuffer>) + Send + 'static,
    {
        if !intensity.is_finite() || !(0.0..=MAX_INTENSITY).contains(&intensity) {
            warn!(intensity, "Rejected blur request: intensity out of range");
            callback(Err(Error::InvalidIntensity(intensity)));
            return 0;
        }
        if let Err(e) = image.validate() {
            warn!(error = %e, "Rejected blur request: invalid image");
            callback(Err(e));
            return 0;
        }
        if self.shared.is_destroyed() {
            warn!("Submit on destroyed processor");
            callback(Err(Error::ProcessorDestroyed));
            return 0;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        if intensity <= 0.0 {
            debug!(id, "Zero intensity, returning source");
            callback(Ok(image.clone()));
            return id;
        }

        let callback: BlurCallback = Box::new(callback);
        let rejected = {
            let mut slot = self.lock_pool();
            if self.shared.is_destroyed() {
                Some((callback, Error::ProcessorDestroyed))
            } else {
                match self.ensure_pool(&mut slot) {
                    Err(e) => Some((callback, e)),
                    Ok(pool) => {
                        self.shared.lock_active().insert(
                            id,
                            ActiveRequest {
                                callback,
                                intensity,
                                submitted: Instant::now(),
                            },
                        );
                        self.shared.in_flight.begin();

                        let shared = Arc::clone(&self.shared);
                        let tx = self.tx.clone();
                        let source = image.clone();
                        pool.spawn(move || run_job(&shared, &tx, id, &source, intensity, quality));
                        None
                    }
                }
            }
        };

        match rejected {
            Some((callback, err)) => {
                warn!(id, error = %err, "Failed to queue blur request");
                callback(Err(err));
                0
            }
            None => {
                debug!(
                    id,
                    intensity,
                    ?quality,
                    width = image.width(),
                    height = image.height(),
                    "Queued blur request"
                );
                id
            }
        }
    }

    fn ensure_pool<'a>(
        &self,
        slot: &'a mut Option<rayon::ThreadPool>,
    ) -> Result<&'a rayon::ThreadPool> {
        if slot.is_none() {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.thread_count)
                .thread_name(|index| format!("blur-worker-{index}"))
                .build()
                .map_err(|e| Error::ThreadPoolFailure(e.to_string()))?;
            debug!(threads = self.thread_count, "Started worker pool");
            *slot = Some(pool);
        }
        slot.as_ref()
            .ok_or_else(|| Error::ThreadPoolFailure("worker pool unavailable".into()))
    }

    /// Cancels a request. Returns true if it was still active.
    ///
    /// A running worker is not interrupted; its result is dropped at dispatch
    /// and the callback is never called.
    pub fn cancel(&self, id: RequestId) -> bool {
        let removed = self.shared.lock_active().remove(&id);
        match removed {
            Some(req) => {
                debug!(id, intensity = req.intensity, "Cancelled blur request");
                true
            }
            None => false,
        }
    }

    /// Delivers every queued completion without blocking.
    ///
    /// Returns the number of callbacks invoked. Returns 0 immediately if
    /// another dispatch is in progress, including a re-entrant call from a
    /// callback.
    pub fn dispatch_pending(&self) -> usize {
        let rx = match self.rx.try_lock() {
            Ok(rx) => rx,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => return 0,
        };
        let mut delivered = 0;
        while let Ok(completion) = rx.try_recv() {
            delivered += usize::from(self.deliver(completion));
        }
        delivered
    }

    /// Waits up to `timeout` for a completion, then delivers everything queued.
    pub fn dispatch_timeout(&self, timeout: Duration) -> usize {
        let rx = match self.rx.try_lock() {
            Ok(rx) => rx,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => return 0,
        };
        let mut delivered = match rx.recv_timeout(timeout) {
            Ok(completion) => usize::from(self.deliver(completion)),
            Err(_) => return 0,
        };
        while let Ok(completion) = rx.try_recv() {
            delivered += usize::from(self.deliver(completion));
        }
        delivered
    }

    fn deliver(&self, completion: Completion) -> bool {
        let Completion { id, outcome } = completion;
        let request = self.shared.lock_active().remove(&id);
        match request {
            Some(req) => {
                trace!(
                    id,
                    ok = outcome.is_ok(),
                    elapsed_ms = req.submitted.elapsed().as_millis() as u64,
                    "Delivering blur result"
                );
                (req.callback)(outcome);
                true
            }
            None => {
                trace!(id, "Discarding result of inactive request");
                false
            }
        }
    }

    /// Stops the processor.
    ///
    /// Blocks until running jobs finish, then drops the pool, scratch
    /// buffers and every outstanding callback without calling it.
    /// Idempotent.
    pub fn destroy(&self) {
        if self.shared.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut slot = self.lock_pool();
        self.shared.in_flight.wait_idle();
        let pool = slot.take();
        drop(slot);
        drop(pool);

        let pending: Vec<ActiveRequest> = self.shared.lock_active().drain().map(|(_, r)| r).collect();
        let discarded = match self.rx.try_lock() {
            Ok(rx) => rx.try_iter().count(),
            Err(_) => 0,
        };
        self.shared.scratch.close();

        info!(
            dropped_callbacks = pending.len(),
            discarded,
            "Destroyed blur processor"
        );
    }

    /// True once [`destroy`](Self::destroy) has run.
    pub fn is_destroyed(&self) -> bool {
        self.shared.is_destroyed()
    }

    /// True if `id` is still waiting for delivery.
    pub fn is_active(&self, id: RequestId) -> bool {
        id != 0 && self.shared.lock_active().contains_key(&id)
    }

    /// Requests submitted but not yet delivered or cancelled.
    pub fn active_requests(&self) -> usize {
        self.shared.lock_active().len()
    }

    /// Jobs queued on or running in the pool.
    pub fn in_flight(&self) -> usize {
        *self.shared.in_flight.lock()
    }

    /// Worker thread count.
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Dimensions the pooled scratch buffers cover.
    pub fn max_dimensions(&self) -> (u32, u32) {
        (self.max_width, self.max_height)
    }
}

impl Drop for Processor {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("threads", &self.thread_count)
            .field("max_width", &self.max_width)
            .field("max_height", &self.max_height)
            .field("active", &self.active_requests())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

fn run_job(
    shared: &Shared,
    tx: &Sender<Completion>,
    id: RequestId,
    source: &PixelBuffer,
    intensity: f64,
    quality: BlurQuality,
) {
    let _guard = InFlightGuard(&shared.in_flight);

    if shared.is_destroyed() {
        return;
    }
    if !shared.lock_active().contains_key(&id) {
        trace!(id, "Skipping cancelled request");
        return;
    }

    let sigma = sigma_for_intensity(intensity);
    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut scratch = shared.scratch.checkout(source.byte_len())?;
        shared.backend.blur(source, sigma, quality, &mut scratch)
    }))
    .unwrap_or_else(|payload| Err(Error::ProcessingFailed(panic_message(payload))));

    trace!(id, sigma, ok = outcome.is_ok(), ms = started.elapsed().as_millis() as u64, "Job finished");

    if shared.is_destroyed() {
        return;
    }
    if tx.send(Completion { id, outcome }).is_ok() {
        shared.wake();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {s}")
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blur_core::{Channels, ErrorKind};
    use std::sync::atomic::AtomicUsize;

    fn small() -> Processor {
        Processor::create(64, 64, 2).unwrap()
    }

    fn image() -> PixelBuffer {
        PixelBuffer::filled(16, 16, Channels::Rgb, &[1, 2, 3]).unwrap()
    }

    fn drain(p: &Processor, expected: usize) -> usize {
        let mut total = 0;
        let deadline = Instant::now() + Duration::from_secs(10);
        while total < expected && Instant::now() < deadline {
            total += p.dispatch_timeout(Duration::from_millis(50));
        }
        total
    }

    #[test]
    fn test_create_limits() {
        assert!(Processor::create(0, 100, 1).is_err());
        assert!(Processor::create(100, 8193, 1).is_err());
        let p = Processor::create(8, 8, 0).unwrap();
        assert_eq!(p.thread_count(), 1);
        assert_eq!(p.max_dimensions(), (8, 8));
        let p = Processor::create(8, 8, 100).unwrap();
        assert_eq!(p.thread_count(), 8);
    }

    #[test]
    fn test_invalid_intensity() {
        let p = small();
        let kind = Arc::new(Mutex::new(None));
        let k = kind.clone();
        let id = p.submit(&image(), 10.5, BlurQuality::Full, move |r| {
            *k.lock().unwrap() = r.err().map(|e| e.kind());
        });
        assert_eq!(id, 0);
        assert_eq!(*kind.lock().unwrap(), Some(ErrorKind::InvalidIntensity));

        let k = kind.clone();
        let id = p.submit(&image(), f64::NAN, BlurQuality::Full, move |r| {
            *k.lock().unwrap() = r.err().map(|e| e.kind());
        });
        assert_eq!(id, 0);
        assert_eq!(*kind.lock().unwrap(), Some(ErrorKind::InvalidIntensity));
    }

    #[test]
    fn test_ids_not_consumed_by_validation() {
        let p = small();
        let first = p.submit(&image(), 0.0, BlurQuality::Full, |_| {});
        assert_eq!(p.submit(&image(), -1.0, BlurQuality::Full, |_| {}), 0);
        let second = p.submit(&image(), 0.0, BlurQuality::Full, |_| {});
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn test_zero_intensity_is_synchronous() {
        let p = small();
        let src = image();
        let got = Arc::new(Mutex::new(None));
        let g = got.clone();
        let id = p.submit(&src, 0.0, BlurQuality::Full, move |r| {
            *g.lock().unwrap() = Some(r.unwrap());
        });
        assert!(id > 0);
        let out = got.lock().unwrap().take().unwrap();
        assert!(out.ptr_eq(&src));
        assert_eq!(p.active_requests(), 0);
    }

    #[test]
    fn test_blur_delivered_on_dispatch() {
        let p = small();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let id = p.submit(&image(), 1.0, BlurQuality::Full, move |r| {
            assert!(r.is_ok());
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(id > 0);
        // Nothing runs before dispatch
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(drain(&p, 1), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!p.is_active(id));
    }

    #[test]
    fn test_destroy_idempotent() {
        let p = small();
        p.destroy();
        p.destroy();
        assert!(p.is_destroyed());

        let kind = Arc::new(Mutex::new(None));
        let k = kind.clone();
        let id = p.submit(&image(), 2.0, BlurQuality::Full, move |r| {
            *k.lock().unwrap() = r.err().map(|e| e.kind());
        });
        assert_eq!(id, 0);
        assert_eq!(*kind.lock().unwrap(), Some(ErrorKind::ProcessorDestroyed));
    }

    #[test]
    fn test_cancel_unknown() {
        let p = small();
        assert!(!p.cancel(0));
        assert!(!p.cancel(12345));
    }
}
