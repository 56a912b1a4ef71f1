//! Client handle for a coordinator running on its own thread.

use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use blur_cache::ResultCache;
use blur_core::{Error, PixelBuffer, Result};
use tracing::info;

use crate::config::EngineConfig;
use crate::coordinator::BlurCoordinator;
use crate::handler::CoordinatorHandler;
use crate::messages::{CoordinatorEvent, CoordinatorMsg};

/// A running blur session.
///
/// Commands go to the coordinator thread; events come back through
/// [`try_event`](Self::try_event) and [`recv_event_timeout`](Self::recv_event_timeout).
/// Dropping the session stops and joins the thread.
pub struct BlurSession {
    tx: Sender<CoordinatorMsg>,
    rx: Receiver<CoordinatorEvent>,
    cache: Arc<ResultCache>,
    worker: Option<JoinHandle<()>>,
}

impl BlurSession {
    /// Starts a session. Configuration errors are reported here, before any
    /// thread is spawned.
    pub fn start(config: &EngineConfig) -> Result<Self> {
        let (tx_to_worker, rx_in_worker) = channel();
        let (tx_to_client, rx_from_worker) = channel();

        let coordinator = BlurCoordinator::new(config, tx_to_client)?;
        let wake_tx = tx_to_worker.clone();
        coordinator.processor().set_waker(Arc::new(move || {
            let _ = wake_tx.send(CoordinatorMsg::Wake);
        }));
        let cache = Arc::clone(coordinator.cache());

        let worker = thread::Builder::new()
            .name("blur-coordinator".into())
            .spawn(move || CoordinatorHandler::new(rx_in_worker, coordinator).run())
            .map_err(|e| Error::ThreadPoolFailure(format!("coordinator thread: {e}")))?;

        info!(debounce_ms = config.debounce_ms, "Blur session started");
        Ok(Self {
            tx: tx_to_worker,
            rx: rx_from_worker,
            cache,
            worker: Some(worker),
        })
    }

    fn send(&self, msg: CoordinatorMsg) {
        let _ = self.tx.send(msg);
    }

    /// Replaces the base image.
    pub fn set_base_image(&self, image: PixelBuffer, identity: Option<String>) {
        self.send(CoordinatorMsg::SetBaseImage { image, identity });
    }

    /// Sends a new slider value.
    pub fn set_intensity(&self, intensity: f64) {
        self.send(CoordinatorMsg::SetIntensity(intensity));
    }

    /// Cancels pending work and returns to intensity 0.
    pub fn reset(&self, clear_cache: bool) {
        self.send(CoordinatorMsg::Reset { clear_cache });
    }

    /// Next event, if one is waiting.
    pub fn try_event(&self) -> Option<CoordinatorEvent> {
        self.rx.try_recv().ok()
    }

    /// Waits up to `timeout` for the next event.
    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<CoordinatorEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Result cache shared with the coordinator.
    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Stops the coordinator and waits for it to exit.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.send(CoordinatorMsg::Close);
            let _ = worker.join();
        }
    }
}

impl Drop for BlurSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
