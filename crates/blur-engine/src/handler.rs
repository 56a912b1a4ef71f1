//! Coordinator thread.
//!
//! Owns a [`BlurCoordinator`] and serves [`CoordinatorMsg`]s. Between messages
//! it sleeps on its inbox, waking for the debounce deadline or when the
//! processor reports a completion through [`CoordinatorMsg::Wake`].

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Instant;

use tracing::{debug, trace};

use crate::coordinator::BlurCoordinator;
use crate::messages::CoordinatorMsg;

/// Message loop around a [`BlurCoordinator`].
pub struct CoordinatorHandler {
    rx: Receiver<CoordinatorMsg>,
    coordinator: BlurCoordinator,
}

impl CoordinatorHandler {
    /// Creates a handler serving `rx`.
    pub fn new(rx: Receiver<CoordinatorMsg>, coordinator: BlurCoordinator) -> Self {
        Self { rx, coordinator }
    }

    /// Runs until [`CoordinatorMsg::Close`] or until every sender is gone.
    pub fn run(mut self) {
        loop {
            let next = match self.coordinator.next_deadline() {
                Some(deadline) => {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    self.rx.recv_timeout(wait)
                }
                None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match next {
                Ok(CoordinatorMsg::Close) => break,
                Ok(msg) => self.handle(msg),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.coordinator.poll(Instant::now());
        }

        self.coordinator.shutdown();
        debug!("Coordinator handler shutdown");
    }

    fn handle(&mut self, msg: CoordinatorMsg) {
        match msg {
            CoordinatorMsg::SetBaseImage { image, identity } => {
                self.coordinator.set_base_image(image, identity)
            }
            CoordinatorMsg::SetIntensity(value) => {
                self.coordinator.set_intensity(value, Instant::now())
            }
            CoordinatorMsg::Reset { clear_cache } => self.coordinator.reset(clear_cache),
            CoordinatorMsg::Wake => trace!("Completion wake"),
            CoordinatorMsg::Close => {}
        }
    }
}
