use crate::backend::{BackendError, Page};
use crate::config::ObserverConfig;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use stepper_common::ObserverEvent;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, trace};

pub type EventCallback = Arc<dyn Fn(&ObserverEvent) + Send + Sync>;

#[derive(Default)]
struct ObserverState {
    buffer: VecDeque<ObserverEvent>,
    collecting: bool,
    callback: Option<EventCallback>,
}

/// Passive page-activity observer.
///
/// Listeners are attached to a page once; `start`/`stop` only gate whether
/// incoming events are buffered. Every significant event refreshes the
/// last-activity instant that `wait_for_quiet` measures against, whether or
/// not the observer is collecting.
pub struct ActivityObserver {
    config: ObserverConfig,
    state: Mutex<ObserverState>,
    last_activity: Mutex<Instant>,
    dom_tx: broadcast::Sender<ObserverEvent>,
    installed: AtomicBool,
}

impl ActivityObserver {
    pub fn new(config: ObserverConfig) -> Arc<Self> {
        let (dom_tx, _) = broadcast::channel(config.dom_channel_capacity.max(1));
        Arc::new(Self {
            config,
            state: Mutex::new(ObserverState::default()),
            last_activity: Mutex::new(Instant::now()),
            dom_tx,
            installed: AtomicBool::new(false),
        })
    }

    fn state(&self) -> MutexGuard<'_, ObserverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Attach listeners to `page`. Later calls are no-ops.
    pub async fn install(self: &Arc<Self>, page: &dyn Page) -> Result<(), BackendError> {
        if self.installed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(e) = page.install_listeners(Arc::clone(self)).await {
            self.installed.store(false, Ordering::SeqCst);
            return Err(e);
        }
        debug!("Observer listeners installed");
        Ok(())
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    /// Entry point for events produced by page listeners.
    pub fn ingest(&self, event: ObserverEvent) {
        if event.is_dom() {
            // No receivers is fine.
            let _ = self.dom_tx.send(event.clone());
        }
        if !event.is_significant() {
            trace!(kind = event.kind(), "Dropping insignificant event");
            return;
        }
        self.touch();

        let callback = {
            let mut state = self.state();
            if !state.collecting {
                return;
            }
            if state.buffer.len() >= self.config.buffer_capacity.max(1) {
                state.buffer.pop_front();
            }
            state.buffer.push_back(event.clone());
            state.callback.clone()
        };
        if let Some(cb) = callback {
            cb(&event);
        }
    }

    /// Begin collecting into a fresh buffer.
    pub fn start(&self) {
        let mut state = self.state();
        state.buffer.clear();
        state.collecting = true;
        debug!("Observer started");
    }

    pub fn stop(&self) {
        self.state().collecting = false;
        debug!("Observer stopped");
    }

    /// Stop buffering but keep what has been collected.
    pub fn pause(&self) {
        self.state().collecting = false;
    }

    /// Continue buffering into the existing buffer.
    pub fn resume(&self) {
        self.state().collecting = true;
    }

    pub fn clear(&self) {
        self.state().buffer.clear();
    }

    /// Snapshot of the buffered events in arrival order.
    pub fn request(&self) -> Vec<ObserverEvent> {
        self.state().buffer.iter().cloned().collect()
    }

    pub fn is_collecting(&self) -> bool {
        self.state().collecting
    }

    /// Replace the single event callback.
    pub fn register_callback<F>(&self, callback: F)
    where
        F: Fn(&ObserverEvent) + Send + Sync + 'static,
    {
        self.state().callback = Some(Arc::new(callback));
    }

    pub fn unregister_callback(&self) {
        self.state().callback = None;
    }

    /// Every DOM mutation, significant or not.
    pub fn dom_changes(&self) -> broadcast::Receiver<ObserverEvent> {
        self.dom_tx.subscribe()
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Resolve once no significant activity has been seen for `quiet_ms`.
    pub async fn wait_for_quiet(&self, quiet_ms: u64) {
        let quiet = Duration::from_millis(quiet_ms);
        let poll = Duration::from_millis(self.config.poll_interval_ms.max(1));
        loop {
            let idle = self.idle_for();
            if idle >= quiet {
                return;
            }
            tokio::time::sleep(poll.min(quiet - idle)).await;
        }
    }
}
