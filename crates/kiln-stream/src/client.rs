//! Client facade.
//!
//! [`KilnClient`] is the one type surrounding code holds: it owns the
//! listener registry and the connection manager task, and exposes
//! start/stop, listener registration, and state inspection. Construct it
//! explicitly and pass it by reference; there is no ambient singleton.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use kiln_core::errors::{ConnectError, RegistryError};

use crate::config::StreamConfig;
use crate::connection::{ConnectionManager, ConnectionPermit, ConnectionState, StateCell};
use crate::endpoint::{Endpoint, HostPolicy};
use crate::listener::{DeliveryTarget, ListenerHandle, PromptFilter};
use crate::registry::ListenerRegistry;
use crate::router::EventRouter;

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Streaming event client for one backend endpoint.
pub struct KilnClient {
    endpoint: Endpoint,
    config: StreamConfig,
    registry: Arc<ListenerRegistry>,
    state: Arc<StateCell>,
    running: Mutex<Option<Running>>,
}

impl std::fmt::Debug for KilnClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KilnClient")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state.get())
            .field("listeners", &self.registry.len())
            .finish()
    }
}

impl KilnClient {
    /// Create a client for a validated endpoint. No I/O happens until
    /// [`start`](Self::start).
    #[must_use]
    pub fn new(endpoint: Endpoint, config: StreamConfig) -> Self {
        let registry = Arc::new(ListenerRegistry::new(
            config.max_listeners_per_prompt,
            config.max_total_listeners,
        ));
        Self {
            endpoint,
            config,
            registry,
            state: Arc::new(StateCell::new()),
            running: Mutex::new(None),
        }
    }

    /// Validate a raw endpoint string and build a client for it.
    pub fn connect_to(
        raw: &str,
        policy: &HostPolicy,
        config: StreamConfig,
    ) -> kiln_core::errors::Result<Self> {
        let endpoint = Endpoint::parse(raw, policy)?;
        Ok(Self::new(endpoint, config))
    }

    /// Begin the connect-and-maintain lifecycle.
    ///
    /// Idempotent: while the manager task is alive, further calls return
    /// `Ok` without spawning anything, so concurrent callers share one
    /// connection attempt. Fails only when the process-wide connection
    /// budget is exhausted.
    pub fn start(&self) -> Result<(), ConnectError> {
        let mut running = self.running.lock();
        if let Some(current) = running.as_ref() {
            if !current.task.is_finished() {
                return Ok(());
            }
        }

        let permit = ConnectionPermit::acquire()?;
        let cancel = CancellationToken::new();
        let router = EventRouter::new(Arc::clone(&self.registry), self.config.max_consecutive_drops);
        let manager = ConnectionManager::new(
            self.endpoint.clone(),
            self.config.clone(),
            router,
            Arc::clone(&self.state),
            cancel.clone(),
        );
        let task = tokio::spawn(manager.run(permit));
        *running = Some(Running { cancel, task });
        info!(endpoint = %self.endpoint, "client started");
        Ok(())
    }

    /// Graceful shutdown.
    ///
    /// Cancels any in-flight connect or read, waits for the manager task
    /// to exit, and unregisters every listener. Idempotent; after it
    /// returns the state is `Disconnected` and no further frames are
    /// processed.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        if let Some(running) = running {
            running.cancel.cancel();
            let _ = running.task.await;
            info!(endpoint = %self.endpoint, "client stopped");
        }
        self.registry.clear();
    }

    /// Register a listener for one prompt or for all events.
    pub fn add_listener(
        &self,
        filter: PromptFilter,
        target: DeliveryTarget,
    ) -> Result<ListenerHandle, RegistryError> {
        self.registry.register(filter, target)
    }

    /// Remove a listener. Removing one that is already gone is a no-op.
    pub fn remove_listener(&self, handle: &ListenerHandle) {
        self.registry.unregister(handle);
    }

    /// Current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.registry.len()
    }

    /// The endpoint this client connects to.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}
