//! Event delivery for the app-shell cache
//!
//! Lifecycle and fetch events arrive over a tokio channel and are dispatched
//! to the `AssetCacheManager` by a single background task. Every event
//! carries a reply channel so the sender knows when its handler finished.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use super::{AssetCacheManager, AssetRequest, Served, ShellError};

/// Capacity of the event channel
const EVENT_BUFFER: usize = 32;

/// Events handled by the worker
#[derive(Debug)]
pub enum ShellEvent {
    /// Populate the current cache from the manifest
    Install {
        reply: oneshot::Sender<Result<usize, ShellError>>,
    },
    /// Drop older caches and start intercepting
    Activate {
        reply: oneshot::Sender<Result<Vec<String>, ShellError>>,
    },
    /// Answer an outbound request
    Fetch {
        request: AssetRequest,
        reply: oneshot::Sender<Served>,
    },
    /// Wait for background cache writes
    Flush { reply: oneshot::Sender<()> },
}

/// Handle to the background task that owns event dispatch
pub struct ShellWorker {
    events: mpsc::Sender<ShellEvent>,
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ShellWorker {
    /// Spawns the dispatch loop for `manager`
    ///
    /// Install, activate and flush run inside the loop, so a fetch sent after
    /// an activate is only seen once activation has completed. Fetches each
    /// run in their own task and do not block one another.
    pub fn spawn(manager: Arc<AssetCacheManager>) -> Self {
        let (events, mut event_rx) = mpsc::channel(EVENT_BUFFER);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = event_rx.recv() => {
                        match event {
                            Some(event) => dispatch(&manager, event).await,
                            None => break,
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
            manager.flush().await;
            debug!("Shell worker stopped");
        });

        Self {
            events,
            shutdown_tx,
            task,
        }
    }

    pub async fn install(&self) -> Result<usize, ShellError> {
        let (reply, rx) = oneshot::channel();
        self.send(ShellEvent::Install { reply }).await?;
        rx.await.map_err(|_| ShellError::WorkerStopped)?
    }

    pub async fn activate(&self) -> Result<Vec<String>, ShellError> {
        let (reply, rx) = oneshot::channel();
        self.send(ShellEvent::Activate { reply }).await?;
        rx.await.map_err(|_| ShellError::WorkerStopped)?
    }

    /// Routes `request` through the manager; `Unavailable` if the worker is gone
    pub async fn fetch(&self, request: AssetRequest) -> Served {
        let (reply, rx) = oneshot::channel();
        if self.send(ShellEvent::Fetch { request, reply }).await.is_err() {
            return Served::Unavailable;
        }
        rx.await.unwrap_or(Served::Unavailable)
    }

    pub async fn flush(&self) -> Result<(), ShellError> {
        let (reply, rx) = oneshot::channel();
        self.send(ShellEvent::Flush { reply }).await?;
        rx.await.map_err(|_| ShellError::WorkerStopped)
    }

    /// Stops the loop after pending cache writes land
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }

    async fn send(&self, event: ShellEvent) -> Result<(), ShellError> {
        self.events
            .send(event)
            .await
            .map_err(|_| ShellError::WorkerStopped)
    }
}

async fn dispatch(manager: &Arc<AssetCacheManager>, event: ShellEvent) {
    match event {
        ShellEvent::Install { reply } => {
            let _ = reply.send(manager.install().await);
        }
        ShellEvent::Activate { reply } => {
            let _ = reply.send(manager.activate().await);
        }
        ShellEvent::Fetch { request, reply } => {
            let manager = Arc::clone(manager);
            tokio::spawn(async move {
                let served = manager.intercept(&request).await;
                let _ = reply.send(served);
            });
        }
        ShellEvent::Flush { reply } => {
            manager.flush().await;
            let _ = reply.send(());
        }
    }
}
