//! Persistence Bridge
//!
//! Background worker that owns the durable store and applies write/delete
//! requests received over a queue. Requests are fire-and-forget for the
//! caller; the window between an in-memory change and its durable mirror is
//! closed by [`PersistenceBridge::flush`].

use std::sync::Mutex;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::persistence::{DurableStore, PersistedEntry};

// == Commands ==
#[derive(Debug)]
enum PersistCommand {
    Put(PersistedEntry),
    Delete(Vec<String>),
    Clear,
    Load(oneshot::Sender<Vec<PersistedEntry>>),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

// == Persistence Bridge ==
/// Handle to the persistence worker.
#[derive(Debug)]
pub struct PersistenceBridge {
    tx: mpsc::UnboundedSender<PersistCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PersistenceBridge {
    // == Spawn ==
    /// Starts the worker on the current tokio runtime.
    ///
    /// The store is not opened until the first request arrives.
    pub fn spawn(store: Box<dyn DurableStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = PersistenceWorker {
            store,
            opened: false,
        };
        let handle = tokio::spawn(worker.run(rx));
        Self {
            tx,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Queues a write of `entry`.
    pub fn put(&self, entry: PersistedEntry) {
        self.send(PersistCommand::Put(entry));
    }

    /// Queues deletion of `keys`.
    pub fn delete(&self, keys: Vec<String>) {
        if !keys.is_empty() {
            self.send(PersistCommand::Delete(keys));
        }
    }

    /// Queues removal of every durable record.
    pub fn clear(&self) {
        self.send(PersistCommand::Clear);
    }

    // == Load ==
    /// Reads every durable record after all queued requests were applied.
    ///
    /// Returns an empty list if the store cannot be read.
    pub async fn load(&self) -> Vec<PersistedEntry> {
        let (tx, rx) = oneshot::channel();
        self.send(PersistCommand::Load(tx));
        rx.await.unwrap_or_default()
    }

    // == Flush ==
    /// Waits until every request queued before this call was applied.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(PersistCommand::Flush(tx));
        let _ = rx.await;
    }

    // == Shutdown ==
    /// Applies outstanding requests, then stops the worker.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(PersistCommand::Shutdown(tx));
        let _ = rx.await;

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn send(&self, command: PersistCommand) {
        if self.tx.send(command).is_err() {
            debug!("Persistence worker stopped, request dropped");
        }
    }
}

// == Worker ==
#[derive(Debug)]
struct PersistenceWorker {
    store: Box<dyn DurableStore>,
    opened: bool,
}

impl PersistenceWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<PersistCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                PersistCommand::Put(entry) => {
                    let key = entry.key.clone();
                    if let Err(e) = self.put(entry).await {
                        warn!(key = %key, error = %e, "Failed to mirror entry to durable store");
                    }
                }
                PersistCommand::Delete(keys) => {
                    if let Err(e) = self.delete(&keys).await {
                        warn!(count = keys.len(), error = %e, "Failed to delete durable entries");
                    }
                }
                PersistCommand::Clear => {
                    if let Err(e) = self.clear().await {
                        warn!(error = %e, "Failed to clear durable store");
                    }
                }
                PersistCommand::Load(reply) => {
                    let records = match self.load().await {
                        Ok(records) => records,
                        Err(e) => {
                            warn!(error = %e, "Failed to read durable store");
                            Vec::new()
                        }
                    };
                    let _ = reply.send(records);
                }
                PersistCommand::Flush(reply) => {
                    let _ = reply.send(());
                }
                PersistCommand::Shutdown(reply) => {
                    let _ = reply.send(());
                    break;
                }
            }
        }
        info!("Persistence worker stopped");
    }

    async fn ensure_open(&mut self) -> Result<()> {
        if !self.opened {
            self.store.open().await?;
            self.opened = true;
        }
        Ok(())
    }

    async fn put(&mut self, entry: PersistedEntry) -> Result<()> {
        self.ensure_open().await?;
        self.store.put(entry).await
    }

    async fn delete(&mut self, keys: &[String]) -> Result<()> {
        self.ensure_open().await?;
        self.store.delete(keys).await
    }

    async fn clear(&mut self) -> Result<()> {
        self.ensure_open().await?;
        self.store.clear().await
    }

    async fn load(&mut self) -> Result<Vec<PersistedEntry>> {
        self.ensure_open().await?;
        self.store.load_all().await
    }
}
