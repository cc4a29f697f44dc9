use std::sync::Arc;

use log::{debug, error};
use tokio::sync::{mpsc, oneshot};

use super::KeyValueStore;

enum PersistCommand {
    Set { key: String, value: String },
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget writer in front of a [`KeyValueStore`].
///
/// A single task drains the queue, so writes land in the order they were
/// enqueued. Enqueueing never blocks and never fails loudly; storage errors
/// are logged by the writer.
#[derive(Clone)]
pub struct PersistQueue {
    sender: mpsc::UnboundedSender<PersistCommand>,
}

impl PersistQueue {
    /// Spawn the writer task on the current tokio runtime.
    pub fn spawn(store: Arc<dyn KeyValueStore>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<PersistCommand>();

        tokio::spawn(async move {
            while let Some(command) = receiver.recv().await {
                match command {
                    PersistCommand::Set { key, value } => {
                        if let Err(err) = store.set(&key, value).await {
                            error!("Failed to persist '{key}': {err:#}");
                        }
                    }
                    PersistCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("Persist queue closed");
        });

        Self { sender }
    }

    /// A queue with no writer. Everything enqueued is dropped; useful for
    /// purely in-memory state.
    pub fn disconnected() -> Self {
        let (sender, _receiver) = mpsc::unbounded_channel();
        Self { sender }
    }

    pub fn set(&self, key: &str, value: String) {
        let command = PersistCommand::Set {
            key: key.to_string(),
            value,
        };
        if self.sender.send(command).is_err() {
            debug!("Persist queue closed; dropping write for '{key}'");
        }
    }

    /// Wait until every write enqueued before this call has been applied.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.sender.send(PersistCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}
