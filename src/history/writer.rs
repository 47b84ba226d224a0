use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::store::HistoryStore;
use super::{ActorContext, CaseRecord};

enum Command {
    Append {
        action: String,
        records: Vec<CaseRecord>,
        actor: ActorContext,
    },
    Flush(oneshot::Sender<()>),
}

/// Cheaply cloneable handle for recording history.
///
/// Callers use `append()` to push a unit of work into the queue. A single
/// background task applies units one at a time, in the order they were
/// appended, each one a full read-merge-write of the day file.
#[derive(Clone)]
pub struct HistoryWriter {
    tx: mpsc::UnboundedSender<Command>,
}

impl HistoryWriter {
    /// Queue one entry per record. Non-blocking; never fails for the caller.
    pub fn append(&self, action: &str, records: Vec<CaseRecord>, actor: &ActorContext) {
        if records.is_empty() {
            return;
        }
        let count = records.len();
        let command = Command::Append {
            action: action.to_string(),
            records,
            actor: actor.clone(),
        };
        if self.tx.send(command).is_err() {
            log::error!(
                "History queue closed, {} entries for {} dropped",
                count,
                action
            );
        }
    }

    /// Wait until every unit queued before this call has been applied.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

/// Create the history writer and return its handle.
///
/// The caller is responsible for spawning the returned future. It runs until
/// every handle has been dropped and the queue is drained.
pub fn create(store: Arc<HistoryStore>) -> (HistoryWriter, impl std::future::Future<Output = ()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = HistoryWriter { tx };
    let future = run(rx, store);
    (writer, future)
}

async fn run(mut rx: mpsc::UnboundedReceiver<Command>, store: Arc<HistoryStore>) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Append {
                action,
                records,
                actor,
            } => match store.append(&action, records, &actor).await {
                Ok((path, count)) => {
                    log::info!("History updated: {} x{} -> {}", action, count, path.display())
                }
                Err(e) => log::error!("History write for {} failed: {}", action, e),
            },
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    log::info!("History queue closed");
}
