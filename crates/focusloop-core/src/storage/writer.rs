//! Fire-and-forget persistence.
//!
//! Ledger and stats writes are queued and applied by one background thread,
//! in order. Callers never wait on I/O; failures are logged and dropped since
//! the in-memory state stays authoritative for the life of the process.

use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::JoinHandle;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{SessionRecord, SettingsStore, StatsStore};
use crate::error::Result;
use crate::timer::{BreakBudget, Streak};

enum WriteOp {
    BreakBudget(BreakBudget),
    Streak(Streak),
    Session(SessionRecord),
    Flush(std_mpsc::Sender<()>),
    Shutdown,
}

/// Cheap handle for enqueueing writes.
#[derive(Clone)]
pub struct WriteQueue {
    tx: mpsc::UnboundedSender<WriteOp>,
}

impl WriteQueue {
    pub fn break_budget(&self, budget: BreakBudget) {
        self.send(WriteOp::BreakBudget(budget));
    }

    pub fn streak(&self, streak: Streak) {
        self.send(WriteOp::Streak(streak));
    }

    pub fn session(&self, record: SessionRecord) {
        self.send(WriteOp::Session(record));
    }

    /// Block until every write queued before this call has been applied.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = std_mpsc::channel();
        self.send(WriteOp::Flush(ack_tx));
        // An error means the writer already stopped; nothing left to wait for.
        let _ = ack_rx.recv();
    }

    fn send(&self, op: WriteOp) {
        if self.tx.send(op).is_err() {
            warn!("persistence writer stopped; dropping write");
        }
    }
}

/// Owns the writer thread. Dropping it drains the queue and joins the thread.
pub struct PersistenceWriter {
    queue: WriteQueue,
    worker: Option<JoinHandle<()>>,
}

impl PersistenceWriter {
    pub fn spawn(settings: Arc<dyn SettingsStore>, stats: Arc<dyn StatsStore>) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = std::thread::Builder::new()
            .name("focusloop-writer".into())
            .spawn(move || run(rx, settings, stats))?;
        Ok(Self {
            queue: WriteQueue { tx },
            worker: Some(worker),
        })
    }

    pub fn queue(&self) -> WriteQueue {
        self.queue.clone()
    }
}

impl Drop for PersistenceWriter {
    fn drop(&mut self) {
        self.queue.send(WriteOp::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("persistence writer panicked");
            }
        }
    }
}

fn run(
    mut rx: mpsc::UnboundedReceiver<WriteOp>,
    settings: Arc<dyn SettingsStore>,
    stats: Arc<dyn StatsStore>,
) {
    while let Some(op) = rx.blocking_recv() {
        match op {
            WriteOp::BreakBudget(budget) => {
                if let Err(e) = settings.set_break_budget(&budget) {
                    warn!(error = %e, "failed to persist break budget");
                }
            }
            WriteOp::Streak(streak) => {
                if let Err(e) = settings.set_streak(&streak) {
                    warn!(error = %e, "failed to persist streak");
                }
            }
            WriteOp::Session(record) => {
                if let Err(e) = stats.record_session(&record) {
                    warn!(error = %e, label = %record.label, "failed to record session");
                }
            }
            WriteOp::Flush(ack) => {
                let _ = ack.send(());
            }
            WriteOp::Shutdown => break,
        }
    }
    debug!("persistence writer stopped");
}
