//! Single-writer persistence queue.
//!
//! All writes funnel through one background thread. Jobs that pile up while a
//! batch is being written are coalesced per key, newest value wins, so a stale
//! blob can never overwrite a newer one and at most one write per key is in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use indexmap::IndexMap;
use parking_lot::Mutex;

use super::KeyValueStore;

enum Job {
    Put { key: String, value: String },
    Remove { key: String },
    Flush(Sender<()>),
    Shutdown,
}

#[derive(Debug, Default)]
struct Counters {
    written: AtomicU64,
    coalesced: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriterStats {
    pub written: u64,
    pub coalesced: u64,
    pub failed: u64,
}

pub struct WriteQueue {
    tx: Sender<Job>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl WriteQueue {
    pub fn spawn(backend: Arc<dyn KeyValueStore>) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let counters = Arc::new(Counters::default());
        let worker_counters = Arc::clone(&counters);
        let worker = thread::Builder::new()
            .name("kv-writer".into())
            .spawn(move || run_worker(backend, rx, worker_counters))
            .context("spawning persistence writer thread")?;
        Ok(Self {
            tx,
            worker: Mutex::new(Some(worker)),
            counters,
        })
    }

    pub fn put(&self, key: String, value: String) {
        self.send(Job::Put { key, value });
    }

    pub fn remove(&self, key: String) {
        self.send(Job::Remove { key });
    }

    /// Blocks until every job enqueued before this call has been written.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        if self.tx.send(Job::Flush(ack_tx)).is_err() {
            return;
        }
        if ack_rx.recv().is_err() {
            tracing::warn!("persistence writer exited before acknowledging flush");
        }
    }

    pub fn stats(&self) -> WriterStats {
        WriterStats {
            written: self.counters.written.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Drains outstanding writes and stops the worker. Later writes are dropped.
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        self.send(Job::Shutdown);
        if worker.join().is_err() {
            tracing::error!("persistence writer thread panicked");
        }
    }

    fn send(&self, job: Job) {
        if self.tx.send(job).is_err() {
            tracing::warn!("persistence writer is stopped; dropping write");
        }
    }
}

impl Drop for WriteQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(backend: Arc<dyn KeyValueStore>, rx: Receiver<Job>, counters: Arc<Counters>) {
    while let Ok(first) = rx.recv() {
        let mut pending: IndexMap<String, Option<String>> = IndexMap::new();
        let mut acks = Vec::new();
        let mut stop = false;

        for job in std::iter::once(first).chain(rx.try_iter()) {
            match job {
                Job::Put { key, value } => {
                    if pending.insert(key, Some(value)).is_some() {
                        counters.coalesced.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Job::Remove { key } => {
                    if pending.insert(key, None).is_some() {
                        counters.coalesced.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Job::Flush(ack) => acks.push(ack),
                Job::Shutdown => {
                    stop = true;
                    break;
                }
            }
        }

        for (key, value) in pending {
            let result = match &value {
                Some(value) => backend.set_item(&key, value),
                None => backend.remove_item(&key),
            };
            match result {
                Ok(()) => {
                    counters.written.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(?err, key = %key, "persisting entity failed; write skipped");
                }
            }
        }

        for ack in acks {
            let _ = ack.send(());
        }
        if stop {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn flush_waits_for_enqueued_writes() -> anyhow::Result<()> {
        let backend = Arc::new(MemoryStore::new());
        let queue = WriteQueue::spawn(backend.clone())?;
        queue.put("a".into(), "1".into());
        queue.put("b".into(), "2".into());
        queue.flush();
        assert_eq!(backend.get_item("a")?.as_deref(), Some("1"));
        assert_eq!(backend.get_item("b")?.as_deref(), Some("2"));
        Ok(())
    }

    #[test]
    fn last_write_to_a_key_wins() -> anyhow::Result<()> {
        let backend = Arc::new(MemoryStore::new());
        let queue = WriteQueue::spawn(backend.clone())?;
        for n in 0..50 {
            queue.put("counter".into(), n.to_string());
        }
        queue.remove("gone".into());
        queue.flush();
        assert_eq!(backend.get_item("counter")?.as_deref(), Some("49"));
        let stats = queue.stats();
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.written + stats.coalesced, 51);
        Ok(())
    }

    #[test]
    fn failed_writes_are_counted_and_skipped() -> anyhow::Result<()> {
        let backend = Arc::new(MemoryStore::new());
        backend.set_fail_writes(true);
        let queue = WriteQueue::spawn(backend.clone())?;
        queue.put("a".into(), "1".into());
        queue.flush();
        assert_eq!(queue.stats().failed, 1);
        backend.set_fail_writes(false);
        assert_eq!(backend.get_item("a")?, None);
        Ok(())
    }

    #[test]
    fn shutdown_drains_then_drops_later_writes() -> anyhow::Result<()> {
        let backend = Arc::new(MemoryStore::new());
        let queue = WriteQueue::spawn(backend.clone())?;
        queue.put("a".into(), "1".into());
        queue.shutdown();
        assert_eq!(backend.get_item("a")?.as_deref(), Some("1"));
        queue.put("b".into(), "2".into());
        queue.flush();
        assert_eq!(backend.get_item("b")?, None);
        Ok(())
    }
}
