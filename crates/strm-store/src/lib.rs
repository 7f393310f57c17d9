//! strm-store
//!
//! Stream Repository: the single local authority for stream records.
//!
//! Each record has two parts:
//! - the committed copy, which readers clone without waiting on writers;
//! - a per-id write gate (`tokio::sync::Mutex<()>`) that serializes every
//!   `upsert`, `mutate` and [`StreamGuard`] on that id.
//!
//! A [`StreamGuard`] can be held across an `.await` (the Lifecycle Engine
//! holds it while the ledger call is in flight) so a reader sees either the
//! state before the transition or after it, never a half-applied one. There
//! is no repository-wide write lock; the id map lock is held only to find or
//! insert an entry.
//!
//! Records are never deleted.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use strm_schemas::Stream;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    NotFound { id: String },
    DuplicateId { id: String },
}

impl fmt::Display for RepoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoError::NotFound { id } => write!(f, "stream not found: {id}"),
            RepoError::DuplicateId { id } => write!(f, "stream id already exists: {id}"),
        }
    }
}

impl std::error::Error for RepoError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

#[derive(Debug)]
struct Entry {
    committed: RwLock<Stream>,
    gate: Arc<Mutex<()>>,
}

impl Entry {
    fn new(stream: Stream) -> Arc<Self> {
        Arc::new(Self {
            committed: RwLock::new(stream),
            gate: Arc::new(Mutex::new(())),
        })
    }
}

/// Exclusive write access to one record.
///
/// Dropping the guard without [`commit`](StreamGuard::commit) leaves the
/// record unchanged.
pub struct StreamGuard {
    entry: Arc<Entry>,
    _permit: OwnedMutexGuard<()>,
}

impl StreamGuard {
    /// Current committed state (clone).
    pub async fn current(&self) -> Stream {
        self.entry.committed.read().await.clone()
    }

    /// Replace the committed state. The id is fixed for the record's lifetime.
    pub async fn commit(&self, stream: Stream) {
        let mut w = self.entry.committed.write().await;
        debug_assert_eq!(w.id, stream.id, "commit must not change the stream id");
        *w = stream;
    }
}

#[derive(Debug, Default)]
pub struct StreamRepository {
    entries: RwLock<BTreeMap<String, Arc<Entry>>>,
}

impl StreamRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, id: &str) -> Option<Arc<Entry>> {
        self.entries.read().await.get(id).cloned()
    }

    pub async fn get(&self, id: &str) -> Option<Stream> {
        let entry = self.entry(id).await?;
        let s = entry.committed.read().await.clone();
        Some(s)
    }

    /// Snapshot of every record matching `predicate`, ordered by id.
    ///
    /// Writes that commit after this returns are not reflected.
    pub async fn list<F>(&self, predicate: F) -> Vec<Stream>
    where
        F: Fn(&Stream) -> bool,
    {
        let entries: Vec<Arc<Entry>> = self.entries.read().await.values().cloned().collect();
        let mut out = Vec::new();
        for e in entries {
            let s = e.committed.read().await;
            if predicate(&s) {
                out.push(s.clone());
            }
        }
        out
    }

    pub async fn ids(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Insert a record whose id must not exist yet.
    pub async fn insert_new(&self, stream: Stream) -> Result<(), RepoError> {
        let mut map = self.entries.write().await;
        if map.contains_key(&stream.id) {
            return Err(RepoError::DuplicateId { id: stream.id });
        }
        debug!(stream_id = %stream.id, "repository insert");
        map.insert(stream.id.clone(), Entry::new(stream));
        Ok(())
    }

    /// Insert, or replace under the record's write gate.
    pub async fn upsert(&self, stream: Stream) -> UpsertOutcome {
        let existing = {
            let mut map = self.entries.write().await;
            if let Some(e) = map.get(&stream.id).cloned() {
                e
            } else {
                debug!(stream_id = %stream.id, "repository insert");
                map.insert(stream.id.clone(), Entry::new(stream));
                return UpsertOutcome::Inserted;
            }
        };
        let _permit = existing.gate.clone().lock_owned().await;
        *existing.committed.write().await = stream;
        UpsertOutcome::Replaced
    }

    /// Apply `f` to a copy of the record and commit it, atomically with
    /// respect to every other writer of the same id.
    pub async fn mutate<R, F>(&self, id: &str, f: F) -> Result<R, RepoError>
    where
        F: FnOnce(&mut Stream) -> R,
    {
        let guard = self.lock(id).await?;
        let mut next = guard.current().await;
        let out = f(&mut next);
        guard.commit(next).await;
        Ok(out)
    }

    /// Acquire the write gate for `id`. Waits for any in-flight writer.
    pub async fn lock(&self, id: &str) -> Result<StreamGuard, RepoError> {
        let entry = self.entry(id).await.ok_or_else(|| RepoError::NotFound {
            id: id.to_string(),
        })?;
        let permit = entry.gate.clone().lock_owned().await;
        Ok(StreamGuard {
            entry,
            _permit: permit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use strm_schemas::Amount;

    fn stream(id: &str) -> Stream {
        Stream {
            id: id.to_string(),
            sender: "GSENDER".to_string(),
            recipient: "GRECIP".to_string(),
            asset_code: "USDC".to_string(),
            total_amount: Amount::from_units(100).unwrap(),
            duration_seconds: 3_600,
            start_at: 1_000,
            canceled_at: None,
            claimed_amount: Amount::ZERO,
            version: 1,
            last_synced_at: None,
            recorded_at: 900,
        }
    }

    #[tokio::test]
    async fn insert_new_enforces_unique_ids() {
        let repo = StreamRepository::new();
        repo.insert_new(stream("a")).await.unwrap();
        let err = repo.insert_new(stream("a")).await.unwrap_err();
        assert_eq!(err, RepoError::DuplicateId { id: "a".to_string() });
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn list_is_ordered_by_id_and_filtered() {
        let repo = StreamRepository::new();
        for id in ["c", "a", "b"] {
            repo.upsert(stream(id)).await;
        }
        repo.mutate("b", |s| s.canceled_at = Some(5)).await.unwrap();

        let all: Vec<String> = repo.list(|_| true).await.into_iter().map(|s| s.id).collect();
        assert_eq!(all, vec!["a", "b", "c"]);

        let canceled = repo.list(|s| s.is_canceled()).await;
        assert_eq!(canceled.len(), 1);
        assert_eq!(canceled[0].id, "b");
    }

    #[tokio::test]
    async fn mutate_unknown_id_is_not_found() {
        let repo = StreamRepository::new();
        let err = repo.mutate("nope", |_| ()).await.unwrap_err();
        assert_eq!(err, RepoError::NotFound { id: "nope".to_string() });
    }

    #[tokio::test]
    async fn dropped_guard_leaves_record_unchanged() {
        let repo = StreamRepository::new();
        repo.upsert(stream("a")).await;
        {
            let g = repo.lock("a").await.unwrap();
            let mut s = g.current().await;
            s.start_at = 99;
        }
        assert_eq!(repo.get("a").await.unwrap().start_at, 1_000);
    }

    #[tokio::test]
    async fn readers_are_not_blocked_by_a_held_guard() {
        let repo = StreamRepository::new();
        repo.upsert(stream("a")).await;
        let g = repo.lock("a").await.unwrap();
        let read = tokio::time::timeout(Duration::from_millis(200), repo.get("a")).await;
        assert!(read.unwrap().is_some());
        drop(g);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_mutations_on_one_id_lose_no_updates() {
        let repo = Arc::new(StreamRepository::new());
        repo.upsert(stream("a")).await;

        let mut tasks = Vec::new();
        for _ in 0..50 {
            let repo = repo.clone();
            tasks.push(tokio::spawn(async move {
                repo.mutate("a", |s| s.version += 1).await.unwrap();
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(repo.get("a").await.unwrap().version, 51);
    }

    #[tokio::test]
    async fn guard_serializes_with_mutate() {
        let repo = Arc::new(StreamRepository::new());
        repo.upsert(stream("a")).await;

        let g = repo.lock("a").await.unwrap();
        let r2 = repo.clone();
        let waiter = tokio::spawn(async move { r2.mutate("a", |s| s.version).await.unwrap() });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let mut s = g.current().await;
        s.version = 7;
        g.commit(s).await;
        drop(g);

        assert_eq!(waiter.await.unwrap(), 7);
    }
}
