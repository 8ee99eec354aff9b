//! Thread-safe in-memory record stores

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::{RwLock, broadcast};

/// A record with a store-assigned id
pub trait Record: Clone + Send + Sync + 'static {
    fn id(&self) -> u64;
}

/// Changes broadcast by a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Inserted { kind: &'static str, id: u64 },
    Updated { kind: &'static str, id: u64 },
    Removed { kind: &'static str, id: u64 },
    Restored { kind: &'static str, count: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("A user with that username already exists.")]
    DuplicateUsername(String),
}

/// Code snippet as stored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snippet {
    pub id: u64,
    pub created: chrono::DateTime<chrono::Utc>,
    pub title: String,
    pub code: String,
    pub linenos: bool,
    pub language: String,
    pub style: String,
    /// Owning user id
    pub owner: u64,
    /// Rendered HTML document, recomputed on every save
    pub highlighted: String,
}

impl Record for Snippet {
    fn id(&self) -> u64 {
        self.id
    }
}

/// API user as stored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: u64,
    pub username: String,
    /// argon2 PHC string
    pub password_hash: String,
}

impl Record for User {
    fn id(&self) -> u64 {
        self.id
    }
}

pub type SnippetStore = Store<Snippet>;
pub type UserStore = Store<User>;

/// Records keyed by id, iterated in id (creation) order
pub struct Store<T> {
    kind: &'static str,
    records: RwLock<BTreeMap<u64, T>>,
    next_id: AtomicU64,
    event_tx: broadcast::Sender<StoreEvent>,
}

impl<T: Record> Store<T> {
    pub fn new(kind: &'static str) -> Self {
        let (event_tx, _) = broadcast::channel(100);

        Self {
            kind,
            records: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            event_tx,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Subscribe to change events
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.event_tx.subscribe()
    }

    /// Insert a record built from the next free id
    pub async fn insert_with<F>(&self, build: F) -> T
    where
        F: FnOnce(u64) -> T,
    {
        let result: Result<T, std::convert::Infallible> =
            self.try_insert_with(|id, _| Ok(build(id))).await;
        match result {
            Ok(record) => record,
            Err(never) => match never {},
        }
    }

    /// Insert a record, letting `build` inspect existing records and refuse
    pub async fn try_insert_with<F, E>(&self, build: F) -> Result<T, E>
    where
        F: FnOnce(u64, &BTreeMap<u64, T>) -> Result<T, E>,
    {
        let mut records = self.records.write().await;

        let id = self.next_id.load(Ordering::SeqCst);
        let record = build(id, &records)?;
        self.next_id.store(id + 1, Ordering::SeqCst);
        records.insert(id, record.clone());

        tracing::debug!(kind = self.kind, id, total = records.len(), "Record inserted");
        let _ = self.event_tx.send(StoreEvent::Inserted {
            kind: self.kind,
            id,
        });

        Ok(record)
    }

    pub async fn get(&self, id: u64) -> Option<T> {
        self.records.read().await.get(&id).cloned()
    }

    pub async fn list(&self) -> Vec<T> {
        self.records.read().await.values().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Modify a record in place; `None` if it no longer exists
    pub async fn update<F>(&self, id: u64, apply: F) -> Option<T>
    where
        F: FnOnce(&mut T),
    {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id)?;
        apply(record);
        let updated = record.clone();
        drop(records);

        let _ = self.event_tx.send(StoreEvent::Updated {
            kind: self.kind,
            id,
        });

        Some(updated)
    }

    pub async fn remove(&self, id: u64) -> Option<T> {
        let removed = self.records.write().await.remove(&id)?;

        tracing::debug!(kind = self.kind, id, "Record removed");
        let _ = self.event_tx.send(StoreEvent::Removed {
            kind: self.kind,
            id,
        });

        Some(removed)
    }

    /// Replace all records, e.g. from persisted state
    pub async fn restore(&self, restored: Vec<T>) {
        let mut records = self.records.write().await;
        records.clear();
        for record in restored {
            records.insert(record.id(), record);
        }

        let next = records.keys().next_back().map_or(1, |max| max + 1);
        self.next_id.store(next, Ordering::SeqCst);
        let count = records.len();
        drop(records);

        let _ = self.event_tx.send(StoreEvent::Restored {
            kind: self.kind,
            count,
        });
    }
}

impl Store<User> {
    pub async fn find_by_username(&self, username: &str) -> Option<User> {
        self.records
            .read()
            .await
            .values()
            .find(|user| user.username == username)
            .cloned()
    }

    /// Add a user with an already hashed password
    pub async fn create_user(
        &self,
        username: &str,
        password_hash: String,
    ) -> Result<User, StoreError> {
        self.try_insert_with(|id, existing| {
            if existing.values().any(|user| user.username == username) {
                return Err(StoreError::DuplicateUsername(username.to_string()));
            }
            Ok(User {
                id,
                username: username.to_string(),
                password_hash,
            })
        })
        .await
    }
}

impl Store<Snippet> {
    /// Snippets owned by `owner`, in creation order
    pub async fn owned_by(&self, owner: u64) -> Vec<Snippet> {
        self.records
            .read()
            .await
            .values()
            .filter(|snippet| snippet.owner == owner)
            .cloned()
            .collect()
    }
}
