//! State persistence for users and snippets

use crate::store::{Snippet, SnippetStore, StoreEvent, User, UserStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::{self, error::RecvError};

// ============================================================================
// Trait Definitions
// ============================================================================

/// Trait for storage backend operations
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Save content to a file path atomically
    async fn save(&self, path: &Path, content: &str) -> Result<()>;

    /// Load content from a file path
    /// Returns None if file doesn't exist
    async fn load(&self, path: &Path) -> Result<Option<String>>;
}

// ============================================================================
// Production Implementation
// ============================================================================

/// Production storage backend using tokio::fs
#[derive(Default)]
pub struct FileSystemStorage;

#[async_trait]
impl StorageBackend for FileSystemStorage {
    async fn save(&self, path: &Path, content: &str) -> Result<()> {
        // Atomic write: write to temp file, then rename
        let temp_file = path.with_extension("tmp");

        let mut file = fs::File::create(&temp_file)
            .await
            .context("Failed to create temp state file")?;
        file.write_all(content.as_bytes())
            .await
            .context("Failed to write state file")?;
        file.sync_all().await.context("Failed to sync state file")?;

        fs::rename(&temp_file, path)
            .await
            .context("Failed to rename temp state file")?;

        Ok(())
    }

    async fn load(&self, path: &Path) -> Result<Option<String>> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read state file: {:?}", path))?;

        Ok(Some(content))
    }
}

/// On-disk layout of the state file
#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PersistedState {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub snippets: Vec<Snippet>,
}

// ============================================================================
// State Manager with Dependency Injection
// ============================================================================

/// Saves and restores the record stores
pub struct StateManager {
    state_file: PathBuf,
    users: Arc<UserStore>,
    snippets: Arc<SnippetStore>,
    storage: Arc<dyn StorageBackend>,
}

impl StateManager {
    /// Create a new state manager with custom storage backend
    pub fn new_with_storage(
        state_file: PathBuf,
        users: Arc<UserStore>,
        snippets: Arc<SnippetStore>,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            state_file,
            users,
            snippets,
            storage,
        }
    }

    /// Create a new state manager backed by the filesystem
    pub fn new(state_file: PathBuf, users: Arc<UserStore>, snippets: Arc<SnippetStore>) -> Self {
        Self::new_with_storage(state_file, users, snippets, Arc::new(FileSystemStorage))
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    /// Write the current contents of both stores
    pub async fn save(&self) -> Result<()> {
        let state = PersistedState {
            users: self.users.list().await,
            snippets: self.snippets.list().await,
        };

        let content = toml::to_string_pretty(&state).context("Failed to serialize state")?;
        self.storage.save(&self.state_file, &content).await?;

        tracing::debug!(
            users = state.users.len(),
            snippets = state.snippets.len(),
            path = ?self.state_file,
            "State saved"
        );

        Ok(())
    }

    /// Load persisted records into the stores; returns false if there was no state file
    pub async fn restore(&self) -> Result<bool> {
        let Some(content) = self.storage.load(&self.state_file).await? else {
            tracing::info!(path = ?self.state_file, "No state file, starting empty");
            return Ok(false);
        };

        let state: PersistedState =
            toml::from_str(&content).context("Failed to parse state file")?;

        tracing::info!(
            users = state.users.len(),
            snippets = state.snippets.len(),
            "Restoring state"
        );

        self.users.restore(state.users).await;
        self.snippets.restore(state.snippets).await;
        crate::metrics::update_snippet_count(self.snippets.count().await);

        Ok(true)
    }

    /// Save after every store change; runs until the task is aborted
    ///
    /// Subscribes before returning, so changes made after this call are
    /// never missed.
    pub fn run_autosave(self: Arc<Self>) -> impl Future<Output = ()> + Send + 'static {
        let mut user_events = self.users.subscribe();
        let mut snippet_events = self.snippets.subscribe();

        async move {
            loop {
                let event = tokio::select! {
                    event = user_events.recv() => event,
                    event = snippet_events.recv() => event,
                };

                match event {
                    Ok(event) => tracing::trace!(?event, "Store changed"),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Autosave lagged behind store events");
                    }
                    Err(RecvError::Closed) => break,
                }

                // Collapse bursts into one save
                drain(&mut user_events);
                drain(&mut snippet_events);

                if let Err(e) = self.save().await {
                    tracing::error!(error = %e, "Failed to save state");
                }
            }
        }
    }
}

fn drain(events: &mut broadcast::Receiver<StoreEvent>) {
    while let Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) = events.try_recv() {}
}
