//! Conversation memory: ordered turns per conversation, persisted on every append.

use crate::traits::{ChannelError, ChannelResult};
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Turns keyed by conversation identity, oldest first.
pub type Histories = HashMap<String, Vec<Turn>>;

/// Backing store for the full history mapping.
///
/// Calls block; `ConversationMemory` runs saves off the async workers.
pub trait HistoryStore: Send + Sync + 'static {
    /// Load everything. A missing store is an empty mapping.
    fn load(&self) -> ChannelResult<Histories>;

    /// Replace the stored mapping.
    fn save(&self, histories: &Histories) -> ChannelResult<()>;
}

/// JSON document on disk: `{"#channel": [{"role": "user", "content": "..."}]}`.
///
/// Saves go to a sibling temporary file which is then renamed over the
/// target, so readers never see a partially written document. A document
/// that cannot be read or parsed is moved aside to `<name>.corrupt` before
/// the load error is returned, so the next save never replaces it.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    /// Set when an unreadable document could not be moved aside.
    read_only: AtomicBool,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            read_only: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "chat_memory.json".into());
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn temp_path(&self) -> PathBuf {
        self.sibling(".tmp")
    }

    /// First free `<name>.corrupt`, `<name>.corrupt.1`, ... path.
    fn quarantine_path(&self) -> PathBuf {
        let first = self.sibling(".corrupt");
        if !first.exists() {
            return first;
        }
        (1..=u32::MAX)
            .map(|n| self.sibling(&format!(".corrupt.{n}")))
            .find(|p| !p.exists())
            .unwrap_or(first)
    }

    fn quarantine(&self, err: ChannelError) -> ChannelError {
        let aside = self.quarantine_path();
        match fs::rename(&self.path, &aside) {
            Ok(()) => {
                tracing::warn!(
                    path = %self.path.display(),
                    moved_to = %aside.display(),
                    error = %err,
                    "Moved unreadable conversation memory aside"
                );
            }
            Err(e) => {
                self.read_only.store(true, Ordering::SeqCst);
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "Cannot move unreadable conversation memory aside, saves disabled"
                );
            }
        }
        err
    }
}

fn persistence_error(context: &str, path: &Path, err: impl std::fmt::Display) -> ChannelError {
    ChannelError::Persistence(format!("{context} {}: {err}", path.display()))
}

impl HistoryStore for JsonFileStore {
    fn load(&self) -> ChannelResult<Histories> {
        if !self.path.exists() {
            return Ok(Histories::new());
        }

        fs::read_to_string(&self.path)
            .map_err(|e| persistence_error("Failed to read", &self.path, e))
            .and_then(|contents| {
                if contents.trim().is_empty() {
                    return Ok(Histories::new());
                }
                serde_json::from_str(&contents)
                    .map_err(|e| persistence_error("Failed to parse", &self.path, e))
            })
            .map_err(|e| self.quarantine(e))
    }

    fn save(&self, histories: &Histories) -> ChannelResult<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(persistence_error(
                "Refusing to overwrite unreadable",
                &self.path,
                "move it aside to re-enable saving",
            ));
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| persistence_error("Failed to create directory for", &self.path, e))?;
        }

        let temp = self.temp_path();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&temp)
            .map_err(|e| persistence_error("Failed to open", &temp, e))?;

        FileExt::lock_exclusive(&file).map_err(|e| persistence_error("Failed to lock", &temp, e))?;

        let result = (|| {
            file.set_len(0)?;
            let mut writer = BufWriter::new(&file);
            serde_json::to_writer(&mut writer, histories)?;
            writer.flush()?;
            drop(writer);
            file.sync_all()?;
            fs::rename(&temp, &self.path)
        })()
        .map_err(|e: std::io::Error| persistence_error("Failed to write", &self.path, e));

        let _ = FileExt::unlock(&file);
        result
    }
}

/// Store that keeps the last saved mapping in memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    saved: Mutex<Histories>,
    saves: Mutex<usize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the store.
    pub fn with_histories(histories: Histories) -> Self {
        Self {
            saved: Mutex::new(histories),
            saves: Mutex::new(0),
        }
    }

    /// Number of completed saves.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn saved(&self) -> Histories {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl HistoryStore for InMemoryStore {
    fn load(&self) -> ChannelResult<Histories> {
        Ok(self.saved())
    }

    fn save(&self, histories: &Histories) -> ChannelResult<()> {
        *self.saved.lock().unwrap_or_else(PoisonError::into_inner) = histories.clone();
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }
}

/// Per-conversation history with write-through persistence.
///
/// Storage is unbounded; only [`ConversationMemory::recent`] limits what is
/// read back. Saves run on the blocking thread pool.
pub struct ConversationMemory<S> {
    store: Arc<S>,
    histories: Mutex<Histories>,
    /// Held across each save so snapshots reach the store in append order.
    persist: tokio::sync::Mutex<()>,
}

impl<S: HistoryStore> ConversationMemory<S> {
    /// Load the full mapping from `store`. Load failures start empty.
    pub fn load(store: S) -> Self {
        let histories = match store.load() {
            Ok(histories) => {
                tracing::info!(
                    conversations = histories.len(),
                    "Conversation memory loaded"
                );
                histories
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load conversation memory, starting empty");
                Histories::new()
            }
        };

        Self {
            store: Arc::new(store),
            histories: Mutex::new(histories),
            persist: tokio::sync::Mutex::new(()),
        }
    }

    /// The last `limit` turns for `identity`, oldest first.
    pub fn recent(&self, identity: &str, limit: usize) -> Vec<Turn> {
        let histories = self.histories.lock().unwrap_or_else(PoisonError::into_inner);
        histories
            .get(identity)
            .map(|turns| turns[turns.len().saturating_sub(limit)..].to_vec())
            .unwrap_or_default()
    }

    /// Append a turn and persist the whole mapping.
    ///
    /// The turn stays visible to reads even when persisting fails.
    pub async fn append(&self, identity: &str, turn: Turn) -> ChannelResult<()> {
        let _persist = self.persist.lock().await;

        let snapshot = {
            let mut histories = self.histories.lock().unwrap_or_else(PoisonError::into_inner);
            histories.entry(identity.to_string()).or_default().push(turn);
            histories.clone()
        };

        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.save(&snapshot))
            .await
            .map_err(|e| ChannelError::Persistence(format!("History save task failed: {e}")))?
    }

    /// Number of turns stored for `identity`.
    pub fn len(&self, identity: &str) -> usize {
        self.histories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.histories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Copy of the full mapping.
    pub fn snapshot(&self) -> Histories {
        self.histories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
