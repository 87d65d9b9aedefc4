//! Conversation Store: per-thread turn log persisted as one JSON document.
//!
//! Document shape: `{ "<thread id>": [ { "role": "user", "text": "..." }, ... ] }`.
//! Records are append-only. Reads never fail: a missing document is an
//! empty store, a corrupt or unreadable one is logged and treated as empty.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// The message that arrived in the inbox.
    #[serde(rename = "user", alias = "inbound")]
    Inbound,
    /// The reply we generated and sent.
    #[serde(rename = "assistant", alias = "generated")]
    Generated,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Self::Inbound => "USER",
            Self::Generated => "ASSISTANT",
        }
    }
}

/// One logged utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    pub fn inbound(text: impl Into<String>) -> Self {
        Self::new(Role::Inbound, text)
    }

    pub fn generated(text: impl Into<String>) -> Self {
        Self::new(Role::Generated, text)
    }
}

type Document = BTreeMap<String, Vec<Turn>>;

/// File-backed conversation history.
pub struct ConversationStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ConversationStore {
    /// Create a store backed by the document at `path`. Nothing is read or
    /// written until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one turn to `thread_id`, creating the record if absent.
    pub async fn append(&self, thread_id: &str, role: Role, text: &str) -> Result<(), StoreError> {
        self.append_turns(thread_id, vec![Turn::new(role, text)])
            .await
    }

    /// Append several turns to `thread_id` in one durable write.
    ///
    /// The document is on disk (fsynced, then renamed into place) before
    /// this returns.
    pub async fn append_turns(&self, thread_id: &str, turns: Vec<Turn>) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut doc = match self.load().await {
            Ok(doc) => doc,
            Err(StoreError::NotFound(_)) => Document::new(),
            Err(StoreError::Corrupt { path, reason }) => {
                warn!(path = %path, reason = %reason, "Conversation store corrupt; starting fresh");
                self.quarantine().await;
                Document::new()
            }
            Err(e) => return Err(e),
        };

        let added = turns.len();
        doc.entry(thread_id.to_string()).or_default().extend(turns);
        self.write_atomic(&doc).await?;

        debug!(thread_id = thread_id, added, "Appended conversation turns");
        Ok(())
    }

    /// The last `max_turns` turns of `thread_id`, oldest first. Empty when
    /// the thread or the document is absent.
    pub async fn recent_turns(&self, thread_id: &str, max_turns: usize) -> Vec<Turn> {
        let mut doc = self.load_or_empty().await;
        let Some(turns) = doc.remove(thread_id) else {
            return Vec::new();
        };
        let skip = turns.len().saturating_sub(max_turns);
        turns.into_iter().skip(skip).collect()
    }

    /// Recent turns rendered as `ROLE: text` lines.
    pub async fn render_recent(&self, thread_id: &str, max_turns: usize) -> String {
        render_turns(&self.recent_turns(thread_id, max_turns).await)
    }

    /// Number of turns stored for `thread_id`.
    pub async fn turn_count(&self, thread_id: &str) -> usize {
        self.load_or_empty()
            .await
            .get(thread_id)
            .map_or(0, Vec::len)
    }

    async fn load(&self) -> Result<Document, StoreError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(self.path.display().to_string()));
            }
            Err(e) => return Err(StoreError::Io(e)),
        };
        serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }

    async fn load_or_empty(&self) -> Document {
        match self.load().await {
            Ok(doc) => doc,
            Err(StoreError::NotFound(_)) => Document::new(),
            Err(e) => {
                warn!(error = %e, "Conversation store unreadable; treating as empty");
                Document::new()
            }
        }
    }

    /// Move a corrupt document aside so its bytes survive the next write.
    async fn quarantine(&self) {
        let mut target = self.path.clone().into_os_string();
        target.push(".corrupt");
        if let Err(e) = fs::rename(&self.path, &target).await {
            warn!(error = %e, "Failed to move corrupt conversation store aside");
        }
    }

    async fn write_atomic(&self, doc: &Document) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(doc)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = fs::File::create(&tmp).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &self.path).await?;
        sync_parent(&self.path).await?;
        Ok(())
    }
}

/// Flush the directory entry so the rename itself survives a crash.
#[cfg(unix)]
async fn sync_parent(path: &Path) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::File::open(dir).await?.sync_all().await?;
    Ok(())
}

// Directories cannot be opened for syncing here.
#[cfg(not(unix))]
async fn sync_parent(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

/// Render turns as `ROLE: text`, one per line.
pub fn render_turns(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role.label(), t.text))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (ConversationStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = ConversationStore::new(dir.path().join("history.json"));
        (store, dir)
    }

    #[tokio::test]
    async fn missing_document_reads_empty() {
        let (store, _dir) = test_store();
        assert!(store.recent_turns("t1", 6).await.is_empty());
        assert_eq!(store.render_recent("t1", 6).await, "");
    }

    #[tokio::test]
    async fn append_creates_record_lazily() {
        let (store, _dir) = test_store();
        store.append("t1", Role::Inbound, "hello").await.unwrap();
        assert!(store.path().exists());
        assert_eq!(store.recent_turns("t1", 6).await, vec![Turn::inbound("hello")]);
        assert!(store.recent_turns("other", 6).await.is_empty());
    }

    #[tokio::test]
    async fn recent_turns_keeps_last_n_in_order() {
        let (store, _dir) = test_store();
        for i in 0..5 {
            store.append("t1", Role::Inbound, &format!("q{i}")).await.unwrap();
            store.append("t1", Role::Generated, &format!("a{i}")).await.unwrap();
        }
        let recent = store.recent_turns("t1", 3).await;
        assert_eq!(
            recent,
            vec![
                Turn::generated("a3"),
                Turn::inbound("q4"),
                Turn::generated("a4"),
            ]
        );
        assert_eq!(store.turn_count("t1").await, 10);
    }

    #[tokio::test]
    async fn append_never_rewrites_earlier_turns() {
        let (store, _dir) = test_store();
        store
            .append_turns("t1", vec![Turn::inbound("first"), Turn::generated("reply")])
            .await
            .unwrap();
        let before = store.recent_turns("t1", 100).await;
        store
            .append_turns("t1", vec![Turn::inbound("second"), Turn::generated("reply 2")])
            .await
            .unwrap();
        let after = store.recent_turns("t1", 100).await;
        assert_eq!(&after[..2], &before[..]);
        assert_eq!(after.len(), 4);
    }

    #[tokio::test]
    async fn persisted_format_uses_user_and_assistant() {
        let (store, _dir) = test_store();
        store
            .append_turns("t1", vec![Turn::inbound("hi"), Turn::generated("hello")])
            .await
            .unwrap();
        let raw = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["t1"][0]["role"], "user");
        assert_eq!(value["t1"][0]["text"], "hi");
        assert_eq!(value["t1"][1]["role"], "assistant");
    }

    #[tokio::test]
    async fn reads_inbound_generated_aliases() {
        let (store, _dir) = test_store();
        std::fs::write(
            store.path(),
            r#"{"t1": [{"role": "inbound", "text": "q"}, {"role": "generated", "text": "a"}]}"#,
        )
        .unwrap();
        assert_eq!(
            store.recent_turns("t1", 6).await,
            vec![Turn::inbound("q"), Turn::generated("a")]
        );
    }

    #[tokio::test]
    async fn corrupt_document_reads_empty() {
        let (store, _dir) = test_store();
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(store.recent_turns("t1", 6).await.is_empty());
    }

    #[tokio::test]
    async fn append_over_corrupt_document_keeps_backup() {
        let (store, dir) = test_store();
        std::fs::write(store.path(), "{not json").unwrap();
        store.append("t1", Role::Inbound, "fresh").await.unwrap();

        assert_eq!(store.recent_turns("t1", 6).await, vec![Turn::inbound("fresh")]);
        let backup = dir.path().join("history.json.corrupt");
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "{not json");
    }

    #[tokio::test]
    async fn no_temp_file_left_behind() {
        let (store, dir) = test_store();
        store.append("t1", Role::Inbound, "x").await.unwrap();
        assert!(!dir.path().join("history.json.tmp").exists());
    }

    #[tokio::test]
    async fn render_uses_role_labels() {
        let (store, _dir) = test_store();
        store
            .append_turns(
                "t1",
                vec![
                    Turn::inbound("From alice@example.com: hi"),
                    Turn::generated("Hello Alice"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(
            store.render_recent("t1", 6).await,
            "USER: From alice@example.com: hi\nASSISTANT: Hello Alice"
        );
    }

    #[tokio::test]
    async fn append_into_new_nested_directory_is_synced() {
        let dir = TempDir::new().unwrap();
        let store = ConversationStore::new(dir.path().join("state").join("history.json"));
        store.append("t1", Role::Inbound, "hello").await.unwrap();
        assert_eq!(store.turn_count("t1").await, 1);

        sync_parent(store.path()).await.unwrap();
        sync_parent(Path::new("history.json")).await.unwrap();
    }
}
