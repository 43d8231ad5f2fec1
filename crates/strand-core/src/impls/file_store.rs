//! FileCompletionStore - 完了識別子ごとの JSON マーカーファイル
//!
//! Layout: `<dir>/<stem>.json`. The stem is the percent-encoded key when that
//! stays short; longer keys use a bounded encoded prefix plus the SHA-256 of
//! the full key, so every identity fits in one file name. A marker is written
//! and synced to `<stem>.tmp-<run id>` first and renamed into place, so a
//! crash never leaves a partial marker behind.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::domain::completion::CompletionMeta;
use crate::domain::errors::StoreError;
use crate::domain::task::TaskKey;
use crate::ports::CompletionStore;

const MARKER_EXT: &str = "json";
/// Longest encoded key used verbatim as a stem.
const MAX_PLAIN_STEM: usize = 96;
/// Encoded bytes kept in front of the digest for longer keys.
const DIGEST_PREFIX: usize = 48;

#[derive(Debug, Clone)]
pub struct FileCompletionStore {
    dir: PathBuf,
}

/// On-disk marker. The key is stored inside since hashed file names cannot
/// be decoded.
#[derive(Debug, Serialize, Deserialize)]
struct Marker {
    key: TaskKey,
    #[serde(flatten)]
    meta: CompletionMeta,
}

impl FileCompletionStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn marker_path(&self, key: &TaskKey) -> PathBuf {
        self.dir.join(format!("{}.{MARKER_EXT}", marker_stem(key)))
    }

    async fn read_marker(path: &Path) -> Result<Option<Marker>, StoreError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let marker = serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Some(marker))
    }
}

/// File stem for `key`. Plain stems are at most `MAX_PLAIN_STEM` bytes and
/// hashed ones always longer, so the two forms never collide.
fn marker_stem(key: &TaskKey) -> String {
    let encoded = urlencoding::encode(key.as_str());
    if encoded.len() <= MAX_PLAIN_STEM {
        return encoded.into_owned();
    }
    // percent-encoded output is ASCII, any byte offset is a char boundary
    let prefix = &encoded[..DIGEST_PREFIX];
    let mut hasher = Sha256::new();
    hasher.update(key.as_str().as_bytes());
    format!("{prefix}~{:x}", hasher.finalize())
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + use<> {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

#[async_trait]
impl CompletionStore for FileCompletionStore {
    async fn record(&self, key: &TaskKey) -> Result<Option<CompletionMeta>, StoreError> {
        let path = self.marker_path(key);
        Ok(Self::read_marker(&path).await?.map(|m| m.meta))
    }

    async fn mark_done(&self, key: &TaskKey, meta: CompletionMeta) -> Result<(), StoreError> {
        let path = self.marker_path(key);
        let tmp = self.dir.join(format!("{}.tmp-{}", marker_stem(key), meta.run_id));
        let marker = Marker {
            key: key.clone(),
            meta,
        };
        let body = serde_json::to_vec_pretty(&marker).map_err(|e| StoreError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        if let Err(e) = write_synced(&tmp, &body).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(&tmp)(e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(&path)(e));
        }
        debug!(key = %key, path = %path.display(), "completion marker written");
        Ok(())
    }

    async fn clear(&self, key: &TaskKey) -> Result<bool, StoreError> {
        let path = self.marker_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_err(&path)(e)),
        }
    }

    async fn entries(&self) -> Result<Vec<(TaskKey, CompletionMeta)>, StoreError> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&self.dir)(e)),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(io_err(&self.dir))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(MARKER_EXT) {
                continue;
            }
            if let Some(marker) = Self::read_marker(&path).await? {
                entries.push((marker.key, marker.meta));
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}

/// Write `body` and flush it to disk before the caller renames the file.
async fn write_synced(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(body).await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::RunId;
    use crate::domain::task::TaskDescriptor;
    use chrono::{TimeZone, Utc};
    use ulid::Ulid;

    fn meta(version: &str) -> CompletionMeta {
        let at = Utc.with_ymd_and_hms(2024, 3, 4, 5, 6, 7).unwrap();
        CompletionMeta::new(version, RunId::from_ulid(Ulid::from_parts(1, 2)), at)
    }

    #[tokio::test]
    async fn mark_done_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let key = TaskKey::new("extract_movie_ids");

        let store = FileCompletionStore::open(dir.path()).unwrap();
        store.mark_done(&key, meta("1")).await.unwrap();

        let reopened = FileCompletionStore::open(dir.path()).unwrap();
        assert_eq!(reopened.record(&key).await.unwrap(), Some(meta("1")));
    }

    #[tokio::test]
    async fn keys_with_params_get_safe_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCompletionStore::open(dir.path()).unwrap();
        let key = TaskKey::new(r#"fetch({"path":"a/b","page":2})"#);

        store.mark_done(&key, meta("1")).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(!names[0].contains('/'));
        assert!(names[0].ends_with(".json"));

        let entries = store.entries().await.unwrap();
        assert_eq!(entries[0].0, key);
    }

    #[tokio::test]
    async fn long_keys_fit_in_a_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCompletionStore::open(dir.path()).unwrap();
        let ids: Vec<u32> = (1000..1080).collect();
        let desc = TaskDescriptor::new(
            "fetch_details",
            serde_json::json!({ "ids": ids, "lang": "en-US" }),
        );
        let key = desc.key().clone();
        assert!(urlencoding::encode(key.as_str()).len() > 255);

        store.mark_done(&key, meta("1")).await.unwrap();

        assert_eq!(store.record(&key).await.unwrap(), Some(meta("1")));
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].len() < 255);
        assert_eq!(store.entries().await.unwrap()[0].0, key);
        assert!(store.clear(&key).await.unwrap());
    }

    #[test]
    fn long_keys_sharing_a_prefix_get_distinct_stems() {
        let base = "x".repeat(MAX_PLAIN_STEM);
        let a = TaskKey::new(format!("{base}a"));
        let b = TaskKey::new(format!("{base}b"));
        assert_ne!(marker_stem(&a), marker_stem(&b));
        assert_eq!(marker_stem(&TaskKey::new("extract_tv_ids")), "extract_tv_ids");
    }

    #[tokio::test]
    async fn overwrite_leaves_one_complete_marker() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCompletionStore::open(dir.path()).unwrap();
        let key = TaskKey::new("a");
        store.mark_done(&key, meta("1")).await.unwrap();
        store.mark_done(&key, meta("2")).await.unwrap();

        let body = std::fs::read(store.marker_path(&key)).unwrap();
        let marker: Marker = serde_json::from_slice(&body).unwrap();
        assert_eq!(marker.key, key);
        assert_eq!(marker.meta, meta("2"));

        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .contains(".tmp-")
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn no_temp_file_left_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCompletionStore::open(dir.path()).unwrap();
        store.mark_done(&TaskKey::new("a"), meta("1")).await.unwrap();

        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .contains(".tmp-")
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn clear_removes_marker() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCompletionStore::open(dir.path()).unwrap();
        let key = TaskKey::new("a");
        store.mark_done(&key, meta("1")).await.unwrap();

        assert!(store.clear(&key).await.unwrap());
        assert!(!store.clear(&key).await.unwrap());
        assert!(store.record(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_marker_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCompletionStore::open(dir.path()).unwrap();
        let key = TaskKey::new("a");
        std::fs::write(store.marker_path(&key), b"{not json").unwrap();

        let err = store.record(&key).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn entries_ignore_stray_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCompletionStore::open(dir.path()).unwrap();
        store.mark_done(&TaskKey::new("b"), meta("1")).await.unwrap();
        store.mark_done(&TaskKey::new("a"), meta("2")).await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join("c.tmp-run-x"), b"partial").unwrap();

        let keys: Vec<_> = store
            .entries()
            .await
            .unwrap()
            .into_iter()
            .map(|(k, m)| (k.as_str().to_string(), m.version))
            .collect();
        assert_eq!(
            keys,
            [("a".to_string(), "2".to_string()), ("b".to_string(), "1".to_string())]
        );
    }
}
