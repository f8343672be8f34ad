//! Remote inventory scanning: which local files must be uploaded and which
//! remote keys must be deleted.
//!
//! The remote listing is reduced to `relative path → etag` for the keys in
//! scope, then the local tree is walked (following symbolic links) and every
//! file whose hash differs from, or is absent in, that map is reported as a
//! [`FileUpdate`]. Remote keys whose local file is gone land in
//! [`Collection::removed_files`]. The two sets never overlap.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use jwalk::WalkDir;
use tracing::{debug, info, warn};

use crate::contract::RemoteObject;
use crate::error::StageError;
use crate::hash::ContentHasher;

/// Which top-level entries of the build root are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectPolicy {
    /// Every top-level entry.
    Staging,
    /// Top-level files, the directory named after the branch and links
    /// resolving to it; everything when `all_subdirectories` is set.
    Deploy,
}

/// One local file that differs from the remote inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpdate {
    pub path: PathBuf,
    /// Path relative to the root, `/`-separated.
    pub relative: String,
    pub content_hash: String,
    pub is_new: bool,
}

#[derive(Debug, Default)]
pub struct Collection {
    pub updates: Vec<FileUpdate>,
    /// Full remote keys whose local counterpart no longer exists.
    pub removed_files: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Collector {
    policy: CollectPolicy,
    branch: String,
    all_subdirectories: bool,
    namespace: String,
    hasher: ContentHasher,
}

impl Collector {
    pub fn new(
        policy: CollectPolicy,
        branch: impl Into<String>,
        all_subdirectories: bool,
        namespace: impl Into<String>,
        hasher: ContentHasher,
    ) -> Self {
        Self {
            policy,
            branch: branch.into(),
            all_subdirectories,
            namespace: namespace.into(),
            hasher,
        }
    }

    /// Names of the top-level entries under `root` that are in scope.
    pub fn upload_set(&self, root: &Path) -> Result<BTreeSet<String>, StageError> {
        let entries = fs::read_dir(root).map_err(|e| StageError::io(root, e))?;
        let mut upload = BTreeSet::new();

        for entry in entries {
            let entry = entry.map_err(|e| StageError::io(root, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.policy == CollectPolicy::Staging || self.all_subdirectories {
                upload.insert(name);
                continue;
            }

            let path = entry.path();
            if path.is_dir() && name == self.branch {
                upload.insert(name);
                continue;
            }

            // Links that resolve to the branch directory
            let points_at_branch = fs::canonicalize(&path)
                .ok()
                .and_then(|target| target.file_name().map(|n| n.to_string_lossy() == self.branch))
                .unwrap_or(false);
            if points_at_branch {
                upload.insert(name);
            }
        }
        Ok(upload)
    }

    /// Compare `root` against the `remote` listing of this namespace.
    pub fn collect(&self, root: &Path, remote: &[RemoteObject]) -> Result<Collection, StageError> {
        let whitelist = self.upload_set(root)?;
        info!(
            entries = %whitelist.iter().cloned().collect::<Vec<_>>().join(", "),
            "[COLLECT] Publishing"
        );

        let mut collection = Collection::default();
        let mut remote_hashes: HashMap<String, String> = HashMap::new();

        for object in remote {
            let Some(local_key) = self.local_key(&object.key) else {
                continue;
            };
            // Redirect markers are reconciled separately
            if object.is_redirect_marker() || local_key.is_empty() {
                continue;
            }

            let local_path = root.join(&local_key);
            let top = local_key.split('/').next().unwrap_or_default();
            let in_scope =
                !local_key.contains('/') || whitelist.contains(top) || local_path.is_file();
            if !in_scope {
                continue;
            }

            remote_hashes.insert(local_key.clone(), object.bare_etag().to_string());

            if !local_path.exists() {
                warn!(path = %local_path.display(), "[COLLECT] Removing");
                collection.removed_files.push(object.key.clone());
            }
        }

        info!("[COLLECT] Done. Scanning local filesystem");

        for path in self.local_files(root, &whitelist)? {
            let Some(relative) = relative_key(root, &path) else {
                continue;
            };

            let local_hash = match self.hasher.hash_file(&path) {
                Ok(hash) => hash,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "[COLLECT] Skipping unreadable file");
                    continue;
                }
            };

            let remote_hash = remote_hashes.get(&relative);
            if remote_hash == Some(&local_hash) {
                continue;
            }

            collection.updates.push(FileUpdate {
                path,
                is_new: remote_hash.is_none(),
                relative,
                content_hash: local_hash,
            });
        }

        Ok(collection)
    }

    /// Map a remote key to its path relative to the root, or `None` when the
    /// key lies outside this namespace.
    fn local_key(&self, key: &str) -> Option<String> {
        if self.namespace.is_empty() {
            return Some(key.trim_start_matches('/').to_string());
        }
        let rest = key.strip_prefix(&self.namespace)?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }
        Some(rest.trim_start_matches('/').to_string())
    }

    /// Every non-dotfile under the in-scope part of `root`, in a stable order.
    fn local_files(&self, root: &Path, whitelist: &BTreeSet<String>) -> Result<Vec<PathBuf>, StageError> {
        let mut top_level: Vec<_> = fs::read_dir(root)
            .map_err(|e| StageError::io(root, e))?
            .filter_map(skip_unreadable)
            .map(|entry| entry.path())
            .collect();
        top_level.sort();

        let mut files = Vec::new();
        for path in top_level {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if path.is_file() {
                if !name.starts_with('.') {
                    files.push(path);
                }
                continue;
            }
            if !path.is_dir() || !whitelist.contains(&name) {
                continue;
            }

            let walked = WalkDir::new(&path)
                .follow_links(true)
                .skip_hidden(false)
                .sort(true)
                .into_iter()
                .filter_map(skip_unreadable)
                .filter(|entry| entry.file_type().is_file())
                .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
                .map(|entry| entry.path());
            files.extend(walked);
        }
        Ok(files)
    }
}

/// Unreadable directories and link loops are left out of the walk, loudly.
fn skip_unreadable<T, E: fmt::Display>(entry: Result<T, E>) -> Option<T> {
    match entry {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!(error = %e, "[COLLECT] Skipping unreadable entry");
            None
        }
    }
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::{Layer, Registry};

    struct EventCollector {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl<S: tracing::Subscriber> Layer<S> for EventCollector {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            self.events.lock().unwrap().push(format!("{:?}", event));
        }
    }

    #[test]
    fn unreadable_entries_are_skipped_with_a_warning() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let subscriber = Registry::default().with(EventCollector {
            events: events.clone(),
        });
        let _guard = tracing::subscriber::set_default(subscriber);

        let entries: Vec<Result<u32, String>> = vec![Ok(1), Err("loop detected".to_string()), Ok(2)];
        let kept: Vec<u32> = entries.into_iter().filter_map(skip_unreadable).collect();
        assert_eq!(kept, vec![1, 2]);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].contains("Skipping unreadable entry"), "{events:?}");
        assert!(events[0].contains("loop detected"), "{events:?}");
    }
}
