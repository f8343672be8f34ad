//! High-level pipeline: plan and commit one publish run.
//!
//! [`Staging`] ties the pieces together for a given [`StageConfig`]:
//!   - loads the desired redirects (`.htaccess` or the rule language) and
//!     compiles them before any store I/O happens
//!   - scans the namespace with a [`Collector`] and turns every changed file
//!     into an upload, every symbolic link into a redirect
//!   - reconciles redirect markers against the owned prefixes, but only when
//!     a redirect source exists
//!   - hands the resulting [`ChangeSet`] to the caller, who may print it,
//!     ask for confirmation, and finally [`Staging::commit`] it
//!
//! # Namespace strategy
//! - [`StageMode::Stage`]: objects live under `prefix/username/branch`, every
//!   top-level entry of the build root is published
//! - [`StageMode::Deploy`]: objects live under `prefix`, only top-level files
//!   and the branch directory are published, redirect keys gain `/index.html`
//!
//! # Error Handling
//! Fatal problems (missing source, bad rules, forbidden listing) return
//! before the change set exists. Commit failures are aggregated by the pool
//! and surface as [`StageError::Sync`] or [`StageError::AuthPermission`].

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{info, warn};

use crate::changeset::{ChangeSet, DeleteFlag, Summary};
use crate::collector::{CollectPolicy, Collector};
use crate::config::{RedirectSource, StageConfig, StageMode};
use crate::contract::ObjectStore;
use crate::error::StageError;
use crate::hash::ContentHasher;
use crate::reconcile::{conflicts, RedirectReconciler};
use crate::redirects::{compile, translate_htaccess, Redirects};

/// Branch whose `.htaccess` is the canonical redirect source.
pub const CANONICAL_BRANCH: &str = "master";

#[derive(Debug, Clone)]
pub struct Staging {
    config: StageConfig,
}

impl Staging {
    pub fn new(config: StageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn namespace(&self) -> String {
        self.config.namespace()
    }

    fn collector(&self) -> Collector {
        let policy = match self.config.mode {
            StageMode::Stage => CollectPolicy::Staging,
            StageMode::Deploy => CollectPolicy::Deploy,
        };
        Collector::new(
            policy,
            self.config.branch.clone(),
            self.config.all_subdirectories,
            self.namespace(),
            ContentHasher::new(self.config.chunk_size),
        )
    }

    fn empty_changes(&self) -> ChangeSet {
        ChangeSet::new(self.namespace()).with_danger_threshold(self.config.danger_threshold)
    }

    /// The desired redirect mapping for a build rooted at `root`.
    pub fn load_redirects(&self, root: &Path) -> Result<Redirects, StageError> {
        match &self.config.redirects {
            Some(RedirectSource::Htaccess(path)) => Ok(translate_htaccess(path)),
            Some(RedirectSource::Rules(path)) => {
                let source = fs::read_to_string(path).map_err(|e| StageError::io(path, e))?;
                let rules = compile(&source)?;
                info!(path = %path.display(), rules = rules.len(), "[REDIRECT] Compiled redirect rules");
                Ok(Redirects::from_rules(&rules))
            }
            None if self.config.branch == CANONICAL_BRANCH => {
                Ok(translate_htaccess(&root.join(".htaccess")))
            }
            None => Ok(Redirects::new(false)),
        }
    }

    /// Compute everything a commit would do, without mutating the store.
    pub async fn plan(&self, root: &Path, store: &dyn ObjectStore) -> Result<ChangeSet, StageError> {
        if !root.is_dir() {
            return Err(StageError::MissingSource(root.to_path_buf()));
        }
        let mut redirects = self.load_redirects(root)?;
        conflicts(root, &redirects);

        let namespace = self.namespace();
        info!(namespace = %namespace, "[STAGE] Scanning remote objects");
        let remote = store.list_objects(&namespace).await?;
        let collection = self.collector().collect(root, &remote)?;

        let mut changes = self.empty_changes();
        for update in collection.updates {
            let key = join_key(&namespace, &update.relative);
            if is_symlink(&update.path) {
                let destination = link_destination(root, &update.path);
                redirects.insert(&key, &destination);
                continue;
            }
            changes.upload(update.path, key, update.is_new);
        }

        if !collection.removed_files.is_empty() {
            warn!(count = collection.removed_files.len(), "[STAGE] Removing deleted files");
        }
        changes.delete(collection.removed_files, DeleteFlag::File);

        if !redirects.exists {
            if !redirects.is_empty() {
                warn!(
                    links = redirects.len(),
                    "[REDIRECT] No redirect source scanned; symbolic links are not published"
                );
            }
            info!("[REDIRECT] No redirect source scanned; skipping all redirects");
            return Ok(changes);
        }

        let reconciler = RedirectReconciler::new(self.config.mode, self.config.redirect_dirs.clone());
        let markers = store.list_objects("").await?;
        changes.delete_redirects(reconciler.stale(&redirects, &markers));
        for (from, to) in reconciler.creations(&redirects) {
            changes.redirect(from, to);
        }

        Ok(changes)
    }

    pub async fn commit(&self, changes: &ChangeSet, store: &dyn ObjectStore) -> Result<(), StageError> {
        changes
            .commit(store, &self.config.cache_policy, self.config.pool)
            .await
    }

    /// Plan and commit in one go.
    pub async fn stage(&self, root: &Path, store: &dyn ObjectStore) -> Result<Summary, StageError> {
        let changes = self.plan(root, store).await?;
        let summary = changes.summary();
        info!(%summary, "[STAGE] Committing");
        self.commit(&changes, store).await?;
        Ok(summary)
    }

    /// Every key under this namespace, scheduled for deletion.
    pub async fn plan_purge(&self, store: &dyn ObjectStore) -> Result<ChangeSet, StageError> {
        let namespace = self.namespace();
        let prefix = if namespace.is_empty() {
            String::new()
        } else {
            format!("{namespace}/")
        };

        let keys: Vec<String> = store
            .list_objects(&prefix)
            .await?
            .into_iter()
            .map(|object| object.key)
            .collect();
        info!(keys = %keys.join(", "), "[STAGE] Removing the following files");

        let mut changes = self.empty_changes();
        changes.delete(keys, DeleteFlag::File);
        Ok(changes)
    }

    /// Remove every object under this namespace.
    pub async fn purge(&self, store: &dyn ObjectStore) -> Result<Summary, StageError> {
        let changes = self.plan_purge(store).await?;
        let summary = changes.summary();
        self.commit(&changes, store).await?;
        Ok(summary)
    }
}

fn join_key(namespace: &str, relative: &str) -> String {
    if namespace.is_empty() {
        relative.to_string()
    } else {
        format!("{namespace}/{relative}")
    }
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false)
}

/// Where the link at `path` should redirect to: its target, relative to the
/// root and with a leading `/`.
fn link_destination(root: &Path, path: &Path) -> String {
    let target = match fs::read_link(path) {
        Ok(target) => target,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "[STAGE] Unreadable symbolic link");
            return String::from("/");
        }
    };
    let resolved = lexical_normalize(&path.parent().unwrap_or(root).join(target));

    if is_symlink(&resolved) {
        warn!(path = %resolved.display(), "[STAGE] Multiple layers of symbolic link");
    }
    if !resolved.exists() {
        warn!(link = %path.display(), target = %resolved.display(), "[STAGE] Dead link");
    }

    let root = lexical_normalize(root);
    match resolved.strip_prefix(&root) {
        Ok(relative) => {
            let parts: Vec<_> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            format!("/{}", parts.join("/"))
        }
        Err(_) => {
            warn!(
                target = %resolved.display(),
                root = %root.display(),
                "[STAGE] Symbolic link points outside of root"
            );
            resolved.to_string_lossy().into_owned()
        }
    }
}

/// Resolve `.` and `..` without touching the filesystem.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
