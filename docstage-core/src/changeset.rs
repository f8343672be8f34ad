//! # changeset: the inspectable batch of remote mutations
//!
//! A [`ChangeSet`] only accumulates commands; nothing touches the store until
//! [`ChangeSet::commit`]. Printing and committing are separate so a dry run
//! can show the full plan and stop there.
//!
//! Commit order:
//! 1. uploads and redirect creations run together through [`run_pool`];
//! 2. once they have all finished, deletions are sent in batches of at most
//!    [`MAX_DELETE_BATCH`] keys, skipping every key that was just uploaded.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache_control::CachePolicy;
use crate::config::DEFAULT_DANGER_THRESHOLD;
use crate::contract::{ObjectStore, UploadOptions, MAX_DELETE_BATCH};
use crate::error::{StageError, StoreError, SyncAggregateError, SyncFileError};
use crate::mime;
use crate::pool::{run_pool, PoolOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UploadFlag {
    #[serde(rename = "C")]
    Create,
    #[serde(rename = "M")]
    Modify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeleteFlag {
    #[serde(rename = "D")]
    File,
    #[serde(rename = "DR")]
    Redirect,
}

impl fmt::Display for UploadFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            UploadFlag::Create => "C",
            UploadFlag::Modify => "M",
        })
    }
}

impl fmt::Display for DeleteFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            DeleteFlag::File => "D",
            DeleteFlag::Redirect => "DR",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCommand {
    pub flag: UploadFlag,
    pub path: PathBuf,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteCommand {
    pub flag: DeleteFlag,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectCommand {
    pub from: String,
    pub to: String,
}

/// Per-category counts plus the safety verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub created: usize,
    pub modified: usize,
    pub deleted: usize,
    pub deleted_redirects: usize,
    pub redirects: usize,
    /// Set when the batch should not be committed without explicit consent.
    pub suspicious: bool,
    pub reasons: Vec<String>,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.created + self.modified + self.deleted + self.deleted_redirects + self.redirects
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} modified, {} deleted, {} redirects deleted, {} redirects",
            self.created, self.modified, self.deleted, self.deleted_redirects, self.redirects
        )
    }
}

#[derive(Debug, Serialize)]
struct JsonPlan<'a> {
    created: Vec<&'a str>,
    modified: Vec<&'a str>,
    deleted: Vec<&'a str>,
    deleted_redirects: Vec<&'a str>,
    redirects: BTreeMap<&'a str, &'a str>,
    summary: &'a Summary,
}

#[derive(Debug, Clone)]
enum CommitTask {
    Upload { path: PathBuf, key: String },
    Redirect { from: String, to: String },
}

#[derive(Debug, Clone)]
pub struct ChangeSet {
    namespace: String,
    danger_threshold: usize,
    uploads: Vec<UploadCommand>,
    deletes: Vec<DeleteCommand>,
    redirects: Vec<RedirectCommand>,
}

impl ChangeSet {
    /// An empty change set for objects living under `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            danger_threshold: DEFAULT_DANGER_THRESHOLD,
            uploads: Vec::new(),
            deletes: Vec::new(),
            redirects: Vec::new(),
        }
    }

    pub fn with_danger_threshold(mut self, threshold: usize) -> Self {
        self.danger_threshold = threshold;
        self
    }

    pub fn upload(&mut self, path: impl Into<PathBuf>, key: impl Into<String>, is_new: bool) {
        let flag = if is_new {
            UploadFlag::Create
        } else {
            UploadFlag::Modify
        };
        self.uploads.push(UploadCommand {
            flag,
            path: path.into(),
            key: key.into(),
        });
    }

    pub fn delete<I, S>(&mut self, keys: I, flag: DeleteFlag)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deletes.extend(keys.into_iter().map(|key| DeleteCommand {
            flag,
            key: key.into(),
        }));
    }

    pub fn delete_redirects<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.delete(keys, DeleteFlag::Redirect);
    }

    pub fn redirect(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.redirects.push(RedirectCommand {
            from: from.into(),
            to: to.into(),
        });
    }

    pub fn uploads(&self) -> &[UploadCommand] {
        &self.uploads
    }

    pub fn deletes(&self) -> &[DeleteCommand] {
        &self.deletes
    }

    pub fn redirects(&self) -> &[RedirectCommand] {
        &self.redirects
    }

    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty() && self.deletes.is_empty() && self.redirects.is_empty()
    }

    /// Counts and the suspicious verdict, without rendering anything.
    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for upload in &self.uploads {
            match upload.flag {
                UploadFlag::Create => summary.created += 1,
                UploadFlag::Modify => summary.modified += 1,
            }
        }
        for delete in &self.deletes {
            match delete.flag {
                DeleteFlag::File => summary.deleted += 1,
                DeleteFlag::Redirect => summary.deleted_redirects += 1,
            }
        }
        summary.redirects = self.redirects.len();

        for upload in &self.uploads {
            if let Some(reason) = self.unexpected_key(&upload.key) {
                summary.reasons.push(reason);
            }
        }

        let deletions = summary.deleted + summary.deleted_redirects;
        if deletions > self.danger_threshold {
            summary.reasons.push(format!(
                "{deletions} deletions exceed the danger threshold of {}",
                self.danger_threshold
            ));
        }

        summary.suspicious = !summary.reasons.is_empty();
        summary
    }

    fn unexpected_key(&self, key: &str) -> Option<String> {
        if !self.namespace.is_empty() && !key.starts_with(&format!("{}/", self.namespace)) {
            return Some(format!("upload {key} lies outside namespace {}", self.namespace));
        }
        if key.contains("//") || key.split('/').any(|segment| segment == "..") {
            return Some(format!("upload {key} has a malformed key"));
        }
        None
    }

    /// Human-readable plan, one flag-prefixed line per command.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for upload in &self.uploads {
            out.push_str(&format!("{:<2} {}\n", upload.flag, upload.key));
        }
        for delete in &self.deletes {
            out.push_str(&format!("{:<2} {}\n", delete.flag, delete.key));
        }
        for redirect in &self.redirects {
            out.push_str(&format!("R  {} -> {}\n", redirect.from, redirect.to));
        }
        out
    }

    /// The affected keys as a JSON object.
    pub fn render_json(&self, summary: &Summary) -> serde_json::Result<String> {
        let uploads_with = |flag: UploadFlag| {
            self.uploads
                .iter()
                .filter(|u| u.flag == flag)
                .map(|u| u.key.as_str())
                .collect::<Vec<_>>()
        };
        let deletes_with = |flag: DeleteFlag| {
            self.deletes
                .iter()
                .filter(|d| d.flag == flag)
                .map(|d| d.key.as_str())
                .collect::<Vec<_>>()
        };

        let plan = JsonPlan {
            created: uploads_with(UploadFlag::Create),
            modified: uploads_with(UploadFlag::Modify),
            deleted: deletes_with(DeleteFlag::File),
            deleted_redirects: deletes_with(DeleteFlag::Redirect),
            redirects: self
                .redirects
                .iter()
                .map(|r| (r.from.as_str(), r.to.as_str()))
                .collect(),
            summary,
        };
        serde_json::to_string_pretty(&plan)
    }

    /// Write the plan to `out` and return its summary.
    pub fn print(&self, json: bool, out: &mut impl Write) -> io::Result<Summary> {
        let summary = self.summary();
        if json {
            let rendered = self.render_json(&summary).map_err(io::Error::other)?;
            writeln!(out, "{rendered}")?;
        } else {
            write!(out, "{}", self.render())?;
        }
        Ok(summary)
    }

    /// Apply every command to `store`.
    pub async fn commit(
        &self,
        store: &dyn ObjectStore,
        cache: &CachePolicy,
        pool: PoolOptions,
    ) -> Result<(), StageError> {
        let tasks: Vec<CommitTask> = self
            .uploads
            .iter()
            .map(|u| CommitTask::Upload {
                path: u.path.clone(),
                key: u.key.clone(),
            })
            .chain(self.redirects.iter().map(|r| CommitTask::Redirect {
                from: r.from.clone(),
                to: r.to.clone(),
            }))
            .collect();

        info!(tasks = tasks.len(), "[COMMIT] Uploading and redirecting");
        run_pool(tasks, pool, move |task| run_task(store, cache, task)).await?;

        let uploaded: BTreeSet<&str> = self.uploads.iter().map(|u| u.key.as_str()).collect();
        let mut seen = BTreeSet::new();
        let to_delete: Vec<String> = self
            .deletes
            .iter()
            .map(|d| d.key.as_str())
            .filter(|key| !uploaded.contains(key))
            .filter(|key| seen.insert(*key))
            .map(str::to_string)
            .collect();

        if to_delete.is_empty() {
            return Ok(());
        }
        warn!(count = to_delete.len(), "[COMMIT] Deleting objects");
        delete_in_batches(store, &to_delete).await?;
        Ok(())
    }
}

async fn run_task(
    store: &dyn ObjectStore,
    cache: &CachePolicy,
    task: CommitTask,
) -> Result<(), SyncFileError> {
    match task {
        CommitTask::Upload { path, key } => {
            let options = UploadOptions {
                content_type: mime::from_path(&path).to_string(),
                cache_control: cache.for_key(&key).to_string(),
            };
            info!(path = %path.display(), key = %key, "[COMMIT] Uploading");
            store
                .upload(&path, &key, &options)
                .await
                .map_err(|e| SyncFileError::new(key, e))
        }
        CommitTask::Redirect { from, to } => {
            match store.get_redirect(&from).await {
                Ok(Some(current)) if current == to => {
                    debug!(key = %from, "[COMMIT] Skipping redirect");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e @ StoreError::Forbidden(_)) => return Err(SyncFileError::new(from, e)),
                Err(e) => warn!(key = %from, error = %e, "[COMMIT] Could not read current redirect"),
            }
            info!(from = %from, to = %to, "[COMMIT] Redirecting");
            store
                .set_redirect(&from, &to)
                .await
                .map_err(|e| SyncFileError::new(from, e))
        }
    }
}

/// Delete `keys` in store-sized batches, collecting every failure.
pub async fn delete_in_batches(
    store: &dyn ObjectStore,
    keys: &[String],
) -> Result<(), SyncAggregateError> {
    let mut errors = Vec::new();
    for batch in keys.chunks(MAX_DELETE_BATCH) {
        debug!(size = batch.len(), "[COMMIT] Sending delete batch");
        match store.delete_objects(batch).await {
            Ok(result) => errors.extend(result.errors.into_iter().map(|failure| {
                SyncFileError::new(failure.key, StoreError::Backend(failure.message))
            })),
            Err(e) => {
                let label = format!("{} (+{} more)", batch[0], batch.len() - 1);
                errors.push(SyncFileError::new(label, e));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(SyncAggregateError { errors })
    }
}
