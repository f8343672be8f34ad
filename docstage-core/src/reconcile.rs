//! Redirect reconciliation: which remote redirect markers to delete and which
//! redirects to create, given the desired `source → destination` mapping.

use std::collections::BTreeSet;
use std::path::Path;

use regex::Regex;
use tracing::{info, warn};

use crate::config::StageMode;
use crate::contract::RemoteObject;
use crate::redirects::Redirects;

/// Keys with these endings name content, not a directory index.
const CONTENT_EXTENSIONS: [&str; 4] = [".html", ".pdf", ".epub", ".gz"];

/// The work reconciliation leaves for the change set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectPlan {
    /// `(store key, destination)` pairs in key order.
    pub create: Vec<(String, String)>,
    /// Remote marker keys, exactly as listed by the store.
    pub delete: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RedirectReconciler {
    mode: StageMode,
    owned: Vec<Regex>,
}

impl RedirectReconciler {
    pub fn new(mode: StageMode, owned: Vec<Regex>) -> Self {
        Self { mode, owned }
    }

    /// Canonical form used when comparing desired and remote redirect keys.
    pub fn normalize(&self, key: &str) -> String {
        let key = key.trim_start_matches('/');
        let key = match self.mode {
            StageMode::Deploy => key.strip_suffix(self.mode.page_suffix()).unwrap_or(key),
            StageMode::Stage => key,
        };
        if is_content_key(key) {
            key.to_string()
        } else {
            key.trim_matches('/').to_string()
        }
    }

    /// The store key a normalized redirect source is written to.
    pub fn store_key(&self, normalized: &str) -> String {
        if is_content_key(normalized) {
            normalized.to_string()
        } else {
            format!("{normalized}{}", self.mode.page_suffix())
        }
    }

    pub fn owns(&self, normalized: &str) -> bool {
        self.owned.iter().any(|pattern| pattern.is_match(normalized))
    }

    /// Remote redirect markers under an owned pattern that `desired` no
    /// longer mentions.
    pub fn stale(&self, desired: &Redirects, remote: &[RemoteObject]) -> Vec<String> {
        if self.owned.is_empty() {
            warn!("[REDIRECT] No redirect prefixes configured; not removing any redirects");
            return Vec::new();
        }

        let wanted: BTreeSet<String> = desired.iter().map(|(src, _)| self.normalize(src)).collect();
        remote
            .iter()
            .filter(|object| object.is_redirect_marker())
            .filter(|object| {
                let normalized = self.normalize(&object.key);
                self.owns(&normalized) && !wanted.contains(&normalized)
            })
            .map(|object| {
                warn!(key = %object.key, "[REDIRECT] Removing redirect");
                object.key.clone()
            })
            .collect()
    }

    /// `(store key, destination)` for every desired redirect, in key order.
    pub fn creations(&self, desired: &Redirects) -> Vec<(String, String)> {
        let mut create = Vec::with_capacity(desired.len());
        for (src, dest) in desired.iter() {
            let normalized = self.normalize(src);
            if normalized.is_empty() {
                warn!(source = %src, "[REDIRECT] Ignoring redirect from the bucket root");
                continue;
            }
            create.push((self.store_key(&normalized), dest.clone()));
        }
        create.sort();
        create.dedup_by(|a, b| a.0 == b.0);
        create
    }

    /// Compare `desired` against the zero-length objects in `remote`.
    ///
    /// Every desired redirect is scheduled for creation; the commit skips the
    /// ones whose destination is already current.
    pub fn plan(&self, desired: &Redirects, remote: &[RemoteObject]) -> RedirectPlan {
        let plan = RedirectPlan {
            delete: self.stale(desired, remote),
            create: self.creations(desired),
        };
        info!(
            create = plan.create.len(),
            delete = plan.delete.len(),
            "[REDIRECT] Reconciled redirects"
        );
        plan
    }
}

/// Desired redirect sources that coincide with a file still on disk.
///
/// These are reported only; the redirect is kept.
pub fn conflicts(root: &Path, desired: &Redirects) -> Vec<String> {
    desired
        .iter()
        .filter(|(src, _)| root.join(src.trim_end_matches('/')).is_file())
        .map(|(src, _)| {
            warn!(source = %src, "[REDIRECT] Redirect will mask file");
            src.clone()
        })
        .collect()
}

fn is_content_key(key: &str) -> bool {
    CONTENT_EXTENSIONS.iter().any(|ext| key.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(patterns: &[&str]) -> Vec<Regex> {
        patterns
            .iter()
            .map(|p| Regex::new(&format!("^(?:{p})")).unwrap())
            .collect()
    }

    #[test]
    fn deploy_normalization_strips_index_suffix() {
        let r = RedirectReconciler::new(StageMode::Deploy, vec![]);
        assert_eq!(r.normalize("docs/manual/foo/index.html"), "docs/manual/foo");
        assert_eq!(r.normalize("/docs/manual/foo/"), "docs/manual/foo");
        assert_eq!(r.normalize("docs/manual/guide.pdf"), "docs/manual/guide.pdf");
        assert_eq!(r.store_key("docs/manual/foo"), "docs/manual/foo/index.html");
        assert_eq!(r.store_key("docs/a.html"), "docs/a.html");
    }

    #[test]
    fn staging_normalization_only_trims_slashes() {
        let r = RedirectReconciler::new(StageMode::Stage, vec![]);
        assert_eq!(r.normalize("ns/foo/"), "ns/foo");
        assert_eq!(r.normalize("ns/foo/index.html"), "ns/foo/index.html");
        assert_eq!(r.store_key("ns/foo"), "ns/foo");
    }

    #[test]
    fn only_owned_markers_are_deleted() {
        let r = RedirectReconciler::new(StageMode::Deploy, owned(&["docs/manual"]));
        let mut desired = Redirects::new(true);
        desired.insert("/docs/manual/keep", "/docs/manual/new");

        let remote = vec![
            RemoteObject::new("docs/manual/keep/index.html", 0, "\"e\""),
            RemoteObject::new("docs/manual/stale/index.html", 0, "\"e\""),
            RemoteObject::new("docs/other/stale/index.html", 0, "\"e\""),
            RemoteObject::new("docs/manual/page/index.html", 120, "\"abc\""),
        ];

        let plan = r.plan(&desired, &remote);
        assert_eq!(plan.delete, vec!["docs/manual/stale/index.html".to_string()]);
        assert_eq!(
            plan.create,
            vec![(
                "docs/manual/keep/index.html".to_string(),
                "/docs/manual/new".to_string()
            )]
        );
    }

    #[test]
    fn no_owned_patterns_means_no_deletions() {
        let r = RedirectReconciler::new(StageMode::Deploy, vec![]);
        let remote = vec![RemoteObject::new("docs/stale/index.html", 0, "\"e\"")];
        let plan = r.plan(&Redirects::new(true), &remote);
        assert!(plan.delete.is_empty());
    }

    #[test]
    fn conflicts_report_masked_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.html"), "x").unwrap();
        let mut desired = Redirects::new(true);
        desired.insert("/page.html", "/elsewhere");
        desired.insert("/gone.html", "/elsewhere");

        assert_eq!(conflicts(dir.path(), &desired), vec!["page.html".to_string()]);
    }
}
