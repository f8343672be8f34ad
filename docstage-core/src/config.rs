use std::path::PathBuf;

use regex::Regex;
use tracing::{debug, info};

use crate::cache_control::CachePolicy;
use crate::hash::DEFAULT_CHUNK_SIZE;
use crate::pool::PoolOptions;

/// Deletions above this count make a change set suspicious.
pub const DEFAULT_DANGER_THRESHOLD: usize = 500;

/// Namespace strategy of a publish run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageMode {
    /// Upload under `prefix/username/branch`.
    Stage,
    /// Upload under `prefix` only.
    Deploy,
}

impl StageMode {
    /// Suffix appended to directory-style redirect keys.
    pub fn page_suffix(&self) -> &'static str {
        match self {
            StageMode::Stage => "",
            StageMode::Deploy => "/index.html",
        }
    }
}

/// Where the desired redirect mapping comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectSource {
    /// `Redirect 30x from to` lines.
    Htaccess(PathBuf),
    /// The rule language, compiled before anything else runs.
    Rules(PathBuf),
}

/// Everything a publish run needs to know.
#[derive(Debug, Clone)]
pub struct StageConfig {
    pub bucket: String,
    pub prefix: String,
    pub username: String,
    pub branch: String,
    pub mode: StageMode,
    pub all_subdirectories: bool,
    /// Anchored patterns naming the redirect keys this run may delete.
    pub redirect_dirs: Vec<Regex>,
    pub redirects: Option<RedirectSource>,
    pub cache_policy: CachePolicy,
    pub danger_threshold: usize,
    pub pool: PoolOptions,
    pub chunk_size: usize,
}

impl StageConfig {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>, mode: StageMode) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            username: String::new(),
            branch: String::new(),
            mode,
            all_subdirectories: false,
            redirect_dirs: Vec::new(),
            redirects: None,
            cache_policy: CachePolicy::default(),
            danger_threshold: DEFAULT_DANGER_THRESHOLD,
            pool: PoolOptions::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Add owned redirect patterns. The prefix itself is always owned when set.
    pub fn with_redirect_prefixes<I, S>(mut self, patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !self.prefix.is_empty() && self.redirect_dirs.is_empty() {
            self.redirect_dirs.push(anchored(&regex::escape(&self.prefix))?);
        }
        for pattern in patterns {
            self.redirect_dirs.push(anchored(pattern.as_ref())?);
        }
        Ok(self)
    }

    /// The key prefix every object of this run lives under.
    pub fn namespace(&self) -> String {
        match self.mode {
            StageMode::Stage => [
                self.prefix.as_str(),
                self.username.as_str(),
                self.branch.as_str(),
            ]
            .iter()
            .map(|part| part.trim_matches('/'))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("/"),
            StageMode::Deploy => self.prefix.trim_matches('/').to_string(),
        }
    }

    /// Whether a redirect key falls under one of the owned patterns.
    pub fn owns_redirect(&self, key: &str) -> bool {
        self.redirect_dirs.iter().any(|pattern| pattern.is_match(key))
    }

    pub fn trace_loaded(&self) {
        info!(
            bucket = %self.bucket,
            namespace = %self.namespace(),
            mode = ?self.mode,
            branch = %self.branch,
            "Loaded StageConfig"
        );
        debug!(?self, "StageConfig loaded (full debug)");
    }
}

fn anchored(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})"))
}
