//! Reading and writing `Redirect <status> <from> <to>` files.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use super::rules::RuleDefinition;

static REDIRECT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^Redirect (30[123]) (\S+)\s+(\S+)").expect("static regex")
});

/// One parsed `Redirect` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtaccessRedirect {
    pub status: u16,
    pub from: String,
    pub to: String,
}

impl HtaccessRedirect {
    pub fn is_temporary(&self) -> bool {
        self.status != 301
    }
}

/// Desired redirects keyed by source path (no leading slash).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Redirects {
    pub entries: BTreeMap<String, String>,
    /// Whether a redirect source was actually found. Reconciliation is
    /// skipped entirely when it was not.
    pub exists: bool,
}

impl Redirects {
    pub fn new(exists: bool) -> Self {
        Self {
            entries: BTreeMap::new(),
            exists,
        }
    }

    /// Build from compiled rules, keeping the last rule for a repeated source.
    pub fn from_rules(rules: &[RuleDefinition]) -> Self {
        let mut redirects = Self::new(true);
        for rule in rules {
            redirects.insert(&rule.old_url, &rule.new_url);
        }
        redirects
    }

    /// Build from parsed `Redirect` lines.
    pub fn from_lines(lines: &[HtaccessRedirect]) -> Self {
        let mut redirects = Self::new(true);
        for line in lines {
            redirects.insert(&line.from, &line.to);
        }
        redirects
    }

    pub fn insert(&mut self, from: &str, to: &str) {
        self.entries
            .insert(from.trim_start_matches('/').to_string(), to.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.entries.iter()
    }
}

/// Parse every `Redirect 30x from to` line; other lines are ignored.
pub fn parse(text: &str) -> Vec<HtaccessRedirect> {
    REDIRECT_LINE
        .captures_iter(text)
        .filter_map(|caps| {
            Some(HtaccessRedirect {
                status: caps[1].parse().ok()?,
                from: caps[2].to_string(),
                to: caps[3].to_string(),
            })
        })
        .collect()
}

/// Render compiled rules, one `Redirect` line per rule.
pub fn render(rules: &[RuleDefinition]) -> String {
    let mut out = String::new();
    for rule in rules {
        out.push_str(&rule.to_string());
        out.push('\n');
    }
    out
}

/// Read an `.htaccess`-style file into a redirect mapping. A missing or
/// unreadable file yields an empty mapping flagged as not existing.
pub fn translate_htaccess(path: &Path) -> Redirects {
    match fs::read_to_string(path) {
        Ok(text) => {
            let redirects = Redirects::from_lines(&parse(&text));
            info!(path = %path.display(), count = redirects.len(), "[REDIRECT] Loaded htaccess redirects");
            redirects
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "[REDIRECT] No htaccess file");
            Redirects::new(false)
        }
    }
}

/// Write compiled rules to `path`.
pub fn write_rules(rules: &[RuleDefinition], path: &Path) -> io::Result<()> {
    fs::write(path, render(rules))
}
