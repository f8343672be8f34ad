//! Rule definitions and the per-compilation context they are collected in.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::CompilationError;

/// Version tag given to `raw:` rules.
pub const RAW_VERSION: &str = "raw";

/// Definitions referring to definitions are expanded at most this deep.
const MAX_EXPANSION_DEPTH: usize = 16;

static VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]*)\}").expect("static regex"));

/// One concrete redirect produced by the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDefinition {
    /// 302 when set, 301 otherwise.
    pub is_temporary: bool,
    pub version: String,
    pub old_url: String,
    pub new_url: String,
    /// Emitted because of a `symlink:` alias.
    pub is_symlink: bool,
}

impl RuleDefinition {
    pub fn status(&self) -> u16 {
        if self.is_temporary {
            302
        } else {
            301
        }
    }
}

impl fmt::Display for RuleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Redirect {} {} {}", self.status(), self.old_url, self.new_url)
    }
}

/// Mutable state of a single compilation run.
#[derive(Debug, Default)]
pub struct RedirectContext {
    pub definitions: HashMap<String, String>,
    /// `(alias, canonical_version)` pairs in declaration order.
    pub symlinks: Vec<(String, String)>,
    pub rules: Vec<RuleDefinition>,
}

impl RedirectContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition. References to earlier definitions in `value`
    /// are resolved now; anything else is left for [`Self::substitute`].
    pub fn define(&mut self, key: &str, value: &str) {
        let resolved = VARIABLE
            .replace_all(value, |caps: &regex::Captures<'_>| {
                self.definitions
                    .get(&caps[1])
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned();
        self.definitions.insert(key.to_string(), resolved);
    }

    pub fn add_symlink(&mut self, alias: &str, canonical: &str) {
        self.symlinks
            .push((alias.to_string(), canonical.to_string()));
    }

    /// The ordered `versions` list, if one has been defined.
    pub fn versions(&self) -> Option<Vec<&str>> {
        self.definitions
            .get("versions")
            .map(|v| v.split_whitespace().collect())
    }

    /// Expand definitions (including ones nested in other definitions), then
    /// `${version}`. Any placeholder still left afterwards is an error.
    pub fn substitute(
        &self,
        template: &str,
        version: &str,
        line: usize,
    ) -> Result<String, CompilationError> {
        let mut text = template.to_string();
        for _ in 0..MAX_EXPANSION_DEPTH {
            let expanded = VARIABLE
                .replace_all(&text, |caps: &regex::Captures<'_>| match &caps[1] {
                    "version" => caps[0].to_string(),
                    name => self
                        .definitions
                        .get(name)
                        .cloned()
                        .unwrap_or_else(|| caps[0].to_string()),
                })
                .into_owned();
            if expanded == text {
                break;
            }
            text = expanded;
        }

        let text = VARIABLE
            .replace_all(&text, |caps: &regex::Captures<'_>| {
                if &caps[1] == "version" {
                    version.to_string()
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned();

        match VARIABLE.captures(&text) {
            Some(caps) => Err(CompilationError::UnresolvedVariable {
                line,
                name: caps[1].to_string(),
            }),
            None => Ok(text.trim().to_string()),
        }
    }

    /// Record a rule for `version`, preceded by one copy per alias whose
    /// canonical version is `version`. Raw rules are never aliased.
    pub fn emit(
        &mut self,
        is_temporary: bool,
        version: &str,
        substitution_version: &str,
        old_url: &str,
        new_url: &str,
        line: usize,
    ) -> Result<(), CompilationError> {
        if version != RAW_VERSION {
            let mut seen = HashSet::new();
            seen.insert(version.to_string());
            self.emit_aliases(is_temporary, version, old_url, new_url, line, &mut seen)?;
        }
        let rule = self.build(is_temporary, version, substitution_version, old_url, new_url, false, line)?;
        self.rules.push(rule);
        Ok(())
    }

    fn emit_aliases(
        &mut self,
        is_temporary: bool,
        canonical: &str,
        old_url: &str,
        new_url: &str,
        line: usize,
        seen: &mut HashSet<String>,
    ) -> Result<(), CompilationError> {
        let aliases: Vec<String> = self
            .symlinks
            .iter()
            .filter(|(_, target)| target == canonical)
            .map(|(alias, _)| alias.clone())
            .collect();

        for alias in aliases {
            if !seen.insert(alias.clone()) {
                continue;
            }
            self.emit_aliases(is_temporary, &alias, old_url, new_url, line, seen)?;
            let rule = self.build(is_temporary, &alias, &alias, old_url, new_url, true, line)?;
            self.rules.push(rule);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        is_temporary: bool,
        version: &str,
        substitution_version: &str,
        old_url: &str,
        new_url: &str,
        is_symlink: bool,
        line: usize,
    ) -> Result<RuleDefinition, CompilationError> {
        let old_url = self.substitute(old_url, substitution_version, line)?;
        let new_url = self.substitute(new_url, substitution_version, line)?;

        Ok(RuleDefinition {
            is_temporary,
            version: version.to_string(),
            old_url: self.normalize_old(&old_url),
            new_url: normalize_new(&new_url),
            is_symlink,
        })
    }

    fn normalize_old(&self, url: &str) -> String {
        if url.is_empty() {
            return String::new();
        }
        let path = url.strip_suffix('/').unwrap_or(url);
        let path = path.trim_start_matches('/');
        match self.definitions.get("base").map(|b| b.trim_matches('/')) {
            Some(base) if !base.is_empty() => format!("/{base}/{path}"),
            _ => format!("/{path}"),
        }
    }
}

fn normalize_new(url: &str) -> String {
    if url.is_empty() || url.contains("://") || url.starts_with('/') {
        url.to_string()
    } else {
        format!("/{url}")
    }
}
