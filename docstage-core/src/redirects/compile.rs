//! Compiler for the line-oriented redirect rule language.
//!
//! ```text
//! define: base docs/manual
//! define: versions v4.2 v4.4 v5.0
//! symlink: current -> v5.0
//! raw: /old/path -> /new/v5.0/path
//! [v4.2]: /foo -> /bar
//! (v4.2-v5.0]: /baz/${version} -> /qux/${version}
//! temporary [*]: /moved -> /new-location
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. Compilation is
//! all-or-nothing: the first bad line aborts with a [`CompilationError`] and
//! no rules are returned.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::rules::{RedirectContext, RuleDefinition, RAW_VERSION};
use crate::error::CompilationError;

static RANGE_RULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(temporary)\s+)?([\[(])\s*([\w.*]+)\s*(?:-\s*([\w.*]+)\s*)?([\])])\s*:\s*(\S.*?)\s+->\s+(\S.*?)\s*$",
    )
    .expect("static regex")
});

static ARROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S.*?)\s*->\s*(\S.*?)$").expect("static regex"));

const WILDCARD: &str = "*";

/// Compile a whole rule source into concrete rules, in source order.
pub fn compile(source: &str) -> Result<Vec<RuleDefinition>, CompilationError> {
    let mut context = RedirectContext::new();
    for (index, raw_line) in source.lines().enumerate() {
        compile_line(&mut context, raw_line, index + 1)?;
    }
    debug!(rules = context.rules.len(), "[REDIRECT] Compiled redirect rules");
    Ok(context.rules)
}

/// Compile one line into `context`.
pub fn compile_line(
    context: &mut RedirectContext,
    raw_line: &str,
    line: usize,
) -> Result<(), CompilationError> {
    let text = raw_line.trim();
    if text.is_empty() || text.starts_with('#') {
        return Ok(());
    }

    if let Some(rest) = text.strip_prefix("define:") {
        let mut words = rest.split_whitespace();
        let key = words.next().ok_or_else(|| syntax(line, text))?;
        let value: Vec<&str> = words.collect();
        if value.is_empty() {
            return Err(syntax(line, text));
        }
        context.define(key, &value.join(" "));
        return Ok(());
    }

    if let Some(rest) = text.strip_prefix("symlink:") {
        let (alias, canonical) = split_arrow(rest).ok_or_else(|| syntax(line, text))?;
        context.add_symlink(alias, canonical);
        return Ok(());
    }

    if let Some(rest) = text.strip_prefix("raw:") {
        let (old_url, new_url) = split_arrow(rest).ok_or_else(|| syntax(line, text))?;
        // `/new/v5.0/path` substitutes as `new`
        let version = new_url
            .split('/')
            .nth(1)
            .unwrap_or_default()
            .to_string();
        return context.emit(false, RAW_VERSION, &version, old_url, new_url, line);
    }

    let caps = RANGE_RULE.captures(text).ok_or_else(|| syntax(line, text))?;
    let is_temporary = caps.get(1).is_some();
    let bounds = RangeBounds {
        open_exclusive: &caps[2] == "(",
        left: caps.get(3).map_or("", |m| m.as_str()),
        right: caps.get(4).map(|m| m.as_str()),
        close_exclusive: &caps[5] == ")",
    };
    let old_url = caps[6].to_string();
    let new_url = caps[7].to_string();

    let versions: Vec<String> = context
        .versions()
        .ok_or(CompilationError::MissingVersions { line })?
        .into_iter()
        .map(str::to_string)
        .collect();

    for index in bounds.resolve(&versions, line)? {
        let version = &versions[index];
        context.emit(is_temporary, version, version, &old_url, &new_url, line)?;
    }
    Ok(())
}

/// The bracketed part of a range rule.
#[derive(Debug, Clone, Copy)]
struct RangeBounds<'a> {
    open_exclusive: bool,
    left: &'a str,
    right: Option<&'a str>,
    close_exclusive: bool,
}

impl RangeBounds<'_> {
    /// Resolve to a range of indices into `versions`.
    fn resolve(&self, versions: &[String], line: usize) -> Result<Range<usize>, CompilationError> {
        let position = |token: &str| -> Result<Option<usize>, CompilationError> {
            if token == WILDCARD {
                return Ok(None);
            }
            versions
                .iter()
                .position(|v| v == token)
                .map(Some)
                .ok_or_else(|| CompilationError::UnknownVersion {
                    line,
                    version: token.to_string(),
                })
        };

        let left = position(self.left)?;
        let Some(right_token) = self.right else {
            return Ok(match left {
                Some(index) => index..index + 1,
                None => 0..versions.len(),
            });
        };
        let right = position(right_token)?;

        let range = match (self.open_exclusive, left, right) {
            (true, None, _) => return Err(CompilationError::ExclusiveWildcard { line }),
            (true, Some(begin), None) => begin + 1..versions.len(),
            (true, Some(begin), Some(end)) if self.close_exclusive => begin + 1..end,
            (true, Some(begin), Some(end)) => begin + 1..end + 1,
            (false, None, None) => return Err(CompilationError::WildcardRange { line }),
            (false, None, Some(end)) if self.close_exclusive => 0..end,
            (false, None, Some(end)) => 0..end + 1,
            (false, Some(_), None) if self.close_exclusive => {
                return Err(CompilationError::OpenWildcardRange { line })
            }
            (false, Some(begin), None) => begin..versions.len(),
            (false, Some(begin), Some(end)) if self.close_exclusive => begin..end,
            (false, Some(begin), Some(end)) => begin..end + 1,
        };

        if range.is_empty() {
            return Err(CompilationError::EmptyRange { line });
        }
        Ok(range)
    }
}

fn split_arrow(text: &str) -> Option<(&str, &str)> {
    let caps = ARROW.captures(text.trim())?;
    let left = caps.get(1)?.as_str().trim();
    let right = caps.get(2)?.as_str().trim();
    Some((left, right))
}

fn syntax(line: usize, text: &str) -> CompilationError {
    CompilationError::Syntax {
        line,
        text: text.to_string(),
    }
}
