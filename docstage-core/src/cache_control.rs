//! Cache-Control policy: an ordered table of glob pattern → header value.

use regex::Regex;
use serde::Deserialize;

/// Header used when no rule matches.
pub const DEFAULT_CACHE_CONTROL: &str = "max-age=28800";
pub const NO_CACHE: &str = "no-cache";

/// One `pattern: value` entry as written in a config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheRuleSpec {
    pub pattern: String,
    pub value: String,
}

#[derive(Debug, Clone)]
struct CacheRule {
    pattern: String,
    matcher: Regex,
    value: String,
}

/// First matching rule wins; keys are matched in full.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    rules: Vec<CacheRule>,
    fallback: String,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::from_specs(&[
            CacheRuleSpec {
                pattern: "*.html".to_string(),
                value: NO_CACHE.to_string(),
            },
            CacheRuleSpec {
                pattern: "*page-data*".to_string(),
                value: NO_CACHE.to_string(),
            },
        ])
        .expect("default cache rules are valid")
    }
}

impl CachePolicy {
    pub fn from_specs(specs: &[CacheRuleSpec]) -> Result<Self, regex::Error> {
        let rules = specs
            .iter()
            .map(|spec| {
                Ok(CacheRule {
                    pattern: spec.pattern.clone(),
                    matcher: glob_to_regex(&spec.pattern)?,
                    value: spec.value.clone(),
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self {
            rules,
            fallback: DEFAULT_CACHE_CONTROL.to_string(),
        })
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    /// The header value for `key`.
    pub fn for_key(&self, key: &str) -> &str {
        self.rules
            .iter()
            .find(|rule| rule.matcher.is_match(key))
            .map_or(self.fallback.as_str(), |rule| rule.value.as_str())
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|rule| rule.pattern.as_str())
    }
}

/// `*` matches any run of characters (including `/`), `?` exactly one.
fn glob_to_regex(glob: &str) -> Result<Regex, regex::Error> {
    let mut pattern = String::with_capacity(glob.len() + 8);
    pattern.push('^');
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern)
}
