//! Redirect rules: compiling the rule language, reading and writing
//! `Redirect` lines, and converting legacy YAML redirect files.

pub mod compile;
pub mod convert;
pub mod htaccess;
pub mod rules;

pub use compile::compile;
pub use htaccess::{parse, render, translate_htaccess, HtaccessRedirect, Redirects};
pub use rules::{RedirectContext, RuleDefinition, RAW_VERSION};
