#![doc = "docstage-core: planning and committing documentation publishes to an object store."]

//! This crate holds everything that does not need a terminal or a vendor SDK:
//! the redirect rule compiler, content hashing, the remote inventory scanner,
//! change sets, the bounded task pool and the stage driver tying them together.
//!
//! # Usage
//! Build a [`config::StageConfig`], wrap it in a [`stage::Staging`] and call
//! [`stage::Staging::plan`] with any [`contract::ObjectStore`] implementation.

pub mod cache_control;
pub mod changeset;
pub mod collector;
pub mod config;
pub mod contract;
pub mod error;
pub mod hash;
pub mod memory;
pub mod mime;
pub mod pool;
pub mod reconcile;
pub mod redirects;
pub mod stage;

pub use changeset::{ChangeSet, Summary};
pub use config::{StageConfig, StageMode};
pub use contract::ObjectStore;
pub use error::StageError;
pub use stage::Staging;
