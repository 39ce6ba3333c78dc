//! URL Redirector Declarative Rule Compiler
//!
//! This crate compiles user redirect rules into the browser's declarative
//! redirect rule format, so redirects happen without waking extension code
//! for every request.

pub mod builder;
pub mod dnr;
pub mod plan;

pub use builder::{compile_rules, raw_id_collisions, PRESERVE_PRIORITY, START_PRIORITY};
pub use dnr::{DnrAction, DnrCondition, DnrRedirect, DnrRule, ResourceType};
pub use plan::DnrUpdate;
