//! URL Redirector Core Library
//!
//! This crate provides the pure decision logic behind the URL Redirector
//! browser extension: which navigation matches which rule, whether a new
//! rule would create a redirect cycle, how a rule's pause state evolves,
//! and which rules just became active between two rule-set snapshots.
//!
//! # Architecture
//!
//! Nothing in here touches storage, tabs or the network. Hosts feed in
//! rule lists and URLs, and get back targets, verdicts and state. The
//! storage orchestrator and event dispatcher live in `ur-service`, the
//! declarative rule compiler in `ur-compiler`.
//!
//! # Modules
//!
//! - `url`: URL normalization and redirect-chain query parameter helpers
//! - `hash`: Murmur3 hashing used for deterministic declarative rule IDs
//! - `types`: The `Rule` record and host-facing descriptors
//! - `state`: Rule-state machine (toggle, pause expiry, overrides)
//! - `matcher`: Navigation-to-rule matching with loop guard
//! - `loops`: Redirect cycle detection
//! - `validate`: Admission checks for new and edited rules
//! - `changes`: Activation diff between two rule-set snapshots
//! - `antidote`: Shuffle target selection
//! - `clock`: Time source abstraction
//! - `config`: Runtime configuration

pub mod antidote;
pub mod changes;
pub mod clock;
pub mod config;
pub mod error;
pub mod hash;
pub mod loops;
pub mod matcher;
pub mod state;
pub mod types;
pub mod url;
pub mod validate;

// Re-export commonly used types
pub use antidote::{AntidoteSelector, ShufflePicker};
pub use changes::{activated_rules, RuleSnapshot};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RedirectMode, RedirectorConfig};
pub use error::RuleError;
pub use loops::detect_loop;
pub use matcher::{find_redirect, match_target, RedirectMatch};
pub use state::{
    is_effectively_active, next_state, next_transition, phase, should_rule_apply, RulePhase, RuleState,
};
pub use types::{NavigationEvent, OpenTab, Rule, TabRedirect, SHUFFLE_TARGET};
pub use url::normalize;
pub use validate::{validate_new_rule, validate_rule_update};
