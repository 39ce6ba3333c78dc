//! URL Redirector Service Layer
//!
//! Everything that needs a storage round-trip lives here: the compact
//! chunked rule encoding, the key-value storage seam the host implements,
//! the serialized rule store, and the dispatcher that turns browser events
//! into redirect intents.
//!
//! # Consistency
//!
//! Every mutation through one [`RuleStore`] holds a single async lock for
//! its whole read-modify-write, so concurrent increments never lose counts.
//! Writers that bypass the store and write the storage area directly are
//! still last-write-wins.

pub mod backend;
pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod ledger;
pub mod store;

pub use backend::{KeyValueStore, MemoryStore};
pub use dispatcher::{Command, Dispatcher, Effect, Event};
pub use error::{CodecError, StorageError};
pub use ledger::ChainLedger;
pub use store::{RuleSetChange, RuleStore};
