//! # Browsergrid Store
//!
//! Durable persistence for session records. The store is the single source
//! of truth for session state: waiters woken by the coordination bus always
//! re-read the record here rather than trusting the notification payload.
//!
//! Backends implement [`SessionStore`]: key-value by session id, a
//! secondary index by project (newest first), and a per-record TTL that is
//! independent of the logical session status.

mod file;
mod memory;
mod store;

pub use file::FileSessionStore;
pub use memory::MemorySessionStore;
pub use store::{SessionRecord, SessionStore, StoreError};
