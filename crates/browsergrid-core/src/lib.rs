//! # Browsergrid Core
//!
//! Session data model and state machine for the browsergrid control plane.
//!
//! ## Components
//!
//! - [`Session`] - The central entity: a logical remote-browser instance
//! - [`SessionStatus`] - Lifecycle states and the legal transitions between them
//! - [`SessionEvent`] - Append-only event history entries
//! - [`MetadataMap`] - Opaque, serializable key-value bag for pass-through payloads
//! - [`Error`] - Shared error taxonomy used across the control plane

pub mod error;
pub mod event;
pub mod metadata;
pub mod session;

pub use error::{Error, Result};
pub use event::{SessionEvent, SessionEventKind};
pub use metadata::{MetadataMap, MetadataValue};
pub use session::{
    BillingInfo, CreateSessionOptions, ResourceLimits, Session, SessionStatus,
};
