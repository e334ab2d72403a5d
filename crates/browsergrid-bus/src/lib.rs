//! # Browsergrid Bus
//!
//! Publish/subscribe channel used to wake readiness waiters the instant a
//! session's status changes, avoiding poll loops.
//!
//! The bus is explicitly *not* the system of record: delivery is
//! at-least-once and best-effort with no ordering guarantee relative to
//! store writes. Every subscriber re-reads the session store on wake; the
//! message payload is advisory only.

mod bus;
mod memory;

pub use bus::{ready_channel, BusError, BusSubscription, CoordinationBus, ReadyNotification};
pub use memory::InMemoryBus;
