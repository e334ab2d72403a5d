//! # Browsergrid Orchestrator
//!
//! The coordinating component of the control plane: creates sessions,
//! drives the lifecycle state machine, requests container tasks from a
//! [`browsergrid_tasks::TaskBackend`], blocks callers until ready-or-failed
//! via the coordination bus, and issues signed CDP access URLs.
//!
//! Entry points are invoked concurrently by independent request handlers;
//! there is no call affinity — the create, the wait, and the terminate for
//! one session may run in different processes. The session store is the
//! single source of truth throughout.

mod orchestrator;
mod waiter;

pub use orchestrator::{OrchestratorConfig, SessionOrchestrator};
pub use waiter::{StateWaiter, WaitCheck};
