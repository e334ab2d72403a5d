//! # Browsergrid Config
//!
//! Configuration management for the control plane: store, bus, scheduler,
//! and credential settings, loaded from TOML with `${VAR}` environment
//! substitution.

mod error;
mod loader;
mod schema;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{
    AuthConfig, BusConfig, Config, SchedulerBackendKind, SchedulerConfig, SessionConfig,
    StoreBackendKind, StoreConfig,
};
