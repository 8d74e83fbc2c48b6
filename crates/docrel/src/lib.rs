//! ## Crate layout
//! - `config`: engine configuration loaded from TOML.
//! - `core`: value domain, converters, catalog, schema evolution, executor.
//! - `error`: the public error type.
//!
//! [`Engine`] owns one catalog and one executor and is the usual entry
//! point; the `core` re-export stays available for hosts that wire the
//! pieces themselves.

mod engine;
mod error;

pub use docrel_config as config;
pub use docrel_core as core;

pub use engine::Engine;
pub use error::Error;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        Engine, Error,
        config::EngineConfig,
        core::{
            executor::{AbortHandle, Job, JobHandle, JobOp, JobOutput},
            prelude::*,
        },
    };
}
