//! PNS - a Personal Network Storage federation in Rust.
//!
//! A set of host daemons, one of which is the tracker, expose a unified
//! logical filesystem overlaid on their physical filesystems. A shell client
//! issues `ls`, `ln`, `md`, `rm`, `cp` and `mv` against logical and physical
//! paths; the tracker resolves names, daemons move bytes between each other
//! directly.

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod hostfs;
pub mod membership;
pub mod path;
pub mod record;
pub mod server;
pub mod shell;
pub mod store;
pub mod wire;

pub use config::Config;
pub use context::ServerContext;
pub use error::{Error, Result};
