//! Command implementations.
//!
//! Each subcommand is implemented in its own module.

pub(crate) mod auth;
pub(crate) mod completions;
pub(crate) mod connect;
pub(crate) mod mac;
