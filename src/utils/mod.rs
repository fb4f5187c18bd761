//! Pure utility functions.
//!
//! Process bootstrap and backoff helpers shared by the binaries and the
//! projection engine.

pub mod bootstrap;
pub mod retry;
