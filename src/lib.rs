//! Submission indexer
//!
//! Consumes submission-domain change events from a message bus and keeps a
//! search index in sync. Reviews and review summations are stored as their
//! own documents and also embedded in their parent submission document.

pub mod bus;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod handlers;
pub mod health;
pub mod index;
pub mod projection;
pub mod utils;
pub mod validation;
