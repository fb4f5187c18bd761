//! Message handlers wired onto the bus by the processor binary.

pub mod submission;

pub use submission::SubmissionEventHandler;
