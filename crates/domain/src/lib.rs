//! Shared domain types for TaskMesh.
//!
//! Everything that crosses a crate boundary lives here: conversation
//! messages, streaming chunks, task records, the config tree, and the
//! workspace-wide error type.

pub mod config;
pub mod error;
pub mod message;
pub mod stream;
pub mod task;

pub use error::{Error, Result};
