//! TaskMesh gateway — the HTTP/WebSocket surface, event bus, task
//! store, and per-task workers wrapped around the execution engine.

pub mod api;
pub mod bootstrap;
pub mod bus;
pub mod cli;
pub mod state;
pub mod store;
pub mod worker;
