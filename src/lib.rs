// ABOUTME: Root library module for the roompoll server
// ABOUTME: Exposes the HTTP transport and re-exports the coordinator and source crates

pub mod server;

// Re-export coordinator modules from roompoll-core
pub use roompoll_core::config;
pub use roompoll_core::metrics;
pub use roompoll_core::paths;

// Re-export the types a transport works with
pub use roompoll_core::{WaitCoordinator, WaitOutcome, WaitResult};
pub use roompoll_source::{Cursor, LongPollingEvent, RoomId, UserId};
