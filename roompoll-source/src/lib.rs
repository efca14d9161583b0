// ABOUTME: Pluggable event source abstraction for roompoll.
// ABOUTME: Provides the EventSource trait, shared event types, a factory catalog, and built-in sources.

pub mod config;
pub mod event;
pub mod registry;
pub mod sources;
pub mod traits;

pub use event::{Cursor, LongPollingEvent, RoomId, UserId, WaitRequest};
pub use registry::{SourceCatalog, SourceContext, SourceFactory};
pub use traits::EventSource;
