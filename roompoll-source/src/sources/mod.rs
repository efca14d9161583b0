// ABOUTME: Concrete event source implementations (chat, presence, mock).
// ABOUTME: Each source implements the EventSource trait.

pub mod chat;
pub mod mock;
pub mod presence;
