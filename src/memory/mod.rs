pub mod store;

pub use store::{InMemoryStore, MemoryEntry, MemoryRecord, MemoryStore, DEFAULT_IMPORTANCE};
