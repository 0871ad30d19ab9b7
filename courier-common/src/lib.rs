pub mod entry;
pub mod logging;

pub use entry::{ConfigRef, EntryState, NodeId, QueueEntry};
pub use tracing;

/// Control signal delivered over the engine's shutdown channel.
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
    Finalised,
}
