// Queue registry and in-memory backing

mod memory;
mod registry;

pub use memory::MemoryQueue;
pub use registry::{QueueRegistry, TransientOnly};
