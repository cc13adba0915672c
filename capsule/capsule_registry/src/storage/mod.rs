//! Capability storage backends.

mod file;
mod memory;

pub use file::FileCapabilityStorage;
pub use memory::InMemoryCapabilityStorage;
