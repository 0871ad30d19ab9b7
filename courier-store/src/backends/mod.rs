//! Backend implementations for the record store boundary
//!
//! - `memory`: in-memory storage for testing and transient deployments
//! - `test`: test utilities with synchronization and fault injection

pub mod memory;
pub mod test;

pub use memory::MemoryRecordStore;
pub use test::TestRecordStore;
