//! Process-local backends
//!
//! [`MemoryTable`] and [`MemoryCollection`] implement the store traits with the
//! same observable semantics as PostgreSQL and MongoDB for everything the
//! repositories issue. They back the demos and the test suite, and can stand
//! in for a real database during local development.
//!
//! Both support readiness toggling (`set_ready`), failure injection
//! (`set_failing`) and artificial latency (`set_latency`).

mod collection;
mod table;

pub use collection::{matches_filter, MemoryCollection};
pub use table::{matches, MemoryTable};
