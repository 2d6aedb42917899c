//! # ttyring-engine — the completion-driven core
//!
//! One engine instance drives one serial tty through an io_uring submission
//! ring on a dedicated worker thread:
//!
//! 1. `Device` opens the tty path and programs the line discipline.
//! 2. Client threads enqueue operations with `Engine::submit_send` /
//!    `Engine::start_read`; neither blocks on I/O.
//! 3. The worker loop (`Engine::run`) waits for completions, resolves them
//!    against the `RequestTable`, invokes callbacks, resubmits partial
//!    writes and re-arms continuous reads.
//!
//! The `BufferPool` keeps write-side allocations off the send path under
//! load.

pub mod buffer_pool;
pub mod device;
pub mod engine;
pub mod request_table;

#[cfg(test)]
pub(crate) mod testutil;

pub use buffer_pool::{BufferPool, PooledBuf};
pub use device::Device;
pub use engine::Engine;
pub use request_table::{Direction, RequestRecord, RequestTable};
