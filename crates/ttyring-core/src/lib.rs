//! # ttyring-core — leaf types for the ttyring serial I/O engine
//!
//! This crate holds everything the engine crate and the public facade share
//! but that carries no io_uring or termios dependency: the line
//! configuration, the error taxonomy, the swappable callback slots, the
//! spinlock guarding the engine's critical sections, traffic counters, and
//! the leveled stderr logging macros.
//!
//! Nothing here performs I/O.

pub mod callback;
pub mod config;
pub mod error;
pub mod logging;
pub mod spinlock;
pub mod stats;

pub use callback::{CallbackRegistry, ErrorFn, ReadFn, WriteFn};
pub use config::{DataBits, EngineConfig, FlowControl, Parity, SerialConfig, StopBits};
pub use error::{Error, ErrorKind, Result};
pub use spinlock::{SpinLock, SpinLockGuard};
pub use stats::{Counters, CountersSnapshot};
