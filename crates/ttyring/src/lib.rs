//! # ttyring — completion-driven serial I/O
//!
//! Drives a single serial tty through an io_uring submission ring on a
//! dedicated worker thread. Writes and read arming never block the calling
//! thread; inbound bytes and write confirmations arrive through callbacks
//! on the worker.
//!
//! ```no_run
//! use ttyring::Builder;
//!
//! fn main() -> ttyring::Result<()> {
//!     let port = Builder::new()
//!         .device("/dev/ttyUSB0")
//!         .baud_rate(115_200)
//!         .on_read(|data| println!("got {} bytes", data.len()))
//!         .on_error(|code| eprintln!("I/O error {}", code))
//!         .build()?;
//!
//!     port.start_read(1024);
//!     port.send(b"hello");
//!     // ... callbacks fire on the worker thread until `port` is dropped.
//!     Ok(())
//! }
//! ```
//!
//! The read callback borrows the engine's internal buffer: the slice is
//! valid only for the duration of the call, copy anything you keep.

mod builder;
mod port;

pub use builder::Builder;
pub use port::SerialPort;

pub use ttyring_core::config::{
    DataBits, EngineConfig, FlowControl, Parity, SerialConfig, StopBits,
};
pub use ttyring_core::error::{Error, ErrorKind, Result};
pub use ttyring_core::stats::CountersSnapshot;
