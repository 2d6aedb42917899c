//! Fluent port configuration.

use std::sync::Arc;

use ttyring_core::callback::{ErrorFn, ReadFn, WriteFn};
use ttyring_core::config::{
    DataBits, EngineConfig, FlowControl, Parity, SerialConfig, StopBits,
};
use ttyring_core::error::{Error, ErrorKind, Result};
use ttyring_engine::{Device, Engine};

use crate::port::SerialPort;

/// Builds a [`SerialPort`]: line parameters, ring depth and the initial
/// callbacks, then `build()` opens and wires everything.
///
/// ```no_run
/// # use ttyring::{Builder, Parity, StopBits};
/// let port = Builder::new()
///     .device("/dev/ttyUSB0")
///     .baud_rate(115_200)
///     .parity(Parity::None)
///     .stop_bits(StopBits::One)
///     .build()?;
/// # Ok::<(), ttyring::Error>(())
/// ```
pub struct Builder {
    cfg: SerialConfig,
    queue_depth: u32,
    read_cb: Option<Box<ReadFn>>,
    write_cb: Option<Box<WriteFn>>,
    error_cb: Option<Box<ErrorFn>>,
}

impl Builder {
    pub fn new() -> Self {
        Self {
            cfg: SerialConfig {
                device_path: String::new(),
                ..Default::default()
            },
            queue_depth: EngineConfig::default().queue_depth,
            read_cb: None,
            write_cb: None,
            error_cb: None,
        }
    }

    pub fn device(mut self, path: impl Into<String>) -> Self {
        self.cfg.device_path = path.into();
        self
    }

    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.cfg.baud_rate = baud;
        self
    }

    pub fn data_bits(mut self, bits: DataBits) -> Self {
        self.cfg.data_bits = bits;
        self
    }

    pub fn parity(mut self, parity: Parity) -> Self {
        self.cfg.parity = parity;
        self
    }

    pub fn stop_bits(mut self, stop: StopBits) -> Self {
        self.cfg.stop_bits = stop;
        self
    }

    pub fn flow_control(mut self, flow: FlowControl) -> Self {
        self.cfg.flow_control = flow;
        self
    }

    pub fn rts_dtr_on(mut self, on: bool) -> Self {
        self.cfg.rts_dtr_on = on;
        self
    }

    /// Submission ring depth (default 256).
    pub fn queue_depth(mut self, depth: u32) -> Self {
        self.queue_depth = depth;
        self
    }

    pub fn on_read<F>(mut self, cb: F) -> Self
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.read_cb = Some(Box::new(cb));
        self
    }

    pub fn on_write<F>(mut self, cb: F) -> Self
    where
        F: Fn(isize) + Send + Sync + 'static,
    {
        self.write_cb = Some(Box::new(cb));
        self
    }

    pub fn on_error<F>(mut self, cb: F) -> Self
    where
        F: Fn(isize) + Send + Sync + 'static,
    {
        self.error_cb = Some(Box::new(cb));
        self
    }

    /// Open the device, set up the engine, register callbacks and start the
    /// worker. Reads are not armed; call [`SerialPort::start_read`].
    pub fn build(self) -> Result<SerialPort> {
        if self.cfg.device_path.is_empty() {
            return Err(Error::new(ErrorKind::SocketCreate, "device path empty"));
        }

        let device = Device::open(&self.cfg)?;

        let engine = Arc::new(Engine::new(EngineConfig {
            queue_depth: self.queue_depth,
            ..Default::default()
        })?);

        if let Some(cb) = self.read_cb {
            engine.set_read_callback(cb);
        }
        if let Some(cb) = self.write_cb {
            engine.set_write_callback(cb);
        }
        if let Some(cb) = self.error_cb {
            engine.set_error_callback(cb);
        }

        Ok(SerialPort::spawn(device, engine))
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_device_path_rejected() {
        let err = Builder::new().build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SocketCreate);
        assert!(err.message().contains("empty"));
    }

    #[test]
    fn test_missing_device_rejected() {
        let err = Builder::new()
            .device("/dev/ttyring-no-such-device")
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SocketCreate);
    }

    #[test]
    fn test_chaining_returns_builder() {
        // Just verifies the fluent surface composes.
        let _b = Builder::new()
            .device("/dev/null")
            .baud_rate(9600)
            .data_bits(DataBits::Seven)
            .parity(Parity::Even)
            .stop_bits(StopBits::Two)
            .flow_control(FlowControl::XonXoff)
            .rts_dtr_on(true)
            .queue_depth(64)
            .on_read(|_| {})
            .on_write(|_| {})
            .on_error(|_| {});
    }
}
