//! The serial port facade.

use std::sync::Arc;
use std::thread;

use ttyring_core::error::Result;
use ttyring_core::stats::CountersSnapshot;
use ttyring_engine::{Device, Engine};

/// One configured serial device bound to one submission engine, with the
/// worker running on a dedicated thread.
///
/// Dropping the port performs the full teardown: signal the engine to stop,
/// join the worker, then release the engine and finally close the device.
/// The engine is never destroyed before the worker has exited, and no
/// callback fires after Drop returns.
pub struct SerialPort {
    engine: Arc<Engine>,
    worker: Option<thread::JoinHandle<()>>,
    device: Device,
}

impl std::fmt::Debug for SerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPort").finish_non_exhaustive()
    }
}

impl SerialPort {
    /// Wire a configured device to an engine and start the worker.
    pub(crate) fn spawn(device: Device, engine: Arc<Engine>) -> SerialPort {
        engine.bind_fd(device.fd());
        let runner = Arc::clone(&engine);
        let worker = thread::Builder::new()
            .name("ttyring-worker".into())
            .spawn(move || runner.run())
            .expect("failed to spawn worker thread");
        SerialPort {
            engine,
            worker: Some(worker),
            device,
        }
    }

    /// Queue `data` for transmission. Never blocks; the bytes are copied
    /// into an engine-owned buffer before this returns.
    pub fn send(&self, data: &[u8]) {
        self.engine.submit_send(data);
    }

    /// Begin continuous reading with an internal buffer of `buf_size`
    /// bytes. Each completed read is delivered to the read callback and the
    /// read is re-armed until [`stop_read`](Self::stop_read).
    pub fn start_read(&self, buf_size: usize) {
        self.engine.start_read(self.device.fd(), buf_size);
    }

    /// Stop re-arming reads. An in-flight read still delivers.
    pub fn stop_read(&self) {
        self.engine.stop_read();
    }

    pub fn set_read_callback<F>(&self, cb: F)
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.engine.set_read_callback(cb);
    }

    pub fn set_write_callback<F>(&self, cb: F)
    where
        F: Fn(isize) + Send + Sync + 'static,
    {
        self.engine.set_write_callback(cb);
    }

    pub fn set_error_callback<F>(&self, cb: F)
    where
        F: Fn(isize) + Send + Sync + 'static,
    {
        self.engine.set_error_callback(cb);
    }

    /// Point-in-time traffic counters.
    pub fn counters(&self) -> CountersSnapshot {
        self.engine.counters()
    }

    /// Discard unread input and unsent output on the device.
    pub fn flush(&self) -> Result<()> {
        self.device.flush()
    }
}

impl Drop for SerialPort {
    fn drop(&mut self) {
        self.engine.stop();
        // The worker must be gone before the engine (and with it the ring)
        // is released; the device descriptor closes last.
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
