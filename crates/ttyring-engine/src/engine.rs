//! The submission engine.
//!
//! Owns the io_uring instance, the request table and the write buffer pool,
//! and runs the worker loop that waits on completions and dispatches them.
//! Clients call `submit_send` / `start_read` / `stop_read` from any thread;
//! none of those block on I/O.
//!
//! # Locking
//!
//! One spinlock covers the submission side: claiming an SQE, the submit
//! call, and every request-table mutation. The kernel requires
//! single-threaded access to the SQ tail, and coupling the table insert to
//! the submit closes the window where a completion could arrive before the
//! table knows the record. Critical sections are a few dozen instructions.
//!
//! Callbacks are never invoked with the lock held — a callback may call
//! `submit_send` and take the lock again.
//!
//! # Wake-up sentinel
//!
//! Request id 0 is reserved. `stop()` pushes a no-op SQE with user_data 0 to
//! knock the worker out of its submit-and-wait; the worker ignores it and
//! re-checks the stop flag.

use std::cell::UnsafeCell;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};

use io_uring::{opcode, squeue, types, IoUring};

use ttyring_core::callback::CallbackRegistry;
use ttyring_core::config::EngineConfig;
use ttyring_core::error::{Error, ErrorKind, Result};
use ttyring_core::spinlock::SpinLock;
use ttyring_core::stats::{Counters, CountersSnapshot};
use ttyring_core::{log_debug, log_error, log_warn};

use crate::buffer_pool::BufferPool;
use crate::request_table::{Direction, RequestRecord, RequestTable};

/// user_data value of the wake-up no-op; never allocated to a request.
const WAKEUP_ID: u64 = 0;

fn neg_errno(e: &io::Error) -> isize {
    -(e.raw_os_error().unwrap_or(libc::EIO) as isize)
}

/// Why an internal read submission did not go out.
enum ReadArmError {
    /// No submission slot available.
    Full,
    /// The kernel submit call failed with this negative errno.
    Os(isize),
}

/// Completion-driven I/O engine for a single bound descriptor.
pub struct Engine {
    ring: IoUring,
    /// The single engine lock: request table plus SQ access.
    state: SpinLock<RequestTable>,
    pool: BufferPool,
    callbacks: CallbackRegistry,
    counters: Counters,
    /// Monotonic request ids, starting at 1.
    next_id: AtomicU64,
    /// Bound device descriptor, -1 when unbound.
    fd: AtomicI32,
    /// Re-arm reads after each successful completion.
    continuous: AtomicBool,
    /// A read submission is currently held by the kernel.
    read_armed: AtomicBool,
    stop_requested: AtomicBool,
    /// Landing buffer for reads.
    ///
    /// Replaced only while no read is armed (`start_read` claims the armed
    /// flag first), written by the kernel while one is, and read by the
    /// worker when the completion resolves. That discipline is the only
    /// synchronization.
    read_buf: UnsafeCell<Vec<u8>>,
    depth: u32,
}

// Safety: the submission queue is only touched under `state`, the
// completion queue only by the single worker thread inside `run`, and
// `read_buf` follows the arm/complete discipline documented on the field.
unsafe impl Sync for Engine {}

impl Engine {
    /// Set up the ring. The request table is sized to the ring depth and
    /// the buffer pool to twice that.
    pub fn new(config: EngineConfig) -> Result<Engine> {
        let ring = IoUring::builder().build(config.queue_depth).map_err(|e| {
            Error::new(
                ErrorKind::UringInit,
                format!("io_uring setup failed: {}", e),
            )
        })?;
        let depth = config.queue_depth.max(1);
        log_debug!("engine: ring ready, depth {}", depth);
        Ok(Engine {
            ring,
            state: SpinLock::new(RequestTable::new(depth as usize)),
            pool: BufferPool::new(depth as usize * 2, config.buffer_capacity),
            callbacks: CallbackRegistry::new(),
            counters: Counters::new(),
            next_id: AtomicU64::new(1),
            fd: AtomicI32::new(-1),
            continuous: AtomicBool::new(false),
            read_armed: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            read_buf: UnsafeCell::new(Vec::new()),
            depth,
        })
    }

    /// Bind the active descriptor without arming reads. Used when only
    /// writes are wanted initially.
    pub fn bind_fd(&self, fd: RawFd) {
        self.fd.store(fd, Ordering::Release);
    }

    pub fn set_read_callback<F>(&self, cb: F)
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.callbacks.set_read(Box::new(cb));
    }

    pub fn set_write_callback<F>(&self, cb: F)
    where
        F: Fn(isize) + Send + Sync + 'static,
    {
        self.callbacks.set_write(Box::new(cb));
    }

    pub fn set_error_callback<F>(&self, cb: F)
    where
        F: Fn(isize) + Send + Sync + 'static,
    {
        self.callbacks.set_error(Box::new(cb));
    }

    pub fn counters(&self) -> CountersSnapshot {
        self.counters.snapshot()
    }

    /// Copy `bytes` into an engine-owned buffer and enqueue a write.
    /// Returns immediately; the write callback fires on the worker thread
    /// once the buffer is fully drained.
    ///
    /// When no submission slot is available the send is dropped silently
    /// and the buffer returned to the pool — slot exhaustion on a
    /// queue-depth ring means sustained backpressure the caller has to
    /// handle anyway.
    pub fn submit_send(&self, bytes: &[u8]) {
        let fd = self.fd.load(Ordering::Acquire);
        if fd < 0 {
            log_warn!("engine: submit_send with no bound descriptor");
            return;
        }

        let mut buf = self.pool.acquire(bytes.len());
        buf.extend_from_slice(bytes);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        // The buffer's heap storage does not move when the PooledBuf is
        // moved into the record below, so the pointer stays valid for the
        // kernel.
        let sqe = opcode::Write::new(types::Fd(fd), buf.bytes().as_ptr(), buf.len() as u32)
            .offset(u64::MAX)
            .build()
            .user_data(id);

        let mut table = self.state.lock();
        if !self.push_sqe_locked(&sqe) {
            drop(table);
            self.pool.release(buf);
            return;
        }
        table.insert(RequestRecord {
            id,
            dir: Direction::Write,
            fd,
            buf: Some(buf),
            offset: 0,
        });
        match self.ring.submitter().submit() {
            Ok(_) => drop(table),
            Err(e) => {
                let rec = table.take(id);
                drop(table);
                if let Some(rec) = rec {
                    self.release_record(rec);
                }
                self.report_error(neg_errno(&e));
            }
        }
    }

    /// Bind `fd`, enable continuous reading and arm the first read with an
    /// internal buffer of `buf_size` bytes.
    ///
    /// If a read is already armed (start/stop/start before the in-flight
    /// read resolved) only the flags are updated: the re-arm chain picks the
    /// new state up and the kernel-held buffer is left alone.
    pub fn start_read(&self, fd: RawFd, buf_size: usize) {
        self.fd.store(fd, Ordering::Release);
        self.continuous.store(true, Ordering::Release);
        if self.read_armed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Safety: we just claimed the armed flag from idle, so the kernel
        // holds no pointer into the buffer and the worker is not reading it.
        unsafe {
            *self.read_buf.get() = vec![0u8; buf_size];
        }
        if let Err(ReadArmError::Os(code)) = self.submit_read() {
            self.report_error(code);
        }
        // ReadArmError::Full on the initial arm stays silent, matching the
        // initial-submission policy for writes.
    }

    /// Disable continuous reading. An in-flight read still completes and
    /// delivers; the next arming is skipped.
    pub fn stop_read(&self) {
        self.continuous.store(false, Ordering::Release);
    }

    /// Worker loop. Returns only after `stop()` has been observed and the
    /// wake-up completion drained.
    pub fn run(&self) {
        log_debug!("engine: worker started (depth {})", self.depth);
        let mut completions: Vec<(u64, i32)> = Vec::with_capacity(self.depth as usize);

        while !self.stop_requested.load(Ordering::Acquire) {
            if let Err(e) = self.ring.submitter().submit_and_wait(1) {
                if e.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                log_error!("engine: submit_and_wait failed: {}", e);
                std::thread::sleep(std::time::Duration::from_millis(1));
                continue;
            }

            completions.clear();
            {
                // Safety: this worker is the sole completion-queue consumer.
                let cq = unsafe { self.ring.completion_shared() };
                for cqe in cq {
                    completions.push((cqe.user_data(), cqe.result()));
                }
            }

            let mut rearm = false;
            for &(id, res) in completions.iter() {
                if id == WAKEUP_ID {
                    continue;
                }
                self.dispatch_completion(id, res, &mut rearm);
            }

            // One re-arm per drained batch, after every completion in it
            // has been dispatched.
            if rearm {
                if self.continuous.load(Ordering::Acquire) {
                    match self.submit_read() {
                        Ok(()) => {}
                        Err(ReadArmError::Full) => {
                            self.report_error(-(libc::EAGAIN as isize));
                        }
                        Err(ReadArmError::Os(code)) => {
                            self.report_error(code);
                        }
                    }
                } else {
                    self.park_read();
                }
            }
        }
        log_debug!("engine: worker stopped");
    }

    /// Request worker shutdown. Idempotent; safe from any thread.
    pub fn stop(&self) {
        if self.stop_requested.swap(true, Ordering::AcqRel) {
            return;
        }
        let _table = self.state.lock();
        let sqe = opcode::Nop::new().build().user_data(WAKEUP_ID);
        if !self.push_sqe_locked(&sqe) {
            // No slot for the no-op. Submitting whatever is pending still
            // produces completions, and any completion wakes the worker.
            log_warn!("engine: no submission slot for wake-up, flushing pending");
        }
        let _ = self.ring.submitter().submit();
    }

    // ── Completion dispatch (worker thread) ──

    fn dispatch_completion(&self, id: u64, res: i32, rearm: &mut bool) {
        let rec = { self.state.lock().take(id) };
        let Some(rec) = rec else {
            return;
        };
        match rec.dir {
            Direction::Read => self.complete_read(res, rearm),
            Direction::Write => self.complete_write(rec, res),
        }
    }

    fn complete_read(&self, res: i32, rearm: &mut bool) {
        if res < 0 {
            // A failed read terminates the read; no automatic retry.
            self.report_error(res as isize);
            self.read_armed.store(false, Ordering::Release);
            return;
        }

        // Safety: the read that produced this completion has resolved, so
        // the kernel no longer writes the buffer, and no new read is armed
        // before this batch finishes.
        let data = unsafe {
            let b = &*self.read_buf.get();
            let n = (res as usize).min(b.len());
            std::slice::from_raw_parts(b.as_ptr(), n)
        };
        self.counters.record_receive(data.len() as u64);
        self.callbacks.dispatch_read(data);

        if self.continuous.load(Ordering::Acquire) {
            *rearm = true;
        } else {
            self.park_read();
        }
    }

    /// Publish the read as idle, then re-check for a `start_read` that ran
    /// concurrently and saw the armed flag still set.
    fn park_read(&self) {
        self.read_armed.store(false, Ordering::Release);
        if self.continuous.load(Ordering::Acquire)
            && !self.read_armed.swap(true, Ordering::AcqRel)
        {
            match self.submit_read() {
                Ok(()) | Err(ReadArmError::Full) => {}
                Err(ReadArmError::Os(code)) => self.report_error(code),
            }
        }
    }

    fn complete_write(&self, mut rec: RequestRecord, res: i32) {
        if res < 0 {
            if res == -libc::EINTR {
                // Interrupted before anything was written; retry the same
                // offset transparently.
                self.resubmit_write(rec);
                return;
            }
            self.report_error(res as isize);
            self.release_record(rec);
            return;
        }

        let total = rec.buf.as_ref().map_or(0, |b| b.len());
        let new_offset = rec.offset + res as usize;
        if new_offset < total {
            rec.offset = new_offset;
            self.resubmit_write(rec);
            return;
        }

        self.counters.record_send(new_offset as u64);
        self.callbacks.dispatch_write(new_offset as isize);
        self.release_record(rec);
    }

    /// Resubmit the unwritten tail of a write at `rec.offset`. The stored
    /// record keeps the updated offset only when the resubmit goes out.
    fn resubmit_write(&self, rec: RequestRecord) {
        let Some(buf) = rec.buf.as_ref() else {
            return;
        };
        let remaining = buf.len() - rec.offset;
        // Safety: offset < len for any record reaching this path, so the
        // pointer stays inside the buffer's allocation.
        let ptr = unsafe { buf.bytes().as_ptr().add(rec.offset) };
        let sqe = opcode::Write::new(types::Fd(rec.fd), ptr, remaining as u32)
            .offset(u64::MAX)
            .build()
            .user_data(rec.id);

        let id = rec.id;
        let mut table = self.state.lock();
        if !self.push_sqe_locked(&sqe) {
            drop(table);
            self.report_error(-(libc::EAGAIN as isize));
            self.release_record(rec);
            return;
        }
        table.insert(rec);
        match self.ring.submitter().submit() {
            Ok(_) => drop(table),
            Err(e) => {
                let rec = table.take(id);
                drop(table);
                if let Some(rec) = rec {
                    self.release_record(rec);
                }
                self.report_error(neg_errno(&e));
            }
        }
    }

    // ── Internals ──

    /// Arm one read on the bound descriptor. Caller owns the armed flag;
    /// this clears it on any failure.
    fn submit_read(&self) -> std::result::Result<(), ReadArmError> {
        let fd = self.fd.load(Ordering::Acquire);
        if fd < 0 {
            log_error!("engine: read submission with no bound descriptor");
            self.read_armed.store(false, Ordering::Release);
            return Err(ReadArmError::Os(-(libc::EBADF as isize)));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        // Safety: the armed flag is held, so nobody replaces the buffer.
        let (ptr, len) = unsafe {
            let b = &*self.read_buf.get();
            (b.as_ptr() as *mut u8, b.len())
        };
        let sqe = opcode::Read::new(types::Fd(fd), ptr, len as u32)
            .offset(u64::MAX)
            .build()
            .user_data(id);

        let mut table = self.state.lock();
        if !self.push_sqe_locked(&sqe) {
            drop(table);
            self.read_armed.store(false, Ordering::Release);
            return Err(ReadArmError::Full);
        }
        table.insert(RequestRecord {
            id,
            dir: Direction::Read,
            fd,
            buf: None,
            offset: 0,
        });
        match self.ring.submitter().submit() {
            Ok(_) => Ok(()),
            Err(e) => {
                table.erase(id);
                drop(table);
                self.read_armed.store(false, Ordering::Release);
                Err(ReadArmError::Os(neg_errno(&e)))
            }
        }
    }

    /// Push one SQE. Caller must hold the engine lock.
    fn push_sqe_locked(&self, sqe: &squeue::Entry) -> bool {
        // Safety: the engine lock serializes all submission-queue access.
        unsafe {
            let mut sq = self.ring.submission_shared();
            if sq.is_full() {
                return false;
            }
            sq.push(sqe).is_ok()
        }
    }

    fn release_record(&self, mut rec: RequestRecord) {
        if let Some(buf) = rec.buf.take() {
            self.pool.release(buf);
        }
    }

    fn report_error(&self, code: isize) {
        if !self.callbacks.dispatch_error(code) {
            log_error!(
                "engine: I/O error {} ({}) with no error callback registered",
                code,
                io::Error::from_raw_os_error(-code as i32)
            );
        }
    }
}
