//! Atomically swappable callback slots.
//!
//! Completion dispatch is hot: taking a lock per completion to read a
//! callback would put a lock acquisition on every inbound byte batch. Each
//! slot therefore publishes a raw pointer to a heap-owned callable with
//! release semantics and dispatch does an acquire-load plus call, no lock.
//!
//! Registration takes a brief spinlock only to rotate the owning boxes: the
//! slot retains the current callable *and* the one it replaced. A dispatch
//! that loaded the prior pointer just before a swap is therefore still
//! calling into live memory; the prior callable is freed no earlier than the
//! next registration.
//!
//! Ordering guarantee: once `set` returns, any dispatch that starts
//! afterwards observes the new callable.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::spinlock::SpinLock;

/// Inbound bytes. The slice borrows the engine's read buffer and is valid
/// only for the duration of the call; copy anything you keep.
pub type ReadFn = dyn Fn(&[u8]) + Send + Sync + 'static;
/// Total bytes of a fully completed write.
pub type WriteFn = dyn Fn(isize) + Send + Sync + 'static;
/// Negative errno from the kernel, or -EAGAIN for a dropped resubmission.
pub type ErrorFn = dyn Fn(isize) + Send + Sync + 'static;

struct Holder<F: ?Sized> {
    current: Option<Box<Box<F>>>,
    previous: Option<Box<Box<F>>>,
}

/// One swappable slot. `F` is the unsized callable type.
///
/// `Box<F>` is a fat pointer, so the slot double-boxes: the `AtomicPtr`
/// holds a thin pointer to a heap-allocated `Box<F>` whose address is stable
/// for as long as the holder keeps it.
pub struct CallbackSlot<F: ?Sized> {
    active: AtomicPtr<Box<F>>,
    holder: SpinLock<Holder<F>>,
}

impl<F: ?Sized> CallbackSlot<F> {
    pub fn new() -> Self {
        Self {
            active: AtomicPtr::new(ptr::null_mut()),
            holder: SpinLock::new(Holder {
                current: None,
                previous: None,
            }),
        }
    }

    /// Publish a new callable. The replaced callable stays alive until the
    /// registration after this one.
    pub fn set(&self, f: Box<F>) {
        let mut boxed: Box<Box<F>> = Box::new(f);
        let raw: *mut Box<F> = &mut *boxed;
        let mut holder = self.holder.lock();
        self.active.store(raw, Ordering::Release);
        holder.previous = holder.current.take();
        holder.current = Some(boxed);
        // The generation before last drops here, with the lock held and the
        // pointer already pointing elsewhere.
    }

    /// True if a callable is registered.
    pub fn is_set(&self) -> bool {
        !self.active.load(Ordering::Acquire).is_null()
    }

    /// Invoke the registered callable, if any. Returns false when the slot
    /// is unset.
    #[inline]
    pub fn dispatch(&self, call: impl FnOnce(&F)) -> bool {
        let p = self.active.load(Ordering::Acquire);
        if p.is_null() {
            return false;
        }
        // Safety: a non-null pointer was published by `set`, which keeps the
        // pointee boxed in the holder through at least one subsequent
        // registration. The engine owns both ends of that contract.
        call(unsafe { &**p });
        true
    }
}

impl<F: ?Sized> Default for CallbackSlot<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// The three sinks a running engine dispatches into.
pub struct CallbackRegistry {
    pub read: CallbackSlot<ReadFn>,
    pub write: CallbackSlot<WriteFn>,
    pub error: CallbackSlot<ErrorFn>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self {
            read: CallbackSlot::new(),
            write: CallbackSlot::new(),
            error: CallbackSlot::new(),
        }
    }

    pub fn set_read(&self, f: Box<ReadFn>) {
        self.read.set(f);
    }

    pub fn set_write(&self, f: Box<WriteFn>) {
        self.write.set(f);
    }

    pub fn set_error(&self, f: Box<ErrorFn>) {
        self.error.set(f);
    }

    pub fn dispatch_read(&self, data: &[u8]) -> bool {
        self.read.dispatch(|f| f(data))
    }

    pub fn dispatch_write(&self, total: isize) -> bool {
        self.write.dispatch(|f| f(total))
    }

    pub fn dispatch_error(&self, code: isize) -> bool {
        self.error.dispatch(|f| f(code))
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_unset_slot_is_skipped() {
        let reg = CallbackRegistry::new();
        assert!(!reg.dispatch_read(b"x"));
        assert!(!reg.dispatch_write(1));
        assert!(!reg.dispatch_error(-5));
    }

    #[test]
    fn test_dispatch_sees_registered_callable() {
        let reg = CallbackRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        reg.set_read(Box::new(move |data: &[u8]| {
            assert_eq!(data, b"abc");
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(reg.dispatch_read(b"abc"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_swap_takes_effect_immediately() {
        let slot: CallbackSlot<WriteFn> = CallbackSlot::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&first);
        slot.set(Box::new(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        }));
        slot.dispatch(|f| f(0));

        let s = Arc::clone(&second);
        slot.set(Box::new(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        }));
        slot.dispatch(|f| f(0));

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_previous_generation_survives_one_swap() {
        // A dispatch that is mid-call while the slot is swapped once must be
        // running against retained memory.
        let slot: Arc<CallbackSlot<WriteFn>> = Arc::new(CallbackSlot::new());
        let entered = Arc::new(AtomicBool::new(false));
        let release = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicUsize::new(0));

        let (e, r, d) = (
            Arc::clone(&entered),
            Arc::clone(&release),
            Arc::clone(&done),
        );
        slot.set(Box::new(move |_| {
            e.store(true, Ordering::SeqCst);
            while !r.load(Ordering::SeqCst) {
                std::hint::spin_loop();
            }
            d.fetch_add(1, Ordering::SeqCst);
        }));

        let slot2 = Arc::clone(&slot);
        let worker = thread::spawn(move || {
            slot2.dispatch(|f| f(0));
        });

        while !entered.load(Ordering::SeqCst) {
            std::hint::spin_loop();
        }
        // Swap while the old callable is mid-call.
        slot.set(Box::new(|_| {}));
        release.store(true, Ordering::SeqCst);
        worker.join().unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_swap_under_concurrent_dispatch() {
        let slot: Arc<CallbackSlot<ErrorFn>> = Arc::new(CallbackSlot::new());
        slot.set(Box::new(|_| {}));

        let stop = Arc::new(AtomicBool::new(false));
        let dispatched = Arc::new(AtomicUsize::new(0));

        let s = Arc::clone(&slot);
        let st = Arc::clone(&stop);
        let disp = Arc::clone(&dispatched);
        let dispatcher = thread::spawn(move || {
            while !st.load(Ordering::Relaxed) {
                if s.dispatch(|f| f(-1)) {
                    disp.fetch_add(1, Ordering::Relaxed);
                }
            }
        });

        for i in 0..2000u64 {
            let hits = Arc::new(AtomicUsize::new(0));
            let h = Arc::clone(&hits);
            slot.set(Box::new(move |_| {
                h.fetch_add(i as usize, Ordering::Relaxed);
            }));
        }
        stop.store(true, Ordering::Relaxed);
        dispatcher.join().unwrap();
        assert!(dispatched.load(Ordering::Relaxed) > 0);
    }
}
