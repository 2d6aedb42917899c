//! Test helpers: pseudo-terminal pairs.
//!
//! A pty gives the tests a real tty to configure and a peer descriptor to
//! read and write from the test body, no hardware required.

use std::ffi::CStr;
use std::os::unix::io::RawFd;

/// A pty master descriptor plus the slave device path.
pub struct PtyPair {
    pub master: RawFd,
    pub slave_path: String,
}

impl PtyPair {
    pub fn open() -> PtyPair {
        unsafe {
            let master = libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY);
            assert!(master >= 0, "posix_openpt failed");
            assert_eq!(libc::grantpt(master), 0, "grantpt failed");
            assert_eq!(libc::unlockpt(master), 0, "unlockpt failed");

            let mut buf = [0 as libc::c_char; 128];
            assert_eq!(
                libc::ptsname_r(master, buf.as_mut_ptr(), buf.len()),
                0,
                "ptsname_r failed"
            );
            let slave_path = CStr::from_ptr(buf.as_ptr()).to_string_lossy().into_owned();

            PtyPair { master, slave_path }
        }
    }

    /// Write bytes into the master side (they arrive on the slave).
    pub fn write_master(&self, data: &[u8]) -> isize {
        unsafe { libc::write(self.master, data.as_ptr() as *const libc::c_void, data.len()) }
    }

    /// Non-blocking-ish read from the master side with a short poll timeout.
    pub fn read_master(&self, buf: &mut [u8], timeout_ms: i32) -> isize {
        let mut pfd = libc::pollfd {
            fd: self.master,
            events: libc::POLLIN,
            revents: 0,
        };
        let ready = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if ready <= 0 {
            return 0;
        }
        unsafe { libc::read(self.master, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) }
    }
}

impl Drop for PtyPair {
    fn drop(&mut self) {
        if self.master >= 0 {
            unsafe { libc::close(self.master) };
            self.master = -1;
        }
    }
}
