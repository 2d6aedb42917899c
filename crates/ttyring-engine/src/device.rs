//! Serial device opener.
//!
//! Opens the tty path read/write without becoming its controlling terminal,
//! programs the line discipline into raw byte-pipe mode per the
//! `SerialConfig`, optionally asserts the RTS/DTR modem lines, flushes both
//! directions and clears `O_NONBLOCK` — after this, blocking semantics on
//! the descriptor are what the submission ring expects.

use std::ffi::CString;
use std::io;
use std::os::unix::io::RawFd;

use ttyring_core::config::{DataBits, FlowControl, Parity, SerialConfig, StopBits};
use ttyring_core::error::{Error, ErrorKind, Result};
use ttyring_core::log_debug;

/// Map a numeric baud rate onto the POSIX speed table.
///
/// Returns `None` for rates outside the enumerated set.
fn baud_to_speed(baud: u32) -> Option<libc::speed_t> {
    let speed = match baud {
        0 => libc::B0,
        50 => libc::B50,
        75 => libc::B75,
        110 => libc::B110,
        134 => libc::B134,
        150 => libc::B150,
        200 => libc::B200,
        300 => libc::B300,
        600 => libc::B600,
        1200 => libc::B1200,
        1800 => libc::B1800,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        460_800 => libc::B460800,
        921_600 => libc::B921600,
        _ => return None,
    };
    Some(speed)
}

/// An open, configured serial tty.
///
/// Owns the file descriptor: `fd >= 0` for the whole lifetime, closed
/// exactly once on Drop. Not Clone — no two devices share a descriptor.
#[derive(Debug)]
pub struct Device {
    fd: RawFd,
}

impl Device {
    /// Open `config.device_path` and apply the line discipline.
    ///
    /// On any failure the descriptor, if it was opened, is closed before
    /// the error is returned.
    pub fn open(config: &SerialConfig) -> Result<Device> {
        let path = CString::new(config.device_path.as_str()).map_err(|_| {
            Error::new(
                ErrorKind::SocketCreate,
                format!("device path '{}' contains NUL", config.device_path),
            )
        })?;

        let fd = unsafe {
            libc::open(
                path.as_ptr(),
                libc::O_RDWR | libc::O_NOCTTY | libc::O_NONBLOCK,
            )
        };
        if fd < 0 {
            return Err(Error::new(
                ErrorKind::SocketCreate,
                format!(
                    "failed to open serial device '{}': {}",
                    config.device_path,
                    io::Error::last_os_error()
                ),
            ));
        }

        if let Err(e) = configure_tty(fd, config) {
            unsafe { libc::close(fd) };
            return Err(e);
        }

        // Modem line assertion is best-effort; some adapters reject it.
        if config.rts_dtr_on {
            assert_rts_dtr(fd);
        }

        // Drop anything queued before we were configured, then hand the ring
        // a blocking descriptor.
        unsafe {
            libc::tcflush(fd, libc::TCIOFLUSH);
            let flags = libc::fcntl(fd, libc::F_GETFL, 0);
            libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK);
        }

        log_debug!(
            "device '{}' open: fd={} baud={}",
            config.device_path,
            fd,
            config.baud_rate
        );

        Ok(Device { fd })
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Discard unread input and unsent output.
    pub fn flush(&self) -> Result<()> {
        if self.fd < 0 {
            return Err(Error::new(
                ErrorKind::InvalidSocket,
                "cannot flush with invalid descriptor",
            ));
        }
        if unsafe { libc::tcflush(self.fd, libc::TCIOFLUSH) } == -1 {
            return Err(Error::new(
                ErrorKind::SocketFlush,
                format!("failed to flush serial device: {}", io::Error::last_os_error()),
            ));
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if self.fd >= 0 {
            unsafe { libc::close(self.fd) };
            self.fd = -1;
        }
    }
}

fn configure_tty(fd: RawFd, config: &SerialConfig) -> Result<()> {
    let mut tty: libc::termios = unsafe { std::mem::zeroed() };
    if unsafe { libc::tcgetattr(fd, &mut tty) } == -1 {
        return Err(Error::new(
            ErrorKind::SocketBind,
            format!(
                "failed to get attributes for '{}': {}",
                config.device_path,
                io::Error::last_os_error()
            ),
        ));
    }

    let speed = baud_to_speed(config.baud_rate).ok_or_else(|| {
        Error::new(
            ErrorKind::SocketBind,
            format!("unsupported baud rate {}", config.baud_rate),
        )
    })?;
    if unsafe { libc::cfsetispeed(&mut tty, speed) } == -1
        || unsafe { libc::cfsetospeed(&mut tty, speed) } == -1
    {
        return Err(Error::new(
            ErrorKind::SocketBind,
            format!(
                "failed to set baud rate for '{}': {}",
                config.device_path,
                io::Error::last_os_error()
            ),
        ));
    }

    // Character size
    tty.c_cflag &= !libc::CSIZE;
    tty.c_cflag |= match config.data_bits {
        DataBits::Five => libc::CS5,
        DataBits::Six => libc::CS6,
        DataBits::Seven => libc::CS7,
        DataBits::Eight => libc::CS8,
    };

    // Parity
    match config.parity {
        Parity::None => tty.c_cflag &= !libc::PARENB,
        Parity::Odd => {
            tty.c_cflag |= libc::PARENB;
            tty.c_cflag |= libc::PARODD;
        }
        Parity::Even => {
            tty.c_cflag |= libc::PARENB;
            tty.c_cflag &= !libc::PARODD;
        }
    }

    // Stop bits
    match config.stop_bits {
        StopBits::Two => tty.c_cflag |= libc::CSTOPB,
        StopBits::One => tty.c_cflag &= !libc::CSTOPB,
    }

    // Hardware flow control
    match config.flow_control {
        FlowControl::RtsCts => tty.c_cflag |= libc::CRTSCTS,
        _ => tty.c_cflag &= !libc::CRTSCTS,
    }

    // Input: no break/CR-NL translation, no parity marking or checking,
    // no 8th-bit strip, no software flow start.
    tty.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::ICRNL
        | libc::INLCR
        | libc::PARMRK
        | libc::INPCK
        | libc::ISTRIP
        | libc::IXON);

    // Output: no post-processing.
    tty.c_oflag &= !libc::OPOST;

    // Local: raw — no echo, no canonical mode, no signals, no extensions.
    tty.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);

    // A read completes as soon as a single byte is available.
    tty.c_cc[libc::VMIN] = 1;
    tty.c_cc[libc::VTIME] = 0;

    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tty) } == -1 {
        return Err(Error::new(
            ErrorKind::SocketBind,
            format!(
                "failed to set attributes for '{}': {}",
                config.device_path,
                io::Error::last_os_error()
            ),
        ));
    }

    Ok(())
}

/// Assert RTS and DTR via the terminal-control ioctl. Failures are ignored.
fn assert_rts_dtr(fd: RawFd) {
    let mut status: libc::c_int = 0;
    if unsafe { libc::ioctl(fd, libc::TIOCMGET, &mut status) } == -1 {
        return;
    }
    status |= libc::TIOCM_RTS | libc::TIOCM_DTR;
    unsafe { libc::ioctl(fd, libc::TIOCMSET, &status) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::PtyPair;
    use ttyring_core::config::SerialConfig;
    use ttyring_core::error::ErrorKind;

    #[test]
    fn test_baud_table() {
        assert_eq!(baud_to_speed(115_200), Some(libc::B115200));
        assert_eq!(baud_to_speed(9600), Some(libc::B9600));
        assert_eq!(baud_to_speed(921_600), Some(libc::B921600));
        assert_eq!(baud_to_speed(12_345), None);
    }

    #[test]
    fn test_open_missing_path() {
        let cfg = SerialConfig {
            device_path: "/dev/ttyring-does-not-exist".to_string(),
            ..Default::default()
        };
        let err = Device::open(&cfg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SocketCreate);
    }

    #[test]
    fn test_open_unsupported_baud() {
        let pty = PtyPair::open();
        let cfg = SerialConfig {
            device_path: pty.slave_path.clone(),
            baud_rate: 123_456,
            ..Default::default()
        };
        let err = Device::open(&cfg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SocketBind);
        assert!(err.message().contains("123456"));
    }

    #[test]
    fn test_open_pty_slave() {
        let pty = PtyPair::open();
        let cfg = SerialConfig {
            device_path: pty.slave_path.clone(),
            ..Default::default()
        };
        let dev = Device::open(&cfg).expect("open pty slave");
        assert!(dev.fd() >= 0);

        // O_NONBLOCK must be cleared after configuration.
        let flags = unsafe { libc::fcntl(dev.fd(), libc::F_GETFL, 0) };
        assert_eq!(flags & libc::O_NONBLOCK, 0);

        dev.flush().expect("flush configured device");
    }

    #[test]
    fn test_raw_mode_applied() {
        let pty = PtyPair::open();
        let cfg = SerialConfig {
            device_path: pty.slave_path.clone(),
            stop_bits: StopBits::Two,
            ..Default::default()
        };
        let dev = Device::open(&cfg).expect("open pty slave");

        let mut tty: libc::termios = unsafe { std::mem::zeroed() };
        assert_eq!(unsafe { libc::tcgetattr(dev.fd(), &mut tty) }, 0);
        assert_eq!(tty.c_lflag & libc::ICANON, 0);
        assert_eq!(tty.c_lflag & libc::ECHO, 0);
        assert_eq!(tty.c_oflag & libc::OPOST, 0);
        assert_ne!(tty.c_cflag & libc::CSTOPB, 0);
        assert_eq!(tty.c_cc[libc::VMIN], 1);
        assert_eq!(tty.c_cc[libc::VTIME], 0);
    }
}
