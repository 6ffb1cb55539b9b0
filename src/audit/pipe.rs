//! Kernel audit pipe
//!
//! Opens `/dev/auditpipe`, switches it to local preselection for the
//! configured class mask and reads raw BSM records with a bounded wait so
//! the reader can notice shutdown requests.

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::time::Duration;

use log::{debug, info};

use super::source::RecordSource;
use crate::constants::READ_CHUNK_SIZE;
use crate::models::MonitorError;

/// `au_mask_t`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct AuMask {
    pub am_success: libc::c_uint,
    pub am_failure: libc::c_uint,
}

const AUDITPIPE_PRESELECT_MODE_LOCAL: libc::c_int = 2;

mod ioctls {
    use super::AuMask;

    nix::ioctl_write_ptr!(set_qlimit, b'A', 3, libc::c_uint);
    nix::ioctl_read!(get_qlimit_max, b'A', 5, libc::c_uint);
    nix::ioctl_write_ptr!(set_preselect_flags, b'A', 7, AuMask);
    nix::ioctl_write_ptr!(set_preselect_naflags, b'A', 9, AuMask);
    nix::ioctl_write_ptr!(set_preselect_mode, b'A', 15, libc::c_int);
}

pub struct AuditPipe {
    file: File,
    buf: Vec<u8>,
}

impl AuditPipe {
    /// Open and configure the pipe. Needs root.
    pub fn open(path: &Path, class_mask: u32) -> Result<Self, MonitorError> {
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|source| MonitorError::DeviceOpen {
                path: path.to_path_buf(),
                source,
            })?;
        let pipe = Self {
            file,
            buf: vec![0u8; READ_CHUNK_SIZE],
        };
        pipe.configure(class_mask)?;
        info!("Opened audit pipe {} (class mask 0x{:08x})", path.display(), class_mask);
        Ok(pipe)
    }

    fn configure(&self, class_mask: u32) -> Result<(), MonitorError> {
        let fd = self.file.as_raw_fd();
        let configure =
            |request: &'static str| move |source: nix::Error| MonitorError::DeviceConfigure { request, source };

        let mode = AUDITPIPE_PRESELECT_MODE_LOCAL;
        let mask = AuMask {
            am_success: class_mask,
            am_failure: class_mask,
        };
        let mut qlimit_max: libc::c_uint = 0;
        // SAFETY: fd is an open auditpipe descriptor; each argument points at
        // a live value of the type the request expects.
        unsafe {
            ioctls::set_preselect_mode(fd, &mode).map_err(configure("preselect mode"))?;
            ioctls::set_preselect_flags(fd, &mask).map_err(configure("preselect flags"))?;
            ioctls::set_preselect_naflags(fd, &mask).map_err(configure("preselect naflags"))?;
            ioctls::get_qlimit_max(fd, &mut qlimit_max).map_err(configure("queue limit max"))?;
            ioctls::set_qlimit(fd, &qlimit_max).map_err(configure("queue limit"))?;
        }
        debug!("Audit pipe queue limit set to {}", qlimit_max);
        Ok(())
    }

    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        let mut pollfd = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        // SAFETY: one valid pollfd for the duration of the call
        let ready = unsafe { libc::poll(&mut pollfd, 1, millis) };
        if ready < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(ready > 0)
    }
}

impl RecordSource for AuditPipe {
    fn next_chunk(&mut self, timeout: Duration) -> Result<Option<&[u8]>, MonitorError> {
        match self.wait_readable(timeout) {
            Ok(true) => {}
            Ok(false) => return Ok(None),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => return Ok(None),
            Err(err) => return Err(MonitorError::DeviceRead(err)),
        }
        match self.file.read(&mut self.buf) {
            Ok(n) => Ok(Some(&self.buf[..n])),
            Err(err) if matches!(err.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock) => Ok(None),
            Err(err) => Err(MonitorError::DeviceRead(err)),
        }
    }
}
