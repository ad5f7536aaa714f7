//! Pseudo-terminal plumbing for child output.
//!
//! Children write to the slave side of a pty so that stdio libraries see an
//! interactive terminal and line-buffer their output. The parent keeps the
//! master side in non-blocking mode and drains it on every poll.

use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, OwnedFd};
use std::process::Stdio;

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::pty::{openpty, OpenptyResult};
use nix::sys::termios::{tcgetattr, tcsetattr, OutputFlags, SetArg};

const READ_CHUNK: usize = 4096;

/// Parent side of a child's terminal.
#[derive(Debug)]
pub struct PtyMaster {
    file: File,
}

/// Child side of the terminal, handed to the spawned process.
#[derive(Debug)]
pub struct PtySlave {
    fd: OwnedFd,
}

/// Open a pty pair configured for output capture.
///
/// Output post-processing (`ONLCR`) is disabled so the child's `\n` reaches us
/// unchanged instead of as `\r\n`.
pub fn open() -> io::Result<(PtyMaster, PtySlave)> {
    let OpenptyResult { master, slave } = openpty(None, None)?;

    let mut termios = tcgetattr(&slave)?;
    termios.output_flags.remove(OutputFlags::ONLCR);
    tcsetattr(&slave, SetArg::TCSANOW, &termios)?;

    let flags = OFlag::from_bits_truncate(fcntl(master.as_raw_fd(), FcntlArg::F_GETFL)?);
    fcntl(master.as_raw_fd(), FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;

    Ok((
        PtyMaster {
            file: File::from(master),
        },
        PtySlave { fd: slave },
    ))
}

impl PtySlave {
    /// A fresh stdio handle on the slave, for stdout or stderr.
    pub fn stdio(&self) -> io::Result<Stdio> {
        Ok(Stdio::from(self.fd.try_clone()?))
    }
}

impl PtyMaster {
    /// Read everything currently buffered into `out`.
    ///
    /// Returns `Ok(false)` once the slave side has been closed by every
    /// process holding it. Linux reports that as `EIO` rather than EOF.
    pub fn read_available(&mut self, out: &mut Vec<u8>) -> io::Result<bool> {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match self.file.read(&mut buf) {
                Ok(0) => return Ok(false),
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(true),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.raw_os_error() == Some(Errno::EIO as i32) => return Ok(false),
                Err(e) => return Err(e),
            }
        }
    }
}
