// SPDX-FileCopyrightText: 2025 rumio contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Synchronous request/response channel to the device-model process.
//!
//! One connection per fault: connect to the model's stream socket, send one
//! wire record, receive one back, close. The round trip runs inside the
//! access-violation handler, so everything here sticks to raw async-signal-
//! safe libc calls and stack buffers; `std::os::unix::net` is avoided
//! because its error paths allocate.

use std::ffi::CStr;
use std::io;
use std::mem;

use thiserror::Error;

use crate::wire::{Message, WireError, MESSAGE_SIZE};

/// Channel failure taxonomy.
///
/// `Unreachable` is the one recoverable case: the model has not created its
/// endpoint yet. Everything else means the model is present but the exchange
/// broke, which the fault handler treats as fatal.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("model endpoint is not reachable: {0}")]
    Unreachable(#[source] io::Error),

    #[error("model socket path does not fit in sockaddr_un")]
    PathTooLong,

    #[error("model channel I/O failure: {0}")]
    Io(#[source] io::Error),

    #[error("short transfer on model channel ({got}/{expected} bytes)")]
    ShortTransfer { expected: usize, got: usize },

    #[error(transparent)]
    Malformed(#[from] WireError),
}

impl ChannelError {
    /// The underlying OS error number, if any. Used by the fault handler's
    /// allocation-free diagnostics.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Unreachable(e) | Self::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }
}

/// Closes the descriptor on drop. `close(2)` is async-signal-safe.
struct Fd(libc::c_int);

impl Drop for Fd {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.0);
        }
    }
}

/// Perform one request/response round trip with the model listening on
/// `path`.
///
/// Blocks the calling thread until the exchange completes; no timeout is
/// defined, so a hung model hangs the caller.
pub fn transact(path: &CStr, request: &Message) -> Result<Message, ChannelError> {
    let fd = Fd(unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_STREAM, 0) });
    if fd.0 < 0 {
        return Err(ChannelError::Io(io::Error::last_os_error()));
    }

    let mut addr: libc::sockaddr_un = unsafe { mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    let path_bytes = path.to_bytes_with_nul();
    if path_bytes.len() > addr.sun_path.len() {
        return Err(ChannelError::PathTooLong);
    }
    for (dst, src) in addr.sun_path.iter_mut().zip(path_bytes) {
        *dst = *src as libc::c_char;
    }

    loop {
        let rc = unsafe {
            libc::connect(
                fd.0,
                &addr as *const libc::sockaddr_un as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_un>() as libc::socklen_t,
            )
        };
        if rc == 0 {
            break;
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) => continue,
            Some(libc::ENOENT) | Some(libc::ECONNREFUSED) => {
                return Err(ChannelError::Unreachable(err));
            }
            _ => return Err(ChannelError::Io(err)),
        }
    }

    send_all(&fd, &request.encode())?;

    let mut buf = [0u8; MESSAGE_SIZE];
    recv_exact(&fd, &mut buf)?;

    Ok(Message::decode(&buf)?)
}

fn send_all(fd: &Fd, buf: &[u8]) -> Result<(), ChannelError> {
    let mut sent = 0;
    while sent < buf.len() {
        let rc = unsafe {
            libc::send(
                fd.0,
                buf[sent..].as_ptr() as *const libc::c_void,
                buf.len() - sent,
                0,
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(ChannelError::Io(err));
        }
        if rc == 0 {
            return Err(ChannelError::ShortTransfer {
                expected: buf.len(),
                got: sent,
            });
        }
        sent += rc as usize;
    }
    Ok(())
}

fn recv_exact(fd: &Fd, buf: &mut [u8]) -> Result<(), ChannelError> {
    let mut got = 0;
    while got < buf.len() {
        let rc = unsafe {
            libc::recv(
                fd.0,
                buf[got..].as_mut_ptr() as *mut libc::c_void,
                buf.len() - got,
                0,
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(ChannelError::Io(err));
        }
        if rc == 0 {
            // Peer closed before the full record arrived.
            return Err(ChannelError::ShortTransfer {
                expected: buf.len(),
                got,
            });
        }
        got += rc as usize;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Command;
    use std::ffi::CString;
    use std::io::{Read, Write};
    use std::os::unix::net::UnixListener;

    fn cpath(p: &std::path::Path) -> CString {
        CString::new(p.as_os_str().as_encoded_bytes()).unwrap()
    }

    #[test]
    fn test_unreachable_when_endpoint_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = cpath(&dir.path().join("nobody-home.sock"));
        let err = transact(&path, &Message::read(0, 0x4000_0000, 4)).unwrap_err();
        assert!(matches!(err, ChannelError::Unreachable(_)));
    }

    #[test]
    fn test_roundtrip_against_echo_listener() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("model.sock");
        let listener = UnixListener::bind(&sock).unwrap();

        let server = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut buf = [0u8; MESSAGE_SIZE];
            conn.read_exact(&mut buf).unwrap();
            let req = Message::decode(&buf).unwrap();
            assert_eq!(req.command, Command::Write);
            assert_eq!(req.address, 0x4000_0000);
            assert_eq!(req.data, 0x55);
            let resp = Message { result: 0, ..req };
            conn.write_all(&resp.encode()).unwrap();
        });

        let path = cpath(&sock);
        let resp = transact(&path, &Message::write(0, 0x4000_0000, 0x55, 4)).unwrap();
        assert_eq!(resp.result, 0);
        server.join().unwrap();
    }

    #[test]
    fn test_short_response_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("model.sock");
        let listener = UnixListener::bind(&sock).unwrap();

        let server = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut buf = [0u8; MESSAGE_SIZE];
            conn.read_exact(&mut buf).unwrap();
            // Truncated response, then close.
            conn.write_all(&buf[..7]).unwrap();
        });

        let path = cpath(&sock);
        let err = transact(&path, &Message::read(0, 0x4000_0000, 4)).unwrap_err();
        assert!(matches!(
            err,
            ChannelError::ShortTransfer {
                expected: MESSAGE_SIZE,
                ..
            }
        ));
        server.join().unwrap();
    }
}
