// SPDX-FileCopyrightText: 2025 rumio contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Lifecycle facade: installs the fault and interrupt handlers, publishes
//! the driver's pid for the model to find, and unwinds everything on
//! teardown.

use std::ffi::CString;
use std::io;
use std::mem;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::ptr;

use thiserror::Error;

use rumio_common::paths::{publication_path, MODEL_SOCKET_PATH};

use crate::{fault, interrupt, registry, state};

/// Trap-layer configuration.
#[derive(Debug, Clone)]
pub struct Options {
    /// Treat an unreachable model endpoint as benign: stores are discarded
    /// and loads read as zero. Covers the boot-before-model startup race;
    /// leave off to make a missing model fatal.
    pub permissive_startup: bool,

    /// Rendezvous socket of the device-model process.
    pub model_socket: PathBuf,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            permissive_startup: false,
            model_socket: PathBuf::from(MODEL_SOCKET_PATH),
        }
    }
}

/// Errors raised by [`init`].
#[derive(Debug, Error)]
pub enum InitError {
    #[error("failed to install the {signal} handler: {source}")]
    Sigaction {
        signal: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("failed to write the publication file {path}: {source}")]
    Publish {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("model socket path was already latched to a different value")]
    SocketAlreadyLatched,

    #[error("model socket path contains an interior NUL byte")]
    BadSocketPath,
}

/// Initialize the trap layer with default [`Options`].
pub fn init() -> Result<(), InitError> {
    init_with(Options::default())
}

/// Initialize the trap layer: record the process-wide state, install the
/// access-violation and interrupt handlers, and publish this process's pid
/// so the model can deliver notification signals.
pub fn init_with(options: Options) -> Result<(), InitError> {
    let pid = unsafe { libc::getpid() };
    state::set_driver_pid(pid);
    state::set_permissive(options.permissive_startup);

    let socket = CString::new(options.model_socket.as_os_str().as_bytes())
        .map_err(|_| InitError::BadSocketPath)?;
    if !state::latch_model_socket(socket) {
        return Err(InitError::SocketAlreadyLatched);
    }

    install_fault_handler()?;
    install_interrupt_handler()?;

    let path = publication_path(pid as u32);
    std::fs::write(&path, pid.to_string()).map_err(|source| InitError::Publish {
        path: path.clone(),
        source,
    })?;

    log::info!(
        "trap layer initialized (pid {pid}, model socket {})",
        options.model_socket.display()
    );
    Ok(())
}

/// Tear the trap layer down: release every registered window, empty the
/// dispatch table, and remove the publication file. The signal handlers stay
/// installed; a device access after cleanup is a genuine bad access and
/// terminates the process.
pub fn cleanup() {
    registry::clear();
    interrupt::clear_handlers();

    let pid = state::driver_pid();
    if pid > 0 {
        let _ = std::fs::remove_file(publication_path(pid as u32));
    }
    log::debug!("trap layer cleaned up");
}

fn install_fault_handler() -> Result<(), InitError> {
    let mut sa: libc::sigaction = unsafe { mem::zeroed() };
    sa.sa_sigaction = fault::on_access_fault as usize;
    sa.sa_flags = libc::SA_SIGINFO;
    unsafe {
        libc::sigemptyset(&mut sa.sa_mask);
    }
    let rc = unsafe { libc::sigaction(libc::SIGSEGV, &sa, ptr::null_mut()) };
    if rc != 0 {
        return Err(InitError::Sigaction {
            signal: "SIGSEGV",
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

fn install_interrupt_handler() -> Result<(), InitError> {
    let mut sa: libc::sigaction = unsafe { mem::zeroed() };
    sa.sa_sigaction = interrupt::on_notify as usize;
    sa.sa_flags = 0;
    unsafe {
        libc::sigemptyset(&mut sa.sa_mask);
    }
    let rc = unsafe { libc::sigaction(libc::SIGUSR1, &sa, ptr::null_mut()) };
    if rc != 0 {
        return Err(InitError::Sigaction {
            signal: "SIGUSR1",
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}
