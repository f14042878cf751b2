// SPDX-FileCopyrightText: 2025 rumio contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Process-wide trap-layer state.
//!
//! Signal handlers cannot receive user context by argument, so the pieces
//! they need (registry, dispatch table, pid, socket path) live in statics.
//! Everything here is written from normal execution context during `init`
//! and registration, and read from signal-delivery context without taking a
//! lock: plain atomics, plus a `OnceLock` for the socket path (lock-free to
//! read once set).

use std::ffi::{CStr, CString};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::OnceLock;

use parking_lot::{Mutex, MutexGuard};

static DRIVER_PID: AtomicI32 = AtomicI32::new(0);
static PERMISSIVE: AtomicBool = AtomicBool::new(false);
static MODEL_SOCKET: OnceLock<CString> = OnceLock::new();

/// Serializes registry and dispatch-table writers. Never taken from signal
/// context.
static WRITE_LOCK: Mutex<()> = Mutex::new(());

pub(crate) fn writer_lock() -> MutexGuard<'static, ()> {
    WRITE_LOCK.lock()
}

pub(crate) fn set_driver_pid(pid: i32) {
    DRIVER_PID.store(pid, Ordering::Release);
}

pub(crate) fn driver_pid() -> i32 {
    DRIVER_PID.load(Ordering::Acquire)
}

pub(crate) fn set_permissive(on: bool) {
    PERMISSIVE.store(on, Ordering::Release);
}

pub(crate) fn permissive() -> bool {
    PERMISSIVE.load(Ordering::Acquire)
}

/// Latch the model socket path. The first caller wins; later calls succeed
/// only if they pass the same path again.
pub(crate) fn latch_model_socket(path: CString) -> bool {
    let latched = MODEL_SOCKET.get_or_init(|| path.clone());
    *latched == path
}

/// The latched socket path, or `None` before `init`.
pub(crate) fn model_socket() -> Option<&'static CStr> {
    MODEL_SOCKET.get().map(|s| s.as_c_str())
}
